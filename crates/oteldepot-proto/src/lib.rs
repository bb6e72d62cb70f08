//! Wire messages for the oteldepot fetch API.
//!
//! The fetch request/response messages are hand-annotated prost structs so
//! that server and client share a single definition without a build-time
//! protoc step. The resource group payloads reuse the upstream OpenTelemetry
//! proto schemas unmodified.
//!
//! JSON follows the protojson conventions the OTLP ecosystem uses: camelCase
//! field names, 64-bit integers carried as strings (accepted as either
//! strings or numbers on input).

mod serializers;

pub use serializers::{i64_as_string, u64_as_string};

use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use opentelemetry_proto::tonic::metrics::v1::ResourceMetrics;
use opentelemetry_proto::tonic::trace::v1::ResourceSpans;
use serde::{Deserialize, Serialize};

/// Request for a page of stored trace data.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchTracesDataRequest {
    /// Inclusive lower bound of the time range, nanoseconds since the epoch.
    /// Required.
    #[prost(fixed64, tag = "1")]
    #[serde(with = "u64_as_string")]
    pub start_time_unix_nano: u64,
    /// Inclusive upper bound of the time range. Zero means "now".
    #[prost(fixed64, tag = "2")]
    #[serde(with = "u64_as_string")]
    pub end_time_unix_nano: u64,
    /// Opaque resumption token from a previous response.
    #[prost(string, tag = "3")]
    pub cursor: ::prost::alloc::string::String,
    /// Maximum number of resource groups per page. Zero means the server
    /// default (10000).
    #[prost(int64, tag = "4")]
    #[serde(with = "i64_as_string")]
    pub limit: i64,
}

/// One page of stored trace data.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchTracesDataResponse {
    #[prost(message, repeated, tag = "1")]
    pub resource_spans: ::prost::alloc::vec::Vec<ResourceSpans>,
    /// Token for the next page; empty when the range is exhausted.
    #[prost(string, tag = "2")]
    pub next_cursor: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub has_more: bool,
}

/// Request for a page of stored metric data.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchMetricsDataRequest {
    /// Inclusive lower bound of the time range, nanoseconds since the epoch.
    /// Required.
    #[prost(fixed64, tag = "1")]
    #[serde(with = "u64_as_string")]
    pub start_time_unix_nano: u64,
    /// Inclusive upper bound of the time range. Zero means "now".
    #[prost(fixed64, tag = "2")]
    #[serde(with = "u64_as_string")]
    pub end_time_unix_nano: u64,
    /// Opaque resumption token from a previous response.
    #[prost(string, tag = "3")]
    pub cursor: ::prost::alloc::string::String,
    /// Maximum number of resource groups per page. Zero means the server
    /// default (10000).
    #[prost(int64, tag = "4")]
    #[serde(with = "i64_as_string")]
    pub limit: i64,
}

/// One page of stored metric data.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchMetricsDataResponse {
    #[prost(message, repeated, tag = "1")]
    pub resource_metrics: ::prost::alloc::vec::Vec<ResourceMetrics>,
    /// Token for the next page; empty when the range is exhausted.
    #[prost(string, tag = "2")]
    pub next_cursor: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub has_more: bool,
}

/// Request for a page of stored log data.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchLogsDataRequest {
    /// Inclusive lower bound of the time range, nanoseconds since the epoch.
    /// Required.
    #[prost(fixed64, tag = "1")]
    #[serde(with = "u64_as_string")]
    pub start_time_unix_nano: u64,
    /// Inclusive upper bound of the time range. Zero means "now".
    #[prost(fixed64, tag = "2")]
    #[serde(with = "u64_as_string")]
    pub end_time_unix_nano: u64,
    /// Opaque resumption token from a previous response.
    #[prost(string, tag = "3")]
    pub cursor: ::prost::alloc::string::String,
    /// Maximum number of resource groups per page. Zero means the server
    /// default (10000).
    #[prost(int64, tag = "4")]
    #[serde(with = "i64_as_string")]
    pub limit: i64,
}

/// One page of stored log data.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchLogsDataResponse {
    #[prost(message, repeated, tag = "1")]
    pub resource_logs: ::prost::alloc::vec::Vec<ResourceLogs>,
    /// Token for the next page; empty when the range is exhausted.
    #[prost(string, tag = "2")]
    pub next_cursor: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub has_more: bool,
}

/// The `google.rpc.Status` error envelope used by non-2xx API responses.
///
/// Wire-compatible with the upstream message; the `details` field is never
/// populated and is therefore not carried.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// gRPC status code numbers as used in the [`Status`] envelope.
pub mod code {
    pub const OK: i32 = 0;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const NOT_FOUND: i32 = 5;
    pub const PERMISSION_DENIED: i32 = 7;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
    pub const UNAVAILABLE: i32 = 14;
    pub const UNAUTHENTICATED: i32 = 16;
}

/// Human-readable name for a status code number.
pub fn code_name(code: i32) -> &'static str {
    match code {
        code::OK => "OK",
        code::INVALID_ARGUMENT => "InvalidArgument",
        code::NOT_FOUND => "NotFound",
        code::PERMISSION_DENIED => "PermissionDenied",
        code::UNIMPLEMENTED => "Unimplemented",
        code::INTERNAL => "Internal",
        code::UNAVAILABLE => "Unavailable",
        code::UNAUTHENTICATED => "Unauthenticated",
        _ => "Unknown",
    }
}
