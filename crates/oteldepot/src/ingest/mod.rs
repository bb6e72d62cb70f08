//! OTLP ingress.
//!
//! gRPC and HTTP receivers for OTLP telemetry, dispatching every export to
//! the signal repository.

pub mod grpc;
pub mod http;

pub use grpc::{LogsServiceServer, MetricsServiceServer, OtlpGrpcReceiver, TraceServiceServer};
pub use http::{otlp_http_router, OtlpHttpState, DEFAULT_MAX_BODY_SIZE};
