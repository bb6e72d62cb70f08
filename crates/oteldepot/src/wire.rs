//! HTTP wire helpers shared by the OTLP ingress and the fetch API: content
//! negotiation between OTLP-JSON and protobuf, and the `google.rpc.Status`
//! error envelope.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use oteldepot_proto::Status as StatusProto;
use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::DepotError;

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

/// Body encoding of a request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireFormat {
    Json,
    Protobuf,
}

impl WireFormat {
    /// Request format for OTLP ingest: prefix-matched, missing content type
    /// defaults to protobuf (the OTLP/HTTP convention).
    pub fn from_content_type_lenient(headers: &HeaderMap) -> Result<Self, DepotError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(CONTENT_TYPE_PROTOBUF);

        if content_type.starts_with("application/x-protobuf")
            || content_type.starts_with("application/protobuf")
        {
            Ok(Self::Protobuf)
        } else if content_type.starts_with("application/json") {
            Ok(Self::Json)
        } else {
            Err(DepotError::InvalidContentType {
                content_type: content_type.to_owned(),
            })
        }
    }

    /// Request format for the fetch API: exact match against the allowed
    /// content types.
    pub fn from_content_type_strict(headers: &HeaderMap) -> Result<Self, DepotError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        match content_type {
            "application/json" => Ok(Self::Json),
            "application/protobuf" | "application/x-protobuf" => Ok(Self::Protobuf),
            other => Err(DepotError::InvalidContentType {
                content_type: other.to_owned(),
            }),
        }
    }

    /// Response format negotiated from `Accept`: an explicit media type
    /// wins; `*/*` or no preference follows the request's format; anything
    /// else falls back to JSON.
    pub fn from_accept(headers: &HeaderMap, request_format: Self) -> Self {
        let accept = headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        match accept {
            "application/json" => Self::Json,
            "application/protobuf" | "application/x-protobuf" => Self::Protobuf,
            "*/*" | "" => request_format,
            _ => Self::Json,
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::Protobuf => CONTENT_TYPE_PROTOBUF,
        }
    }
}

/// Decode a message body in the given format.
pub(crate) fn decode<T>(format: WireFormat, body: &[u8]) -> Result<T, DepotError>
where
    T: Message + Default + DeserializeOwned,
{
    match format {
        WireFormat::Protobuf => {
            T::decode(body).map_err(|source| DepotError::ProtoDecode { source })
        }
        WireFormat::Json => {
            serde_json::from_slice(body).map_err(|source| DepotError::JsonDecode { source })
        }
    }
}

/// Encode a message into an HTTP 200 response in the given format. JSON
/// bodies carry a trailing newline.
pub(crate) fn encode<T>(format: WireFormat, message: &T) -> Result<Response, DepotError>
where
    T: Message + Serialize,
{
    let body = encode_body(format, message)?;
    Ok((StatusCode::OK, [(CONTENT_TYPE, format.content_type())], body).into_response())
}

fn encode_body<T>(format: WireFormat, message: &T) -> Result<Vec<u8>, DepotError>
where
    T: Message + Serialize,
{
    match format {
        WireFormat::Protobuf => Ok(message.encode_to_vec()),
        WireFormat::Json => {
            let mut body = serde_json::to_vec(message)
                .map_err(|source| DepotError::JsonEncode { source })?;
            body.push(b'\n');
            Ok(body)
        }
    }
}

/// Build a non-2xx response carrying a serialized `google.rpc.Status`
/// envelope, in the format negotiated from the request headers.
pub(crate) fn error_response(
    request_headers: &HeaderMap,
    code: tonic::Code,
    message: &str,
    http_status: StatusCode,
) -> Response {
    let request_format =
        WireFormat::from_content_type_lenient(request_headers).unwrap_or(WireFormat::Protobuf);
    let format = WireFormat::from_accept(request_headers, request_format);

    let status = StatusProto {
        code: code as i32,
        message: message.to_owned(),
    };
    match encode_body(format, &status) {
        Ok(body) => {
            (http_status, [(CONTENT_TYPE, format.content_type())], body).into_response()
        }
        // Status is two scalar fields; serialization cannot realistically
        // fail, but never mask the original HTTP status if it does.
        Err(_) => (http_status, message.to_owned()).into_response(),
    }
}
