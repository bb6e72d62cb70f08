//! Error types for the depot.

use std::io;

use axum::http::StatusCode;

/// Errors that can occur in the depot pipeline.
///
/// Large error types are boxed to keep the enum size small, which improves
/// performance when passing `Result<T, DepotError>` on the stack.
#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Object store error (boxed - large type).
    #[error("object store error: {0}")]
    ObjectStore(Box<object_store::Error>),

    /// URL parse error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Protobuf decoding error.
    #[error("protobuf decode error: {source}")]
    ProtoDecode { source: prost::DecodeError },

    /// JSON decoding error.
    #[error("JSON decode error: {source}")]
    JsonDecode { source: serde_json::Error },

    /// JSON encoding error.
    #[error("JSON encode error: {source}")]
    JsonEncode { source: serde_json::Error },

    /// Invalid content type in an HTTP request.
    #[error("unsupported content type: {content_type}")]
    InvalidContentType { content_type: String },

    /// Rejected request (time range, limit bounds).
    #[error("{0}")]
    InvalidArgument(String),

    /// Cursor that does not decode to a valid resumption state. Full detail
    /// is logged under the correlation id; the client sees only the id.
    #[error("invalid cursor: error_id={error_id}")]
    InvalidCursor { error_id: String },

    /// Transport-level server failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal failure. Full detail is logged under the correlation id; the
    /// client sees only the id.
    #[error("internal error: error_id={error_id}")]
    Internal { error_id: String },
}

impl DepotError {
    /// gRPC status code for this error, as used in the Status envelope.
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            Self::InvalidArgument(_)
            | Self::InvalidCursor { .. }
            | Self::InvalidContentType { .. }
            | Self::ProtoDecode { .. }
            | Self::JsonDecode { .. } => tonic::Code::InvalidArgument,
            _ => tonic::Code::Internal,
        }
    }

    /// HTTP status the fetch API responds with for this error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_)
            | Self::InvalidCursor { .. }
            | Self::ProtoDecode { .. }
            | Self::JsonDecode { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Manual From implementation for the boxed error type
impl From<object_store::Error> for DepotError {
    fn from(err: object_store::Error) -> Self {
        Self::ObjectStore(Box::new(err))
    }
}

impl From<DepotError> for tonic::Status {
    fn from(err: DepotError) -> Self {
        match err.grpc_code() {
            tonic::Code::InvalidArgument => Self::invalid_argument(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_maps_to_bad_request() {
        let err = DepotError::InvalidArgument("start time is required".to_owned());
        assert_eq!(err.grpc_code(), tonic::Code::InvalidArgument);
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_cursor_maps_to_invalid_argument() {
        let err = DepotError::InvalidCursor {
            error_id: "abcd1234".to_owned(),
        };
        assert_eq!(err.grpc_code(), tonic::Code::InvalidArgument);
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "invalid cursor: error_id=abcd1234");
    }

    #[test]
    fn internal_hides_detail_behind_error_id() {
        let err = DepotError::Internal {
            error_id: "deadbeef".to_owned(),
        };
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "internal error: error_id=deadbeef");
    }

    #[test]
    fn content_type_maps_to_unsupported_media_type() {
        let err = DepotError::InvalidContentType {
            content_type: "text/plain".to_owned(),
        };
        assert_eq!(err.http_status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.grpc_code(), tonic::Code::InvalidArgument);
    }
}
