//! Access-key authentication for both ingress surfaces.
//!
//! One [`AuthSettings`] check backs an axum middleware (OTLP/HTTP and the
//! fetch API) and a tonic interceptor (OTLP/gRPC): with no keys configured
//! every request passes; a missing key is `Unauthenticated`, a mismatched
//! key is `PermissionDenied`, and a match logs the key id.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::config::AccessKeyConfig;
use crate::wire;

/// Outcome of a failed access-key check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No key was presented.
    MissingKey,
    /// The presented key matches no configured secret.
    Mismatch,
}

/// Validated access-key configuration shared by all ingress surfaces.
pub struct AuthSettings {
    header: String,
    metadata_key: String,
    keys: Vec<AccessKeyConfig>,
}

impl AuthSettings {
    pub fn new(header: impl Into<String>, keys: Vec<AccessKeyConfig>) -> Self {
        let header = header.into();
        Self {
            metadata_key: header.to_ascii_lowercase(),
            header,
            keys,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Header name carrying the key on HTTP requests.
    pub fn header_name(&self) -> &str {
        &self.header
    }

    /// Lowercased header name, as gRPC metadata keys require.
    pub fn metadata_key(&self) -> &str {
        &self.metadata_key
    }

    /// Check a presented key. Returns the matched key id, or `None` when
    /// authentication is disabled.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<Option<&str>, AuthError> {
        if !self.enabled() {
            return Ok(None);
        }
        let presented = match presented {
            Some(value) if !value.is_empty() => value,
            _ => return Err(AuthError::MissingKey),
        };
        self.keys
            .iter()
            .find(|key| key.secret_key == presented)
            .map(|key| Some(key.key_id.as_str()))
            .ok_or(AuthError::Mismatch)
    }
}

/// State for [`require_access_key`]. The unauthenticated status differs per
/// surface: the fetch API preserves the source's 415, OTLP/HTTP uses 401.
#[derive(Clone)]
pub struct HttpAuthState {
    pub settings: Arc<AuthSettings>,
    pub unauthenticated_status: StatusCode,
}

/// axum middleware enforcing the access-key check, answering with a Status
/// envelope in the request's negotiated format.
pub async fn require_access_key(
    State(state): State<HttpAuthState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(state.settings.header_name())
        .and_then(|value| value.to_str().ok());

    match state.settings.authenticate(presented) {
        Ok(key_id) => {
            if let Some(key_id) = key_id {
                tracing::info!(key_id = %key_id, "authenticated");
            }
            next.run(request).await
        }
        Err(AuthError::MissingKey) => {
            tracing::info!(reason = "no access key found", "access denied");
            wire::error_response(
                request.headers(),
                tonic::Code::Unauthenticated,
                "no access key found",
                state.unauthenticated_status,
            )
        }
        Err(AuthError::Mismatch) => {
            tracing::info!(reason = "access key mismatch", "access denied");
            wire::error_response(
                request.headers(),
                tonic::Code::PermissionDenied,
                "access denied",
                StatusCode::FORBIDDEN,
            )
        }
    }
}

/// tonic interceptor enforcing the access-key check on OTLP/gRPC metadata.
#[derive(Clone)]
pub struct AccessKeyInterceptor {
    settings: Arc<AuthSettings>,
}

impl AccessKeyInterceptor {
    pub fn new(settings: Arc<AuthSettings>) -> Self {
        Self { settings }
    }
}

impl tonic::service::Interceptor for AccessKeyInterceptor {
    fn call(
        &mut self,
        request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        let presented = request
            .metadata()
            .get(self.settings.metadata_key())
            .and_then(|value| value.to_str().ok());

        match self.settings.authenticate(presented) {
            Ok(key_id) => {
                if let Some(key_id) = key_id {
                    tracing::info!(key_id = %key_id, "authenticated");
                }
                Ok(request)
            }
            Err(AuthError::MissingKey) => {
                tracing::info!(reason = "no access key found", "access denied");
                Err(tonic::Status::unauthenticated("no access key found"))
            }
            Err(AuthError::Mismatch) => {
                tracing::info!(reason = "access key mismatch", "access denied");
                Err(tonic::Status::permission_denied("access denied"))
            }
        }
    }
}
