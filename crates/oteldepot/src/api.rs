//! The fetch REST API.
//!
//! `POST /api/{traces,metrics,logs}/fetch` decode a fetch request
//! (protobuf or OTLP-JSON), delegate to the signal repository, and answer in
//! the format negotiated from `Accept`. Every non-2xx response body is a
//! serialized `google.rpc.Status` envelope. `GET /health` answers 200.
//!
//! The three endpoints share one handler; [`FetchEndpoint`] binds each
//! request type to its repository call.

use std::future::Future;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get};
use axum::Router;
use oteldepot_proto::{
    FetchLogsDataRequest, FetchLogsDataResponse, FetchMetricsDataRequest,
    FetchMetricsDataResponse, FetchTracesDataRequest, FetchTracesDataResponse,
};
use serde::de::DeserializeOwned;

use crate::auth::{require_access_key, AuthSettings, HttpAuthState};
use crate::wire::{self, WireFormat};
use crate::{DepotError, SignalRepository};

/// Maximum accepted fetch request body size.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared state for the fetch API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub repository: Arc<SignalRepository>,
    pub auth: Arc<AuthSettings>,
}

/// Create the fetch API router.
pub fn api_router(state: ApiState) -> Router {
    let auth_state = HttpAuthState {
        settings: state.auth.clone(),
        // The source answers a missing key with 415; preserved for
        // compatibility.
        unauthenticated_status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
    };
    let fetch_routes = Router::new()
        .route("/traces/fetch", any(handle_fetch::<FetchTracesDataRequest>))
        .route("/metrics/fetch", any(handle_fetch::<FetchMetricsDataRequest>))
        .route("/logs/fetch", any(handle_fetch::<FetchLogsDataRequest>))
        .layer(middleware::from_fn_with_state(auth_state, require_access_key))
        .layer(middleware::from_fn(observe_request))
        .with_state(state);

    Router::new()
        .route("/health", get(handle_health))
        .nest("/api", fetch_routes)
}

/// Handle GET /health
async fn handle_health() -> StatusCode {
    StatusCode::OK
}

/// Request-observation middleware for the fetch routes.
async fn observe_request(request: Request, next: Next) -> Response {
    tracing::info!(
        method = %request.method(),
        path = %request.uri().path(),
        content_type = request
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(""),
        "accept api request"
    );
    next.run(request).await
}

/// Binds a fetch request message to its repository dispatch.
trait FetchEndpoint: prost::Message + Default + DeserializeOwned {
    type Response: prost::Message + serde::Serialize;

    fn dispatch(
        repository: &SignalRepository,
        request: Self,
    ) -> impl Future<Output = Result<Self::Response, DepotError>> + Send;
}

impl FetchEndpoint for FetchTracesDataRequest {
    type Response = FetchTracesDataResponse;

    fn dispatch(
        repository: &SignalRepository,
        request: Self,
    ) -> impl Future<Output = Result<Self::Response, DepotError>> + Send {
        async move { repository.fetch_traces_data(&request).await }
    }
}

impl FetchEndpoint for FetchMetricsDataRequest {
    type Response = FetchMetricsDataResponse;

    fn dispatch(
        repository: &SignalRepository,
        request: Self,
    ) -> impl Future<Output = Result<Self::Response, DepotError>> + Send {
        async move { repository.fetch_metrics_data(&request).await }
    }
}

impl FetchEndpoint for FetchLogsDataRequest {
    type Response = FetchLogsDataResponse;

    fn dispatch(
        repository: &SignalRepository,
        request: Self,
    ) -> impl Future<Output = Result<Self::Response, DepotError>> + Send {
        async move { repository.fetch_logs_data(&request).await }
    }
}

/// The shared fetch handler: method check, strict content-type check,
/// decode, dispatch, negotiated encode.
async fn handle_fetch<E: FetchEndpoint>(
    State(state): State<ApiState>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    if parts.method != Method::POST {
        return wire::error_response(
            &parts.headers,
            tonic::Code::Unimplemented,
            "method not allowed",
            StatusCode::METHOD_NOT_ALLOWED,
        );
    }

    let request_format = match WireFormat::from_content_type_strict(&parts.headers) {
        Ok(format) => format,
        Err(_) => {
            return wire::error_response(
                &parts.headers,
                tonic::Code::InvalidArgument,
                "unsupported content type",
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            )
        }
    };

    let body = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(err) => {
            return wire::error_response(
                &parts.headers,
                tonic::Code::InvalidArgument,
                &format!("failed to read request body: {err}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };

    let fetch_request: E = match wire::decode(request_format, &body) {
        Ok(request) => request,
        Err(err) => {
            return wire::error_response(
                &parts.headers,
                tonic::Code::InvalidArgument,
                &err.to_string(),
                StatusCode::BAD_REQUEST,
            )
        }
    };

    match E::dispatch(&state.repository, fetch_request).await {
        Ok(response) => {
            let response_format = WireFormat::from_accept(&parts.headers, request_format);
            match wire::encode(response_format, &response) {
                Ok(response) => response,
                Err(err) => wire::error_response(
                    &parts.headers,
                    tonic::Code::Internal,
                    &err.to_string(),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            }
        }
        Err(err) => wire::error_response(
            &parts.headers,
            err.grpc_code(),
            &err.to_string(),
            err.http_status(),
        ),
    }
}
