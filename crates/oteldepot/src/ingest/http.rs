//! axum HTTP OTLP receivers.
//!
//! Implements the OTLP/HTTP endpoints for traces, metrics, and logs under
//! `/v1`, with content negotiation between protobuf
//! (`application/x-protobuf`) and OTLP-JSON (`application/json`).
//!
//! Gzip-compressed request bodies are decompressed by tower-http middleware;
//! the access-key middleware answers 401/403 with a Status envelope before a
//! handler runs.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use opentelemetry_proto::tonic::collector::{
    logs::v1::{ExportLogsServiceRequest, ExportLogsServiceResponse},
    metrics::v1::{ExportMetricsServiceRequest, ExportMetricsServiceResponse},
    trace::v1::{ExportTraceServiceRequest, ExportTraceServiceResponse},
};
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use tower_http::decompression::RequestDecompressionLayer;

use crate::auth::{require_access_key, AuthSettings, HttpAuthState};
use crate::storage::random_string;
use crate::wire::{self, WireFormat};
use crate::{DepotError, SignalRepository};

/// Default maximum request body size (16 MiB).
///
/// Telemetry batches larger than this should be split into smaller chunks by
/// the client.
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Shared state for the OTLP HTTP handlers.
#[derive(Clone)]
pub struct OtlpHttpState {
    pub repository: Arc<SignalRepository>,
    pub auth: Arc<AuthSettings>,
}

/// Create the OTLP HTTP router.
pub fn otlp_http_router(state: OtlpHttpState) -> Router {
    let auth_state = HttpAuthState {
        settings: state.auth.clone(),
        unauthenticated_status: StatusCode::UNAUTHORIZED,
    };
    Router::new()
        .route("/v1/traces", post(handle_traces))
        .route("/v1/metrics", post(handle_metrics))
        .route("/v1/logs", post(handle_logs))
        .layer(middleware::from_fn_with_state(auth_state, require_access_key))
        .layer(RequestDecompressionLayer::new())
        .layer(DefaultBodyLimit::max(DEFAULT_MAX_BODY_SIZE))
        .with_state(state)
}

/// Handle POST /v1/traces
async fn handle_traces(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    tracing::info!(signal = "traces", size = body.len(), "received otlp telemetry");

    let format = match WireFormat::from_content_type_lenient(&headers) {
        Ok(format) => format,
        Err(err) => return reject(&headers, &err),
    };
    let request: ExportTraceServiceRequest = match wire::decode(format, &body) {
        Ok(request) => request,
        Err(err) => return reject(&headers, &err),
    };

    let data = TracesData {
        resource_spans: request.resource_spans,
    };
    if let Err(err) = state.repository.push_traces_data(data).await {
        return storage_failure(&headers, "traces", &err);
    }

    respond(&headers, format, &ExportTraceServiceResponse::default())
}

/// Handle POST /v1/metrics
async fn handle_metrics(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    tracing::info!(signal = "metrics", size = body.len(), "received otlp telemetry");

    let format = match WireFormat::from_content_type_lenient(&headers) {
        Ok(format) => format,
        Err(err) => return reject(&headers, &err),
    };
    let request: ExportMetricsServiceRequest = match wire::decode(format, &body) {
        Ok(request) => request,
        Err(err) => return reject(&headers, &err),
    };

    let data = MetricsData {
        resource_metrics: request.resource_metrics,
    };
    if let Err(err) = state.repository.push_metrics_data(data).await {
        return storage_failure(&headers, "metrics", &err);
    }

    respond(&headers, format, &ExportMetricsServiceResponse::default())
}

/// Handle POST /v1/logs
async fn handle_logs(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    tracing::info!(signal = "logs", size = body.len(), "received otlp telemetry");

    let format = match WireFormat::from_content_type_lenient(&headers) {
        Ok(format) => format,
        Err(err) => return reject(&headers, &err),
    };
    let request: ExportLogsServiceRequest = match wire::decode(format, &body) {
        Ok(request) => request,
        Err(err) => return reject(&headers, &err),
    };

    let data = LogsData {
        resource_logs: request.resource_logs,
    };
    if let Err(err) = state.repository.push_logs_data(data).await {
        return storage_failure(&headers, "logs", &err);
    }

    respond(&headers, format, &ExportLogsServiceResponse::default())
}

fn respond<T>(headers: &HeaderMap, request_format: WireFormat, response: &T) -> Response
where
    T: prost::Message + serde::Serialize,
{
    match wire::encode(request_format, response) {
        Ok(response) => response,
        Err(err) => wire::error_response(
            headers,
            tonic::Code::Internal,
            &err.to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

fn reject(headers: &HeaderMap, err: &DepotError) -> Response {
    wire::error_response(headers, err.grpc_code(), &err.to_string(), err.http_status())
}

fn storage_failure(headers: &HeaderMap, what: &str, err: &DepotError) -> Response {
    let error_id = random_string(8);
    tracing::error!(error_id = %error_id, error = %err, "failed to put resource {what}");
    wire::error_response(
        headers,
        tonic::Code::Internal,
        &format!("failed to put resource {what}: error_id={error_id}"),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use axum::body::Body;
    use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
    use axum::http::Request;
    use object_store::memory::InMemory;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
    use oteldepot_proto::FetchTracesDataRequest;
    use prost::Message;
    use tower::ServiceExt;

    const T0: u64 = 1_544_712_660_000_000_000;

    fn test_state(keys: Vec<crate::config::AccessKeyConfig>) -> OtlpHttpState {
        OtlpHttpState {
            repository: Arc::new(SignalRepository::with_store(
                Arc::new(InMemory::new()),
                String::new(),
                false,
                b"test-cursor-encryption-key",
                Arc::new(MockClock::at_unix_nano(T0)),
            )),
            auth: Arc::new(AuthSettings::new("Oteleport-Access-Key", keys)),
        }
    }

    fn sample_trace_request() -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![KeyValue {
                        key: "service.name".to_owned(),
                        value: Some(AnyValue {
                            value: Some(any_value::Value::StringValue("test-service".to_owned())),
                        }),
                    }],
                    ..Default::default()
                }),
                scope_spans: vec![ScopeSpans {
                    spans: vec![Span {
                        trace_id: vec![1u8; 16],
                        span_id: vec![2u8; 8],
                        name: "test-span".to_owned(),
                        start_time_unix_nano: T0 + 100,
                        end_time_unix_nano: T0 + 200,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    async fn stored_span_count(state: &OtlpHttpState) -> usize {
        state
            .repository
            .fetch_traces_data(&FetchTracesDataRequest {
                start_time_unix_nano: T0,
                end_time_unix_nano: T0 + 1_000,
                cursor: String::new(),
                limit: 100,
            })
            .await
            .unwrap()
            .resource_spans
            .len()
    }

    #[tokio::test]
    async fn traces_protobuf_export_is_stored() {
        let state = test_state(Vec::new());
        let router = otlp_http_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .body(Body::from(sample_trace_request().encode_to_vec()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stored_span_count(&state).await, 1);
    }

    #[tokio::test]
    async fn traces_json_export_is_stored() {
        let state = test_state(Vec::new());
        let router = otlp_http_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&sample_trace_request()).unwrap()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stored_span_count(&state).await, 1);
    }

    #[tokio::test]
    async fn missing_content_type_defaults_to_protobuf() {
        let state = test_state(Vec::new());
        let router = otlp_http_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .body(Body::from(sample_trace_request().encode_to_vec()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stored_span_count(&state).await, 1);
    }

    #[tokio::test]
    async fn invalid_content_type_returns_415() {
        let router = otlp_http_router(test_state(Vec::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn malformed_protobuf_returns_400() {
        let router = otlp_http_router(test_state(Vec::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .body(Body::from(vec![0xFF, 0xFF, 0xFF]))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_returns_400() {
        let router = otlp_http_router(test_state(Vec::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/v1/logs")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{ invalid json }"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn gzip_compressed_body_is_accepted() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let state = test_state(Vec::new());
        let router = otlp_http_router(state.clone());

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&sample_trace_request().encode_to_vec())
            .unwrap();
        let compressed = encoder.finish().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(CONTENT_ENCODING, "gzip")
            .body(Body::from(compressed))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stored_span_count(&state).await, 1);
    }

    #[tokio::test]
    async fn missing_access_key_returns_401() {
        let keys = vec![crate::config::AccessKeyConfig {
            key_id: "k0".to_owned(),
            secret_key: "secret".to_owned(),
        }];
        let router = otlp_http_router(test_state(keys));

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .body(Body::from(sample_trace_request().encode_to_vec()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_access_key_returns_403() {
        let keys = vec![crate::config::AccessKeyConfig {
            key_id: "k0".to_owned(),
            secret_key: "secret".to_owned(),
        }];
        let router = otlp_http_router(test_state(keys));

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header("Oteleport-Access-Key", "wrong")
            .body(Body::from(sample_trace_request().encode_to_vec()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn valid_access_key_is_accepted() {
        let keys = vec![crate::config::AccessKeyConfig {
            key_id: "k0".to_owned(),
            secret_key: "secret".to_owned(),
        }];
        let state = test_state(keys);
        let router = otlp_http_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/v1/traces")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header("Oteleport-Access-Key", "secret")
            .body(Body::from(sample_trace_request().encode_to_vec()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stored_span_count(&state).await, 1);
    }
}
