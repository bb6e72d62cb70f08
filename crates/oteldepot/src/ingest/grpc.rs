//! tonic gRPC OTLP receivers.
//!
//! Implements the TraceService, MetricsService, and LogsService gRPC
//! services from the OpenTelemetry collector protocol, storing every export
//! through the signal repository. Successful exports answer with an empty
//! envelope; storage failures surface as `Internal` carrying a correlation
//! id, with full detail only in the server log.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::{
    logs::v1::{logs_service_server::LogsService, ExportLogsServiceRequest, ExportLogsServiceResponse},
    metrics::v1::{
        metrics_service_server::MetricsService, ExportMetricsServiceRequest,
        ExportMetricsServiceResponse,
    },
    trace::v1::{
        trace_service_server::TraceService, ExportTraceServiceRequest, ExportTraceServiceResponse,
    },
};
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use tonic::{Request, Response, Status};

use crate::storage::random_string;
use crate::SignalRepository;

/// gRPC receiver for all OTLP signals.
#[derive(Clone)]
pub struct OtlpGrpcReceiver {
    repository: Arc<SignalRepository>,
}

impl OtlpGrpcReceiver {
    pub fn new(repository: Arc<SignalRepository>) -> Self {
        Self { repository }
    }
}

#[tonic::async_trait]
impl TraceService for OtlpGrpcReceiver {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        let request = request.into_inner();
        let total_spans: usize = request
            .resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum();
        tracing::info!(signal = "traces", total_spans, "received otlp export");

        let data = TracesData {
            resource_spans: request.resource_spans,
        };
        if let Err(err) = self.repository.push_traces_data(data).await {
            let error_id = random_string(8);
            tracing::error!(error_id = %error_id, error = %err, "failed to put resource spans");
            return Err(Status::internal(format!(
                "failed to put resource spans: error_id={error_id}"
            )));
        }

        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

#[tonic::async_trait]
impl MetricsService for OtlpGrpcReceiver {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        let request = request.into_inner();
        let total_metrics: usize = request
            .resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .map(|sm| sm.metrics.len())
            .sum();
        tracing::info!(signal = "metrics", total_metrics, "received otlp export");

        let data = MetricsData {
            resource_metrics: request.resource_metrics,
        };
        if let Err(err) = self.repository.push_metrics_data(data).await {
            let error_id = random_string(8);
            tracing::error!(error_id = %error_id, error = %err, "failed to put resource metrics");
            return Err(Status::internal(format!(
                "failed to put resource metrics: error_id={error_id}"
            )));
        }

        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

#[tonic::async_trait]
impl LogsService for OtlpGrpcReceiver {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let request = request.into_inner();
        let total_log_records: usize = request
            .resource_logs
            .iter()
            .flat_map(|rl| rl.scope_logs.iter())
            .map(|sl| sl.log_records.len())
            .sum();
        tracing::info!(signal = "logs", total_log_records, "received otlp export");

        let data = LogsData {
            resource_logs: request.resource_logs,
        };
        if let Err(err) = self.repository.push_logs_data(data).await {
            let error_id = random_string(8);
            tracing::error!(error_id = %error_id, error = %err, "failed to put resource logs");
            return Err(Status::internal(format!(
                "failed to put resource logs: error_id={error_id}"
            )));
        }

        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

/// Re-export the service servers for convenience.
pub use opentelemetry_proto::tonic::collector::{
    logs::v1::logs_service_server::LogsServiceServer,
    metrics::v1::metrics_service_server::MetricsServiceServer,
    trace::v1::trace_service_server::TraceServiceServer,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use object_store::memory::InMemory;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
    use opentelemetry_proto::tonic::metrics::v1::{
        metric, number_data_point, Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics,
    };
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
    use oteldepot_proto::{FetchLogsDataRequest, FetchMetricsDataRequest, FetchTracesDataRequest};

    const T0: u64 = 1_544_712_660_000_000_000;

    fn test_receiver() -> (OtlpGrpcReceiver, Arc<SignalRepository>) {
        let repository = Arc::new(SignalRepository::with_store(
            Arc::new(InMemory::new()),
            String::new(),
            false,
            b"test-cursor-encryption-key",
            Arc::new(MockClock::at_unix_nano(T0)),
        ));
        (OtlpGrpcReceiver::new(repository.clone()), repository)
    }

    fn service_name_kv(name: &str) -> KeyValue {
        KeyValue {
            key: "service.name".to_owned(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(name.to_owned())),
            }),
        }
    }

    #[tokio::test]
    async fn trace_export_stores_spans() {
        let (receiver, repository) = test_receiver();

        let request = Request::new(ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![service_name_kv("grpc-test-service")],
                    ..Default::default()
                }),
                scope_spans: vec![ScopeSpans {
                    spans: vec![Span {
                        trace_id: vec![0xAA; 16],
                        span_id: vec![0xBB; 8],
                        name: "grpc-test-span".to_owned(),
                        start_time_unix_nano: T0 + 100,
                        end_time_unix_nano: T0 + 200,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        });

        let response = TraceService::export(&receiver, request).await.unwrap();
        assert!(response.into_inner().partial_success.is_none());

        let stored = repository
            .fetch_traces_data(&FetchTracesDataRequest {
                start_time_unix_nano: T0,
                end_time_unix_nano: T0 + 1_000,
                cursor: String::new(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(stored.resource_spans.len(), 1);
    }

    #[tokio::test]
    async fn empty_trace_export_succeeds() {
        let (receiver, _) = test_receiver();
        let request = Request::new(ExportTraceServiceRequest {
            resource_spans: vec![],
        });
        assert!(TraceService::export(&receiver, request).await.is_ok());
    }

    #[tokio::test]
    async fn metrics_export_stores_data_points() {
        let (receiver, repository) = test_receiver();

        let request = Request::new(ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(Resource {
                    attributes: vec![service_name_kv("grpc-metrics-service")],
                    ..Default::default()
                }),
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![Metric {
                        name: "grpc.test.gauge".to_owned(),
                        unit: "1".to_owned(),
                        data: Some(metric::Data::Gauge(Gauge {
                            data_points: vec![NumberDataPoint {
                                time_unix_nano: T0 + 100,
                                value: Some(number_data_point::Value::AsInt(42)),
                                ..Default::default()
                            }],
                        })),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        });

        assert!(MetricsService::export(&receiver, request).await.is_ok());

        let stored = repository
            .fetch_metrics_data(&FetchMetricsDataRequest {
                start_time_unix_nano: T0,
                end_time_unix_nano: T0 + 1_000,
                cursor: String::new(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(stored.resource_metrics.len(), 1);
    }

    #[tokio::test]
    async fn logs_export_stores_records() {
        let (receiver, repository) = test_receiver();

        let request = Request::new(ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(Resource {
                    attributes: vec![service_name_kv("grpc-logs-service")],
                    ..Default::default()
                }),
                scope_logs: vec![ScopeLogs {
                    log_records: vec![LogRecord {
                        time_unix_nano: T0 + 100,
                        observed_time_unix_nano: T0 + 100,
                        severity_number: 9,
                        severity_text: "INFO".to_owned(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        });

        assert!(LogsService::export(&receiver, request).await.is_ok());

        let stored = repository
            .fetch_logs_data(&FetchLogsDataRequest {
                start_time_unix_nano: T0,
                end_time_unix_nano: T0 + 1_000,
                cursor: String::new(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(stored.resource_logs.len(), 1);
    }
}
