//! Per-kind dispatch table for the repository walk.
//!
//! Traces, metrics, and logs share one partitioned-ingest and fetch-walk
//! skeleton; [`SignalData`] supplies the pieces that differ: the kind, the
//! resource group type, the partition timestamp selector, and the time-range
//! filter.

use opentelemetry_proto::tonic::logs::v1::{LogsData, ResourceLogs};
use opentelemetry_proto::tonic::metrics::v1::{metric, Metric, MetricsData, ResourceMetrics};
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, TracesData};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::SignalKind;

/// A top-level OTLP data message: an ordered sequence of resource groups,
/// each tying producer attributes to scoped atomic records.
pub(crate) trait SignalData:
    prost::Message + Default + Serialize + DeserializeOwned + Send + 'static
{
    const KIND: SignalKind;

    /// Resource group type (`ResourceSpans` / `ResourceMetrics` /
    /// `ResourceLogs`).
    type Group: Clone + Send + 'static;

    fn from_groups(groups: Vec<Self::Group>) -> Self;

    fn into_groups(self) -> Vec<Self::Group>;

    /// Timestamp used to hour-bucket a resource group on ingest, selected in
    /// order: first record start time, first record end/observed time.
    /// `None` when no record carries a timestamp (the caller buckets by wall
    /// clock).
    fn partition_timestamp(group: &Self::Group) -> Option<u64>;

    /// Keep only records with a timestamp inside `[start, end]`, pruning
    /// scopes and the group itself when they become empty.
    fn filter_in_range(group: Self::Group, start: u64, end: u64) -> Option<Self::Group>;
}

fn in_range(ts: u64, start: u64, end: u64) -> bool {
    ts != 0 && ts >= start && ts <= end
}

fn first_non_zero(mut times: impl Iterator<Item = u64>) -> Option<u64> {
    times.find(|&ts| ts != 0)
}

impl SignalData for TracesData {
    const KIND: SignalKind = SignalKind::Traces;
    type Group = ResourceSpans;

    fn from_groups(groups: Vec<Self::Group>) -> Self {
        Self {
            resource_spans: groups,
        }
    }

    fn into_groups(self) -> Vec<Self::Group> {
        self.resource_spans
    }

    fn partition_timestamp(group: &Self::Group) -> Option<u64> {
        let spans = || group.scope_spans.iter().flat_map(|ss| ss.spans.iter());
        first_non_zero(spans().map(|span| span.start_time_unix_nano))
            .or_else(|| first_non_zero(spans().map(|span| span.end_time_unix_nano)))
    }

    fn filter_in_range(mut group: Self::Group, start: u64, end: u64) -> Option<Self::Group> {
        group.scope_spans.retain_mut(|scope| {
            scope.spans.retain(|span| {
                in_range(span.start_time_unix_nano, start, end)
                    || in_range(span.end_time_unix_nano, start, end)
            });
            !scope.spans.is_empty()
        });
        (!group.scope_spans.is_empty()).then_some(group)
    }
}

impl SignalData for MetricsData {
    const KIND: SignalKind = SignalKind::Metrics;
    type Group = ResourceMetrics;

    fn from_groups(groups: Vec<Self::Group>) -> Self {
        Self {
            resource_metrics: groups,
        }
    }

    fn into_groups(self) -> Vec<Self::Group> {
        self.resource_metrics
    }

    fn partition_timestamp(group: &Self::Group) -> Option<u64> {
        let points = || {
            group
                .scope_metrics
                .iter()
                .flat_map(|sm| sm.metrics.iter())
                .flat_map(metric_point_times)
        };
        first_non_zero(points().map(|(start, _)| start))
            .or_else(|| first_non_zero(points().map(|(_, time)| time)))
    }

    fn filter_in_range(mut group: Self::Group, start: u64, end: u64) -> Option<Self::Group> {
        group.scope_metrics.retain_mut(|scope| {
            scope.metrics = std::mem::take(&mut scope.metrics)
                .into_iter()
                .filter_map(|metric| filter_metric(metric, start, end))
                .collect();
            !scope.metrics.is_empty()
        });
        (!group.scope_metrics.is_empty()).then_some(group)
    }
}

impl SignalData for LogsData {
    const KIND: SignalKind = SignalKind::Logs;
    type Group = ResourceLogs;

    fn from_groups(groups: Vec<Self::Group>) -> Self {
        Self {
            resource_logs: groups,
        }
    }

    fn into_groups(self) -> Vec<Self::Group> {
        self.resource_logs
    }

    fn partition_timestamp(group: &Self::Group) -> Option<u64> {
        let records = || group.scope_logs.iter().flat_map(|sl| sl.log_records.iter());
        first_non_zero(records().map(|record| record.time_unix_nano))
            .or_else(|| first_non_zero(records().map(|record| record.observed_time_unix_nano)))
    }

    fn filter_in_range(mut group: Self::Group, start: u64, end: u64) -> Option<Self::Group> {
        group.scope_logs.retain_mut(|scope| {
            scope.log_records.retain(|record| {
                in_range(record.time_unix_nano, start, end)
                    || in_range(record.observed_time_unix_nano, start, end)
            });
            !scope.log_records.is_empty()
        });
        (!group.scope_logs.is_empty()).then_some(group)
    }
}

/// `(start_time, time)` pairs of every data point in a metric, across all
/// point shapes.
fn metric_point_times(metric: &Metric) -> Vec<(u64, u64)> {
    match &metric.data {
        Some(metric::Data::Gauge(gauge)) => gauge
            .data_points
            .iter()
            .map(|p| (p.start_time_unix_nano, p.time_unix_nano))
            .collect(),
        Some(metric::Data::Sum(sum)) => sum
            .data_points
            .iter()
            .map(|p| (p.start_time_unix_nano, p.time_unix_nano))
            .collect(),
        Some(metric::Data::Histogram(histogram)) => histogram
            .data_points
            .iter()
            .map(|p| (p.start_time_unix_nano, p.time_unix_nano))
            .collect(),
        Some(metric::Data::ExponentialHistogram(histogram)) => histogram
            .data_points
            .iter()
            .map(|p| (p.start_time_unix_nano, p.time_unix_nano))
            .collect(),
        Some(metric::Data::Summary(summary)) => summary
            .data_points
            .iter()
            .map(|p| (p.start_time_unix_nano, p.time_unix_nano))
            .collect(),
        None => Vec::new(),
    }
}

/// Keep only data points inside the range; drop the metric when none remain.
fn filter_metric(mut metric: Metric, start: u64, end: u64) -> Option<Metric> {
    let keep = |point_start: u64, point_time: u64| {
        in_range(point_time, start, end) || in_range(point_start, start, end)
    };

    let data = match metric.data.take()? {
        metric::Data::Gauge(mut gauge) => {
            gauge
                .data_points
                .retain(|p| keep(p.start_time_unix_nano, p.time_unix_nano));
            (!gauge.data_points.is_empty()).then_some(metric::Data::Gauge(gauge))
        }
        metric::Data::Sum(mut sum) => {
            sum.data_points
                .retain(|p| keep(p.start_time_unix_nano, p.time_unix_nano));
            (!sum.data_points.is_empty()).then_some(metric::Data::Sum(sum))
        }
        metric::Data::Histogram(mut histogram) => {
            histogram
                .data_points
                .retain(|p| keep(p.start_time_unix_nano, p.time_unix_nano));
            (!histogram.data_points.is_empty()).then_some(metric::Data::Histogram(histogram))
        }
        metric::Data::ExponentialHistogram(mut histogram) => {
            histogram
                .data_points
                .retain(|p| keep(p.start_time_unix_nano, p.time_unix_nano));
            (!histogram.data_points.is_empty())
                .then_some(metric::Data::ExponentialHistogram(histogram))
        }
        metric::Data::Summary(mut summary) => {
            summary
                .data_points
                .retain(|p| keep(p.start_time_unix_nano, p.time_unix_nano));
            (!summary.data_points.is_empty()).then_some(metric::Data::Summary(summary))
        }
    }?;

    metric.data = Some(data);
    Some(metric)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, ScopeLogs};
    use opentelemetry_proto::tonic::metrics::v1::{Gauge, NumberDataPoint, ScopeMetrics};
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::{ScopeSpans, Span};

    pub fn service_resource(name: &str) -> Resource {
        Resource {
            attributes: vec![KeyValue {
                key: "service.name".to_owned(),
                value: Some(AnyValue {
                    value: Some(any_value::Value::StringValue(name.to_owned())),
                }),
            }],
            ..Default::default()
        }
    }

    pub fn span_group(service: &str, start: u64, end: u64) -> ResourceSpans {
        ResourceSpans {
            resource: Some(service_resource(service)),
            scope_spans: vec![ScopeSpans {
                spans: vec![Span {
                    trace_id: vec![0xAA; 16],
                    span_id: vec![0xBB; 8],
                    name: "test-span".to_owned(),
                    start_time_unix_nano: start,
                    end_time_unix_nano: end,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn metric_group(service: &str, start: u64, time: u64) -> ResourceMetrics {
        ResourceMetrics {
            resource: Some(service_resource(service)),
            scope_metrics: vec![ScopeMetrics {
                metrics: vec![Metric {
                    name: "test.gauge".to_owned(),
                    data: Some(metric::Data::Gauge(Gauge {
                        data_points: vec![NumberDataPoint {
                            start_time_unix_nano: start,
                            time_unix_nano: time,
                            ..Default::default()
                        }],
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn log_group(service: &str, time: u64, observed: u64) -> ResourceLogs {
        ResourceLogs {
            resource: Some(service_resource(service)),
            scope_logs: vec![ScopeLogs {
                log_records: vec![LogRecord {
                    time_unix_nano: time,
                    observed_time_unix_nano: observed,
                    severity_text: "INFO".to_owned(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn trace_partition_prefers_start_time() {
        let group = span_group("svc", 100, 200);
        assert_eq!(TracesData::partition_timestamp(&group), Some(100));
    }

    #[test]
    fn trace_partition_falls_back_to_end_time() {
        let group = span_group("svc", 0, 200);
        assert_eq!(TracesData::partition_timestamp(&group), Some(200));
    }

    #[test]
    fn trace_partition_none_without_timestamps() {
        let group = span_group("svc", 0, 0);
        assert_eq!(TracesData::partition_timestamp(&group), None);
    }

    #[test]
    fn metric_partition_prefers_point_start_time() {
        let group = metric_group("svc", 100, 200);
        assert_eq!(MetricsData::partition_timestamp(&group), Some(100));
        let group = metric_group("svc", 0, 200);
        assert_eq!(MetricsData::partition_timestamp(&group), Some(200));
    }

    #[test]
    fn log_partition_prefers_event_time() {
        let group = log_group("svc", 100, 200);
        assert_eq!(LogsData::partition_timestamp(&group), Some(100));
        let group = log_group("svc", 0, 200);
        assert_eq!(LogsData::partition_timestamp(&group), Some(200));
    }

    #[test]
    fn filter_keeps_spans_overlapping_range() {
        let group = span_group("svc", 150, 250);
        assert!(TracesData::filter_in_range(group, 100, 200).is_some());

        // Overlap via end time only.
        let group = span_group("svc", 50, 150);
        assert!(TracesData::filter_in_range(group, 100, 200).is_some());
    }

    #[test]
    fn filter_drops_out_of_range_spans_and_empty_groups() {
        let group = span_group("svc", 300, 400);
        assert!(TracesData::filter_in_range(group, 100, 200).is_none());
    }

    #[test]
    fn filter_drops_only_out_of_range_records_within_a_group() {
        let mut group = span_group("svc", 150, 160);
        group.scope_spans[0].spans.push(Span {
            name: "late-span".to_owned(),
            start_time_unix_nano: 900,
            end_time_unix_nano: 950,
            ..Default::default()
        });

        let filtered = TracesData::filter_in_range(group, 100, 200).unwrap();
        assert_eq!(filtered.scope_spans[0].spans.len(), 1);
        assert_eq!(filtered.scope_spans[0].spans[0].name, "test-span");
    }

    #[test]
    fn filter_metrics_at_data_point_level() {
        let group = metric_group("svc", 150, 160);
        assert!(MetricsData::filter_in_range(group, 100, 200).is_some());

        let group = metric_group("svc", 300, 400);
        assert!(MetricsData::filter_in_range(group, 100, 200).is_none());
    }

    #[test]
    fn filter_logs_by_time_or_observed_time() {
        let group = log_group("svc", 0, 150);
        assert!(LogsData::filter_in_range(group, 100, 200).is_some());

        let group = log_group("svc", 300, 0);
        assert!(LogsData::filter_in_range(group, 100, 200).is_none());
    }

    #[test]
    fn zero_timestamps_never_match() {
        let group = span_group("svc", 0, 0);
        assert!(TracesData::filter_in_range(group, 0, u64::MAX).is_none());
    }
}
