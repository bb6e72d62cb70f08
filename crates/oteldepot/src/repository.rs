//! The signal repository: partitioned ingest and cursor-resumable fetch.
//!
//! Ingest splits a batch's resource groups into hour buckets and stores each
//! bucket as one OTLP-JSON object. Fetch walks the hour prefixes of the
//! requested time range in ascending order, re-filters each object for time
//! overlap, and slices page boundaries mid-object; the resumption state
//! travels to the client as an encrypted cursor.
//!
//! All three signal kinds run through one generic skeleton; the `limit` is
//! measured in resource groups.

use std::collections::BTreeMap;
use std::sync::Arc;

use object_store::ObjectStore;
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use oteldepot_proto::{
    FetchLogsDataRequest, FetchLogsDataResponse, FetchMetricsDataRequest,
    FetchMetricsDataResponse, FetchTracesDataRequest, FetchTracesDataResponse,
};

use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::cursor::{adjust_key, FetchCursor, KEY_LEN};
use crate::signal::SignalData;
use crate::storage::{
    create_object_store, floor_to_hour, random_string, SignalStorage, HOUR_NANOS,
};
use crate::DepotError;

/// Largest accepted page size, and the default when a request leaves the
/// limit unset.
pub const MAX_FETCH_LIMIT: i64 = 10_000;

/// Stores and serves OTLP signal batches on top of an object store.
///
/// The repository is created once per server start from validated storage
/// configuration and is safe to share across request tasks: the object store
/// client is the only shared state.
pub struct SignalRepository {
    storage: SignalStorage,
    cursor_key: [u8; KEY_LEN],
    clock: Arc<dyn Clock>,
}

/// One page produced by the fetch walk.
struct FetchPage<G> {
    groups: Vec<G>,
    next_cursor: String,
    has_more: bool,
}

/// What a completed walk found.
struct WalkOutcome<G> {
    groups: Vec<G>,
    /// True when the walk reached the end of the time range.
    exhausted: bool,
}

impl SignalRepository {
    /// Create a repository from validated storage configuration.
    pub fn new(config: &StorageConfig) -> Result<Self, DepotError> {
        let (store, prefix) = create_object_store(config)?;
        Ok(Self::with_store(
            store,
            prefix,
            config.gzip_enabled(),
            config.cursor_encryption_key.as_bytes(),
            Arc::new(SystemClock),
        ))
    }

    /// Create a repository over an explicit store, prefix, and clock.
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        prefix: String,
        gzip: bool,
        cursor_key_material: &[u8],
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage: SignalStorage::new(store, prefix, gzip),
            cursor_key: adjust_key(cursor_key_material),
            clock,
        }
    }

    pub async fn push_traces_data(&self, data: TracesData) -> Result<(), DepotError> {
        self.push(data).await
    }

    pub async fn push_metrics_data(&self, data: MetricsData) -> Result<(), DepotError> {
        self.push(data).await
    }

    pub async fn push_logs_data(&self, data: LogsData) -> Result<(), DepotError> {
        self.push(data).await
    }

    pub async fn fetch_traces_data(
        &self,
        request: &FetchTracesDataRequest,
    ) -> Result<FetchTracesDataResponse, DepotError> {
        let page = self
            .fetch::<TracesData>(
                request.start_time_unix_nano,
                request.end_time_unix_nano,
                request.limit,
                &request.cursor,
            )
            .await?;
        Ok(FetchTracesDataResponse {
            resource_spans: page.groups,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    pub async fn fetch_metrics_data(
        &self,
        request: &FetchMetricsDataRequest,
    ) -> Result<FetchMetricsDataResponse, DepotError> {
        let page = self
            .fetch::<MetricsData>(
                request.start_time_unix_nano,
                request.end_time_unix_nano,
                request.limit,
                &request.cursor,
            )
            .await?;
        Ok(FetchMetricsDataResponse {
            resource_metrics: page.groups,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    pub async fn fetch_logs_data(
        &self,
        request: &FetchLogsDataRequest,
    ) -> Result<FetchLogsDataResponse, DepotError> {
        let page = self
            .fetch::<LogsData>(
                request.start_time_unix_nano,
                request.end_time_unix_nano,
                request.limit,
                &request.cursor,
            )
            .await?;
        Ok(FetchLogsDataResponse {
            resource_logs: page.groups,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    /// Partition a batch by hour bucket and store one object per partition.
    ///
    /// The bucket timestamp of each resource group is chosen in order: first
    /// record start time, first record end/observed time, wall clock.
    /// Returns the first upload failure; objects already stored remain
    /// (at-least-once ingest, duplicate-tolerant readers).
    async fn push<S: SignalData>(&self, data: S) -> Result<(), DepotError> {
        let now = self.clock.now_unix_nano();

        let mut partitions: BTreeMap<String, Vec<S::Group>> = BTreeMap::new();
        for group in data.into_groups() {
            let bucket_ts = S::partition_timestamp(&group).unwrap_or(now);
            partitions
                .entry(crate::storage::partition_path(bucket_ts))
                .or_default()
                .push(group);
        }

        for (partition, groups) in partitions {
            let group_count = groups.len();
            tracing::debug!(
                signal = %S::KIND,
                partition = %partition,
                groups = group_count,
                "push signal data"
            );
            let body = serde_json::to_vec(&S::from_groups(groups))
                .map_err(|source| DepotError::JsonEncode { source })?;
            let key = self.storage.object_key(S::KIND, &partition, now);
            let stored = self.storage.put_json(&key, body).await?;
            tracing::info!(signal = %S::KIND, key = %stored, groups = group_count, "put object");
        }
        Ok(())
    }

    /// Serve one page of the time-range walk.
    async fn fetch<S: SignalData>(
        &self,
        start_time_unix_nano: u64,
        end_time_unix_nano: u64,
        limit: i64,
        cursor: &str,
    ) -> Result<FetchPage<S::Group>, DepotError> {
        let (mut start, end, limit) = validate_fetch_range(
            start_time_unix_nano,
            end_time_unix_nano,
            limit,
            self.clock.now_unix_nano(),
        )?;

        let mut state = if cursor.is_empty() {
            FetchCursor::default()
        } else {
            FetchCursor::decode(cursor, &self.cursor_key).map_err(|err| {
                let error_id = random_string(8);
                tracing::error!(error_id = %error_id, error = %err, "failed to decode cursor");
                DepotError::InvalidCursor { error_id }
            })?
        };
        if state.current_hour_unix_nano != 0 {
            start = state.current_hour_unix_nano;
        }

        tracing::info!(
            signal = %S::KIND,
            start_time_unix_nano = start,
            end_time_unix_nano = end,
            limit,
            offset = state.offset,
            "fetch signal data"
        );

        let outcome = match self.walk::<S>(start, end, limit, &mut state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let error_id = random_string(8);
                tracing::error!(
                    error_id = %error_id,
                    signal = %S::KIND,
                    error = %err,
                    "failed to fetch signal data"
                );
                return Err(DepotError::Internal { error_id });
            }
        };

        tracing::info!(
            signal = %S::KIND,
            num = outcome.groups.len(),
            limit,
            has_more = !outcome.exhausted,
            "fetched signal data"
        );

        if outcome.exhausted {
            return Ok(FetchPage {
                groups: outcome.groups,
                next_cursor: String::new(),
                has_more: false,
            });
        }
        let next_cursor = state.encode(&self.cursor_key).map_err(|err| {
            let error_id = random_string(8);
            tracing::error!(error_id = %error_id, error = %err, "failed to encode cursor");
            DepotError::Internal { error_id }
        })?;
        Ok(FetchPage {
            groups: outcome.groups,
            next_cursor,
            has_more: true,
        })
    }

    /// Walk hour prefixes in ascending order, collecting filtered resource
    /// groups until the limit fills or the range is exhausted.
    ///
    /// Invariant: when a page fills mid-object, `state.current_object_key`
    /// keeps pointing at the object *before* it and `state.offset` counts the
    /// groups already delivered from the split object, so the next walk
    /// re-lists the same object and skips the delivered prefix. When a page
    /// fills exactly at an object boundary, the walk keeps scanning: either
    /// the next non-empty object returns a zero-take page split there, or the
    /// range runs out and the page is terminal.
    async fn walk<S: SignalData>(
        &self,
        start: u64,
        end: u64,
        limit: usize,
        state: &mut FetchCursor,
    ) -> Result<WalkOutcome<S::Group>, DepotError> {
        let mut groups: Vec<S::Group> = Vec::new();
        let mut collected = 0usize;
        // Only the first hour resumes from the cursor's key; later hour
        // prefixes sort after it anyway.
        let mut start_after = state.current_object_key.clone();

        let mut hour = floor_to_hour(start);
        while hour <= end {
            let prefix = self.storage.hour_prefix(S::KIND, hour);
            tracing::debug!(prefix = %prefix, start_after = ?start_after, "list objects");

            for object in self.storage.list_after(&prefix, start_after.as_deref()).await? {
                let key = object.location.to_string();
                tracing::debug!(key = %key, "fetch object");

                let body = self.storage.get_body(&object.location).await?;
                let data: S = serde_json::from_slice(&body)
                    .map_err(|source| DepotError::JsonDecode { source })?;

                let mut filtered: Vec<S::Group> = data
                    .into_groups()
                    .into_iter()
                    .filter_map(|group| S::filter_in_range(group, start, end))
                    .collect();
                let total = filtered.len();

                if state.offset > 0 && state.offset < total {
                    filtered.drain(..state.offset);
                }

                if collected + filtered.len() > limit {
                    let take = limit - collected;
                    state.offset += take;
                    groups.extend(filtered.drain(..take));
                    tracing::debug!(
                        key = %key,
                        take,
                        offset = state.offset,
                        limit,
                        "limit reached inside object"
                    );
                    return Ok(WalkOutcome {
                        groups,
                        exhausted: false,
                    });
                }

                collected += filtered.len();
                groups.append(&mut filtered);
                state.current_hour_unix_nano = hour;
                state.current_object_key = Some(key);
                state.offset = 0;
            }

            start_after = None;
            match hour.checked_add(HOUR_NANOS) {
                Some(next) => hour = next,
                None => break,
            }
        }

        Ok(WalkOutcome {
            groups,
            exhausted: true,
        })
    }
}

/// Apply the fetch request validation rules, returning the effective
/// `(start, end, limit)`.
fn validate_fetch_range(
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    limit: i64,
    now_unix_nano: u64,
) -> Result<(u64, u64, usize), DepotError> {
    if start_time_unix_nano == 0 {
        return Err(DepotError::InvalidArgument(
            "start time is required".to_owned(),
        ));
    }
    let end = if end_time_unix_nano == 0 {
        now_unix_nano
    } else {
        end_time_unix_nano
    };
    if start_time_unix_nano > end {
        return Err(DepotError::InvalidArgument(
            "start time is after end time".to_owned(),
        ));
    }
    if limit < 0 {
        return Err(DepotError::InvalidArgument("limit is negative".to_owned()));
    }
    if limit > MAX_FETCH_LIMIT {
        return Err(DepotError::InvalidArgument("limit is too large".to_owned()));
    }
    let limit = if limit == 0 { MAX_FETCH_LIMIT } else { limit };
    Ok((start_time_unix_nano, end, limit as usize))
}
