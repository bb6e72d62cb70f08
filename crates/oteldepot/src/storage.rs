//! Object store factory, partition layout, and the narrow storage adapter
//! the repository is written against.
//!
//! Signal batches are stored as hour-partitioned OTLP-JSON objects:
//!
//! ```text
//! <prefix>/<kind>/YYYY/MM/DD/HH/<leaf>-<yyyymmddhhmmss>-<rand8>.json[.gz]
//! ```
//!
//! The hour path components are rendered in local time. Retention is the
//! object store's concern: configure lifecycle rules on the bucket (for
//! example an S3 expiration rule per `traces/`, `metrics/`, `logs/` prefix)
//! rather than in the depot, which never deletes objects.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions};
use rand::distributions::Alphanumeric;
use rand::Rng;
use url::Url;

use crate::config::StorageConfig;
use crate::DepotError;

/// Telemetry signal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Trace spans.
    Traces,
    /// Metric data points.
    Metrics,
    /// Log records.
    Logs,
}

impl SignalKind {
    /// Get the string representation for use in object paths.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Metrics => "metrics",
            Self::Logs => "logs",
        }
    }

    /// Leaf name of stored object files for this kind.
    pub const fn leaf(&self) -> &'static str {
        match self {
            Self::Traces => "spans",
            Self::Metrics => "data-points",
            Self::Logs => "records",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub(crate) const HOUR_NANOS: u64 = 3_600_000_000_000;

/// Floor a nanosecond timestamp to its hour bucket.
pub(crate) const fn floor_to_hour(nanos: u64) -> u64 {
    nanos - nanos % HOUR_NANOS
}

/// Hour partition path component (`YYYY/MM/DD/HH`) for a timestamp, in
/// local time.
pub(crate) fn partition_path(nanos: u64) -> String {
    let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
    Local
        .timestamp_nanos(nanos)
        .format("%Y/%m/%d/%H")
        .to_string()
}

/// Writer timestamp component of object names (`yyyymmddhhmmss`), in local
/// time.
pub(crate) fn key_stamp(nanos: u64) -> String {
    let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
    Local.timestamp_nanos(nanos).format("%Y%m%d%H%M%S").to_string()
}

/// Random alphanumeric string, used for object key suffixes and error
/// correlation ids.
pub(crate) fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Create an object store and in-store path prefix from storage
/// configuration.
///
/// Supported location schemes: `s3://bucket/prefix` (AWS S3 and
/// S3-compatible services), `file:///path` and `memory://` for local runs
/// and tests.
///
/// # Errors
///
/// Returns an error if the location URL is malformed, its scheme is
/// unsupported, or the store cannot be created.
pub fn create_object_store(
    config: &StorageConfig,
) -> Result<(Arc<dyn ObjectStore>, String), DepotError> {
    let url = Url::parse(&config.location)?;
    match url.scheme() {
        "s3" => {
            let bucket = url
                .host_str()
                .ok_or_else(|| DepotError::Config("s3 bucket name is required".to_owned()))?;

            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(region) = &config.aws.region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &config.aws.endpoint {
                builder = builder.with_endpoint(endpoint);
                if endpoint.starts_with("http://") {
                    builder = builder.with_allow_http(true);
                }
            }
            if let Some(credentials) = &config.aws.credentials {
                builder = builder
                    .with_access_key_id(&credentials.access_key_id)
                    .with_secret_access_key(&credentials.secret_access_key);
                if let Some(token) = &credentials.session_token {
                    builder = builder.with_token(token);
                }
            }
            if config.aws.use_s3_path_style {
                builder = builder.with_virtual_hosted_style_request(false);
            }

            let store = builder.build()?;
            Ok((Arc::new(store), url.path().trim_matches('/').to_owned()))
        }
        "file" => {
            let path = url.path();
            std::fs::create_dir_all(path)?;
            let store = LocalFileSystem::new_with_prefix(path)?;
            Ok((Arc::new(store), String::new()))
        }
        "memory" => Ok((
            Arc::new(InMemory::new()),
            url.path().trim_matches('/').to_owned(),
        )),
        other => Err(DepotError::Config(format!(
            "unsupported location scheme {other}"
        ))),
    }
}

/// The storage capability the repository needs: put an OTLP-JSON object,
/// list a prefix strictly after a key, and read an object back.
#[derive(Clone)]
pub(crate) struct SignalStorage {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    gzip: bool,
}

impl SignalStorage {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: String, gzip: bool) -> Self {
        Self {
            store,
            prefix,
            gzip,
        }
    }

    /// Listing prefix for one hour bucket of a signal kind.
    pub fn hour_prefix(&self, kind: SignalKind, hour_nanos: u64) -> String {
        let partition = partition_path(hour_nanos);
        if self.prefix.is_empty() {
            format!("{}/{}", kind.as_str(), partition)
        } else {
            format!("{}/{}/{}", self.prefix, kind.as_str(), partition)
        }
    }

    /// Object key for a new stored object, without the compression suffix.
    pub fn object_key(&self, kind: SignalKind, partition: &str, now_nanos: u64) -> String {
        let name = format!(
            "{}-{}-{}.json",
            kind.leaf(),
            key_stamp(now_nanos),
            random_string(8)
        );
        if self.prefix.is_empty() {
            format!("{}/{}/{}", kind.as_str(), partition, name)
        } else {
            format!("{}/{}/{}/{}", self.prefix, kind.as_str(), partition, name)
        }
    }

    /// Store a JSON body under the given key, gzip-compressing when enabled
    /// (appending `.gz` and tagging `Content-Encoding: gzip`). Returns the
    /// final object path.
    pub async fn put_json(&self, key: &str, body: Vec<u8>) -> Result<String, DepotError> {
        let mut key = key.to_owned();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, "application/json".into());

        let payload = if self.gzip {
            key.push_str(".gz");
            attributes.insert(Attribute::ContentEncoding, "gzip".into());
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            encoder.finish()?
        } else {
            body
        };

        let path = Path::from(key.as_str());
        self.store
            .put_opts(
                &path,
                payload.into(),
                PutOptions {
                    attributes,
                    ..Default::default()
                },
            )
            .await?;
        Ok(path.to_string())
    }

    /// List the objects under a prefix, in lexicographic key order, strictly
    /// after `start_after` when given.
    ///
    /// The underlying trait does not guarantee listing order on every
    /// backend, so the bounded per-hour page is collected and sorted here;
    /// the strictly-after contract is what makes cursors resumable.
    pub async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
    ) -> Result<Vec<ObjectMeta>, DepotError> {
        let prefix = Path::from(prefix);
        let mut objects: Vec<ObjectMeta> = match start_after {
            Some(offset) => {
                let offset = Path::from(offset);
                self.store
                    .list_with_offset(Some(&prefix), &offset)
                    .try_collect()
                    .await?
            }
            None => self.store.list(Some(&prefix)).try_collect().await?,
        };
        objects.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(objects)
    }

    /// Read an object body, transparently decompressing gzip payloads.
    ///
    /// Detection is by the gzip magic header rather than object metadata, so
    /// stores that do not round-trip attributes still read correctly.
    pub async fn get_body(&self, location: &Path) -> Result<Vec<u8>, DepotError> {
        let bytes = self.store.get(location).await?.bytes().await?;
        if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
            let mut decoder = GzDecoder::new(bytes.as_ref());
            let mut body = Vec::new();
            decoder.read_to_end(&mut body)?;
            Ok(body)
        } else {
            Ok(bytes.to_vec())
        }
    }
}
