//! Client for the oteldepot fetch API.
//!
//! [`Client`] posts protobuf fetch requests to the depot's REST endpoints
//! and decodes responses by their returned content type; non-2xx responses
//! carry a `google.rpc.Status` envelope that surfaces as
//! [`ClientError::Api`]. [`Paginator`] chains pages through the opaque
//! cursor until the range is exhausted.

mod duration;
mod paginator;

pub use duration::parse_duration;
pub use paginator::{Fetchable, Paginator};

use figment::providers::{Format, Toml};
use figment::Figment;
use oteldepot_proto::{
    code_name, FetchLogsDataRequest, FetchLogsDataResponse, FetchMetricsDataRequest,
    FetchMetricsDataResponse, FetchTracesDataRequest, FetchTracesDataResponse,
    Status as StatusProto,
};
use prost::Message;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

/// Default depot endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

/// Default access key header name.
pub const DEFAULT_ACCESS_KEY_HEADER: &str = "Oteleport-Access-Key";

/// Errors surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Profile or endpoint configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not decode.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Response carried an unknown content type.
    #[error("unsupported content type {0}")]
    UnsupportedContentType(String),

    /// The server answered with an error Status envelope.
    #[error("fetch failed: code={}, message={}", code_name(*.code), .message)]
    Api { code: i32, message: String },

    /// The paginator was advanced past its last page.
    #[error("no more pages available")]
    NoMorePages,
}

/// Connection profile for a depot endpoint.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub endpoint: String,
    pub access_key: String,
    pub access_key_header: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            access_key: String::new(),
            access_key_header: DEFAULT_ACCESS_KEY_HEADER.to_owned(),
        }
    }
}

impl Profile {
    /// Load a profile from a TOML file, keeping defaults for absent keys.
    pub fn load(path: &str) -> Result<Self, ClientError> {
        let profile: Self = Figment::from(figment::providers::Serialized::defaults(
            Self::default(),
        ))
        .merge(Toml::file(path))
        .extract()
        .map_err(|err| ClientError::Config(err.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.is_empty() {
            return Err(ClientError::Config("endpoint is required".to_owned()));
        }
        if !self.access_key.is_empty() && self.access_key_header.is_empty() {
            return Err(ClientError::Config(
                "access_key_header is required".to_owned(),
            ));
        }
        Ok(())
    }
}

/// HTTP client for the depot fetch API.
pub struct Client {
    profile: Profile,
    endpoint: Url,
    http: reqwest::Client,
}

impl Client {
    pub fn new(profile: Profile) -> Result<Self, ClientError> {
        profile.validate()?;
        let endpoint = Url::parse(&profile.endpoint)
            .map_err(|err| ClientError::Config(format!("failed to parse endpoint url: {err}")))?;
        Ok(Self {
            profile,
            endpoint,
            http: reqwest::Client::new(),
        })
    }

    pub async fn fetch_traces_data(
        &self,
        request: &FetchTracesDataRequest,
    ) -> Result<FetchTracesDataResponse, ClientError> {
        self.call("/api/traces/fetch", request).await
    }

    pub async fn fetch_metrics_data(
        &self,
        request: &FetchMetricsDataRequest,
    ) -> Result<FetchMetricsDataResponse, ClientError> {
        self.call("/api/metrics/fetch", request).await
    }

    pub async fn fetch_logs_data(
        &self,
        request: &FetchLogsDataRequest,
    ) -> Result<FetchLogsDataResponse, ClientError> {
        self.call("/api/logs/fetch", request).await
    }

    async fn call<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message + Default + DeserializeOwned,
    {
        let url = format!(
            "{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut http_request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-protobuf")
            .body(request.encode_to_vec());
        if !self.profile.access_key.is_empty() {
            http_request = http_request.header(
                self.profile.access_key_header.as_str(),
                self.profile.access_key.as_str(),
            );
        }

        let response = http_request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_owned();
        let body = response.bytes().await?;

        if !status.is_success() {
            let envelope: StatusProto =
                decode_body(&content_type, &body).map_err(|err| {
                    tracing::warn!(error = %err, "failed to decode error response body");
                    ClientError::Api {
                        code: oteldepot_proto::code::UNKNOWN,
                        message: format!("status code {status}"),
                    }
                })?;
            return Err(ClientError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        decode_body(&content_type, &body)
    }
}

fn decode_body<T>(content_type: &str, body: &[u8]) -> Result<T, ClientError>
where
    T: Message + Default + DeserializeOwned,
{
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    match media_type {
        "application/x-protobuf" | "application/protobuf" => {
            T::decode(body).map_err(|err| ClientError::Decode(err.to_string()))
        }
        "application/json" => {
            serde_json::from_slice(body).map_err(|err| ClientError::Decode(err.to_string()))
        }
        other => Err(ClientError::UnsupportedContentType(other.to_owned())),
    }
}
