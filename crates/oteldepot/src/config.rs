//! Server configuration.
//!
//! Configuration is a TOML document merged with `OTELDEPOT_`-prefixed
//! environment variables (double underscore as the section separator).
//! Unknown keys are rejected. Enable flags cascade: a listener that does not
//! set `enable` inherits its section's flag, then the built-in default.

use std::net::SocketAddr;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer};

use crate::DepotError;

/// Default access key header name.
pub const DEFAULT_ACCESS_KEY_HEADER: &str = "Oteleport-Access-Key";

/// Default OTLP gRPC listen address (OpenTelemetry standard port).
pub const DEFAULT_OTLP_GRPC_ADDRESS: &str = "0.0.0.0:4317";

/// Default OTLP HTTP listen address (OpenTelemetry standard port).
pub const DEFAULT_OTLP_HTTP_ADDRESS: &str = "0.0.0.0:4318";

/// Default fetch API listen address.
pub const DEFAULT_API_HTTP_ADDRESS: &str = "0.0.0.0:8080";

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Header carrying the access key on both OTLP and API requests.
    pub access_key_header: String,
    /// Accepted access keys. Empty disables authentication.
    pub access_keys: Vec<AccessKeyConfig>,
    pub storage: StorageConfig,
    pub otlp: OtlpConfig,
    pub api: ApiConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            access_key_header: DEFAULT_ACCESS_KEY_HEADER.to_owned(),
            access_keys: Vec::new(),
            storage: StorageConfig::default(),
            otlp: OtlpConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from a TOML file merged with
    /// `OTELDEPOT_` environment variables.
    pub fn load(path: &str) -> Result<Self, DepotError> {
        let mut config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("OTELDEPOT_").split("__"))
            .extract()
            .map_err(|err| DepotError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether request authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        !self.access_keys.is_empty()
    }

    /// Validate the configuration, resolving cascaded enable flags and
    /// defaulted key ids in place.
    pub fn validate(&mut self) -> Result<(), DepotError> {
        self.storage
            .validate()
            .map_err(|err| DepotError::Config(format!("storage: {err}")))?;
        self.otlp.resolve_enables();
        self.api.resolve_enables();
        self.otlp
            .validate()
            .map_err(|err| DepotError::Config(format!("otlp: {err}")))?;
        self.api
            .validate()
            .map_err(|err| DepotError::Config(format!("api: {err}")))?;

        let mut seen = std::collections::HashMap::new();
        for (index, key) in self.access_keys.iter_mut().enumerate() {
            if key.key_id.is_empty() {
                key.key_id = format!("key{index}");
            }
            if let Some(previous) = seen.insert(key.key_id.clone(), index) {
                return Err(DepotError::Config(format!(
                    "duplicate access key id: index {previous} and {index}"
                )));
            }
            if key.secret_key.is_empty() {
                return Err(DepotError::Config(format!(
                    "access secret key index={index} is empty"
                )));
            }
        }
        Ok(())
    }
}

/// One accepted access key.
///
/// In configuration an entry is either a table with `key_id`/`secret_key` or
/// a bare secret string; ids left empty are assigned `key<index>` during
/// validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessKeyConfig {
    pub key_id: String,
    pub secret_key: String,
}

impl<'de> Deserialize<'de> for AccessKeyConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Entry {
                #[serde(default)]
                key_id: String,
                #[serde(default)]
                secret_key: String,
            },
            Secret(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Entry { key_id, secret_key } => Self { key_id, secret_key },
            Repr::Secret(secret_key) => Self {
                key_id: String::new(),
                secret_key,
            },
        })
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Key material for cursor encryption; fitted to 32 bytes.
    pub cursor_encryption_key: String,
    /// Gzip-compress stored objects. Default true.
    pub gzip: Option<bool>,
    /// Reserved; accepted but not observable in the ingest/fetch paths.
    pub flatten: Option<bool>,
    /// Object store location URL: `s3://bucket/prefix`, `file:///path`, or
    /// `memory://` (tests). Required.
    pub location: String,
    pub aws: StorageAwsConfig,
}

impl StorageConfig {
    pub fn gzip_enabled(&self) -> bool {
        self.gzip.unwrap_or(true)
    }

    pub fn flatten_enabled(&self) -> bool {
        self.flatten.unwrap_or(false)
    }

    fn validate(&mut self) -> Result<(), String> {
        if self.cursor_encryption_key.is_empty() {
            return Err("cursor_encryption_key is required".to_owned());
        }
        if self.location.is_empty() {
            return Err("location is required".to_owned());
        }
        let url = url::Url::parse(&self.location).map_err(|err| err.to_string())?;
        match url.scheme() {
            "s3" => {
                if url.host_str().is_none() {
                    return Err("s3 bucket name is required".to_owned());
                }
            }
            "file" | "memory" => {}
            other => return Err(format!("unsupported location scheme {other}")),
        }
        if self.gzip.is_none() {
            self.gzip = Some(true);
        }
        if self.flatten.is_none() {
            self.flatten = Some(false);
        }
        Ok(())
    }
}

/// AWS client options for `s3://` locations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageAwsConfig {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    pub use_s3_path_style: bool,
    /// Static credentials; when absent the SDK's environment chain applies.
    pub credentials: Option<StorageAwsCredentialsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageAwsCredentialsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// OTLP ingress listeners.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtlpConfig {
    /// Section-wide enable flag listeners inherit when unset.
    pub enable: Option<bool>,
    pub grpc: ListenerConfig,
    pub http: ListenerConfig,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            enable: None,
            grpc: ListenerConfig::with_address(DEFAULT_OTLP_GRPC_ADDRESS),
            http: ListenerConfig::with_address(DEFAULT_OTLP_HTTP_ADDRESS),
        }
    }
}

impl OtlpConfig {
    fn resolve_enables(&mut self) {
        self.grpc.resolve_enable(self.enable, true);
        self.http.resolve_enable(self.enable, false);
    }

    fn validate(&self) -> Result<(), String> {
        self.grpc.validate().map_err(|err| format!("grpc: {err}"))?;
        self.http.validate().map_err(|err| format!("http: {err}"))?;
        Ok(())
    }

    pub fn grpc_enabled(&self) -> bool {
        self.grpc.enable.unwrap_or(true)
    }

    pub fn http_enabled(&self) -> bool {
        self.http.enable.unwrap_or(false)
    }
}

/// Fetch API listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Section-wide enable flag the listener inherits when unset.
    pub enable: Option<bool>,
    pub http: ListenerConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable: None,
            http: ListenerConfig::with_address(DEFAULT_API_HTTP_ADDRESS),
        }
    }
}

impl ApiConfig {
    fn resolve_enables(&mut self) {
        self.http.resolve_enable(self.enable, true);
    }

    fn validate(&self) -> Result<(), String> {
        self.http.validate().map_err(|err| format!("http: {err}"))
    }

    pub fn http_enabled(&self) -> bool {
        self.http.enable.unwrap_or(true)
    }
}

/// One network listener.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    pub enable: Option<bool>,
    pub address: String,
}

impl ListenerConfig {
    fn with_address(address: &str) -> Self {
        Self {
            enable: None,
            address: address.to_owned(),
        }
    }

    fn resolve_enable(&mut self, parent: Option<bool>, default: bool) {
        if self.enable.is_none() {
            self.enable = Some(parent.unwrap_or(default));
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.enable == Some(true) {
            if self.address.is_empty() {
                return Err("address is required".to_owned());
            }
            self.address
                .parse::<SocketAddr>()
                .map_err(|err| format!("invalid address {}: {err}", self.address))?;
        }
        Ok(())
    }

    /// Parsed socket address; callers check `enable` first.
    pub fn socket_addr(&self) -> Result<SocketAddr, DepotError> {
        self.address
            .parse()
            .map_err(|err| DepotError::Config(format!("invalid address {}: {err}", self.address)))
    }
}
