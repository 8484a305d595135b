use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, env_parse, env_required};

/// Configuration for one named Redis connection.
///
/// Every field is optional when deserializing. Numeric settings use `0` for
/// "keep the client default". A non-empty `master_name` selects sentinel
/// mode, in which case `server` is ignored.
///
/// TLS material is PEM *content*, not a path. TLS is enabled only when
/// `ca_cert`, `cert_file` and `cert_key` are all non-empty.
///
/// # Example
///
/// ```ignore
/// use redis_registry::ConnectionConfig;
///
/// let config: ConnectionConfig = serde_json::from_str(r#"{
///     "master_name": "mymaster",
///     "sentinel_addrs": "10.0.0.1:26379,10.0.0.2:26379",
///     "dial_timeout": 5
/// }"#)?;
/// assert!(config.is_sentinel());
/// ```
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `host:port` of the server (direct mode)
    pub server: String,

    pub password: String,

    /// Database index selected after connecting
    pub db: i64,

    pub max_retries: u32,

    /// Seconds, 0 = default
    pub dial_timeout: u64,

    /// Seconds, 0 = default
    pub read_timeout: u64,

    /// Seconds, 0 = default
    pub write_timeout: u64,

    pub master_name: String,

    /// Comma-separated `host:port` list of sentinel nodes
    pub sentinel_addrs: String,

    pub sentinel_username: String,

    pub sentinel_password: String,

    /// CA certificate, PEM
    pub ca_cert: String,

    /// Client certificate, PEM
    pub cert_file: String,

    /// Client private key, PEM
    pub cert_key: String,
}

impl ConnectionConfig {
    /// Direct-mode config for `server`
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Sentinel-mode config for `master_name` behind `sentinel_addrs`
    pub fn sentinel(master_name: impl Into<String>, sentinel_addrs: impl Into<String>) -> Self {
        Self {
            master_name: master_name.into(),
            sentinel_addrs: sentinel_addrs.into(),
            ..Default::default()
        }
    }

    pub fn is_sentinel(&self) -> bool {
        !self.master_name.is_empty()
    }

    pub fn has_tls(&self) -> bool {
        !self.ca_cert.is_empty() && !self.cert_file.is_empty() && !self.cert_key.is_empty()
    }

    /// Human readable target for logs; never includes credentials
    pub fn target(&self) -> String {
        if self.is_sentinel() {
            format!("{}@{}", self.master_name, self.sentinel_addrs)
        } else {
            self.server.clone()
        }
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server", &self.server)
            .field("password", &redact(&self.password))
            .field("db", &self.db)
            .field("max_retries", &self.max_retries)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("master_name", &self.master_name)
            .field("sentinel_addrs", &self.sentinel_addrs)
            .field("sentinel_username", &self.sentinel_username)
            .field("sentinel_password", &redact(&self.sentinel_password))
            .field("tls", &self.has_tls())
            .finish()
    }
}

/// The full `name → config` mapping handed to
/// [`ConnectionRegistry::connect`](crate::ConnectionRegistry::connect).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ConnectionConfigs(pub HashMap<String, ConnectionConfig>);

impl ConnectionConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.0.insert(name.into(), config);
        self
    }

    pub fn into_inner(self) -> HashMap<String, ConnectionConfig> {
        self.0
    }
}

impl From<HashMap<String, ConnectionConfig>> for ConnectionConfigs {
    fn from(map: HashMap<String, ConnectionConfig>) -> Self {
        Self(map)
    }
}

impl IntoIterator for ConnectionConfigs {
    type Item = (String, ConnectionConfig);
    type IntoIter = std::collections::hash_map::IntoIter<String, ConnectionConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Load the connection mapping from environment variables
///
/// Environment variables:
/// - `REDIS_CONNECTIONS` - JSON object of `name → ConnectionConfig`; wins when set
/// - `REDIS_HOST` - `host:port` of a single connection registered as `default`
/// - `REDIS_PASSWORD` (optional) - password for the `default` connection
/// - `REDIS_DATABASE` (optional) - database index for the `default` connection
#[cfg(feature = "config")]
impl FromEnv for ConnectionConfigs {
    fn from_env() -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var("REDIS_CONNECTIONS") {
            return serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
                key: "REDIS_CONNECTIONS".to_string(),
                details: e.to_string(),
            });
        }

        let server = env_required("REDIS_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("REDIS_CONNECTIONS or REDIS_HOST".to_string()))?;

        let config = ConnectionConfig {
            server,
            password: std::env::var("REDIS_PASSWORD").unwrap_or_default(),
            db: env_parse("REDIS_DATABASE")?.unwrap_or_default(),
            ..Default::default()
        };

        Ok(Self::new().with(crate::DEFAULT_CONNECTION, config))
    }
}
