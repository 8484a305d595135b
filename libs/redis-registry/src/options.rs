//! Option sets for direct and sentinel clients.
//!
//! [`open`](crate::open) and [`open_sentinel`](crate::open_sentinel) start
//! from the defaults below and hand the options to a caller-supplied
//! closure before building the client.

use std::time::Duration;

use crate::error::{RegistryError, RegistryResult};
use crate::tls::TlsSettings;

/// Default time allowed to establish a connection
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed to read a reply
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Default time allowed to write a command
pub const DEFAULT_WRITE_TIMEOUT: Duration = DEFAULT_READ_TIMEOUT;

/// Options for a client talking straight to one server
#[derive(Clone, Debug)]
pub struct Options {
    /// `host:port`
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
    /// Reconnect attempts; `None` keeps the connection manager's default
    pub max_retries: Option<usize>,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub tls: Option<TlsSettings>,
}

impl Options {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            db: 0,
            max_retries: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            tls: None,
        }
    }

    /// Connection URL understood by `redis::Client::open`.
    ///
    /// The password is percent-encoded; `rediss://` is used when TLS is set.
    pub fn connection_url(&self) -> RegistryResult<String> {
        let (host, port) = parse_addr(&self.addr)?;
        let scheme = if self.tls.is_some() { "rediss" } else { "redis" };
        let auth = match &self.password {
            Some(password) => format!(":{}@", urlencoding::encode(password)),
            None => String::new(),
        };
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        Ok(format!("{scheme}://{auth}{host}:{port}/{}", self.db))
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new("127.0.0.1:6379")
    }
}

/// Options for a client that discovers the primary through sentinels
#[derive(Clone, Debug)]
pub struct FailoverOptions {
    pub master_name: String,
    /// Ordered `host:port` sentinel endpoints
    pub sentinel_addrs: Vec<String>,
    pub sentinel_username: Option<String>,
    pub sentinel_password: Option<String>,
    pub password: Option<String>,
    pub db: i64,
    pub max_retries: Option<usize>,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub tls: Option<TlsSettings>,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            master_name: String::new(),
            sentinel_addrs: Vec::new(),
            sentinel_username: None,
            sentinel_password: None,
            password: None,
            db: 0,
            max_retries: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            tls: None,
        }
    }
}

impl FailoverOptions {
    /// Sentinel endpoints as `(host, port)` pairs, in configured order
    pub fn sentinel_endpoints(&self) -> RegistryResult<Vec<(String, u16)>> {
        if self.sentinel_addrs.is_empty() {
            return Err(RegistryError::InvalidConfig(format!(
                "no sentinel addresses configured for master `{}`",
                self.master_name
            )));
        }

        self.sentinel_addrs.iter().map(|addr| parse_addr(addr)).collect()
    }
}

/// Split a comma-separated sentinel list into endpoints.
///
/// Order is preserved; whitespace around entries is trimmed and empty
/// entries are dropped.
pub fn split_sentinel_addrs(addrs: &str) -> Vec<String> {
    addrs
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

/// Overwrite `target` only when `seconds` is positive
pub(crate) fn override_seconds(target: &mut Duration, seconds: u64) {
    if seconds > 0 {
        *target = Duration::from_secs(seconds);
    }
}

/// Overwrite `target` only when `retries` is positive
pub(crate) fn override_retries(target: &mut Option<usize>, retries: u32) {
    if retries > 0 {
        *target = Some(retries as usize);
    }
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse `host:port`, accepting bracketed IPv6 literals.
pub(crate) fn parse_addr(addr: &str) -> RegistryResult<(String, u16)> {
    let invalid = || RegistryError::InvalidConfig(format!("invalid address `{}`", addr));

    let (host, port) = addr.trim().rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok((host.to_string(), port))
}
