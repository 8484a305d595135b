use crate::client::{RedisClient, open, open_sentinel};
use crate::config::ConnectionConfig;
use crate::error::RegistryResult;
use crate::options::{non_empty, override_retries, override_seconds, split_sentinel_addrs};
use crate::tls::TlsSettings;

/// Build an unconnected handle for one connection config.
///
/// A non-empty `master_name` selects sentinel mode regardless of `server`.
/// Retry and timeout settings only override the defaults when positive.
/// TLS is attached in both modes when all three PEM fields are present.
///
/// # Errors
///
/// Malformed TLS material ([`InvalidKeyPair`], [`InvalidCaCertificate`]) or
/// an unusable address ([`InvalidConfig`]).
///
/// [`InvalidKeyPair`]: crate::RegistryError::InvalidKeyPair
/// [`InvalidCaCertificate`]: crate::RegistryError::InvalidCaCertificate
/// [`InvalidConfig`]: crate::RegistryError::InvalidConfig
pub fn new_client(config: &ConnectionConfig) -> RegistryResult<RedisClient> {
    let tls = TlsSettings::from_config(config)?;

    if config.is_sentinel() {
        return open_sentinel(|options| {
            options.master_name = config.master_name.clone();
            options.sentinel_addrs = split_sentinel_addrs(&config.sentinel_addrs);
            options.sentinel_username = non_empty(&config.sentinel_username);
            options.sentinel_password = non_empty(&config.sentinel_password);
            options.password = non_empty(&config.password);
            options.db = config.db;

            override_retries(&mut options.max_retries, config.max_retries);
            override_seconds(&mut options.dial_timeout, config.dial_timeout);
            override_seconds(&mut options.read_timeout, config.read_timeout);
            override_seconds(&mut options.write_timeout, config.write_timeout);

            options.tls = tls;
        });
    }

    open(&config.server, |options| {
        options.password = non_empty(&config.password);
        options.db = config.db;

        override_retries(&mut options.max_retries, config.max_retries);
        override_seconds(&mut options.dial_timeout, config.dial_timeout);
        override_seconds(&mut options.read_timeout, config.read_timeout);
        override_seconds(&mut options.write_timeout, config.write_timeout);

        options.tls = tls;
    })
}
