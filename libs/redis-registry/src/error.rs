use std::time::Duration;

/// Errors raised while building, probing or looking up named connections
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Client certificate and key could not be loaded as a pair
    #[error("Unable to load key pair: {0}")]
    InvalidKeyPair(String),

    /// CA content did not yield a single usable certificate
    #[error("failed to parse root certificate: {0}")]
    InvalidCaCertificate(String),

    /// rustls rejected the assembled client configuration
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Address or sentinel list cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No handle registered under the requested name
    #[error("the redis client `{0}` is not configured")]
    NotConfigured(String),

    /// One or more connections of a batch failed their liveness probe
    #[error("[redis] {}", .failures.join("\n"))]
    ProbeFailed { failures: Vec<String> },

    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The handle was replaced and closed
    #[error("the redis client for `{0}` has been closed")]
    ClientClosed(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RegistryError {
    /// Configuration problems that should stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidKeyPair(_)
                | RegistryError::InvalidCaCertificate(_)
                | RegistryError::Tls(_)
                | RegistryError::InvalidConfig(_)
                | RegistryError::NotConfigured(_)
                | RegistryError::ProbeFailed { .. }
        )
    }
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
