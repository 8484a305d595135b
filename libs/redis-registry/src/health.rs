use std::time::{Duration, Instant};

use redis::aio::ConnectionLike;
use tracing::debug;

use crate::client::ManagedConnection;
use crate::error::{RegistryError, RegistryResult};

/// Liveness probe: `PING` must answer `PONG`.
///
/// # Example
/// ```ignore
/// use redis_registry::check_health;
///
/// let mut conn = client.get_multiplexed_async_connection().await?;
/// check_health(&mut conn).await?;
/// ```
pub async fn check_health<C>(conn: &mut C) -> RegistryResult<()>
where
    C: ConnectionLike + Send,
{
    debug!("Running Redis health check");

    let response: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(|e| RegistryError::HealthCheckFailed(e.to_string()))?;

    if response != "PONG" {
        return Err(RegistryError::HealthCheckFailed(format!(
            "PING returned unexpected response: {}",
            response
        )));
    }

    debug!("Redis health check passed");
    Ok(())
}

/// Health check result for detailed status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,

    /// Error message when unhealthy
    pub message: Option<String>,

    pub response_time_ms: u64,
}

impl HealthStatus {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            message: None,
            response_time_ms,
        }
    }

    pub fn unhealthy(message: String, response_time_ms: u64) -> Self {
        Self {
            healthy: false,
            message: Some(message),
            response_time_ms,
        }
    }
}

/// Probe `client` and report the outcome with its response time
pub async fn check_health_detailed<C>(client: &C) -> HealthStatus
where
    C: ManagedConnection + ?Sized,
{
    let start = Instant::now();
    let result = client.ping().await;
    let elapsed = elapsed_millis(start.elapsed());

    match result {
        Ok(()) => HealthStatus::healthy(elapsed),
        Err(e) => HealthStatus::unhealthy(e.to_string(), elapsed),
    }
}

fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
