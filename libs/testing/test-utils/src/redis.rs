//! Redis test infrastructure
//!
//! Provides a `TestRedis` helper that creates a Redis container for testing.

use redis::Client;
use redis::aio::MultiplexedConnection;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Redis container that is stopped and removed on drop.
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    host_port: u16,
}

impl TestRedis {
    /// Start a Redis 8 Alpine container and wait until it is reachable.
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            host_port,
        }
    }

    /// `host:port` form, as used in connection configs
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.host_port)
    }

    /// `redis://` URL form
    pub fn connection_string(&self) -> String {
        format!("redis://{}", self.address())
    }

    /// Independent connection for asserting on server state
    pub async fn connection(&self) -> MultiplexedConnection {
        Client::open(self.connection_string())
            .expect("Failed to create Redis client")
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis")
    }
}

impl Drop for TestRedis {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Redis container");
    }
}
