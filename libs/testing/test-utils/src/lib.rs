//! Shared test utilities for the Redis connection registry
//!
//! - `TestRedis`: Redis container with automatic cleanup
//! - `unreachable_address`: a local `host:port` nothing listens on
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::TestRedis;
//!
//! #[tokio::test]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let config = ConnectionConfig::new(redis.address());
//! }
//! ```

mod redis;

pub use redis::TestRedis;

use std::net::TcpListener;

/// `127.0.0.1:<port>` of a port that was free a moment ago.
///
/// Connecting to it is refused straight away, which makes it a fast
/// stand-in for a dead Redis target.
pub fn unreachable_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
    let port = listener
        .local_addr()
        .expect("Failed to read ephemeral port")
        .port();
    drop(listener);
    format!("127.0.0.1:{}", port)
}
