//! Named Redis connections for direct and sentinel deployments
//!
//! Application config hands this crate a `name → ConnectionConfig` mapping.
//! The registry builds one client per entry, checks it with a `PING`, and
//! keeps it under its name for lookup by the rest of the application.
//!
//! # Features
//!
//! - `config` - load the mapping from environment variables with
//!   `core_config::FromEnv`
//!
//! # Examples
//!
//! ## Registry
//!
//! ```ignore
//! use redis_registry::{ConnectionConfig, ConnectionConfigs, ConnectionRegistry};
//!
//! let configs = ConnectionConfigs::new()
//!     .with("default", ConnectionConfig::new("127.0.0.1:6379"))
//!     .with("sessions", ConnectionConfig::sentinel("mymaster", "10.0.0.1:26379,10.0.0.2:26379"));
//!
//! let registry = ConnectionRegistry::new();
//! if let Err(e) = registry.connect(configs).await {
//!     // every unreachable name is listed, one per line
//!     eprintln!("{e}");
//!     std::process::exit(1);
//! }
//!
//! let sessions = registry.client("sessions").await?;
//! ```
//!
//! ## Standalone clients
//!
//! ```ignore
//! let client = redis_registry::open("127.0.0.1:6379", |options| options.db = 1)?;
//! client.ping().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod health;
pub mod options;
pub mod registry;
pub mod tls;

pub use client::{ClientMode, ManagedConnection, RedisClient, open, open_sentinel};
pub use config::{ConnectionConfig, ConnectionConfigs};
pub use error::{RegistryError, RegistryResult};
pub use factory::new_client;
pub use health::{HealthStatus, check_health, check_health_detailed};
pub use options::{FailoverOptions, Options, split_sentinel_addrs};
pub use registry::{ConnectionRegistry, DEFAULT_CONNECTION};
pub use tls::{ClientAuth, TlsSettings, TlsVersion};

// Re-export redis types for convenience
pub use redis::AsyncCommands;
pub use redis::aio::ConnectionManager;
