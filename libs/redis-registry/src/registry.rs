use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::client::{ManagedConnection, RedisClient};
use crate::config::ConnectionConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::factory::new_client;
use crate::health::{HealthStatus, check_health_detailed};

/// Name used by [`ConnectionRegistry::default_client`]
pub const DEFAULT_CONNECTION: &str = "default";

/// Named, probed Redis handles.
///
/// Build one at startup with [`connect`](ConnectionRegistry::connect) and
/// share it (it is cheap to clone). Readers always see either the previous
/// handle for a name or the fully probed replacement.
///
/// # Example
/// ```ignore
/// use redis_registry::{ConnectionConfig, ConnectionRegistry};
///
/// let registry = ConnectionRegistry::new();
/// registry
///     .connect([("default".to_string(), ConnectionConfig::new("127.0.0.1:6379"))])
///     .await?;
///
/// let client = registry.default_client().await?;
/// let mut conn = client.connection_manager().await?;
/// ```
pub struct ConnectionRegistry<C = RedisClient> {
    clients: Arc<RwLock<HashMap<String, Arc<C>>>>,
}

impl<C> Clone for ConnectionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            clients: Arc::clone(&self.clients),
        }
    }
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl ConnectionRegistry<RedisClient> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build, probe and install a handle for every entry of `configs`.
    ///
    /// Every entry is attempted even after a failed probe. If any probe
    /// failed, [`RegistryError::ProbeFailed`] lists each failure (one per
    /// line) while the healthy entries stay installed. Entries whose client
    /// cannot be built are reported the same way. Invalid TLS material
    /// aborts the batch immediately.
    pub async fn connect<I>(&self, configs: I) -> RegistryResult<()>
    where
        I: IntoIterator<Item = (String, ConnectionConfig)>,
    {
        self.connect_with(configs, |_, config| new_client(config))
            .await
    }
}

impl<C: ManagedConnection> ConnectionRegistry<C> {
    /// [`connect`](ConnectionRegistry::connect) with a caller-supplied
    /// factory producing the handle for each `(name, config)`.
    #[instrument(skip_all)]
    pub async fn connect_with<I, F>(&self, configs: I, mut factory: F) -> RegistryResult<()>
    where
        I: IntoIterator<Item = (String, ConnectionConfig)>,
        F: FnMut(&str, &ConnectionConfig) -> RegistryResult<C>,
    {
        let mut failures = Vec::new();

        for (name, config) in configs {
            info!(name = %name, target = %config.target(), "Connecting to Redis");

            let client = match factory(&name, &config) {
                Ok(client) => client,
                Err(e) if aborts_batch(&e) => return Err(e),
                Err(e) => {
                    warn!(name = %name, target = %config.target(), error = %e, "Redis client could not be built");
                    failures.push(format!("{}: {}", name, e));
                    continue;
                }
            };

            if let Err(e) = client.ping().await {
                warn!(name = %name, target = %config.target(), error = %e, "Redis liveness probe failed");
                failures.push(format!("{}: {}", name, e));
                continue;
            }

            self.install(name, client).await;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort();
            Err(RegistryError::ProbeFailed { failures })
        }
    }

    /// Publish `client` under `name`, closing whatever it replaces.
    async fn install(&self, name: String, client: C) {
        let previous = {
            let mut clients = self.clients.write().await;
            clients.insert(name.clone(), Arc::new(client))
        };

        match previous {
            Some(old) => {
                old.close().await;
                info!(name = %name, "Replaced Redis client");
            }
            None => info!(name = %name, "Registered Redis client"),
        }
    }

    /// Handle registered under `name`
    pub async fn client(&self, name: &str) -> RegistryResult<Arc<C>> {
        self.clients
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotConfigured(name.to_string()))
    }

    /// Handle registered under [`DEFAULT_CONNECTION`]
    pub async fn default_client(&self) -> RegistryResult<Arc<C>> {
        self.client(DEFAULT_CONNECTION).await
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.clients.read().await.contains_key(name)
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Probe every registered handle.
    ///
    /// The read lock is released before probing so a slow target does not
    /// block lookups.
    pub async fn health(&self) -> BTreeMap<String, HealthStatus> {
        let snapshot: Vec<(String, Arc<C>)> = self
            .clients
            .read()
            .await
            .iter()
            .map(|(name, client)| (name.clone(), Arc::clone(client)))
            .collect();

        let mut statuses = BTreeMap::new();
        for (name, client) in snapshot {
            statuses.insert(name, check_health_detailed(client.as_ref()).await);
        }
        statuses
    }
}

/// Malformed TLS material stops a batch; every other build error is
/// reported with the probe failures.
fn aborts_batch(error: &RegistryError) -> bool {
    matches!(
        error,
        RegistryError::InvalidKeyPair(_)
            | RegistryError::InvalidCaCertificate(_)
            | RegistryError::Tls(_)
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::client::MockManagedConnection;

    fn reachable() -> MockManagedConnection {
        let mut client = MockManagedConnection::new();
        client.expect_ping().returning(|| Ok(()));
        client
    }

    fn unreachable() -> MockManagedConnection {
        let mut client = MockManagedConnection::new();
        client
            .expect_ping()
            .returning(|| Err(RegistryError::HealthCheckFailed("connection refused".to_string())));
        client.expect_close().never();
        client
    }

    fn configs(entries: &[(&str, &str)]) -> HashMap<String, ConnectionConfig> {
        entries
            .iter()
            .map(|(name, server)| (name.to_string(), ConnectionConfig::new(*server)))
            .collect()
    }

    fn by_server(_: &str, config: &ConnectionConfig) -> RegistryResult<MockManagedConnection> {
        if config.server.starts_with("up") {
            Ok(reachable())
        } else {
            Ok(unreachable())
        }
    }

    #[tokio::test]
    async fn test_connect_installs_all_reachable() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();

        registry
            .connect_with(configs(&[("default", "up:1"), ("cache", "up:2")]), by_server)
            .await
            .unwrap();

        assert_eq!(registry.names().await, vec!["cache", "default"]);
        assert_eq!(registry.len().await, 2);
        assert!(registry.default_client().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_reports_unreachable_and_keeps_reachable() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();

        let err = registry
            .connect_with(configs(&[("good", "up:1"), ("bad", "down:1")]), by_server)
            .await
            .unwrap_err();

        match &err {
            RegistryError::ProbeFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("bad: "));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("connection refused"));
        assert!(registry.contains("good").await);
        assert!(!registry.contains("bad").await);
    }

    #[tokio::test]
    async fn test_connect_attempts_every_entry() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();
        let mut attempts = 0;

        let err = registry
            .connect_with(
                configs(&[("a", "down:1"), ("b", "down:2"), ("c", "up:3")]),
                |name, config| {
                    attempts += 1;
                    by_server(name, config)
                },
            )
            .await
            .unwrap_err();

        assert_eq!(attempts, 3);
        let message = err.to_string();
        assert_eq!(message.lines().count(), 2);
        assert!(message.starts_with("[redis] a: "));
        assert!(message.contains("\nb: "));
        assert!(registry.contains("c").await);
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_handle() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();

        let mut first = reachable();
        first.expect_close().times(1).returning(|| ());
        let mut first = Some(first);
        registry
            .connect_with(configs(&[("default", "up:1")]), move |_, _| {
                Ok(first.take().expect("factory called once"))
            })
            .await
            .unwrap();
        let old = registry.default_client().await.unwrap();

        let mut second = reachable();
        second.expect_close().never();
        let mut second = Some(second);
        registry
            .connect_with(configs(&[("default", "up:2")]), move |_, _| {
                Ok(second.take().expect("factory called once"))
            })
            .await
            .unwrap();
        let current = registry.default_client().await.unwrap();

        assert!(!Arc::ptr_eq(&old, &current));
        assert_eq!(registry.len().await, 1);
        drop(old);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_previous_handle() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();

        registry
            .connect_with(configs(&[("default", "up:1")]), by_server)
            .await
            .unwrap();
        let before = registry.default_client().await.unwrap();

        assert!(
            registry
                .connect_with(configs(&[("default", "down:1")]), by_server)
                .await
                .is_err()
        );
        let after = registry.default_client().await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_tls_error_aborts_batch() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();

        let err = registry
            .connect_with(configs(&[("default", "up:1")]), |_, _| {
                Err(RegistryError::InvalidKeyPair("bad pem".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidKeyPair(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_build_error_is_reported_with_probe_failures() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();
        let mut attempts = 0;

        let err = registry
            .connect_with(
                vec![
                    ("a".to_string(), ConnectionConfig::new("down:1")),
                    ("b".to_string(), ConnectionConfig::new("")),
                    ("c".to_string(), ConnectionConfig::new("down:2")),
                ],
                |name, config| {
                    attempts += 1;
                    if name == "b" {
                        Err(RegistryError::InvalidConfig("invalid address ``".to_string()))
                    } else {
                        by_server(name, config)
                    }
                },
            )
            .await
            .unwrap_err();

        assert_eq!(attempts, 3);
        match &err {
            RegistryError::ProbeFailed { failures } => {
                assert_eq!(failures.len(), 3);
                assert!(failures[0].starts_with("a: "));
                assert!(failures[1].starts_with("b: Invalid configuration"));
                assert!(failures[2].starts_with("c: "));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_real_factory_reports_bad_addresses() {
        let registry = ConnectionRegistry::new();

        let err = registry
            .connect(vec![
                ("a".to_string(), ConnectionConfig::new("")),
                ("s".to_string(), ConnectionConfig::sentinel("mymaster", "")),
            ])
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, RegistryError::ProbeFailed { .. }));
        assert!(message.contains("a: "));
        assert!(message.contains("s: "));
    }

    #[tokio::test]
    async fn test_client_missing_name() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();

        let err = registry.client("x").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotConfigured(ref name) if name == "x"));
        assert!(err.to_string().contains("`x`"));

        let err = registry.default_client().await.unwrap_err();
        assert!(err.to_string().contains("`default`"));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();
        let reader = registry.clone();

        registry
            .connect_with(configs(&[("default", "up:1")]), by_server)
            .await
            .unwrap();

        assert!(reader.default_client().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_reports_each_entry() {
        let registry = ConnectionRegistry::<MockManagedConnection>::default();
        let mut calls = 0;

        registry
            .connect_with(configs(&[("a", "up:1"), ("b", "up:2")]), |name, _| {
                calls += 1;
                let mut client = MockManagedConnection::new();
                if name == "a" {
                    client.expect_ping().returning(|| Ok(()));
                } else {
                    let mut probes = 0;
                    client.expect_ping().returning(move || {
                        probes += 1;
                        if probes == 1 {
                            Ok(())
                        } else {
                            Err(RegistryError::HealthCheckFailed("gone".to_string()))
                        }
                    });
                }
                Ok(client)
            })
            .await
            .unwrap();

        let health = registry.health().await;
        assert_eq!(calls, 2);
        assert!(health["a"].healthy);
        assert!(!health["b"].healthy);
        assert!(health["b"].message.as_deref().unwrap().contains("gone"));
    }

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty().await);
        assert!(registry.names().await.is_empty());
    }
}
