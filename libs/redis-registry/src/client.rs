//! Client handles and the low-level constructors behind the registry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::sentinel::{SentinelClient, SentinelClientBuilder, SentinelServerType};
use redis::{Client, ConnectionAddr, TlsMode};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{RegistryError, RegistryResult};
use crate::health::check_health;
use crate::options::{FailoverOptions, Options};

/// What the registry needs from a handle: a liveness probe and a way to
/// release it when a newer handle takes its name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagedConnection: Send + Sync + 'static {
    /// Round-trip a `PING`, bounded by the handle's timeouts
    async fn ping(&self) -> RegistryResult<()>;

    /// Release the handle; later connection attempts must fail
    async fn close(&self);
}

/// Topology a handle was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    Direct,
    Sentinel,
}

enum Backend {
    Direct {
        client: Client,
        options: Options,
    },
    Sentinel {
        client: Mutex<SentinelClient>,
        options: FailoverOptions,
    },
}

/// Handle to one configured Redis target.
///
/// Building a handle performs no I/O. Connections are opened by
/// [`ping`](RedisClient::ping) and
/// [`connection_manager`](RedisClient::connection_manager). A sentinel
/// handle asks the sentinels for the current primary every time it opens a
/// connection.
pub struct RedisClient {
    backend: Backend,
    manager: Mutex<Option<ConnectionManager>>,
    closed: AtomicBool,
}

/// Build a direct client for `addr`.
///
/// `configure` receives [`Options`] preset with `addr` and the defaults.
///
/// # Example
/// ```ignore
/// use std::time::Duration;
///
/// let client = redis_registry::open("127.0.0.1:6379", |options| {
///     options.db = 2;
///     options.read_timeout = Duration::from_secs(1);
/// })?;
/// client.ping().await?;
/// ```
pub fn open<F>(addr: &str, configure: F) -> RegistryResult<RedisClient>
where
    F: FnOnce(&mut Options),
{
    let mut options = Options::new(addr);
    configure(&mut options);
    RedisClient::from_options(options)
}

/// Build a client that finds the primary through sentinels.
///
/// `configure` starts from [`FailoverOptions::default`] and must at least
/// set `master_name` and `sentinel_addrs`.
pub fn open_sentinel<F>(configure: F) -> RegistryResult<RedisClient>
where
    F: FnOnce(&mut FailoverOptions),
{
    let mut options = FailoverOptions::default();
    configure(&mut options);
    RedisClient::from_failover_options(options)
}

impl RedisClient {
    pub fn from_options(options: Options) -> RegistryResult<Self> {
        let url = options.connection_url()?;
        let client = match &options.tls {
            Some(tls) => Client::build_with_tls(url, tls.certificates())?,
            None => Client::open(url)?,
        };

        Ok(Self::with_backend(Backend::Direct { client, options }))
    }

    pub fn from_failover_options(options: FailoverOptions) -> RegistryResult<Self> {
        if options.master_name.is_empty() {
            return Err(RegistryError::InvalidConfig(
                "sentinel mode requires a master name".to_string(),
            ));
        }

        let tls = options.tls.is_some();
        let sentinels = options
            .sentinel_endpoints()?
            .into_iter()
            .map(|(host, port)| sentinel_addr(host, port, tls));

        let mut builder = SentinelClientBuilder::new(
            sentinels,
            options.master_name.clone(),
            SentinelServerType::Master,
        )?
        .set_client_to_redis_db(options.db);

        if let Some(password) = &options.password {
            builder = builder.set_client_to_redis_password(password.clone());
        }
        if let Some(username) = &options.sentinel_username {
            builder = builder.set_client_to_sentinel_username(username.clone());
        }
        if let Some(password) = &options.sentinel_password {
            builder = builder.set_client_to_sentinel_password(password.clone());
        }
        if let Some(tls) = &options.tls {
            builder = builder
                .set_client_to_redis_tls_mode(TlsMode::Secure)
                .set_client_to_redis_certificates(tls.certificates())
                .set_client_to_sentinel_tls_mode(TlsMode::Secure)
                .set_client_to_sentinel_certificates(tls.certificates());
        }

        let client = builder.build()?;

        Ok(Self::with_backend(Backend::Sentinel {
            client: Mutex::new(client),
            options,
        }))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            manager: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ClientMode {
        match self.backend {
            Backend::Direct { .. } => ClientMode::Direct,
            Backend::Sentinel { .. } => ClientMode::Sentinel,
        }
    }

    /// Resolved options of a direct handle
    pub fn options(&self) -> Option<&Options> {
        match &self.backend {
            Backend::Direct { options, .. } => Some(options),
            Backend::Sentinel { .. } => None,
        }
    }

    /// Resolved options of a sentinel handle
    pub fn failover_options(&self) -> Option<&FailoverOptions> {
        match &self.backend {
            Backend::Sentinel { options, .. } => Some(options),
            Backend::Direct { .. } => None,
        }
    }

    /// Address or `master@sentinels`, for logs and errors
    pub fn target(&self) -> String {
        match &self.backend {
            Backend::Direct { options, .. } => options.addr.clone(),
            Backend::Sentinel { options, .. } => {
                format!("{}@{}", options.master_name, options.sentinel_addrs.join(","))
            }
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        match &self.backend {
            Backend::Direct { options, .. } => options.dial_timeout,
            Backend::Sentinel { options, .. } => options.dial_timeout,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        match &self.backend {
            Backend::Direct { options, .. } => options.read_timeout,
            Backend::Sentinel { options, .. } => options.read_timeout,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        match &self.backend {
            Backend::Direct { options, .. } => options.write_timeout,
            Backend::Sentinel { options, .. } => options.write_timeout,
        }
    }

    pub fn max_retries(&self) -> Option<usize> {
        match &self.backend {
            Backend::Direct { options, .. } => options.max_retries,
            Backend::Sentinel { options, .. } => options.max_retries,
        }
    }

    pub fn is_tls(&self) -> bool {
        match &self.backend {
            Backend::Direct { options, .. } => options.tls.is_some(),
            Backend::Sentinel { options, .. } => options.tls.is_some(),
        }
    }

    /// Async commands carry one deadline covering the write and the read.
    fn response_timeout(&self) -> Duration {
        self.read_timeout() + self.write_timeout()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> RegistryResult<()> {
        if self.is_closed() {
            return Err(RegistryError::ClientClosed(self.target()));
        }
        Ok(())
    }

    /// Client for the current primary
    async fn resolve(&self) -> RegistryResult<Client> {
        self.ensure_open()?;

        match &self.backend {
            Backend::Direct { client, .. } => Ok(client.clone()),
            Backend::Sentinel { client, .. } => {
                let mut sentinel = client.lock().await;
                let master = with_timeout(
                    "sentinel master discovery",
                    self.dial_timeout(),
                    sentinel.async_get_client(),
                )
                .await??;
                Ok(master)
            }
        }
    }

    /// Open a fresh connection and round-trip a `PING`.
    #[instrument(skip(self), fields(target = %self.target()))]
    pub async fn ping(&self) -> RegistryResult<()> {
        let client = self.resolve().await?;
        let mut conn = with_timeout(
            "connect",
            self.dial_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await??;

        with_timeout("PING", self.response_timeout(), check_health(&mut conn)).await?
    }

    fn manager_config(&self) -> ConnectionManagerConfig {
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(Some(self.dial_timeout()))
            .set_response_timeout(Some(self.response_timeout()));

        match self.max_retries() {
            Some(retries) => config.set_number_of_retries(retries),
            None => config,
        }
    }

    /// Auto-reconnecting connection for running commands.
    ///
    /// Direct handles share one manager across calls. Sentinel handles
    /// build a new manager against the primary known at call time.
    pub async fn connection_manager(&self) -> RegistryResult<ConnectionManager> {
        self.ensure_open()?;

        if self.mode() == ClientMode::Sentinel {
            let client = self.resolve().await?;
            return Ok(ConnectionManager::new_with_config(client, self.manager_config()).await?);
        }

        let mut cached = self.manager.lock().await;
        if let Some(manager) = cached.as_ref() {
            return Ok(manager.clone());
        }

        let client = self.resolve().await?;
        let manager = ConnectionManager::new_with_config(client, self.manager_config()).await?;
        *cached = Some(manager.clone());
        Ok(manager)
    }

    /// Mark the handle closed and drop its shared connection.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.manager.lock().await.take();
        info!(target = %self.target(), "Closed Redis client");
    }
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("mode", &self.mode())
            .field("target", &self.target())
            .field("tls", &self.is_tls())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl ManagedConnection for RedisClient {
    async fn ping(&self) -> RegistryResult<()> {
        RedisClient::ping(self).await
    }

    async fn close(&self) {
        RedisClient::close(self).await
    }
}

async fn with_timeout<F, T>(operation: &str, duration: Duration, future: F) -> RegistryResult<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await.map_err(|_| {
        debug!(operation, ?duration, "Redis operation timed out");
        RegistryError::Timeout {
            operation: operation.to_string(),
            duration,
        }
    })
}

/// Sentinel endpoint address; TLS sentinels verify against the configured CA.
fn sentinel_addr(host: String, port: u16, tls: bool) -> ConnectionAddr {
    if tls {
        ConnectionAddr::TcpTls {
            host,
            port,
            insecure: false,
            tls_params: None,
        }
    } else {
        ConnectionAddr::Tcp(host, port)
    }
}
