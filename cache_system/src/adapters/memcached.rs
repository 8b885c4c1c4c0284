//! Adapter over a pool of memcached servers
//!
//! The adapter talks to the servers through [`MemcacheClient`], which exposes
//! the handful of primitives the contract needs. [`MemcacheServers`] is the
//! production implementation on top of the `memcache` crate.

use async_trait::async_trait;
use config::CacheConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::cacher::{CacheMap, Cacher};
use crate::errors::CacheError;
use crate::keys::{check_keys, check_values};
use crate::namespace::Namespace;
use crate::ttl::{Ttl, TtlNormalizer};

/// Memcached treats expirations above 30 days as absolute Unix timestamps
pub const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Primitives of a memcached client
#[async_trait]
pub trait MemcacheClient: Send + Sync + Debug {
    /// Values of the keys that were found
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError>;

    async fn set(&self, key: &str, value: &Value, expiration: u32) -> Result<bool, CacheError>;

    /// True only when every entry was stored
    async fn set_multi(&self, entries: &[(String, Value)], expiration: u32) -> Result<bool, CacheError>;

    /// True when the key existed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Fails only on transport errors, not on absent keys
    async fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Connection pool state of [`MemcacheServers`]
enum Pool {
    Idle,
    Ready(Arc<memcache::Client>),
    /// Last connect attempt failed at this instant
    Failed(Instant),
}

/// Memcached servers reached through the `memcache` crate.
///
/// The pool is opened on first use, so building one never fails; an
/// unreachable server shows up as failed operations instead. Opening the
/// pool is bounded by the connect timeout, and after a failure every call
/// fails immediately until the reconnect delay has passed.
pub struct MemcacheServers {
    targets: Vec<String>,
    pool_size: u32,
    timeout: Option<Duration>,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    pool: RwLock<Pool>,
}

impl Debug for MemcacheServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection_status = match self.pool.try_read() {
            Ok(pool) => match *pool {
                Pool::Idle => "no_connection",
                Pool::Ready(_) => "connected",
                Pool::Failed(_) => "unreachable",
            },
            Err(_) => "lock_error",
        };

        f.debug_struct("MemcacheServers")
            .field("targets", &self.targets)
            .field("pool_size", &self.pool_size)
            .field("connected", &connection_status)
            .finish()
    }
}

impl MemcacheServers {
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            targets,
            pool_size: 1,
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            pool: RwLock::new(Pool::Idle),
        }
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Open pool, `None` when a connect should be attempted
    fn usable(&self, pool: &Pool) -> Result<Option<Arc<memcache::Client>>, CacheError> {
        match pool {
            Pool::Ready(client) => Ok(Some(client.clone())),
            Pool::Failed(at) if at.elapsed() < self.reconnect_delay => Err(CacheError::Connection(
                format!("memcached {:?} unreachable", self.targets),
            )),
            _ => Ok(None),
        }
    }

    /// Get or open the connection pool
    async fn connection(&self) -> Result<Arc<memcache::Client>, CacheError> {
        if let Some(client) = self.usable(&*self.pool.read().await)? {
            return Ok(client);
        }

        let mut pool = self.pool.write().await;
        if let Some(client) = self.usable(&pool)? {
            return Ok(client);
        }

        let targets = self.targets.clone();
        let pool_size = self.pool_size;
        let timeout = self.timeout;
        let connect_timeout = self.connect_timeout;
        let opened = tokio::task::spawn_blocking(move || -> Result<memcache::Client, CacheError> {
            let client = memcache::Client::builder()
                .add_server(targets)?
                .with_max_pool_size(pool_size)
                .with_connection_timeout(connect_timeout)
                .build()?;
            if timeout.is_some() {
                client.set_read_timeout(timeout)?;
                client.set_write_timeout(timeout)?;
            }
            Ok(client)
        })
        .await
        .map_err(|e| CacheError::Connection(e.to_string()))
        .and_then(|opened| opened);

        match opened {
            Ok(client) => {
                debug_log!("memcached pool opened for {:?}", self.targets);
                let client = Arc::new(client);
                *pool = Pool::Ready(client.clone());
                Ok(client)
            }
            Err(e) => {
                tracing::warn!(targets = ?self.targets, error = %e, "memcached connect failed");
                *pool = Pool::Failed(Instant::now());
                Err(e)
            }
        }
    }

    /// Run a blocking client call off the async runtime
    async fn run<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> Result<T, CacheError> + Send + 'static,
    {
        let client = self.connection().await?;
        tokio::task::spawn_blocking(move || op(client.as_ref()))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?
    }
}

#[async_trait]
impl MemcacheClient for MemcacheServers {
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        let keys = keys.to_vec();
        let raw = self
            .run(move |client| {
                let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                Ok(client.gets::<String>(&refs)?)
            })
            .await?;

        let mut values = HashMap::with_capacity(raw.len());
        for (key, payload) in raw {
            match serde_json::from_str(&payload) {
                Ok(value) => {
                    values.insert(key, value);
                }
                Err(e) => tracing::warn!(key = key.as_str(), error = %e, "undecodable memcached payload"),
            }
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &Value, expiration: u32) -> Result<bool, CacheError> {
        let key = key.to_string();
        let payload = serde_json::to_string(value)?;
        self.run(move |client| {
            client.set(&key, payload.as_str(), expiration)?;
            Ok(true)
        })
        .await
    }

    async fn set_multi(&self, entries: &[(String, Value)], expiration: u32) -> Result<bool, CacheError> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            encoded.push((key.clone(), serde_json::to_string(value)?));
        }

        // The text protocol has no multi-set; store key by key and keep going
        // past individual failures so the rest still land.
        self.run(move |client| {
            let mut success = true;
            for (key, payload) in &encoded {
                if let Err(e) = client.set(key, payload.as_str(), expiration) {
                    tracing::warn!(key = key.as_str(), error = %e, "memcached set failed");
                    success = false;
                }
            }
            Ok(success)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.run(move |client| Ok(client.delete(&key)?)).await
    }

    async fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError> {
        let keys = keys.to_vec();
        self.run(move |client| {
            for key in &keys {
                client.delete(key)?;
            }
            Ok(())
        })
        .await
    }
}

/// Cache on memcached. Single-key reads are one-key batch fetches, so a
/// miss is a key absent from the result rather than a falsy value.
#[derive(Debug)]
pub struct MemcachedCacher<C: MemcacheClient = MemcacheServers> {
    client: C,
    namespace: Namespace,
    ttl: TtlNormalizer,
}

impl MemcachedCacher<MemcacheServers> {
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut servers = MemcacheServers::new(config.targets())
            .with_pool_size(config.memcached.pool_size)
            .with_connect_timeout(Duration::from_millis(config.memcached.connect_timeout_ms))
            .with_reconnect_delay(Duration::from_millis(config.memcached.reconnect_delay_ms));
        if let Some(ms) = config.memcached.timeout_ms {
            servers = servers.with_timeout(Duration::from_millis(ms));
        }

        let namespace = Namespace::resolve(
            config.namespace.as_deref(),
            config.namespace_seed.as_deref(),
        );
        Self::new(servers, namespace, config.default_ttl)
    }
}

impl<C: MemcacheClient> MemcachedCacher<C> {
    pub fn new(client: C, namespace: Namespace, default_ttl: u64) -> Self {
        Self {
            client,
            namespace,
            ttl: TtlNormalizer::new(default_ttl),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Expiration value for memcached, keeping long TTLs relative to now
    fn expiration(&self, ttl: &Ttl) -> u32 {
        let seconds = self.ttl.normalize(ttl);
        if seconds <= MAX_RELATIVE_EXPIRATION {
            return seconds as u32;
        }
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        u32::try_from(now.saturating_add(seconds)).unwrap_or(u32::MAX)
    }
}

#[async_trait]
impl<C: MemcacheClient> Cacher for MemcachedCacher<C> {
    async fn get(&self, key: &str, default: Value) -> Value {
        let prefixed = self.namespace.apply(key);
        match self.client.get_multi(std::slice::from_ref(&prefixed)).await {
            Ok(mut values) => values.remove(&prefixed).unwrap_or(default),
            Err(e) => {
                tracing::warn!(key, error = %e, "memcached get failed");
                default
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> bool {
        let expiration = self.expiration(&ttl);
        match self
            .client
            .set(&self.namespace.apply(key), &value, expiration)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(key, error = %e, "memcached set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.client.delete(&self.namespace.apply(key)).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(key, error = %e, "memcached delete failed");
                false
            }
        }
    }

    async fn has(&self, key: &str) -> bool {
        let prefixed = self.namespace.apply(key);
        match self.client.get_multi(std::slice::from_ref(&prefixed)).await {
            Ok(values) => values.contains_key(&prefixed),
            Err(e) => {
                tracing::warn!(key, error = %e, "memcached has failed");
                false
            }
        }
    }

    async fn get_multiple(&self, keys: Vec<Value>, default: Value) -> Result<CacheMap, CacheError> {
        let keys = check_keys(keys)?;
        let prefixed: Vec<String> = keys.iter().map(|k| self.namespace.apply(k.as_str())).collect();

        let mut fetched = if prefixed.is_empty() {
            HashMap::new()
        } else {
            match self.client.get_multi(&prefixed).await {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(keys = prefixed.len(), error = %e, "memcached get_multi failed");
                    HashMap::new()
                }
            }
        };

        let mut values = CacheMap::new();
        for (key, prefixed) in keys.into_iter().zip(prefixed) {
            let value = fetched.remove(&prefixed).unwrap_or_else(|| default.clone());
            values.insert(key.into_string(), value);
        }
        Ok(values)
    }

    async fn set_multiple(&self, values: Vec<(Value, Value)>, ttl: Ttl) -> Result<bool, CacheError> {
        let entries: Vec<(String, Value)> = check_values(values)?
            .into_iter()
            .map(|(key, value)| (self.namespace.apply(key.as_str()), value))
            .collect();
        if entries.is_empty() {
            return Ok(true);
        }

        let expiration = self.expiration(&ttl);
        match self.client.set_multi(&entries, expiration).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                tracing::warn!(keys = entries.len(), error = %e, "memcached set_multi failed");
                Ok(false)
            }
        }
    }

    async fn delete_multiple(&self, keys: Vec<Value>) -> Result<bool, CacheError> {
        let prefixed: Vec<String> = check_keys(keys)?
            .iter()
            .map(|k| self.namespace.apply(k.as_str()))
            .collect();
        if prefixed.is_empty() {
            return Ok(true);
        }

        match self.client.delete_multi(&prefixed).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(keys = prefixed.len(), error = %e, "memcached delete_multi failed");
                Ok(false)
            }
        }
    }
}
