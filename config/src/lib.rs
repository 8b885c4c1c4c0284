//! # Configuration Management for Cacher
//!
//! This crate provides the configuration structures used to build cache adapters.
//! Each named cache picks a backend and carries the settings that backend needs.
//!
//! ## TOML File Configuration
//! ```toml
//! [cache.sessions]
//! backend = "redis"
//! namespace = "app:sessions:"
//! default_ttl = 3600
//! servers = ["redis://127.0.0.1:6379"]
//!
//! [cache.sessions.redis]
//! connect_timeout_ms = 2500
//! retries = 2
//! serializer = "json"
//!
//! [cache.pages]
//! backend = "memcached"
//! namespace_seed = "pages"
//! servers = ["memcache://10.0.0.5:11211", "memcache://10.0.0.6:11211"]
//!
//! [cache.local]
//! backend = "shared_memory"
//!
//! [cache.local.shared_memory]
//! segment = "default"
//! max_entries = 100000
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from cacher.toml (or the path in CACHER_CONFIG)
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./cacher.toml";

/// Loopback target used when a redis cache lists no servers
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Loopback target used when a memcached cache lists no servers
pub const DEFAULT_MEMCACHED_URL: &str = "memcache://127.0.0.1:11211";

/// Name of the shared-memory segment used when none is configured
pub const DEFAULT_SEGMENT: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Named caches, keyed by the name application code looks them up with
    #[serde(default)]
    pub cache: BTreeMap<String, CacheConfig>,
}

/// Which store a cache talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    SharedMemory,
    Memcached,
    Redis,
    Null,
}

/// Configuration of a single cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: BackendKind,

    /// Explicit key prefix; wins over `namespace_seed`
    #[serde(default)]
    pub namespace: Option<String>,

    /// Seed a deterministic prefix is derived from when `namespace` is absent
    #[serde(default)]
    pub namespace_seed: Option<String>,

    /// Default TTL for entries (in seconds), 0 means no expiration
    #[serde(default)]
    pub default_ttl: u64,

    /// Connection targets; empty means the loopback default of the backend
    #[serde(default)]
    pub servers: Vec<String>,

    /// Register a null cache instead of failing when the backend cannot be built
    #[serde(default)]
    pub fallback_to_null: bool,

    #[serde(default)]
    pub redis: RedisSettings,

    #[serde(default)]
    pub memcached: MemcachedSettings,

    #[serde(default)]
    pub shared_memory: SharedMemorySettings,
}

/// Value encoding used for redis payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    #[default]
    Json,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub serializer: SerializerKind,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2500,
            response_timeout_ms: None,
            retries: 0,
            retry_delay_ms: 100,
            serializer: SerializerKind::Json,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemcachedSettings {
    pub pool_size: u32,
    /// Read/write timeout on established connections
    pub timeout_ms: Option<u64>,
    /// Upper bound on opening the pool
    pub connect_timeout_ms: u64,
    /// After a failed connect, calls miss immediately for this long
    pub reconnect_delay_ms: u64,
}

impl Default for MemcachedSettings {
    fn default() -> Self {
        Self {
            pool_size: 1,
            timeout_ms: None,
            connect_timeout_ms: 1000,
            reconnect_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedMemorySettings {
    /// Segment name; caches naming the same segment share storage
    pub segment: Option<String>,
    /// Upper bound on stored entries, unbounded when absent
    pub max_entries: Option<usize>,
}

impl AppConfig {
    /// Load configuration from TOML file specified in .env or defaults
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is fine, a malformed one is not
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let config_path = config_path(env::var("CACHER_CONFIG"))?;
        Self::from_file(config_path)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, cache) in &self.cache {
            if name.is_empty() {
                return Err(ConfigError::Invalid("Cache name cannot be empty".to_string()));
            }
            cache
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("cache.{}: {}", name, e)))?;
        }
        Ok(())
    }
}

/// Pick the config file: `CACHER_CONFIG` when set, else the default path
fn config_path(var: Result<String, env::VarError>) -> Result<PathBuf, ConfigError> {
    match var {
        Ok(path) => Ok(PathBuf::from(path)),
        Err(env::VarError::NotPresent) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(PathBuf::from(DEFAULT_CONFIG_PATH))
        }
        Err(env::VarError::NotPresent) => Err(ConfigError::Invalid(format!(
            "Config path must be specified in .env file as CACHER_CONFIG or in {} file",
            DEFAULT_CONFIG_PATH
        ))),
        Err(e) => Err(e.into()),
    }
}

impl CacheConfig {
    /// Create a new cache configuration for the given backend
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            namespace: None,
            namespace_seed: None,
            default_ttl: 0,
            servers: Vec::new(),
            fallback_to_null: false,
            redis: RedisSettings::default(),
            memcached: MemcachedSettings::default(),
            shared_memory: SharedMemorySettings::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_namespace_seed(mut self, seed: impl Into<String>) -> Self {
        self.namespace_seed = Some(seed.into());
        self
    }

    pub fn with_default_ttl(mut self, default_ttl: u64) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_fallback_to_null(mut self, fallback: bool) -> Self {
        self.fallback_to_null = fallback;
        self
    }

    /// Servers to connect to, substituting the loopback default when none are listed
    pub fn targets(&self) -> Vec<String> {
        if !self.servers.is_empty() {
            return self.servers.clone();
        }
        match self.backend {
            BackendKind::Redis => vec![DEFAULT_REDIS_URL.to_string()],
            BackendKind::Memcached => vec![DEFAULT_MEMCACHED_URL.to_string()],
            BackendKind::SharedMemory | BackendKind::Null => Vec::new(),
        }
    }

    /// Segment name for shared-memory caches
    pub fn segment(&self) -> &str {
        self.shared_memory
            .segment
            .as_deref()
            .unwrap_or(DEFAULT_SEGMENT)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(ns) = &self.namespace {
            if ns.is_empty() {
                return Err("namespace cannot be empty".to_string());
            }
        }
        if let Some(seed) = &self.namespace_seed {
            if seed.is_empty() {
                return Err("namespace_seed cannot be empty".to_string());
            }
        }
        if self.servers.iter().any(|s| s.trim().is_empty()) {
            return Err("server entries cannot be empty".to_string());
        }

        match self.backend {
            BackendKind::Redis => {
                if self.servers.len() > 1 {
                    return Err("redis caches connect to exactly one server".to_string());
                }
                if self.redis.connect_timeout_ms == 0 {
                    return Err("redis connect_timeout_ms must be greater than 0".to_string());
                }
                if self.redis.response_timeout_ms == Some(0) {
                    return Err("redis response_timeout_ms must be greater than 0".to_string());
                }
            }
            BackendKind::Memcached => {
                if self.memcached.pool_size == 0 {
                    return Err("memcached pool_size must be greater than 0".to_string());
                }
                if self.memcached.timeout_ms == Some(0) {
                    return Err("memcached timeout_ms must be greater than 0".to_string());
                }
                if self.memcached.connect_timeout_ms == 0 {
                    return Err("memcached connect_timeout_ms must be greater than 0".to_string());
                }
            }
            BackendKind::SharedMemory => {
                if self.shared_memory.max_entries == Some(0) {
                    return Err("shared_memory max_entries must be greater than 0".to_string());
                }
                if self.shared_memory.segment.as_deref() == Some("") {
                    return Err("shared_memory segment cannot be empty".to_string());
                }
            }
            BackendKind::Null => {}
        }

        Ok(())
    }
}
