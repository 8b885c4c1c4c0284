//! Core Cacher functionality
//!
//! This module contains the `CacheHub` registry, which builds adapters from
//! configuration and hands them out by name as `Arc<dyn Cacher>`.

use std::collections::HashMap;
use std::sync::Arc;

use cache_system::{
    Cacher, MemcachedCacher, NullCacher, RedisCacher, SharedMemoryCacher,
};
use config::{AppConfig, BackendKind, CacheConfig};
use tracing::warn;

use crate::errors::CacherError;

/// Named collection of caches, each behind the same contract
#[derive(Default)]
pub struct CacheHub {
    caches: HashMap<String, Arc<dyn Cacher>>,
}

impl CacheHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every cache listed under `[cache.<name>]`.
    ///
    /// A cache whose adapter cannot be built is replaced by a `NullCacher`
    /// when it sets `fallback_to_null`; otherwise the error is returned.
    pub async fn from_config(config: &AppConfig) -> Result<Self, CacherError> {
        config.validate()?;

        let mut hub = Self::new();
        for (name, cache_config) in &config.cache {
            let cacher = match build_cacher(cache_config).await {
                Ok(cacher) => cacher,
                Err(e) if cache_config.fallback_to_null => {
                    warn!(cache = %name, error = %e, "cache unavailable, falling back to null cache");
                    Arc::new(NullCacher::new())
                }
                Err(e) => return Err(e),
            };
            crate::debug_log!(cache = %name, backend = ?cache_config.backend, "cache registered");
            hub.register(name.clone(), cacher)?;
        }

        Ok(hub)
    }

    /// Register a cache under `name`
    pub fn register(&mut self, name: String, cacher: Arc<dyn Cacher>) -> Result<(), CacherError> {
        if self.caches.contains_key(&name) {
            return Err(CacherError::CacheAlreadyRegistered(name));
        }

        self.caches.insert(name, cacher);
        Ok(())
    }

    /// Get a registered cache by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Cacher>, CacherError> {
        crate::trace_log!(cache = %name, "cache lookup");
        self.caches
            .get(name)
            .cloned()
            .ok_or_else(|| CacherError::CacheNotFound(name.to_string()))
    }

    /// List all registered cache names, sorted
    pub fn list(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.caches.keys().collect();
        names.sort();
        names
    }

    /// Remove a cache by name, returning it
    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn Cacher>, CacherError> {
        self.caches
            .remove(name)
            .ok_or_else(|| CacherError::CacheNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl std::fmt::Debug for CacheHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHub")
            .field("caches", &self.list())
            .finish()
    }
}

/// Build a single adapter for `config`.
///
/// Only redis connects eagerly, so it is the only backend that can fail here.
pub async fn build_cacher(config: &CacheConfig) -> Result<Arc<dyn Cacher>, CacherError> {
    let cacher: Arc<dyn Cacher> = match config.backend {
        BackendKind::SharedMemory => Arc::new(SharedMemoryCacher::from_config(config)),
        BackendKind::Memcached => Arc::new(MemcachedCacher::from_config(config)),
        BackendKind::Redis => Arc::new(RedisCacher::from_config(config).await?),
        BackendKind::Null => Arc::new(NullCacher::new()),
    };
    Ok(cacher)
}
