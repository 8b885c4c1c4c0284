//! Adapter over an in-process shared memory segment

use async_trait::async_trait;
use config::CacheConfig;
use serde_json::Value;

use crate::adapters::segment::SharedSegment;
use crate::cacher::{CacheMap, Cacher};
use crate::errors::CacheError;
use crate::keys::{check_keys, check_values};
use crate::namespace::Namespace;
use crate::ttl::{Ttl, TtlNormalizer};

/// Cache backed by a [`SharedSegment`]. There is no connection step, so
/// construction cannot fail and operations never hit a transport error.
#[derive(Debug, Clone)]
pub struct SharedMemoryCacher {
    segment: SharedSegment,
    namespace: Namespace,
    ttl: TtlNormalizer,
}

impl SharedMemoryCacher {
    pub fn new(segment: SharedSegment, namespace: Namespace, default_ttl: u64) -> Self {
        Self {
            segment,
            namespace,
            ttl: TtlNormalizer::new(default_ttl),
        }
    }

    /// Adapter on the process-wide default segment
    pub fn global(namespace: Namespace, default_ttl: u64) -> Self {
        Self::new(SharedSegment::global(), namespace, default_ttl)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let segment = SharedSegment::named(config.segment(), config.shared_memory.max_entries);
        let namespace = Namespace::resolve(
            config.namespace.as_deref(),
            config.namespace_seed.as_deref(),
        );
        Self::new(segment, namespace, config.default_ttl)
    }

    pub fn segment(&self) -> &SharedSegment {
        &self.segment
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

#[async_trait]
impl Cacher for SharedMemoryCacher {
    async fn get(&self, key: &str, default: Value) -> Value {
        self.segment
            .fetch(&self.namespace.apply(key))
            .unwrap_or(default)
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> bool {
        let stored = self
            .segment
            .store(self.namespace.apply(key), value, self.ttl.normalize(&ttl));
        if !stored {
            tracing::warn!(key, segment = self.segment.name(), "shared memory segment is full");
        }
        stored
    }

    async fn delete(&self, key: &str) -> bool {
        self.segment.remove(&self.namespace.apply(key))
    }

    async fn has(&self, key: &str) -> bool {
        self.segment.exists(&self.namespace.apply(key))
    }

    async fn get_multiple(&self, keys: Vec<Value>, default: Value) -> Result<CacheMap, CacheError> {
        let keys = check_keys(keys)?;
        let prefixed: Vec<String> = keys.iter().map(|k| self.namespace.apply(k.as_str())).collect();

        let mut fetched = self.segment.fetch_many(&prefixed);
        debug_log!("shared memory fetched {} of {} keys", fetched.len(), keys.len());

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

        let failed = self.segment.store_many(entries, self.ttl.normalize(&ttl));
        if !failed.is_empty() {
            tracing::warn!(
                failed = failed.len(),
                segment = self.segment.name(),
                "shared memory segment rejected entries"
            );
        }
        Ok(failed.is_empty())
    }

    async fn delete_multiple(&self, keys: Vec<Value>) -> Result<bool, CacheError> {
        let prefixed: Vec<String> = check_keys(keys)?
            .iter()
            .map(|k| self.namespace.apply(k.as_str()))
            .collect();

        self.segment.remove_many(&prefixed);
        Ok(true)
    }
}
