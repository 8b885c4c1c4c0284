//! The capability contract every adapter implements
//!
//! Application code holds an `Arc<dyn Cacher>` and never needs to know which
//! store sits behind it. Backend outages look exactly like misses: single-key
//! operations never fail, and batch operations only fail validation.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;

use crate::errors::CacheError;
use crate::ttl::Ttl;

/// Default handed to `get` by typed reads, telling a miss apart from any
/// stored value in a single call
const MISS_MARKER: &str = "\u{0}cacher:miss\u{0}";

/// Ordered key to value mapping returned by batch reads.
/// Iteration order matches the order keys were requested in.
pub type CacheMap = serde_json::Map<String, Value>;

#[async_trait]
pub trait Cacher: Send + Sync + Debug {
    /// Stored value for `key`, or `default` on a miss or backend failure
    async fn get(&self, key: &str, default: Value) -> Value;

    /// Store `value` under `key`; false on any backend failure
    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> bool;

    /// Remove `key`; false when nothing was removed or the backend failed
    async fn delete(&self, key: &str) -> bool;

    /// Wiping a namespace on a shared backend would require a full key scan,
    /// so no adapter supports it. Always false.
    async fn clear(&self) -> bool {
        false
    }

    /// Whether `key` is present, independent of its value
    async fn has(&self, key: &str) -> bool;

    /// Every requested key mapped to its stored value or `default`.
    ///
    /// Fails only when a key is neither a string nor an integer, and then
    /// before the backend is contacted.
    async fn get_multiple(&self, keys: Vec<Value>, default: Value) -> Result<CacheMap, CacheError>;

    /// True only when every entry was stored. Entries stored before a failure
    /// stay stored.
    async fn set_multiple(&self, values: Vec<(Value, Value)>, ttl: Ttl) -> Result<bool, CacheError>;

    /// False only when the backend itself failed, not for absent keys
    async fn delete_multiple(&self, keys: Vec<Value>) -> Result<bool, CacheError>;
}

/// Generic conveniences over [`Cacher`].
///
/// Every iterator handed to these methods is drained completely before the
/// call is dispatched; none of them stream.
#[async_trait]
pub trait CacherExt: Cacher {
    async fn get_many<I, K>(&self, keys: I, default: Value) -> Result<CacheMap, CacheError>
    where
        I: IntoIterator<Item = K> + Send,
        I::IntoIter: Send,
        K: Into<Value> + Send,
    {
        let keys: Vec<Value> = keys.into_iter().map(Into::into).collect();
        self.get_multiple(keys, default).await
    }

    async fn set_many<I, K, V>(&self, values: I, ttl: Ttl) -> Result<bool, CacheError>
    where
        I: IntoIterator<Item = (K, V)> + Send,
        I::IntoIter: Send,
        K: Into<Value> + Send,
        V: Into<Value> + Send,
    {
        let values: Vec<(Value, Value)> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.set_multiple(values, ttl).await
    }

    async fn delete_many<I, K>(&self, keys: I) -> Result<bool, CacheError>
    where
        I: IntoIterator<Item = K> + Send,
        I::IntoIter: Send,
        K: Into<Value> + Send,
    {
        let keys: Vec<Value> = keys.into_iter().map(Into::into).collect();
        self.delete_multiple(keys).await
    }

    /// Typed read; a value that does not deserialize into `T` counts as a miss
    async fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let value = self.get(key, Value::String(MISS_MARKER.to_string())).await;
        if value.as_str() == Some(MISS_MARKER) {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Typed write; false when `value` cannot be represented as JSON
    async fn set_as<T>(&self, key: &str, value: &T, ttl: Ttl) -> bool
    where
        T: Serialize + Sync,
    {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl).await,
            Err(e) => {
                tracing::warn!(key, error = %e, "value cannot be cached");
                false
            }
        }
    }
}

impl<C: Cacher + ?Sized> CacherExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Map-backed cacher counting single-key reads
    #[derive(Debug, Default)]
    struct CountingCacher {
        entries: Mutex<HashMap<String, Value>>,
        gets: AtomicUsize,
        has_calls: AtomicUsize,
    }

    #[async_trait]
    impl Cacher for CountingCacher {
        async fn get(&self, key: &str, default: Value) -> Value {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().unwrap().get(key).cloned().unwrap_or(default)
        }

        async fn set(&self, key: &str, value: Value, _ttl: Ttl) -> bool {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            true
        }

        async fn delete(&self, key: &str) -> bool {
            self.entries.lock().unwrap().remove(key).is_some()
        }

        async fn has(&self, key: &str) -> bool {
            self.has_calls.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().unwrap().contains_key(key)
        }

        async fn get_multiple(&self, _keys: Vec<Value>, _default: Value) -> Result<CacheMap, CacheError> {
            Ok(CacheMap::new())
        }

        async fn set_multiple(&self, _values: Vec<(Value, Value)>, _ttl: Ttl) -> Result<bool, CacheError> {
            Ok(false)
        }

        async fn delete_multiple(&self, _keys: Vec<Value>) -> Result<bool, CacheError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_get_as_reads_once() {
        let cache = CountingCacher::default();

        assert_eq!(cache.get_as::<i32>("absent").await, None);
        assert_eq!(cache.gets.load(Ordering::SeqCst), 1);

        cache.set("n", json!(7), Ttl::Default).await;
        assert_eq!(cache.get_as::<i32>("n").await, Some(7));
        assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
        assert_eq!(cache.has_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_as_stored_null_is_a_hit() {
        let cache = CountingCacher::default();
        cache.set("nothing", Value::Null, Ttl::Default).await;

        assert_eq!(cache.get_as::<Option<i32>>("nothing").await, Some(None));
        assert_eq!(cache.get_as::<Option<i32>>("absent").await, None);
    }

    #[tokio::test]
    async fn test_get_as_wrong_shape_is_a_miss() {
        let cache = CountingCacher::default();
        cache.set("text", json!("seven"), Ttl::Default).await;

        assert_eq!(cache.get_as::<i32>("text").await, None);
        assert_eq!(cache.get_as::<String>("text").await, Some("seven".to_string()));
    }
}
