//! Adapter that stores nothing
//!
//! Used when caching is switched off or its backend is unavailable. Keys are
//! still validated so that it fails exactly where a real adapter would.

use async_trait::async_trait;
use serde_json::Value;

use crate::cacher::{CacheMap, Cacher};
use crate::errors::CacheError;
use crate::keys::{check_keys, check_values};
use crate::ttl::Ttl;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacher;

impl NullCacher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Cacher for NullCacher {
    async fn get(&self, _key: &str, default: Value) -> Value {
        default
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Ttl) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn has(&self, _key: &str) -> bool {
        false
    }

    async fn get_multiple(&self, keys: Vec<Value>, default: Value) -> Result<CacheMap, CacheError> {
        Ok(check_keys(keys)?
            .into_iter()
            .map(|key| (key.into_string(), default.clone()))
            .collect())
    }

    async fn set_multiple(&self, values: Vec<(Value, Value)>, _ttl: Ttl) -> Result<bool, CacheError> {
        check_values(values)?;
        Ok(false)
    }

    async fn delete_multiple(&self, keys: Vec<Value>) -> Result<bool, CacheError> {
        check_keys(keys)?;
        Ok(false)
    }
}
