//! Error types for cache operations
//!
//! Only two kinds ever reach application code: `Validation` from batch
//! operations and the connection errors raised while building an adapter.
//! Everything else is converted to a miss or `false` at the adapter boundary.

use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache key: {0}")]
    Validation(String),

    #[error("Redis connection error: {0}")]
    ConnectionError(#[from] redis::RedisError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Memcached error: {0}")]
    Memcache(#[from] memcache::MemcacheError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for errors raised before any backend interaction
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
