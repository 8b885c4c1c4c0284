//! Convenience re-exports for common cache-system usage

// Contract and shared types
pub use crate::cacher::{CacheMap, Cacher, CacherExt};
pub use crate::errors::CacheError;
pub use crate::namespace::Namespace;
pub use crate::ttl::{Interval, Ttl};

// Adapters
pub use crate::adapters::{
    MemcachedCacher, NullCacher, RedisCacher, RedisOptions, SharedMemoryCacher, SharedSegment,
};

// Re-export centralized config
pub use config::{BackendKind, CacheConfig};

// Common external dependencies
pub use async_trait::async_trait;
pub use serde_json::{self, Value, json};
