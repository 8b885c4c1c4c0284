//! Cache system with interchangeable backends
//!
//! This crate defines the [`Cacher`] contract and implements it for an
//! in-process shared memory segment, memcached, redis and a null store.
//! Application code depends on the contract only and picks a backend at
//! construction time.

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub mod adapters;
pub mod cacher;
pub mod errors;
pub mod keys;
pub mod namespace;
pub mod prelude;
pub mod ttl;

// Re-export centralized config
pub use config::{BackendKind, CacheConfig};

pub use adapters::{
    MemcacheClient, MemcacheServers, MemcachedCacher, NullCacher, RedisCacher, RedisOptions,
    Serializer, SharedMemoryCacher, SharedSegment,
};
pub use cacher::{CacheMap, Cacher, CacherExt};
pub use errors::CacheError;
pub use keys::CacheKey;
pub use namespace::Namespace;
pub use ttl::{Interval, Ttl, TtlNormalizer};
