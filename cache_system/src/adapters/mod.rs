//! Concrete adapters, one per kind of store

pub mod memcached;
pub mod null;
pub mod redis;
pub mod segment;
pub mod shared_memory;

pub use self::memcached::{MemcacheClient, MemcacheServers, MemcachedCacher};
pub use self::null::NullCacher;
pub use self::redis::{RedisCacher, RedisOptions, Serializer};
pub use self::segment::SharedSegment;
pub use self::shared_memory::SharedMemoryCacher;
