//! # Cacher
//!
//! One caching contract over interchangeable backends: an in-process shared
//! memory segment, memcached, redis and a null store. Code written against
//! [`Cacher`](cache_system::Cacher) keeps working when the backend changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cacher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_toml_str(
//!         r#"
//!         [cache.sessions]
//!         backend = "redis"
//!         namespace = "sessions:"
//!         default_ttl = 3600
//!         fallback_to_null = true
//!
//!         [cache.local]
//!         backend = "shared_memory"
//!         namespace = "local:"
//!         "#,
//!     )?;
//!
//!     let hub = CacheHub::from_config(&config).await?;
//!     let sessions = hub.get("sessions")?;
//!
//!     sessions.set("user:1", json!({"name": "John"}), Ttl::Default).await;
//!     let user = sessions.get("user:1", Value::Null).await;
//!     println!("Cached user: {}", user);
//!
//!     let many = sessions
//!         .get_multiple(vec![json!("user:1"), json!(2)], json!(false))
//!         .await?;
//!     println!("Batch read: {:?}", many);
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::{CacheHub, build_cacher};
pub use errors::CacherError;

// Re-export centralized config
pub use config::{AppConfig, BackendKind, CacheConfig};

// Re-export internal crates used by the public API
pub use cache_system;
pub use config;

// Re-export external dependencies used in public API
pub use async_trait;
pub use serde_json;
