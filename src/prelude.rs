//! Convenience re-exports for common Cacher usage
//!
//! This prelude module re-exports the most commonly used items from the Cacher crates,
//! making it easier to import everything you need with a single use statement.
//!
//! # Example
//!
//! ```rust
//! use cacher::prelude::*;
//!
//! // Now you have access to the contract, the adapters and the hub
//! ```

// Core Cacher components
pub use crate::core::{CacheHub, build_cacher};
pub use crate::errors::CacherError;

// Re-export centralized config
pub use config::{AppConfig, BackendKind, CacheConfig, ConfigError};

// Re-export cache system
pub use cache_system::prelude::*;

// Common external dependencies
pub use std::sync::Arc;
pub use tokio;
