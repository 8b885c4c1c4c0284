//! Error types for the Cacher crate
//!
//! This module contains all error types that can be returned while assembling caches.

use cache_system::CacheError;
use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    #[error("Cache already registered: {0}")]
    CacheAlreadyRegistered(String),
}
