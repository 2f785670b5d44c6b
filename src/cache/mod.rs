//! Key-value cache used by the listing layer.
//!
//! Values are opaque strings with a per-entry expiry. The in-process
//! [`MemoryCache`] bounds its size with LRU eviction; [`NoopCache`] stands in
//! when caching is disabled.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! capacity = 256
//! ```

mod config;
mod keys;
mod lock;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::CacheConfig;
pub use keys::{CacheKey, POSTS_LIST_KEY};
pub use store::{METRIC_CACHE_EVICT_TOTAL, MemoryCache, NoopCache};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    InvalidKey,
    #[error("cache backend unavailable: {message}")]
    Unavailable { message: String },
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Drop every entry. Called on shutdown.
    async fn clear(&self) -> Result<(), CacheError>;
}
