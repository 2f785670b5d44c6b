//! Cache configuration.
//!
//! Controls the listing cache via the `[cache]` section of `quill.toml`.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, every lookup misses and writes are discarded.
    pub enabled: bool,
    /// Expiry applied to every entry written by the listing.
    pub ttl: Duration,
    /// Maximum number of keys retained before LRU eviction.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            capacity: settings.capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
