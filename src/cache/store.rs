//! Cache storage implementations.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::{CacheError, KeyValueCache};

const SOURCE: &str = "cache::store";

pub const METRIC_CACHE_EVICT_TOTAL: &str = "quill_list_cache_evict_total";

// Upper bound used when `now + ttl` is not representable.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache with per-entry expiry and LRU eviction.
///
/// Expired entries are dropped lazily on the next lookup of their key.
pub struct MemoryCache {
    entries: RwLock<LruCache<CacheKey, Entry>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Number of stored entries, including expired ones not yet collected.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &CacheKey) -> Option<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            debug!(key = %key, "Dropped expired cache entry");
        }
        None
    }

    fn store(&self, key: &CacheKey, value: String, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + MAX_TTL);
        let evicted = rw_write(&self.entries, SOURCE, "set")
            .push(key.clone(), Entry { value, expires_at })
            .map(|(evicted_key, _)| evicted_key);

        if let Some(evicted_key) = evicted.filter(|evicted_key| evicted_key != key) {
            counter!(METRIC_CACHE_EVICT_TOTAL).increment(1);
            debug!(evicted = %evicted_key, "Evicted least recently used cache entry");
        }
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.store(key, value, ttl);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }
}

/// Cache that never retains anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl KeyValueCache for NoopCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name).expect("valid key")
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new(&CacheConfig::default());
        let ttl = Duration::from_secs(3600);

        cache
            .set(&key("allPosts"), "[1]".to_string(), ttl)
            .await
            .expect("set");

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(
            cache.get(&key("allPosts")).await.expect("get").as_deref(),
            Some("[1]")
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key("allPosts")).await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn overwriting_a_key_replaces_value() {
        let cache = MemoryCache::new(&CacheConfig::default());
        let ttl = Duration::from_secs(60);

        cache.set(&key("k"), "old".to_string(), ttl).await.expect("set");
        cache.set(&key("k"), "new".to_string(), ttl).await.expect("set");

        assert_eq!(cache.get(&key("k")).await.expect("get").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let config = CacheConfig {
            capacity: 2,
            ..Default::default()
        };
        let cache = MemoryCache::new(&config);
        let ttl = Duration::from_secs(60);

        cache.set(&key("a"), "1".to_string(), ttl).await.expect("set");
        cache.set(&key("b"), "2".to_string(), ttl).await.expect("set");
        // Touch `a` so `b` becomes the eviction candidate.
        cache.get(&key("a")).await.expect("get");
        cache.set(&key("c"), "3".to_string(), ttl).await.expect("set");

        assert!(cache.get(&key("a")).await.expect("get").is_some());
        assert!(cache.get(&key("b")).await.expect("get").is_none());
        assert!(cache.get(&key("c")).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = MemoryCache::new(&CacheConfig::default());
        cache
            .set(&key("a"), "1".to_string(), Duration::from_secs(60))
            .await
            .expect("set");

        cache.clear().await.expect("clear");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn noop_cache_never_hits() {
        let cache = NoopCache;
        cache
            .set(&key("a"), "1".to_string(), Duration::from_secs(60))
            .await
            .expect("set");
        assert_eq!(cache.get(&key("a")).await.expect("get"), None);
    }
}
