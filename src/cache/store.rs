//! In-process page cache with per-entry expiry.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::{CacheError, PageCache};

const SOURCE: &str = "cache::store";

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// LRU-bounded key/value cache where every entry carries its own deadline.
///
/// Expired entries are dropped lazily on read and otherwise age out through
/// LRU eviction.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Number of entries currently held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PageCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Rejected(format!("ttl {ttl:?} overflows the clock")))?;
        mutex_lock(&self.entries, SOURCE, "set_with_expiry")
            .put(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> MemoryCache {
        MemoryCache::new(&CacheConfig {
            capacity,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn returns_value_before_expiry() {
        let cache = cache(4);
        cache
            .set_with_expiry("page:acme", Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await
            .expect("set");
        let value = cache.get("page:acme").await.expect("get");
        assert_eq!(value.as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss_and_are_dropped() {
        let cache = cache(4);
        cache
            .set_with_expiry("page:acme", Bytes::from_static(b"{}"), Duration::from_millis(10))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get("page:acme").await.expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = cache(1);
        let ttl = Duration::from_secs(60);
        cache
            .set_with_expiry("page:a", Bytes::from_static(b"a"), ttl)
            .await
            .expect("set a");
        cache
            .set_with_expiry("page:b", Bytes::from_static(b"b"), ttl)
            .await
            .expect("set b");

        assert!(cache.get("page:a").await.expect("get a").is_none());
        assert!(cache.get("page:b").await.expect("get b").is_some());
    }

    #[tokio::test]
    async fn unknown_key_is_a_miss() {
        let cache = cache(4);
        assert!(cache.get("page:nobody").await.expect("get").is_none());
    }
}
