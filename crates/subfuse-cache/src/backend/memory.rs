//! In-process L1 cache: LRU with TTL and a tag index
//!
//! The LRU map and the tag index are guarded by a single mutex so a lookup,
//! its recency update, and any tag bookkeeping happen in one critical
//! section.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use super::{CacheBackend, CacheEntry, CacheOptions};
use crate::error::CacheResult;
use crate::stats::CacheStats;

/// Configuration for the memory tier
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Default TTL applied when a write carries none
    pub default_ttl: Option<std::time::Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: Some(std::time::Duration::from_secs(300)),
        }
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    tag_index: HashMap<String, HashSet<String>>,
    stats: CacheStats,
}

impl Inner {
    fn index_tags(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn unindex(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        let tags = entry.tags.clone();
        self.unindex(key, &tags);
        Some(entry)
    }
}

/// LRU + TTL memory cache with tag invalidation
pub struct MemoryCache {
    inner: Mutex<Inner>,
    config: MemoryCacheConfig,
}

impl MemoryCache {
    /// Create a memory cache with the given configuration
    pub fn new(config: MemoryCacheConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                tag_index: HashMap::new(),
                stats: CacheStats::default(),
            }),
            config,
        }
    }

    /// Memory cache with the given entry bound and default TTL
    pub fn with_capacity(max_entries: usize) -> Self {
        Self::new(MemoryCacheConfig {
            max_entries,
            ..Default::default()
        })
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        enum Lookup {
            Hit(CacheEntry),
            Expired,
            Miss,
        }

        let now = Utc::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let lookup = match inner.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => {
                entry.last_access = now;
                Lookup::Hit(entry.clone())
            }
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(entry) => {
                inner.stats.hits += 1;
                Ok(Some(entry))
            }
            Lookup::Expired => {
                inner.remove_entry(key);
                inner.stats.evictions += 1;
                inner.stats.misses += 1;
                Ok(None)
            }
            Lookup::Miss => {
                inner.stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, mut options: CacheOptions) -> CacheResult<()> {
        if options.ttl.is_none() {
            options.ttl = self.config.default_ttl;
        }
        let entry = CacheEntry::new(value, &options);

        let mut inner = self.inner.lock();
        if inner.entries.contains(key) {
            inner.remove_entry(key);
        }
        inner.index_tags(key, &entry.tags);
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), entry) {
            // push returns the LRU victim when the map was full
            if evicted_key != key {
                let tags = evicted.tags.clone();
                inner.unindex(&evicted_key, &tags);
                inner.stats.evictions += 1;
            }
        }
        inner.stats.sets += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        let existed = inner.remove_entry(key).is_some();
        if existed {
            inner.stats.deletes += 1;
        }
        Ok(existed)
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> CacheResult<usize> {
        let mut inner = self.inner.lock();
        let mut keys: HashSet<String> = HashSet::new();
        for tag in tags {
            if let Some(tagged) = inner.tag_index.get(tag) {
                keys.extend(tagged.iter().cloned());
            }
        }
        let mut removed = 0;
        for key in keys {
            if inner.remove_entry(&key).is_some() {
                removed += 1;
            }
        }
        inner.stats.deletes += removed as u64;
        Ok(removed)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.tag_index.clear();
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.inner.lock().stats)
    }

    async fn len(&self) -> CacheResult<usize> {
        Ok(self.inner.lock().entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MemoryCache::default();
        cache
            .set("k", Bytes::from("v"), CacheOptions::default())
            .await
            .unwrap();
        let entry = cache.get("k").await.unwrap().unwrap();
        assert_eq!(entry.value, Bytes::from("v"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let cache = MemoryCache::default();
        cache
            .set(
                "k",
                Bytes::from("v"),
                CacheOptions::with_ttl(Duration::from_millis(10)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_cleans_tag_index() {
        let cache = MemoryCache::with_capacity(2);
        let tagged = CacheOptions::default().with_tags(vec!["grp".into()]);
        cache
            .set("a", Bytes::from("1"), tagged.clone())
            .await
            .unwrap();
        cache
            .set("b", Bytes::from("2"), tagged.clone())
            .await
            .unwrap();
        cache.set("c", Bytes::from("3"), tagged).await.unwrap();

        // "a" was the LRU victim
        assert!(cache.get("a").await.unwrap().is_none());
        let removed = cache.invalidate_by_tags(&["grp".into()]).await.unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_tag_invalidation() {
        let cache = MemoryCache::default();
        cache
            .set(
                "s1",
                Bytes::from("x"),
                CacheOptions::default().with_tags(vec!["sources".into()]),
            )
            .await
            .unwrap();
        cache
            .set(
                "other",
                Bytes::from("y"),
                CacheOptions::default().with_tags(vec!["fetch:abc".into()]),
            )
            .await
            .unwrap();

        let removed = cache
            .invalidate_by_tags(&["sources".into()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("s1").await.unwrap().is_none());
        assert!(cache.get("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_coherence_within_ttl() {
        let cache = MemoryCache::default();
        cache
            .set(
                "k",
                Bytes::from("fresh"),
                CacheOptions::with_ttl(Duration::from_secs(60)),
            )
            .await
            .unwrap();
        assert_eq!(
            cache.get("k").await.unwrap().unwrap().value,
            Bytes::from("fresh")
        );
    }
}
