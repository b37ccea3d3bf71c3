//! Multi-tier cache service
//!
//! Lookup order is L1 (memory) → L2 (Redis) → L3 (disk); a hit in a lower
//! tier repopulates the tiers above it. The L2 tier sits behind a circuit
//! breaker so a flapping Redis does not stall lookups; L3 keeps serving
//! while L2 is bypassed. L2/L3 write failures are logged and swallowed —
//! L1 stays authoritative for the request.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{memory::MemoryCache, CacheBackend, CacheEntry, CacheOptions};
use crate::breaker::CircuitBreaker;
use crate::error::CacheResult;
use crate::invalidation::InvalidationEvent;
use crate::stats::CacheStats;

/// Tuning for the tiered service
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Consecutive L2 errors before the tier is bypassed
    pub l2_failure_threshold: u32,
    /// How long L2 stays bypassed
    pub l2_recovery_timeout: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            l2_failure_threshold: 3,
            l2_recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// The L1/L2/L3 cache service
pub struct TieredCache {
    l1: Arc<MemoryCache>,
    l2: Option<Arc<dyn CacheBackend>>,
    l3: Option<Arc<dyn CacheBackend>>,
    l2_breaker: CircuitBreaker,
}

impl TieredCache {
    /// Build a service over the given tiers
    pub fn new(
        l1: Arc<MemoryCache>,
        l2: Option<Arc<dyn CacheBackend>>,
        l3: Option<Arc<dyn CacheBackend>>,
        config: TieredCacheConfig,
    ) -> Self {
        Self {
            l1,
            l2,
            l3,
            l2_breaker: CircuitBreaker::new(config.l2_failure_threshold, config.l2_recovery_timeout),
        }
    }

    /// A memory-only service, for tests and minimal deployments
    pub fn memory_only(max_entries: usize) -> Self {
        Self::new(
            Arc::new(MemoryCache::with_capacity(max_entries)),
            None,
            None,
            TieredCacheConfig::default(),
        )
    }

    /// Look up a key across the tiers
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Ok(Some(entry)) = self.l1.get(key).await {
            return Some(entry);
        }

        if let Some(entry) = self.get_l2(key).await {
            self.populate_l1(key, &entry).await;
            return Some(entry);
        }

        if let Some(l3) = &self.l3 {
            match l3.get(key).await {
                Ok(Some(entry)) => {
                    self.populate_l1(key, &entry).await;
                    return Some(entry);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "L3 read failed"),
            }
        }
        None
    }

    async fn get_l2(&self, key: &str) -> Option<CacheEntry> {
        let l2 = self.l2.as_ref()?;
        if !self.l2_breaker.allow() {
            debug!(key = %key, "L2 bypassed by circuit breaker");
            return None;
        }
        match l2.get(key).await {
            Ok(found) => {
                self.l2_breaker.record_success();
                found
            }
            Err(e) => {
                if e.is_tier_failure() {
                    self.l2_breaker.record_failure();
                }
                warn!(key = %key, error = %e, "L2 read failed");
                None
            }
        }
    }

    async fn populate_l1(&self, key: &str, entry: &CacheEntry) {
        let options = CacheOptions {
            ttl: entry.remaining_ttl(Utc::now()),
            tags: entry.tags.clone(),
        };
        if let Err(e) = self.l1.set(key, entry.value.clone(), options).await {
            warn!(key = %key, error = %e, "failed to promote entry to L1");
        }
    }

    /// Write a value through every available tier
    pub async fn set(&self, key: &str, value: Bytes, options: CacheOptions) -> CacheResult<()> {
        self.l1.set(key, value.clone(), options.clone()).await?;

        if let Some(l2) = &self.l2 {
            if self.l2_breaker.allow() {
                match l2.set(key, value.clone(), options.clone()).await {
                    Ok(()) => self.l2_breaker.record_success(),
                    Err(e) => {
                        if e.is_tier_failure() {
                            self.l2_breaker.record_failure();
                        }
                        warn!(key = %key, error = %e, "L2 write failed");
                    }
                }
            }
        }

        if let Some(l3) = &self.l3 {
            if let Err(e) = l3.set(key, value, options).await {
                warn!(key = %key, error = %e, "L3 write failed");
            }
        }
        Ok(())
    }

    /// Delete a key from every tier
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut deleted = self.l1.delete(key).await?;
        if let Some(l2) = &self.l2 {
            match l2.delete(key).await {
                Ok(found) => deleted |= found,
                Err(e) => warn!(key = %key, error = %e, "L2 delete failed"),
            }
        }
        if let Some(l3) = &self.l3 {
            match l3.delete(key).await {
                Ok(found) => deleted |= found,
                Err(e) => warn!(key = %key, error = %e, "L3 delete failed"),
            }
        }
        Ok(deleted)
    }

    /// Invalidate every entry carrying one of the tags, across all tiers
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let mut removed = self.l1.invalidate_by_tags(tags).await.unwrap_or(0);
        if let Some(l2) = &self.l2 {
            match l2.invalidate_by_tags(tags).await {
                Ok(count) => removed += count,
                Err(e) => warn!(error = %e, "L2 tag invalidation failed"),
            }
        }
        if let Some(l3) = &self.l3 {
            match l3.invalidate_by_tags(tags).await {
                Ok(count) => removed += count,
                Err(e) => warn!(error = %e, "L3 tag invalidation failed"),
            }
        }
        removed
    }

    /// Apply an invalidation event
    pub async fn handle_event(&self, event: InvalidationEvent) -> usize {
        let tags = event.tags();
        debug!(?event, ?tags, "applying invalidation event");
        self.invalidate_by_tags(&tags).await
    }

    /// Drop everything from every tier
    pub async fn clear(&self) -> CacheResult<()> {
        self.l1.clear().await?;
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.clear().await {
                warn!(error = %e, "L2 clear failed");
            }
        }
        if let Some(l3) = &self.l3 {
            if let Err(e) = l3.clear().await {
                warn!(error = %e, "L3 clear failed");
            }
        }
        Ok(())
    }

    /// Aggregate counters across tiers
    pub async fn stats(&self) -> CacheStats {
        let mut total = self.l1.stats().await.unwrap_or_default();
        if let Some(l2) = &self.l2 {
            if let Ok(stats) = l2.stats().await {
                total.merge(&stats);
            }
        }
        if let Some(l3) = &self.l3 {
            if let Ok(stats) = l3.stats().await {
                total.merge(&stats);
            }
        }
        total
    }

    /// Current L2 breaker state, for health reporting
    pub fn l2_breaker_state(&self) -> crate::breaker::BreakerState {
        self.l2_breaker.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::disk::DiskCache;
    use crate::error::CacheError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// L2 stand-in that always fails, for breaker tests
    struct FailingBackend {
        calls: AtomicU64,
    }

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Timeout)
        }
        async fn set(&self, _key: &str, _value: Bytes, _options: CacheOptions) -> CacheResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Timeout)
        }
        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Timeout)
        }
        async fn invalidate_by_tags(&self, _tags: &[String]) -> CacheResult<usize> {
            Err(CacheError::Timeout)
        }
        async fn clear(&self) -> CacheResult<()> {
            Err(CacheError::Timeout)
        }
        async fn stats(&self) -> CacheResult<CacheStats> {
            Ok(CacheStats::default())
        }
        async fn len(&self) -> CacheResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_l3_hit_promotes_to_l1() {
        let dir = tempfile::tempdir().unwrap();
        let l3: Arc<dyn CacheBackend> = Arc::new(DiskCache::with_dir(dir.path()).await.unwrap());
        l3.set("k", Bytes::from("deep"), CacheOptions::default())
            .await
            .unwrap();

        let l1 = Arc::new(MemoryCache::default());
        let cache = TieredCache::new(l1.clone(), None, Some(l3), TieredCacheConfig::default());

        let entry = cache.get("k").await.unwrap();
        assert_eq!(entry.value, Bytes::from("deep"));

        // The entry is now present in L1 directly.
        assert!(l1.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_l2_breaker_bypasses_after_failures() {
        let failing = Arc::new(FailingBackend {
            calls: AtomicU64::new(0),
        });
        let cache = TieredCache::new(
            Arc::new(MemoryCache::default()),
            Some(failing.clone() as Arc<dyn CacheBackend>),
            None,
            TieredCacheConfig {
                l2_failure_threshold: 2,
                l2_recovery_timeout: Duration::from_secs(60),
            },
        );

        for _ in 0..5 {
            let _ = cache.get("missing").await;
        }
        // Only the first two lookups reached L2; the breaker ate the rest.
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_survives_l2_failure() {
        let failing = Arc::new(FailingBackend {
            calls: AtomicU64::new(0),
        });
        let cache = TieredCache::new(
            Arc::new(MemoryCache::default()),
            Some(failing as Arc<dyn CacheBackend>),
            None,
            TieredCacheConfig::default(),
        );

        cache
            .set("k", Bytes::from("v"), CacheOptions::default())
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().value, Bytes::from("v"));
    }

    #[tokio::test]
    async fn test_configuration_change_invalidates_sources_tag() {
        let cache = TieredCache::memory_only(100);
        cache
            .set(
                "registry",
                Bytes::from("snapshot"),
                CacheOptions::default().with_tags(vec!["sources".into()]),
            )
            .await
            .unwrap();

        let removed = cache
            .handle_event(InvalidationEvent::ConfigurationChange)
            .await;
        assert_eq!(removed, 1);
        assert!(cache.get("registry").await.is_none());
    }
}
