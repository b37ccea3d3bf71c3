//! Source registry manager
//!
//! Owns the set of subscription sources: which exist, which tier and weight
//! each carries, when each is due, and how each has performed. The registry
//! is single-writer (this manager) and multi-reader; every read hands out a
//! snapshot taken under the lock.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use subfuse_cache::{InvalidationEvent, TieredCache};
use subfuse_core::{
    AppSettings, PerformanceRecord, ReputationWeights, SecurityValidator, SourceMetadata,
    SourceTier,
};

use crate::error::{SourceError, SourceResult};

/// Reputation floor below which attempts count toward auto-blacklisting
const REPUTATION_FLOOR: f64 = 0.1;

/// Consecutive below-floor attempts before a source is blacklisted
const BLACKLIST_STREAK: u32 = 10;

/// Aggregate registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatistics {
    /// Registered sources
    pub total_sources: usize,
    /// Enabled, non-blacklisted sources
    pub active_sources: usize,
    /// Blacklisted sources
    pub blacklisted_sources: usize,
    /// Source count per tier
    pub tier_distribution: HashMap<String, usize>,
    /// Mean response time across sources with history
    pub avg_response_time_ms: f64,
    /// Mean reputation across active sources
    pub avg_reputation: f64,
    /// Sources whose latest fetch succeeded
    pub successful_sources: usize,
}

/// The source registry
pub struct SourceManager {
    registry: RwLock<HashMap<String, SourceMetadata>>,
    validator: SecurityValidator,
    weights: ReputationWeights,
    cache: Option<Arc<TieredCache>>,
}

impl SourceManager {
    /// Create an empty registry
    pub fn new(validator: SecurityValidator) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            validator,
            weights: ReputationWeights::default(),
            cache: None,
        }
    }

    /// Attach the cache service so registry changes invalidate it
    pub fn with_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override the reputation coefficients
    pub fn with_reputation_weights(mut self, weights: ReputationWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Load the tiered source list from settings.
    ///
    /// Unknown tiers warn and fall back to experimental; entries failing
    /// security validation are skipped and logged. Returns the number of
    /// sources admitted.
    pub async fn load(&self, settings: &AppSettings) -> usize {
        let mut admitted = 0;
        let mut registry = self.registry.write().await;

        for (tier_name, tier_sources) in &settings.sources {
            let tier = match SourceTier::parse(tier_name) {
                Some(tier) => tier,
                None => {
                    warn!(tier = %tier_name, "unknown tier, treating as experimental");
                    SourceTier::Experimental
                }
            };

            for entry in &tier_sources.urls {
                let url = entry.url();
                if let Err(e) = self.validator.validate_source_url(url) {
                    warn!(url = %url, error = %e, "skipping invalid source");
                    continue;
                }
                if registry.contains_key(url) {
                    warn!(url = %url, "skipping duplicate source");
                    continue;
                }

                let mut source = SourceMetadata::new(url, tier);
                if let Some(weight) = entry.weight() {
                    source.weight = weight.clamp(0.0, 1.0);
                }
                source.protocols = entry.protocols().to_vec();
                source.update_frequency = entry.update_frequency().map(String::from);
                registry.insert(url.to_string(), source);
                admitted += 1;
            }
        }

        info!(count = admitted, "loaded sources from settings");
        admitted
    }

    /// Register a new source.
    ///
    /// Rejects duplicates and URLs failing the security validator; emits a
    /// configuration-change invalidation on success.
    pub async fn add_source(
        &self,
        url: &str,
        tier: SourceTier,
        weight: Option<f64>,
    ) -> SourceResult<()> {
        self.validator
            .validate_source_url(url)
            .map_err(|e| SourceError::Invalid(e.to_string()))?;

        {
            let mut registry = self.registry.write().await;
            if registry.contains_key(url) {
                return Err(SourceError::Duplicate);
            }
            let mut source = SourceMetadata::new(url, tier);
            if let Some(weight) = weight {
                source.weight = weight.clamp(0.0, 1.0);
            }
            registry.insert(url.to_string(), source);
        }

        info!(url = %url, tier = %tier.as_str(), "source added");
        self.emit(InvalidationEvent::ConfigurationChange).await;
        Ok(())
    }

    /// Remove a source. Idempotent; returns whether it existed.
    pub async fn remove_source(&self, url: &str) -> bool {
        let removed = self.registry.write().await.remove(url).is_some();
        if removed {
            info!(url = %url, "source removed");
            self.emit(InvalidationEvent::ConfigurationChange).await;
        }
        removed
    }

    /// Record one fetch outcome against a source.
    ///
    /// Appends to the bounded history, updates the last-fetch time, and
    /// applies the auto-blacklist rule: reputation below the floor for ten
    /// consecutive attempts blacklists the source as `low_reputation`.
    pub async fn update_performance(&self, url: &str, record: PerformanceRecord) {
        let mut registry = self.registry.write().await;
        let Some(source) = registry.get_mut(url) else {
            warn!(url = %url, "performance update for unknown source");
            return;
        };

        source.last_fetch = Some(record.timestamp);
        source.history.push(record);

        let reputation = source.reputation_score(Utc::now(), &self.weights);
        if reputation < REPUTATION_FLOOR {
            source.low_reputation_streak += 1;
            if source.low_reputation_streak >= BLACKLIST_STREAK && !source.blacklisted {
                source.blacklisted = true;
                source.blacklist_reason = Some("low_reputation".to_string());
                warn!(url = %url, reputation, "source auto-blacklisted");
            }
        } else {
            source.low_reputation_streak = 0;
        }
    }

    /// Enabled, non-blacklisted sources ordered by tier priority,
    /// reputation, then weight (all descending)
    pub async fn get_active_sources(&self) -> Vec<SourceMetadata> {
        let now = Utc::now();
        let registry = self.registry.read().await;
        let mut active: Vec<SourceMetadata> = registry
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();

        active.sort_by(|a, b| {
            b.tier
                .priority()
                .cmp(&a.tier.priority())
                .then(
                    b.reputation_score(now, &self.weights)
                        .partial_cmp(&a.reputation_score(now, &self.weights))
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(
                    b.weight
                        .partial_cmp(&a.weight)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        active
    }

    /// Snapshot of every registered source
    pub async fn get_all_sources(&self) -> Vec<SourceMetadata> {
        self.registry.read().await.values().cloned().collect()
    }

    /// Look up one source
    pub async fn get_source(&self, url: &str) -> Option<SourceMetadata> {
        self.registry.read().await.get(url).cloned()
    }

    /// Force a source's next fetch to bypass the cache by invalidating
    /// its cached body
    pub async fn refresh_source(&self, url: &str) -> bool {
        if self.registry.read().await.contains_key(url) {
            self.emit(InvalidationEvent::SourceUpdate {
                url: url.to_string(),
            })
            .await;
            true
        } else {
            false
        }
    }

    /// Whether a source is due for another fetch per its schedule
    pub async fn should_update(&self, url: &str) -> bool {
        match self.registry.read().await.get(url) {
            Some(source) => source.should_update(Utc::now()),
            None => false,
        }
    }

    /// Aggregate registry statistics
    pub async fn get_statistics(&self) -> SourceStatistics {
        let now = Utc::now();
        let registry = self.registry.read().await;

        let mut tier_distribution: HashMap<String, usize> = HashMap::new();
        let mut response_times = Vec::new();
        let mut reputations = Vec::new();
        let mut active = 0;
        let mut blacklisted = 0;
        let mut successful = 0;

        for source in registry.values() {
            *tier_distribution
                .entry(source.tier.as_str().to_string())
                .or_insert(0) += 1;
            if source.is_active() {
                active += 1;
                reputations.push(source.reputation_score(now, &self.weights));
            }
            if source.blacklisted {
                blacklisted += 1;
            }
            if !source.history.is_empty() {
                response_times.push(source.avg_response_time_ms());
            }
            if source.history.latest().map(|r| r.success).unwrap_or(false) {
                successful += 1;
            }
        }

        SourceStatistics {
            total_sources: registry.len(),
            active_sources: active,
            blacklisted_sources: blacklisted,
            tier_distribution,
            avg_response_time_ms: mean(&response_times),
            avg_reputation: mean(&reputations),
            successful_sources: successful,
        }
    }

    /// The security validator shared with the API's validate-urls endpoint
    pub fn validator(&self) -> &SecurityValidator {
        &self.validator
    }

    async fn emit(&self, event: InvalidationEvent) {
        if let Some(cache) = &self.cache {
            cache.handle_event(event).await;
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SourceManager {
        SourceManager::new(SecurityValidator::default())
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let manager = manager();
        manager
            .add_source("https://one.example.com/sub", SourceTier::Premium, None)
            .await
            .unwrap();

        assert!(manager.get_source("https://one.example.com/sub").await.is_some());
        assert!(manager.remove_source("https://one.example.com/sub").await);
        // Idempotent removal.
        assert!(!manager.remove_source("https://one.example.com/sub").await);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_with_message() {
        let manager = manager();
        manager
            .add_source("https://one.example.com/sub", SourceTier::Bulk, None)
            .await
            .unwrap();
        let err = manager
            .add_source("https://one.example.com/sub", SourceTier::Bulk, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Source already exists");
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let manager = manager();
        let err = manager
            .add_source("ftp://one.example.com/sub", SourceTier::Bulk, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_active_ordering_by_tier() {
        let manager = manager();
        manager
            .add_source("https://bulk.example.com/sub", SourceTier::Bulk, None)
            .await
            .unwrap();
        manager
            .add_source("https://prem.example.com/sub", SourceTier::Premium, None)
            .await
            .unwrap();

        let active = manager.get_active_sources().await;
        assert_eq!(active[0].url, "https://prem.example.com/sub");
        assert_eq!(active[1].url, "https://bulk.example.com/sub");
    }

    #[tokio::test]
    async fn test_weight_breaks_ties() {
        let manager = manager();
        manager
            .add_source("https://a.example.com/sub", SourceTier::Bulk, Some(0.2))
            .await
            .unwrap();
        manager
            .add_source("https://b.example.com/sub", SourceTier::Bulk, Some(0.8))
            .await
            .unwrap();

        let active = manager.get_active_sources().await;
        assert_eq!(active[0].url, "https://b.example.com/sub");
    }

    #[tokio::test]
    async fn test_auto_blacklist_after_streak() {
        let manager = manager();
        manager
            .add_source("https://dead.example.com/sub", SourceTier::Experimental, Some(0.0))
            .await
            .unwrap();

        for _ in 0..10 {
            manager
                .update_performance(
                    "https://dead.example.com/sub",
                    PerformanceRecord::failure(5000, "timeout"),
                )
                .await;
        }

        let source = manager
            .get_source("https://dead.example.com/sub")
            .await
            .unwrap();
        assert!(source.blacklisted);
        assert_eq!(source.blacklist_reason.as_deref(), Some("low_reputation"));
        assert!(manager.get_active_sources().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let manager = manager();
        manager
            .add_source("https://big.example.com/sub", SourceTier::Bulk, None)
            .await
            .unwrap();
        for i in 0..150 {
            manager
                .update_performance(
                    "https://big.example.com/sub",
                    PerformanceRecord::success(i, 100),
                )
                .await;
        }
        let source = manager
            .get_source("https://big.example.com/sub")
            .await
            .unwrap();
        assert_eq!(source.history.len(), 100);
    }

    #[tokio::test]
    async fn test_statistics() {
        let manager = manager();
        manager
            .add_source("https://one.example.com/sub", SourceTier::Premium, None)
            .await
            .unwrap();
        manager
            .add_source("https://two.example.com/sub", SourceTier::Bulk, None)
            .await
            .unwrap();
        manager
            .update_performance(
                "https://one.example.com/sub",
                PerformanceRecord::success(42, 120),
            )
            .await;

        let stats = manager.get_statistics().await;
        assert_eq!(stats.total_sources, 2);
        assert_eq!(stats.active_sources, 2);
        assert_eq!(stats.successful_sources, 1);
        assert_eq!(stats.tier_distribution["premium"], 1);
        assert_eq!(stats.tier_distribution["bulk"], 1);
    }

    #[tokio::test]
    async fn test_refresh_invalidates_cached_body() {
        use bytes::Bytes;
        use subfuse_cache::{fetch_key, fetch_tag, CacheOptions};

        let cache = std::sync::Arc::new(subfuse_cache::TieredCache::memory_only(100));
        let manager = SourceManager::new(SecurityValidator::default())
            .with_cache(std::sync::Arc::clone(&cache));

        let url = "https://one.example.com/sub";
        manager
            .add_source(url, SourceTier::Bulk, None)
            .await
            .unwrap();
        cache
            .set(
                &fetch_key(url),
                Bytes::from("cached body"),
                CacheOptions::default().with_tags(vec![fetch_tag(url)]),
            )
            .await
            .unwrap();

        assert!(manager.refresh_source(url).await);
        assert!(cache.get(&fetch_key(url)).await.is_none());
        assert!(!manager.refresh_source("https://absent.example.com/sub").await);
    }

    #[tokio::test]
    async fn test_load_from_settings() {
        let yaml = r#"
sources:
  premium:
    urls:
      - https://prem.example.com/sub
  mystery_tier:
    urls:
      - https://odd.example.com/sub
  bulk:
    urls:
      - ftp://bad.example.com/sub
"#;
        let settings: AppSettings = serde_yaml::from_str(yaml).unwrap();
        let manager = manager();
        let admitted = manager.load(&settings).await;

        // The ftp URL is skipped; the unknown tier falls back to experimental.
        assert_eq!(admitted, 2);
        let odd = manager
            .get_source("https://odd.example.com/sub")
            .await
            .unwrap();
        assert_eq!(odd.tier, SourceTier::Experimental);
    }
}
