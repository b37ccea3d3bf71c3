//! Cache backend implementations

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheResult;
use crate::stats::CacheStats;

pub mod disk;
pub mod memory;
pub mod redis;

/// A cached value with its expiry and grouping tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value
    #[serde(with = "serde_bytes")]
    pub value: Bytes,
    /// Absolute expiry; `None` means no TTL
    pub expires_at: Option<DateTime<Utc>>,
    /// Tags for bulk invalidation
    pub tags: Vec<String>,
    /// Last access timestamp
    pub last_access: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry from a value and options
    pub fn new(value: Bytes, options: &CacheOptions) -> Self {
        let now = Utc::now();
        Self {
            value,
            expires_at: options
                .ttl
                .map(|ttl| now + chrono::Duration::from_std(ttl).unwrap_or_default()),
            tags: options.tags.clone(),
            last_access: now,
        }
    }

    /// Whether the entry has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now >= expiry)
    }

    /// Remaining TTL, if an expiry is set
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expiry| expiry.signed_duration_since(now).to_std().unwrap_or_default())
    }
}

mod serde_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes.as_ref().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Vec<u8> = Vec::deserialize(deserializer)?;
        Ok(Bytes::from(vec))
    }
}

/// Options for cache writes
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Time-to-live
    pub ttl: Option<Duration>,
    /// Tags for grouping
    pub tags: Vec<String>,
}

impl CacheOptions {
    /// Options with a TTL and no tags
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            tags: Vec::new(),
        }
    }

    /// Attach tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Operations every cache tier supports
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live entry, refreshing recency bookkeeping
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store a value
    async fn set(&self, key: &str, value: Bytes, options: CacheOptions) -> CacheResult<()>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every entry whose tag set intersects `tags`; returns the
    /// count removed
    async fn invalidate_by_tags(&self, tags: &[String]) -> CacheResult<usize>;

    /// Drop all entries
    async fn clear(&self) -> CacheResult<()>;

    /// Tier counters
    async fn stats(&self) -> CacheResult<CacheStats>;

    /// Number of live entries
    async fn len(&self) -> CacheResult<usize>;

    /// Whether the tier holds no entries
    async fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len().await? == 0)
    }
}
