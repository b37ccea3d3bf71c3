//! Distributed L2 cache backed by Redis

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CacheBackend, CacheEntry, CacheOptions};
use crate::error::{CacheError, CacheResult};
use crate::stats::CacheStats;

/// Redis tier configuration
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Connection URL
    pub url: String,
    /// Deadline for any single Redis operation
    pub operation_timeout: Duration,
    /// Default TTL applied when a write carries none
    pub default_ttl: Option<Duration>,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            operation_timeout: Duration::from_secs(2),
            default_ttl: Some(Duration::from_secs(3600)),
            key_prefix: "subfuse:cache:".to_string(),
        }
    }
}

/// Redis cache backend
pub struct RedisCache {
    connection: ConnectionManager,
    config: RedisCacheConfig,
    stats: RwLock<CacheStats>,
}

impl RedisCache {
    /// Connect with the given configuration
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Configuration(format!("invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            config,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Connect to a single Redis instance with defaults
    pub async fn connect(url: &str) -> CacheResult<Self> {
        Self::new(RedisCacheConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}tag:{}", self.config.key_prefix, tag)
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let full_key = self.prefixed(key);
        let mut conn = self.connection.clone();

        let raw: Option<Vec<u8>> = self
            .with_deadline(redis::cmd("GET").arg(&full_key).query_async(&mut conn))
            .await?;

        let Some(data) = raw else {
            self.stats.write().misses += 1;
            return Ok(None);
        };

        // A payload this tier cannot decode is treated as a miss, not an
        // error: another writer version may own the slot.
        match bincode::deserialize::<CacheEntry>(&data) {
            Ok(entry) if !entry.is_expired(Utc::now()) => {
                self.stats.write().hits += 1;
                Ok(Some(entry))
            }
            Ok(_) => {
                self.stats.write().misses += 1;
                Ok(None)
            }
            Err(e) => {
                debug!(key = %key, error = %e, "undecodable L2 entry, treating as miss");
                self.stats.write().misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, mut options: CacheOptions) -> CacheResult<()> {
        if options.ttl.is_none() {
            options.ttl = self.config.default_ttl;
        }
        let entry = CacheEntry::new(value, &options);
        let data = bincode::serialize(&entry)?;
        let full_key = self.prefixed(key);
        let mut conn = self.connection.clone();

        if let Some(ttl) = options.ttl {
            self.with_deadline(
                redis::cmd("SETEX")
                    .arg(&full_key)
                    .arg(ttl.as_secs().max(1))
                    .arg(&data)
                    .query_async::<_, ()>(&mut conn),
            )
            .await?;
        } else {
            self.with_deadline(
                redis::cmd("SET")
                    .arg(&full_key)
                    .arg(&data)
                    .query_async::<_, ()>(&mut conn),
            )
            .await?;
        }

        for tag in &options.tags {
            if let Err(e) = self
                .with_deadline(
                    redis::cmd("SADD")
                        .arg(self.tag_key(tag))
                        .arg(&full_key)
                        .query_async::<_, ()>(&mut conn),
                )
                .await
            {
                warn!(tag = %tag, error = %e, "failed to index L2 tag");
            }
        }

        self.stats.write().sets += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let removed: u64 = self
            .with_deadline(
                redis::cmd("DEL")
                    .arg(self.prefixed(key))
                    .query_async(&mut conn),
            )
            .await?;
        if removed > 0 {
            self.stats.write().deletes += 1;
        }
        Ok(removed > 0)
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> CacheResult<usize> {
        let mut conn = self.connection.clone();
        let mut removed = 0usize;

        for tag in tags {
            let tag_key = self.tag_key(tag);
            let members: Vec<String> = self
                .with_deadline(redis::cmd("SMEMBERS").arg(&tag_key).query_async(&mut conn))
                .await?;
            for member in &members {
                let count: u64 = self
                    .with_deadline(redis::cmd("DEL").arg(member).query_async(&mut conn))
                    .await?;
                removed += count as usize;
            }
            self.with_deadline(redis::cmd("DEL").arg(&tag_key).query_async::<_, ()>(&mut conn))
                .await?;
        }

        self.stats.write().deletes += removed as u64;
        Ok(removed)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.config.key_prefix);
        let keys: Vec<String> = self
            .with_deadline(redis::cmd("KEYS").arg(&pattern).query_async(&mut conn))
            .await?;
        for chunk in keys.chunks(100) {
            let mut cmd = redis::cmd("DEL");
            for key in chunk {
                cmd.arg(key);
            }
            self.with_deadline(cmd.query_async::<_, ()>(&mut conn)).await?;
        }
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(*self.stats.read())
    }

    async fn len(&self) -> CacheResult<usize> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.config.key_prefix);
        let keys: Vec<String> = self
            .with_deadline(redis::cmd("KEYS").arg(&pattern).query_async(&mut conn))
            .await?;
        let tag_prefix = format!("{}tag:", self.config.key_prefix);
        Ok(keys.iter().filter(|k| !k.starts_with(&tag_prefix)).count())
    }
}
