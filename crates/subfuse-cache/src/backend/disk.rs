//! Persistent L3 cache on local disk
//!
//! Values live in sharded files; an index file maps each key to its file,
//! expiry, and tags so entries survive restarts. Index writes go through a
//! temp file and rename.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::{CacheBackend, CacheEntry, CacheOptions};
use crate::error::{CacheError, CacheResult};
use crate::stats::CacheStats;

/// Disk tier configuration
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Root directory for cache storage
    pub cache_dir: PathBuf,
    /// Default TTL applied when a write carries none
    pub default_ttl: Option<Duration>,
    /// Number of shard subdirectories
    pub shard_count: u8,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/tmp/subfuse-cache"),
            default_ttl: Some(Duration::from_secs(86_400)),
            shard_count: 16,
        }
    }
}

/// Index record for one cached key
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct IndexEntry {
    file: PathBuf,
    expires_at: Option<DateTime<Utc>>,
    tags: Vec<String>,
    last_access: DateTime<Utc>,
}

/// Disk cache backend
pub struct DiskCache {
    config: DiskCacheConfig,
    index: RwLock<HashMap<String, IndexEntry>>,
    stats: RwLock<CacheStats>,
}

impl DiskCache {
    /// Open (or create) a disk cache under the configured directory
    pub async fn new(config: DiskCacheConfig) -> CacheResult<Self> {
        fs::create_dir_all(&config.cache_dir).await?;
        for shard in 0..config.shard_count {
            fs::create_dir_all(config.cache_dir.join(format!("{:02x}", shard))).await?;
        }

        let cache = Self {
            config,
            index: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        };
        cache.load_index().await?;
        Ok(cache)
    }

    /// Open a disk cache with defaults in the given directory
    pub async fn with_dir(dir: impl AsRef<Path>) -> CacheResult<Self> {
        Self::new(DiskCacheConfig {
            cache_dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        })
        .await
    }

    fn value_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let shard = digest[0] % self.config.shard_count;
        self.config
            .cache_dir
            .join(format!("{:02x}", shard))
            .join(format!("{}.val", hex::encode(digest)))
    }

    fn index_path(&self) -> PathBuf {
        self.config.cache_dir.join("index.json")
    }

    async fn load_index(&self) -> CacheResult<()> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(());
        }
        let data = fs::read(&path).await?;
        let loaded: HashMap<String, IndexEntry> = serde_json::from_slice(&data)
            .map_err(|e| CacheError::Index(format!("failed to parse index: {}", e)))?;
        *self.index.write() = loaded;
        Ok(())
    }

    async fn save_index(&self) -> CacheResult<()> {
        let snapshot = self.index.read().clone();
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| CacheError::Index(format!("failed to serialize index: {}", e)))?;

        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let now = Utc::now();
        let record = {
            let index = self.index.read();
            index.get(key).cloned()
        };

        let Some(record) = record else {
            self.stats.write().misses += 1;
            return Ok(None);
        };

        if matches!(record.expires_at, Some(expiry) if now >= expiry) {
            self.index.write().remove(key);
            let _ = fs::remove_file(&record.file).await;
            let mut stats = self.stats.write();
            stats.evictions += 1;
            stats.misses += 1;
            return Ok(None);
        }

        let value = match fs::read(&record.file).await {
            Ok(data) => Bytes::from(data),
            Err(_) => {
                // Index points at a vanished file; drop the stale record.
                self.index.write().remove(key);
                self.stats.write().misses += 1;
                return Ok(None);
            }
        };

        if let Some(entry) = self.index.write().get_mut(key) {
            entry.last_access = now;
        }
        self.stats.write().hits += 1;

        Ok(Some(CacheEntry {
            value,
            expires_at: record.expires_at,
            tags: record.tags,
            last_access: now,
        }))
    }

    async fn set(&self, key: &str, value: Bytes, mut options: CacheOptions) -> CacheResult<()> {
        if options.ttl.is_none() {
            options.ttl = self.config.default_ttl;
        }
        let now = Utc::now();
        let path = self.value_path(key);
        fs::write(&path, &value).await?;

        let record = IndexEntry {
            file: path,
            expires_at: options
                .ttl
                .map(|ttl| now + chrono::Duration::from_std(ttl).unwrap_or_default()),
            tags: options.tags,
            last_access: now,
        };
        self.index.write().insert(key.to_string(), record);
        self.stats.write().sets += 1;
        self.save_index().await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed = self.index.write().remove(key);
        match removed {
            Some(record) => {
                let _ = fs::remove_file(&record.file).await;
                self.stats.write().deletes += 1;
                self.save_index().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> CacheResult<usize> {
        let victims: Vec<(String, PathBuf)> = {
            let index = self.index.read();
            index
                .iter()
                .filter(|(_, entry)| entry.tags.iter().any(|t| tags.contains(t)))
                .map(|(key, entry)| (key.clone(), entry.file.clone()))
                .collect()
        };

        {
            let mut index = self.index.write();
            for (key, _) in &victims {
                index.remove(key);
            }
        }
        for (_, file) in &victims {
            let _ = fs::remove_file(file).await;
        }

        self.stats.write().deletes += victims.len() as u64;
        self.save_index().await?;
        Ok(victims.len())
    }

    async fn clear(&self) -> CacheResult<()> {
        let files: Vec<PathBuf> = {
            let mut index = self.index.write();
            let files = index.values().map(|e| e.file.clone()).collect();
            index.clear();
            files
        };
        for file in files {
            let _ = fs::remove_file(&file).await;
        }
        self.save_index().await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(*self.stats.read())
    }

    async fn len(&self) -> CacheResult<usize> {
        Ok(self.index.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_restart_survival() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = DiskCache::with_dir(dir.path()).await.unwrap();
            cache
                .set("k", Bytes::from("persisted"), CacheOptions::default())
                .await
                .unwrap();
        }

        // A fresh instance over the same directory sees the entry.
        let reopened = DiskCache::with_dir(dir.path()).await.unwrap();
        let entry = reopened.get("k").await.unwrap().unwrap();
        assert_eq!(entry.value, Bytes::from("persisted"));
    }

    #[tokio::test]
    async fn test_expired_entry_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_dir(dir.path()).await.unwrap();
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
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tag_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_dir(dir.path()).await.unwrap();
        cache
            .set(
                "a",
                Bytes::from("1"),
                CacheOptions::default().with_tags(vec!["sources".into()]),
            )
            .await
            .unwrap();
        cache
            .set("b", Bytes::from("2"), CacheOptions::default())
            .await
            .unwrap();

        let removed = cache
            .invalidate_by_tags(&["sources".into()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_dir(dir.path()).await.unwrap();
        assert!(!cache.delete("absent").await.unwrap());
    }
}
