//! # Subfuse Cache
//!
//! Tiered caching for the subfuse platform:
//!
//! - **L1**: in-process LRU with TTL and a tag index
//! - **L2**: Redis, bincode-encoded entries, bounded operation deadline,
//!   protected by a circuit breaker
//! - **L3**: persistent disk store (sharded value files + JSON index) that
//!   survives restarts
//!
//! Lookups walk L1 → L2 → L3 and repopulate upward on hit. Invalidation is
//! tag-based: registry changes invalidate the `sources` tag, per-source
//! refetches invalidate `fetch:{url_hash}`.

#![warn(clippy::all)]

pub mod backend;
pub mod breaker;
pub mod error;
pub mod invalidation;
pub mod stats;
pub mod tiered;

pub use backend::{
    disk::{DiskCache, DiskCacheConfig},
    memory::{MemoryCache, MemoryCacheConfig},
    redis::{RedisCache, RedisCacheConfig},
    CacheBackend, CacheEntry, CacheOptions,
};
pub use breaker::{BreakerState, CircuitBreaker};
pub use error::{CacheError, CacheResult};
pub use invalidation::{fetch_key, fetch_tag, InvalidationEvent, SOURCES_TAG};
pub use stats::CacheStats;
pub use tiered::{TieredCache, TieredCacheConfig};
