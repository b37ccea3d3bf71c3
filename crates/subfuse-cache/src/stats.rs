//! Cache statistics

use serde::{Deserialize, Serialize};

/// Counters for one cache tier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing (or an expired entry)
    pub misses: u64,
    /// Successful writes
    pub sets: u64,
    /// Explicit deletions
    pub deletes: u64,
    /// Capacity or TTL evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Hit ratio in [0, 1]; zero when no lookups were recorded
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Fold another tier's counters into this one
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.sets += other.sets;
        self.deletes += other.deletes;
        self.evictions += other.evictions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_merge() {
        let mut a = CacheStats {
            hits: 1,
            misses: 2,
            sets: 3,
            deletes: 0,
            evictions: 1,
        };
        let b = CacheStats {
            hits: 4,
            misses: 1,
            sets: 2,
            deletes: 5,
            evictions: 0,
        };
        a.merge(&b);
        assert_eq!(a.hits, 5);
        assert_eq!(a.misses, 3);
        assert_eq!(a.sets, 5);
        assert_eq!(a.deletes, 5);
        assert_eq!(a.evictions, 1);
    }
}
