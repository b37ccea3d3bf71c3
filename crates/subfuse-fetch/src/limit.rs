//! Per-host politeness limits
//!
//! One token bucket per host, created on demand and kept for the process
//! lifetime.

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type HostLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>;

/// Per-host token bucket configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Replenishment period per token
    pub period: Duration,
    /// Burst size
    pub burst: NonZeroU32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            burst: nonzero!(2u32),
        }
    }
}

/// Registry of per-host token buckets
pub struct HostRateLimiters {
    limiters: DashMap<String, HostLimiter>,
    quota: Quota,
}

impl HostRateLimiters {
    /// Create a registry with the given per-host quota
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::with_period(config.period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(config.burst);
        Self {
            limiters: DashMap::new(),
            quota,
        }
    }

    /// Wait until the host's bucket grants a token
    pub async fn acquire(&self, host: &str) {
        let limiter = self
            .limiters
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();
        limiter.until_ready().await;
    }

    /// Number of hosts with a bucket
    pub fn host_count(&self) -> usize {
        self.limiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiters = HostRateLimiters::new(RateLimitConfig {
            period: Duration::from_millis(50),
            burst: nonzero!(2u32),
        });

        let start = Instant::now();
        limiters.acquire("a.example.com").await;
        limiters.acquire("a.example.com").await;
        // Burst of two passes immediately.
        assert!(start.elapsed() < Duration::from_millis(40));

        limiters.acquire("a.example.com").await;
        // The third token waits for replenishment.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiters = HostRateLimiters::new(RateLimitConfig {
            period: Duration::from_secs(10),
            burst: nonzero!(1u32),
        });

        let start = Instant::now();
        limiters.acquire("a.example.com").await;
        limiters.acquire("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiters.host_count(), 2);
    }
}
