//! Per-host circuit breakers

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use subfuse_cache::{BreakerState, CircuitBreaker};

/// Breaker parameters shared by every host
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before a host's circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Registry of per-host circuit breakers, created on demand
pub struct HostBreakers {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: BreakerConfig,
}

impl HostBreakers {
    /// Create a registry with the given parameters
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    fn breaker(&self, host: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.config.failure_threshold,
                    self.config.recovery_timeout,
                ))
            })
            .clone()
    }

    /// Whether a call to the host may proceed
    pub fn allow(&self, host: &str) -> bool {
        self.breaker(host).allow()
    }

    /// Record a successful call
    pub fn record_success(&self, host: &str) {
        self.breaker(host).record_success();
    }

    /// Record a failed call
    pub fn record_failure(&self, host: &str) {
        self.breaker(host).record_failure();
    }

    /// Current state for a host
    pub fn state(&self, host: &str) -> BreakerState {
        self.breaker(host).state()
    }
}
