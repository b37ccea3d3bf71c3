//! Retry policy: exponential backoff with jitter

use std::time::Duration;

/// Backoff parameters for failed requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier per attempt
    pub factor: f64,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Add random jitter up to 50% of the delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy with a single attempt and no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), `None` once attempts
    /// are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let exponential =
            self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32 - 1);
        let mut delay_ms = exponential.min(self.max_delay.as_millis() as f64) as u64;

        if self.jitter {
            let jitter_range = delay_ms / 2;
            if jitter_range > 0 {
                delay_ms += rand::random::<u64>() % (jitter_range + 1);
            }
        }
        Some(Duration::from_millis(
            delay_ms.min(self.max_delay.as_millis() as u64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_exponential_progression() {
        let policy = deterministic();
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(3), None);
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(8),
            max_attempts: 5,
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for(1).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_no_retry_policy() {
        assert_eq!(RetryPolicy::no_retry().delay_for(1), None);
    }
}
