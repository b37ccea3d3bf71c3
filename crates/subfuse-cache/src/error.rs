//! Error types for the cache tiers

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Entry encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Redis tier error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Disk tier I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Disk index could not be parsed
    #[error("Index error: {0}")]
    Index(String),

    /// Tier bypassed by its circuit breaker
    #[error("Cache tier circuit open")]
    CircuitOpen,

    /// Tier operation exceeded its deadline
    #[error("Cache operation timed out")]
    Timeout,

    /// Backend misconfiguration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    /// Whether the error should count against the tier's circuit breaker
    pub fn is_tier_failure(&self) -> bool {
        matches!(
            self,
            CacheError::Redis(_) | CacheError::Timeout | CacheError::Io(_)
        )
    }
}
