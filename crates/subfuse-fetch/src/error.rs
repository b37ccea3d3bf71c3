//! Error types for the fetcher
//!
//! These never cross the fetcher's public boundary — `fetch` folds every
//! failure into a `FetchResult` — but the internal retry and breaker logic
//! branches on them.

use thiserror::Error;

/// Internal fetch failure
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The host's circuit breaker is open
    #[error("CircuitOpen")]
    CircuitOpen,

    /// The operation was cancelled
    #[error("cancelled")]
    Cancelled,

    /// The URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias for internal fetch operations
pub type FetchResultInternal<T> = Result<T, FetchError>;

impl FetchError {
    /// Whether the failure is worth another attempt.
    ///
    /// Transport errors and 5xx retry; 4xx is the caller's mistake and is
    /// terminal.
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Http(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::CircuitOpen | FetchError::Cancelled | FetchError::InvalidUrl(_) => false,
        }
    }
}
