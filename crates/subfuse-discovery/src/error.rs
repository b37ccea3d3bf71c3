//! Error types for source discovery

use thiserror::Error;

/// Main error type for discovery operations
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream API rejected the request
    #[error("API error: HTTP {status}")]
    Api {
        /// Response status code
        status: u16,
    },

    /// The response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
