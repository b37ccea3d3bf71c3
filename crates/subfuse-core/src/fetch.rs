//! Fetch outcome record

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of retrieving one subscription URL.
///
/// Ephemeral: consumed by the pipeline and folded into the source's
/// performance history, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// Whether usable content was retrieved
    pub success: bool,
    /// Raw configuration lines recovered from the body
    pub configs: Vec<String>,
    /// Wall-clock retrieval time
    pub response_time: Duration,
    /// HTTP status, when a response was received
    pub status_code: Option<u16>,
    /// Failure description, when `success` is false
    pub error: Option<String>,
    /// Whether the body was served from cache
    pub cache_hit: bool,
}

impl FetchResult {
    /// A successful fetch with the recovered lines
    pub fn success(configs: Vec<String>, response_time: Duration, status_code: u16) -> Self {
        Self {
            success: true,
            configs,
            response_time,
            status_code: Some(status_code),
            error: None,
            cache_hit: false,
        }
    }

    /// A failed fetch
    pub fn failure(error: impl Into<String>, response_time: Duration) -> Self {
        Self {
            success: false,
            configs: Vec::new(),
            response_time,
            status_code: None,
            error: Some(error.into()),
            cache_hit: false,
        }
    }

    /// A fetch aborted by cancellation
    pub fn cancelled(response_time: Duration) -> Self {
        Self::failure("cancelled", response_time)
    }

    /// Attach the HTTP status to a failure
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Mark the result as served from cache
    pub fn with_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}
