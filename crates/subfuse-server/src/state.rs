//! Shared application state
//!
//! Handlers receive a clone of [`AppState`]. The merger slot starts empty
//! and is filled once initialization completes; merger-dependent endpoints
//! return 503 until then.

use std::sync::Arc;
use tokio::sync::RwLock;

use subfuse_cache::TieredCache;
use subfuse_jobs::JobManager;
use subfuse_pipeline::Merger;

use crate::error::{ServerError, ServerResult};

/// Shared state behind every request handler
#[derive(Clone)]
pub struct AppState {
    merger: Arc<RwLock<Option<Arc<Merger>>>>,
    /// Background job manager
    pub jobs: JobManager,
    /// Tiered cache, when one is configured
    pub cache: Option<Arc<TieredCache>>,
}

impl AppState {
    /// State with an empty merger slot
    pub fn new(jobs: JobManager, cache: Option<Arc<TieredCache>>) -> Self {
        Self {
            merger: Arc::new(RwLock::new(None)),
            jobs,
            cache,
        }
    }

    /// Install the merger once initialization completes
    pub async fn set_merger(&self, merger: Arc<Merger>) {
        *self.merger.write().await = Some(merger);
    }

    /// Whether the merger is available
    pub async fn merger_initialized(&self) -> bool {
        self.merger.read().await.is_some()
    }

    /// The merger, or the 503 error before initialization
    pub async fn merger(&self) -> ServerResult<Arc<Merger>> {
        self.merger
            .read()
            .await
            .clone()
            .ok_or(ServerError::NotInitialized)
    }
}
