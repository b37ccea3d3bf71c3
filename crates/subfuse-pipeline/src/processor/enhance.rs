//! Best-effort enhancement hooks
//!
//! An optional predictor reorders records by expected quality and an
//! optional geo optimizer reorders by proximity to a user region. Both are
//! strictly best-effort: any failure leaves the input list unchanged and
//! logs the event.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use subfuse_core::VpnConfig;

/// Enhancement failure; callers always recover
#[derive(Error, Debug)]
#[error("enhancement failed: {0}")]
pub struct EnhanceError(pub String);

/// Ranks configurations by predicted quality
#[async_trait]
pub trait QualityPredictor: Send + Sync {
    /// Return the list reordered best-first, with scores updated
    async fn rank(&self, configs: Vec<VpnConfig>) -> Result<Vec<VpnConfig>, EnhanceError>;
}

/// Reorders configurations by proximity to a user region
#[async_trait]
pub trait GeoOptimizer: Send + Sync {
    /// Return the list reordered closest-first for the region
    async fn reorder(
        &self,
        configs: Vec<VpnConfig>,
        region: &str,
    ) -> Result<Vec<VpnConfig>, EnhanceError>;
}

/// Optional enhancement stage
#[derive(Default, Clone)]
pub struct Enhancer {
    predictor: Option<Arc<dyn QualityPredictor>>,
    geo: Option<Arc<dyn GeoOptimizer>>,
    region: Option<String>,
}

impl Enhancer {
    /// An enhancer with no hooks; `apply` is the identity
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a quality predictor
    pub fn with_predictor(mut self, predictor: Arc<dyn QualityPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Attach a geo optimizer targeting a region
    pub fn with_geo(mut self, geo: Arc<dyn GeoOptimizer>, region: impl Into<String>) -> Self {
        self.geo = Some(geo);
        self.region = Some(region.into());
        self
    }

    /// Run the configured hooks, falling back to the input on any failure
    pub async fn apply(&self, configs: Vec<VpnConfig>) -> Vec<VpnConfig> {
        let mut current = configs;

        if let Some(predictor) = &self.predictor {
            let before = current.clone();
            match predictor.rank(current).await {
                Ok(ranked) if ranked.len() == before.len() => current = ranked,
                Ok(ranked) => {
                    warn!(
                        expected = before.len(),
                        got = ranked.len(),
                        "predictor changed list size, keeping original order"
                    );
                    current = before;
                }
                Err(e) => {
                    warn!(error = %e, "quality predictor failed, keeping original order");
                    current = before;
                }
            }
        }

        if let (Some(geo), Some(region)) = (&self.geo, &self.region) {
            let before = current.clone();
            match geo.reorder(current, region).await {
                Ok(reordered) if reordered.len() == before.len() => current = reordered,
                Ok(_) | Err(_) => {
                    warn!(region = %region, "geo optimizer failed, keeping original order");
                    current = before;
                }
            }
        }
        current
    }
}
