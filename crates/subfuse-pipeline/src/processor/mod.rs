//! Record processing: security gating, deduplication, enhancement

pub mod dedup;
pub mod enhance;
pub mod score;

pub use dedup::{deduplicate, find_duplicates};
pub use enhance::{EnhanceError, Enhancer, GeoOptimizer, QualityPredictor};
pub use score::{initial_score, score_batch};

use tracing::debug;

use subfuse_core::{DedupStrategy, SecurityValidator, VpnConfig};

/// Counters describing one processing pass
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ProcessStats {
    /// Records entering the processor
    pub input: usize,
    /// Records dropped by the security gate
    pub dropped_unsafe: usize,
    /// Records dropped for invariant violations
    pub dropped_invalid: usize,
    /// Duplicates folded away
    pub duplicates_removed: usize,
    /// Records surviving the pass
    pub output: usize,
}

/// The processing stage: gate, dedup, enhance
pub struct Processor {
    validator: SecurityValidator,
    enhancer: Enhancer,
}

impl Processor {
    /// Build a processor around a validator with no enhancement hooks
    pub fn new(validator: SecurityValidator) -> Self {
        Self {
            validator,
            enhancer: Enhancer::new(),
        }
    }

    /// Replace the enhancement stage
    pub fn with_enhancer(mut self, enhancer: Enhancer) -> Self {
        self.enhancer = enhancer;
        self
    }

    /// Run the full pass: security gate, invariant check, dedup, enhance
    pub async fn process(
        &self,
        configs: Vec<VpnConfig>,
        strategy: DedupStrategy,
    ) -> (Vec<VpnConfig>, ProcessStats) {
        let mut stats = ProcessStats {
            input: configs.len(),
            ..Default::default()
        };

        let mut gated = Vec::with_capacity(configs.len());
        for config in configs {
            if config.validate().is_err() {
                stats.dropped_invalid += 1;
                continue;
            }
            let verdict = self.validator.check_config(&config);
            if !verdict.safe {
                debug!(server = %config.server, reason = ?verdict.reason, "record dropped by security gate");
                stats.dropped_unsafe += 1;
                continue;
            }
            gated.push(config);
        }

        let before_dedup = gated.len();
        let deduped = deduplicate(gated, strategy);
        stats.duplicates_removed = before_dedup - deduped.len();

        let enhanced = self.enhancer.apply(deduped).await;
        stats.output = enhanced.len();
        (enhanced, stats)
    }
}
