//! Pipeline orchestration
//!
//! The merger drives the full flow: active sources → fetcher (cached) →
//! parser bank → processor → output formatters. Components hold references
//! to the shared services; the merger owns nothing but the wiring.

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use subfuse_core::{
    DedupStrategy, FetchResult, PerformanceRecord, ReputationWeights, SourceMetadata, VpnConfig,
};
use subfuse_fetch::Fetcher;
use subfuse_parsers::ParserBank;
use subfuse_sources::SourceManager;

use crate::error::{PipelineError, PipelineResult};
use crate::output::{OutputFormat, OutputManager};
use crate::processor::{score_batch, ProcessStats, Processor};

/// Progress callback: fraction in [0, 1] plus a phase message
pub type ProgressFn = Arc<dyn Fn(f64, &str) + Send + Sync>;

/// Merger tuning
#[derive(Debug, Clone)]
pub struct MergerConfig {
    /// Deduplication strategy for pipeline runs
    pub dedup_strategy: DedupStrategy,
    /// Reputation coefficients used for initial scoring
    pub reputation: ReputationWeights,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            dedup_strategy: DedupStrategy::Exact,
            reputation: ReputationWeights::default(),
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Sources attempted
    pub sources_processed: usize,
    /// Sources whose fetch succeeded
    pub successful_sources: usize,
    /// Configurations surviving the processor
    pub configurations_found: usize,
    /// Duplicates folded away
    pub duplicates_removed: usize,
    /// Records dropped by the security gate
    pub dropped_unsafe: usize,
    /// Written output files, keyed by format name
    pub output_files: HashMap<String, PathBuf>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

/// Aggregate counters for the statistics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MergerStatistics {
    /// Registered sources
    pub total_sources: usize,
    /// Sources whose latest fetch succeeded
    pub successful_sources: usize,
    /// Configurations from the most recent run
    pub total_configs: usize,
    /// successful_sources / total_sources
    pub success_rate: f64,
}

/// Monotonic progress reporter
struct ProgressTracker {
    last: Mutex<f64>,
    callback: Option<ProgressFn>,
}

impl ProgressTracker {
    fn new(callback: Option<ProgressFn>) -> Self {
        Self {
            last: Mutex::new(0.0),
            callback,
        }
    }

    /// Report progress; regressions are clamped to the highest value seen
    fn report(&self, value: f64, message: &str) {
        let value = {
            let mut last = self.last.lock();
            *last = last.max(value.clamp(0.0, 1.0));
            *last
        };
        if let Some(callback) = &self.callback {
            callback(value, message);
        }
    }
}

/// The pipeline orchestrator
pub struct Merger {
    sources: Arc<SourceManager>,
    fetcher: Arc<Fetcher>,
    parsers: Arc<ParserBank>,
    processor: Processor,
    config: MergerConfig,
    // Read-mostly snapshots of the latest run, swapped wholesale so API
    // readers never wait on a writer.
    last_configs: ArcSwap<Vec<VpnConfig>>,
    last_report: ArcSwapOption<PipelineReport>,
}

impl Merger {
    /// Wire a merger over the shared services
    pub fn new(
        sources: Arc<SourceManager>,
        fetcher: Arc<Fetcher>,
        parsers: Arc<ParserBank>,
        processor: Processor,
        config: MergerConfig,
    ) -> Self {
        Self {
            sources,
            fetcher,
            parsers,
            processor,
            config,
            last_configs: ArcSwap::from_pointee(Vec::new()),
            last_report: ArcSwapOption::const_empty(),
        }
    }

    /// Run the pipeline end to end, writing the requested formats under
    /// `output_dir`.
    ///
    /// Progress is reported monotonically; cancellation is observed between
    /// and during fetches.
    pub async fn run(
        &self,
        formats: &[OutputFormat],
        output_dir: &Path,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
    ) -> PipelineResult<PipelineReport> {
        let started_at = Utc::now();
        let tracker = ProgressTracker::new(progress);
        tracker.report(0.0, "collecting sources");

        let sources = self.sources.get_active_sources().await;
        let total = sources.len();
        info!(sources = total, "pipeline run started");

        let fetched = self.fetch_stage(&sources, cancel, &tracker).await;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let successful_sources = fetched.iter().filter(|(_, r)| r.success).count();
        tracker.report(0.6, "parsing configurations");

        let mut all_configs = Vec::new();
        for (source, result) in &fetched {
            if !result.success {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let reputation = source.reputation_score(Utc::now(), &self.config.reputation);
            let mut configs = self
                .parsers
                .parse_all(result.configs.iter().map(String::as_str));
            for config in &mut configs {
                config.source_url = source.url.clone();
                config
                    .metadata
                    .insert("source_tier".into(), source.tier.as_str().into());
            }
            score_batch(&mut configs, reputation);
            all_configs.extend(configs);
        }

        tracker.report(0.8, "processing configurations");
        let (kept, stats) = self
            .processor
            .process(all_configs, self.config.dedup_strategy)
            .await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        tracker.report(0.9, "writing outputs");
        let manager = OutputManager::new(output_dir);
        let paths = manager.write_all(&kept, formats).await?;

        let report = self
            .finish_run(kept, stats, total, successful_sources, paths, started_at)
            .await;
        tracker.report(1.0, "completed");
        Ok(report)
    }

    async fn fetch_stage(
        &self,
        sources: &[SourceMetadata],
        cancel: &CancellationToken,
        tracker: &ProgressTracker,
    ) -> Vec<(SourceMetadata, FetchResult)> {
        let total = sources.len().max(1);
        let mut futures: FuturesUnordered<_> = sources
            .iter()
            .map(|source| {
                let fetcher = Arc::clone(&self.fetcher);
                let source = source.clone();
                let cancel = cancel.clone();
                async move {
                    let result = fetcher.fetch_with_cancel(&source.url, &cancel).await;
                    (source, result)
                }
            })
            .collect();

        let mut fetched = Vec::with_capacity(sources.len());
        let mut done = 0usize;
        while let Some((source, result)) = futures.next().await {
            let mut record = if result.success {
                PerformanceRecord::success(
                    result.configs.len(),
                    result.response_time.as_millis() as u64,
                )
            } else {
                PerformanceRecord::failure(
                    result.response_time.as_millis() as u64,
                    result.error.clone().unwrap_or_else(|| "unknown".into()),
                )
            };
            if result.cache_hit {
                record = record.with_cache_hit();
            }
            self.sources.update_performance(&source.url, record).await;

            done += 1;
            tracker.report(
                0.6 * done as f64 / total as f64,
                &format!("fetched {}/{} sources", done, total),
            );
            if !result.success {
                warn!(url = %source.url, error = ?result.error, "source fetch failed");
            }
            fetched.push((source, result));
        }
        fetched
    }

    async fn finish_run(
        &self,
        kept: Vec<VpnConfig>,
        stats: ProcessStats,
        sources_processed: usize,
        successful_sources: usize,
        paths: HashMap<OutputFormat, PathBuf>,
        started_at: DateTime<Utc>,
    ) -> PipelineReport {
        let report = PipelineReport {
            sources_processed,
            successful_sources,
            configurations_found: kept.len(),
            duplicates_removed: stats.duplicates_removed,
            dropped_unsafe: stats.dropped_unsafe,
            output_files: paths
                .into_iter()
                .map(|(format, path)| (format.as_str().to_string(), path))
                .collect(),
            started_at,
            finished_at: Utc::now(),
        };

        self.last_configs.store(Arc::new(kept));
        self.last_report.store(Some(Arc::new(report.clone())));
        info!(
            configs = report.configurations_found,
            sources = report.sources_processed,
            "pipeline run finished"
        );
        report
    }

    /// Snapshot of the configurations from the most recent run
    pub fn last_configurations(&self) -> Arc<Vec<VpnConfig>> {
        self.last_configs.load_full()
    }

    /// Report from the most recent run
    pub fn last_report(&self) -> Option<Arc<PipelineReport>> {
        self.last_report.load_full()
    }

    /// The source registry this merger orchestrates
    pub fn sources(&self) -> &Arc<SourceManager> {
        &self.sources
    }

    /// Per-parser counters
    pub fn parser_stats(
        &self,
    ) -> HashMap<&'static str, subfuse_parsers::ParserCounters> {
        self.parsers.stats()
    }

    /// Counters for the statistics endpoint
    pub async fn statistics(&self) -> MergerStatistics {
        let source_stats = self.sources.get_statistics().await;
        let total_configs = self.last_configs.load().len();
        let success_rate = if source_stats.total_sources == 0 {
            0.0
        } else {
            source_stats.successful_sources as f64 / source_stats.total_sources as f64
        };
        MergerStatistics {
            total_sources: source_stats.total_sources,
            successful_sources: source_stats.successful_sources,
            total_configs,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::AUTO_SELECT_GROUP;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::time::Duration;
    use subfuse_core::{SecurityValidator, SourceTier};
    use subfuse_fetch::{FetcherConfig, RateLimitConfig, RetryPolicy};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vmess_line() -> String {
        format!(
            "vmess://{}",
            BASE64.encode(r#"{"add":"node-a.example.com","port":443,"id":"uuid-a","ps":"Alpha"}"#)
        )
    }

    async fn build_merger() -> Arc<Merger> {
        let fetcher_config = FetcherConfig {
            retry: RetryPolicy::no_retry(),
            rate_limit: RateLimitConfig {
                period: Duration::from_millis(1),
                burst: nonzero_ext::nonzero!(50u32),
            },
            ..Default::default()
        };
        Arc::new(Merger::new(
            Arc::new(SourceManager::new(SecurityValidator::permissive())),
            Arc::new(Fetcher::new(fetcher_config).unwrap()),
            Arc::new(ParserBank::default()),
            Processor::new(SecurityValidator::default()),
            MergerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_happy_path_two_protocols() {
        let server = MockServer::start().await;
        let body = format!(
            "{}\nvless://uuid-b@node-b.example.com:443?security=tls#Beta\n",
            vmess_line()
        );
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let merger = build_merger().await;
        merger
            .sources()
            .add_source(&format!("{}/sub", server.uri()), SourceTier::Premium, None)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let report = merger
            .run(
                &[OutputFormat::Json, OutputFormat::Clash],
                dir.path(),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.sources_processed, 1);
        assert_eq!(report.successful_sources, 1);
        assert_eq!(report.configurations_found, 2);
        assert!(report.output_files["json"].exists());

        let clash = std::fs::read_to_string(&report.output_files["clash"]).unwrap();
        assert!(clash.contains(AUTO_SELECT_GROUP));
        assert!(clash.contains("Alpha"));
        assert!(clash.contains("Beta"));
    }

    #[tokio::test]
    async fn test_dedup_across_sources() {
        let server = MockServer::start().await;
        let body = format!("{}\n", vmess_line());
        Mock::given(method("GET"))
            .and(path("/one"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let merger = build_merger().await;
        for suffix in ["one", "two"] {
            merger
                .sources()
                .add_source(
                    &format!("{}/{}", server.uri(), suffix),
                    SourceTier::Bulk,
                    None,
                )
                .await
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let report = merger
            .run(
                &[OutputFormat::Raw],
                dir.path(),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.configurations_found, 1);
        assert_eq!(report.duplicates_removed, 1);

        // Both sources record a success in their history.
        for source in merger.sources().get_all_sources().await {
            assert!(source.history.latest().unwrap().success);
        }
    }

    #[tokio::test]
    async fn test_empty_source_list_succeeds() {
        let merger = build_merger().await;
        let dir = tempfile::tempdir().unwrap();
        let report = merger
            .run(
                &[OutputFormat::Json],
                dir.path(),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.sources_processed, 0);
        assert_eq!(report.configurations_found, 0);
        assert_eq!(merger.statistics().await.total_configs, 0);
    }

    #[tokio::test]
    async fn test_cancellation_marks_history() {
        let merger = build_merger().await;
        merger
            .sources()
            .add_source("http://127.0.0.1:9/never", SourceTier::Bulk, None)
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();

        let dir = tempfile::tempdir().unwrap();
        let result = merger
            .run(&[OutputFormat::Raw], dir.path(), &token, None)
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        let source = merger
            .sources()
            .get_source("http://127.0.0.1:9/never")
            .await
            .unwrap();
        let latest = source.history.latest().unwrap();
        assert!(!latest.success);
        assert_eq!(latest.reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_progress_monotonic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(200).set_body_string(vmess_line()))
            .mount(&server)
            .await;

        let merger = build_merger().await;
        merger
            .sources()
            .add_source(&format!("{}/sub", server.uri()), SourceTier::Bulk, None)
            .await
            .unwrap();

        let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |value, _| sink.lock().push(value));

        let dir = tempfile::tempdir().unwrap();
        merger
            .run(
                &[OutputFormat::Raw],
                dir.path(),
                &CancellationToken::new(),
                Some(progress),
            )
            .await
            .unwrap();

        let values = seen.lock();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 1.0);
    }
}
