//! Discovery service
//!
//! Runs the configured monitors and feeds surviving candidates into the
//! source registry as experimental sources, weighted by their estimated
//! reliability. Candidates below the reliability floor, duplicates, and
//! URLs failing the security validator are skipped and counted.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use subfuse_core::SourceTier;
use subfuse_sources::{SourceError, SourceManager};

use crate::github::GithubMonitor;
use crate::models::DiscoveredSource;
use crate::telegram::TelegramMonitor;

/// Outcome of one discovery pass
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DiscoveryReport {
    /// Candidates produced by the monitors
    pub discovered: usize,
    /// Candidates admitted to the registry
    pub registered: usize,
    /// Candidates already registered
    pub skipped_duplicate: usize,
    /// Candidates rejected by the security validator
    pub skipped_invalid: usize,
    /// Candidates below the reliability floor
    pub skipped_low_reliability: usize,
}

/// The discovery service
pub struct DiscoveryService {
    github: Option<GithubMonitor>,
    telegram: Option<TelegramMonitor>,
    sources: Arc<SourceManager>,
    min_reliability: f64,
}

impl DiscoveryService {
    /// A service with no monitors; attach them with the builder methods
    pub fn new(sources: Arc<SourceManager>) -> Self {
        Self {
            github: None,
            telegram: None,
            sources,
            min_reliability: 0.3,
        }
    }

    /// Attach the GitHub monitor
    pub fn with_github(mut self, monitor: GithubMonitor) -> Self {
        self.github = Some(monitor);
        self
    }

    /// Attach the Telegram monitor
    pub fn with_telegram(mut self, monitor: TelegramMonitor) -> Self {
        self.telegram = Some(monitor);
        self
    }

    /// Override the reliability floor
    pub fn with_min_reliability(mut self, floor: f64) -> Self {
        self.min_reliability = floor.clamp(0.0, 1.0);
        self
    }

    /// Run every configured monitor once and register the survivors
    pub async fn run_once(&self) -> DiscoveryReport {
        let mut candidates = Vec::new();
        if let Some(github) = &self.github {
            candidates.extend(github.monitor_topics().await);
        }
        if let Some(telegram) = &self.telegram {
            candidates.extend(telegram.monitor_channels().await);
        }
        self.register(candidates).await
    }

    /// Feed candidates through the floor, the validator, and the registry
    pub async fn register(&self, candidates: Vec<DiscoveredSource>) -> DiscoveryReport {
        let mut report = DiscoveryReport {
            discovered: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            if candidate.reliability_score < self.min_reliability {
                debug!(url = %candidate.url, score = candidate.reliability_score,
                    "candidate below reliability floor");
                report.skipped_low_reliability += 1;
                continue;
            }

            match self
                .sources
                .add_source(
                    &candidate.url,
                    SourceTier::Experimental,
                    Some(candidate.reliability_score),
                )
                .await
            {
                Ok(()) => {
                    info!(url = %candidate.url, origin = candidate.origin.as_str(),
                        score = candidate.reliability_score, "discovered source registered");
                    report.registered += 1;
                }
                Err(SourceError::Duplicate) => report.skipped_duplicate += 1,
                Err(_) => report.skipped_invalid += 1,
            }
        }

        info!(
            discovered = report.discovered,
            registered = report.registered,
            "discovery pass registered"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoveryOrigin;
    use subfuse_core::SecurityValidator;

    fn candidate(url: &str, score: f64) -> DiscoveredSource {
        let mut source = DiscoveredSource::from_context(
            url,
            DiscoveryOrigin::Github,
            "repo",
            "vmess nodes",
        );
        source.reliability_score = score;
        source
    }

    fn service() -> DiscoveryService {
        DiscoveryService::new(Arc::new(SourceManager::new(SecurityValidator::default())))
    }

    #[tokio::test]
    async fn test_register_admits_reliable_candidates() {
        let service = service();
        let report = service
            .register(vec![
                candidate("https://good.example.com/sub.txt", 0.8),
                candidate("https://weak.example.com/sub.txt", 0.1),
            ])
            .await;

        assert_eq!(report.discovered, 2);
        assert_eq!(report.registered, 1);
        assert_eq!(report.skipped_low_reliability, 1);

        let source = service
            .sources
            .get_source("https://good.example.com/sub.txt")
            .await
            .unwrap();
        assert_eq!(source.tier, SourceTier::Experimental);
        assert!((source.weight - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_register_skips_duplicates_and_invalid() {
        let service = service();
        service
            .sources
            .add_source(
                "https://known.example.com/sub.txt",
                SourceTier::Premium,
                None,
            )
            .await
            .unwrap();

        let report = service
            .register(vec![
                candidate("https://known.example.com/sub.txt", 0.9),
                candidate("ftp://bad.example.com/sub.txt", 0.9),
                candidate("http://127.0.0.1/sub.txt", 0.9),
            ])
            .await;

        assert_eq!(report.registered, 0);
        assert_eq!(report.skipped_duplicate, 1);
        assert_eq!(report.skipped_invalid, 2);
        // The duplicate kept its original tier.
        let kept = service
            .sources
            .get_source("https://known.example.com/sub.txt")
            .await
            .unwrap();
        assert_eq!(kept.tier, SourceTier::Premium);
    }

    #[tokio::test]
    async fn test_run_once_without_monitors_is_empty() {
        let report = service().run_once().await;
        assert_eq!(report.discovered, 0);
        assert_eq!(report.registered, 0);
    }
}
