//! GitHub repository monitor
//!
//! Searches repository topics through the GitHub REST API and turns hits
//! into discovery candidates. Reliability weighs stars, forks, update
//! recency, and description quality.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{DiscoveredSource, DiscoveryOrigin, DEFAULT_GITHUB_TOPICS};

/// GitHub monitor configuration
#[derive(Debug, Clone)]
pub struct GithubMonitorConfig {
    /// API base URL
    pub api_base: String,
    /// Optional API token; unauthenticated search is heavily rate-limited
    pub token: Option<String>,
    /// Topics to scan
    pub topics: Vec<String>,
    /// Results fetched per topic
    pub per_topic: usize,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for GithubMonitorConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            topics: DEFAULT_GITHUB_TOPICS.iter().map(|t| t.to_string()).collect(),
            per_topic: 20,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoInfo>,
}

/// The slice of the repository search response the monitor scores
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    /// Repository name
    pub name: String,
    /// Repository page URL
    pub html_url: String,
    /// Repository description
    #[serde(default)]
    pub description: Option<String>,
    /// Star count
    #[serde(default)]
    pub stargazers_count: u64,
    /// Fork count
    #[serde(default)]
    pub forks_count: u64,
    /// Last update time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// GitHub repository monitor
pub struct GithubMonitor {
    client: reqwest::Client,
    config: GithubMonitorConfig,
}

impl GithubMonitor {
    /// Build a monitor with the given configuration
    pub fn new(config: GithubMonitorConfig) -> DiscoveryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("subfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Search repositories matching a query, newest-updated first
    pub async fn search_repositories(&self, query: &str) -> DiscoveryResult<Vec<RepoInfo>> {
        let url = format!("{}/search/repositories", self.config.api_base);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("q", query),
                ("sort", "updated"),
                ("order", "desc"),
                ("per_page", &self.config.per_topic.to_string()),
            ]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Api {
                status: status.as_u16(),
            });
        }
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;
        debug!(query = %query, hits = body.items.len(), "GitHub search");
        Ok(body.items)
    }

    /// Scan every configured topic; failures per topic are logged and
    /// skipped, so a partial outage still yields candidates
    pub async fn monitor_topics(&self) -> Vec<DiscoveredSource> {
        let now = Utc::now();
        let mut discovered = Vec::new();

        for topic in &self.config.topics {
            let query = format!("topic:{} vpn config", topic);
            match self.search_repositories(&query).await {
                Ok(repos) => {
                    for repo in repos {
                        let description = repo.description.clone().unwrap_or_default();
                        let mut source = DiscoveredSource::from_context(
                            repo.html_url.clone(),
                            DiscoveryOrigin::Github,
                            repo.name.clone(),
                            &description,
                        );
                        source.reliability_score = repo_reliability(&repo, now);
                        discovered.push(source);
                    }
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "GitHub topic scan failed");
                }
            }
        }

        info!(count = discovered.len(), "GitHub discovery pass finished");
        discovered
    }
}

/// Reliability in [0, 1]: stars, forks, update recency, description
fn repo_reliability(repo: &RepoInfo, now: DateTime<Utc>) -> f64 {
    let mut score = 0.0;

    score += (repo.stargazers_count as f64 / 10.0).min(50.0);
    score += (repo.forks_count as f64 / 5.0).min(20.0);

    if let Some(updated_at) = repo.updated_at {
        let days = now.signed_duration_since(updated_at).num_days();
        score += match days {
            d if d < 30 => 20.0,
            d if d < 90 => 10.0,
            d if d < 365 => 5.0,
            _ => 0.0,
        };
    }

    if repo
        .description
        .as_deref()
        .map(|d| d.len() > 20)
        .unwrap_or(false)
    {
        score += 10.0;
    }

    (score / 100.0).min(1.0)
}
