//! Telegram channel monitor
//!
//! Scrapes public channel previews (`t.me/s/<channel>`) and extracts
//! subscription URLs from the message text. Candidates are direct
//! subscription links, so a discovered source is immediately fetchable;
//! embedded share links feed the reliability score.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{
    count_share_links, extract_subscription_urls, DiscoveredSource, DiscoveryOrigin,
    DEFAULT_TELEGRAM_CHANNELS,
};

/// Telegram monitor configuration
#[derive(Debug, Clone)]
pub struct TelegramMonitorConfig {
    /// Preview host
    pub base_url: String,
    /// Channel usernames to scan
    pub channels: Vec<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for TelegramMonitorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://t.me".to_string(),
            channels: DEFAULT_TELEGRAM_CHANNELS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Telegram channel monitor
pub struct TelegramMonitor {
    client: reqwest::Client,
    config: TelegramMonitorConfig,
}

impl TelegramMonitor {
    /// Build a monitor with the given configuration
    pub fn new(config: TelegramMonitorConfig) -> DiscoveryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("subfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch one channel's preview page
    pub async fn fetch_channel(&self, channel: &str) -> DiscoveryResult<String> {
        let url = format!("{}/s/{}", self.config.base_url, channel);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Api {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Scan every configured channel; failures per channel are logged and
    /// skipped
    pub async fn monitor_channels(&self) -> Vec<DiscoveredSource> {
        let mut discovered = Vec::new();

        for channel in &self.config.channels {
            match self.fetch_channel(channel).await {
                Ok(body) => {
                    let candidates = self.scan_channel_text(channel, &body);
                    debug!(channel = %channel, candidates = candidates.len(), "channel scanned");
                    discovered.extend(candidates);
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Telegram channel scan failed");
                }
            }
        }

        info!(count = discovered.len(), "Telegram discovery pass finished");
        discovered
    }

    fn scan_channel_text(&self, channel: &str, text: &str) -> Vec<DiscoveredSource> {
        let share_links = count_share_links(text);
        extract_subscription_urls(text)
            .into_iter()
            .map(|url| {
                let mut source = DiscoveredSource::from_context(
                    url,
                    DiscoveryOrigin::Telegram,
                    format!("t.me/{}", channel),
                    text,
                );
                source.reliability_score = channel_reliability(share_links, text.len());
                source
            })
            .collect()
    }
}

/// Reliability in [0, 1]: how config-dense and substantial the channel
/// preview is
fn channel_reliability(share_links: usize, text_len: usize) -> f64 {
    let mut score = 0.0;
    score += (share_links as f64 * 2.0).min(60.0);
    score += (text_len as f64 / 500.0).min(40.0);
    (score / 100.0).min(1.0)
}
