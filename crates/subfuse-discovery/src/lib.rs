//! # Subfuse Discovery
//!
//! Automatic source discovery: scan GitHub repository topics and public
//! Telegram channel previews for new subscription URLs, estimate each
//! candidate's reliability, and feed the survivors into the source
//! registry as weighted experimental sources.
//!
//! Monitors are strictly best-effort — an unreachable API or a vanished
//! channel is logged and skipped, never fatal to a discovery pass.

#![warn(clippy::all)]

pub mod error;
pub mod github;
pub mod models;
pub mod service;
pub mod telegram;

pub use error::{DiscoveryError, DiscoveryResult};
pub use github::{GithubMonitor, GithubMonitorConfig};
pub use models::{
    count_share_links, detect_protocols_from_text, extract_subscription_urls, DiscoveredSource,
    DiscoveryOrigin, DEFAULT_GITHUB_TOPICS, DEFAULT_TELEGRAM_CHANNELS,
};
pub use service::{DiscoveryReport, DiscoveryService};
pub use telegram::{TelegramMonitor, TelegramMonitorConfig};
