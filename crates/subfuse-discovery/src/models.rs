//! Discovery records and text scanning helpers

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// GitHub topics scanned by default
pub const DEFAULT_GITHUB_TOPICS: [&str; 5] = [
    "v2ray",
    "free-vpn",
    "clash-subscription",
    "shadowsocks",
    "vpn-configs",
];

/// Telegram channels scanned by default
pub const DEFAULT_TELEGRAM_CHANNELS: [&str; 3] =
    ["v2ray_configs_pool", "free_proxy_feed", "clash_sub_share"];

/// Where a candidate source was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryOrigin {
    /// GitHub repository search
    Github,
    /// Telegram channel preview
    Telegram,
}

impl DiscoveryOrigin {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryOrigin::Github => "github",
            DiscoveryOrigin::Telegram => "telegram",
        }
    }
}

/// A candidate source found by a monitor, not yet admitted to the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredSource {
    /// Candidate subscription URL
    pub url: String,
    /// Which monitor produced it
    pub origin: DiscoveryOrigin,
    /// Short label (repository or channel name)
    pub title: String,
    /// Context the candidate was found in, truncated
    pub description: String,
    /// When the monitor saw it
    pub discovered_at: DateTime<Utc>,
    /// Estimated reliability in [0, 1]
    pub reliability_score: f64,
    /// Share links observed alongside the candidate
    pub config_count: usize,
    /// Protocols mentioned in the surrounding text
    pub protocols: Vec<String>,
}

impl DiscoveredSource {
    /// Create a candidate with the scanning context filled in from `text`
    pub fn from_context(
        url: impl Into<String>,
        origin: DiscoveryOrigin,
        title: impl Into<String>,
        text: &str,
    ) -> Self {
        Self {
            url: url.into(),
            origin,
            title: title.into(),
            description: truncate(text, 200),
            discovered_at: Utc::now(),
            reliability_score: 0.0,
            config_count: count_share_links(text),
            protocols: detect_protocols_from_text(text),
        }
    }
}

/// Protocol names mentioned in free text, by scheme or keyword
pub fn detect_protocols_from_text(text: &str) -> Vec<String> {
    let lowered = text.to_ascii_lowercase();
    let mut found = Vec::new();
    for (needle, name) in [
        ("vmess", "vmess"),
        ("vless", "vless"),
        ("trojan", "trojan"),
        ("hysteria2", "hysteria2"),
        ("hy2://", "hysteria2"),
        ("tuic", "tuic"),
        ("ssr://", "shadowsocksr"),
        ("shadowsocksr", "shadowsocksr"),
        ("ss://", "shadowsocks"),
        ("shadowsocks", "shadowsocks"),
        ("clash", "clash"),
    ] {
        if lowered.contains(needle) && !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    }
    found
}

/// Count share links (known proxy schemes) embedded in free text
pub fn count_share_links(text: &str) -> usize {
    share_link_regex().find_iter(text).count()
}

/// Extract http(s) URLs from free text that plausibly serve subscriptions
pub fn extract_subscription_urls(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for capture in http_url_regex().find_iter(text) {
        let url = capture
            .as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | ']' | '"' | '\'' | '>'));
        if looks_like_subscription(url) && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

fn looks_like_subscription(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    // t.me links point back at channels, not at fetchable bodies.
    if lowered.contains("//t.me/") {
        return false;
    }
    ["sub", "subscribe", "raw", "config", ".txt", ".yaml", ".yml", ".json", "token="]
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn share_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:vmess|vless|trojan|ss|ssr|hysteria2|hy2|tuic)://[^\s<>\x22]+")
            .expect("share link pattern is valid")
    })
}

fn http_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>\x22']+"#).expect("http url pattern is valid")
    })
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_protocols() {
        let text = "Fresh vmess and VLESS nodes, plus ss://abc links";
        let protocols = detect_protocols_from_text(text);
        assert!(protocols.contains(&"vmess".to_string()));
        assert!(protocols.contains(&"vless".to_string()));
        assert!(protocols.contains(&"shadowsocks".to_string()));
        assert!(!protocols.contains(&"tuic".to_string()));
    }

    #[test]
    fn test_count_share_links() {
        let text = "vmess://one\ntrojan://two and hy2://three inline";
        assert_eq!(count_share_links(text), 3);
        assert_eq!(count_share_links("no links here"), 0);
    }

    #[test]
    fn test_extract_subscription_urls() {
        let text = "get them at https://configs.example.com/sub.txt, \
                    mirror: https://cdn.example.net/raw/all.yaml \
                    chat: https://t.me/some_channel \
                    unrelated: https://example.org/about";
        let urls = extract_subscription_urls(text);
        assert_eq!(
            urls,
            vec![
                "https://configs.example.com/sub.txt".to_string(),
                "https://cdn.example.net/raw/all.yaml".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_dedupes() {
        let text = "https://a.example.com/sub https://a.example.com/sub";
        assert_eq!(extract_subscription_urls(text).len(), 1);
    }

    #[test]
    fn test_from_context() {
        let text = "vmess://abc vmess://def see https://x.example.com/sub";
        let source = DiscoveredSource::from_context(
            "https://x.example.com/sub",
            DiscoveryOrigin::Telegram,
            "chan",
            text,
        );
        assert_eq!(source.config_count, 2);
        assert_eq!(source.protocols, vec!["vmess".to_string()]);
        assert_eq!(source.origin.as_str(), "telegram");
    }

    #[test]
    fn test_truncate_char_safe() {
        let text = "あ".repeat(300);
        let source =
            DiscoveredSource::from_context("https://h/sub", DiscoveryOrigin::Github, "t", &text);
        assert!(source.description.chars().count() <= 203);
    }
}
