//! Cache invalidation events
//!
//! Registry and fetch activity publish events that map to tag groups; the
//! tiered cache translates each event into a tag invalidation across every
//! tier.

use sha2::{Digest, Sha256};

/// Tag carried by every cached source-registry artifact
pub const SOURCES_TAG: &str = "sources";

/// An event that invalidates part of the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// The source registry changed (source added or removed)
    ConfigurationChange,
    /// One source's content was refetched
    SourceUpdate {
        /// The source URL whose cached fetch is stale
        url: String,
    },
}

impl InvalidationEvent {
    /// Tags to invalidate for this event
    pub fn tags(&self) -> Vec<String> {
        match self {
            InvalidationEvent::ConfigurationChange => vec![SOURCES_TAG.to_string()],
            InvalidationEvent::SourceUpdate { url } => vec![fetch_tag(url)],
        }
    }
}

/// Tag under which a URL's fetched body is cached: `fetch:{url_hash}`
pub fn fetch_tag(url: &str) -> String {
    format!("fetch:{}", url_hash(url))
}

/// Cache key for a URL's fetched body
pub fn fetch_key(url: &str) -> String {
    format!("fetch:body:{}", url_hash(url))
}

fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
