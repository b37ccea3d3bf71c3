//! Application settings loaded from `sources.yaml`
//!
//! Handles loading and validation of the tiered source list and the
//! processing, output, and cache sections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::config::Protocol;
use crate::error::{CoreError, CoreResult};
use crate::source::SourceTier;

/// Output format names the settings validator recognizes
pub const KNOWN_FORMATS: [&str; 6] = ["raw", "base64", "json", "clash", "singbox", "csv"];

/// A source entry: either a bare URL or a URL with options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceEntry {
    /// Bare subscription URL
    Url(String),
    /// URL with per-source options
    Detailed {
        /// Subscription URL
        url: String,
        /// Weight in [0, 1]
        #[serde(default)]
        weight: Option<f64>,
        /// Protocols the source is expected to serve
        #[serde(default)]
        protocols: Vec<String>,
        /// Update frequency string, `Nm`/`Nh`/`Nd`
        #[serde(default)]
        update_frequency: Option<String>,
    },
}

impl SourceEntry {
    /// The entry's URL
    pub fn url(&self) -> &str {
        match self {
            SourceEntry::Url(url) => url,
            SourceEntry::Detailed { url, .. } => url,
        }
    }

    /// The entry's configured weight, if any
    pub fn weight(&self) -> Option<f64> {
        match self {
            SourceEntry::Url(_) => None,
            SourceEntry::Detailed { weight, .. } => *weight,
        }
    }

    /// The entry's expected protocols
    pub fn protocols(&self) -> &[String] {
        match self {
            SourceEntry::Url(_) => &[],
            SourceEntry::Detailed { protocols, .. } => protocols,
        }
    }

    /// The entry's update frequency string
    pub fn update_frequency(&self) -> Option<&str> {
        match self {
            SourceEntry::Url(_) => None,
            SourceEntry::Detailed {
                update_frequency, ..
            } => update_frequency.as_deref(),
        }
    }
}

/// URL list for one tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSources {
    /// Subscription URLs in this tier
    #[serde(default)]
    pub urls: Vec<SourceEntry>,
}

/// Pipeline processing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Concurrent fetch bound
    pub max_concurrent: usize,
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Retry attempts per URL
    pub retry_attempts: u32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            timeout: 30,
            retry_attempts: 3,
        }
    }
}

/// Output section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Formats to emit on pipeline runs
    pub formats: Vec<String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            formats: vec!["raw".into(), "base64".into(), "json".into()],
        }
    }
}

/// Cache section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry TTL in seconds
    pub ttl: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl: 300 }
    }
}

/// Top-level settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    /// Tier name to source list
    #[serde(default)]
    pub sources: HashMap<String, TierSources>,
    /// Processing limits
    #[serde(default)]
    pub processing: ProcessingSettings,
    /// Output formats
    #[serde(default)]
    pub output: OutputSettings,
    /// Cache tuning
    #[serde(default)]
    pub cache: CacheSettings,
}

impl AppSettings {
    /// Load and validate settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let settings: AppSettings = serde_yaml::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// Unknown tiers, protocols, and formats warn; malformed URLs and
    /// out-of-range values error.
    pub fn validate(&self) -> CoreResult<()> {
        for (tier_name, tier) in &self.sources {
            if SourceTier::parse(tier_name).is_none() {
                warn!(tier = %tier_name, "unknown source tier, treating as experimental");
            }
            for entry in &tier.urls {
                let parsed = url::Url::parse(entry.url()).map_err(|e| {
                    CoreError::InvalidSettings(format!("invalid source URL {}: {}", entry.url(), e))
                })?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(CoreError::InvalidSettings(format!(
                        "unsupported URL scheme {} for {}",
                        parsed.scheme(),
                        entry.url()
                    )));
                }
                if let Some(weight) = entry.weight() {
                    if !(0.0..=1.0).contains(&weight) {
                        return Err(CoreError::InvalidSettings(format!(
                            "weight {} out of [0,1] for {}",
                            weight,
                            entry.url()
                        )));
                    }
                }
                for protocol in entry.protocols() {
                    if Protocol::parse(protocol).is_none() {
                        warn!(protocol = %protocol, url = %entry.url(), "unknown protocol hint");
                    }
                }
            }
        }

        for format in &self.output.formats {
            if !KNOWN_FORMATS.contains(&format.to_ascii_lowercase().as_str()) {
                warn!(format = %format, "unknown output format in settings");
            }
        }

        if self.processing.max_concurrent == 0 {
            return Err(CoreError::InvalidSettings(
                "processing.max_concurrent must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Total configured source count across all tiers
    pub fn source_count(&self) -> usize {
        self.sources.values().map(|t| t.urls.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
sources:
  premium:
    urls:
      - https://premium.example.com/sub.txt
      - url: https://weighted.example.com/sub.txt
        weight: 0.9
        protocols: [vmess, vless]
  bulk:
    urls:
      - https://bulk.example.com/all.txt
processing:
  max_concurrent: 20
  timeout: 15
  retry_attempts: 2
output:
  formats: [raw, clash]
cache:
  ttl: 600
"#;

    #[test]
    fn test_load_sample() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = AppSettings::load(file.path()).unwrap();
        assert_eq!(settings.source_count(), 3);
        assert_eq!(settings.processing.max_concurrent, 20);
        assert_eq!(settings.cache.ttl, 600);

        let premium = &settings.sources["premium"];
        assert_eq!(premium.urls[1].weight(), Some(0.9));
        assert_eq!(premium.urls[1].protocols(), ["vmess", "vless"]);
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let settings: AppSettings = serde_yaml::from_str(
            "sources:\n  bulk:\n    urls:\n      - ftp://example.com/sub.txt\n",
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_weight_out_of_range_rejected() {
        let settings: AppSettings = serde_yaml::from_str(
            "sources:\n  bulk:\n    urls:\n      - url: https://example.com/s\n        weight: 1.5\n",
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.processing.max_concurrent, 50);
        assert_eq!(settings.cache.ttl, 300);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(AppSettings::load("/nonexistent/sources.yaml").is_err());
    }
}
