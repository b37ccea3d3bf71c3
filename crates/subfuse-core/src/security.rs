//! Security validation for source URLs and parsed records
//!
//! Untrusted subscription content passes through here twice: once when a
//! source URL enters the registry, and once per parsed record before it may
//! reach an output.

use std::collections::HashSet;
use std::net::IpAddr;
use tracing::debug;

use crate::config::VpnConfig;
use crate::error::{CoreError, CoreResult};

/// Verdict for one checked record or URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityVerdict {
    /// Whether the subject passed
    pub safe: bool,
    /// Why it was rejected
    pub reason: Option<String>,
}

impl SecurityVerdict {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validates source URLs and gates parsed records
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    /// Host suffixes never accepted as servers or sources
    blocked_suffixes: HashSet<String>,
    /// Allow loopback/private addresses (test deployments)
    allow_private_addresses: bool,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        let blocked_suffixes = ["example.invalid", "localhost.localdomain"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            blocked_suffixes,
            allow_private_addresses: false,
        }
    }
}

impl SecurityValidator {
    /// Validator that also accepts loopback and private addresses
    pub fn permissive() -> Self {
        Self {
            allow_private_addresses: true,
            ..Default::default()
        }
    }

    /// Add a blocked host suffix
    pub fn block_suffix(&mut self, suffix: impl Into<String>) {
        self.blocked_suffixes.insert(suffix.into().to_ascii_lowercase());
    }

    /// Validate a subscription URL for registry admission
    pub fn validate_source_url(&self, raw: &str) -> CoreResult<url::Url> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| CoreError::InvalidUrl(format!("{}: {}", raw, e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CoreError::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::InvalidUrl("missing host".into()))?;

        if let Some(reason) = self.host_objection(host) {
            return Err(CoreError::InvalidUrl(reason));
        }
        Ok(parsed)
    }

    /// Check a URL without erroring; used by the validate-urls endpoint
    pub fn check_url(&self, raw: &str) -> SecurityVerdict {
        match self.validate_source_url(raw) {
            Ok(_) => SecurityVerdict::safe(),
            Err(e) => SecurityVerdict::unsafe_because(e.to_string()),
        }
    }

    /// Gate a parsed record. Unsafe records are dropped by the processor,
    /// not merely scored down.
    pub fn check_config(&self, config: &VpnConfig) -> SecurityVerdict {
        if !config.is_valid() {
            return SecurityVerdict::unsafe_because("invariant violation");
        }
        if let Some(reason) = self.host_objection(&config.server) {
            debug!(server = %config.server, %reason, "record failed security gate");
            return SecurityVerdict::unsafe_because(reason);
        }
        // A server value with embedded whitespace or control characters is
        // an injection attempt against downstream text formats.
        if config
            .server
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return SecurityVerdict::unsafe_because("server contains illegal characters");
        }
        SecurityVerdict::safe()
    }

    fn host_objection(&self, host: &str) -> Option<String> {
        let lowered = host.to_ascii_lowercase();
        let lowered = lowered.trim_matches(|c| c == '[' || c == ']');

        if let Ok(addr) = lowered.parse::<IpAddr>() {
            if !self.allow_private_addresses && !is_public_address(&addr) {
                return Some(format!("non-public address {}", addr));
            }
            return None;
        }
        if !self.allow_private_addresses && lowered == "localhost" {
            return Some("loopback host".into());
        }
        for suffix in &self.blocked_suffixes {
            if lowered == *suffix || lowered.ends_with(&format!(".{}", suffix)) {
                return Some(format!("blocked host {}", lowered));
            }
        }
        None
    }
}

fn is_public_address(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}
