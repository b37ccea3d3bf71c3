//! Trojan decoder: `trojan://password@host:port[?query][#fragment]`

use subfuse_core::{Protocol, VpnConfig};

use crate::uri;
use crate::Parser;

/// Trojan share-link parser
#[derive(Debug, Default)]
pub struct TrojanParser;

impl Parser for TrojanParser {
    fn name(&self) -> &'static str {
        "trojan"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["trojan"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        let parts = uri::parse(line)?;
        if parts.scheme != "trojan" {
            return None;
        }
        let password = parts.userinfo.as_deref()?.trim();
        if password.is_empty() {
            return None;
        }

        let mut config = VpnConfig::new(Protocol::Trojan, parts.host.clone(), parts.port);
        config.password = Some(uri::decode(password));
        // Trojan rides TLS unless explicitly disabled.
        config.tls = parts.query_value("security") != Some("none");
        config.network = Some(
            parts
                .query_value("type")
                .filter(|t| !t.is_empty())
                .unwrap_or("tcp")
                .to_string(),
        );
        config.path = parts.query_value("path").map(String::from);
        config.sni = parts
            .query_value("sni")
            .filter(|s| !s.is_empty())
            .map(String::from);
        config.alpn = parts
            .query_value("alpn")
            .filter(|a| !a.is_empty())
            .map(String::from);
        config.name = parts.fragment;

        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let config = TrojanParser
            .parse("trojan://secret@node.example.com:443#Berlin")
            .unwrap();
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.server, "node.example.com");
        assert!(config.tls);
        assert_eq!(config.name.as_deref(), Some("Berlin"));
    }

    #[test]
    fn test_query_fields() {
        let config = TrojanParser
            .parse("trojan://pw@h.example.com:443?sni=cdn.example.com&type=ws&path=%2Ftr")
            .unwrap();
        assert_eq!(config.sni.as_deref(), Some("cdn.example.com"));
        assert_eq!(config.network.as_deref(), Some("ws"));
        assert_eq!(config.path.as_deref(), Some("/tr"));
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(TrojanParser.parse("trojan://@h.example.com:443").is_none());
    }

    #[test]
    fn test_roundtrip() {
        let config = TrojanParser
            .parse("trojan://secret@node.example.com:443?sni=cdn.example.com#Tag")
            .unwrap();
        let reparsed = TrojanParser.parse(&config.canonical_uri()).unwrap();
        assert!(config.same_endpoint(&reparsed));
        assert_eq!(config.name, reparsed.name);
    }
}
