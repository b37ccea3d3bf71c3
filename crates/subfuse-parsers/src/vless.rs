//! VLESS decoder: `vless://uuid@host:port?query#fragment`

use subfuse_core::{Protocol, VpnConfig};

use crate::uri;
use crate::Parser;

/// VLESS share-link parser
#[derive(Debug, Default)]
pub struct VlessParser;

impl Parser for VlessParser {
    fn name(&self) -> &'static str {
        "vless"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["vless"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        let parts = uri::parse(line)?;
        if parts.scheme != "vless" {
            return None;
        }
        let uuid = parts.userinfo.as_deref()?.trim();
        if uuid.is_empty() {
            return None;
        }

        let mut config = VpnConfig::new(Protocol::Vless, parts.host.clone(), parts.port);
        config.uuid = Some(uuid.to_string());

        let security = parts.query_value("security").unwrap_or("tls");
        config.tls = matches!(security, "tls" | "reality" | "xtls");
        if security != "tls" {
            config
                .metadata
                .insert("security".into(), security.to_string().into());
        }

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
            .or_else(|| parts.query_value("host"))
            .filter(|s| !s.is_empty())
            .map(String::from);
        config.flow = parts
            .query_value("flow")
            .filter(|f| !f.is_empty())
            .map(String::from);
        config.alpn = parts
            .query_value("alpn")
            .filter(|a| !a.is_empty())
            .map(String::from);
        config.name = parts.fragment;

        Some(config)
    }
}
