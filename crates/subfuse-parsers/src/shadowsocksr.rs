//! ShadowsocksR decoder:
//! `ssr://base64(host:port:protocol:method:obfs:base64(password)[/?params])`

use subfuse_core::encoding::decode_base64_text;
use subfuse_core::{Protocol, VpnConfig};

use crate::Parser;

/// ShadowsocksR share-link parser
#[derive(Debug, Default)]
pub struct ShadowsocksrParser;

impl Parser for ShadowsocksrParser {
    fn name(&self) -> &'static str {
        "shadowsocksr"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["ssr"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        let body = line.trim().strip_prefix("ssr://")?;
        let decoded = decode_base64_text(body)?;

        let (main, params) = match decoded.split_once("/?") {
            Some((main, params)) => (main, Some(params)),
            None => (decoded.as_str(), None),
        };

        // host may be an IPv6 literal with colons; the five trailing
        // fields are fixed, so split from the right.
        let mut fields = main.rsplitn(6, ':');
        let password_b64 = fields.next()?;
        let obfs = fields.next()?;
        let method = fields.next()?;
        let protocol = fields.next()?;
        let port_str = fields.next()?;
        let host = fields.next()?;

        if host.is_empty() || method.is_empty() {
            return None;
        }
        let port: u16 = port_str.parse().ok()?;
        if port == 0 {
            return None;
        }
        let password = decode_base64_text(password_b64)?;

        let mut config = VpnConfig::new(Protocol::Shadowsocksr, host, port);
        config.encryption = Some(method.to_string());
        config.password = Some(password);
        config
            .metadata
            .insert("ssr_protocol".into(), protocol.to_string().into());
        config.metadata.insert("obfs".into(), obfs.to_string().into());

        if let Some(params) = params {
            for pair in params.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                match key {
                    "remarks" => {
                        config.name = decode_base64_text(value).filter(|n| !n.is_empty());
                    }
                    "obfsparam" | "protoparam" | "group" => {
                        if let Some(decoded) = decode_base64_text(value) {
                            config.metadata.insert(key.into(), decoded.into());
                        }
                    }
                    _ => {}
                }
            }
        }
        Some(config)
    }
}
