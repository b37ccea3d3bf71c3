//! Hysteria2 and TUIC decoders:
//! `<scheme>://[uuid[:password]@]host:port?params[#fragment]`
//!
//! Hysteria2 links in the wild are inconsistent; the superset is accepted
//! and unrecognized parameters are annotated into metadata rather than
//! rejected.

use subfuse_core::{Protocol, VpnConfig};

use crate::uri;
use crate::Parser;

/// Query keys lifted into typed fields or dedicated metadata slots
const RECOGNIZED: [&str; 4] = ["congestion_control", "udp_relay_mode", "alpn", "sni"];

/// Hysteria2 share-link parser
#[derive(Debug, Default)]
pub struct Hysteria2Parser;

impl Parser for Hysteria2Parser {
    fn name(&self) -> &'static str {
        "hysteria2"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["hysteria2", "hy2"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        parse_quic(line, Protocol::Hysteria2)
    }
}

/// TUIC share-link parser
#[derive(Debug, Default)]
pub struct TuicParser;

impl Parser for TuicParser {
    fn name(&self) -> &'static str {
        "tuic"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["tuic"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        parse_quic(line, Protocol::Tuic)
    }
}

fn parse_quic(line: &str, protocol: Protocol) -> Option<VpnConfig> {
    let parts = uri::parse(line)?;
    let mut config = VpnConfig::new(protocol, parts.host.clone(), parts.port);
    config.tls = true;

    if let Some(userinfo) = &parts.userinfo {
        match userinfo.split_once(':') {
            Some((uuid, password)) => {
                config.uuid = Some(uri::decode(uuid));
                config.password = Some(uri::decode(password));
            }
            None if looks_like_uuid(userinfo) => {
                config.uuid = Some(userinfo.clone());
            }
            None => {
                config.password = Some(uri::decode(userinfo));
            }
        }
    }

    let mut unknown = serde_json::Map::new();
    for (key, value) in &parts.query {
        match key.as_str() {
            "congestion_control" | "congestion" => {
                config
                    .metadata
                    .insert("congestion_control".into(), value.clone().into());
            }
            "udp_relay_mode" => {
                config
                    .metadata
                    .insert("udp_relay_mode".into(), value.clone().into());
            }
            "alpn" => config.alpn = Some(value.clone()).filter(|v| !v.is_empty()),
            "sni" | "peer" => config.sni = Some(value.clone()).filter(|v| !v.is_empty()),
            _ if !RECOGNIZED.contains(&key.as_str()) => {
                unknown.insert(key.clone(), value.clone().into());
            }
            _ => {}
        }
    }
    if !unknown.is_empty() {
        config.metadata.insert("params".into(), unknown.into());
    }
    config.name = parts.fragment;
    Some(config)
}

fn looks_like_uuid(value: &str) -> bool {
    value.len() == 36
        && value
            .chars()
            .enumerate()
            .all(|(i, c)| match i {
                8 | 13 | 18 | 23 => c == '-',
                _ => c.is_ascii_hexdigit(),
            })
}
