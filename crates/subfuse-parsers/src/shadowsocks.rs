//! Shadowsocks decoders
//!
//! Classic links arrive in two layouts:
//! `ss://base64(method:password)@host:port[#tag]` and
//! `ss://base64(method:password@host:port)[#tag]`. 2022-edition links keep
//! the method in clear text: `ss://2022-<cipher>:password@host:port`.

use subfuse_core::encoding::decode_base64_text;
use subfuse_core::{Protocol, VpnConfig};

use crate::uri;
use crate::Parser;

const AEAD_CIPHERS: [&str; 4] = [
    "aes-128-gcm",
    "aes-256-gcm",
    "chacha20-ietf-poly1305",
    "xchacha20-ietf-poly1305",
];

/// Shadowsocks and Shadowsocks-2022 share-link parser
#[derive(Debug, Default)]
pub struct ShadowsocksParser;

impl Parser for ShadowsocksParser {
    fn name(&self) -> &'static str {
        "shadowsocks"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["ss"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        let rest = line.trim().strip_prefix("ss://")?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(uri::decode(fragment))),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };

        let mut config = match rest.rsplit_once('@') {
            Some((userinfo, host_port)) => {
                let (host, port) = uri::split_host_port(host_port)?;
                if userinfo.starts_with("2022-") {
                    parse_ss2022(userinfo, &host, port)?
                } else {
                    // Userinfo layout: base64(method:password)
                    let decoded = decode_base64_text(userinfo)?;
                    let (method, password) = decoded.split_once(':')?;
                    classic(method, password, &host, port)?
                }
            }
            None => {
                // Fully-encoded layout: base64(method:password@host:port)
                let decoded = decode_base64_text(rest)?;
                let (userinfo, host_port) = decoded.rsplit_once('@')?;
                let (method, password) = userinfo.split_once(':')?;
                let (host, port) = uri::split_host_port(host_port)?;
                classic(method, password, &host, port)?
            }
        };

        if let Some(query) = query {
            for pair in query.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    if key == "plugin" {
                        config
                            .metadata
                            .insert("plugin".into(), uri::decode(value).into());
                    }
                }
            }
        }
        config.name = fragment.filter(|f| !f.is_empty());
        Some(config)
    }
}

fn classic(method: &str, password: &str, host: &str, port: u16) -> Option<VpnConfig> {
    let method = method.trim();
    if method.is_empty() {
        return None;
    }
    let mut config = VpnConfig::new(Protocol::Shadowsocks, host, port);
    config.encryption = Some(method.to_string());
    config.password = Some(password.to_string());
    if AEAD_CIPHERS.contains(&method) {
        config.metadata.insert("aead_support".into(), true.into());
    }
    Some(config)
}

fn parse_ss2022(method_password: &str, host: &str, port: u16) -> Option<VpnConfig> {
    let (method, password) = method_password.split_once(':')?;
    if password.is_empty() {
        return None;
    }

    let mut config = VpnConfig::new(Protocol::Ss2022, host, port);
    config.encryption = Some(method.to_string());
    config.password = Some(password.to_string());
    config.metadata.insert("parser".into(), "ss2022".into());
    config.metadata.insert("aead_support".into(), true.into());
    config
        .metadata
        .insert("security_level".into(), security_level(method).into());
    Some(config)
}

fn security_level(method: &str) -> &'static str {
    if method.contains("aes-256-gcm") || method.contains("chacha20") {
        "high"
    } else if method.contains("aes-128-gcm") {
        "medium"
    } else {
        "standard"
    }
}
