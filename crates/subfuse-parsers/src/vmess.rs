//! VMess decoder: `vmess://base64(json)`

use serde_json::Value;
use tracing::debug;

use subfuse_core::encoding::decode_base64_text;
use subfuse_core::{Protocol, VpnConfig};

use crate::Parser;

/// VMess share-link parser
#[derive(Debug, Default)]
pub struct VmessParser;

impl Parser for VmessParser {
    fn name(&self) -> &'static str {
        "vmess"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["vmess"]
    }

    fn parse(&self, line: &str) -> Option<VpnConfig> {
        let body = line.strip_prefix("vmess://")?;
        let decoded = decode_base64_text(body)?;
        let json: Value = serde_json::from_str(&decoded).ok()?;

        let server = json.get("add")?.as_str()?.trim();
        if server.is_empty() {
            return None;
        }
        let port = port_field(json.get("port")?)?;
        let uuid = json.get("id")?.as_str()?.trim();
        if uuid.is_empty() {
            return None;
        }

        let mut config = VpnConfig::new(Protocol::Vmess, server, port);
        config.uuid = Some(uuid.to_string());
        config.encryption = Some(
            str_field(&json, "scy")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "auto".to_string()),
        );
        config.network = Some(
            str_field(&json, "net")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "tcp".to_string()),
        );
        config.path = str_field(&json, "path").filter(|s| !s.is_empty());
        config.sni = str_field(&json, "host").filter(|s| !s.is_empty());
        config.tls = str_field(&json, "tls").as_deref() == Some("tls");
        config.name = str_field(&json, "ps").filter(|s| !s.is_empty());

        let aid = json
            .get("aid")
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .unwrap_or(0);
        config.metadata.insert("aid".into(), aid.into());

        Some(config)
    }
}

fn str_field(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(|v| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accept both numeric and string ports, reject out-of-range values
fn port_field(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if (1..=65535).contains(&port) {
        Some(port as u16)
    } else {
        debug!(port, "vmess port out of range");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    fn encode(json: &str) -> String {
        format!("vmess://{}", BASE64.encode(json))
    }

    #[test]
    fn test_minimal() {
        let line = encode(r#"{"add":"n.example.com","port":443,"id":"abc-123"}"#);
        let config = VmessParser.parse(&line).unwrap();
        assert_eq!(config.protocol, Protocol::Vmess);
        assert_eq!(config.server, "n.example.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.uuid.as_deref(), Some("abc-123"));
        assert_eq!(config.encryption.as_deref(), Some("auto"));
        assert_eq!(config.network.as_deref(), Some("tcp"));
        assert!(!config.tls);
    }

    #[test]
    fn test_full_fields() {
        let line = encode(
            r#"{"add":"n.example.com","port":"8443","id":"abc","net":"ws","path":"/tun","host":"cdn.example.com","tls":"tls","scy":"aes-128-gcm","aid":"2","ps":"Tokyo 1"}"#,
        );
        let config = VmessParser.parse(&line).unwrap();
        assert_eq!(config.port, 8443);
        assert_eq!(config.network.as_deref(), Some("ws"));
        assert_eq!(config.path.as_deref(), Some("/tun"));
        assert_eq!(config.sni.as_deref(), Some("cdn.example.com"));
        assert!(config.tls);
        assert_eq!(config.encryption.as_deref(), Some("aes-128-gcm"));
        assert_eq!(config.name.as_deref(), Some("Tokyo 1"));
        assert_eq!(config.metadata["aid"], 2);
    }

    #[test]
    fn test_invalid_base64() {
        assert!(VmessParser.parse("vmess://!!!not-base64!!!").is_none());
    }

    #[test]
    fn test_missing_required() {
        assert!(VmessParser
            .parse(&encode(r#"{"add":"h","port":443}"#))
            .is_none());
        assert!(VmessParser
            .parse(&encode(r#"{"port":443,"id":"x"}"#))
            .is_none());
    }

    #[test]
    fn test_port_out_of_range() {
        assert!(VmessParser
            .parse(&encode(r#"{"add":"h","port":70000,"id":"x"}"#))
            .is_none());
        assert!(VmessParser
            .parse(&encode(r#"{"add":"h","port":0,"id":"x"}"#))
            .is_none());
    }

    #[test]
    fn test_roundtrip() {
        let line = encode(
            r#"{"add":"n.example.com","port":443,"id":"abc","net":"ws","path":"/t","tls":"tls","scy":"auto","ps":"Node"}"#,
        );
        let config = VmessParser.parse(&line).unwrap();
        let reparsed = VmessParser.parse(&config.canonical_uri()).unwrap();
        assert!(config.same_endpoint(&reparsed));
        assert_eq!(config.name, reparsed.name);
    }
}
