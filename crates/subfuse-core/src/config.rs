//! Canonical VPN configuration model
//!
//! Every wire format decoded by the parser bank is normalized into
//! [`VpnConfig`], the single record type the processor, formatters, and API
//! operate on.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Wire protocol of a VPN node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// VMess (V2Ray)
    Vmess,
    /// VLESS (V2Ray / Xray, optionally with Reality)
    Vless,
    /// Trojan
    Trojan,
    /// Classic Shadowsocks
    Shadowsocks,
    /// ShadowsocksR
    Shadowsocksr,
    /// Shadowsocks 2022 edition ciphers
    Ss2022,
    /// Hysteria v2
    Hysteria2,
    /// TUIC
    Tuic,
    /// Plain HTTP proxy
    Http,
    /// SOCKS5 proxy
    Socks5,
}

impl Protocol {
    /// All protocols in the enumerated set
    pub const ALL: [Protocol; 10] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::Shadowsocksr,
        Protocol::Ss2022,
        Protocol::Hysteria2,
        Protocol::Tuic,
        Protocol::Http,
        Protocol::Socks5,
    ];

    /// Stable lowercase name used in output files and API filters
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Shadowsocksr => "shadowsocksr",
            Protocol::Ss2022 => "ss2022",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Tuic => "tuic",
            Protocol::Http => "http",
            Protocol::Socks5 => "socks5",
        }
    }

    /// Parse a protocol name as used in config files and API filters
    pub fn parse(name: &str) -> Option<Protocol> {
        match name.to_ascii_lowercase().as_str() {
            "vmess" => Some(Protocol::Vmess),
            "vless" | "reality" => Some(Protocol::Vless),
            "trojan" => Some(Protocol::Trojan),
            "shadowsocks" | "ss" => Some(Protocol::Shadowsocks),
            "shadowsocksr" | "ssr" => Some(Protocol::Shadowsocksr),
            "ss2022" => Some(Protocol::Ss2022),
            "hysteria2" | "hy2" => Some(Protocol::Hysteria2),
            "tuic" => Some(Protocol::Tuic),
            "http" => Some(Protocol::Http),
            "socks5" | "socks" => Some(Protocol::Socks5),
            _ => None,
        }
    }

    /// Relative protocol rank used by the initial scorer.
    ///
    /// Modern AEAD/QUIC transports rank above legacy stream ciphers.
    pub fn rank(&self) -> f64 {
        match self {
            Protocol::Vless => 1.0,
            Protocol::Hysteria2 | Protocol::Tuic => 0.9,
            Protocol::Trojan | Protocol::Ss2022 => 0.8,
            Protocol::Vmess => 0.6,
            Protocol::Shadowsocks => 0.4,
            Protocol::Shadowsocksr => 0.3,
            Protocol::Http | Protocol::Socks5 => 0.2,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication strategy over canonical records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Hash of the full canonical form
    Exact,
    /// Server and port only
    ServerPort,
    /// Server and protocol only
    ServerProtocol,
    /// Stable hash over normalized connection fields
    ContentHash,
}

impl DedupStrategy {
    /// Parse a strategy name
    pub fn parse(name: &str) -> Option<DedupStrategy> {
        match name.to_ascii_lowercase().as_str() {
            "exact" => Some(DedupStrategy::Exact),
            "server_port" => Some(DedupStrategy::ServerPort),
            "server_protocol" => Some(DedupStrategy::ServerProtocol),
            "content_hash" => Some(DedupStrategy::ContentHash),
            _ => None,
        }
    }
}

/// The canonical VPN node record
///
/// Created by a parser, mutated only by the processor (dedup merges
/// metadata, the enhancer updates `quality_score`), and immutable once it
/// reaches a formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnConfig {
    /// Wire protocol
    pub protocol: Protocol,
    /// Hostname or IP, nonempty
    pub server: String,
    /// Port in [1, 65535]
    pub port: u16,
    /// Display name, usually the URI fragment tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Username for HTTP/SOCKS5 proxies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Password or pre-shared key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// UUID credential (VMess/VLESS/TUIC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Cipher or security method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// Transport network (tcp/ws/grpc/quic)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Transport path (ws/grpc)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether TLS is enabled
    pub tls: bool,
    /// TLS server name indication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    /// ALPN list, comma separated as on the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    /// XTLS flow control (VLESS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    /// Quality score in [0, 1]
    pub quality_score: f64,
    /// Subscription URL that produced this record
    pub source_url: String,
    /// Free-form annotations: parser notes, geo, reputation echoes
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VpnConfig {
    /// Create a record with the mandatory fields, everything else defaulted
    pub fn new(protocol: Protocol, server: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            server: server.into(),
            port,
            name: None,
            user_id: None,
            password: None,
            uuid: None,
            encryption: None,
            network: None,
            path: None,
            tls: false,
            sni: None,
            alpn: None,
            flow: None,
            quality_score: 0.0,
            source_url: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Model invariant: valid port, nonempty server, score in range
    pub fn is_valid(&self) -> bool {
        self.port >= 1 && !self.server.trim().is_empty() && (0.0..=1.0).contains(&self.quality_score)
    }

    /// Validate the record, returning a descriptive error on violation
    pub fn validate(&self) -> CoreResult<()> {
        if self.server.trim().is_empty() {
            return Err(CoreError::InvalidConfiguration("server is empty".into()));
        }
        if self.port == 0 {
            return Err(CoreError::InvalidConfiguration("port out of range".into()));
        }
        if !(0.0..=1.0).contains(&self.quality_score) {
            return Err(CoreError::InvalidConfiguration(format!(
                "quality_score {} out of [0,1]",
                self.quality_score
            )));
        }
        Ok(())
    }

    /// Key used by the selected deduplication strategy
    pub fn dedup_key(&self, strategy: DedupStrategy) -> String {
        match strategy {
            DedupStrategy::Exact => {
                let mut hasher = Sha256::new();
                hasher.update(self.canonical_uri().as_bytes());
                hex::encode(hasher.finalize())
            }
            DedupStrategy::ServerPort => format!("{}:{}", self.server, self.port),
            DedupStrategy::ServerProtocol => format!("{}|{}", self.server, self.protocol),
            DedupStrategy::ContentHash => self.content_hash(),
        }
    }

    /// Stable hash over the normalized connection fields.
    ///
    /// Excludes name, score, source, and metadata so the same node reached
    /// through different subscriptions hashes identically.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.protocol.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.server.to_ascii_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(self.port.to_string().as_bytes());
        for field in [
            &self.user_id,
            &self.password,
            &self.uuid,
            &self.encryption,
            &self.network,
            &self.path,
            &self.sni,
            &self.flow,
        ] {
            hasher.update(b"|");
            if let Some(v) = field {
                hasher.update(v.as_bytes());
            }
        }
        hasher.update(if self.tls { b"|t" } else { b"|f" } as &[u8]);
        hex::encode(hasher.finalize())
    }

    /// Compare the connection-defining fields, ignoring score, source,
    /// name, and metadata
    pub fn same_endpoint(&self, other: &VpnConfig) -> bool {
        self.protocol == other.protocol
            && self.server == other.server
            && self.port == other.port
            && self.user_id == other.user_id
            && self.password == other.password
            && self.uuid == other.uuid
            && self.encryption == other.encryption
            && self.network == other.network
            && self.path == other.path
            && self.tls == other.tls
            && self.sni == other.sni
            && self.flow == other.flow
    }

    /// Proxy display name for grouped outputs (Clash, sing-box)
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}-{}", self.protocol, self.server, self.port))
    }

    /// Re-emit the record as its canonical share URI.
    ///
    /// `parse(canonical_uri(cfg))` recovers the connection fields for the
    /// canonical protocols; annotations kept only in `metadata` are not
    /// round-tripped.
    pub fn canonical_uri(&self) -> String {
        match self.protocol {
            Protocol::Vmess => self.vmess_uri(),
            Protocol::Vless => self.query_uri("vless", self.uuid.as_deref().unwrap_or("")),
            Protocol::Trojan => self.query_uri("trojan", self.password.as_deref().unwrap_or("")),
            Protocol::Shadowsocks => self.shadowsocks_uri(),
            Protocol::Ss2022 => self.ss2022_uri(),
            Protocol::Shadowsocksr => self.shadowsocksr_uri(),
            Protocol::Hysteria2 => self.quic_uri("hysteria2"),
            Protocol::Tuic => self.quic_uri("tuic"),
            Protocol::Http => self.plain_proxy_uri("http"),
            Protocol::Socks5 => self.plain_proxy_uri("socks5"),
        }
    }

    fn vmess_uri(&self) -> String {
        let aid = self
            .metadata
            .get("aid")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let body = serde_json::json!({
            "v": "2",
            "ps": self.name.clone().unwrap_or_default(),
            "add": self.server,
            "port": self.port,
            "id": self.uuid.clone().unwrap_or_default(),
            "aid": aid,
            "scy": self.encryption.clone().unwrap_or_else(|| "auto".into()),
            "net": self.network.clone().unwrap_or_else(|| "tcp".into()),
            "host": self.sni.clone().unwrap_or_default(),
            "path": self.path.clone().unwrap_or_default(),
            "tls": if self.tls { "tls" } else { "" },
        });
        format!("vmess://{}", BASE64.encode(body.to_string()))
    }

    fn query_uri(&self, scheme: &str, credential: &str) -> String {
        let mut query: Vec<(String, String)> = Vec::new();
        query.push((
            "security".into(),
            if self.tls { "tls".into() } else { "none".into() },
        ));
        query.push((
            "type".into(),
            self.network.clone().unwrap_or_else(|| "tcp".into()),
        ));
        if let Some(path) = &self.path {
            query.push(("path".into(), urlencode(path)));
        }
        if let Some(sni) = &self.sni {
            query.push(("sni".into(), sni.clone()));
        }
        if let Some(flow) = &self.flow {
            query.push(("flow".into(), flow.clone()));
        }
        if let Some(alpn) = &self.alpn {
            query.push(("alpn".into(), urlencode(alpn)));
        }
        let query = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "{}://{}@{}:{}?{}{}",
            scheme,
            credential,
            host_literal(&self.server),
            self.port,
            query,
            self.fragment()
        )
    }

    fn shadowsocks_uri(&self) -> String {
        let userinfo = BASE64.encode(format!(
            "{}:{}",
            self.encryption.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default()
        ));
        format!(
            "ss://{}@{}:{}{}",
            userinfo,
            host_literal(&self.server),
            self.port,
            self.fragment()
        )
    }

    fn ss2022_uri(&self) -> String {
        format!(
            "ss://{}:{}@{}:{}{}",
            self.encryption.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
            host_literal(&self.server),
            self.port,
            self.fragment()
        )
    }

    fn shadowsocksr_uri(&self) -> String {
        let proto = self
            .metadata
            .get("ssr_protocol")
            .and_then(|v| v.as_str())
            .unwrap_or("origin");
        let obfs = self
            .metadata
            .get("obfs")
            .and_then(|v| v.as_str())
            .unwrap_or("plain");
        let body = format!(
            "{}:{}:{}:{}:{}:{}",
            self.server,
            self.port,
            proto,
            self.encryption.clone().unwrap_or_default(),
            obfs,
            BASE64.encode(self.password.clone().unwrap_or_default()),
        );
        format!("ssr://{}", BASE64.encode(body))
    }

    fn quic_uri(&self, scheme: &str) -> String {
        let credential = match (&self.uuid, &self.password) {
            (Some(u), Some(p)) => format!("{}:{}@", u, p),
            (Some(u), None) => format!("{}@", u),
            (None, Some(p)) => format!("{}@", p),
            (None, None) => String::new(),
        };
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(cc) = self.metadata.get("congestion_control").and_then(|v| v.as_str()) {
            query.push(("congestion_control".into(), cc.to_string()));
        }
        if let Some(mode) = self.metadata.get("udp_relay_mode").and_then(|v| v.as_str()) {
            query.push(("udp_relay_mode".into(), mode.to_string()));
        }
        if let Some(sni) = &self.sni {
            query.push(("sni".into(), sni.clone()));
        }
        if let Some(alpn) = &self.alpn {
            query.push(("alpn".into(), urlencode(alpn)));
        }
        let query = if query.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                query
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        };
        format!(
            "{}://{}{}:{}{}{}",
            scheme,
            credential,
            host_literal(&self.server),
            self.port,
            query,
            self.fragment()
        )
    }

    fn plain_proxy_uri(&self, scheme: &str) -> String {
        let userinfo = match (&self.user_id, &self.password) {
            (Some(u), Some(p)) => format!("{}:{}@", u, p),
            (Some(u), None) => format!("{}@", u),
            _ => String::new(),
        };
        format!(
            "{}://{}{}:{}",
            scheme,
            userinfo,
            host_literal(&self.server),
            self.port
        )
    }

    fn fragment(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("#{}", urlencode(name)),
            _ => String::new(),
        }
    }
}

/// Wrap IPv6 literals in brackets for URI emission
fn host_literal(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// Minimal percent-encoding for URI components we emit
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VpnConfig {
        let mut cfg = VpnConfig::new(Protocol::Vless, "example.com", 443);
        cfg.uuid = Some("5f0b9c1e-8a4f-4f85-9d3a-111111111111".into());
        cfg.tls = true;
        cfg.network = Some("ws".into());
        cfg.path = Some("/tunnel".into());
        cfg
    }

    #[test]
    fn test_port_bounds() {
        let cfg = VpnConfig::new(Protocol::Trojan, "h", 0);
        assert!(!cfg.is_valid());
        let cfg = VpnConfig::new(Protocol::Trojan, "h", 1);
        assert!(cfg.is_valid());
        let cfg = VpnConfig::new(Protocol::Trojan, "h", 65535);
        assert!(cfg.is_valid());
    }

    #[test]
    fn test_empty_server_rejected() {
        let cfg = VpnConfig::new(Protocol::Vmess, "  ", 443);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_score_range() {
        let mut cfg = sample();
        cfg.quality_score = 1.5;
        assert!(cfg.validate().is_err());
        cfg.quality_score = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_content_hash_ignores_provenance() {
        let mut a = sample();
        let mut b = sample();
        a.source_url = "https://one.example/sub".into();
        b.source_url = "https://two.example/sub".into();
        b.quality_score = 0.9;
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_dedup_keys_differ_by_strategy() {
        let cfg = sample();
        assert_eq!(cfg.dedup_key(DedupStrategy::ServerPort), "example.com:443");
        assert_eq!(
            cfg.dedup_key(DedupStrategy::ServerProtocol),
            "example.com|vless"
        );
        assert_ne!(
            cfg.dedup_key(DedupStrategy::Exact),
            cfg.dedup_key(DedupStrategy::ContentHash)
        );
    }

    #[test]
    fn test_protocol_parse_aliases() {
        assert_eq!(Protocol::parse("SS"), Some(Protocol::Shadowsocks));
        assert_eq!(Protocol::parse("hy2"), Some(Protocol::Hysteria2));
        assert_eq!(Protocol::parse("bogus"), None);
    }

    #[test]
    fn test_vless_canonical_uri() {
        let uri = sample().canonical_uri();
        assert!(uri.starts_with("vless://5f0b9c1e"));
        assert!(uri.contains("security=tls"));
        assert!(uri.contains("type=ws"));
        assert!(uri.contains("path=/tunnel"));
    }

    #[test]
    fn test_ipv6_host_bracketed() {
        let cfg = VpnConfig::new(Protocol::Socks5, "2001:db8::1", 1080);
        assert_eq!(cfg.canonical_uri(), "socks5://[2001:db8::1]:1080");
    }
}
