//! # Subfuse Parsers
//!
//! One decoder per wire format, each producing the canonical
//! [`VpnConfig`] record or rejecting the line. The [`ParserBank`]
//! dispatches on the URI scheme prefix and keeps per-parser counters;
//! line-level failures are logged at debug and never propagate.

#![warn(clippy::all)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use subfuse_core::VpnConfig;

pub mod proxy;
pub mod quic;
pub mod shadowsocks;
pub mod shadowsocksr;
pub mod trojan;
pub mod uri;
pub mod vless;
pub mod vmess;

pub use proxy::{HttpProxyParser, Socks5Parser};
pub use quic::{Hysteria2Parser, TuicParser};
pub use shadowsocks::ShadowsocksParser;
pub use shadowsocksr::ShadowsocksrParser;
pub use trojan::TrojanParser;
pub use vless::VlessParser;
pub use vmess::VmessParser;

/// A protocol decoder
pub trait Parser: Send + Sync {
    /// Stable parser name for counters and logs
    fn name(&self) -> &'static str;

    /// URI schemes this parser claims
    fn schemes(&self) -> &'static [&'static str];

    /// Decode one line into a canonical record, or reject it
    fn parse(&self, line: &str) -> Option<VpnConfig>;
}

/// Per-parser observability counters
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ParserCounters {
    /// Lines successfully decoded
    pub parse_count: u64,
    /// Lines claimed by the parser but rejected
    pub error_count: u64,
}

struct Slot {
    parser: Box<dyn Parser>,
    parse_count: AtomicU64,
    error_count: AtomicU64,
}

/// Scheme-dispatched registry of protocol parsers
pub struct ParserBank {
    slots: Vec<Slot>,
    by_scheme: HashMap<&'static str, usize>,
}

impl ParserBank {
    /// An empty bank
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_scheme: HashMap::new(),
        }
    }

    /// Register a parser for each scheme it claims
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        let index = self.slots.len();
        for scheme in parser.schemes() {
            self.by_scheme.insert(scheme, index);
        }
        self.slots.push(Slot {
            parser,
            parse_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        });
    }

    /// Decode one line, dispatching on its scheme prefix
    pub fn parse(&self, line: &str) -> Option<VpnConfig> {
        let line = line.trim();
        let (scheme, _) = uri::split_scheme(line)?;
        let index = *self.by_scheme.get(scheme.to_ascii_lowercase().as_str())?;
        let slot = &self.slots[index];

        match slot.parser.parse(line) {
            Some(config) => {
                slot.parse_count.fetch_add(1, Ordering::Relaxed);
                Some(config)
            }
            None => {
                slot.error_count.fetch_add(1, Ordering::Relaxed);
                let prefix: String = line.chars().take(32).collect();
                debug!(parser = slot.parser.name(), line_prefix = %prefix, "line rejected");
                None
            }
        }
    }

    /// Decode a batch, preserving input order and skipping rejects
    pub fn parse_all<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<VpnConfig> {
        lines.into_iter().filter_map(|line| self.parse(line)).collect()
    }

    /// Snapshot of per-parser counters
    pub fn stats(&self) -> HashMap<&'static str, ParserCounters> {
        self.slots
            .iter()
            .map(|slot| {
                (
                    slot.parser.name(),
                    ParserCounters {
                        parse_count: slot.parse_count.load(Ordering::Relaxed),
                        error_count: slot.error_count.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}

impl Default for ParserBank {
    /// A bank with every supported protocol registered
    fn default() -> Self {
        let mut bank = Self::new();
        bank.register(Box::new(VmessParser));
        bank.register(Box::new(VlessParser));
        bank.register(Box::new(TrojanParser));
        bank.register(Box::new(ShadowsocksParser));
        bank.register(Box::new(ShadowsocksrParser));
        bank.register(Box::new(Hysteria2Parser));
        bank.register(Box::new(TuicParser));
        bank.register(Box::new(HttpProxyParser));
        bank.register(Box::new(Socks5Parser));
        bank
    }
}
