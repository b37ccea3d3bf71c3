//! # Subfuse Core
//!
//! Canonical data model and shared services for the subfuse platform:
//!
//! - [`config::VpnConfig`]: the normalized node record every wire format
//!   decodes into
//! - [`source::SourceMetadata`]: registry record with tier, weight, and a
//!   bounded performance history
//! - [`fetch::FetchResult`]: outcome of retrieving one subscription URL
//! - [`settings::AppSettings`]: typed `sources.yaml` model with validation
//! - [`security::SecurityValidator`]: URL and record gating

#![warn(clippy::all)]

pub mod config;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod security;
pub mod settings;
pub mod source;

pub use config::{DedupStrategy, Protocol, VpnConfig};
pub use error::{CoreError, CoreResult};
pub use fetch::FetchResult;
pub use security::{SecurityValidator, SecurityVerdict};
pub use settings::AppSettings;
pub use source::{
    HistoryRing, PerformanceRecord, ReputationWeights, SourceMetadata, SourceTier,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
