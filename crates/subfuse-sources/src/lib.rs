//! # Subfuse Sources
//!
//! The tiered source registry: which subscription URLs exist, how much each
//! is trusted, when each is due for a fetch, and which have been
//! blacklisted. Reputation combines success rate, recency, and configured
//! weight; persistently low-reputation sources are blacklisted
//! automatically.

#![warn(clippy::all)]

pub mod error;
pub mod manager;

pub use error::{SourceError, SourceResult};
pub use manager::{SourceManager, SourceStatistics};
