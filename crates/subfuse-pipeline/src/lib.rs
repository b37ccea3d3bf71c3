//! # Subfuse Pipeline
//!
//! The processing stage and orchestration for the subfuse platform:
//!
//! - [`processor`]: security gating, semantic deduplication (four
//!   strategies), best-effort enhancement hooks, initial scoring
//! - [`output`]: raw / base64 / CSV / Clash / sing-box / JSON emitters with
//!   atomic writes and fail-fast format validation
//! - [`merger`]: the end-to-end driver — sources → fetcher (cached) →
//!   parsers → processor → formatters — with monotonic progress reporting
//!   and cancellation

#![warn(clippy::all)]

pub mod error;
pub mod merger;
pub mod output;
pub mod processor;

pub use error::{PipelineError, PipelineResult};
pub use merger::{Merger, MergerConfig, MergerStatistics, PipelineReport, ProgressFn};
pub use output::{parse_formats, OutputFormat, OutputManager, AUTO_SELECT_GROUP};
pub use processor::{
    deduplicate, find_duplicates, initial_score, Enhancer, GeoOptimizer, ProcessStats, Processor,
    QualityPredictor,
};
