//! Error types for the processing pipeline

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// One or more requested output formats are not supported
    #[error("Unsupported formats: {}", .0.join(", "))]
    UnsupportedFormats(Vec<String>),

    /// Output file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output serialization failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Clash YAML emission failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// CSV emission failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The run was cancelled
    #[error("pipeline cancelled")]
    Cancelled,

    /// Core model error
    #[error(transparent)]
    Core(#[from] subfuse_core::CoreError),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
