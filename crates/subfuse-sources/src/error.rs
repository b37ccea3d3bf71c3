//! Error types for the source registry

use thiserror::Error;

/// Main error type for registry operations
#[derive(Error, Debug)]
pub enum SourceError {
    /// The URL is already registered
    #[error("Source already exists")]
    Duplicate,

    /// The URL failed security validation
    #[error("Invalid source URL: {0}")]
    Invalid(String),

    /// The URL is not in the registry
    #[error("Source not found: {0}")]
    NotFound(String),
}

/// Result type alias for registry operations
pub type SourceResult<T> = Result<T, SourceError>;
