//! Error types for the job manager

use thiserror::Error;

/// Main error type for job operations
#[derive(Error, Debug)]
pub enum JobError {
    /// No job with the given id
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The requested transition is not allowed from the current status
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Persistence file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence file could not be parsed
    #[error("Persistence error: {0}")]
    Persistence(#[from] serde_json::Error),
}

/// Result type alias for job operations
pub type JobResult<T> = Result<T, JobError>;
