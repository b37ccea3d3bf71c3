//! Error types shared across the subfuse platform

use thiserror::Error;

/// Main error type for core model and settings operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_yaml::Error),

    /// Configuration value failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// URL failed the security validator
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A canonical record violated a model invariant
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
