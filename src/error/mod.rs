//! Error handling module for smoothframe

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for configuration, I/O and front-end failures
#[derive(Error, Debug)]
pub enum SmoothframeError {
    /// Input path missing or unreadable
    #[error("Input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("Failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A configuration value is out of range or malformed
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    /// The transcoding engine could not be brought up
    #[error("Transcoding engine unavailable: {message}")]
    EngineUnavailable { message: String },

    /// One or more jobs ended in the error status
    #[error("{failed} of {total} jobs failed")]
    JobsFailed { failed: usize, total: usize },

    /// The run was interrupted by the user
    #[error("Interrupted")]
    Interrupted,

    /// Error raised by a port
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for smoothframe operations
pub type SmoothframeResult<T> = std::result::Result<T, SmoothframeError>;
