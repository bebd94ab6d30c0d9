//! Core error types

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for MissionRunner
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error in {path}: {source}")]
    ConfigParse {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Logging could not be installed (usually a subscriber is already set)
    #[error("Logging init failed: {0}")]
    Logging(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
