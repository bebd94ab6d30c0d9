//! Error types for the mission runner.
//!
//! None of these are returned from event handling. Precondition failures are
//! evaluated into a `Result`, logged once, and leave the runner inert.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up a runner or replaying a script.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Mission plan file does not exist
    #[error("Mission plan not found: {}", path.display())]
    PlanNotFound {
        /// Absolute path that was checked
        path: PathBuf,
    },

    /// Mission plan path could not be made absolute
    #[error("Mission plan path unresolvable: {path:?}: {source}")]
    PlanPathUnresolvable {
        /// Path as supplied
        path: PathBuf,
        /// Underlying resolution error
        #[source]
        source: std::io::Error,
    },

    /// No vehicle registry to watch
    #[error("Vehicle registry unavailable")]
    RegistryUnavailable,

    /// Replay script line could not be decoded
    #[error("Script error at line {line}: {source}")]
    Script {
        /// 1-based line number
        line: usize,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },

    /// Replay script referenced a vehicle that was never connected
    #[error("Unknown vehicle: {0}")]
    UnknownVehicle(u32),

    /// Core plumbing error
    #[error("Core error: {0}")]
    Core(#[from] missionrunner_core::CoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runner setup operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
