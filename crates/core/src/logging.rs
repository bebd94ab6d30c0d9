//! Structured logging infrastructure for MissionRunner.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{CoreError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the level filter, preferring `RUST_LOG` over the configured default.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging from a [`LoggingConfig`].
///
/// Log level can be overridden via the `RUST_LOG` environment variable.
/// Fails if a global subscriber has already been installed.
///
/// # Example
/// ```no_run
/// use missionrunner_core::{logging, LoggingConfig};
///
/// logging::init_with(&LoggingConfig::default()).expect("logging");
/// tracing::info!(vehicle_id = 1, "Vehicle attached");
/// ```
pub fn init_with(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    installed.map_err(|e| CoreError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_falls_back_to_default() {
        // Can only initialize once per process, so only the filter is exercised here
        let _ = env_filter("debug");
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = LoggingConfig::default();
        let _ = init_with(&config);
        assert!(matches!(init_with(&config), Err(CoreError::Logging(_))));
    }
}
