//! Configuration management for MissionRunner.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level runner configuration, usually loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Mission plan selection
    pub mission: MissionConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Mission plan settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissionConfig {
    /// Plan file to upload; relative paths resolve against the working directory
    pub plan_file: PathBuf,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default level directive when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration used when no file is supplied.
    pub fn default_config() -> Self {
        Self {
            mission: MissionConfig {
                plan_file: PathBuf::from("mission.plan"),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Reject configurations that can never drive a mission.
    pub fn validate(&self) -> Result<()> {
        if self.mission.plan_file.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig(
                "mission.plan_file must not be empty".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
