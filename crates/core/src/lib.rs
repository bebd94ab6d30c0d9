//! Core functionality for the MissionRunner headless mission orchestrator.
//!
//! This crate provides the ambient plumbing shared across the workspace:
//! error types, logging initialisation and configuration loading.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, LogFormat, LoggingConfig, MissionConfig};
pub use error::{CoreError, Result};
