//! Error types for configuration loading.
//!
//! This module defines all errors that can occur while reading and
//! validating `.product-catalog/config.toml`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk.
    #[error("Failed to read config file at {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML file at {}: {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The file parsed but holds values the orchestrator cannot run with.
    #[error("Invalid configuration in {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },
}

/// Type alias for Result with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
