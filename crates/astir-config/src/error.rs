//! Error types for astir-config

use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Failed to access config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Global TOML config failed to parse
    #[error("Failed to parse TOML config {path}: {reason}")]
    TomlParse { path: String, reason: String },

    /// Workspace JSON config failed to parse
    #[error("Failed to parse JSON config {path}: {reason}")]
    JsonParse { path: String, reason: String },

    /// Workspace config written by an incompatible version
    #[error("Unsupported config version {found} (this build supports {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
