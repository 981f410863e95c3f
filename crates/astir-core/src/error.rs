//! Error types for astir-core

use thiserror::Error;

/// Result type for annotation store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the annotation store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store file does not exist or could not be opened
    #[error("Failed to open annotation store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Stored schema version differs from what this build understands
    #[error("Annotation store schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    /// SQLite error during a query
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Invalid file pattern in a filter
    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
