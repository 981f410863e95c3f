//! Error types for astir-index

use thiserror::Error;

/// Result type for vector index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur in the vector index
#[derive(Error, Debug)]
pub enum IndexError {
    /// Query or inserted vector has the wrong dimension
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Index file is missing, truncated, or fails validation
    #[error("Corrupt vector index at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Duplicate node id inserted at build time
    #[error("Duplicate node id in index: {0}")]
    DuplicateId(String),

    /// Index is over its configured capacity
    #[error("Index capacity exceeded: max_elements = {0}")]
    CapacityExceeded(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Header serialization error
    #[error("Index header error: {0}")]
    Header(#[from] serde_json::Error),
}
