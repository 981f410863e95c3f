//! Error types for astir-embed

use thiserror::Error;

/// Result type for embedding operations
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors that can occur during embedding generation
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Model could not be downloaded or loaded
    #[error("Failed to initialise embedding model '{model_ref}': {reason}")]
    ModelInit { model_ref: String, reason: String },

    /// Inference failure
    #[error("Embedding error: {0}")]
    Inference(String),

    /// Tokenization failure
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// Generator produced a vector of the wrong width
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Generator has been shut down
    #[error("Embedding generator is shut down")]
    ShutDown,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for EmbedError {
    fn from(err: candle_core::Error) -> Self {
        EmbedError::Inference(err.to_string())
    }
}
