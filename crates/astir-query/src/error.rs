//! Error types for astir-query
//!
//! The variants map onto the failure taxonomy the MCP front-end exposes:
//! invalid requests and not-ready states surface to the client, deadline and
//! cancellation abort a single query, and everything recoverable (vector path
//! down, single-row decode failures) is handled inside the processor and
//! never reaches here.

use thiserror::Error;

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors surfaced by the query processor
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed or out-of-range request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No corpus snapshot yet (store unopened or never loaded)
    #[error("Engine not ready: {0}")]
    NotReady(String),

    /// The query deadline elapsed mid-pipeline
    #[error("Query deadline exceeded")]
    DeadlineExceeded,

    /// The client cancelled the request
    #[error("Query cancelled")]
    Cancelled,

    /// Concurrency bound or queue wait exceeded
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Annotation store failure that no fallback can answer
    #[error("Annotation store error: {0}")]
    Store(#[from] astir_core::StoreError),

    /// Vector index failure that survived the lexical fallback
    #[error("Vector index error: {0}")]
    Index(#[from] astir_index::IndexError),

    /// Embedding failure that survived the lexical fallback
    #[error("Embedding error: {0}")]
    Embed(#[from] astir_embed::EmbedError),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Whether the client should retry the identical request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::NotReady(_) | QueryError::ResourceExhausted(_)
        )
    }
}
