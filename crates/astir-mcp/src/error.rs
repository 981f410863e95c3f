//! Error mapping from the engine onto the JSON-RPC wire.

use serde_json::Value;
use thiserror::Error;

use astir_query::QueryError;

use crate::jsonrpc::{codes, ErrorObject};

/// Result type for MCP server operations
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors internal to the front-end (the wire mapping lives in
/// [`error_object_for`]).
#[derive(Error, Debug)]
pub enum McpError {
    /// Startup failed before the session loop began
    #[error("Server initialisation failed: {0}")]
    Init(String),

    /// IO failure on the wire
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Map an engine error to the JSON-RPC error object the client sees.
///
/// Invalid parameters map to `-32602`; everything else the client must know
/// about (not ready, exhausted, cancelled, fatal storage) is an application
/// error with the message under `data.error`. Degraded runs never reach
/// here — they are successful responses marked `lexical_fallback`.
pub fn error_object_for(error: &QueryError) -> ErrorObject {
    match error {
        QueryError::InvalidRequest(message) => ErrorObject {
            code: codes::INVALID_PARAMS,
            message: "invalid params".to_string(),
            data: Some(Value::String(message.clone())),
        },
        QueryError::NotReady(message) => {
            ErrorObject::application(format!("not ready: {message}; retry shortly"))
        }
        QueryError::ResourceExhausted(message) => {
            ErrorObject::application(format!("resource exhausted: {message}"))
        }
        QueryError::DeadlineExceeded => {
            ErrorObject::application("deadline exceeded".to_string())
        }
        QueryError::Cancelled => ErrorObject::application("request cancelled".to_string()),
        other => ErrorObject::application(other.to_string()),
    }
}
