//! Astir MCP - JSON-RPC 2.0 front-end for the query engine
//!
//! Speaks the Model Context Protocol over newline-delimited JSON on a duplex
//! byte stream (typically the stdio of a child process). Exposes the query
//! engine as tools (`semantic_search`, `query_ast_context`, `file_lookup`,
//! `index_stats`) and the annotation store as a browsable resource tree.
//!
//! Framing and validation follow JSON-RPC 2.0 strictly: a malformed line is
//! answered with `-32700` and the session continues; unknown methods get
//! `-32601`; bad parameters `-32602`; engine failures surface as application
//! errors in `-32000..-32099` with the message under `data.error`.

pub mod error;
pub mod jsonrpc;
pub mod outgoing;
pub mod processor;
pub mod server;
pub mod tools;

pub use error::{McpError, Result};
pub use jsonrpc::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use processor::{MessageProcessor, ServerOptions};
pub use server::serve;
