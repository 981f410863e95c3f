//! The MCP session loop.
//!
//! Reads newline-delimited JSON-RPC off a byte stream, dispatches through the
//! [`MessageProcessor`], and writes replies through the single writer task.
//! EOF on the input is a clean shutdown: in-flight queries drain, the writer
//! flushes, and `serve` returns Ok.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info};

use astir_query::QueryProcessor;

use crate::error::Result;
use crate::jsonrpc::{parse_line, IncomingMessage};
use crate::outgoing::{writer_task, OutgoingMessageSender};
use crate::processor::{MessageProcessor, ServerOptions};

/// Run one MCP session over the given byte streams until EOF.
///
/// Typically called with stdin/stdout; tests drive it over an in-memory
/// duplex pipe.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    engine: Arc<QueryProcessor>,
    options: ServerOptions,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outgoing, outgoing_rx) = OutgoingMessageSender::new();
    let writer_handle = tokio::spawn(writer_task(writer, outgoing_rx));

    let mut processor = MessageProcessor::new(engine, outgoing.clone(), options);

    info!("MCP session started");
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            IncomingMessage::Request(request) => processor.process_request(request).await,
            IncomingMessage::Notification(notification) => {
                processor.process_notification(notification)
            }
            IncomingMessage::Response(response) => processor.process_response(response),
            IncomingMessage::Invalid { id, error } => {
                // One bad line never terminates the session.
                debug!(code = error.code, "Rejecting malformed line");
                outgoing.send_error(id, error);
            }
        }
    }

    info!("MCP session input closed, draining");
    // Drop our senders so the writer exits once in-flight tasks finish.
    drop(processor);
    drop(outgoing);
    let _ = writer_handle.await;
    info!("MCP session closed");
    Ok(())
}
