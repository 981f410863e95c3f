//! Outgoing message channel.
//!
//! Handlers enqueue replies here; a single writer task owns the output stream
//! and serialises one JSON object per line. Responses from concurrent tool
//! calls may therefore interleave in completion order, which the protocol
//! permits (ids are the correlation, not arrival order).

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::jsonrpc::{error_line, response_line, ErrorObject, RequestId};

/// A wire line ready to be written.
#[derive(Debug)]
pub enum OutgoingMessage {
    Response { id: RequestId, result: Value },
    Error { id: Value, error: ErrorObject },
    Notification { method: String, params: Value },
}

impl OutgoingMessage {
    fn to_line(&self) -> String {
        match self {
            OutgoingMessage::Response { id, result } => response_line(id, result.clone()),
            OutgoingMessage::Error { id, error } => error_line(id, error),
            OutgoingMessage::Notification { method, params } => {
                serde_json::to_string(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": method,
                    "params": params,
                }))
                .unwrap_or_default()
            }
        }
    }
}

/// Cloneable handle for enqueueing outgoing messages.
#[derive(Clone)]
pub struct OutgoingMessageSender {
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl OutgoingMessageSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send_response(&self, id: RequestId, result: Value) {
        self.send(OutgoingMessage::Response { id, result });
    }

    pub fn send_error(&self, id: Value, error: ErrorObject) {
        self.send(OutgoingMessage::Error { id, error });
    }

    pub fn send_notification(&self, method: impl Into<String>, params: Value) {
        self.send(OutgoingMessage::Notification {
            method: method.into(),
            params,
        });
    }

    fn send(&self, message: OutgoingMessage) {
        if self.tx.send(message).is_err() {
            // Writer task gone: the session is closing.
            debug!("Outgoing channel closed, dropping message");
        }
    }
}

/// Drain the queue onto the output stream until the channel closes.
pub async fn writer_task<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<OutgoingMessage>,
) {
    while let Some(message) = rx.recv().await {
        let mut line = message.to_line();
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("Failed to write outgoing message: {e}");
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!("Failed to flush output stream: {e}");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_emits_one_line_per_message() {
        let (sender, rx) = OutgoingMessageSender::new();
        let mut buffer = Vec::new();

        sender.send_response(RequestId::Integer(1), serde_json::json!({"ok": true}));
        sender.send_error(
            Value::Null,
            ErrorObject::new(crate::jsonrpc::codes::PARSE_ERROR, "parse error"),
        );
        drop(sender);

        writer_task(&mut buffer, rx).await;

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], serde_json::json!(1));
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"]["code"], serde_json::json!(-32700));
    }
}
