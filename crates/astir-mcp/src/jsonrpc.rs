//! JSON-RPC 2.0 message types and line framing.
//!
//! The wire is newline-delimited UTF-8 JSON: one message per line. A line
//! that is not valid JSON yields a `-32700` parse error with `id: null` and
//! the session continues; structurally invalid messages (missing `jsonrpc`,
//! bad `id` type, missing `method`) yield `-32600`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes used on this wire.
pub mod codes {
    /// Line was not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Message was JSON but not a valid JSON-RPC request.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameters failed validation.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Application-level execution failure (range -32000..-32099).
    pub const APPLICATION_ERROR: i64 = -32000;
}

/// Request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Integer(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => f.write_str(s),
            RequestId::Integer(i) => write!(f, "{i}"),
        }
    }
}

/// An incoming request expecting a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A fire-and-forget notification; never answered, even on error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A response from the peer to a request we sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

/// Error payload inside an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Application error with the failure message under `data.error`.
    pub fn application(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: codes::APPLICATION_ERROR,
            message: "application error".to_string(),
            data: Some(serde_json::json!({ "error": message })),
        }
    }
}

/// One parsed incoming line.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    /// Structurally broken; `id` is whatever could be salvaged (often null).
    Invalid { id: Value, error: ErrorObject },
}

/// Parse one line off the wire.
pub fn parse_line(line: &str) -> IncomingMessage {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return IncomingMessage::Invalid {
                id: Value::Null,
                error: ErrorObject::new(codes::PARSE_ERROR, format!("parse error: {e}")),
            };
        }
    };

    let Value::Object(ref obj) = value else {
        return IncomingMessage::Invalid {
            id: Value::Null,
            error: ErrorObject::new(codes::INVALID_REQUEST, "message must be a JSON object"),
        };
    };

    // The id we echo back on structural errors: only string/int ids count.
    let salvaged_id = match obj.get("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
        _ => Value::Null,
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return IncomingMessage::Invalid {
            id: salvaged_id,
            error: ErrorObject::new(codes::INVALID_REQUEST, "missing or malformed jsonrpc field"),
        };
    }

    let has_method = obj.contains_key("method");
    let has_id = obj.contains_key("id");

    if has_method {
        let method_ok = obj.get("method").and_then(Value::as_str).is_some();
        if !method_ok {
            return IncomingMessage::Invalid {
                id: salvaged_id,
                error: ErrorObject::new(codes::INVALID_REQUEST, "method must be a string"),
            };
        }
        if has_id {
            match serde_json::from_value::<JsonRpcRequest>(value) {
                Ok(request) => IncomingMessage::Request(request),
                Err(e) => IncomingMessage::Invalid {
                    id: salvaged_id,
                    error: ErrorObject::new(
                        codes::INVALID_REQUEST,
                        format!("malformed request: {e}"),
                    ),
                },
            }
        } else {
            match serde_json::from_value::<JsonRpcNotification>(value) {
                Ok(notification) => IncomingMessage::Notification(notification),
                Err(e) => IncomingMessage::Invalid {
                    id: Value::Null,
                    error: ErrorObject::new(
                        codes::INVALID_REQUEST,
                        format!("malformed notification: {e}"),
                    ),
                },
            }
        }
    } else if obj.contains_key("result") {
        match serde_json::from_value::<JsonRpcResponse>(value) {
            Ok(response) => IncomingMessage::Response(response),
            Err(e) => IncomingMessage::Invalid {
                id: salvaged_id,
                error: ErrorObject::new(codes::INVALID_REQUEST, format!("malformed response: {e}")),
            },
        }
    } else {
        IncomingMessage::Invalid {
            id: salvaged_id,
            error: ErrorObject::new(codes::INVALID_REQUEST, "missing method"),
        }
    }
}

/// Serialise a success reply as one wire line (no trailing newline).
pub fn response_line(id: &RequestId, result: Value) -> String {
    serde_json::to_string(&serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
    .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null,"result":null}"#.to_string())
}

/// Serialise an error reply as one wire line. `id` may be null.
pub fn error_line(id: &Value, error: &ErrorObject) -> String {
    serde_json::to_string(&serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": error,
    }))
    .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"serialization failure"}}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_request() {
        let msg = parse_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        match msg {
            IncomingMessage::Request(req) => {
                assert_eq!(req.id, RequestId::Integer(1));
                assert_eq!(req.method, "ping");
                assert!(req.params.is_none());
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_string_id() {
        let msg = parse_line(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#);
        match msg {
            IncomingMessage::Request(req) => assert_eq!(req.id, RequestId::String("abc".into())),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_notification() {
        let msg = parse_line(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#);
        assert!(matches!(msg, IncomingMessage::Notification(_)));
    }

    #[test]
    fn bad_json_is_parse_error_with_null_id() {
        let msg = parse_line("{nope");
        match msg {
            IncomingMessage::Invalid { id, error } => {
                assert_eq!(id, Value::Null);
                assert_eq!(error.code, codes::PARSE_ERROR);
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn missing_jsonrpc_is_invalid_request() {
        let msg = parse_line(r#"{"id":1,"method":"ping"}"#);
        match msg {
            IncomingMessage::Invalid { id, error } => {
                assert_eq!(id, serde_json::json!(1));
                assert_eq!(error.code, codes::INVALID_REQUEST);
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn null_id_request_is_invalid() {
        // id present but null: neither request nor valid notification.
        let msg = parse_line(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#);
        match msg {
            IncomingMessage::Invalid { id, error } => {
                assert_eq!(id, Value::Null);
                assert_eq!(error.code, codes::INVALID_REQUEST);
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn non_object_is_invalid() {
        let msg = parse_line("[1,2,3]");
        assert!(matches!(
            msg,
            IncomingMessage::Invalid { id: Value::Null, .. }
        ));
    }

    #[test]
    fn parses_a_peer_response() {
        let msg = parse_line(r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#);
        assert!(matches!(msg, IncomingMessage::Response(_)));
    }

    #[test]
    fn error_line_round_trips() {
        let line = error_line(
            &Value::Null,
            &ErrorObject::new(codes::PARSE_ERROR, "parse error"),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], Value::Null);
        assert_eq!(parsed["error"]["code"], serde_json::json!(-32700));
    }

    #[test]
    fn application_error_carries_data_error() {
        let err = ErrorObject::application("store unavailable");
        assert_eq!(err.code, codes::APPLICATION_ERROR);
        assert_eq!(
            err.data.unwrap()["error"],
            serde_json::json!("store unavailable")
        );
    }
}
