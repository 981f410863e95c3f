//! Full-session tests: drive the server over an in-memory duplex pipe and
//! assert on the wire traffic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use astir_core::{Annotation, NodeType, StoreWriter};
use astir_index::{IndexBuilder, IndexConfig};
use astir_mcp::{serve, ServerOptions};
use astir_query::{
    load_snapshot, CacheConfig, ProcessorConfig, QueryCaches, QueryProcessor, SnapshotCell,
};

fn annotation(id: &str, file: &str, line: u32) -> Annotation {
    Annotation {
        node_id: id.to_string(),
        file_path: file.to_string(),
        node_type: NodeType::Function,
        signature: format!("fn {id}()"),
        summary: format!("implementation of {id}"),
        source_snippet: format!("fn {id}() {{}}"),
        start_line: line,
        end_line: line + 3,
        parent_id: None,
        language: "rust".to_string(),
        complexity_score: 1.0,
        created_at: 1_000_000,
        updated_at: 2_000_000,
    }
}

/// Engine over a small corpus, no embedding generator (vector queries fall
/// back to lexical, which keeps the test hermetic).
fn build_engine(dir: &TempDir) -> Arc<QueryProcessor> {
    let store_path = dir.path().join("annotations.db");
    let index_path = dir.path().join("vectors.idx");

    let mut writer = StoreWriter::create(&store_path).unwrap();
    writer
        .insert_batch(&[
            annotation("parse_json", "src/utils/json.rs", 10),
            annotation("render", "src/render.rs", 1),
        ])
        .unwrap();
    drop(writer);

    let mut builder = IndexBuilder::new(4);
    builder.insert("parse_json", vec![1.0, 0.0, 0.0, 0.0], "h1").unwrap();
    builder.insert("render", vec![0.0, 1.0, 0.0, 0.0], "h2").unwrap();
    builder.save(&index_path).unwrap();

    let snapshot = load_snapshot(&store_path, &index_path, IndexConfig::default(), 4, 1).unwrap();
    Arc::new(QueryProcessor::new(
        Arc::new(SnapshotCell::with_snapshot(snapshot)),
        None,
        Arc::new(QueryCaches::new(CacheConfig::default())),
        ProcessorConfig::default(),
    ))
}

struct Session {
    client_writer: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    client_reader: BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
    _server: tokio::task::JoinHandle<()>,
}

impl Session {
    fn start(engine: Arc<QueryProcessor>, options: ServerOptions) -> Self {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_reader, server_writer) = tokio::io::split(server_side);
        let (client_reader, client_writer) = tokio::io::split(client_side);

        let server = tokio::spawn(async move {
            let _ = serve(server_reader, server_writer, engine, options).await;
        });

        Self {
            client_writer,
            client_reader: BufReader::new(client_reader),
            _server: server,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.client_writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn send_raw(&mut self, raw: &str) {
        self.client_writer.write_all(raw.as_bytes()).await.unwrap();
        self.client_writer.write_all(b"\n").await.unwrap();
    }

    /// Next message off the wire, bounded so broken tests fail fast.
    async fn recv(&mut self) -> Value {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(10), self.client_reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a server message")
            .unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    /// Receive until the message with the given id arrives (responses may
    /// interleave in completion order).
    async fn recv_for_id(&mut self, id: i64) -> Value {
        for _ in 0..32 {
            let message = self.recv().await;
            if message["id"] == json!(id) {
                return message;
            }
        }
        panic!("no response for id {id}");
    }

    async fn initialize(&mut self) {
        self.send(json!({
            "jsonrpc": "2.0", "id": 0, "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "capabilities": {}},
        }))
        .await;
        let reply = self.recv_for_id(0).await;
        assert_eq!(reply["result"]["serverInfo"]["name"], json!("astir"));
    }
}

/// Parse the text content block of a tool result.
fn tool_payload(reply: &Value) -> Value {
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn initialize_ping_and_tool_catalogue() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .await;
    let pong = session.recv_for_id(1).await;
    assert_eq!(pong["result"], json!({}));

    session
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let tools = session.recv_for_id(2).await;
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"semantic_search"));
    assert!(names.contains(&"query_ast_context"));
    assert!(names.contains(&"file_lookup"));
    assert!(names.contains(&"index_stats"));
}

#[tokio::test]
async fn semantic_search_without_generator_reports_fallback() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "semantic_search", "arguments": {"query": "parse_json"}},
        }))
        .await;
    let reply = session.recv_for_id(5).await;
    let payload = tool_payload(&reply);

    assert_eq!(payload["search_strategy"], json!("lexical_fallback"));
    assert_eq!(payload["metadata"]["cache_hit"], json!(false));
    assert_eq!(payload["metadata"]["corpus_epoch"], json!(1));
    let results = payload["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(
        results[0]["annotation"]["node_id"],
        json!("parse_json")
    );
}

#[tokio::test]
async fn second_identical_call_hits_the_cache() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    let call = json!({
        "jsonrpc": "2.0", "id": 7, "method": "tools/call",
        "params": {"name": "semantic_search", "arguments": {"query": "parse_json"}},
    });
    session.send(call.clone()).await;
    let first = tool_payload(&session.recv_for_id(7).await);

    let mut second_call = call;
    second_call["id"] = json!(8);
    session.send(second_call).await;
    let second = tool_payload(&session.recv_for_id(8).await);

    assert_eq!(first["metadata"]["cache_hit"], json!(false));
    assert_eq!(second["metadata"]["cache_hit"], json!(true));
    assert_eq!(first["results"], second["results"]);
}

#[tokio::test]
async fn file_lookup_returns_source_order() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "file_lookup", "arguments": {"file_path": "src/utils/json.rs"}},
        }))
        .await;
    let reply = session.recv_for_id(3).await;
    let payload = tool_payload(&reply);
    assert_eq!(payload["annotation_count"], json!(1));
    assert_eq!(payload["annotations"][0]["node_id"], json!("parse_json"));
}

#[tokio::test]
async fn index_stats_reports_readiness() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "index_stats", "arguments": {}},
        }))
        .await;
    let payload = tool_payload(&session.recv_for_id(4).await);
    assert_eq!(payload["node_count"], json!(2));
    assert_eq!(payload["file_count"], json!(2));
    assert_eq!(payload["ready"], json!(true));
    assert_eq!(payload["vector_count"], json!(2));
    assert_eq!(payload["last_updated_iso8601"], json!("1970-01-01T00:00:02Z"));
}

#[tokio::test]
async fn resources_list_and_read() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({"jsonrpc": "2.0", "id": 10, "method": "resources/list"}))
        .await;
    let listing = session.recv_for_id(10).await;
    let uris: Vec<&str> = listing["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert_eq!(
        uris,
        vec![
            "astir://annotations/src/render.rs",
            "astir://annotations/src/utils/json.rs",
        ]
    );

    session
        .send(json!({
            "jsonrpc": "2.0", "id": 11, "method": "resources/read",
            "params": {"uri": "astir://annotations/src/render.rs"},
        }))
        .await;
    let read = session.recv_for_id(11).await;
    let text = read["result"]["contents"][0]["text"].as_str().unwrap();
    let annotations: Value = serde_json::from_str(text).unwrap();
    assert_eq!(annotations[0]["node_id"], json!("render"));
}

#[tokio::test]
async fn malformed_line_gets_parse_error_and_session_survives() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session.send_raw("{this is not json").await;
    let error = session.recv().await;
    assert_eq!(error["error"]["code"], json!(-32700));
    assert_eq!(error["id"], Value::Null);

    // The session keeps serving.
    session
        .send(json!({"jsonrpc": "2.0", "id": 20, "method": "ping"}))
        .await;
    let pong = session.recv_for_id(20).await;
    assert_eq!(pong["result"], json!({}));
}

#[tokio::test]
async fn missing_jsonrpc_field_is_invalid_request() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session.send(json!({"id": 21, "method": "ping"})).await;
    let error = session.recv_for_id(21).await;
    assert_eq!(error["error"]["code"], json!(-32600));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({"jsonrpc": "2.0", "id": 22, "method": "prompts/list"}))
        .await;
    let error = session.recv_for_id(22).await;
    assert_eq!(error["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn bad_tool_arguments_are_invalid_params() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({
            "jsonrpc": "2.0", "id": 23, "method": "tools/call",
            "params": {"name": "semantic_search", "arguments": {"query": "x", "node_type": "enum"}},
        }))
        .await;
    let error = session.recv_for_id(23).await;
    assert_eq!(error["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn tools_before_initialize_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());

    session
        .send(json!({"jsonrpc": "2.0", "id": 30, "method": "tools/list"}))
        .await;
    let error = session.recv_for_id(30).await;
    assert_eq!(error["error"]["code"], json!(-32000));

    // Ping works pre-initialize.
    session
        .send(json!({"jsonrpc": "2.0", "id": 31, "method": "ping"}))
        .await;
    let pong = session.recv_for_id(31).await;
    assert_eq!(pong["result"], json!({}));
}

#[tokio::test]
async fn double_initialize_is_invalid_request() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    session
        .send(json!({
            "jsonrpc": "2.0", "id": 40, "method": "initialize",
            "params": {"protocolVersion": "2024-11-05"},
        }))
        .await;
    let error = session.recv_for_id(40).await;
    assert_eq!(error["error"]["code"], json!(-32600));
}

#[tokio::test]
async fn notifications_never_get_a_reply() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::start(build_engine(&dir), ServerOptions::default());
    session.initialize().await;

    // Cancellation for an unknown request id: logged, never answered.
    session
        .send(json!({
            "jsonrpc": "2.0", "method": "notifications/cancelled",
            "params": {"requestId": 999},
        }))
        .await;

    // The next reply on the wire is for the ping, not the notification.
    session
        .send(json!({"jsonrpc": "2.0", "id": 50, "method": "ping"}))
        .await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], json!(50));
}

#[tokio::test]
async fn reject_mode_answers_resource_exhausted_when_saturated() {
    let dir = TempDir::new().unwrap();
    let engine = build_engine(&dir);
    let mut session = Session::start(
        engine,
        ServerOptions {
            max_in_flight: 1,
            reject_on_overflow: true,
            query_timeout: Duration::from_secs(30),
        },
    );
    session.initialize().await;

    // Fire a burst; with a bound of 1 at least one must be rejected with an
    // application error carrying "resource exhausted".
    for i in 0..6 {
        session
            .send(json!({
                "jsonrpc": "2.0", "id": 100 + i, "method": "tools/call",
                "params": {"name": "semantic_search", "arguments": {"query": format!("query {i}")}},
            }))
            .await;
    }

    let mut rejected = 0;
    let mut succeeded = 0;
    for _ in 0..6 {
        let reply = session.recv().await;
        if reply.get("error").is_some() {
            let data = reply["error"]["data"]["error"].as_str().unwrap_or_default();
            assert!(data.contains("resource exhausted"));
            rejected += 1;
        } else {
            succeeded += 1;
        }
    }
    assert!(succeeded >= 1);
    assert!(rejected + succeeded == 6);
}
