//! Request dispatch for the MCP session.
//!
//! One `MessageProcessor` per connection. Query-bearing tool calls run as
//! spawned tasks bounded by the in-flight semaphore, so the read loop never
//! blocks behind a slow query and responses go out in completion order.
//! `notifications/cancelled` flips the per-request cancellation flag held in
//! the running-request registry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use astir_core::AnnotationMatch;
use astir_query::{
    CancellationFlag, QueryDeadline, QueryError, QueryProcessor, QueryRequest, QueryResponse,
};

use crate::error::error_object_for;
use crate::jsonrpc::{
    codes, ErrorObject, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::outgoing::OutgoingMessageSender;
use crate::tools::{
    iso8601_from_micros, tool_definitions, FileLookupParams, QueryAstContextParams,
    SemanticSearchParams,
};

/// Resource URI prefix for the annotation tree.
const RESOURCE_PREFIX: &str = "astir://annotations/";

/// MCP protocol revision this server speaks.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Front-end behaviour knobs.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Concurrent in-flight tool-call bound.
    pub max_in_flight: usize,
    /// Reject instead of queueing when the bound is hit.
    pub reject_on_overflow: bool,
    /// Per-query deadline.
    pub query_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            reject_on_overflow: false,
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-session dispatcher.
pub struct MessageProcessor {
    engine: Arc<QueryProcessor>,
    outgoing: OutgoingMessageSender,
    options: ServerOptions,
    initialized: bool,
    in_flight: Arc<Semaphore>,
    running: Arc<DashMap<RequestId, CancellationFlag>>,
}

impl MessageProcessor {
    pub fn new(
        engine: Arc<QueryProcessor>,
        outgoing: OutgoingMessageSender,
        options: ServerOptions,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
        Self {
            engine,
            outgoing,
            options,
            initialized: false,
            in_flight,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Dispatch one request.
    pub async fn process_request(&mut self, request: JsonRpcRequest) {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(%id, %method, "Incoming request");

        // Everything except the handshake and liveness waits for initialize.
        if !self.initialized && method != "initialize" && method != "ping" {
            self.outgoing.send_error(
                serde_json::to_value(&id).unwrap_or(Value::Null),
                ErrorObject::application("not ready: initialize has not completed".to_string()),
            );
            return;
        }

        match method.as_str() {
            "initialize" => self.handle_initialize(id, params),
            "ping" => self.outgoing.send_response(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, params),
            "resources/list" => self.handle_list_resources(id).await,
            "resources/read" => self.handle_read_resource(id, params).await,
            _ => {
                self.outgoing.send_error(
                    serde_json::to_value(&id).unwrap_or(Value::Null),
                    ErrorObject::new(codes::METHOD_NOT_FOUND, format!("unknown method '{method}'")),
                );
            }
        }
    }

    /// Handle a fire-and-forget notification. Errors are logged only.
    pub fn process_notification(&mut self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/cancelled" => {
                let Some(params) = notification.params else {
                    warn!("cancelled notification without params");
                    return;
                };
                let request_id = params
                    .get("requestId")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<RequestId>(v).ok());
                match request_id {
                    Some(id) => {
                        if let Some(flag) = self.running.get(&id) {
                            info!(%id, "Cancelling request");
                            flag.cancel();
                        } else {
                            debug!(%id, "Cancellation for unknown or finished request");
                        }
                    }
                    None => warn!("cancelled notification without a usable requestId"),
                }
            }
            "notifications/initialized" => {
                debug!("Client reports initialized");
            }
            other => {
                debug!(method = other, "Ignoring notification");
            }
        }
    }

    /// A response from the peer to something we sent. We send no requests, so
    /// this is only ever logged.
    pub fn process_response(&mut self, response: JsonRpcResponse) {
        debug!(id = %response.id, "Ignoring unsolicited response");
    }

    // =========================================================================
    // Handshake and catalogues
    // =========================================================================

    fn handle_initialize(&mut self, id: RequestId, params: Option<Value>) {
        if self.initialized {
            self.outgoing.send_error(
                serde_json::to_value(&id).unwrap_or(Value::Null),
                ErrorObject::new(codes::INVALID_REQUEST, "initialize called more than once"),
            );
            return;
        }
        self.initialized = true;

        let client_version = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();

        info!(protocol = %client_version, "Session initialized");
        self.outgoing.send_response(
            id,
            json!({
                "protocolVersion": client_version,
                "capabilities": {
                    "tools": {},
                    "resources": {},
                },
                "serverInfo": {
                    "name": "astir",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        );
    }

    fn handle_list_tools(&self, id: RequestId) {
        let tools = tool_definitions();
        self.outgoing.send_response(id, json!({ "tools": tools }));
    }

    // =========================================================================
    // Tool dispatch
    // =========================================================================

    fn handle_call_tool(&self, id: RequestId, params: Option<Value>) {
        let wire_id = serde_json::to_value(&id).unwrap_or(Value::Null);
        let Some(params) = params else {
            self.outgoing.send_error(
                wire_id,
                ErrorObject::new(codes::INVALID_PARAMS, "tools/call requires params"),
            );
            return;
        };
        let Some(name) = params.get("name").and_then(Value::as_str).map(String::from) else {
            self.outgoing.send_error(
                wire_id,
                ErrorObject::new(codes::INVALID_PARAMS, "tools/call requires a tool name"),
            );
            return;
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match name.as_str() {
            "semantic_search" => {
                match serde_json::from_value::<SemanticSearchParams>(arguments)
                    .map_err(|e| e.to_string())
                    .and_then(|p| p.into_request())
                {
                    Ok(request) => self.spawn_query(id, request),
                    Err(e) => self.outgoing.send_error(
                        wire_id,
                        ErrorObject::new(codes::INVALID_PARAMS, e),
                    ),
                }
            }
            "query_ast_context" => {
                match serde_json::from_value::<QueryAstContextParams>(arguments)
                    .map_err(|e| e.to_string())
                    .and_then(|p| p.into_request())
                {
                    Ok(request) => self.spawn_query(id, request),
                    Err(e) => self.outgoing.send_error(
                        wire_id,
                        ErrorObject::new(codes::INVALID_PARAMS, e),
                    ),
                }
            }
            "file_lookup" => match serde_json::from_value::<FileLookupParams>(arguments) {
                Ok(p) => self.spawn_file_lookup(id, p),
                Err(e) => self.outgoing.send_error(
                    wire_id,
                    ErrorObject::new(codes::INVALID_PARAMS, e.to_string()),
                ),
            },
            "index_stats" => self.spawn_index_stats(id),
            other => {
                self.outgoing.send_error(
                    wire_id,
                    ErrorObject::new(codes::INVALID_PARAMS, format!("unknown tool '{other}'")),
                );
            }
        }
    }

    /// Run a query-bearing tool as a bounded background task.
    fn spawn_query(&self, id: RequestId, request: QueryRequest) {
        let engine = Arc::clone(&self.engine);
        let outgoing = self.outgoing.clone();
        let running = Arc::clone(&self.running);
        let semaphore = Arc::clone(&self.in_flight);
        let options = self.options.clone();

        tokio::spawn(async move {
            let wire_id = serde_json::to_value(&id).unwrap_or(Value::Null);

            // Backpressure: queue (bounded by the deadline) or reject.
            let permit = if options.reject_on_overflow {
                match semaphore.try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        outgoing.send_error(
                            wire_id,
                            error_object_for(&QueryError::ResourceExhausted(
                                "in-flight request bound exceeded".to_string(),
                            )),
                        );
                        return;
                    }
                }
            } else {
                match tokio::time::timeout(options.query_timeout, semaphore.acquire_owned()).await
                {
                    Ok(Ok(permit)) => permit,
                    _ => {
                        outgoing.send_error(
                            wire_id,
                            error_object_for(&QueryError::ResourceExhausted(
                                "queue wait exceeded the deadline".to_string(),
                            )),
                        );
                        return;
                    }
                }
            };

            let flag = CancellationFlag::new();
            running.insert(id.clone(), flag.clone());
            let deadline = QueryDeadline::with_cancellation(options.query_timeout, flag);

            let result = engine.process(request, deadline).await;
            running.remove(&id);
            drop(permit);

            match result {
                Ok(response) => {
                    outgoing.send_response(id, tool_result(query_response_json(&response)));
                }
                Err(e) => {
                    warn!("Query failed: {e}");
                    outgoing.send_error(wire_id, error_object_for(&e));
                }
            }
        });
    }

    fn spawn_file_lookup(&self, id: RequestId, params: FileLookupParams) {
        let engine = Arc::clone(&self.engine);
        let outgoing = self.outgoing.clone();

        tokio::spawn(async move {
            let wire_id = serde_json::to_value(&id).unwrap_or(Value::Null);
            let snapshot = match engine.snapshots().current() {
                Ok(s) => s,
                Err(e) => {
                    outgoing.send_error(wire_id, error_object_for(&e));
                    return;
                }
            };

            let store = Arc::clone(&snapshot.store);
            let file_path = params.file_path.clone();
            let rows = tokio::task::spawn_blocking(move || store.get_by_file(&file_path)).await;

            match rows {
                Ok(Ok(annotations)) => {
                    outgoing.send_response(
                        id,
                        tool_result(json!({
                            "file_path": params.file_path,
                            "annotation_count": annotations.len(),
                            "annotations": annotations,
                        })),
                    );
                }
                Ok(Err(e)) => {
                    outgoing.send_error(wire_id, error_object_for(&QueryError::Store(e)));
                }
                Err(e) => {
                    outgoing.send_error(
                        wire_id,
                        ErrorObject::application(format!("file lookup task panicked: {e}")),
                    );
                }
            }
        });
    }

    fn spawn_index_stats(&self, id: RequestId) {
        let engine = Arc::clone(&self.engine);
        let outgoing = self.outgoing.clone();

        tokio::spawn(async move {
            let wire_id = serde_json::to_value(&id).unwrap_or(Value::Null);
            let Ok(snapshot) = engine.snapshots().current() else {
                // Before the first snapshot the stats answer is "not ready",
                // which for this tool is a valid response, not an error.
                outgoing.send_response(
                    id,
                    tool_result(json!({
                        "node_count": 0,
                        "file_count": 0,
                        "last_updated_iso8601": Value::Null,
                        "ready": false,
                    })),
                );
                return;
            };

            let store = Arc::clone(&snapshot.store);
            let stats = tokio::task::spawn_blocking(move || store.statistics()).await;

            match stats {
                Ok(Ok(stats)) => {
                    let ready = engine.snapshots().ready();
                    let index_stats = snapshot.index.stats();
                    let query_metrics = engine.caches().query.metrics();
                    let embedding_metrics = engine.caches().embedding.metrics();
                    outgoing.send_response(
                        id,
                        tool_result(json!({
                            "node_count": stats.nodes,
                            "file_count": stats.files,
                            "last_updated_iso8601": stats.last_updated.map(iso8601_from_micros),
                            "ready": ready,
                            "corpus_epoch": snapshot.epoch,
                            "avg_complexity": stats.avg_complexity,
                            "node_type_histogram": stats.node_type_histogram,
                            "vector_count": index_stats.count,
                            "vector_dimension": index_stats.dimension,
                            "cache": {
                                "query": { "entries": engine.caches().query.len(), "hit_rate": query_metrics.hit_rate() },
                                "embedding": { "entries": engine.caches().embedding.len(), "hit_rate": embedding_metrics.hit_rate() },
                            },
                        })),
                    );
                }
                Ok(Err(e)) => {
                    outgoing.send_error(wire_id, error_object_for(&QueryError::Store(e)));
                }
                Err(e) => {
                    outgoing.send_error(
                        wire_id,
                        ErrorObject::application(format!("stats task panicked: {e}")),
                    );
                }
            }
        });
    }

    // =========================================================================
    // Resources
    // =========================================================================

    async fn handle_list_resources(&self, id: RequestId) {
        let wire_id = serde_json::to_value(&id).unwrap_or(Value::Null);
        let snapshot = match self.engine.snapshots().current() {
            Ok(s) => s,
            Err(e) => {
                self.outgoing.send_error(wire_id, error_object_for(&e));
                return;
            }
        };

        let store = Arc::clone(&snapshot.store);
        let files = tokio::task::spawn_blocking(move || store.distinct_files()).await;

        match files {
            Ok(Ok(files)) => {
                let resources: Vec<Value> = files
                    .iter()
                    .map(|f| {
                        json!({
                            "uri": format!("{RESOURCE_PREFIX}{f}"),
                            "name": f,
                            "mimeType": "application/json",
                        })
                    })
                    .collect();
                self.outgoing
                    .send_response(id, json!({ "resources": resources }));
            }
            Ok(Err(e)) => {
                self.outgoing
                    .send_error(wire_id, error_object_for(&QueryError::Store(e)));
            }
            Err(e) => {
                self.outgoing.send_error(
                    wire_id,
                    ErrorObject::application(format!("resource listing task panicked: {e}")),
                );
            }
        }
    }

    async fn handle_read_resource(&self, id: RequestId, params: Option<Value>) {
        let wire_id = serde_json::to_value(&id).unwrap_or(Value::Null);
        let uri = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .map(String::from);
        let Some(uri) = uri else {
            self.outgoing.send_error(
                wire_id,
                ErrorObject::new(codes::INVALID_PARAMS, "resources/read requires a uri"),
            );
            return;
        };
        let Some(file_path) = uri.strip_prefix(RESOURCE_PREFIX).map(String::from) else {
            self.outgoing.send_error(
                wire_id,
                ErrorObject::new(
                    codes::INVALID_PARAMS,
                    format!("unknown resource uri '{uri}'"),
                ),
            );
            return;
        };

        let snapshot = match self.engine.snapshots().current() {
            Ok(s) => s,
            Err(e) => {
                self.outgoing.send_error(wire_id, error_object_for(&e));
                return;
            }
        };
        let store = Arc::clone(&snapshot.store);
        let lookup_path = file_path.clone();
        let rows = tokio::task::spawn_blocking(move || store.get_by_file(&lookup_path)).await;

        match rows {
            Ok(Ok(annotations)) => {
                let text = serde_json::to_string_pretty(&annotations).unwrap_or_default();
                self.outgoing.send_response(
                    id,
                    json!({
                        "contents": [{
                            "uri": uri,
                            "mimeType": "application/json",
                            "text": text,
                        }],
                    }),
                );
            }
            Ok(Err(e)) => {
                self.outgoing
                    .send_error(wire_id, error_object_for(&QueryError::Store(e)));
            }
            Err(e) => {
                self.outgoing.send_error(
                    wire_id,
                    ErrorObject::application(format!("resource read task panicked: {e}")),
                );
            }
        }
    }
}

/// Wrap a payload as an MCP tool result (one text content block).
fn tool_result(payload: Value) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(&payload).unwrap_or_default(),
        }],
        "isError": false,
    })
}

/// The wire shape of a query response (field names per the tool contract).
fn query_response_json(response: &QueryResponse) -> Value {
    let results: Vec<Value> = response.results.iter().map(match_json).collect();
    json!({
        "results": results,
        "total_matches": response.total_matches,
        "query_time": response.query_time_ms,
        "search_strategy": response.search_strategy.as_str(),
        "metadata": {
            "vector_search_time_ms": response.metadata.vector_search_time_ms,
            "ranking_time_ms": response.metadata.ranking_time_ms,
            "total_candidates": response.metadata.total_candidates,
            "applied_filters": response.metadata.applied_filters,
            "cache_hit": response.metadata.cache_hit,
            "corpus_epoch": response.metadata.corpus_epoch,
        },
    })
}

fn match_json(m: &AnnotationMatch) -> Value {
    json!({
        "annotation": m.annotation,
        "score": m.score,
        "match_reason": m.match_reason,
    })
}
