//! MCP tool parameter definitions and tool descriptors.
//!
//! These structs define the JSON Schema for tool parameters using schemars;
//! `tools/list` serves the generated schemas. Unknown fields in incoming
//! parameters are ignored so newer clients keep working against this server.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use astir_core::NodeType;
use astir_query::{QueryContext, QueryKind, QueryOptions, QueryRequest};

/// Parameters for the semantic_search tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SemanticSearchParams {
    /// Natural-language search query
    #[schemars(description = "Natural-language description of the code to find")]
    pub query: String,

    /// Maximum number of results
    #[schemars(description = "Maximum results to return (default 20, capped at 10000)")]
    pub max_results: Option<usize>,

    /// Minimum score threshold
    #[schemars(description = "Minimum match score in [0, 1] (default 0.3)")]
    pub min_score: Option<f32>,

    /// File path patterns
    #[schemars(
        description = "Restrict to files matching these regex or glob patterns (e.g. \"^src/utils/\")"
    )]
    pub file_filter: Option<Vec<String>>,

    /// Language labels
    #[schemars(description = "Restrict to these languages (e.g. [\"rust\", \"typescript\"])")]
    pub language_filter: Option<Vec<String>>,

    /// Node type filter
    #[schemars(
        description = "Restrict to one node type: function, method, class, interface, variable, other"
    )]
    pub node_type: Option<String>,

    /// Enable context boosting
    #[schemars(description = "Boost results near the editor context (default false)")]
    pub use_context_boosting: Option<bool>,

    /// Current editor file
    #[schemars(description = "Repo-relative path of the file open in the editor")]
    pub current_file: Option<String>,

    /// Selected text
    #[schemars(description = "Text currently selected in the editor")]
    pub selected_text: Option<String>,

    /// Recently visited files
    #[schemars(description = "Recently visited files, most recent first")]
    pub recent_files: Option<Vec<String>>,

    /// ANN candidate-list width
    #[schemars(description = "HNSW ef override; larger = higher recall, slower")]
    pub search_ef: Option<usize>,
}

/// Parameters for the query_ast_context tool (contextual search)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct QueryAstContextParams {
    /// What the agent wants to know
    #[schemars(description = "Natural-language intent (context boosting is always on)")]
    pub query: String,

    /// Maximum number of results
    #[schemars(description = "Maximum results to return (default 20)")]
    pub max_results: Option<usize>,

    /// Minimum score threshold
    #[schemars(description = "Minimum match score in [0, 1] (default 0.3)")]
    pub min_score: Option<f32>,

    /// Current editor file
    #[schemars(description = "Repo-relative path of the file open in the editor")]
    pub current_file: Option<String>,

    /// Selected text
    #[schemars(description = "Text currently selected in the editor")]
    pub selected_text: Option<String>,

    /// Recently visited files
    #[schemars(description = "Recently visited files, most recent first")]
    pub recent_files: Option<Vec<String>>,

    /// File path patterns
    #[schemars(description = "Restrict to files matching these regex or glob patterns")]
    pub file_filter: Option<Vec<String>>,

    /// Language labels
    #[schemars(description = "Restrict to these languages")]
    pub language_filter: Option<Vec<String>>,

    /// Node type filter
    #[schemars(description = "Restrict to one node type")]
    pub node_type: Option<String>,

    /// ANN candidate-list width
    #[schemars(description = "HNSW ef override")]
    pub search_ef: Option<usize>,
}

/// Parameters for the file_lookup tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileLookupParams {
    /// File to list annotations for
    #[schemars(description = "Repo-relative file path (forward slashes)")]
    pub file_path: String,
}

/// Parameters for the index_stats tool (no params needed)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct IndexStatsParams {}

/// A tool descriptor as served by tools/list.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// The tool catalogue.
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "semantic_search",
            description: "Find code by meaning. Embeds the query and returns ranked, annotated \
                          AST nodes with signatures, summaries and locations. Falls back to \
                          lexical matching when the vector path is unavailable.",
            input_schema: schema_value::<SemanticSearchParams>(),
        },
        ToolDef {
            name: "query_ast_context",
            description: "Semantic search with editor context boosting always on. Pass \
                          current_file / selected_text / recent_files to pull results toward \
                          what the user is looking at.",
            input_schema: schema_value::<QueryAstContextParams>(),
        },
        ToolDef {
            name: "file_lookup",
            description: "List every annotation in one file, in source order.",
            input_schema: schema_value::<FileLookupParams>(),
        },
        ToolDef {
            name: "index_stats",
            description: "Corpus size, last update time, cache hit rates and readiness.",
            input_schema: schema_value::<IndexStatsParams>(),
        },
    ]
}

/// Parse a node-type filter string, rejecting unknown values (unlike the
/// store decoder, which maps unknowns to `other`).
pub fn parse_node_type(s: &str) -> Result<NodeType, String> {
    match s {
        "function" | "method" | "class" | "interface" | "variable" | "other" => {
            Ok(NodeType::parse(s))
        }
        _ => Err(format!(
            "unknown node_type '{s}' (expected function, method, class, interface, variable or other)"
        )),
    }
}

impl SemanticSearchParams {
    /// Map into the engine's request shape.
    pub fn into_request(self) -> Result<QueryRequest, String> {
        let node_type = self.node_type.as_deref().map(parse_node_type).transpose()?;
        Ok(QueryRequest {
            kind: QueryKind::Semantic,
            text: self.query,
            max_results: self.max_results,
            min_score: self.min_score,
            filters: astir_core::AnnotationFilter {
                file_globs: self.file_filter.unwrap_or_default(),
                languages: self.language_filter.unwrap_or_default(),
                node_type,
                min_complexity: None,
                max_complexity: None,
            },
            context: QueryContext {
                current_file: self.current_file,
                selected_text: self.selected_text,
                recent_files: self.recent_files.unwrap_or_default(),
            },
            options: QueryOptions {
                search_ef: self.search_ef,
                use_context_boosting: self.use_context_boosting,
                include_similar: None,
            },
        })
    }
}

impl QueryAstContextParams {
    /// Map into a contextual request (boosting forced on by the kind).
    pub fn into_request(self) -> Result<QueryRequest, String> {
        let node_type = self.node_type.as_deref().map(parse_node_type).transpose()?;
        Ok(QueryRequest {
            kind: QueryKind::Contextual,
            text: self.query,
            max_results: self.max_results,
            min_score: self.min_score,
            filters: astir_core::AnnotationFilter {
                file_globs: self.file_filter.unwrap_or_default(),
                languages: self.language_filter.unwrap_or_default(),
                node_type,
                min_complexity: None,
                max_complexity: None,
            },
            context: QueryContext {
                current_file: self.current_file,
                selected_text: self.selected_text,
                recent_files: self.recent_files.unwrap_or_default(),
            },
            options: QueryOptions {
                search_ef: self.search_ef,
                use_context_boosting: Some(true),
                include_similar: None,
            },
        })
    }
}

/// Render microseconds since the Unix epoch as an ISO-8601 UTC timestamp.
///
/// Days-from-civil inversion, so the date math needs no external crate.
pub fn iso8601_from_micros(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let days = secs.div_euclid(86_400);
    let secs_of_day = secs.rem_euclid(86_400);

    // civil_from_days (Howard Hinnant's algorithm)
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}
