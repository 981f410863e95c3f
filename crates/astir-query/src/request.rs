//! Query request and response types.
//!
//! [`QueryRequest`] is the single entry shape for all five strategies; the
//! MCP tools deserialise their parameters into it. Unknown keys in incoming
//! JSON are ignored (no deny-unknown-fields), so newer clients degrade
//! gracefully against older servers.

use serde::{Deserialize, Serialize};

use astir_core::{AnnotationFilter, AnnotationMatch};

/// Search strategy selector. A closed sum: adding a strategy is an API change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Embed the query and rank by cosine similarity.
    Semantic,
    /// Glob/regex match on file paths, results in source order.
    File,
    /// Token match against declaration signatures.
    Signature,
    /// Semantic with context boosting forced on.
    Contextual,
    /// Case-insensitive substring ranking over the textual fields.
    Lexical,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Semantic => "semantic",
            QueryKind::File => "file",
            QueryKind::Signature => "signature",
            QueryKind::Contextual => "contextual",
            QueryKind::Lexical => "lexical",
        }
    }
}

/// Editor context accompanying a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryContext {
    /// File open in the editor, repo-relative.
    pub current_file: Option<String>,
    /// Text the user has selected.
    pub selected_text: Option<String>,
    /// Recently visited files, most recent first.
    pub recent_files: Vec<String>,
}

impl QueryContext {
    pub fn is_empty(&self) -> bool {
        self.current_file.is_none() && self.selected_text.is_none() && self.recent_files.is_empty()
    }
}

/// Per-request tuning knobs. All optional; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// ANN candidate-list width override (clamped to at least the fetch size).
    pub search_ef: Option<usize>,
    /// Apply context boosts on a semantic query.
    pub use_context_boosting: Option<bool>,
    /// Permit the zero-result lexical fallback (`Some(false)` forbids it).
    pub include_similar: Option<bool>,
}

/// A query against the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub kind: QueryKind,
    pub text: String,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub filters: AnnotationFilter,
    #[serde(default)]
    pub context: QueryContext,
    #[serde(default)]
    pub options: QueryOptions,
}

impl QueryRequest {
    pub fn new(kind: QueryKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            max_results: None,
            min_score: None,
            filters: AnnotationFilter::default(),
            context: QueryContext::default(),
            options: QueryOptions::default(),
        }
    }
}

/// Strategy actually used to produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Semantic,
    SemanticWithContext,
    LexicalFallback,
    Signature,
    File,
    Lexical,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Semantic => "semantic",
            SearchStrategy::SemanticWithContext => "semantic_with_context",
            SearchStrategy::LexicalFallback => "lexical_fallback",
            SearchStrategy::Signature => "signature",
            SearchStrategy::File => "file",
            SearchStrategy::Lexical => "lexical",
        }
    }
}

/// Timing and provenance details attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Milliseconds spent in the ANN search (0 on non-vector paths).
    pub vector_search_time_ms: u64,
    /// Milliseconds spent boosting, filtering and sorting.
    pub ranking_time_ms: u64,
    /// Candidates considered before filtering and thresholding.
    pub total_candidates: usize,
    /// Names of the filter predicates that were active.
    pub applied_filters: Vec<String>,
    /// Whether this response came from the query cache.
    pub cache_hit: bool,
    /// Corpus epoch the response was computed against.
    pub corpus_epoch: u64,
}

/// The ranked answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<AnnotationMatch>,
    /// Matches that passed filters and threshold, before truncation.
    pub total_matches: usize,
    /// End-to-end processing time in milliseconds.
    pub query_time_ms: u64,
    pub search_strategy: SearchStrategy,
    pub metadata: ResponseMetadata,
}
