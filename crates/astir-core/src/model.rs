//! Core data model: annotations and search match types.
//!
//! An [`Annotation`] is the hydrated form of a summarised AST node. Annotations
//! are produced by the ingest pipeline and served read-only by the query
//! engine; the vector index refers to them by `node_id` only.

use serde::{Deserialize, Serialize};

/// Classification of an annotated AST node.
///
/// Stored as lowercase text in the annotation store. Unknown values decode as
/// [`NodeType::Other`] so a newer ingest pipeline cannot break an older reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Function,
    Method,
    Class,
    Interface,
    Variable,
    Other,
}

impl NodeType {
    /// Stable string form used in the store and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Function => "function",
            NodeType::Method => "method",
            NodeType::Class => "class",
            NodeType::Interface => "interface",
            NodeType::Variable => "variable",
            NodeType::Other => "other",
        }
    }

    /// Parse from the stored string form. Unknown strings map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "function" => NodeType::Function,
            "method" => NodeType::Method,
            "class" => NodeType::Class,
            "interface" => NodeType::Interface,
            "variable" => NodeType::Variable,
            _ => NodeType::Other,
        }
    }

    /// Node types that denote a named code entity (used by lexical scoring).
    pub fn is_named_entity(&self) -> bool {
        matches!(
            self,
            NodeType::Function | NodeType::Method | NodeType::Class | NodeType::Variable
        )
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A summarised AST node with location and textual metadata.
///
/// Invariants (enforced at ingest, assumed by the query engine):
/// - `node_id` is globally unique and stable across parses of one file revision
/// - `start_line <= end_line`, both 1-based inclusive
/// - `parent_id` is null or resolves to an annotation in the same file
/// - `file_path` is relative with forward slashes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Opaque stable identifier.
    pub node_id: String,
    /// Repo-relative path, forward-slash normalised.
    pub file_path: String,
    /// Node classification.
    pub node_type: NodeType,
    /// One-line declaration text.
    pub signature: String,
    /// Natural-language summary, at most 200 characters.
    pub summary: String,
    /// Verbatim source excerpt.
    pub source_snippet: String,
    /// 1-based inclusive start line.
    pub start_line: u32,
    /// 1-based inclusive end line.
    pub end_line: u32,
    /// Enclosing annotation, if any.
    pub parent_id: Option<String>,
    /// Language label derived from the file extension (e.g. "rust", "typescript").
    pub language: String,
    /// Non-negative complexity estimate from the ingest pipeline.
    pub complexity_score: f64,
    /// Creation timestamp, microseconds since the Unix epoch.
    pub created_at: i64,
    /// Last-update timestamp, microseconds since the Unix epoch.
    pub updated_at: i64,
}

impl Annotation {
    /// Number of source lines this annotation spans.
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A raw hit from the vector index: node id plus cosine similarity in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub node_id: String,
    pub score: f32,
}

/// Why a result matched the query; carried on every returned match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Ranked by embedding cosine similarity.
    SemanticSimilarity,
    /// Semantic hit whose final score includes editor-context boosts.
    ContextBoosted,
    /// Token overlap against the declaration signature.
    SignatureMatch,
    /// Matched a file-path pattern.
    FileMatch,
    /// Case-insensitive substring match over the textual fields.
    LexicalMatch,
}

/// A fully hydrated search result: the annotation, its final score, and the
/// reason it matched. This is the external return type of the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMatch {
    pub annotation: Annotation,
    pub score: f32,
    pub match_reason: MatchReason,
}

impl AnnotationMatch {
    pub fn new(annotation: Annotation, score: f32, match_reason: MatchReason) -> Self {
        Self {
            annotation,
            score: score.clamp(0.0, 1.0),
            match_reason,
        }
    }
}

/// Deterministic ordering for equal-scored matches:
/// score desc, then file_path asc, start_line asc, node_id asc.
pub fn sort_matches(matches: &mut [AnnotationMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.annotation.file_path.cmp(&b.annotation.file_path))
            .then_with(|| a.annotation.start_line.cmp(&b.annotation.start_line))
            .then_with(|| a.annotation.node_id.cmp(&b.annotation.node_id))
    });
}
