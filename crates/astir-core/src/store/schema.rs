//! SQLite Schema Definitions for the Annotation Store
//!
//! The annotation store is a single-file SQLite database written by the ingest
//! pipeline and opened read-only by the query engine. Secondary indexes back
//! the file, complexity and recency lookups the query processor depends on.

/// Schema version for the annotation database
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the annotations table
///
/// One row per summarised AST node. `node_id` is the opaque stable identifier
/// produced at ingest; `parent_id` references another row in the same file.
/// Timestamps are microseconds since the Unix epoch.
pub const SCHEMA_CREATE_ANNOTATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS annotations (
    -- Primary identification
    node_id TEXT PRIMARY KEY NOT NULL,

    -- Source location (file_path is repo-relative, forward-slash normalised)
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,

    -- Classification (function, method, class, interface, variable, other)
    node_type TEXT NOT NULL,

    -- Textual metadata
    signature TEXT NOT NULL,
    summary TEXT NOT NULL,
    source_snippet TEXT NOT NULL,

    -- Hierarchy
    parent_id TEXT,

    -- Derived from file extension
    language TEXT NOT NULL,

    -- Non-negative complexity estimate
    complexity_score REAL NOT NULL,

    -- Lifecycle timestamps (microseconds since epoch)
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,

    -- Ingest-defined extras the query engine does not interpret
    metadata_json TEXT
)
"#;

/// SQL to create indexes for the query paths in §operations
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- File lookups return annotations in source order
CREATE INDEX IF NOT EXISTS idx_annotations_file ON annotations(file_path, start_line);

-- recent_changes scans updated_at monotonically
CREATE INDEX IF NOT EXISTS idx_annotations_updated ON annotations(updated_at);

-- Complexity range filters
CREATE INDEX IF NOT EXISTS idx_annotations_complexity ON annotations(complexity_score);

-- Language and type filters
CREATE INDEX IF NOT EXISTS idx_annotations_language ON annotations(language);
CREATE INDEX IF NOT EXISTS idx_annotations_type ON annotations(node_type);
"#;

/// SQL to create the metadata table
///
/// Stores store-level metadata like schema version and ingest stats.
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// Column names for annotation queries (in order for row mapping)
pub const ANNOTATION_COLUMNS: &str = "node_id, file_path, start_line, end_line, node_type, \
     signature, summary, source_snippet, parent_id, language, \
     complexity_score, created_at, updated_at";
