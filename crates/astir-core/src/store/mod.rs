//! Read-only annotation store backed by a single-file SQLite database.
//!
//! The ingest pipeline writes `annotations.db`; the query engine opens it with
//! `SQLITE_OPEN_READ_ONLY` and never mutates it. Hot reload replaces the whole
//! [`AnnotationStore`] handle rather than touching a live one, so a handle is
//! immutable for its lifetime and safe to share behind an `Arc`.

pub mod filter;
pub mod schema;
pub mod writer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::model::{Annotation, NodeType};

pub use filter::{AnnotationFilter, PathPattern};

/// Aggregate statistics over the store contents.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoreStatistics {
    /// Number of distinct files with at least one annotation.
    pub files: u64,
    /// Total annotation count.
    pub nodes: u64,
    /// Mean complexity_score over all annotations (0.0 when empty).
    pub avg_complexity: f64,
    /// Annotation count per node_type string.
    pub node_type_histogram: HashMap<String, u64>,
    /// Largest updated_at in the store, microseconds since epoch.
    pub last_updated: Option<i64>,
}

/// Read-only handle to the annotation database.
///
/// SQLite connections are not `Sync`, so the connection sits behind a
/// `parking_lot::Mutex`; every operation holds the lock only for the duration
/// of one prepared query. Callers on the async side go through
/// `spawn_blocking`.
pub struct AnnotationStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl AnnotationStore {
    /// Open an existing store read-only.
    ///
    /// Fails if the file is missing or the schema version does not match;
    /// both are fatal to the caller (the engine cannot serve without a store).
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };

        if let Some(version) = store.get_metadata("schema_version")? {
            if version != schema::STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: schema::STORE_SCHEMA_VERSION.to_string(),
                    found: version,
                });
            }
        }

        debug!(path = %path.display(), "Opened annotation store read-only");
        Ok(store)
    }

    /// Configure connection for read-heavy access
    fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
        // Increase cache size (negative value = KB)
        conn.pragma_update(None, "cache_size", -64000)?;
        // Temp store in memory for better performance
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        // Enable memory-mapped I/O for reads
        conn.pragma_update(None, "mmap_size", 268435456)?;
        Ok(())
    }

    /// Path this store was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a metadata value
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    /// Look up a single annotation by its node id.
    pub fn get_by_id(&self, node_id: &str) -> Result<Option<Annotation>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM annotations WHERE node_id = ?1",
            schema::ANNOTATION_COLUMNS
        );
        let result = conn
            .query_row(&sql, [node_id], map_annotation_row)
            .optional()?;
        Ok(result)
    }

    /// All annotations in one file, in source order (start_line ascending).
    pub fn get_by_file(&self, file_path: &str) -> Result<Vec<Annotation>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM annotations WHERE file_path = ?1 ORDER BY start_line ASC, node_id ASC",
            schema::ANNOTATION_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([file_path], map_annotation_row)?;
        Ok(collect_skipping_bad_rows(rows))
    }

    /// Annotations matching a composable filter.
    ///
    /// Scalar predicates (type, language, complexity) run in SQL against their
    /// indexes; file patterns are narrowed to an indexed prefix range where one
    /// can be extracted, then matched exactly in Rust.
    pub fn query(&self, filter: &AnnotationFilter) -> Result<Vec<Annotation>> {
        let patterns = filter.compile_patterns()?;

        let mut sql = format!(
            "SELECT {} FROM annotations WHERE 1=1",
            schema::ANNOTATION_COLUMNS
        );
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ty) = filter.node_type {
            params_vec.push(Box::new(ty.as_str().to_string()));
            sql.push_str(&format!(" AND node_type = ?{}", params_vec.len()));
        }
        if let Some(min) = filter.min_complexity {
            params_vec.push(Box::new(min));
            sql.push_str(&format!(" AND complexity_score >= ?{}", params_vec.len()));
        }
        if let Some(max) = filter.max_complexity {
            params_vec.push(Box::new(max));
            sql.push_str(&format!(" AND complexity_score <= ?{}", params_vec.len()));
        }
        // A single pattern with a literal prefix becomes an indexed range scan.
        if patterns.len() == 1 {
            if let Some(prefix) = patterns[0].literal_prefix() {
                let upper = prefix_upper_bound(&prefix);
                params_vec.push(Box::new(prefix));
                sql.push_str(&format!(" AND file_path >= ?{}", params_vec.len()));
                params_vec.push(Box::new(upper));
                sql.push_str(&format!(" AND file_path < ?{}", params_vec.len()));
            }
        }
        sql.push_str(" ORDER BY file_path ASC, start_line ASC, node_id ASC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), map_annotation_row)?;

        let mut out = Vec::new();
        for row in rows {
            match row {
                Ok(annotation) => {
                    if patterns.is_empty()
                        || patterns.iter().any(|p| p.is_match(&annotation.file_path))
                    {
                        if !filter.languages.is_empty()
                            && !filter
                                .languages
                                .iter()
                                .any(|l| l.eq_ignore_ascii_case(&annotation.language))
                        {
                            continue;
                        }
                        out.push(annotation);
                    }
                }
                Err(e) => warn!("Skipping undecodable annotation row: {e}"),
            }
        }
        Ok(out)
    }

    /// Annotations updated strictly after `since_us`, oldest first.
    pub fn recent_changes(&self, since_us: i64) -> Result<Vec<Annotation>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM annotations WHERE updated_at > ?1 ORDER BY updated_at ASC, node_id ASC",
            schema::ANNOTATION_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([since_us], map_annotation_row)?;
        Ok(collect_skipping_bad_rows(rows))
    }

    /// Total annotation count.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Aggregate statistics, computed with indexed queries.
    pub fn statistics(&self) -> Result<StoreStatistics> {
        let conn = self.conn.lock();

        let (nodes, avg_complexity, last_updated): (i64, Option<f64>, Option<i64>) = conn
            .query_row(
                "SELECT COUNT(*), AVG(complexity_score), MAX(updated_at) FROM annotations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let files: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT file_path) FROM annotations",
            [],
            |row| row.get(0),
        )?;

        let mut histogram = HashMap::new();
        let mut stmt =
            conn.prepare("SELECT node_type, COUNT(*) FROM annotations GROUP BY node_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (ty, count) = row?;
            histogram.insert(ty, count as u64);
        }

        Ok(StoreStatistics {
            files: files as u64,
            nodes: nodes as u64,
            avg_complexity: avg_complexity.unwrap_or(0.0),
            node_type_histogram: histogram,
            last_updated,
        })
    }

    /// Distinct file paths, sorted. Backs the MCP resource tree.
    pub fn distinct_files(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT file_path FROM annotations ORDER BY file_path ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

/// Smallest string strictly greater than every string with this prefix.
fn prefix_upper_bound(prefix: &str) -> String {
    let mut upper = prefix.to_string();
    // Paths are forward-slash ASCII-ish; bumping the last byte is enough for
    // a range scan upper bound. Fall back to a sentinel on overflow.
    match upper.pop() {
        Some(c) if (c as u32) < 0x10FFFF => {
            if let Some(next) = char::from_u32(c as u32 + 1) {
                upper.push(next);
                return upper;
            }
            upper.push(c);
        }
        Some(c) => upper.push(c),
        None => {}
    }
    upper.push('\u{10FFFF}');
    upper
}

/// Map a result row to an [`Annotation`] using [`schema::ANNOTATION_COLUMNS`] order.
fn map_annotation_row(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        node_id: row.get(0)?,
        file_path: row.get(1)?,
        start_line: row.get::<_, i64>(2)? as u32,
        end_line: row.get::<_, i64>(3)? as u32,
        node_type: NodeType::parse(&row.get::<_, String>(4)?),
        signature: row.get(5)?,
        summary: row.get(6)?,
        source_snippet: row.get(7)?,
        parent_id: row.get(8)?,
        language: row.get(9)?,
        complexity_score: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Row-decode failure for a single annotation is non-fatal: skip and log.
fn collect_skipping_bad_rows(
    rows: impl Iterator<Item = rusqlite::Result<Annotation>>,
) -> Vec<Annotation> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(annotation) => out.push(annotation),
            Err(e) => warn!("Skipping undecodable annotation row: {e}"),
        }
    }
    out
}
