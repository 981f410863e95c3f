//! Write-side companion to the annotation store.
//!
//! Used by the ingest pipeline and by tests to build fixture databases. The
//! query engine itself never links the writer into its read path: stores are
//! opened read-only there, and mutation happens only by replacing the file on
//! disk and letting hot reload swap handles.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::model::Annotation;

use super::schema::{
    SCHEMA_CREATE_ANNOTATIONS, SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_METADATA,
    STORE_SCHEMA_VERSION,
};

/// Writable connection used at ingest time.
pub struct StoreWriter {
    conn: Connection,
}

impl StoreWriter {
    /// Create (or open) a store file and ensure the schema exists.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL keeps concurrent read-only openers unblocked during ingest.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(SCHEMA_CREATE_ANNOTATIONS, [])?;
        conn.execute(SCHEMA_CREATE_METADATA, [])?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;

        let writer = Self { conn };
        writer.set_metadata("schema_version", STORE_SCHEMA_VERSION)?;
        Ok(writer)
    }

    /// Set a metadata value
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Insert or replace one annotation.
    pub fn insert(&self, annotation: &Annotation) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO annotations
                (node_id, file_path, start_line, end_line, node_type,
                 signature, summary, source_snippet, parent_id, language,
                 complexity_score, created_at, updated_at, metadata_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL)
            "#,
            params![
                annotation.node_id,
                annotation.file_path,
                annotation.start_line as i64,
                annotation.end_line as i64,
                annotation.node_type.as_str(),
                annotation.signature,
                annotation.summary,
                annotation.source_snippet,
                annotation.parent_id,
                annotation.language,
                annotation.complexity_score,
                annotation.created_at,
                annotation.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Insert a batch inside one transaction.
    pub fn insert_batch(&mut self, annotations: &[Annotation]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO annotations
                    (node_id, file_path, start_line, end_line, node_type,
                     signature, summary, source_snippet, parent_id, language,
                     complexity_score, created_at, updated_at, metadata_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL)
                "#,
            )?;
            for annotation in annotations {
                stmt.execute(params![
                    annotation.node_id,
                    annotation.file_path,
                    annotation.start_line as i64,
                    annotation.end_line as i64,
                    annotation.node_type.as_str(),
                    annotation.signature,
                    annotation.summary,
                    annotation.source_snippet,
                    annotation.parent_id,
                    annotation.language,
                    annotation.complexity_score,
                    annotation.created_at,
                    annotation.updated_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete an annotation by node id. Paired with the matching vector delete
    /// at ingest so the store and index never drift apart.
    pub fn delete(&self, node_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM annotations WHERE node_id = ?1", [node_id])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use crate::store::AnnotationStore;

    fn sample(id: &str, file: &str) -> Annotation {
        Annotation {
            node_id: id.to_string(),
            file_path: file.to_string(),
            node_type: NodeType::Function,
            signature: format!("fn {id}()"),
            summary: format!("does {id}"),
            source_snippet: format!("fn {id}() {{}}"),
            start_line: 1,
            end_line: 2,
            parent_id: None,
            language: "rust".to_string(),
            complexity_score: 1.5,
            created_at: 100,
            updated_at: 100,
        }
    }

    #[test]
    fn written_store_opens_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.db");

        let mut writer = StoreWriter::create(&path).unwrap();
        writer.insert_batch(&[sample("a", "src/a.rs"), sample("b", "src/b.rs")]).unwrap();
        drop(writer);

        let store = AnnotationStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        let a = store.get_by_id("a").unwrap().unwrap();
        assert_eq!(a.signature, "fn a()");
    }

    #[test]
    fn delete_removes_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.db");

        let writer = StoreWriter::create(&path).unwrap();
        writer.insert(&sample("a", "src/a.rs")).unwrap();
        assert!(writer.delete("a").unwrap());
        assert!(!writer.delete("a").unwrap());
    }
}
