//! Single-file persistence for the vector index.
//!
//! Layout: an 8-byte magic, a little-endian u32 header length, a JSON header,
//! then the vector rows as raw little-endian `f32` (`count * dimension`
//! values, row-major, in header entry order). The header carries exactly one
//! entry per row: `(node_id, content_hash)` — anything else fails validation
//! at load rather than being accommodated at query time.
//!
//! Writes go through a temp file and an atomic rename so a watcher never
//! observes a half-written index.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ann::{IndexConfig, VectorIndex};
use crate::error::{IndexError, Result};

/// File magic, first 8 bytes.
pub const INDEX_MAGIC: &[u8; 8] = b"ASTRVIDX";

/// Bumped on any incompatible layout change.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Per-row metadata. `content_hash` is the hash of the text the vector was
/// produced from; ingest uses it to detect stale embeddings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub node_id: String,
    pub content_hash: String,
}

/// JSON header preceding the vector rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub format_version: u32,
    pub dimension: usize,
    pub count: usize,
    pub entries: Vec<IndexEntry>,
}

impl IndexHeader {
    fn validate(&self, path: &Path) -> Result<()> {
        if self.format_version != INDEX_FORMAT_VERSION {
            return Err(corrupt(
                path,
                format!(
                    "unsupported format version {} (expected {})",
                    self.format_version, INDEX_FORMAT_VERSION
                ),
            ));
        }
        if self.entries.len() != self.count {
            return Err(corrupt(
                path,
                format!(
                    "header count {} does not match {} entries",
                    self.count,
                    self.entries.len()
                ),
            ));
        }
        if self.dimension == 0 && self.count > 0 {
            return Err(corrupt(path, "zero dimension with non-zero count".to_string()));
        }
        Ok(())
    }
}

fn corrupt(path: &Path, reason: String) -> IndexError {
    IndexError::Corrupt {
        path: path.display().to_string(),
        reason,
    }
}

/// Open a persisted index and rebuild the in-memory HNSW graph.
///
/// Any structural problem (bad magic, short read, count/entry mismatch) is
/// [`IndexError::Corrupt`]; the hot-reload coordinator treats that as a
/// re-open trigger rather than serving a broken snapshot.
pub fn open(path: &Path, config: IndexConfig) -> Result<VectorIndex> {
    let file = File::open(path).map_err(|e| corrupt(path, format!("cannot open: {e}")))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| corrupt(path, format!("short read on magic: {e}")))?;
    if &magic != INDEX_MAGIC {
        return Err(corrupt(path, "bad magic".to_string()));
    }

    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| corrupt(path, format!("short read on header length: {e}")))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    let mut header_bytes = vec![0u8; header_len];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|e| corrupt(path, format!("short read on header: {e}")))?;
    let header: IndexHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| corrupt(path, format!("header parse failure: {e}")))?;
    header.validate(path)?;

    let row_bytes = header.dimension * std::mem::size_of::<f32>();
    let mut ids = Vec::with_capacity(header.count);
    let mut vectors = Vec::with_capacity(header.count);
    let mut buf = vec![0u8; row_bytes];
    for entry in &header.entries {
        reader
            .read_exact(&mut buf)
            .map_err(|e| corrupt(path, format!("short read on vector rows: {e}")))?;
        let row: &[f32] = bytemuck::cast_slice(&buf);
        ids.push(entry.node_id.clone());
        vectors.push(row.to_vec());
    }
    // Trailing garbage means the writer and header disagree.
    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? != 0 {
        return Err(corrupt(path, "trailing bytes after vector rows".to_string()));
    }

    info!(
        path = %path.display(),
        count = header.count,
        dimension = header.dimension,
        "Opened vector index"
    );
    VectorIndex::build(header.dimension, config, ids, vectors)
}

/// Read only the header (ingest-side staleness checks).
pub fn read_header(path: &Path) -> Result<IndexHeader> {
    let file = File::open(path).map_err(|e| corrupt(path, format!("cannot open: {e}")))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| corrupt(path, format!("short read on magic: {e}")))?;
    if &magic != INDEX_MAGIC {
        return Err(corrupt(path, "bad magic".to_string()));
    }
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| corrupt(path, format!("short read on header length: {e}")))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let mut header_bytes = vec![0u8; header_len];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|e| corrupt(path, format!("short read on header: {e}")))?;
    let header: IndexHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| corrupt(path, format!("header parse failure: {e}")))?;
    header.validate(path)?;
    Ok(header)
}

/// Accumulates `(node_id, vector, content_hash)` rows and writes the index
/// file. Used by the ingest pipeline and by tests; the query engine only
/// reads.
pub struct IndexBuilder {
    dimension: usize,
    entries: Vec<IndexEntry>,
    vectors: Vec<Vec<f32>>,
}

impl IndexBuilder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Add a row. The vector must already be L2-normalised.
    pub fn insert(
        &mut self,
        node_id: impl Into<String>,
        vector: Vec<f32>,
        content_hash: impl Into<String>,
    ) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let node_id = node_id.into();
        if self.entries.iter().any(|e| e.node_id == node_id) {
            return Err(IndexError::DuplicateId(node_id));
        }
        self.entries.push(IndexEntry {
            node_id,
            content_hash: content_hash.into(),
        });
        self.vectors.push(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Write the file atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("idx.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            let header = IndexHeader {
                format_version: INDEX_FORMAT_VERSION,
                dimension: self.dimension,
                count: self.entries.len(),
                entries: self.entries.clone(),
            };
            let header_bytes = serde_json::to_vec(&header)?;

            writer.write_all(INDEX_MAGIC)?;
            writer.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
            writer.write_all(&header_bytes)?;
            for vector in &self.vectors {
                writer.write_all(bytemuck::cast_slice(vector))?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), count = self.entries.len(), "Saved vector index");
        Ok(())
    }

    /// Build the in-memory index directly, without touching disk.
    pub fn into_index(self, config: IndexConfig) -> Result<VectorIndex> {
        let ids = self.entries.into_iter().map(|e| e.node_id).collect();
        VectorIndex::build(self.dimension, config, ids, self.vectors)
    }
}

/// Persist an existing in-memory index (entries get empty content hashes when
/// the caller no longer has the source text, e.g. in tests).
pub fn save_index(index: &VectorIndex, hashes: &[String], path: &Path) -> Result<()> {
    let mut builder = IndexBuilder::new(index.dimension());
    for (i, id) in index.ids().iter().enumerate() {
        let hash = hashes.get(i).cloned().unwrap_or_default();
        builder.insert(id.clone(), index.raw_vectors()[i].clone(), hash)?;
    }
    builder.save(path)
}
