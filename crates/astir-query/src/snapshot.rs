//! Corpus snapshots and the swap cell.
//!
//! A [`CorpusSnapshot`] bundles one epoch's store and index handles. Queries
//! grab the current `Arc` once at entry and use only that snapshot, so a query
//! never observes mixed old/new handles; hot reload installs a replacement and
//! the old handles close when their last in-flight reader drops them.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use astir_core::AnnotationStore;
use astir_index::{storage, IndexConfig, VectorIndex};

use crate::error::{QueryError, Result};

/// One consistent view of the corpus.
pub struct CorpusSnapshot {
    /// Monotonically increasing; bumped on every handle swap.
    pub epoch: u64,
    pub store: Arc<AnnotationStore>,
    pub index: Arc<VectorIndex>,
}

impl CorpusSnapshot {
    /// Ready means the store is open (it is, by construction) and the index
    /// has at least one vector.
    pub fn ready(&self) -> bool {
        !self.index.is_empty()
    }
}

/// Open both handles and assemble a snapshot at the given epoch.
///
/// Store-open failures are fatal; a missing or corrupt index degrades to an
/// empty one so the engine can still serve lexical queries.
pub fn load_snapshot(
    store_path: &Path,
    index_path: &Path,
    index_config: IndexConfig,
    dimension: usize,
    epoch: u64,
) -> Result<CorpusSnapshot> {
    let store = AnnotationStore::open(store_path)?;

    let index = if index_path.exists() {
        storage::open(index_path, index_config)?
    } else {
        VectorIndex::empty(dimension, index_config)
    };

    info!(
        epoch,
        annotations = store.count().unwrap_or(0),
        vectors = index.len(),
        "Loaded corpus snapshot"
    );

    Ok(CorpusSnapshot {
        epoch,
        store: Arc::new(store),
        index: Arc::new(index),
    })
}

/// Holder for the current snapshot; replacement is the only mutation.
pub struct SnapshotCell {
    current: RwLock<Option<Arc<CorpusSnapshot>>>,
}

impl SnapshotCell {
    /// An empty cell: not ready until the first install.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Cell pre-seeded with an initial snapshot.
    pub fn with_snapshot(snapshot: CorpusSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// The current snapshot, or NotReady if none was ever installed.
    pub fn current(&self) -> Result<Arc<CorpusSnapshot>> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| QueryError::NotReady("no corpus snapshot loaded".to_string()))
    }

    /// Atomically swap in a new snapshot.
    pub fn install(&self, snapshot: CorpusSnapshot) {
        *self.current.write() = Some(Arc::new(snapshot));
    }

    /// Epoch of the current snapshot, if any.
    pub fn epoch(&self) -> Option<u64> {
        self.current.read().as_ref().map(|s| s.epoch)
    }

    /// Store open, index non-empty, epoch set at least once.
    pub fn ready(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .map(|s| s.ready())
            .unwrap_or(false)
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astir_index::IndexConfig;

    fn snapshot(epoch: u64, vectors: usize) -> CorpusSnapshot {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("annotations.db");
        astir_core::StoreWriter::create(&store_path).unwrap();
        let store = AnnotationStore::open(&store_path).unwrap();

        let index = if vectors > 0 {
            let ids = (0..vectors).map(|i| format!("n{i}")).collect();
            let vecs = (0..vectors).map(|_| vec![1.0, 0.0]).collect();
            VectorIndex::build(2, IndexConfig::default(), ids, vecs).unwrap()
        } else {
            VectorIndex::empty(2, IndexConfig::default())
        };

        CorpusSnapshot {
            epoch,
            store: Arc::new(store),
            index: Arc::new(index),
        }
    }

    #[test]
    fn empty_cell_is_not_ready() {
        let cell = SnapshotCell::new();
        assert!(!cell.ready());
        assert!(cell.epoch().is_none());
        assert!(matches!(cell.current(), Err(QueryError::NotReady(_))));
    }

    #[test]
    fn install_bumps_epoch_view() {
        let cell = SnapshotCell::new();
        cell.install(snapshot(1, 3));
        assert_eq!(cell.epoch(), Some(1));
        assert!(cell.ready());

        cell.install(snapshot(2, 3));
        assert_eq!(cell.epoch(), Some(2));
    }

    #[test]
    fn empty_index_means_not_ready() {
        let cell = SnapshotCell::new();
        cell.install(snapshot(1, 0));
        assert!(!cell.ready());
        // But a snapshot is available for lexical serving.
        assert!(cell.current().is_ok());
    }

    #[test]
    fn in_flight_reader_keeps_old_snapshot_alive() {
        let cell = SnapshotCell::new();
        cell.install(snapshot(1, 1));
        let held = cell.current().unwrap();
        cell.install(snapshot(2, 1));
        // The held Arc still sees epoch 1; new readers see epoch 2.
        assert_eq!(held.epoch, 1);
        assert_eq!(cell.current().unwrap().epoch, 2);
    }
}
