//! Hot-reload coordination.
//!
//! Watches the annotation store, the vector index and the workspace config on
//! disk. Raw filesystem events feed a cooperative debounce task (a rescheduled
//! timer owned by the scheduler, not the caller); when the timer fires the
//! coordinator opens fresh read handles, installs them as a new snapshot with
//! a bumped epoch, and clears the query-response cache. The embedding cache is
//! keyed by text alone and survives reloads.
//!
//! Re-open failure keeps the previous snapshot serving and retries on the
//! next event burst.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use astir_index::IndexConfig;

use crate::cache::QueryCaches;
use crate::error::{QueryError, Result};
use crate::snapshot::{load_snapshot, SnapshotCell};

/// Default debounce window between the last change event and the reload.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// What to watch and how to reopen.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    pub store_path: PathBuf,
    pub index_path: PathBuf,
    /// Workspace config file; changes trigger a reload like data changes.
    pub config_path: Option<PathBuf>,
    pub index_config: IndexConfig,
    /// Embedding dimension, used when the index file is absent.
    pub dimension: usize,
    pub debounce: Duration,
}

/// Running coordinator. Dropping it stops watching; `shutdown` stops cleanly.
pub struct HotReloadCoordinator {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    // Keeps the OS watcher registered for the coordinator's lifetime.
    _watcher: RecommendedWatcher,
}

impl HotReloadCoordinator {
    /// Start watching. The snapshot cell should already hold the initial
    /// snapshot (epoch 1); the coordinator only handles subsequent swaps.
    pub fn spawn(
        cell: Arc<SnapshotCell>,
        caches: Arc<QueryCaches>,
        config: ReloadConfig,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<()>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Watched files are replaced by rename, so watch their parent
        // directories and filter events down to the names we care about.
        let mut targets: Vec<PathBuf> = vec![config.store_path.clone(), config.index_path.clone()];
        if let Some(ref p) = config.config_path {
            targets.push(p.clone());
        }
        let names: BTreeSet<std::ffi::OsString> = targets
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect();
        let dirs: BTreeSet<PathBuf> = targets
            .iter()
            .filter_map(|p| p.parent().map(|d| d.to_path_buf()))
            .collect();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| names.contains(n)).unwrap_or(false));
                    if relevant {
                        // Receiver gone means we are shutting down.
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => warn!("File watcher error: {e}"),
            }
        })
        .map_err(|e| QueryError::Internal(format!("failed to create watcher: {e}")))?;

        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    QueryError::Internal(format!("failed to watch {}: {e}", dir.display()))
                })?;
        }

        let task = tokio::spawn(debounce_task(cell, caches, config, event_rx, shutdown_rx));

        Ok(Self {
            shutdown_tx,
            task,
            _watcher: watcher,
        })
    }

    /// Stop watching and wait for the debounce task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        info!("Hot-reload coordinator stopped");
    }
}

/// The debounce loop: every event resets the timer; the reload runs once the
/// corpus has been quiet for the whole window.
async fn debounce_task(
    cell: Arc<SnapshotCell>,
    caches: Arc<QueryCaches>,
    config: ReloadConfig,
    mut events: mpsc::UnboundedReceiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut dirty = false;
    let mut fire_at = tokio::time::Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(()) => {
                        dirty = true;
                        fire_at = tokio::time::Instant::now() + config.debounce;
                        debug!("Corpus change detected, debouncing");
                    }
                    None => break, // watcher dropped
                }
            }
            _ = tokio::time::sleep_until(fire_at), if dirty => {
                dirty = false;
                reload_once(&cell, &caches, &config).await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// One reload attempt: open new handles, swap, clear the response cache.
async fn reload_once(cell: &Arc<SnapshotCell>, caches: &Arc<QueryCaches>, config: &ReloadConfig) {
    let next_epoch = cell.epoch().map(|e| e + 1).unwrap_or(1);

    let store_path = config.store_path.clone();
    let index_path = config.index_path.clone();
    let index_config = config.index_config;
    let dimension = config.dimension;

    let loaded = tokio::task::spawn_blocking(move || {
        load_snapshot(&store_path, &index_path, index_config, dimension, next_epoch)
    })
    .await;

    match loaded {
        Ok(Ok(snapshot)) => {
            cell.install(snapshot);
            // Old-epoch responses must never be served again; the embedding
            // cache stays, its keys do not depend on the corpus.
            caches.query.clear();
            info!(epoch = next_epoch, "Hot reload complete");
        }
        Ok(Err(e)) => {
            warn!("Hot reload failed, keeping previous snapshot: {e}");
        }
        Err(e) => {
            warn!("Hot reload task panicked: {e}");
        }
    }
}
