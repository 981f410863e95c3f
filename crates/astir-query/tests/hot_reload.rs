//! Hot-reload integration: touch the corpus on disk, wait out the debounce,
//! and observe the epoch bump, cache invalidation and snapshot isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{annotation, unit, write_corpus, StubGenerator, DIM};
use tempfile::TempDir;

use astir_core::NodeType;
use astir_index::{IndexBuilder, IndexConfig};
use astir_query::{
    load_snapshot, CacheConfig, HotReloadCoordinator, ProcessorConfig, QueryCaches, QueryDeadline,
    QueryKind, QueryProcessor, QueryRequest, ReloadConfig, SnapshotCell,
};

/// Wait for the cell to reach at least `epoch`, with a generous ceiling so
/// slow CI filesystems do not flake the test.
async fn wait_for_epoch(cell: &SnapshotCell, epoch: u64) -> bool {
    for _ in 0..100 {
        if cell.epoch().map(|e| e >= epoch).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn index_rewrite_swaps_snapshot_and_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    let annotations = vec![
        annotation("parse_json", "src/utils/json.rs", NodeType::Function, 10),
        annotation("render", "src/render.rs", NodeType::Function, 1),
    ];
    let vectors = vec![
        ("parse_json", vec![1.0, 0.1, 0.0, 0.0]),
        ("render", vec![0.4, 0.0, 0.9, 0.0]),
    ];
    let (store_path, index_path) = write_corpus(dir.path(), &annotations, &vectors);

    let snapshot =
        load_snapshot(&store_path, &index_path, IndexConfig::default(), DIM, 1).unwrap();
    let cell = Arc::new(SnapshotCell::with_snapshot(snapshot));
    let caches = Arc::new(QueryCaches::new(CacheConfig::default()));

    let generator = Arc::new(
        StubGenerator::new(DIM).with_vector("parse json", vec![1.0, 0.0, 0.0, 0.0]),
    );
    let processor = QueryProcessor::new(
        Arc::clone(&cell),
        Some(generator),
        Arc::clone(&caches),
        ProcessorConfig::default(),
    );

    let coordinator = HotReloadCoordinator::spawn(
        Arc::clone(&cell),
        Arc::clone(&caches),
        ReloadConfig {
            store_path: store_path.clone(),
            index_path: index_path.clone(),
            config_path: None,
            index_config: IndexConfig::default(),
            dimension: DIM,
            debounce: Duration::from_millis(200),
        },
    )
    .unwrap();

    // Prime the cache at epoch 1.
    let request = QueryRequest::new(QueryKind::Semantic, "parse json");
    let first = processor
        .process(request.clone(), QueryDeadline::default())
        .await
        .unwrap();
    assert_eq!(first.metadata.corpus_epoch, 1);
    let in_flight = cell.current().unwrap();

    // Rewrite the index file (atomic replace, as ingest does).
    let mut builder = IndexBuilder::new(DIM);
    builder
        .insert("parse_json", unit(vec![1.0, 0.1, 0.0, 0.0]), "hash-1")
        .unwrap();
    builder
        .insert("render", unit(vec![0.4, 0.0, 0.9, 0.0]), "hash-2")
        .unwrap();
    builder.save(&index_path).unwrap();

    assert!(
        wait_for_epoch(&cell, 2).await,
        "reload did not fire within the wait ceiling"
    );

    // Snapshot isolation: the handle grabbed before the swap still sees
    // epoch 1 while new queries see epoch 2.
    assert_eq!(in_flight.epoch, 1);

    // Same fingerprint, new epoch: the cache must miss.
    let second = processor
        .process(request, QueryDeadline::default())
        .await
        .unwrap();
    assert_eq!(second.metadata.corpus_epoch, 2);
    assert!(!second.metadata.cache_hit);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn reload_failure_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let annotations = vec![annotation("parse_json", "src/a.rs", NodeType::Function, 1)];
    let vectors = vec![("parse_json", vec![1.0, 0.0, 0.0, 0.0])];
    let (store_path, index_path) = write_corpus(dir.path(), &annotations, &vectors);

    let snapshot =
        load_snapshot(&store_path, &index_path, IndexConfig::default(), DIM, 1).unwrap();
    let cell = Arc::new(SnapshotCell::with_snapshot(snapshot));
    let caches = Arc::new(QueryCaches::new(CacheConfig::default()));

    let coordinator = HotReloadCoordinator::spawn(
        Arc::clone(&cell),
        Arc::clone(&caches),
        ReloadConfig {
            store_path: store_path.clone(),
            index_path: index_path.clone(),
            config_path: None,
            index_config: IndexConfig::default(),
            dimension: DIM,
            debounce: Duration::from_millis(200),
        },
    )
    .unwrap();

    // Corrupt the index file in place.
    std::fs::write(&index_path, b"garbage").unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    // The engine still serves the epoch-1 snapshot.
    assert_eq!(cell.epoch(), Some(1));
    assert!(cell.ready());

    coordinator.shutdown().await;
}
