//! Integration tests for the annotation store: write a fixture database with
//! the ingest-side writer, reopen it read-only, and exercise every query-path
//! operation.

use astir_core::{
    Annotation, AnnotationFilter, AnnotationStore, NodeType, StoreWriter,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn annotation(
    id: &str,
    file: &str,
    ty: NodeType,
    line: u32,
    complexity: f64,
    updated_at: i64,
) -> Annotation {
    Annotation {
        node_id: id.to_string(),
        file_path: file.to_string(),
        node_type: ty,
        signature: format!("fn {id}(input: &str) -> String"),
        summary: format!("Handles {id}"),
        source_snippet: format!("fn {id}(input: &str) -> String {{ input.to_string() }}"),
        start_line: line,
        end_line: line + 5,
        parent_id: None,
        language: if file.ends_with(".rs") { "rust" } else { "typescript" }.to_string(),
        complexity_score: complexity,
        created_at: updated_at,
        updated_at,
    }
}

/// Build a store with a small mixed corpus and return the open read-only handle.
fn fixture_store(dir: &TempDir) -> AnnotationStore {
    let path = dir.path().join("annotations.db");
    let mut writer = StoreWriter::create(&path).unwrap();
    writer
        .insert_batch(&[
            annotation("parse_json", "src/utils/json.rs", NodeType::Function, 10, 4.0, 1_000),
            annotation("dump_json", "src/utils/json.rs", NodeType::Function, 40, 2.0, 2_000),
            annotation("walk_tree", "src/utils/walk.rs", NodeType::Function, 5, 6.5, 3_000),
            annotation("Server", "src/server.ts", NodeType::Class, 1, 9.0, 4_000),
            annotation("handle", "src/server.ts", NodeType::Method, 20, 3.0, 5_000),
        ])
        .unwrap();
    drop(writer);
    AnnotationStore::open(&path).unwrap()
}

#[test]
fn get_by_id_hits_and_misses() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let found = store.get_by_id("walk_tree").unwrap().unwrap();
    assert_eq!(found.file_path, "src/utils/walk.rs");
    assert_eq!(found.node_type, NodeType::Function);

    assert!(store.get_by_id("missing").unwrap().is_none());
}

#[test]
fn get_by_file_returns_source_order() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let rows = store.get_by_file("src/utils/json.rs").unwrap();
    let ids: Vec<&str> = rows.iter().map(|a| a.node_id.as_str()).collect();
    assert_eq!(ids, vec!["parse_json", "dump_json"]);
    assert!(rows[0].start_line < rows[1].start_line);
}

#[test]
fn query_with_file_prefix_pattern() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let filter = AnnotationFilter {
        file_globs: vec!["^src/utils/".to_string()],
        ..Default::default()
    };
    let rows = store.query(&filter).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|a| a.file_path.starts_with("src/utils/")));
}

#[test]
fn query_with_complexity_range() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let filter = AnnotationFilter {
        min_complexity: Some(3.0),
        max_complexity: Some(7.0),
        ..Default::default()
    };
    let rows = store.query(&filter).unwrap();
    let ids: Vec<&str> = rows.iter().map(|a| a.node_id.as_str()).collect();
    // handle (3.0), parse_json (4.0), walk_tree (6.5); Server (9.0) excluded.
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"parse_json"));
    assert!(ids.contains(&"walk_tree"));
    assert!(ids.contains(&"handle"));
}

#[test]
fn query_with_type_and_language() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let filter = AnnotationFilter {
        node_type: Some(NodeType::Class),
        languages: vec!["typescript".to_string()],
        ..Default::default()
    };
    let rows = store.query(&filter).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].node_id, "Server");
}

#[test]
fn empty_filter_returns_everything_in_stable_order() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let all = store.query(&AnnotationFilter::default()).unwrap();
    assert_eq!(all.len(), 5);
    // file_path asc, start_line asc
    let mut sorted = all.clone();
    sorted.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.start_line.cmp(&b.start_line))
    });
    assert_eq!(all, sorted);
}

#[test]
fn recent_changes_scans_monotonically() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let rows = store.recent_changes(2_500).unwrap();
    let ids: Vec<&str> = rows.iter().map(|a| a.node_id.as_str()).collect();
    assert_eq!(ids, vec!["walk_tree", "Server", "handle"]);
    assert!(rows.windows(2).all(|w| w[0].updated_at <= w[1].updated_at));
}

#[test]
fn statistics_aggregate_the_corpus() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let stats = store.statistics().unwrap();
    assert_eq!(stats.nodes, 5);
    assert_eq!(stats.files, 3);
    assert_eq!(stats.last_updated, Some(5_000));
    assert!((stats.avg_complexity - 4.9).abs() < 1e-9);
    assert_eq!(stats.node_type_histogram.get("function"), Some(&3));
    assert_eq!(stats.node_type_histogram.get("class"), Some(&1));
    assert_eq!(stats.node_type_histogram.get("method"), Some(&1));
}

#[test]
fn distinct_files_sorted() {
    let dir = TempDir::new().unwrap();
    let store = fixture_store(&dir);

    let files = store.distinct_files().unwrap();
    assert_eq!(
        files,
        vec!["src/server.ts", "src/utils/json.rs", "src/utils/walk.rs"]
    );
}

#[test]
fn open_missing_store_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.db");
    assert!(AnnotationStore::open(&missing).is_err());
}
