//! Shared fixtures: a small corpus on disk plus a deterministic stub
//! embedding generator with hand-placed vectors.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use astir_core::{Annotation, NodeType, StoreWriter};
use astir_embed::{normalize_text, EmbedError, EmbeddingGenerator, GeneratorStatus};
use astir_index::{IndexBuilder, IndexConfig};
use astir_query::{
    load_snapshot, CacheConfig, ProcessorConfig, QueryCaches, QueryProcessor, SnapshotCell,
};

pub const DIM: usize = 4;

/// Deterministic generator: returns vectors from a fixed table, or a default
/// off-axis vector for unknown text. Never touches the network.
pub struct StubGenerator {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl StubGenerator {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(normalize_text(text), unit(vector));
        self
    }
}

#[async_trait]
impl EmbeddingGenerator for StubGenerator {
    async fn embed_batch(&self, texts: Vec<String>) -> astir_embed::Result<Vec<Vec<f32>>> {
        Ok(texts
            .into_iter()
            .map(|t| {
                self.vectors
                    .get(&normalize_text(&t))
                    .cloned()
                    .unwrap_or_else(|| {
                        let mut v = vec![0.0; self.dimension];
                        v[self.dimension - 1] = 1.0;
                        v
                    })
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_ref(&self) -> &str {
        "stub/deterministic"
    }

    async fn check_status(&self) -> astir_embed::Result<GeneratorStatus> {
        Ok(GeneratorStatus {
            available: true,
            model_ref: "stub/deterministic".to_string(),
            device: "CPU".to_string(),
            loaded: true,
            error: None,
        })
    }

    async fn warmup(&self) -> astir_embed::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) {}
}

/// Generator that always fails, for degradation tests.
pub struct FailingGenerator;

#[async_trait]
impl EmbeddingGenerator for FailingGenerator {
    async fn embed_batch(&self, _texts: Vec<String>) -> astir_embed::Result<Vec<Vec<f32>>> {
        Err(EmbedError::Inference("stub failure".to_string()))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_ref(&self) -> &str {
        "stub/failing"
    }

    async fn check_status(&self) -> astir_embed::Result<GeneratorStatus> {
        Ok(GeneratorStatus {
            available: false,
            model_ref: "stub/failing".to_string(),
            device: "CPU".to_string(),
            loaded: false,
            error: Some("stub failure".to_string()),
        })
    }

    async fn warmup(&self) -> astir_embed::Result<()> {
        Err(EmbedError::Inference("stub failure".to_string()))
    }

    async fn shutdown(&self) {}
}

pub fn unit(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

pub fn annotation(id: &str, file: &str, ty: NodeType, line: u32) -> Annotation {
    Annotation {
        node_id: id.to_string(),
        file_path: file.to_string(),
        node_type: ty,
        signature: format!("fn {id}()"),
        summary: format!("implementation of {id}"),
        source_snippet: format!("fn {id}() {{ todo!() }}"),
        start_line: line,
        end_line: line + 4,
        parent_id: None,
        language: if file.ends_with(".ts") { "typescript" } else { "rust" }.to_string(),
        complexity_score: 2.0,
        created_at: 1_000,
        updated_at: 1_000,
    }
}

/// Write a store and index into `dir` and return their paths.
pub fn write_corpus(
    dir: &Path,
    annotations: &[Annotation],
    vectors: &[(&str, Vec<f32>)],
) -> (PathBuf, PathBuf) {
    let store_path = dir.join("annotations.db");
    let index_path = dir.join("vectors.idx");

    let mut writer = StoreWriter::create(&store_path).unwrap();
    writer.insert_batch(&annotations.to_vec()).unwrap();
    drop(writer);

    let mut builder = IndexBuilder::new(DIM);
    for (id, vector) in vectors {
        builder
            .insert(id.to_string(), unit(vector.clone()), format!("hash-{id}"))
            .unwrap();
    }
    builder.save(&index_path).unwrap();

    (store_path, index_path)
}

/// Assemble a processor over an on-disk corpus at epoch 1.
pub fn processor_over(
    store_path: &Path,
    index_path: &Path,
    generator: Option<Arc<dyn EmbeddingGenerator>>,
) -> QueryProcessor {
    let snapshot =
        load_snapshot(store_path, index_path, IndexConfig::default(), DIM, 1).unwrap();
    let cell = Arc::new(SnapshotCell::with_snapshot(snapshot));
    let caches = Arc::new(QueryCaches::new(CacheConfig::default()));
    QueryProcessor::new(cell, generator, caches, ProcessorConfig::default())
}
