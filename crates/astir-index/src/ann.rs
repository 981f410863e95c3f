//! HNSW nearest-neighbour search over L2-normalised embeddings.
//!
//! A [`VectorIndex`] is an immutable snapshot: it is built once (from the
//! persisted file or an [`IndexBuilder`](crate::storage::IndexBuilder)) and
//! then only searched. Live mutation is handled one level up by opening a new
//! index and swapping handles, so concurrent readers never race a writer.

use std::collections::HashMap;

use hnsw_rs::prelude::*;
use tracing::debug;

use crate::error::{IndexError, Result};

/// Configuration for HNSW graph construction and search.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of neighbours per graph node.
    pub m: usize,
    /// Candidate-list width during construction.
    pub ef_construction: usize,
    /// Default candidate-list width during search; callers may override per
    /// query, and the effective value is always at least k.
    pub ef_search: usize,
    /// Upper bound on indexed vectors.
    pub max_elements: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_elements: 200_000,
        }
    }
}

/// A raw ANN hit: node id plus similarity score in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub node_id: String,
    pub score: f32,
}

/// Index summary for readiness checks and `index_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
}

/// In-memory HNSW index over owned vectors with id mapping.
pub struct VectorIndex {
    config: IndexConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    id_to_slot: HashMap<String, usize>,
    slot_to_id: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .field("id_to_slot", &self.id_to_slot)
            .field("slot_to_id", &self.slot_to_id)
            .field("vectors", &self.vectors)
            .finish()
    }
}

/// Below this size the graph adds nothing over an exact scan.
const MIN_VECTORS_FOR_GRAPH: usize = 10;

impl VectorIndex {
    /// Build an index from parallel id/vector arrays.
    ///
    /// Every vector must have the configured dimension and ids must be unique.
    pub fn build(
        dimension: usize,
        config: IndexConfig,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        debug_assert_eq!(ids.len(), vectors.len());
        if vectors.len() > config.max_elements {
            return Err(IndexError::CapacityExceeded(config.max_elements));
        }

        let mut id_to_slot = HashMap::with_capacity(ids.len());
        for (slot, id) in ids.iter().enumerate() {
            if id_to_slot.insert(id.clone(), slot).is_some() {
                return Err(IndexError::DuplicateId(id.clone()));
            }
        }
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                });
            }
        }

        let hnsw = if vectors.len() >= MIN_VECTORS_FOR_GRAPH {
            let nb_elem = vectors.len();
            let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize);
            // Snapshots are immutable, so the graph is sized to the corpus.
            let hnsw = Hnsw::<f32, DistCosine>::new(
                config.m,
                nb_elem,
                nb_layer,
                config.ef_construction,
                DistCosine {},
            );
            let data_for_insertion: Vec<(&Vec<f32>, usize)> =
                vectors.iter().enumerate().map(|(slot, v)| (v, slot)).collect();
            hnsw.parallel_insert(&data_for_insertion);
            debug!(count = nb_elem, layers = nb_layer, "Built HNSW graph");
            Some(hnsw)
        } else {
            // Tiny corpora are searched exactly.
            None
        };

        Ok(Self {
            config,
            dimension,
            hnsw,
            id_to_slot,
            slot_to_id: ids,
            vectors,
        })
    }

    /// An empty index of the given dimension. Not ready (count = 0).
    pub fn empty(dimension: usize, config: IndexConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            id_to_slot: HashMap::new(),
            slot_to_id: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// k-NN search with an explicit candidate-list width.
    ///
    /// Returns at most `k` hits ordered by descending score. `ef` is clamped
    /// to at least `k`; scores are `1 - cosine_distance`, clamped to [0, 1].
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<VectorHit>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let ef = ef.max(k);
        let mut hits: Vec<VectorHit> = match &self.hnsw {
            Some(hnsw) => hnsw
                .search(query, k, ef)
                .into_iter()
                .map(|n: Neighbour| VectorHit {
                    node_id: self.slot_to_id[n.get_origin_id()].clone(),
                    score: (1.0 - n.distance).clamp(0.0, 1.0),
                })
                .collect(),
            None => self.exact_search(query, k),
        };

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Search with the configured default `ef_search`.
    pub fn search_default(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        self.search(query, k, self.config.ef_search)
    }

    /// Exact scan for corpora too small to benefit from the graph.
    fn exact_search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        let mut scored: Vec<VectorHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, v)| VectorHit {
                node_id: self.slot_to_id[slot].clone(),
                score: dot(query, v).clamp(0.0, 1.0),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        scored.truncate(k);
        scored
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            count: self.vectors.len(),
            dimension: self.dimension,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.id_to_slot.contains_key(node_id)
    }

    /// The stored vector for a node id, if present.
    pub fn vector(&self, node_id: &str) -> Option<&[f32]> {
        self.id_to_slot
            .get(node_id)
            .map(|&slot| self.vectors[slot].as_slice())
    }

    /// Stored ids in slot order (persistence order).
    pub fn ids(&self) -> &[String] {
        &self.slot_to_id
    }

    /// Stored vectors in slot order (persistence order).
    pub(crate) fn raw_vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

/// Dot product; cosine similarity for L2-normalised inputs.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
