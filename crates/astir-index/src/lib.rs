//! Astir Index - Local HNSW vector index
//!
//! Approximate nearest-neighbour search over fixed-dimension, L2-normalised
//! embeddings with cosine distance, persisted as a single file next to the
//! annotation store. Handles are immutable snapshots: the hot-reload
//! coordinator opens a new one and swaps it in rather than mutating a live
//! index, so readers are always lock-free.
//!
//! # Example
//!
//! ```ignore
//! use astir_index::{storage, IndexConfig};
//!
//! let index = storage::open("workspace/.astir/vectors.idx".as_ref(), IndexConfig::default())?;
//! let hits = index.search(&query_vec, 10, 100)?;
//! ```

pub mod ann;
pub mod error;
pub mod storage;

pub use ann::{IndexConfig, IndexStats, VectorHit, VectorIndex};
pub use error::{IndexError, Result};
pub use storage::{IndexBuilder, IndexEntry, IndexHeader};
