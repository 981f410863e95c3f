//! Astir Core - Annotation data model and embedded annotation store
//!
//! This crate holds the shared data model (annotations, match types) and the
//! read-only SQLite store the query engine hydrates results from.
//!
//! # Example
//!
//! ```ignore
//! use astir_core::{AnnotationStore, AnnotationFilter};
//!
//! let store = AnnotationStore::open("workspace/.astir/annotations.db".as_ref())?;
//! let hits = store.query(&AnnotationFilter {
//!     file_globs: vec!["^src/".into()],
//!     ..Default::default()
//! })?;
//! ```

pub mod error;
pub mod model;
pub mod store;

pub use error::{Result, StoreError};
pub use model::{sort_matches, Annotation, AnnotationMatch, MatchReason, NodeType, VectorMatch};
pub use store::{AnnotationFilter, AnnotationStore, PathPattern, StoreStatistics};
pub use store::writer::StoreWriter;
