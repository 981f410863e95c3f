//! Astir Query - Semantic query engine
//!
//! Orchestrates the five search strategies (semantic, contextual, signature,
//! file, lexical) over the annotation store and vector index, with a two-tier
//! TTL+LRU cache and hot-reload coherence via epoch-stamped corpus snapshots.
//!
//! # Query flow
//!
//! A request is fingerprinted against the current corpus epoch and answered
//! from the response cache when possible. On a miss, the semantic path embeds
//! the query (through the embedding cache), runs the ANN search, hydrates ids
//! from the store, applies context boosts and filters, and ranks. Any vector
//! path failure degrades to lexical scoring; the client sees a successful
//! response marked `lexical_fallback`, never a partial error.

pub mod boost;
pub mod cache;
pub mod deadline;
pub mod error;
pub mod fingerprint;
pub mod lexical;
pub mod processor;
pub mod reload;
pub mod request;
pub mod snapshot;

pub use boost::BoostWeights;
pub use cache::{CacheConfig, CacheMetrics, EmbeddingCache, QueryCache, QueryCaches, TtlLruCache};
pub use deadline::{CancellationFlag, QueryDeadline, DEFAULT_QUERY_TIMEOUT};
pub use error::{QueryError, Result};
pub use fingerprint::fingerprint;
pub use processor::{ProcessorConfig, QueryProcessor};
pub use reload::{HotReloadCoordinator, ReloadConfig, DEFAULT_DEBOUNCE};
pub use request::{
    QueryContext, QueryKind, QueryOptions, QueryRequest, QueryResponse, ResponseMetadata,
    SearchStrategy,
};
pub use snapshot::{load_snapshot, CorpusSnapshot, SnapshotCell};
