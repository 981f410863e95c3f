//! Embedding generator trait.
//!
//! The query processor talks to embedding generation only through this trait:
//! the production implementation is [`LocalGenerator`](crate::local::LocalGenerator)
//! (Candle inference), and tests substitute deterministic stubs. All methods
//! are async so local inference can run under `spawn_blocking` without the
//! caller caring.

use async_trait::async_trait;

use crate::error::Result;

/// Health and capability snapshot for diagnostics.
#[derive(Debug, Clone)]
pub struct GeneratorStatus {
    /// Whether the generator can serve embed_batch right now.
    pub available: bool,
    /// Model reference (HuggingFace id or local path).
    pub model_ref: String,
    /// Device in use ("CPU", "Metal", "CUDA").
    pub device: String,
    /// Whether the model weights are resident in memory.
    pub loaded: bool,
    /// Error message if unavailable.
    pub error: Option<String>,
}

/// Deterministic text-to-vector generation.
///
/// Guarantees required of every implementation:
/// - `embed_batch` output rows are L2-normalised and `dimension()` wide
/// - identical `(model_ref, text)` input yields identical output
/// - no network IO after the first successful load
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the generator is a process-wide
/// singleton shared by every in-flight query.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed a batch of texts, one vector per input, input order preserved.
    ///
    /// Inputs are whitespace-normalised and truncated to the model's token
    /// budget before encoding. Implementations chunk internally; callers may
    /// pass arbitrarily large batches.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Output dimensionality (the index dimension must match this).
    fn dimension(&self) -> usize;

    /// Model reference this generator was configured with.
    fn model_ref(&self) -> &str;

    /// Current health of the generator.
    async fn check_status(&self) -> Result<GeneratorStatus>;

    /// Load the model eagerly. Idempotent; later calls are no-ops.
    async fn warmup(&self) -> Result<()>;

    /// Release model resources. Subsequent embed calls fail with `ShutDown`.
    async fn shutdown(&self);
}
