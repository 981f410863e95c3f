//! Astir Embed - Deterministic local embedding generation
//!
//! Turns text into fixed-dimension, L2-normalised vectors with a locally
//! loaded JinaBERT model. The model loads once per process; generation is
//! deterministic for a given `(model_ref, text)` pair and performs no network
//! IO after the first successful load.

pub mod error;
pub mod local;
pub mod provider;
pub mod text;

pub use error::{EmbedError, Result};
pub use local::{LocalGenerator, LocalGeneratorConfig, DEFAULT_DIMENSION, DEFAULT_MODEL_REF};
pub use provider::{EmbeddingGenerator, GeneratorStatus};
pub use text::{content_hash, normalize_text};
