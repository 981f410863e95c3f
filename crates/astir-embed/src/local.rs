//! Local embedding generator using Candle and a JinaBERT model.
//!
//! Loads one embedding model (default `jinaai/jina-embeddings-v2-base-en`,
//! 768 dimensions), lazily and exactly once per process. Inference runs under
//! `spawn_blocking` and is serialised by a mutex because the model is a
//! single shared resource. GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::jina_bert::{BertModel as JinaBertModel, Config as JinaConfig};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use once_cell::sync::OnceCell;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingGenerator, GeneratorStatus};
use crate::text::normalize_text;

/// Default model on HuggingFace Hub
pub const DEFAULT_MODEL_REF: &str = "jinaai/jina-embeddings-v2-base-en";

/// Default output dimension for the default model
pub const DEFAULT_DIMENSION: usize = 768;

/// Token budget per input; longer texts are truncated
const MAX_TOKENS: usize = 512;

/// Inputs per forward pass; larger batches are chunked
const BATCH_CHUNK: usize = 32;

/// Data type for model inference
const DTYPE: DType = DType::F32;

/// Settings for the local generator.
#[derive(Debug, Clone)]
pub struct LocalGeneratorConfig {
    /// HuggingFace model id.
    pub model_ref: String,
    /// Expected output dimension; verified against the loaded config.
    pub dimension: usize,
    /// Cache directory for downloaded model artifacts (the workspace
    /// `models/` directory). `None` uses the hf-hub default.
    pub cache_dir: Option<PathBuf>,
}

impl Default for LocalGeneratorConfig {
    fn default() -> Self {
        Self {
            model_ref: DEFAULT_MODEL_REF.to_string(),
            dimension: DEFAULT_DIMENSION,
            cache_dir: None,
        }
    }
}

/// Local embedding generator backed by Candle.
///
/// `Arc<Inner>` keeps the generator cheaply clonable so `spawn_blocking` can
/// move a handle into the blocking task. The model loads once via `OnceCell`.
#[derive(Clone)]
pub struct LocalGenerator {
    inner: Arc<Inner>,
}

struct Inner {
    config: LocalGeneratorConfig,
    model: OnceCell<LoadedModel>,
    device: Device,
    shut_down: AtomicBool,
    /// Serialises forward passes; the model is a single shared resource.
    inference_lock: parking_lot::Mutex<()>,
}

struct LoadedModel {
    model: JinaBertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalGenerator {
    /// Create a generator. Does not load the model; the first embed call or
    /// an explicit `warmup` does.
    pub fn new(config: LocalGeneratorConfig) -> Result<Self> {
        let device = select_device()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                model: OnceCell::new(),
                device,
                shut_down: AtomicBool::new(false),
                inference_lock: parking_lot::Mutex::new(()),
            }),
        })
    }

    fn device_name(&self) -> String {
        match &self.inner.device {
            Device::Cpu => "CPU".to_string(),
            #[cfg(feature = "metal")]
            Device::Metal(_) => "Metal".to_string(),
            #[cfg(feature = "cuda")]
            Device::Cuda(_) => "CUDA".to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unknown".to_string(),
        }
    }

    /// Thread-safe lazy initialization; idempotent.
    fn ensure_model(&self) -> Result<&LoadedModel> {
        self.inner
            .model
            .get_or_try_init(|| load_model(&self.inner.config, &self.inner.device))
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.model.get().is_some()
    }

    fn embed_batch_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(EmbedError::ShutDown);
        }
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let normalized: Vec<String> = texts.iter().map(|t| normalize_text(t)).collect();
        debug!(count = normalized.len(), "Encoding batch");

        let loaded = self.ensure_model()?;
        let _guard = self.inner.inference_lock.lock();

        let mut out = Vec::with_capacity(normalized.len());
        for chunk in normalized.chunks(BATCH_CHUNK) {
            let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
            let mut vectors = encode_chunk(loaded, &refs)?;
            for v in &vectors {
                if v.len() != self.inner.config.dimension {
                    return Err(EmbedError::DimensionMismatch {
                        expected: self.inner.config.dimension,
                        actual: v.len(),
                    });
                }
            }
            out.append(&mut vectors);
        }
        Ok(out)
    }
}

#[async_trait]
impl EmbeddingGenerator for LocalGenerator {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let generator = self.clone();
        tokio::task::spawn_blocking(move || generator.embed_batch_sync(&texts))
            .await
            .map_err(|e| EmbedError::Inference(format!("Blocking task panicked: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.inner.config.dimension
    }

    fn model_ref(&self) -> &str {
        &self.inner.config.model_ref
    }

    async fn check_status(&self) -> Result<GeneratorStatus> {
        let loaded = self.is_loaded();
        let shut_down = self.inner.shut_down.load(Ordering::Acquire);
        Ok(GeneratorStatus {
            available: !shut_down,
            model_ref: self.inner.config.model_ref.clone(),
            device: self.device_name(),
            loaded,
            error: shut_down.then(|| "generator shut down".to_string()),
        })
    }

    async fn warmup(&self) -> Result<()> {
        let generator = self.clone();
        let start = Instant::now();
        tokio::task::spawn_blocking(move || generator.ensure_model().map(|_| ()))
            .await
            .map_err(|e| EmbedError::Inference(format!("Warmup task panicked: {e}")))??;
        info!("Embedding model warmup complete in {:?}", start.elapsed());
        Ok(())
    }

    async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        info!("Embedding generator shut down");
    }
}

/// Select the best available device for inference
fn select_device() -> Result<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal/MPS GPU acceleration");
                return Ok(device);
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
            }
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU acceleration");
                return Ok(device);
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
            }
        }
    }

    info!("Using CPU (no GPU acceleration available)");
    Ok(Device::Cpu)
}

/// Resolve model files, downloading into the configured cache on first use.
fn fetch_model_files(config: &LocalGeneratorConfig) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let init_err = |reason: String| EmbedError::ModelInit {
        model_ref: config.model_ref.clone(),
        reason,
    };

    let mut builder = ApiBuilder::new();
    if let Some(ref dir) = config.cache_dir {
        builder = builder.with_cache_dir(dir.clone());
    }
    let api = builder
        .build()
        .map_err(|e| init_err(format!("HuggingFace API unavailable: {e}")))?;

    let repo = Repo::with_revision(config.model_ref.clone(), RepoType::Model, "main".to_string());
    let api_repo = api.repo(repo);

    let model_config = api_repo
        .get("config.json")
        .map_err(|e| init_err(format!("Failed to fetch config.json: {e}")))?;
    let tokenizer = api_repo
        .get("tokenizer.json")
        .map_err(|e| init_err(format!("Failed to fetch tokenizer.json: {e}")))?;
    let weights = api_repo
        .get("model.safetensors")
        .map_err(|e| init_err(format!("Failed to fetch model.safetensors: {e}")))?;

    Ok((model_config, tokenizer, weights))
}

/// Load model weights and tokenizer; called once per process.
fn load_model(config: &LocalGeneratorConfig, device: &Device) -> Result<LoadedModel> {
    info!("Loading embedding model ({})...", config.model_ref);
    let init_err = |reason: String| EmbedError::ModelInit {
        model_ref: config.model_ref.clone(),
        reason,
    };

    let (config_path, tokenizer_path, weights_path) = fetch_model_files(config)?;

    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| init_err(format!("Failed to read config: {e}")))?;
    let model_config: JinaConfig = serde_json::from_str(&config_str)
        .map_err(|e| init_err(format!("Failed to parse config: {e}")))?;

    if model_config.hidden_size != config.dimension {
        return Err(EmbedError::DimensionMismatch {
            expected: config.dimension,
            actual: model_config.hidden_size,
        });
    }

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| init_err(format!("Failed to load tokenizer: {e}")))?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| init_err(format!("Failed to configure truncation: {e}")))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));

    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device)
            .map_err(|e| init_err(format!("Failed to load weights: {e}")))?
    };
    let model = JinaBertModel::new(vb, &model_config)
        .map_err(|e| init_err(format!("Failed to create model: {e}")))?;

    info!(
        "Embedding model loaded (dim={})",
        model_config.hidden_size
    );
    Ok(LoadedModel {
        model,
        tokenizer,
        device: device.clone(),
    })
}

/// Encode one chunk: tokenize, forward, mean-pool, L2-normalise.
fn encode_chunk(loaded: &LoadedModel, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let encodings = loaded
        .tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| EmbedError::Tokenization(e.to_string()))?;

    let token_ids: Vec<Tensor> = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_ids().to_vec().as_slice(), &loaded.device))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EmbedError::Inference(format!("Failed to create token tensor: {e}")))?;

    let attention_masks: Vec<Tensor> = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_attention_mask().to_vec().as_slice(), &loaded.device))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EmbedError::Inference(format!("Failed to create attention mask: {e}")))?;

    let token_ids = Tensor::stack(&token_ids, 0)
        .map_err(|e| EmbedError::Inference(format!("Failed to stack tokens: {e}")))?;
    let attention_mask = Tensor::stack(&attention_masks, 0)
        .map_err(|e| EmbedError::Inference(format!("Failed to stack masks: {e}")))?;

    let embeddings = loaded
        .model
        .forward(&token_ids)
        .map_err(|e| EmbedError::Inference(format!("Forward pass failed: {e}")))?;

    let pooled = mean_pool(&embeddings, &attention_mask)?;
    let normalized = normalize_l2(&pooled)?;

    (0..normalized.dim(0)?)
        .map(|i| {
            normalized
                .get(i)
                .and_then(|row| row.to_vec1::<f32>())
                .map_err(|e| EmbedError::Inference(format!("Failed to convert embeddings: {e}")))
        })
        .collect()
}

/// Mean pooling with attention mask
fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let attention_mask_expanded = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;

    let sum_mask = attention_mask_expanded.sum(1)?;
    let masked_embeddings = embeddings.broadcast_mul(&attention_mask_expanded)?;
    let summed = masked_embeddings.sum(1)?;

    summed
        .broadcast_div(&sum_mask)
        .map_err(|e| EmbedError::Inference(format!("Mean pooling failed: {e}")))
}

/// L2 normalize embeddings
fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)
        .map_err(|e| EmbedError::Inference(format!("L2 normalization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_creation_without_load() {
        let generator = LocalGenerator::new(LocalGeneratorConfig::default()).unwrap();
        assert!(!generator.is_loaded());
        assert_eq!(generator.dimension(), DEFAULT_DIMENSION);
        assert_eq!(generator.model_ref(), DEFAULT_MODEL_REF);
    }

    #[test]
    fn device_selection_succeeds() {
        assert!(select_device().is_ok());
    }

    #[tokio::test]
    async fn empty_batch_needs_no_model() {
        let generator = LocalGenerator::new(LocalGeneratorConfig::default()).unwrap();
        let out = generator.embed_batch(vec![]).await.unwrap();
        assert!(out.is_empty());
        assert!(!generator.is_loaded());
    }

    #[tokio::test]
    async fn shutdown_rejects_later_batches() {
        let generator = LocalGenerator::new(LocalGeneratorConfig::default()).unwrap();
        generator.shutdown().await;
        let err = generator
            .embed_batch(vec!["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::ShutDown));
    }

    #[tokio::test]
    async fn status_reports_shutdown() {
        let generator = LocalGenerator::new(LocalGeneratorConfig::default()).unwrap();
        let status = generator.check_status().await.unwrap();
        assert!(status.available);
        generator.shutdown().await;
        let status = generator.check_status().await.unwrap();
        assert!(!status.available);
    }

    #[tokio::test]
    #[ignore] // Requires model download
    async fn embed_is_deterministic() {
        let generator = LocalGenerator::new(LocalGeneratorConfig::default()).unwrap();
        let a = generator
            .embed_batch(vec!["parse json".to_string()])
            .await
            .unwrap();
        let b = generator
            .embed_batch(vec!["parse json".to_string()])
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), DEFAULT_DIMENSION);
    }
}
