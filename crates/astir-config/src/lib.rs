//! Astir Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.astir/config.toml`
//! - Workspace config: `.astir/astir.json` (versioned JSON)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: defaults → global → workspace → CLI
//! overrides. The workspace file carries a `version` field; an unknown
//! version is rejected rather than guessed at.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Workspace config format version this build reads and writes.
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration, fully merged from all sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AstirConfig {
    /// Workspace config format version.
    pub version: u32,

    /// Storage locations
    pub storage: StorageConfig,

    /// Vector index parameters
    pub index: IndexSettings,

    /// Embedding model settings
    pub embedding: EmbeddingSettings,

    /// Cache sizing
    pub cache: CacheSettings,

    /// Query defaults and limits
    pub query: QuerySettings,

    /// MCP server behaviour
    pub server: ServerSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for AstirConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: StorageConfig::default(),
            index: IndexSettings::default(),
            embedding: EmbeddingSettings::default(),
            cache: CacheSettings::default(),
            query: QuerySettings::default(),
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// File layout under the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for Astir data, relative to the workspace root.
    pub data_dir: PathBuf,
    /// Annotation store file name.
    pub store_file: String,
    /// Vector index file name.
    pub index_file: String,
    /// Cached model artifacts directory name.
    pub models_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".astir"),
            store_file: "annotations.db".to_string(),
            index_file: "vectors.idx".to_string(),
            models_dir: "models".to_string(),
        }
    }
}

/// HNSW construction and search parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Graph degree.
    pub m: usize,
    /// Candidate-list width at build time.
    pub ef_construction: usize,
    /// Default candidate-list width at search time.
    pub ef_search: usize,
    /// Capacity bound on indexed vectors.
    pub max_elements: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_elements: 200_000,
        }
    }
}

/// Embedding model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// HuggingFace model id or local path.
    pub model_ref: String,
    /// Output dimension; must match the vector index.
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_ref: "jinaai/jina-embeddings-v2-base-en".to_string(),
            dimension: 768,
        }
    }
}

/// Capacity and TTL for both cache tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub query_capacity: usize,
    pub query_ttl_secs: u64,
    pub embedding_capacity: usize,
    pub embedding_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            query_capacity: 512,
            query_ttl_secs: 300,
            embedding_capacity: 2048,
            embedding_ttl_secs: 3600,
        }
    }
}

/// Query pipeline defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_max_results: usize,
    pub max_results_cap: usize,
    pub default_min_score: f32,
    pub over_fetch_factor: usize,
    pub candidate_cap: usize,
    /// Per-query deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_max_results: 20,
            max_results_cap: 10_000,
            default_min_score: 0.3,
            over_fetch_factor: 3,
            candidate_cap: 1000,
            timeout_secs: 30,
        }
    }
}

/// What the front-end does when the in-flight bound is hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    /// Wait (bounded by the request deadline) for a slot.
    #[default]
    Queue,
    /// Answer immediately with a resource-exhausted error.
    Reject,
}

/// MCP front-end behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Concurrent in-flight request bound.
    pub max_in_flight: usize,
    /// Behaviour beyond the bound.
    pub overflow: OverflowMode,
    /// Hot-reload debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            overflow: OverflowMode::Queue,
            debounce_ms: 500,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the Astir data directory.
    pub data_dir: Option<PathBuf>,
    /// Override the embedding model reference.
    pub model_ref: Option<String>,
    /// Override log level.
    pub log_level: Option<String>,
    /// Override the in-flight request bound.
    pub max_in_flight: Option<usize>,
}

impl AstirConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(ref model_ref) = overrides.model_ref {
            self.embedding.model_ref = model_ref.clone();
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(max_in_flight) = overrides.max_in_flight {
            self.server.max_in_flight = max_in_flight;
        }
    }

    /// Validate value ranges; called after the final merge.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: CONFIG_VERSION,
            });
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.embedding.model_ref.is_empty() {
            return Err(ConfigError::ValidationError(
                "embedding.model_ref is required".to_string(),
            ));
        }
        if self.index.m == 0 || self.index.ef_construction == 0 || self.index.ef_search == 0 {
            return Err(ConfigError::ValidationError(
                "index.m, index.ef_construction and index.ef_search must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.query.default_min_score) {
            return Err(ConfigError::ValidationError(format!(
                "query.default_min_score must be in [0, 1], got {}",
                self.query.default_min_score
            )));
        }
        if self.query.default_max_results == 0
            || self.query.default_max_results > self.query.max_results_cap
        {
            return Err(ConfigError::ValidationError(
                "query.default_max_results must be in [1, max_results_cap]".to_string(),
            ));
        }
        if self.server.max_in_flight == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The Astir data directory for a workspace.
    pub fn data_dir(&self, workspace_root: &Path) -> PathBuf {
        if self.storage.data_dir.is_absolute() {
            self.storage.data_dir.clone()
        } else {
            workspace_root.join(&self.storage.data_dir)
        }
    }

    /// Annotation store path for a workspace.
    pub fn store_path(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root).join(&self.storage.store_file)
    }

    /// Vector index path for a workspace.
    pub fn index_path(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root).join(&self.storage.index_file)
    }

    /// Workspace config file path.
    pub fn config_path(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root).join("astir.json")
    }

    /// Model artifact cache directory for a workspace.
    pub fn models_dir(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root).join(&self.storage.models_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AstirConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.storage.data_dir, PathBuf::from(".astir"));
        assert_eq!(config.server.max_in_flight, 16);
        assert_eq!(config.server.overflow, OverflowMode::Queue);
    }

    #[test]
    fn apply_overrides_wins_last() {
        let mut config = AstirConfig::default();
        let overrides = ConfigOverrides {
            data_dir: Some(PathBuf::from("/custom/astir")),
            log_level: Some("debug".to_string()),
            max_in_flight: Some(4),
            ..Default::default()
        };
        config.apply_overrides(&overrides);
        assert_eq!(config.storage.data_dir, PathBuf::from("/custom/astir"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.max_in_flight, 4);
    }

    #[test]
    fn path_resolution_relative_and_absolute() {
        let config = AstirConfig::default();
        let root = Path::new("/home/user/project");
        assert_eq!(
            config.store_path(root),
            PathBuf::from("/home/user/project/.astir/annotations.db")
        );
        assert_eq!(
            config.index_path(root),
            PathBuf::from("/home/user/project/.astir/vectors.idx")
        );

        let mut config = AstirConfig::default();
        config.storage.data_dir = PathBuf::from("/absolute/.astir");
        assert_eq!(
            config.store_path(root),
            PathBuf::from("/absolute/.astir/annotations.db")
        );
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let config = AstirConfig {
            version: 99,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn invalid_min_score_is_rejected() {
        let mut config = AstirConfig::default();
        config.query.default_min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_in_flight_bound_is_rejected() {
        let mut config = AstirConfig::default();
        config.server.max_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overflow_mode_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&OverflowMode::Reject).unwrap(),
            "\"reject\""
        );
    }
}
