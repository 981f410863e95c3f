//! CLI command implementations.

pub mod query;
pub mod serve;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use astir_config::{AstirConfig, ConfigLoader};
use astir_embed::{EmbeddingGenerator, LocalGenerator, LocalGeneratorConfig};
use astir_index::IndexConfig;
use astir_query::{
    load_snapshot, BoostWeights, CacheConfig, ProcessorConfig, QueryCaches, QueryProcessor,
    SnapshotCell,
};

use crate::GlobalOptions;

/// Everything a command needs to run queries.
pub struct Engine {
    pub config: AstirConfig,
    pub processor: Arc<QueryProcessor>,
    pub snapshots: Arc<SnapshotCell>,
    pub caches: Arc<QueryCaches>,
    pub query_timeout: Duration,
}

/// Load config, open the corpus at epoch 1, and assemble the processor.
///
/// `with_generator` controls whether the embedding model is wired in; stats
/// does not need it and skips the model machinery entirely.
pub async fn bootstrap(global: &GlobalOptions, with_generator: bool) -> Result<Engine> {
    let config = ConfigLoader::load(&global.workspace, &global.to_config_overrides())
        .context("failed to load configuration")?;

    let store_path = config.store_path(&global.workspace);
    let index_path = config.index_path(&global.workspace);
    let index_config = IndexConfig {
        m: config.index.m,
        ef_construction: config.index.ef_construction,
        ef_search: config.index.ef_search,
        max_elements: config.index.max_elements,
    };

    let dimension = config.embedding.dimension;
    let snapshot = {
        let store_path_inner = store_path.clone();
        let index_path = index_path.clone();
        tokio::task::spawn_blocking(move || {
            load_snapshot(&store_path_inner, &index_path, index_config, dimension, 1)
        })
        .await
        .context("snapshot load task panicked")?
        .with_context(|| format!("failed to open corpus at {}", store_path.display()))?
    };
    let snapshots = Arc::new(SnapshotCell::with_snapshot(snapshot));

    let caches = Arc::new(QueryCaches::new(CacheConfig {
        query_capacity: config.cache.query_capacity,
        query_ttl_secs: config.cache.query_ttl_secs,
        embedding_capacity: config.cache.embedding_capacity,
        embedding_ttl_secs: config.cache.embedding_ttl_secs,
    }));

    let generator: Option<Arc<dyn EmbeddingGenerator>> = if with_generator {
        match LocalGenerator::new(LocalGeneratorConfig {
            model_ref: config.embedding.model_ref.clone(),
            dimension: config.embedding.dimension,
            cache_dir: Some(config.models_dir(&global.workspace)),
        }) {
            Ok(generator) => {
                info!(model = %config.embedding.model_ref, "Embedding generator configured");
                Some(Arc::new(generator))
            }
            Err(e) => {
                // Recoverable on the query path: lexical-only service.
                warn!("Embedding generator unavailable, serving lexical only: {e}");
                None
            }
        }
    } else {
        None
    };

    let processor = Arc::new(QueryProcessor::new(
        Arc::clone(&snapshots),
        generator,
        Arc::clone(&caches),
        ProcessorConfig {
            default_max_results: config.query.default_max_results,
            max_results_cap: config.query.max_results_cap,
            default_min_score: config.query.default_min_score,
            over_fetch_factor: config.query.over_fetch_factor,
            candidate_cap: config.query.candidate_cap,
            boosts: BoostWeights::default(),
        },
    ));

    let query_timeout = Duration::from_secs(config.query.timeout_secs);
    Ok(Engine {
        config,
        processor,
        snapshots,
        caches,
        query_timeout,
    })
}
