//! The query processor: a single `process` entry point dispatching the five
//! search strategies.
//!
//! The semantic pipeline is: fingerprint → cache → embed → ANN → hydrate →
//! boost → filter → rank → fallback → assemble. Any failure on the vector
//! path (generator unavailable, dimension mismatch, embed error) degrades to
//! the lexical strategy instead of surfacing; only catastrophic conditions
//! (no snapshot, store failure, invalid request) return an error. Deadline
//! and cancellation are checked at stage boundaries, and a cancelled query
//! never writes to either cache.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use astir_core::{sort_matches, Annotation, AnnotationMatch, AnnotationStore, MatchReason, PathPattern};
use astir_embed::{normalize_text, EmbeddingGenerator};

use crate::boost::{boosted_score, context_boost, infer_language, BoostWeights};
use crate::cache::QueryCaches;
use crate::deadline::QueryDeadline;
use crate::error::{QueryError, Result};
use crate::fingerprint::fingerprint;
use crate::lexical::{self, LexicalScope};
use crate::request::{
    QueryKind, QueryRequest, QueryResponse, ResponseMetadata, SearchStrategy,
};
use crate::snapshot::{CorpusSnapshot, SnapshotCell};

/// Fixed ranking and sizing constants of the pipeline.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Results returned when the request does not say.
    pub default_max_results: usize,
    /// Hard cap; larger requests are clamped, not rejected.
    pub max_results_cap: usize,
    /// Score threshold when the request does not say.
    pub default_min_score: f32,
    /// ANN over-fetch multiplier on max_results.
    pub over_fetch_factor: usize,
    /// Upper bound on ANN candidates per query.
    pub candidate_cap: usize,
    /// Context boost weights.
    pub boosts: BoostWeights,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            default_max_results: 20,
            max_results_cap: 10_000,
            default_min_score: 0.3,
            over_fetch_factor: 3,
            candidate_cap: 1000,
            boosts: BoostWeights::default(),
        }
    }
}

/// Request parameters after defaulting and clamping.
struct EffectiveParams {
    max_results: usize,
    min_score: f32,
}

/// The query engine's orchestrator. Owns no persistent state; borrows the
/// snapshot cell, generator and caches shared with the rest of the process.
pub struct QueryProcessor {
    snapshots: Arc<SnapshotCell>,
    generator: Option<Arc<dyn EmbeddingGenerator>>,
    caches: Arc<QueryCaches>,
    config: ProcessorConfig,
}

impl QueryProcessor {
    pub fn new(
        snapshots: Arc<SnapshotCell>,
        generator: Option<Arc<dyn EmbeddingGenerator>>,
        caches: Arc<QueryCaches>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            snapshots,
            generator,
            caches,
            config,
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCell> {
        &self.snapshots
    }

    pub fn caches(&self) -> &Arc<QueryCaches> {
        &self.caches
    }

    /// Process one query end to end.
    pub async fn process(
        &self,
        request: QueryRequest,
        deadline: QueryDeadline,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let params = self.validate(&request)?;

        let snapshot = self.snapshots.current()?;
        let epoch = snapshot.epoch;

        // Step 1: fingerprint and cache lookup.
        let key = fingerprint(&request, epoch);
        if let Some(mut cached) = self.caches.query.get(&key, epoch) {
            debug!(kind = request.kind.as_str(), "Query cache hit");
            cached.metadata.cache_hit = true;
            cached.query_time_ms = started.elapsed().as_millis() as u64;
            return Ok(cached);
        }

        let response = match request.kind {
            QueryKind::Semantic => {
                let boost = request.options.use_context_boosting.unwrap_or(false);
                self.semantic(&request, &params, &snapshot, &deadline, boost)
                    .await?
            }
            QueryKind::Contextual => {
                self.semantic(&request, &params, &snapshot, &deadline, true)
                    .await?
            }
            QueryKind::Signature => {
                self.scan(
                    &request,
                    &params,
                    &snapshot,
                    &deadline,
                    LexicalScope::Signature,
                    MatchReason::SignatureMatch,
                    SearchStrategy::Signature,
                )
                .await?
            }
            QueryKind::Lexical => {
                self.scan(
                    &request,
                    &params,
                    &snapshot,
                    &deadline,
                    LexicalScope::Full,
                    MatchReason::LexicalMatch,
                    SearchStrategy::Lexical,
                )
                .await?
            }
            QueryKind::File => self.file(&request, &params, &snapshot, &deadline).await?,
        };

        // A query cancelled on the way out returns an error and caches nothing.
        deadline.check()?;

        let mut response = response;
        response.query_time_ms = started.elapsed().as_millis() as u64;
        self.caches.query.put(key, epoch, response.clone());
        Ok(response)
    }

    /// Defaulting and clamping per the request contract.
    fn validate(&self, request: &QueryRequest) -> Result<EffectiveParams> {
        if request.text.trim().is_empty() {
            return Err(QueryError::InvalidRequest(
                "query text must not be empty".to_string(),
            ));
        }

        let max_results = match request.max_results {
            Some(0) => {
                return Err(QueryError::InvalidRequest(
                    "max_results must be at least 1".to_string(),
                ))
            }
            // Above the cap is clamped, not rejected.
            Some(n) => n.min(self.config.max_results_cap),
            None => self.config.default_max_results,
        };

        let min_score = request.min_score.unwrap_or(self.config.default_min_score);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(QueryError::InvalidRequest(format!(
                "min_score must be in [0, 1], got {min_score}"
            )));
        }

        Ok(EffectiveParams {
            max_results,
            min_score,
        })
    }

    // =========================================================================
    // Semantic pipeline
    // =========================================================================

    async fn semantic(
        &self,
        request: &QueryRequest,
        params: &EffectiveParams,
        snapshot: &Arc<CorpusSnapshot>,
        deadline: &QueryDeadline,
        boost_enabled: bool,
    ) -> Result<QueryResponse> {
        let strategy = if boost_enabled {
            SearchStrategy::SemanticWithContext
        } else {
            SearchStrategy::Semantic
        };

        // Step 2: query embedding (via the embedding cache). `None` means the
        // vector path is down; an error is cancellation or deadline expiry.
        let query_vec = match self.query_embedding(request, deadline).await? {
            Some(v) => v,
            None => {
                return self
                    .lexical_fallback(request, params, snapshot, deadline)
                    .await;
            }
        };
        deadline.check()?;

        // Step 3: candidate retrieval.
        let fetch = params
            .max_results
            .saturating_mul(self.config.over_fetch_factor)
            .min(self.config.candidate_cap);
        let ef = request
            .options
            .search_ef
            .unwrap_or_else(|| snapshot.index.config().ef_search);

        let vector_started = Instant::now();
        let hits = {
            let index = Arc::clone(&snapshot.index);
            let query_vec = query_vec.clone();
            tokio::task::spawn_blocking(move || index.search(&query_vec, fetch, ef))
                .await
                .map_err(|e| QueryError::Internal(format!("search task panicked: {e}")))?
        };
        let vector_search_time_ms = vector_started.elapsed().as_millis() as u64;

        let hits = match hits {
            Ok(hits) if !snapshot.index.is_empty() => hits,
            Ok(_) => {
                // Empty index: nothing the vector path can say.
                debug!("Vector index empty, using lexical fallback");
                return self
                    .lexical_fallback(request, params, snapshot, deadline)
                    .await;
            }
            Err(e) => {
                warn!("Vector search failed ({e}), using lexical fallback");
                return self
                    .lexical_fallback(request, params, snapshot, deadline)
                    .await;
            }
        };
        deadline.check()?;
        let total_candidates = hits.len();

        // Step 4: hydration, preserving vector order.
        let hydrated = {
            let store = Arc::clone(&snapshot.store);
            tokio::task::spawn_blocking(move || hydrate(&store, hits))
                .await
                .map_err(|e| QueryError::Internal(format!("hydration task panicked: {e}")))??
        };
        deadline.check()?;

        // Steps 5 and 6: boost, filter, threshold, rank, truncate.
        let ranking_started = Instant::now();
        let query_language = infer_language(&request.text);
        let patterns = request
            .filters
            .compile_patterns()
            .map_err(|e| QueryError::InvalidRequest(e.to_string()))?;

        let mut matches: Vec<AnnotationMatch> = hydrated
            .into_iter()
            .filter_map(|(annotation, sim)| {
                if !request.filters.matches(&annotation, &patterns) {
                    return None;
                }
                let (score, reason) = if boost_enabled {
                    let b = context_boost(
                        &self.config.boosts,
                        &request.context,
                        query_language,
                        &annotation,
                    );
                    let reason = if b > 0.0 {
                        MatchReason::ContextBoosted
                    } else {
                        MatchReason::SemanticSimilarity
                    };
                    (boosted_score(&self.config.boosts, sim, b), reason)
                } else {
                    (sim, MatchReason::SemanticSimilarity)
                };
                if score >= params.min_score {
                    Some(AnnotationMatch::new(annotation, score, reason))
                } else {
                    None
                }
            })
            .collect();

        sort_matches(&mut matches);
        let total_matches = matches.len();
        matches.truncate(params.max_results);
        let ranking_time_ms = ranking_started.elapsed().as_millis() as u64;
        deadline.check()?;

        // Step 7: zero-result fallback unless explicitly forbidden.
        if matches.is_empty() && request.options.include_similar != Some(false) {
            debug!("Semantic search yielded nothing, trying lexical fallback");
            return self
                .lexical_fallback(request, params, snapshot, deadline)
                .await;
        }

        // Step 8: response assembly.
        Ok(QueryResponse {
            results: matches,
            total_matches,
            query_time_ms: 0, // stamped by process()
            search_strategy: strategy,
            metadata: ResponseMetadata {
                vector_search_time_ms,
                ranking_time_ms,
                total_candidates,
                applied_filters: request.filters.applied_names(),
                cache_hit: false,
                corpus_epoch: snapshot.epoch,
            },
        })
    }

    /// Resolve the query embedding through the embedding cache.
    ///
    /// `Ok(None)` means the vector path is unavailable (no generator, or the
    /// generator errored) and the caller should fall back. `Err` is reserved
    /// for cancellation and deadline expiry.
    async fn query_embedding(
        &self,
        request: &QueryRequest,
        deadline: &QueryDeadline,
    ) -> Result<Option<Vec<f32>>> {
        let normalized = normalize_text(&request.text);
        if let Some(vector) = self.caches.embedding.get(&normalized) {
            return Ok(Some(vector));
        }

        let generator = match &self.generator {
            Some(g) => Arc::clone(g),
            None => return Ok(None),
        };

        match generator.embed_batch(vec![normalized.clone()]).await {
            Ok(mut vectors) if !vectors.is_empty() => {
                let vector = vectors.remove(0);
                // A cancelled query must not populate the cache.
                deadline.check()?;
                self.caches.embedding.put(normalized, vector.clone());
                Ok(Some(vector))
            }
            Ok(_) => {
                warn!("Embedding generator returned no vector");
                Ok(None)
            }
            Err(e) => {
                warn!("Query embedding failed: {e}");
                Ok(None)
            }
        }
    }

    /// The lexical strategy run as a degradation of the semantic path.
    async fn lexical_fallback(
        &self,
        request: &QueryRequest,
        params: &EffectiveParams,
        snapshot: &Arc<CorpusSnapshot>,
        deadline: &QueryDeadline,
    ) -> Result<QueryResponse> {
        self.scan(
            request,
            params,
            snapshot,
            deadline,
            LexicalScope::Full,
            MatchReason::LexicalMatch,
            SearchStrategy::LexicalFallback,
        )
        .await
    }

    // =========================================================================
    // Scan strategies (signature, lexical, fallback)
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn scan(
        &self,
        request: &QueryRequest,
        params: &EffectiveParams,
        snapshot: &Arc<CorpusSnapshot>,
        deadline: &QueryDeadline,
        scope: LexicalScope,
        reason: MatchReason,
        strategy: SearchStrategy,
    ) -> Result<QueryResponse> {
        deadline.check()?;
        let ranking_started = Instant::now();

        let store = Arc::clone(&snapshot.store);
        let filters = request.filters.clone();
        let text = request.text.clone();
        let min_score = params.min_score;

        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<AnnotationMatch>> {
            let annotations = store.query(&filters)?;
            Ok(lexical::rank(&text, annotations, scope, min_score, reason))
        })
        .await
        .map_err(|e| QueryError::Internal(format!("scan task panicked: {e}")))??;
        deadline.check()?;

        let total_candidates = matches.len();
        let total_matches = matches.len();
        let mut results = matches;
        results.truncate(params.max_results);

        Ok(QueryResponse {
            results,
            total_matches,
            query_time_ms: 0,
            search_strategy: strategy,
            metadata: ResponseMetadata {
                vector_search_time_ms: 0,
                ranking_time_ms: ranking_started.elapsed().as_millis() as u64,
                total_candidates,
                applied_filters: request.filters.applied_names(),
                cache_hit: false,
                corpus_epoch: snapshot.epoch,
            },
        })
    }

    // =========================================================================
    // File strategy
    // =========================================================================

    async fn file(
        &self,
        request: &QueryRequest,
        params: &EffectiveParams,
        snapshot: &Arc<CorpusSnapshot>,
        deadline: &QueryDeadline,
    ) -> Result<QueryResponse> {
        deadline.check()?;
        let ranking_started = Instant::now();

        let pattern = PathPattern::compile(request.text.trim())
            .map_err(|e| QueryError::InvalidRequest(e.to_string()))?;

        let store = Arc::clone(&snapshot.store);
        let filters = request.filters.clone();
        let annotations = tokio::task::spawn_blocking(move || store.query(&filters))
            .await
            .map_err(|e| QueryError::Internal(format!("file scan task panicked: {e}")))??;
        deadline.check()?;

        // Already in source order from the store; keep it.
        let matched: Vec<Annotation> = annotations
            .into_iter()
            .filter(|a| pattern.is_match(&a.file_path))
            .collect();
        let total_candidates = matched.len();

        let mut results: Vec<AnnotationMatch> = matched
            .into_iter()
            .map(|a| AnnotationMatch::new(a, 1.0, MatchReason::FileMatch))
            .filter(|m| m.score >= params.min_score)
            .collect();
        let total_matches = results.len();
        results.truncate(params.max_results);

        Ok(QueryResponse {
            results,
            total_matches,
            query_time_ms: 0,
            search_strategy: SearchStrategy::File,
            metadata: ResponseMetadata {
                vector_search_time_ms: 0,
                ranking_time_ms: ranking_started.elapsed().as_millis() as u64,
                total_candidates,
                applied_filters: request.filters.applied_names(),
                cache_hit: false,
                corpus_epoch: snapshot.epoch,
            },
        })
    }
}

/// Load annotations for vector hits in order, dropping ids the store no
/// longer knows (logged, not fabricated).
fn hydrate(
    store: &AnnotationStore,
    hits: Vec<astir_index::VectorHit>,
) -> Result<Vec<(Annotation, f32)>> {
    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        match store.get_by_id(&hit.node_id)? {
            Some(annotation) => out.push((annotation, hit.score)),
            None => {
                warn!(node_id = %hit.node_id, "Vector hit has no annotation, dropping");
            }
        }
    }
    Ok(out)
}
