//! Request fingerprinting for the query-response cache.
//!
//! The fingerprint is a SHA-256 over a canonical serialisation of everything
//! that can change the answer: strategy, text, filters, result limits,
//! options, and the corpus epoch. Editor context is part of the key too —
//! two queries with different `current_file` can legitimately rank
//! differently. Field order is fixed by the struct definition, so the key is
//! stable across processes.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::request::QueryRequest;

/// Canonical view of a request for hashing. Anything not listed here must
/// not affect cached answers.
#[derive(Serialize)]
struct CanonicalRequest<'a> {
    kind: &'static str,
    text: &'a str,
    max_results: Option<usize>,
    min_score: Option<u32>,
    file_globs: &'a [String],
    languages: &'a [String],
    node_type: Option<&'static str>,
    min_complexity: Option<u64>,
    max_complexity: Option<u64>,
    current_file: Option<&'a str>,
    selected_text: Option<&'a str>,
    recent_files: &'a [String],
    search_ef: Option<usize>,
    use_context_boosting: Option<bool>,
    include_similar: Option<bool>,
    corpus_epoch: u64,
}

/// Compute the cache key for a request at a given corpus epoch.
pub fn fingerprint(request: &QueryRequest, corpus_epoch: u64) -> String {
    let canonical = CanonicalRequest {
        kind: request.kind.as_str(),
        text: &request.text,
        max_results: request.max_results,
        // Floats hash via their bit patterns so 0.3 == 0.3 exactly.
        min_score: request.min_score.map(f32::to_bits),
        file_globs: &request.filters.file_globs,
        languages: &request.filters.languages,
        node_type: request.filters.node_type.map(|t| t.as_str()),
        min_complexity: request.filters.min_complexity.map(f64::to_bits),
        max_complexity: request.filters.max_complexity.map(f64::to_bits),
        current_file: request.context.current_file.as_deref(),
        selected_text: request.context.selected_text.as_deref(),
        recent_files: &request.context.recent_files,
        search_ef: request.options.search_ef,
        use_context_boosting: request.options.use_context_boosting,
        include_similar: request.options.include_similar,
        corpus_epoch,
    };

    let json = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    format!("{:x}", hasher.finalize())
}
