//! Lexical scoring: the vector-free ranking path.
//!
//! Used directly by the `signature` and `lexical` strategies and as the
//! fallback when the vector path is unavailable or yields nothing. Scoring is
//! a fixed additive scheme over case-insensitive substring checks:
//!
//! - `+1.0` signature equals the query, `+0.7` signature contains it
//! - `+0.8` node_type equals the query, `+0.5` query contains the node_type
//! - `+0.3` summary contains the query
//! - `+0.3` snippet contains the query (lexical scope only)
//! - `+0.2` when the node type is a named entity (function/class/method/variable)
//!
//! clamped to [0, 1]. Corpus-wide scans parallelise with rayon.

use rayon::prelude::*;

use astir_core::{sort_matches, Annotation, AnnotationMatch, MatchReason};

/// Which textual fields participate in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalScope {
    /// Signature, summary and node type only.
    Signature,
    /// Signature, summary, node type and source snippet.
    Full,
}

/// Score one annotation against a lowercased query.
pub fn score(query_lower: &str, annotation: &Annotation, scope: LexicalScope) -> f32 {
    if query_lower.is_empty() {
        return 0.0;
    }

    let mut score = 0.0f32;

    let signature = annotation.signature.to_lowercase();
    if signature == query_lower {
        score += 1.0;
    } else if signature.contains(query_lower) {
        score += 0.7;
    }

    let node_type = annotation.node_type.as_str();
    if node_type == query_lower {
        score += 0.8;
    } else if query_lower.contains(node_type) {
        score += 0.5;
    }

    if annotation.summary.to_lowercase().contains(query_lower) {
        score += 0.3;
    }

    if scope == LexicalScope::Full
        && annotation.source_snippet.to_lowercase().contains(query_lower)
    {
        score += 0.3;
    }

    if annotation.node_type.is_named_entity() {
        score += 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// Rank a set of annotations lexically.
///
/// Returns matches at or above `min_score`, deterministically ordered. The
/// caller has already applied filters; this only scores and sorts.
pub fn rank(
    query: &str,
    annotations: Vec<Annotation>,
    scope: LexicalScope,
    min_score: f32,
    reason: MatchReason,
) -> Vec<AnnotationMatch> {
    let query_lower = query.trim().to_lowercase();

    let mut matches: Vec<AnnotationMatch> = annotations
        .into_par_iter()
        .filter_map(|annotation| {
            let s = score(&query_lower, &annotation, scope);
            if s >= min_score {
                Some(AnnotationMatch::new(annotation, s, reason))
            } else {
                None
            }
        })
        .collect();

    sort_matches(&mut matches);
    matches
}
