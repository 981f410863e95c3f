//! Context boosting for semantic results.
//!
//! Boosts are additive on top of the weighted similarity: the final score is
//! `clamp(0.7 * sim + Σboosts, 0, 1)` with the boost sum capped so that
//! context can reorder near-ties but never drown out similarity.

use serde::{Deserialize, Serialize};

use astir_core::Annotation;

use crate::request::QueryContext;

/// Boost weights. Defaults follow the engine-wide ranking contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostWeights {
    /// Weight on raw cosine similarity.
    pub similarity: f32,
    /// Bonus when the annotation lives in the file open in the editor.
    pub current_file: f32,
    /// Bonus when the selection fuzzy-matches the signature.
    pub selected_text: f32,
    /// Bonus when the annotation's file was recently visited.
    pub recent_files: f32,
    /// Bonus when the query names the annotation's language.
    pub language: f32,
    /// Cap on the summed context bonuses.
    pub context_cap: f32,
}

impl Default for BoostWeights {
    fn default() -> Self {
        Self {
            similarity: 0.7,
            current_file: 0.25,
            selected_text: 0.2,
            recent_files: 0.1,
            language: 0.1,
            context_cap: 0.65,
        }
    }
}

/// Minimum normalised Levenshtein similarity for a selection to count as
/// matching a signature.
const FUZZY_MATCH_THRESHOLD: f32 = 0.7;

/// Compute the total context boost for one annotation.
///
/// Returns 0.0 when no context applies; callers use a non-zero boost to mark
/// the match reason as context-boosted.
pub fn context_boost(
    weights: &BoostWeights,
    context: &QueryContext,
    query_language: Option<&str>,
    annotation: &Annotation,
) -> f32 {
    let mut boost = 0.0f32;

    if let Some(ref current) = context.current_file {
        if annotation.file_path == *current {
            boost += weights.current_file;
        }
    }

    if let Some(ref selected) = context.selected_text {
        if fuzzy_similarity(&annotation.signature, selected) >= FUZZY_MATCH_THRESHOLD {
            boost += weights.selected_text;
        }
    }

    if !context.recent_files.is_empty()
        && context.recent_files.iter().any(|f| *f == annotation.file_path)
    {
        boost += weights.recent_files;
    }

    if let Some(lang) = query_language {
        if lang.eq_ignore_ascii_case(&annotation.language) {
            boost += weights.language;
        }
    }

    boost.min(weights.context_cap)
}

/// Final score: weighted similarity plus capped boosts, clamped to [0, 1].
pub fn boosted_score(weights: &BoostWeights, similarity: f32, boost: f32) -> f32 {
    (weights.similarity * similarity + boost).clamp(0.0, 1.0)
}

/// Normalised Levenshtein similarity in [0, 1] over lowercased input.
pub fn fuzzy_similarity(a: &str, b: &str) -> f32 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a, &b);
    1.0 - distance as f32 / max_len as f32
}

/// Classic two-row Levenshtein over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Language labels inferable from query text, matched on word boundaries.
const LANGUAGE_KEYWORDS: &[(&str, &str)] = &[
    ("rust", "rust"),
    ("typescript", "typescript"),
    ("ts", "typescript"),
    ("javascript", "javascript"),
    ("js", "javascript"),
    ("python", "python"),
    ("py", "python"),
    ("golang", "go"),
    ("go", "go"),
    ("java", "java"),
    ("csharp", "csharp"),
    ("c#", "csharp"),
    ("cpp", "cpp"),
    ("c++", "cpp"),
];

/// Infer a language label from the query text, if it names one.
pub fn infer_language(query: &str) -> Option<&'static str> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':' || c == ';')
        .collect();
    for (keyword, label) in LANGUAGE_KEYWORDS {
        if words.iter().any(|w| w == keyword) {
            return Some(label);
        }
    }
    None
}
