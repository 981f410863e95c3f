//! Composable annotation filters.
//!
//! [`AnnotationFilter`] is the predicate set accepted by
//! [`AnnotationStore::query`](super::AnnotationStore::query) and reused by the
//! query processor when post-filtering vector candidates. File patterns are
//! compiled once into a [`PathPattern`]; regex syntax is tried first, and a
//! pattern that is not a valid regex is retried as a glob, so both
//! `^src/utils/` and `src/utils/**` select the same subtree.

use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Annotation, NodeType};

/// A compiled file-path pattern: regex first, glob as fallback.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Regex(Regex),
    Glob(GlobMatcher),
}

impl PathPattern {
    /// Compile a pattern string. Regex wins; invalid regex falls back to glob.
    pub fn compile(pattern: &str) -> Result<Self, StoreError> {
        match Regex::new(pattern) {
            Ok(re) => Ok(PathPattern::Regex(re)),
            Err(regex_err) => match Glob::new(pattern) {
                Ok(glob) => Ok(PathPattern::Glob(glob.compile_matcher())),
                Err(_) => Err(StoreError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: regex_err.to_string(),
                }),
            },
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        match self {
            PathPattern::Regex(re) => re.is_match(path),
            PathPattern::Glob(glob) => glob.is_match(path),
        }
    }

    /// Literal path prefix implied by the pattern, if one can be extracted.
    ///
    /// Used to turn `^src/utils/` into an indexed range scan on `file_path`
    /// before the exact match runs in Rust. Returns `None` when the pattern
    /// starts with a metacharacter and no useful prefix exists.
    pub fn literal_prefix(&self) -> Option<String> {
        match self {
            PathPattern::Regex(re) => {
                let src = re.as_str();
                let src = src.strip_prefix('^')?;
                let mut prefix = String::new();
                for c in src.chars() {
                    // Stop at the first regex metacharacter.
                    if "\\.+*?()|[]{}^$".contains(c) {
                        break;
                    }
                    prefix.push(c);
                }
                if prefix.is_empty() {
                    None
                } else {
                    Some(prefix)
                }
            }
            PathPattern::Glob(glob) => {
                let src = glob.glob().glob();
                let mut prefix = String::new();
                for c in src.chars() {
                    if "*?[]{}".contains(c) {
                        break;
                    }
                    prefix.push(c);
                }
                if prefix.is_empty() {
                    None
                } else {
                    Some(prefix)
                }
            }
        }
    }
}

/// Predicate set for store queries. All fields are conjunctive; `None` means
/// "no constraint". Serialises into request fingerprints, so field order and
/// names are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationFilter {
    /// File-path patterns; an annotation passes if it matches any of them.
    pub file_globs: Vec<String>,
    /// Language labels; an annotation passes if its language is listed.
    pub languages: Vec<String>,
    /// Required node type.
    pub node_type: Option<NodeType>,
    /// Inclusive lower bound on complexity_score.
    pub min_complexity: Option<f64>,
    /// Inclusive upper bound on complexity_score.
    pub max_complexity: Option<f64>,
}

impl AnnotationFilter {
    pub fn is_empty(&self) -> bool {
        self.file_globs.is_empty()
            && self.languages.is_empty()
            && self.node_type.is_none()
            && self.min_complexity.is_none()
            && self.max_complexity.is_none()
    }

    /// Compile the file patterns once for repeated matching.
    pub fn compile_patterns(&self) -> Result<Vec<PathPattern>, StoreError> {
        self.file_globs.iter().map(|p| PathPattern::compile(p)).collect()
    }

    /// Check the non-path predicates against an annotation.
    pub fn matches_scalar(&self, annotation: &Annotation) -> bool {
        if let Some(ty) = self.node_type {
            if annotation.node_type != ty {
                return false;
            }
        }
        if !self.languages.is_empty()
            && !self
                .languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&annotation.language))
        {
            return false;
        }
        if let Some(min) = self.min_complexity {
            if annotation.complexity_score < min {
                return false;
            }
        }
        if let Some(max) = self.max_complexity {
            if annotation.complexity_score > max {
                return false;
            }
        }
        true
    }

    /// Full check: scalar predicates plus pre-compiled path patterns.
    pub fn matches(&self, annotation: &Annotation, patterns: &[PathPattern]) -> bool {
        if !self.matches_scalar(annotation) {
            return false;
        }
        if patterns.is_empty() {
            return true;
        }
        patterns.iter().any(|p| p.is_match(&annotation.file_path))
    }

    /// Human-readable names of the active predicates, for response metadata.
    pub fn applied_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if !self.file_globs.is_empty() {
            names.push("file_glob".to_string());
        }
        if !self.languages.is_empty() {
            names.push("language".to_string());
        }
        if self.node_type.is_some() {
            names.push("node_type".to_string());
        }
        if self.min_complexity.is_some() {
            names.push("min_complexity".to_string());
        }
        if self.max_complexity.is_some() {
            names.push("max_complexity".to_string());
        }
        names
    }
}
