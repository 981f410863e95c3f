//! Text normalisation and content hashing.
//!
//! Embedding input is whitespace-normalised before tokenization so that
//! formatting-only edits do not produce new vectors, and the content hash of
//! the normalised text is what ingest stores next to each vector for
//! staleness detection.

use sha2::{Digest, Sha256};

/// Collapse all whitespace runs to single spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for c in text.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
        } else {
            if in_whitespace && !out.is_empty() {
                out.push(' ');
            }
            in_whitespace = false;
            out.push(c);
        }
    }
    out
}

/// SHA-256 of the normalised text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize_text("  fn   main()\n\t{}  "), "fn main() {}");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn hash_ignores_formatting() {
        assert_eq!(content_hash("parse  json"), content_hash("parse\njson"));
        assert_ne!(content_hash("parse json"), content_hash("parse yaml"));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let h = content_hash("x");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
