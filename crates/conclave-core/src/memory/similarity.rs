//! Text similarity used for knowledge deduplication and recall matching.

use std::collections::BTreeSet;

/// Decides whether new content restates existing knowledge.
pub trait SimilarityStrategy: Send + Sync {
    fn is_similar(&self, existing: &str, candidate: &str) -> bool;
}

/// Shorter tokens are ignored by [`keywords`].
pub const MIN_KEYWORD_LEN: usize = 4;

/// Lowercased tokens of at least [`MIN_KEYWORD_LEN`] characters.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// True if any keyword occurs in `text` (case-insensitive).
///
/// An empty keyword set matches everything.
pub fn matches_any(keywords: &BTreeSet<String>, text: &str) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let haystack = text.to_lowercase();
    keywords.iter().any(|keyword| haystack.contains(keyword.as_str()))
}

/// Default strategy: at least one shared keyword.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordOverlap;

impl SimilarityStrategy for KeywordOverlap {
    fn is_similar(&self, existing: &str, candidate: &str) -> bool {
        let candidate = keywords(candidate);
        if candidate.is_empty() {
            return false;
        }
        !keywords(existing).is_disjoint(&candidate)
    }
}
