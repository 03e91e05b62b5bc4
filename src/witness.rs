//! A witness is one version of a work's text, identified by (work, siglum).

use crate::tokenizer::Tokenizer;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// One textual exemplar of a work.
#[derive(Debug, Clone)]
pub struct Witness {
    work: String,
    siglum: String,
    content: String,
}

impl Witness {
    pub fn new(work: impl Into<String>, siglum: impl Into<String>, content: String) -> Self {
        Witness {
            work: work.into(),
            siglum: siglum.into(),
            content,
        }
    }

    pub fn work(&self) -> &str {
        &self.work
    }

    pub fn siglum(&self) -> &str {
        &self.siglum
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Hex SHA-256 digest of the raw content. Recomputed whenever content
    /// is re-read; the index store uses it to detect changed witnesses.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// The ordered token sequence of this witness's content.
    pub fn tokens(&self, tokenizer: &Tokenizer) -> Vec<String> {
        tokenizer
            .tokenize(&self.content)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn token_count(&self, tokenizer: &Tokenizer) -> u64 {
        tokenizer.tokenize(&self.content).len() as u64
    }

    /// Frequency map of n-grams of `size`, from a sliding window over the
    /// token sequence. Empty when the witness has fewer than `size` tokens.
    pub fn ngrams(&self, tokenizer: &Tokenizer, size: usize) -> HashMap<String, u64> {
        let tokens = self.tokens(tokenizer);
        ngram_counts(&tokens, tokenizer, size)
    }

    /// Frequency maps for every size in `[minimum, maximum]`, smallest first.
    pub fn ngrams_in_range(
        &self,
        tokenizer: &Tokenizer,
        minimum: usize,
        maximum: usize,
    ) -> Vec<(usize, HashMap<String, u64>)> {
        let tokens = self.tokens(tokenizer);
        debug!(
            work = %self.work,
            siglum = %self.siglum,
            minimum,
            maximum,
            "generating n-grams"
        );
        (minimum..=maximum)
            .map(|size| (size, ngram_counts(&tokens, tokenizer, size)))
            .collect()
    }
}

/// Frequency map of n-grams of `size` over `tokens`.
pub fn ngram_counts(
    tokens: &[String],
    tokenizer: &Tokenizer,
    size: usize,
) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    if size == 0 || tokens.len() < size {
        return counts;
    }
    for window in tokens.windows(size) {
        *counts.entry(tokenizer.join(window)).or_insert(0) += 1;
    }
    counts
}

/// Count the (possibly overlapping) occurrences of the token sequence
/// `needle` within `tokens`. Matching is on token boundaries, so a
/// space-joined n-gram cannot spuriously match across partial tokens.
pub fn occurrences(tokens: &[String], needle: &[String]) -> u64 {
    if needle.is_empty() || tokens.len() < needle.len() {
        return 0;
    }
    tokens
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TokenizerProfile;

    fn cbeta() -> Tokenizer {
        Tokenizer::from_profile(TokenizerProfile::Cbeta)
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        let a = Witness::new("T1", "base", "then we went".to_string());
        let b = Witness::new("T1", "base", "then we went".to_string());
        let c = Witness::new("T1", "base", "then we wend".to_string());
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn ngram_counts_sliding_window() {
        let witness = Witness::new("T1", "base", "abab".to_string());
        let counts = witness.ngrams(&cbeta(), 2);
        assert_eq!(counts.get("ab"), Some(&2));
        assert_eq!(counts.get("ba"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn ngram_counts_self_overlapping() {
        // "aaaa" has three overlapping "aa" occurrences.
        let witness = Witness::new("T1", "base", "aaaa".to_string());
        let counts = witness.ngrams(&cbeta(), 2);
        assert_eq!(counts.get("aa"), Some(&3));
    }

    #[test]
    fn ngram_counts_size_exceeds_tokens() {
        let witness = Witness::new("T1", "base", "ab".to_string());
        assert!(witness.ngrams(&cbeta(), 3).is_empty());
    }

    #[test]
    fn ngrams_in_range_covers_all_sizes() {
        let witness = Witness::new("T1", "base", "abc".to_string());
        let all = witness.ngrams_in_range(&cbeta(), 1, 3);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0, 1);
        assert_eq!(all[2].1.get("abc"), Some(&1));
    }

    #[test]
    fn occurrences_counts_overlaps() {
        let tokens: Vec<String> = "aaaa".chars().map(|c| c.to_string()).collect();
        let needle: Vec<String> = "aa".chars().map(|c| c.to_string()).collect();
        assert_eq!(occurrences(&tokens, &needle), 3);
    }

    #[test]
    fn occurrences_respects_token_boundaries() {
        let tokens = vec!["ab".to_string(), "c".to_string()];
        let needle = vec!["b".to_string(), "c".to_string()];
        assert_eq!(occurrences(&tokens, &needle), 0);
    }
}
