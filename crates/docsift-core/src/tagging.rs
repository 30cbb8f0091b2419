//! Frequency-based keyword tagging.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Default number of tags attached to a document.
pub const DEFAULT_MAX_TAGS: usize = 8;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "this", "from", "have", "will", "your", "about", "there",
    "their", "what", "which", "when", "where", "then", "them", "they", "into", "been", "were",
    "such", "than", "also", "only", "some", "more", "most", "like", "very", "just", "over",
    "because", "while", "shall", "should", "could", "would", "cannot", "cant", "dont", "doesnt",
    "isnt", "wasnt", "these", "those", "each", "other", "being", "here", "upon", "does",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Derive up to `max_tags` lowercase tags from `text`.
///
/// Candidate words are maximal runs of at least four ASCII letters. Stop
/// words are dropped; the rest are ranked by frequency, ties broken
/// alphabetically. Tags never contain commas or whitespace.
pub fn generate_tags(text: &str, max_tags: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut freq: HashMap<&str, usize> = HashMap::new();

    for word in lowered.split(|c: char| !c.is_ascii_alphabetic()) {
        if word.len() < 4 || stopwords().contains(word) {
            continue;
        }
        *freq.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(max_tags)
        .map(|(word, _)| word.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_by_frequency_then_alpha() {
        let tags = generate_tags(
            "Invoice invoice INVOICE payment payment total vendor",
            8,
        );
        assert_eq!(tags, vec!["invoice", "payment", "total", "vendor"]);
    }

    #[test]
    fn test_stopwords_and_short_words_dropped() {
        let tags = generate_tags("this that with the cat ran from there", 8);
        assert!(tags.is_empty());
    }

    #[test]
    fn test_max_tags_respected() {
        let text = "alpha bravo charlie delta echoes foxtrot golfer hotel india juliet";
        assert_eq!(generate_tags(text, 3).len(), 3);
        assert!(generate_tags(text, 0).is_empty());
    }

    #[test]
    fn test_non_ascii_splits_words() {
        let tags = generate_tags("café-report naïve report", 8);
        assert_eq!(tags, vec!["report"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(generate_tags("", 8).is_empty());
    }
}
