//! Semantic chunk search and whole-word keyword matching.

use std::time::Duration;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::SearchUnavailableError;
use crate::index::{VectorIndex, VectorKind};
use crate::models::{KeywordHit, SearchHit};
use crate::store::DocumentStore;

/// Maximum snippet length in characters.
const SNIPPET_CHARS: usize = 240;

/// Embed `query` and return the nearest chunks, best first.
///
/// An empty query or `top_k == 0` returns no hits without calling the
/// embedder. Hits whose document no longer exists are dropped.
pub async fn semantic_search(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    store: &dyn DocumentStore,
    query: &str,
    top_k: usize,
    call_timeout: Duration,
) -> Result<Vec<SearchHit>, SearchUnavailableError> {
    let query = query.trim();
    if query.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }

    let vector = tokio::time::timeout(call_timeout, embedder.embed(query))
        .await
        .map_err(|_| {
            SearchUnavailableError::new(format!(
                "embedding the query timed out after {:?}",
                call_timeout
            ))
        })?
        .map_err(|e| SearchUnavailableError::new(format!("embedding the query failed: {}", e)))?;

    let matches = index
        .query(&vector, top_k, VectorKind::Chunk, None)
        .await
        .map_err(|e| SearchUnavailableError::new(format!("vector index query failed: {:#}", e)))?;

    let mut hits = Vec::with_capacity(matches.len());
    for m in matches {
        let Some(chunk_index) = m.key.chunk_index() else {
            continue;
        };
        let document_id = m.key.document_id();
        let doc = store
            .get_document(document_id)
            .await
            .map_err(|e| SearchUnavailableError::new(format!("store lookup failed: {:#}", e)))?;
        let Some(doc) = doc else {
            debug!(document_id, "dropping hit for deleted document");
            continue;
        };
        hits.push(SearchHit {
            document_id: doc.id,
            filename: doc.filename,
            chunk_index,
            score: m.score,
            snippet: truncate_chars(&m.text, SNIPPET_CHARS),
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    Ok(hits)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Case-insensitive whole-word occurrences of `term` in `content`.
///
/// A multi-word term counts occurrences of the word sequence.
pub fn count_term_occurrences(content: &str, term: &str) -> usize {
    let needle = tokenize(term);
    if needle.is_empty() {
        return 0;
    }
    let haystack = tokenize(content);
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle.as_slice())
        .count()
}

/// A short excerpt of `content` around the first match of `term`.
pub fn snippet_around(content: &str, term: &str) -> String {
    let lowered = content.to_lowercase();
    let first_word = tokenize(term).into_iter().next().unwrap_or_default();
    // lowercasing can change byte lengths, so only trust positions that
    // still land on a boundary of the original text
    let start = lowered
        .find(&first_word)
        .filter(|&pos| lowered.len() == content.len() && content.is_char_boundary(pos))
        .map(|pos| {
            let mut s = pos.saturating_sub(SNIPPET_CHARS / 3);
            while !content.is_char_boundary(s) {
                s -= 1;
            }
            s
        })
        .unwrap_or(0);
    let excerpt = truncate_chars(content[start..].trim_start(), SNIPPET_CHARS);
    if start > 0 {
        format!("...{}", excerpt)
    } else {
        excerpt
    }
}

/// Sort by occurrences desc, then filename, then id; keep `limit`.
pub fn rank_keyword_hits(mut hits: Vec<KeywordHit>, limit: usize) -> Vec<KeywordHit> {
    hits.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.filename.cmp(&b.filename))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    hits.truncate(limit);
    hits
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_whole_words_only() {
        assert_eq!(count_term_occurrences("cat catalog Cat. CAT!", "cat"), 3);
        assert_eq!(count_term_occurrences("concatenate", "cat"), 0);
    }

    #[test]
    fn test_count_phrase() {
        let text = "New York is big. I love new york. york new";
        assert_eq!(count_term_occurrences(text, "new york"), 2);
    }

    #[test]
    fn test_blank_term_matches_nothing() {
        assert_eq!(count_term_occurrences("anything", "  "), 0);
    }

    #[test]
    fn test_snippet_starts_near_match() {
        let content = format!("{} needle {}", "x ".repeat(300), "y ".repeat(300));
        let snippet = snippet_around(&content, "needle");
        assert!(snippet.starts_with("..."));
        assert!(snippet.contains("needle"));
    }

    #[test]
    fn test_snippet_short_content() {
        assert_eq!(snippet_around("short text", "text"), "short text");
    }

    #[test]
    fn test_rank_keyword_hits() {
        let hit = |id: &str, name: &str, n: usize| KeywordHit {
            document_id: id.into(),
            filename: name.into(),
            occurrences: n,
            snippet: String::new(),
        };
        let ranked = rank_keyword_hits(
            vec![hit("1", "b.txt", 2), hit("2", "a.txt", 2), hit("3", "c.txt", 5)],
            2,
        );
        let ids: Vec<&str> = ranked.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }
}
