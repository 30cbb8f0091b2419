//! Summarizer capability and the local summary helpers.
//!
//! The model-backed [`Summarizer`] lives behind a trait; this module owns
//! everything the pipeline does without it: sentence splitting, removal of
//! near-duplicate sentences from model output, sentence limits per
//! [`SummaryMode`], and the extractive fallback.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Summary stored for documents with no extractable text.
pub const PLACEHOLDER_SUMMARY: &str = "No extractable text found in this document.";

/// Character cap of the extractive fallback (before the `...` marker).
pub const FALLBACK_MAX_CHARS: usize = 400;

/// Word-set overlap at which two sentences count as near-duplicates.
const SENTENCE_OVERLAP: f64 = 0.8;

/// Requested summary length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    #[default]
    Short,
    Medium,
    Long,
}

impl SummaryMode {
    /// Maximum sentences kept for this mode.
    pub fn sentence_limit(&self) -> usize {
        match self {
            SummaryMode::Short => 1,
            SummaryMode::Medium => 2,
            SummaryMode::Long => 4,
        }
    }

    /// Rough output budget in tokens, handed to model prompts.
    pub fn max_tokens(&self) -> usize {
        match self {
            SummaryMode::Short => 80,
            SummaryMode::Medium => 160,
            SummaryMode::Long => 260,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::Short => "short",
            SummaryMode::Medium => "medium",
            SummaryMode::Long => "long",
        }
    }
}

impl fmt::Display for SummaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(SummaryMode::Short),
            "medium" => Ok(SummaryMode::Medium),
            "long" => Ok(SummaryMode::Long),
            other => anyhow::bail!(
                "unknown summary mode '{}': expected short, medium, or long",
                other
            ),
        }
    }
}

/// A model that condenses text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Identifier of the backing model, for logs.
    fn model_name(&self) -> &str;

    async fn summarize(&self, text: &str, mode: SummaryMode) -> Result<String, ProviderError>;
}

/// Split text after `.`, `!`, or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;
    for (i, c) in text.char_indices() {
        if prev_terminal && c.is_whitespace() {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i;
        }
        prev_terminal = matches!(c, '.' | '!' | '?');
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn word_set(sentence: &str) -> HashSet<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn too_similar(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let shared = a.intersection(b).count() as f64;
    shared / a.len().min(b.len()) as f64 >= SENTENCE_OVERLAP
}

/// Drop sentences whose words mostly repeat an earlier kept sentence.
///
/// Order is preserved; the result is the kept sentences joined by spaces.
pub fn dedupe_sentences(text: &str) -> String {
    let mut kept: Vec<(&str, HashSet<String>)> = Vec::new();
    for sentence in split_sentences(text) {
        let words = word_set(sentence);
        if kept.iter().any(|(_, seen)| too_similar(&words, seen)) {
            continue;
        }
        kept.push((sentence, words));
    }
    kept.iter().map(|(s, _)| *s).collect::<Vec<_>>().join(" ")
}

/// Keep at most `limit` leading sentences.
pub fn limit_sentences(text: &str, limit: usize) -> String {
    split_sentences(text)
        .into_iter()
        .take(limit.max(1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extractive summary used when the model is unavailable.
///
/// Takes the first sentences allowed by `mode`; if that is still longer
/// than [`FALLBACK_MAX_CHARS`] characters it is cut there and `...` is
/// appended. Non-empty for non-empty input.
pub fn fallback_summary(text: &str, mode: SummaryMode) -> String {
    let lead = limit_sentences(text.trim(), mode.sentence_limit());
    let lead = if lead.is_empty() { text.trim() } else { lead.as_str() };
    truncate_chars(lead, FALLBACK_MAX_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
