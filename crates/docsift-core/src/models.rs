//! Core data models shared by the store, the pipeline, and the app crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a document's stored summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryProvenance {
    /// Produced by the configured summarization model.
    ModelGenerated,
    /// Extractive summary used because the model failed or timed out.
    Fallback,
    /// The text was empty or too short to summarize.
    Placeholder,
}

impl SummaryProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryProvenance::ModelGenerated => "model_generated",
            SummaryProvenance::Fallback => "fallback",
            SummaryProvenance::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for SummaryProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryProvenance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_generated" => Ok(SummaryProvenance::ModelGenerated),
            "fallback" => Ok(SummaryProvenance::Fallback),
            "placeholder" => Ok(SummaryProvenance::Placeholder),
            other => anyhow::bail!("unknown summary provenance: {}", other),
        }
    }
}

/// Lifecycle state of an ingested document.
///
/// `Pending` while the pipeline runs, then exactly one of the terminal
/// states. `Degraded` means the document is stored and searchable but some
/// stage recovered locally (fallback summary, skipped chunks, skipped
/// duplicate detection); the reasons are in [`Document::warnings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Complete,
    Degraded,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Degraded => "degraded",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "complete" => Ok(DocumentStatus::Complete),
            "degraded" => Ok(DocumentStatus::Degraded),
            "failed" => Ok(DocumentStatus::Failed),
            other => anyhow::bail!("unknown document status: {}", other),
        }
    }
}

/// Fields known before extraction starts.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub storage_path: String,
    pub content_type: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub content_hash: String,
}

/// A stored document record.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub storage_path: String,
    pub content_type: String,
    pub content_hash: String,
    /// Cleaned extracted text. Empty when nothing could be extracted.
    pub content: String,
    pub summary: Option<String>,
    pub summary_provenance: Option<SummaryProvenance>,
    pub tags: Vec<String>,
    pub status: DocumentStatus,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contiguous piece of a document's cleaned text.
///
/// `(document_id, chunk_index)` is the identity of a chunk; indices are
/// contiguous from 0 in text order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub hash: String,
}

/// An undirected near-duplicate relation between two documents.
///
/// Always stored with `file_id1 < file_id2`; construct it through
/// [`DuplicateLink::new`] so the ordering holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateLink {
    pub file_id1: String,
    pub file_id2: String,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

impl DuplicateLink {
    /// Build a link in canonical order. Returns `None` for a self-pair.
    pub fn new(a: &str, b: &str, score: f32) -> Option<Self> {
        let (file_id1, file_id2) = canonical_pair(a, b)?;
        Some(Self {
            file_id1,
            file_id2,
            score,
            created_at: Utc::now(),
        })
    }

    /// The document on the other side of the link from `document_id`.
    pub fn other(&self, document_id: &str) -> &str {
        if self.file_id1 == document_id {
            &self.file_id2
        } else {
            &self.file_id1
        }
    }
}

/// Sort a pair of ids so that the smaller one comes first.
pub fn canonical_pair(a: &str, b: &str) -> Option<(String, String)> {
    match a.cmp(b) {
        std::cmp::Ordering::Less => Some((a.to_string(), b.to_string())),
        std::cmp::Ordering::Greater => Some((b.to_string(), a.to_string())),
        std::cmp::Ordering::Equal => None,
    }
}

/// One semantic search result: a chunk and the document it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub score: f32,
    pub snippet: String,
}

/// One keyword search result.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordHit {
    pub document_id: String,
    pub filename: String,
    /// Number of whole-word occurrences of the term in the content.
    pub occurrences: usize,
    pub snippet: String,
}

/// A document whose centroid is close to another document's centroid.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarDocument {
    pub document_id: String,
    pub filename: String,
    pub score: f32,
}
