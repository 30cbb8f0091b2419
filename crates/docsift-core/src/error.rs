//! Typed failures at the capability boundaries.
//!
//! Storage and index backends report failures as [`anyhow::Error`]; the
//! pipeline wraps those in [`PipelineError::Store`]. Provider failures stay
//! typed so the pipeline can decide between recovering locally and
//! aborting.

use std::time::Duration;

use thiserror::Error;

/// Text extraction failed. Fatal for the document being ingested.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("unreadable document: {0}")]
    Unreadable(String),
    #[error("extraction engine failed: {0}")]
    Engine(String),
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
}

/// A summarizer or embedder call failed.
///
/// The pipeline recovers from these locally: a fallback summary for the
/// summarizer, a one-retry-then-skip policy for chunk embeddings.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No provider is configured. Never retried.
    #[error("provider disabled: {0}")]
    Disabled(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Disabled(_))
    }
}

/// Semantic search could not run (embedder or index unreachable).
///
/// Distinct from an empty result set.
#[derive(Debug, Error)]
#[error("semantic search unavailable: {reason}")]
pub struct SearchUnavailableError {
    pub reason: String,
}

impl SearchUnavailableError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by [`crate::pipeline::Pipeline`] operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed for document {document_id}: {source}")]
    Extraction {
        document_id: String,
        #[source]
        source: ExtractionError,
    },
    #[error("document not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
