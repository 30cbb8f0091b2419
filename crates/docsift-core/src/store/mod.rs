//! Relational storage abstraction.
//!
//! The [`DocumentStore`] owns document records, their tags, and duplicate
//! links. Vectors live in the [`crate::index::VectorIndex`]. Backends:
//! [`memory::InMemoryStore`] here and `SqliteStore` in the app crate.
//!
//! Implementations must be `Send + Sync`; every write is keyed by document
//! id so concurrent ingestions never touch each other's rows.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Document, DocumentStatus, DuplicateLink, KeywordHit, NewDocument, SummaryProvenance,
};

/// Result of inserting a duplicate link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new link was stored.
    Inserted,
    /// The unordered pair was already linked; nothing changed.
    Conflict,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a provisional `Pending` document and return it with its id.
    async fn create_document(&self, new: &NewDocument) -> Result<Document>;

    /// Mark a document `Failed`, recording `reason` as its only warning.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()>;

    /// Store the cleaned extracted text (and index it for keyword search).
    async fn set_content(&self, id: &str, content: &str) -> Result<()>;

    async fn set_summary(
        &self,
        id: &str,
        summary: &str,
        provenance: SummaryProvenance,
    ) -> Result<()>;

    /// Replace the document's tag set.
    async fn set_tags(&self, id: &str, tags: &[String]) -> Result<()>;

    /// Set the terminal status and the warnings gathered on the way.
    async fn finish_document(
        &self,
        id: &str,
        status: DocumentStatus,
        warnings: &[String],
    ) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// All documents, newest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Delete a document, its tags, and every link naming it.
    ///
    /// Returns `false` when no such document existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Documents with a tag containing `tag` (case-insensitive).
    async fn documents_by_tag(&self, tag: &str) -> Result<Vec<Document>>;

    /// Documents containing `term` as a whole word, most occurrences first.
    async fn keyword_search(&self, term: &str, limit: usize) -> Result<Vec<KeywordHit>>;

    /// Insert a link unless its unordered pair is already present.
    ///
    /// Self-links are rejected with an error.
    async fn insert_duplicate_link(&self, link: &DuplicateLink) -> Result<LinkOutcome>;

    /// Links naming `document_id` on either side, highest score first.
    async fn duplicate_links(&self, document_id: &str) -> Result<Vec<DuplicateLink>>;
}
