//! The document ingestion pipeline.
//!
//! [`Pipeline::ingest`] runs one upload through, in order:
//!
//! 1. provisional record (`Pending`)
//! 2. text extraction (fatal on failure: record marked `Failed`)
//! 3. normalization and summary (model, extractive fallback, or placeholder)
//! 4. chunking and chunk embedding with bounded parallelism
//! 5. centroid upsert
//! 6. tagging
//! 7. duplicate detection
//! 8. terminal status: `Complete`, or `Degraded` with warnings
//!
//! Every step after extraction recovers locally and records a warning
//! instead of failing the document. The pipeline holds shared capability
//! handles and is cheap to share behind an `Arc` across concurrent
//! ingestions.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, sha256_hex};
use crate::dedup::{self, DedupSettings, DuplicateMatch};
use crate::embedding::{centroid, Embedder};
use crate::error::{ExtractionError, PipelineError, ProviderError, SearchUnavailableError};
use crate::extract::TextExtractor;
use crate::index::{VectorIndex, VectorKey, VectorKind, VectorPoint};
use crate::models::{
    Chunk, Document, DocumentStatus, DuplicateLink, KeywordHit, NewDocument, SearchHit,
    SimilarDocument, SummaryProvenance,
};
use crate::preprocess::clean_text;
use crate::search;
use crate::store::DocumentStore;
use crate::summary::{
    dedupe_sentences, fallback_summary, limit_sentences, SummaryMode, Summarizer,
    PLACEHOLDER_SUMMARY,
};
use crate::tagging::{generate_tags, DEFAULT_MAX_TAGS};

/// Tunables for [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub summary_mode: SummaryMode,
    /// Texts shorter than this (in characters) are not sent to the summarizer.
    pub min_summary_chars: usize,
    pub max_tags: usize,
    /// Maximum chunk embeddings in flight per document.
    pub embed_concurrency: usize,
    /// Pause before the single retry of a failed chunk embedding.
    pub embed_retry_backoff: Duration,
    /// Timeout applied to every summarizer and embedder call.
    pub call_timeout: Duration,
    pub extract_timeout: Duration,
    pub dedup: DedupSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            overlap_tokens: 16,
            summary_mode: SummaryMode::Short,
            min_summary_chars: 64,
            max_tags: DEFAULT_MAX_TAGS,
            embed_concurrency: 4,
            embed_retry_backoff: Duration::from_millis(500),
            call_timeout: Duration::from_secs(60),
            extract_timeout: Duration::from_secs(120),
            dedup: DedupSettings::default(),
        }
    }
}

/// One uploaded file handed to [`Pipeline::ingest`].
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub bytes: &'a [u8],
    pub filename: &'a str,
    /// Declared MIME type.
    pub content_type: &'a str,
    /// Where the caller persisted the original bytes.
    pub storage_path: &'a str,
}

/// What a finished ingestion produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: Document,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub duplicates: Vec<DuplicateMatch>,
}

/// Result of rebuilding one document's vectors.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub document_id: String,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub warnings: Vec<String>,
}

/// An on-demand summary; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct OnDemandSummary {
    pub document_id: String,
    pub mode: SummaryMode,
    pub summary: String,
    pub provenance: SummaryProvenance,
}

struct EmbeddedChunks {
    vectors: Vec<Vec<f32>>,
    warnings: Vec<String>,
}

pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            embedder,
            store,
            index,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Ingest one upload. See the module docs for the step order.
    ///
    /// Returns [`PipelineError::Extraction`] when no text could be read;
    /// the document record then stays in the store as `Failed`. A store
    /// write failure after the record exists also leaves it `Failed`. Every
    /// other provider problem yields a `Degraded` document.
    pub async fn ingest(&self, upload: Upload<'_>) -> Result<IngestReport, PipelineError> {
        let new_doc = NewDocument {
            filename: upload.filename.to_string(),
            storage_path: upload.storage_path.to_string(),
            content_type: upload.content_type.to_string(),
            content_hash: sha256_hex(upload.bytes),
        };
        let doc = self.store.create_document(&new_doc).await?;
        let id = doc.id;
        info!(
            document_id = %id,
            filename = upload.filename,
            content_type = upload.content_type,
            bytes = upload.bytes.len(),
            "ingesting document"
        );

        match self.process(&id, upload).await {
            Err(PipelineError::Store(err)) => {
                warn!(document_id = %id, error = %err, "store write failed mid-ingest");
                if let Err(mark_err) = self.store.mark_failed(&id, &format!("{:#}", err)).await {
                    warn!(document_id = %id, error = %mark_err, "could not mark document failed");
                }
                Err(PipelineError::Store(err))
            }
            other => other,
        }
    }

    /// Steps 2-8 of [`Pipeline::ingest`] for the provisional record `id`.
    async fn process(&self, id: &str, upload: Upload<'_>) -> Result<IngestReport, PipelineError> {
        let raw = match self.extract(upload.bytes, upload.content_type).await {
            Ok(text) => text,
            Err(err) => {
                warn!(document_id = %id, error = %err, "extraction failed");
                self.store.mark_failed(id, &err.to_string()).await?;
                return Err(PipelineError::Extraction {
                    document_id: id.to_string(),
                    source: err,
                });
            }
        };

        let content = clean_text(&raw);
        self.store.set_content(id, &content).await?;

        let mut warnings = Vec::new();
        let (summary, provenance) = self.summarize_for_ingest(id, &content, &mut warnings).await;
        self.store.set_summary(id, &summary, provenance).await?;

        let chunks = self.chunk(id, &content);
        let embedded = self.embed_and_index(id, upload.filename, &chunks).await;
        warnings.extend(embedded.warnings);
        let centroid_vector = self
            .upsert_centroid(id, upload.filename, &embedded.vectors, &mut warnings)
            .await;

        let tag_source = if provenance == SummaryProvenance::Placeholder {
            chunks.first().map(|c| c.text.as_str()).unwrap_or("")
        } else {
            summary.as_str()
        };
        let tags = generate_tags(tag_source, self.settings.max_tags);
        self.store.set_tags(id, &tags).await?;

        let duplicates = match &centroid_vector {
            Some(vector) => {
                match dedup::find_duplicates(
                    self.store.as_ref(),
                    self.index.as_ref(),
                    id,
                    vector,
                    &self.settings.dedup,
                )
                .await
                {
                    Ok(found) => found,
                    Err(err) => {
                        warn!(document_id = %id, error = %err, "duplicate detection failed");
                        warnings.push(format!("duplicate detection failed: {:#}", err));
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let status = if warnings.is_empty() {
            DocumentStatus::Complete
        } else {
            DocumentStatus::Degraded
        };
        self.store.finish_document(id, status, &warnings).await?;
        info!(
            document_id = %id,
            status = %status,
            chunks = chunks.len(),
            embedded = embedded.vectors.len(),
            duplicates = duplicates.len(),
            "ingestion finished"
        );

        let document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        Ok(IngestReport {
            document,
            chunks: chunks.len(),
            embedded_chunks: embedded.vectors.len(),
            duplicates,
        })
    }

    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError> {
        let timeout = self.settings.extract_timeout;
        tokio::time::timeout(timeout, self.extractor.extract(bytes, content_type))
            .await
            .map_err(|_| ExtractionError::Timeout(timeout))?
    }

    fn chunk(&self, document_id: &str, content: &str) -> Vec<Chunk> {
        chunk_text(
            document_id,
            content,
            self.settings.max_tokens,
            self.settings.overlap_tokens,
        )
    }

    fn is_too_short(&self, content: &str) -> bool {
        content.is_empty() || content.chars().count() < self.settings.min_summary_chars
    }

    async fn summarize_for_ingest(
        &self,
        document_id: &str,
        content: &str,
        warnings: &mut Vec<String>,
    ) -> (String, SummaryProvenance) {
        if content.is_empty() {
            warn!(document_id, "no extractable text");
            warnings.push(
                "no extractable text; document is not summarized, embedded, or deduplicated"
                    .to_string(),
            );
            return (PLACEHOLDER_SUMMARY.to_string(), SummaryProvenance::Placeholder);
        }
        if self.is_too_short(content) {
            return (content.to_string(), SummaryProvenance::Placeholder);
        }

        let mode = self.settings.summary_mode;
        match self.call_summarizer(content, mode).await {
            Ok(summary) => (summary, SummaryProvenance::ModelGenerated),
            Err(err) => {
                warn!(document_id, error = %err, "summarizer failed, using extractive fallback");
                warnings.push(format!("summarizer failed ({}); used extractive summary", err));
                (fallback_summary(content, mode), SummaryProvenance::Fallback)
            }
        }
    }

    async fn call_summarizer(&self, text: &str, mode: SummaryMode) -> Result<String, ProviderError> {
        let timeout = self.settings.call_timeout;
        let raw = tokio::time::timeout(timeout, self.summarizer.summarize(text, mode))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;
        let cleaned = dedupe_sentences(raw.trim());
        if cleaned.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "summarizer returned an empty summary".to_string(),
            ));
        }
        Ok(cleaned)
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let timeout = self.settings.call_timeout;
        let vector = tokio::time::timeout(timeout, self.embedder.embed(text))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;
        if vector.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "embedder returned an empty vector".to_string(),
            ));
        }
        let dims = self.embedder.dims();
        if dims > 0 && vector.len() != dims {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                dims,
                vector.len()
            )));
        }
        Ok(vector)
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self.embed_once(text).await {
            Ok(vector) => Ok(vector),
            Err(first) if !first.is_retryable() => Err(first),
            Err(first) => {
                debug!(error = %first, "embedding failed, retrying once");
                tokio::time::sleep(self.settings.embed_retry_backoff).await;
                self.embed_once(text).await
            }
        }
    }

    /// Embed all chunks concurrently, then upsert in chunk-index order.
    async fn embed_and_index(
        &self,
        document_id: &str,
        filename: &str,
        chunks: &[Chunk],
    ) -> EmbeddedChunks {
        let mut warnings = Vec::new();
        if chunks.is_empty() {
            return EmbeddedChunks {
                vectors: Vec::new(),
                warnings,
            };
        }

        let concurrency = self.settings.embed_concurrency.max(1);
        // Owned futures: a borrowing closure here makes the ingest future
        // fail the higher-ranked Send check that axum and tokio::spawn need.
        let calls: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(pos, chunk)| {
                let text = chunk.text.clone();
                async move { (pos, self.embed_with_retry(&text).await) }
            })
            .collect();
        let mut results: Vec<(usize, Result<Vec<f32>, ProviderError>)> = stream::iter(calls)
            .buffer_unordered(concurrency)
            .collect()
            .await;
        results.sort_by_key(|(pos, _)| *pos);

        let mut vectors = Vec::with_capacity(chunks.len());
        let mut failed = 0usize;
        for (pos, result) in results {
            let chunk = &chunks[pos];
            let vector = match result {
                Ok(vector) => vector,
                Err(err) => {
                    failed += 1;
                    warn!(
                        document_id,
                        chunk_index = chunk.chunk_index,
                        error = %err,
                        "skipping chunk: embedding failed"
                    );
                    warnings.push(format!(
                        "chunk {} skipped: embedding failed ({})",
                        chunk.chunk_index, err
                    ));
                    continue;
                }
            };
            let point = VectorPoint {
                key: VectorKey::chunk(document_id, chunk.chunk_index),
                vector: vector.clone(),
                text: chunk.text.clone(),
            };
            if let Err(err) = self.index.upsert(point).await {
                failed += 1;
                warn!(
                    document_id,
                    chunk_index = chunk.chunk_index,
                    error = %err,
                    "skipping chunk: vector upsert failed"
                );
                warnings.push(format!(
                    "chunk {} skipped: vector index write failed ({:#})",
                    chunk.chunk_index, err
                ));
                continue;
            }
            vectors.push(vector);
        }

        if failed == chunks.len() {
            warn!(document_id, filename, "no chunk embedded; document is keyword-only");
            warnings.push(
                "no chunk could be embedded; document is keyword-searchable only and was not deduplicated"
                    .to_string(),
            );
        }

        EmbeddedChunks { vectors, warnings }
    }

    async fn upsert_centroid(
        &self,
        document_id: &str,
        filename: &str,
        vectors: &[Vec<f32>],
        warnings: &mut Vec<String>,
    ) -> Option<Vec<f32>> {
        let vector = centroid(vectors)?;
        let point = VectorPoint {
            key: VectorKey::centroid(document_id),
            vector: vector.clone(),
            text: filename.to_string(),
        };
        match self.index.upsert(point).await {
            Ok(()) => Some(vector),
            Err(err) => {
                warn!(document_id, error = %err, "centroid upsert failed");
                warnings.push(format!(
                    "document centroid not stored ({:#}); duplicate detection skipped",
                    err
                ));
                None
            }
        }
    }

    async fn require_document(&self, id: &str) -> Result<Document, PipelineError> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    /// The stored centroid of `id`, rebuilding the document's vectors when
    /// it is missing.
    async fn centroid_for(&self, id: &str) -> Result<Option<Vec<f32>>, PipelineError> {
        if let Some(vector) = self.index.get(&VectorKey::centroid(id)).await? {
            return Ok(Some(vector));
        }
        debug!(document_id = id, "no stored centroid, rebuilding vectors");
        self.reindex_document(id).await?;
        Ok(self.index.get(&VectorKey::centroid(id)).await?)
    }

    /// Run duplicate detection for an already ingested document.
    pub async fn find_duplicates(&self, id: &str) -> Result<Vec<DuplicateMatch>, PipelineError> {
        self.find_duplicates_at(id, self.settings.dedup.threshold)
            .await
    }

    /// [`Pipeline::find_duplicates`] with `threshold` in place of the
    /// configured one. Callers keep it within `[0, 1]`.
    pub async fn find_duplicates_at(
        &self,
        id: &str,
        threshold: f32,
    ) -> Result<Vec<DuplicateMatch>, PipelineError> {
        self.require_document(id).await?;
        let Some(vector) = self.centroid_for(id).await? else {
            return Ok(Vec::new());
        };
        let settings = DedupSettings {
            threshold,
            ..self.settings.dedup
        };
        Ok(dedup::find_duplicates(
            self.store.as_ref(),
            self.index.as_ref(),
            id,
            &vector,
            &settings,
        )
        .await?)
    }

    /// Nearest other documents by centroid, without threshold or persistence.
    pub async fn similar_documents(
        &self,
        id: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarDocument>, PipelineError> {
        self.require_document(id).await?;
        let Some(vector) = self.centroid_for(id).await? else {
            return Ok(Vec::new());
        };
        let matches = self
            .index
            .query(&vector, top_k, VectorKind::Centroid, Some(id))
            .await?;

        let mut similar = Vec::with_capacity(matches.len());
        for m in matches {
            if let Some(doc) = self.store.get_document(m.key.document_id()).await? {
                similar.push(SimilarDocument {
                    document_id: doc.id,
                    filename: doc.filename,
                    score: m.score,
                });
            }
        }
        Ok(similar)
    }

    /// Summarize a stored document at the requested length.
    pub async fn summarize_document(
        &self,
        id: &str,
        mode: SummaryMode,
    ) -> Result<OnDemandSummary, PipelineError> {
        let doc = self.require_document(id).await?;
        let (summary, provenance) = if doc.content.is_empty() {
            (PLACEHOLDER_SUMMARY.to_string(), SummaryProvenance::Placeholder)
        } else if self.is_too_short(&doc.content) {
            (doc.content.clone(), SummaryProvenance::Placeholder)
        } else {
            match self.call_summarizer(&doc.content, mode).await {
                Ok(summary) => (
                    limit_sentences(&summary, mode.sentence_limit()),
                    SummaryProvenance::ModelGenerated,
                ),
                Err(err) => {
                    warn!(document_id = id, error = %err, "on-demand summary fell back");
                    (fallback_summary(&doc.content, mode), SummaryProvenance::Fallback)
                }
            }
        };
        Ok(OnDemandSummary {
            document_id: doc.id,
            mode,
            summary,
            provenance,
        })
    }

    /// Remove a document, its vectors, tags, and duplicate links.
    ///
    /// Returns `false` when the document did not exist.
    pub async fn delete_document(&self, id: &str) -> Result<bool, PipelineError> {
        let removed_vectors = self.index.delete_document(id).await?;
        let removed = self.store.delete_document(id).await?;
        info!(document_id = id, removed, removed_vectors, "deleted document");
        Ok(removed)
    }

    /// Rebuild chunk and centroid vectors from the stored content.
    ///
    /// The document record itself is left untouched.
    pub async fn reindex_document(&self, id: &str) -> Result<ReindexReport, PipelineError> {
        let doc = self.require_document(id).await?;
        self.index.delete_document(id).await?;

        let chunks = self.chunk(id, &doc.content);
        let embedded = self.embed_and_index(id, &doc.filename, &chunks).await;
        let mut warnings = embedded.warnings;
        self.upsert_centroid(id, &doc.filename, &embedded.vectors, &mut warnings)
            .await;

        info!(
            document_id = id,
            chunks = chunks.len(),
            embedded = embedded.vectors.len(),
            "reindexed document"
        );
        Ok(ReindexReport {
            document_id: doc.id,
            chunks: chunks.len(),
            embedded_chunks: embedded.vectors.len(),
            warnings,
        })
    }

    /// Reindex every document that has content.
    pub async fn reindex_all(&self) -> Result<Vec<ReindexReport>, PipelineError> {
        let mut reports = Vec::new();
        for doc in self.store.list_documents().await? {
            if doc.status == DocumentStatus::Failed || doc.content.is_empty() {
                continue;
            }
            reports.push(self.reindex_document(&doc.id).await?);
        }
        Ok(reports)
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchUnavailableError> {
        search::semantic_search(
            self.embedder.as_ref(),
            self.index.as_ref(),
            self.store.as_ref(),
            query,
            top_k,
            self.settings.call_timeout,
        )
        .await
    }

    pub async fn keyword_search(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<KeywordHit>, PipelineError> {
        if term.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.store.keyword_search(term.trim(), limit).await?)
    }

    pub async fn get_document(&self, id: &str) -> Result<Document, PipelineError> {
        self.require_document(id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, PipelineError> {
        Ok(self.store.list_documents().await?)
    }

    pub async fn documents_by_tag(&self, tag: &str) -> Result<Vec<Document>, PipelineError> {
        Ok(self.store.documents_by_tag(tag.trim()).await?)
    }

    pub async fn duplicate_links(&self, id: &str) -> Result<Vec<DuplicateLink>, PipelineError> {
        self.require_document(id).await?;
        Ok(self.store.duplicate_links(id).await?)
    }
}
