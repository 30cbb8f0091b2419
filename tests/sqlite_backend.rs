//! The SQLite store and vector index against a real database file, alone
//! and underneath the pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use docsift::db::connect_path;
use docsift::migrate::migrate_pool;
use docsift::sqlite_index::SqliteVectorIndex;
use docsift::sqlite_store::SqliteStore;
use docsift_core::embedding::Embedder;
use docsift_core::error::{ExtractionError, ProviderError};
use docsift_core::extract::TextExtractor;
use docsift_core::index::{VectorIndex, VectorKey, VectorKind, VectorPoint};
use docsift_core::models::{
    DocumentStatus, DuplicateLink, NewDocument, SummaryProvenance,
};
use docsift_core::pipeline::{Pipeline, PipelineSettings, Upload};
use docsift_core::store::{DocumentStore, LinkOutcome};
use docsift_core::summary::{Summarizer, SummaryMode};

const DIMS: usize = 32;

async fn open_db() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = connect_path(&tmp.path().join("db/docsift.sqlite"))
        .await
        .unwrap();
    migrate_pool(&pool).await.unwrap();
    (tmp, pool)
}

fn new_doc(name: &str) -> NewDocument {
    NewDocument {
        filename: name.to_string(),
        storage_path: format!("/uploads/{}", name),
        content_type: "text/plain".to_string(),
        content_hash: "00".repeat(32),
    }
}

struct PlainText;

#[async_trait]
impl TextExtractor for PlainText {
    async fn extract(&self, bytes: &[u8], _content_type: &str) -> Result<String, ExtractionError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn summarize(&self, text: &str, _mode: SummaryMode) -> Result<String, ProviderError> {
        Ok(text.split_whitespace().take(20).collect::<Vec<_>>().join(" "))
    }
}

#[derive(Default)]
struct HashEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; DIMS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let h = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            v[h as usize % DIMS] += 1.0;
        }
        Ok(v)
    }
}

fn pipeline(pool: &SqlitePool) -> Pipeline {
    let settings = PipelineSettings {
        max_tokens: 48,
        overlap_tokens: 0,
        embed_retry_backoff: Duration::from_millis(1),
        ..PipelineSettings::default()
    };
    Pipeline::new(
        Arc::new(PlainText),
        Arc::new(EchoSummarizer),
        Arc::new(HashEmbedder::default()),
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(SqliteVectorIndex::new(pool.clone())),
        settings,
    )
}

fn report_text() -> String {
    (0..12)
        .map(|i| {
            format!(
                "Paragraph {} describes the warehouse inventory audit and shipping ledger reconciliation.",
                i
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_tmp, pool) = open_db().await;
    migrate_pool(&pool).await.unwrap();
    migrate_pool(&pool).await.unwrap();
}

#[tokio::test]
async fn test_document_lifecycle_roundtrip() {
    let (_tmp, pool) = open_db().await;
    let store = SqliteStore::new(pool);

    let doc = store.create_document(&new_doc("a.txt")).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);
    assert!(doc.content.is_empty());

    store.set_content(&doc.id, "hello world").await.unwrap();
    store
        .set_summary(&doc.id, "hello", SummaryProvenance::Fallback)
        .await
        .unwrap();
    store
        .set_tags(&doc.id, &["Greeting".to_string(), "world".to_string()])
        .await
        .unwrap();
    store
        .finish_document(&doc.id, DocumentStatus::Degraded, &["w1".to_string()])
        .await
        .unwrap();

    let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(loaded.content, "hello world");
    assert_eq!(loaded.summary.as_deref(), Some("hello"));
    assert_eq!(loaded.summary_provenance, Some(SummaryProvenance::Fallback));
    assert_eq!(loaded.tags, vec!["greeting", "world"]);
    assert_eq!(loaded.status, DocumentStatus::Degraded);
    assert_eq!(loaded.warnings, vec!["w1"]);

    assert!(store.set_content("missing", "x").await.is_err());
}

#[tokio::test]
async fn test_list_newest_first_and_tag_lookup() {
    let (_tmp, pool) = open_db().await;
    let store = SqliteStore::new(pool);

    let first = store.create_document(&new_doc("first.txt")).await.unwrap();
    let second = store.create_document(&new_doc("second.txt")).await.unwrap();
    store
        .set_tags(&second.id, &["invoices".to_string()])
        .await
        .unwrap();

    let listed: Vec<String> = store
        .list_documents()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(listed, vec![second.id.clone(), first.id.clone()]);

    let tagged = store.documents_by_tag("invoice").await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].id, second.id);
}

#[tokio::test]
async fn test_tag_wildcards_match_literally() {
    let (_tmp, pool) = open_db().await;
    let store = SqliteStore::new(pool);

    let plain = store.create_document(&new_doc("plain.txt")).await.unwrap();
    store
        .set_tags(&plain.id, &["budget".to_string()])
        .await
        .unwrap();
    let odd = store.create_document(&new_doc("odd.txt")).await.unwrap();
    store
        .set_tags(&odd.id, &["q3_100%".to_string()])
        .await
        .unwrap();

    assert_eq!(store.documents_by_tag("%").await.unwrap().len(), 1);
    assert_eq!(store.documents_by_tag("_").await.unwrap().len(), 1);
    let tagged = store.documents_by_tag("3_1").await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].id, odd.id);
    assert!(store.documents_by_tag("b_dget").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_link_unique_per_unordered_pair() {
    let (_tmp, pool) = open_db().await;
    let store = SqliteStore::new(pool);
    let a = store.create_document(&new_doc("a.txt")).await.unwrap();
    let b = store.create_document(&new_doc("b.txt")).await.unwrap();

    let ab = DuplicateLink::new(&a.id, &b.id, 0.97).unwrap();
    let ba = DuplicateLink::new(&b.id, &a.id, 0.97).unwrap();
    assert_eq!(
        store.insert_duplicate_link(&ab).await.unwrap(),
        LinkOutcome::Inserted
    );
    assert_eq!(
        store.insert_duplicate_link(&ba).await.unwrap(),
        LinkOutcome::Conflict
    );

    let links = store.duplicate_links(&a.id).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].other(&a.id), b.id);
    assert_eq!(store.duplicate_links(&b.id).await.unwrap().len(), 1);

    let self_link = DuplicateLink {
        file_id1: a.id.clone(),
        file_id2: a.id.clone(),
        score: 1.0,
        created_at: chrono::Utc::now(),
    };
    assert!(store.insert_duplicate_link(&self_link).await.is_err());
}

#[tokio::test]
async fn test_keyword_search_counts_whole_words() {
    let (_tmp, pool) = open_db().await;
    let store = SqliteStore::new(pool);
    let a = store.create_document(&new_doc("a.txt")).await.unwrap();
    let b = store.create_document(&new_doc("b.txt")).await.unwrap();
    store
        .set_content(&a.id, "Invoice one. Another invoice, and the final INVOICE.")
        .await
        .unwrap();
    store
        .set_content(&b.id, "An invoice appears once; invoices do not count.")
        .await
        .unwrap();

    let hits = store.keyword_search("invoice", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_id, a.id);
    assert_eq!(hits[0].occurrences, 3);
    assert_eq!(hits[1].occurrences, 1);

    assert!(store.keyword_search("absent", 10).await.unwrap().is_empty());
    assert_eq!(store.keyword_search("invoice", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_removes_tags_links_and_fts() {
    let (_tmp, pool) = open_db().await;
    let store = SqliteStore::new(pool);
    let a = store.create_document(&new_doc("a.txt")).await.unwrap();
    let b = store.create_document(&new_doc("b.txt")).await.unwrap();
    store.set_content(&a.id, "unique marker text").await.unwrap();
    store.set_tags(&a.id, &["marker".to_string()]).await.unwrap();
    store
        .insert_duplicate_link(&DuplicateLink::new(&a.id, &b.id, 0.95).unwrap())
        .await
        .unwrap();

    assert!(store.delete_document(&a.id).await.unwrap());
    assert!(!store.delete_document(&a.id).await.unwrap());
    assert!(store.get_document(&a.id).await.unwrap().is_none());
    assert!(store.keyword_search("marker", 10).await.unwrap().is_empty());
    assert!(store.documents_by_tag("marker").await.unwrap().is_empty());
    assert!(store.duplicate_links(&b.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vector_index_query_filters_and_ranks() {
    let (_tmp, pool) = open_db().await;
    let index = SqliteVectorIndex::new(pool);

    let point = |key: VectorKey, vector: Vec<f32>| VectorPoint {
        key,
        vector,
        text: "t".to_string(),
    };
    index
        .upsert(point(VectorKey::chunk("a", 0), vec![1.0, 0.0]))
        .await
        .unwrap();
    index
        .upsert(point(VectorKey::chunk("b", 0), vec![0.6, 0.8]))
        .await
        .unwrap();
    index
        .upsert(point(VectorKey::centroid("a"), vec![1.0, 0.0]))
        .await
        .unwrap();
    // Different dimensionality is never returned.
    index
        .upsert(point(VectorKey::chunk("c", 0), vec![1.0, 0.0, 0.0]))
        .await
        .unwrap();

    let hits = index
        .query(&[1.0, 0.0], 10, VectorKind::Chunk, None)
        .await
        .unwrap();
    let keys: Vec<VectorKey> = hits.iter().map(|h| h.key.clone()).collect();
    assert_eq!(keys, vec![VectorKey::chunk("a", 0), VectorKey::chunk("b", 0)]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);

    let hits = index
        .query(&[1.0, 0.0], 10, VectorKind::Chunk, Some("a"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    // Upsert replaces.
    index
        .upsert(point(VectorKey::chunk("a", 0), vec![0.0, 1.0]))
        .await
        .unwrap();
    assert_eq!(
        index.get(&VectorKey::chunk("a", 0)).await.unwrap(),
        Some(vec![0.0, 1.0])
    );

    assert_eq!(index.delete_document("a").await.unwrap(), 2);
    assert!(index.get(&VectorKey::centroid("a")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pipeline_links_identical_uploads_once() {
    let (_tmp, pool) = open_db().await;
    let pipeline = pipeline(&pool);
    let text = report_text();

    let upload = |name: &'static str| Upload {
        bytes: text.as_bytes(),
        filename: name,
        content_type: "text/plain",
        storage_path: name,
    };
    let first = pipeline.ingest(upload("report.txt")).await.unwrap();
    let second = pipeline.ingest(upload("report-copy.txt")).await.unwrap();

    assert_ne!(first.document.id, second.document.id);
    assert_eq!(second.document.status, DocumentStatus::Complete);
    assert!(first.chunks > 1);
    assert_eq!(first.embedded_chunks, first.chunks);
    assert_eq!(second.duplicates.len(), 1);
    assert!(second.duplicates[0].score > 0.99);

    // Re-running detection is a no-op for the stored pair.
    let rerun = pipeline.find_duplicates(&first.document.id).await.unwrap();
    assert_eq!(rerun.len(), 1);
    assert!(!rerun[0].newly_linked);
    assert_eq!(
        pipeline
            .duplicate_links(&first.document.id)
            .await
            .unwrap()
            .len(),
        1
    );

    let hits = pipeline.search("warehouse ledger", 3).await.unwrap();
    assert!(!hits.is_empty());

    assert!(pipeline.delete_document(&second.document.id).await.unwrap());
    assert!(pipeline
        .duplicate_links(&first.document.id)
        .await
        .unwrap()
        .is_empty());
    let hits = pipeline.search("warehouse ledger", 50).await.unwrap();
    assert!(hits.iter().all(|h| h.document_id == first.document.id));
}
