//! In-memory [`DocumentStore`] for tests and embedding in other programs.
//!
//! `HashMap`s behind `std::sync::RwLock`. Keyword search scans every
//! document's content.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{DocumentStore, LinkOutcome};
use crate::models::{
    canonical_pair, Document, DocumentStatus, DuplicateLink, KeywordHit, NewDocument,
    SummaryProvenance,
};
use crate::search::{count_term_occurrences, rank_keyword_hits, snippet_around};

pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    links: RwLock<BTreeMap<(String, String), DuplicateLink>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            links: RwLock::new(BTreeMap::new()),
        }
    }

    fn docs(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Document>>> {
        self.docs.read().map_err(|_| anyhow!("document map lock poisoned"))
    }

    fn docs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Document>>> {
        self.docs.write().map_err(|_| anyhow!("document map lock poisoned"))
    }

    fn links_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<(String, String), DuplicateLink>>> {
        self.links.write().map_err(|_| anyhow!("link map lock poisoned"))
    }

    /// Apply `f` to a stored document and bump its `updated_at`.
    fn update(&self, id: &str, f: impl FnOnce(&mut Document)) -> Result<()> {
        let mut docs = self.docs_mut()?;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| anyhow!("document not found: {}", id))?;
        f(doc);
        doc.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(docs: &mut [Document]) {
    docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create_document(&self, new: &NewDocument) -> Result<Document> {
        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            filename: new.filename.clone(),
            storage_path: new.storage_path.clone(),
            content_type: new.content_type.clone(),
            content_hash: new.content_hash.clone(),
            content: String::new(),
            summary: None,
            summary_provenance: None,
            tags: Vec::new(),
            status: DocumentStatus::Pending,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.docs_mut()?.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        self.update(id, |doc| {
            doc.status = DocumentStatus::Failed;
            doc.warnings = vec![reason.to_string()];
        })
    }

    async fn set_content(&self, id: &str, content: &str) -> Result<()> {
        self.update(id, |doc| doc.content = content.to_string())
    }

    async fn set_summary(
        &self,
        id: &str,
        summary: &str,
        provenance: SummaryProvenance,
    ) -> Result<()> {
        self.update(id, |doc| {
            doc.summary = Some(summary.to_string());
            doc.summary_provenance = Some(provenance);
        })
    }

    async fn set_tags(&self, id: &str, tags: &[String]) -> Result<()> {
        let mut tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        tags.sort();
        tags.dedup();
        self.update(id, |doc| doc.tags = tags)
    }

    async fn finish_document(
        &self,
        id: &str,
        status: DocumentStatus,
        warnings: &[String],
    ) -> Result<()> {
        self.update(id, |doc| {
            doc.status = status;
            doc.warnings = warnings.to_vec();
        })
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs()?.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.docs()?.values().cloned().collect();
        newest_first(&mut docs);
        Ok(docs)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed = self.docs_mut()?.remove(id).is_some();
        self.links_mut()?
            .retain(|(a, b), _| a.as_str() != id && b.as_str() != id);
        Ok(removed)
    }

    async fn documents_by_tag(&self, tag: &str) -> Result<Vec<Document>> {
        let needle = tag.to_lowercase();
        let mut docs: Vec<Document> = self
            .docs()?
            .values()
            .filter(|d| d.tags.iter().any(|t| t.contains(&needle)))
            .cloned()
            .collect();
        newest_first(&mut docs);
        Ok(docs)
    }

    async fn keyword_search(&self, term: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let hits = self
            .docs()?
            .values()
            .filter_map(|doc| {
                let occurrences = count_term_occurrences(&doc.content, term);
                (occurrences > 0).then(|| KeywordHit {
                    document_id: doc.id.clone(),
                    filename: doc.filename.clone(),
                    occurrences,
                    snippet: snippet_around(&doc.content, term),
                })
            })
            .collect();
        Ok(rank_keyword_hits(hits, limit))
    }

    async fn insert_duplicate_link(&self, link: &DuplicateLink) -> Result<LinkOutcome> {
        let Some(key) = canonical_pair(&link.file_id1, &link.file_id2) else {
            bail!("refusing to link document {} to itself", link.file_id1);
        };
        let mut links = self.links_mut()?;
        if links.contains_key(&key) {
            return Ok(LinkOutcome::Conflict);
        }
        let stored = DuplicateLink {
            file_id1: key.0.clone(),
            file_id2: key.1.clone(),
            score: link.score,
            created_at: link.created_at,
        };
        links.insert(key, stored);
        Ok(LinkOutcome::Inserted)
    }

    async fn duplicate_links(&self, document_id: &str) -> Result<Vec<DuplicateLink>> {
        let links = self.links.read().map_err(|_| anyhow!("link map lock poisoned"))?;
        let mut found: Vec<DuplicateLink> = links
            .values()
            .filter(|l| l.file_id1 == document_id || l.file_id2 == document_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc(name: &str) -> NewDocument {
        NewDocument {
            filename: name.to_string(),
            storage_path: format!("/uploads/{}", name),
            content_type: "text/plain".to_string(),
            content_hash: "00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("a.txt")).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        let fetched = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.filename, "a.txt");
    }

    #[tokio::test]
    async fn test_link_pair_is_unique_in_both_orders() {
        let store = InMemoryStore::new();
        let a = DuplicateLink::new("a", "b", 0.95).unwrap();
        let b = DuplicateLink::new("b", "a", 0.97).unwrap();
        assert_eq!(store.insert_duplicate_link(&a).await.unwrap(), LinkOutcome::Inserted);
        assert_eq!(store.insert_duplicate_link(&b).await.unwrap(), LinkOutcome::Conflict);
        assert_eq!(store.duplicate_links("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_link_is_an_error() {
        let store = InMemoryStore::new();
        let link = DuplicateLink {
            file_id1: "x".into(),
            file_id2: "x".into(),
            score: 1.0,
            created_at: Utc::now(),
        };
        assert!(store.insert_duplicate_link(&link).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_links() {
        let store = InMemoryStore::new();
        let a = store.create_document(&new_doc("a.txt")).await.unwrap();
        let b = store.create_document(&new_doc("b.txt")).await.unwrap();
        let link = DuplicateLink::new(&a.id, &b.id, 0.99).unwrap();
        store.insert_duplicate_link(&link).await.unwrap();

        assert!(store.delete_document(&a.id).await.unwrap());
        assert!(!store.delete_document(&a.id).await.unwrap());
        assert!(store.duplicate_links(&b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_lowercased_and_searchable_by_substring() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("a.txt")).await.unwrap();
        store
            .set_tags(&doc.id, &["Invoice".to_string(), "payment".to_string()])
            .await
            .unwrap();
        let found = store.documents_by_tag("VOIC").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tags, vec!["invoice", "payment"]);
    }

    #[tokio::test]
    async fn test_keyword_search_counts_whole_words() {
        let store = InMemoryStore::new();
        let a = store.create_document(&new_doc("a.txt")).await.unwrap();
        let b = store.create_document(&new_doc("b.txt")).await.unwrap();
        store.set_content(&a.id, "tax tax taxes").await.unwrap();
        store.set_content(&b.id, "Tax, TAX and tax.").await.unwrap();

        let hits = store.keyword_search("tax", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, b.id);
        assert_eq!(hits[0].occurrences, 3);
        assert_eq!(hits[1].occurrences, 2);
    }
}
