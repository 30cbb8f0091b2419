//! Centroid-based near-duplicate detection.
//!
//! A document's centroid (mean of its chunk vectors) is compared against
//! the other documents' centroids. Pairs scoring at or above the threshold
//! are linked once per unordered pair; the store enforces that, so
//! re-running detection is harmless.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::index::{VectorIndex, VectorKind};
use crate::models::DuplicateLink;
use crate::store::{DocumentStore, LinkOutcome};

/// Default cosine similarity at or above which two documents are duplicates.
pub const DEFAULT_THRESHOLD: f32 = 0.92;

/// Default number of neighbouring centroids examined per document.
pub const DEFAULT_CANDIDATE_K: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct DedupSettings {
    pub threshold: f32,
    pub candidate_k: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            candidate_k: DEFAULT_CANDIDATE_K,
        }
    }
}

/// A retained duplicate pair, seen from the candidate document.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    /// The other document of the pair.
    pub document_id: String,
    pub score: f32,
    /// `true` when this run stored the link, `false` when it already existed.
    pub newly_linked: bool,
}

/// Link `document_id` to every existing document whose centroid is within
/// `settings.threshold` of `centroid`.
///
/// Returns the retained pairs sorted by descending score.
pub async fn find_duplicates(
    store: &dyn DocumentStore,
    index: &dyn VectorIndex,
    document_id: &str,
    centroid: &[f32],
    settings: &DedupSettings,
) -> Result<Vec<DuplicateMatch>> {
    if settings.candidate_k == 0 {
        return Ok(Vec::new());
    }

    let neighbours = index
        .query(
            centroid,
            settings.candidate_k,
            VectorKind::Centroid,
            Some(document_id),
        )
        .await?;

    let mut matches = Vec::new();
    for neighbour in neighbours {
        let other = neighbour.key.document_id();
        let score = neighbour.score.clamp(0.0, 1.0);
        if score < settings.threshold {
            continue;
        }
        let Some(link) = DuplicateLink::new(document_id, other, score) else {
            continue;
        };
        let outcome = store.insert_duplicate_link(&link).await?;
        if outcome == LinkOutcome::Conflict {
            debug!(document_id, other, "duplicate link already present");
        } else {
            info!(document_id, other, score, "linked duplicate documents");
        }
        matches.push(DuplicateMatch {
            document_id: other.to_string(),
            score,
            newly_linked: outcome == LinkOutcome::Inserted,
        });
    }

    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use crate::index::{VectorKey, VectorPoint};
    use crate::store::memory::InMemoryStore;

    async fn put_centroid(index: &InMemoryIndex, id: &str, vector: Vec<f32>) {
        index
            .upsert(VectorPoint {
                key: VectorKey::centroid(id),
                vector,
                text: id.to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_threshold_and_idempotence() {
        let store = InMemoryStore::new();
        let index = InMemoryIndex::new();
        put_centroid(&index, "a", vec![1.0, 0.0]).await;
        put_centroid(&index, "b", vec![1.0, 0.01]).await;
        put_centroid(&index, "c", vec![0.0, 1.0]).await;
        let settings = DedupSettings::default();

        let first = find_duplicates(&store, &index, "a", &[1.0, 0.0], &settings)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].document_id, "b");
        assert!(first[0].newly_linked);

        let again = find_duplicates(&store, &index, "b", &[1.0, 0.01], &settings)
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert!(!again[0].newly_linked);
        assert_eq!(store.duplicate_links("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_never_links_self() {
        let store = InMemoryStore::new();
        let index = InMemoryIndex::new();
        put_centroid(&index, "a", vec![1.0, 0.0]).await;
        let found = find_duplicates(&store, &index, "a", &[1.0, 0.0], &DedupSettings::default())
            .await
            .unwrap();
        assert!(found.is_empty());
        assert!(store.duplicate_links("a").await.unwrap().is_empty());
    }
}
