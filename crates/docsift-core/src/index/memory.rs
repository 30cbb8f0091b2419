//! Brute-force in-memory [`VectorIndex`].

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{VectorIndex, VectorKey, VectorKind, VectorMatch, VectorPoint};
use crate::embedding::cosine_similarity;

pub struct InMemoryIndex {
    points: RwLock<BTreeMap<VectorKey, VectorPoint>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored points of `kind`.
    pub fn len_of(&self, kind: VectorKind) -> usize {
        self.points
            .read()
            .map(|p| p.keys().filter(|k| k.kind() == kind).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        self.points
            .write()
            .map_err(|_| anyhow!("vector map lock poisoned"))?
            .insert(point.key.clone(), point);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: VectorKind,
        exclude_document: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        let points = self
            .points
            .read()
            .map_err(|_| anyhow!("vector map lock poisoned"))?;
        let mut matches: Vec<VectorMatch> = points
            .values()
            .filter(|p| p.key.kind() == kind)
            .filter(|p| exclude_document != Some(p.key.document_id()))
            .map(|p| VectorMatch {
                key: p.key.clone(),
                score: cosine_similarity(vector, &p.vector),
                text: p.text.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn get(&self, key: &VectorKey) -> Result<Option<Vec<f32>>> {
        let points = self
            .points
            .read()
            .map_err(|_| anyhow!("vector map lock poisoned"))?;
        Ok(points.get(key).map(|p| p.vector.clone()))
    }

    async fn delete(&self, key: &VectorKey) -> Result<()> {
        self.points
            .write()
            .map_err(|_| anyhow!("vector map lock poisoned"))?
            .remove(key);
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut points = self
            .points
            .write()
            .map_err(|_| anyhow!("vector map lock poisoned"))?;
        let before = points.len();
        points.retain(|k, _| k.document_id() != document_id);
        Ok(before - points.len())
    }
}
