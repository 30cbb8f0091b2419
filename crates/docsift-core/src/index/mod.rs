//! Vector index abstraction.
//!
//! Vectors are keyed explicitly by [`VectorKey`]: one entry per chunk
//! (`document_id`, `chunk_index`) plus one centroid per document. Queries
//! are restricted to one [`VectorKind`] so chunk search and centroid-based
//! duplicate detection never see each other's points.

pub mod memory;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Which namespace a vector lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Chunk,
    Centroid,
}

impl VectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorKind::Chunk => "chunk",
            VectorKind::Centroid => "centroid",
        }
    }
}

/// Identity of a stored vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorKey {
    Chunk { document_id: String, chunk_index: i64 },
    Centroid { document_id: String },
}

impl VectorKey {
    pub fn chunk(document_id: &str, chunk_index: i64) -> Self {
        VectorKey::Chunk {
            document_id: document_id.to_string(),
            chunk_index,
        }
    }

    pub fn centroid(document_id: &str) -> Self {
        VectorKey::Centroid {
            document_id: document_id.to_string(),
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            VectorKey::Chunk { document_id, .. } | VectorKey::Centroid { document_id } => {
                document_id
            }
        }
    }

    /// Chunk index, or `None` for a centroid.
    pub fn chunk_index(&self) -> Option<i64> {
        match self {
            VectorKey::Chunk { chunk_index, .. } => Some(*chunk_index),
            VectorKey::Centroid { .. } => None,
        }
    }

    pub fn kind(&self) -> VectorKind {
        match self {
            VectorKey::Chunk { .. } => VectorKind::Chunk,
            VectorKey::Centroid { .. } => VectorKind::Centroid,
        }
    }
}

impl fmt::Display for VectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorKey::Chunk {
                document_id,
                chunk_index,
            } => write!(f, "chunk:{}:{}", document_id, chunk_index),
            VectorKey::Centroid { document_id } => write!(f, "centroid:{}", document_id),
        }
    }
}

/// A vector and its payload text (chunk text, or filename for centroids).
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub key: VectorKey,
    pub vector: Vec<f32>,
    pub text: String,
}

/// A query result: cosine similarity against the query vector.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub key: VectorKey,
    pub score: f32,
    pub text: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the point stored under `point.key`.
    async fn upsert(&self, point: VectorPoint) -> Result<()>;

    /// The `top_k` nearest points of `kind`, best first.
    ///
    /// Points owned by `exclude_document` are skipped.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: VectorKind,
        exclude_document: Option<&str>,
    ) -> Result<Vec<VectorMatch>>;

    async fn get(&self, key: &VectorKey) -> Result<Option<Vec<f32>>>;

    async fn delete(&self, key: &VectorKey) -> Result<()>;

    /// Remove every chunk and centroid vector of a document.
    ///
    /// Returns the number of points removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;
}
