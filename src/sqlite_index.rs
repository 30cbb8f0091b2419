//! Built-in [`VectorIndex`] on the `vectors` table.
//!
//! Embeddings are stored as little-endian f32 BLOBs. Queries load every
//! vector of the requested kind and rank by cosine similarity in Rust,
//! which is adequate for personal and small-team collections. Larger
//! deployments should use the Qdrant backend.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docsift_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use docsift_core::index::{VectorIndex, VectorKey, VectorKind, VectorMatch, VectorPoint};

/// Row value of `chunk_index` for centroid vectors.
const CENTROID_INDEX: i64 = -1;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn key_columns(key: &VectorKey) -> (&str, &'static str, i64) {
    (
        key.document_id(),
        key.kind().as_str(),
        key.chunk_index().unwrap_or(CENTROID_INDEX),
    )
}

fn row_key(document_id: String, kind: &str, chunk_index: i64) -> VectorKey {
    if kind == VectorKind::Centroid.as_str() {
        VectorKey::Centroid { document_id }
    } else {
        VectorKey::Chunk {
            document_id,
            chunk_index,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let (document_id, kind, chunk_index) = key_columns(&point.key);
        sqlx::query(
            r#"
            INSERT INTO vectors (document_id, kind, chunk_index, text, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, kind, chunk_index) DO UPDATE SET
                text = excluded.text,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(document_id)
        .bind(kind)
        .bind(chunk_index)
        .bind(&point.text)
        .bind(point.vector.len() as i64)
        .bind(vec_to_blob(&point.vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: VectorKind,
        exclude_document: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT document_id, kind, chunk_index, text, embedding
            FROM vectors
            WHERE kind = ? AND dims = ? AND document_id != ?
            "#,
        )
        .bind(kind.as_str())
        .bind(vector.len() as i64)
        .bind(exclude_document.unwrap_or(""))
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<VectorMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let kind: String = row.get("kind");
                VectorMatch {
                    key: row_key(row.get("document_id"), &kind, row.get("chunk_index")),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                    text: row.get("text"),
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn get(&self, key: &VectorKey) -> Result<Option<Vec<f32>>> {
        let (document_id, kind, chunk_index) = key_columns(key);
        let blob: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT embedding FROM vectors WHERE document_id = ? AND kind = ? AND chunk_index = ?",
        )
        .bind(document_id)
        .bind(kind)
        .bind(chunk_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(blob.map(|b| blob_to_vec(&b)))
    }

    async fn delete(&self, key: &VectorKey) -> Result<()> {
        let (document_id, kind, chunk_index) = key_columns(key);
        sqlx::query("DELETE FROM vectors WHERE document_id = ? AND kind = ? AND chunk_index = ?")
            .bind(document_id)
            .bind(kind)
            .bind(chunk_index)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
