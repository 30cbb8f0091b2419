//! SQLite-backed [`DocumentStore`].
//!
//! Documents, tags, and duplicate links live in plain tables; document
//! content is mirrored into the `documents_fts` FTS5 table, which keyword
//! search uses to select candidates before counting whole-word matches.
//! Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docsift_core::models::{
    canonical_pair, Document, DocumentStatus, DuplicateLink, KeywordHit, NewDocument,
    SummaryProvenance,
};
use docsift_core::search::{count_term_occurrences, rank_keyword_hits, snippet_around};
use docsift_core::store::{DocumentStore, LinkOutcome};

const DOCUMENT_COLUMNS: &str = "id, filename, storage_path, content_type, content_hash, content, \
     summary, summary_provenance, status, warnings_json, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn tags_for(&self, id: &str) -> Result<Vec<String>> {
        let tags = sqlx::query_scalar::<_, String>(
            "SELECT tag FROM document_tags WHERE document_id = ? ORDER BY tag",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    async fn all_tags(&self) -> Result<HashMap<String, Vec<String>>> {
        let rows = sqlx::query("SELECT document_id, tag FROM document_tags ORDER BY tag")
            .fetch_all(&self.pool)
            .await?;
        let mut by_doc: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            by_doc
                .entry(row.get("document_id"))
                .or_default()
                .push(row.get("tag"));
        }
        Ok(by_doc)
    }

    async fn touch(&self, id: &str, sql: &str, binds: &[&str]) -> Result<()> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let result = query
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("document not found: {}", id);
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Escape `LIKE` wildcards so a tag matches literally. Pairs with `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_document(row: &SqliteRow, tags: Vec<String>) -> Result<Document> {
    let provenance: Option<String> = row.get("summary_provenance");
    let status: String = row.get("status");
    let warnings_json: String = row.get("warnings_json");
    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        storage_path: row.get("storage_path"),
        content_type: row.get("content_type"),
        content_hash: row.get("content_hash"),
        content: row.get("content"),
        summary: row.get("summary"),
        summary_provenance: provenance
            .as_deref()
            .map(str::parse::<SummaryProvenance>)
            .transpose()?,
        tags,
        status: status.parse::<DocumentStatus>()?,
        warnings: serde_json::from_str(&warnings_json)
            .with_context(|| format!("corrupt warnings_json: {}", warnings_json))?,
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_document(&self, new: &NewDocument) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = now_millis();
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, storage_path, content_type, content_hash,
                                   status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.filename)
        .bind(&new.storage_path)
        .bind(&new.content_type)
        .bind(&new.content_hash)
        .bind(DocumentStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert document")?;

        self.get_document(&id)
            .await?
            .with_context(|| format!("document {} vanished after insert", id))
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        let warnings = serde_json::to_string(&[reason])?;
        self.touch(
            id,
            "UPDATE documents SET status = ?, warnings_json = ?, updated_at = ? WHERE id = ?",
            &[DocumentStatus::Failed.as_str(), warnings.as_str()],
        )
        .await
    }

    async fn set_content(&self, id: &str, content: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE documents SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(now_millis())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            bail!("document not found: {}", id);
        }
        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if !content.is_empty() {
            sqlx::query("INSERT INTO documents_fts (document_id, content) VALUES (?, ?)")
                .bind(id)
                .bind(content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_summary(
        &self,
        id: &str,
        summary: &str,
        provenance: SummaryProvenance,
    ) -> Result<()> {
        self.touch(
            id,
            "UPDATE documents SET summary = ?, summary_provenance = ?, updated_at = ? WHERE id = ?",
            &[summary, provenance.as_str()],
        )
        .await
    }

    async fn set_tags(&self, id: &str, tags: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for tag in tags {
            sqlx::query(
                "INSERT INTO document_tags (document_id, tag) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(tag.to_lowercase())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn finish_document(
        &self,
        id: &str,
        status: DocumentStatus,
        warnings: &[String],
    ) -> Result<()> {
        let warnings = serde_json::to_string(warnings)?;
        self.touch(
            id,
            "UPDATE documents SET status = ?, warnings_json = ?, updated_at = ? WHERE id = ?",
            &[status.as_str(), warnings.as_str()],
        )
        .await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let tags = self.tags_for(id).await?;
                Ok(Some(row_to_document(&row, tags)?))
            }
            None => Ok(None),
        }
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, rowid DESC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        let mut tags = self.all_tags().await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                row_to_document(row, tags.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM duplicate_links WHERE file_id1 = ? OR file_id2 = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn documents_by_tag(&self, tag: &str) -> Result<Vec<Document>> {
        let pattern = format!("%{}%", escape_like(&tag.to_lowercase()));
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT d.id FROM documents d
            WHERE d.id IN (SELECT document_id FROM document_tags WHERE tag LIKE ? ESCAPE '\')
            ORDER BY d.created_at DESC, d.rowid DESC
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get_document(&id).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn keyword_search(&self, term: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        // quoted FTS5 phrase; embedded quotes are doubled
        let phrase = format!("\"{}\"", term.replace('"', "\"\""));
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.filename, d.content
            FROM documents_fts f
            JOIN documents d ON d.id = f.document_id
            WHERE documents_fts MATCH ?
            "#,
        )
        .bind(&phrase)
        .fetch_all(&self.pool)
        .await
        .context("keyword query failed")?;

        let hits = rows
            .iter()
            .filter_map(|row| {
                let content: String = row.get("content");
                let occurrences = count_term_occurrences(&content, term);
                (occurrences > 0).then(|| KeywordHit {
                    document_id: row.get("id"),
                    filename: row.get("filename"),
                    occurrences,
                    snippet: snippet_around(&content, term),
                })
            })
            .collect();
        Ok(rank_keyword_hits(hits, limit))
    }

    async fn insert_duplicate_link(&self, link: &DuplicateLink) -> Result<LinkOutcome> {
        let Some((first, second)) = canonical_pair(&link.file_id1, &link.file_id2) else {
            bail!("refusing to link document {} to itself", link.file_id1);
        };
        let result = sqlx::query(
            r#"
            INSERT INTO duplicate_links (file_id1, file_id2, score, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(file_id1, file_id2) DO NOTHING
            "#,
        )
        .bind(&first)
        .bind(&second)
        .bind(link.score as f64)
        .bind(link.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            LinkOutcome::Inserted
        } else {
            LinkOutcome::Conflict
        })
    }

    async fn duplicate_links(&self, document_id: &str) -> Result<Vec<DuplicateLink>> {
        let rows = sqlx::query(
            r#"
            SELECT file_id1, file_id2, score, created_at FROM duplicate_links
            WHERE file_id1 = ? OR file_id2 = ?
            ORDER BY score DESC, file_id1, file_id2
            "#,
        )
        .bind(document_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DuplicateLink {
                file_id1: row.get("file_id1"),
                file_id2: row.get("file_id2"),
                score: row.get::<f64, _>("score") as f32,
                created_at: from_millis(row.get("created_at")),
            })
            .collect())
    }
}
