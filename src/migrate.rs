//! Idempotent schema setup, run by `docsift init` and on server start.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            content_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            summary TEXT,
            summary_provenance TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            warnings_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_tags (
            document_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (document_id, tag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per unordered pair: ids are stored sorted and the pair is unique.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_links (
            file_id1 TEXT NOT NULL,
            file_id2 TEXT NOT NULL,
            score REAL NOT NULL,
            created_at INTEGER NOT NULL,
            CHECK (file_id1 < file_id2)
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_duplicate_links_pair ON duplicate_links(file_id1, file_id2)",
    )
    .execute(pool)
    .await?;

    // Vectors for the built-in SQLite index. chunk_index is -1 for centroids.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            document_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (document_id, kind, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                document_id UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_tags_tag ON document_tags(tag)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_duplicate_links_file_id2 ON duplicate_links(file_id2)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_kind ON vectors(kind)")
        .execute(pool)
        .await?;

    Ok(())
}
