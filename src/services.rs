//! Wiring of the configured capabilities into a [`Pipeline`].

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use docsift_core::index::VectorIndex;
use docsift_core::pipeline::Pipeline;

use crate::config::{Config, IndexConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::FileExtractor;
use crate::migrate::migrate_pool;
use crate::qdrant::QdrantIndex;
use crate::sqlite_index::SqliteVectorIndex;
use crate::sqlite_store::SqliteStore;
use crate::summarize::create_summarizer;

/// Everything a command or request handler needs.
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<Pipeline>,
    pub pool: SqlitePool,
}

impl AppContext {
    /// Open the database (applying migrations) and build the pipeline.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let summarizer = create_summarizer(&config.summarizer)?;
        let index = open_index(&config.index, &pool, embedder.dims()).await?;

        tracing::info!(
            embedder = embedder.model_name(),
            summarizer = summarizer.model_name(),
            index = %config.index.backend,
            "pipeline ready"
        );

        let pipeline = Pipeline::new(
            Arc::new(FileExtractor::new(&config.extraction)),
            summarizer,
            embedder,
            Arc::new(SqliteStore::new(pool.clone())),
            index,
            config.pipeline_settings(),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            pool,
        })
    }
}

async fn open_index(
    config: &IndexConfig,
    pool: &SqlitePool,
    dims: usize,
) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "qdrant" => {
            let url = config
                .url
                .as_deref()
                .context("index.url required for the qdrant backend")?;
            let api_key = match &config.api_key_env {
                Some(var) => Some(
                    std::env::var(var)
                        .with_context(|| format!("{} environment variable not set", var))?,
                ),
                None => None,
            };
            let index = QdrantIndex::new(url, &config.collection, api_key)?;
            if dims > 0 {
                index
                    .ensure_collection(dims)
                    .await
                    .context("Failed to prepare Qdrant collection")?;
            }
            Ok(Arc::new(index))
        }
        _ => Ok(Arc::new(SqliteVectorIndex::new(pool.clone()))),
    }
}
