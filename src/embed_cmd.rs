//! `docsift reindex`: rebuild chunk and centroid vectors for every stored
//! document, e.g. after switching embedding model or index backend.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::services::AppContext;

pub async fn run_reindex(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let ctx = AppContext::from_config(config).await?;
    let reports = ctx.pipeline.reindex_all().await?;

    let chunks: usize = reports.iter().map(|r| r.chunks).sum();
    let embedded: usize = reports.iter().map(|r| r.embedded_chunks).sum();
    for report in reports.iter().filter(|r| !r.warnings.is_empty()) {
        for warning in &report.warnings {
            println!("  {}: {}", report.document_id, warning);
        }
    }

    println!("reindex");
    println!("  documents: {}", reports.len());
    println!("  chunks: {}", chunks);
    println!("  embedded: {}", embedded);
    if embedded < chunks {
        println!("  skipped: {}", chunks - embedded);
    }
    println!("ok");
    Ok(())
}
