//! `docsift duplicates` and `docsift similar`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::services::AppContext;

/// Run duplicate detection for one document and print every stored link.
pub async fn run_duplicates(config: &Config, id: &str, threshold: Option<f32>) -> Result<()> {
    let threshold = threshold.unwrap_or(config.dedup.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("--threshold must be in [0.0, 1.0]");
    }
    let ctx = AppContext::from_config(config).await?;
    let found = ctx.pipeline.find_duplicates_at(id, threshold).await?;
    let newly = found.iter().filter(|m| m.newly_linked).count();
    let links = ctx.pipeline.duplicate_links(id).await?;

    println!("duplicates of {} (threshold {:.2})", id, threshold);
    if links.is_empty() {
        println!("  none");
    }
    for link in &links {
        println!("  [{:.3}] {}", link.score, link.other(id));
    }
    println!("  new links: {}", newly);
    Ok(())
}

pub async fn run_similar(config: &Config, id: &str, top_k: Option<usize>) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let top_k = top_k.unwrap_or(config.search.default_top_k);
    let similar = ctx.pipeline.similar_documents(id, top_k).await?;

    if similar.is_empty() {
        println!("No similar documents.");
        return Ok(());
    }
    for (i, doc) in similar.iter().enumerate() {
        println!("{}. [{:.3}] {}  {}", i + 1, doc.score, doc.filename, doc.document_id);
    }
    Ok(())
}
