//! `docsift search` and `docsift keyword`.

use anyhow::Result;

use crate::config::Config;
use crate::services::AppContext;

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Semantic search over chunk vectors.
pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let top_k = top_k.unwrap_or(config.search.default_top_k);
    let hits = ctx.pipeline.search(query, top_k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.filename);
        println!("    chunk: {}", hit.chunk_index);
        println!("    excerpt: \"{}\"", one_line(&hit.snippet));
        println!("    id: {}", hit.document_id);
        println!();
    }
    Ok(())
}

/// Whole-word keyword search over extracted text.
pub async fn run_keyword(config: &Config, word: &str, limit: Option<usize>) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let limit = limit.unwrap_or(config.search.keyword_limit);
    let hits = ctx.pipeline.keyword_search(word, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. {} ({} occurrences)", i + 1, hit.filename, hit.occurrences);
        println!("    excerpt: \"{}\"", one_line(&hit.snippet));
        println!("    id: {}", hit.document_id);
        println!();
    }
    Ok(())
}
