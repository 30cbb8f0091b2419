//! Document inspection commands: `get`, `list`, `tags`, `summarize`,
//! `delete`.

use anyhow::Result;

use docsift_core::models::Document;
use docsift_core::summary::SummaryMode;

use crate::config::Config;
use crate::services::AppContext;

fn format_ts(doc: &Document) -> String {
    doc.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn print_row(doc: &Document) {
    let tags = if doc.tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", doc.tags.join(", "))
    };
    println!(
        "{}  {:<8}  {}  {}{}",
        doc.id,
        doc.status.as_str(),
        format_ts(doc),
        doc.filename,
        tags
    );
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let doc = ctx.pipeline.get_document(id).await?;
    let links = ctx.pipeline.duplicate_links(id).await?;

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("filename:     {}", doc.filename);
    println!("content_type: {}", doc.content_type);
    println!("stored_at:    {}", doc.storage_path);
    println!("sha256:       {}", doc.content_hash);
    println!("status:       {}", doc.status);
    println!("created_at:   {}", format_ts(&doc));
    println!("tags:         {}", doc.tags.join(", "));
    for warning in &doc.warnings {
        println!("warning:      {}", warning);
    }
    println!();

    println!("--- Summary ---");
    if let Some(provenance) = doc.summary_provenance {
        println!("({})", provenance);
    }
    println!("{}", doc.summary.as_deref().unwrap_or(""));
    println!();

    if !links.is_empty() {
        println!("--- Duplicates ({}) ---", links.len());
        for link in &links {
            println!("[{:.3}] {}", link.score, link.other(&doc.id));
        }
        println!();
    }

    println!("--- Content ---");
    println!("{}", doc.content);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let docs = ctx.pipeline.list_documents().await?;
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &docs {
        print_row(doc);
    }
    Ok(())
}

pub async fn run_tags(config: &Config, tag: &str) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let docs = ctx.pipeline.documents_by_tag(tag).await?;
    if docs.is_empty() {
        println!("No documents tagged '{}'.", tag);
        return Ok(());
    }
    for doc in &docs {
        print_row(doc);
    }
    Ok(())
}

pub async fn run_summarize(config: &Config, id: &str, mode: SummaryMode) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let summary = ctx.pipeline.summarize_document(id, mode).await?;
    println!("[{} / {}]", summary.mode, summary.provenance);
    println!("{}", summary.summary);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    if ctx.pipeline.delete_document(id).await? {
        println!("deleted {}", id);
    } else {
        anyhow::bail!("document not found: {}", id);
    }
    Ok(())
}
