//! # docsift CLI
//!
//! ```bash
//! docsift --config ./config/docsift.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsift init` | Create the SQLite database and run schema migrations |
//! | `docsift ingest <paths...>` | Ingest files or directories |
//! | `docsift list` | List documents, newest first |
//! | `docsift get <id>` | Show a document with summary, tags, and duplicates |
//! | `docsift search "<query>"` | Semantic search |
//! | `docsift keyword <word>` | Whole-word keyword search |
//! | `docsift tags <tag>` | Documents carrying a tag |
//! | `docsift duplicates <id>` | Run duplicate detection for a document |
//! | `docsift similar <id>` | Nearest documents by centroid |
//! | `docsift summarize <id>` | On-demand summary |
//! | `docsift delete <id>` | Delete a document |
//! | `docsift reindex` | Rebuild all vectors |
//! | `docsift serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docsift::{config, dedup_cmd, embed_cmd, get, ingest, logging, migrate, search, server};
use docsift_core::summary::SummaryMode;

/// docsift: document ingestion, search, and near-duplicate detection.
#[derive(Parser)]
#[command(name = "docsift", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsift.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest files; directories are walked recursively.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Declared content type for every file (default: by extension).
        #[arg(long)]
        content_type: Option<String>,
    },

    /// List documents.
    List,

    /// Show one document.
    Get { id: String },

    /// Semantic search over chunk embeddings.
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Keyword search over extracted text.
    Keyword {
        word: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Documents whose tags contain TAG.
    Tags { tag: String },

    /// Run duplicate detection for a document and show its links.
    Duplicates {
        id: String,

        /// Similarity cutoff for this run (default: `[dedup].threshold`).
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Documents most similar to ID.
    Similar {
        id: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Summarize a stored document (short, medium, or long).
    Summarize {
        id: String,

        #[arg(long, default_value = "short")]
        mode: SummaryMode,
    },

    /// Delete a document with its vectors, tags, and duplicate links.
    Delete { id: String },

    /// Rebuild chunk and centroid vectors for every document.
    Reindex,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            content_type,
        } => {
            ingest::run_ingest(&cfg, &paths, content_type.as_deref()).await?;
        }
        Commands::List => get::run_list(&cfg).await?,
        Commands::Get { id } => get::run_get(&cfg, &id).await?,
        Commands::Search { query, top_k } => search::run_search(&cfg, &query, top_k).await?,
        Commands::Keyword { word, limit } => search::run_keyword(&cfg, &word, limit).await?,
        Commands::Tags { tag } => get::run_tags(&cfg, &tag).await?,
        Commands::Duplicates { id, threshold } => {
            dedup_cmd::run_duplicates(&cfg, &id, threshold).await?
        }
        Commands::Similar { id, top_k } => dedup_cmd::run_similar(&cfg, &id, top_k).await?,
        Commands::Summarize { id, mode } => get::run_summarize(&cfg, &id, mode).await?,
        Commands::Delete { id } => get::run_delete(&cfg, &id).await?,
        Commands::Reindex => embed_cmd::run_reindex(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
