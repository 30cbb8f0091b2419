//! # docsift
//!
//! Document ingestion with near-duplicate detection. Uploaded files are
//! extracted to text, summarized, chunked, embedded, tagged, and linked to
//! near-duplicates; the result is searchable by meaning and by keyword.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────┐   ┌───────────────┐
//! │ CLI / HTTP   │──▶│ Pipeline (docsift-core)      │──▶│ SQLite store  │
//! │ upload bytes │   │ extract→summarize→chunk→     │   │ docs+FTS5     │
//! └──────────────┘   │ embed→tag→dedup              │   └───────────────┘
//!                    └──────────────┬───────────────┘
//!                                   ▼
//!                     ┌──────────────────────────────┐
//!                     │ Vector index: SQLite | Qdrant │
//!                     └──────────────────────────────┘
//! ```
//!
//! The pipeline and its capability traits live in `docsift-core`; this
//! crate supplies the concrete backends, configuration, CLI, and server.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`] | Document, tag, and duplicate-link storage |
//! | [`sqlite_index`] / [`qdrant`] | Vector index backends |
//! | [`embedding`] / [`summarize`] | Model providers |
//! | [`extract`] | PDF, DOCX, text, and OCR extraction |
//! | [`services`] | Capability wiring |
//! | [`server`] | HTTP API |

pub mod config;
pub mod db;
pub mod dedup_cmd;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod qdrant;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_index;
pub mod sqlite_store;
pub mod summarize;
