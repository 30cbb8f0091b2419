//! # Docsift Core
//!
//! Domain logic for docsift: document models, text preprocessing, chunking,
//! tagging, summary fallbacks, the capability traits (extractor, summarizer,
//! embedder), the document store and vector index abstractions, duplicate
//! detection, and the ingestion pipeline that ties them together.
//!
//! Nothing in this crate touches SQLite, HTTP, or the filesystem. The app
//! crate supplies concrete providers and backends; tests drive the pipeline
//! with the in-memory [`store::memory::InMemoryStore`] and
//! [`index::memory::InMemoryIndex`].

pub mod chunk;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod search;
pub mod store;
pub mod summary;
pub mod tagging;
