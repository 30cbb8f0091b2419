//! Configuration parsing and validation.
//!
//! docsift is configured with a single TOML file. Every section except
//! `[db]` is optional and falls back to the defaults below.
//!
//! ```toml
//! [db]
//! path = "./data/docsift.sqlite"
//!
//! [storage]
//! upload_dir = "./data/uploads"
//!
//! [chunking]
//! max_tokens = 256
//! overlap_tokens = 16
//!
//! [pipeline]
//! summary_mode = "short"
//! min_summary_chars = 64
//! max_tags = 8
//! call_timeout_secs = 60
//! extract_timeout_secs = 120
//!
//! [dedup]
//! threshold = 0.92
//! candidate_k = 10
//!
//! [search]
//! default_top_k = 5
//!
//! [embedding]
//! provider = "ollama"            # disabled | openai | ollama | local
//! model = "all-minilm"
//! dims = 384
//! concurrency = 4
//! retry_backoff_ms = 500
//!
//! [summarizer]
//! provider = "ollama"            # disabled | openai | ollama
//! model = "llama3.1"
//!
//! [extraction]
//! ocr_command = "tesseract"
//!
//! [index]
//! backend = "sqlite"             # sqlite | qdrant
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```
//!
//! The OpenAI providers read `OPENAI_API_KEY` from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docsift_core::dedup::DedupSettings;
use docsift_core::pipeline::PipelineSettings;
use docsift_core::summary::SummaryMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

fn default_max_tokens() -> usize {
    256
}
fn default_overlap() -> usize {
    16
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default)]
    pub summary_mode: SummaryMode,
    #[serde(default = "default_min_summary_chars")]
    pub min_summary_chars: usize,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
}

fn default_min_summary_chars() -> usize {
    64
}
fn default_max_tags() -> usize {
    docsift_core::tagging::DEFAULT_MAX_TAGS
}
fn default_call_timeout_secs() -> u64 {
    60
}
fn default_extract_timeout_secs() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_mode: SummaryMode::default(),
            min_summary_chars: default_min_summary_chars(),
            max_tags: default_max_tags(),
            call_timeout_secs: default_call_timeout_secs(),
            extract_timeout_secs: default_extract_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

fn default_threshold() -> f32 {
    docsift_core::dedup::DEFAULT_THRESHOLD
}
fn default_candidate_k() -> usize {
    docsift_core::dedup::DEFAULT_CANDIDATE_K
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            candidate_k: default_candidate_k(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,
}

fn default_top_k() -> usize {
    5
}
fn default_keyword_limit() -> usize {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            keyword_limit: default_keyword_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_concurrency() -> usize {
    4
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            concurrency: default_concurrency(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Input beyond this many characters is cut before prompting.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_summary_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_input_chars() -> usize {
    12_000
}
fn default_summary_timeout_secs() -> u64 {
    60
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_summary_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    /// OCR executable for images, invoked as `<cmd> stdin stdout`.
    /// Images are rejected when unset.
    #[serde(default)]
    pub ocr_command: Option<String>,
    /// Extra arguments appended after `stdin stdout` (e.g. `["-l", "eng"]`).
    #[serde(default)]
    pub ocr_args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Environment variable holding the Qdrant API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_collection() -> String {
    "docsift".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            collection: default_collection(),
            api_key_env: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    /// Pipeline tunables derived from the configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_tokens: self.chunking.max_tokens,
            overlap_tokens: self.chunking.overlap_tokens,
            summary_mode: self.pipeline.summary_mode,
            min_summary_chars: self.pipeline.min_summary_chars,
            max_tags: self.pipeline.max_tags,
            embed_concurrency: self.embedding.concurrency,
            embed_retry_backoff: Duration::from_millis(self.embedding.retry_backoff_ms),
            call_timeout: Duration::from_secs(self.pipeline.call_timeout_secs),
            extract_timeout: Duration::from_secs(self.pipeline.extract_timeout_secs),
            dedup: DedupSettings {
                threshold: self.dedup.threshold,
                candidate_k: self.dedup.candidate_k,
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
    }

    if !(0.0..=1.0).contains(&config.dedup.threshold) {
        bail!("dedup.threshold must be in [0.0, 1.0]");
    }
    if config.dedup.candidate_k == 0 {
        bail!("dedup.candidate_k must be >= 1");
    }
    if config.search.default_top_k == 0 {
        bail!("search.default_top_k must be >= 1");
    }
    if config.pipeline.call_timeout_secs == 0 || config.pipeline.extract_timeout_secs == 0 {
        bail!("pipeline timeouts must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" | "local" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when set");
            }
            if config.embedding.provider != "local" && config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.concurrency == 0 {
                bail!("embedding.concurrency must be >= 1");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.summarizer.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.summarizer.model.is_none() {
                bail!(
                    "summarizer.model must be specified when provider is '{}'",
                    config.summarizer.provider
                );
            }
        }
        other => bail!(
            "Unknown summarizer provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.index.backend.as_str() {
        "sqlite" => {}
        "qdrant" => {
            if config.index.url.is_none() {
                bail!("index.url must be specified when backend is 'qdrant'");
            }
        }
        other => bail!(
            "Unknown index backend: '{}'. Must be sqlite or qdrant.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.max_tokens, 256);
        assert_eq!(config.dedup.threshold, 0.92);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.index.backend, "sqlite");
        assert_eq!(config.pipeline.summary_mode, SummaryMode::Short);
    }

    #[test]
    fn test_summary_mode_parsed() {
        let config = parse(
            "[db]\npath = \"x\"\n[pipeline]\nsummary_mode = \"long\"\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.summary_mode, SummaryMode::Long);
        assert_eq!(
            config.pipeline_settings().summary_mode.sentence_limit(),
            4
        );
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let err = parse("[db]\npath = \"x\"\n[dedup]\nthreshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("dedup.threshold"));
    }

    #[test]
    fn test_rejects_overlap_not_below_max() {
        let err = parse("[db]\npath = \"x\"\n[chunking]\nmax_tokens = 10\noverlap_tokens = 10\n")
            .unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_qdrant_requires_url() {
        assert!(parse("[db]\npath = \"x\"\n[index]\nbackend = \"qdrant\"\n").is_err());
        assert!(parse(
            "[db]\npath = \"x\"\n[index]\nbackend = \"qdrant\"\nurl = \"http://localhost:6333\"\n"
        )
        .is_ok());
    }

    #[test]
    fn test_summarizer_requires_model() {
        assert!(parse("[db]\npath = \"x\"\n[summarizer]\nprovider = \"ollama\"\n").is_err());
    }
}
