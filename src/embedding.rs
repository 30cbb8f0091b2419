//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by `[embedding].provider`:
//! - **[`DisabledEmbedder`]**: every call fails with `Disabled`; documents
//!   ingest as keyword-searchable only.
//! - **[`OpenAIEmbedder`]**: `POST https://api.openai.com/v1/embeddings`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama.
//! - **`LocalEmbedder`**: in-process fastembed (feature
//!   `local-embeddings-fastembed`).
//!
//! # Retry Strategy
//!
//! [`JsonEndpoint`] retries transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! Embedders make a single attempt per call ([`EMBED_HTTP_RETRIES`]); the
//! pipeline owns the one-retry-then-skip policy per chunk.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use docsift_core::embedding::Embedder;
use docsift_core::error::ProviderError;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Endpoint-level retries for embedding calls.
pub const EMBED_HTTP_RETRIES: u32 = 0;

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Disabled(
            "no embedding provider configured".to_string(),
        ))
    }
}

/// A JSON POST endpoint with the shared retry policy.
pub(crate) struct JsonEndpoint {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
    max_retries: u32,
    timeout: Duration,
    label: &'static str,
}

impl JsonEndpoint {
    pub(crate) fn new(
        label: &'static str,
        url: String,
        bearer: Option<String>,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            bearer,
            max_retries,
            timeout,
            label,
        })
    }

    pub(crate) async fn post(&self, body: &Value) -> Result<Value, ProviderError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.post(&self.url).json(body);
            if let Some(token) = &self.bearer {
                req = req.bearer_auth(token);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err =
                        ProviderError::Request(format!("{} error {}: {}", self.label, status, body_text));
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(provider = self.label, %status, attempt, "retrying provider call");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(ProviderError::Timeout(self.timeout));
                }
                Err(e) if e.is_connect() => {
                    last_err = Some(ProviderError::Unavailable(format!(
                        "{} unreachable at {}: {}",
                        self.label, self.url, e
                    )));
                }
                Err(e) => {
                    last_err = Some(ProviderError::Request(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ProviderError::Request(format!("{} call failed after retries", self.label))
        }))
    }
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn check_dims(vector: Vec<f32>, dims: usize) -> Result<Vec<f32>, ProviderError> {
    if vector.is_empty() {
        return Err(ProviderError::InvalidResponse("empty embedding".to_string()));
    }
    if dims != 0 && vector.len() != dims {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {} dimensions, got {}",
            dims,
            vector.len()
        )));
    }
    Ok(vector)
}

/// `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &Value) -> Result<Vec<f32>, ProviderError> {
    json.get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(parse_vector)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing data[0].embedding".to_string())
        })
}

/// `embeddings[0]` from an Ollama `/api/embed` response.
fn parse_ollama_response(json: &Value) -> Result<Vec<f32>, ProviderError> {
    json.get("embeddings")
        .and_then(|e| e.get(0))
        .and_then(parse_vector)
        .ok_or_else(|| ProviderError::InvalidResponse("missing embeddings[0]".to_string()))
}

pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    endpoint: JsonEndpoint,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let endpoint = JsonEndpoint::new(
            "OpenAI",
            OPENAI_EMBEDDINGS_URL.to_string(),
            Some(api_key),
            EMBED_HTTP_RETRIES,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            model,
            dims,
            endpoint,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({ "model": self.model, "input": [text] });
        let json = self.endpoint.post(&body).await?;
        check_dims(parse_openai_response(&json)?, self.dims)
    }
}

/// Requires Ollama running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    endpoint: JsonEndpoint,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);

        let endpoint = JsonEndpoint::new(
            "Ollama",
            format!("{}/api/embed", base.trim_end_matches('/')),
            None,
            EMBED_HTTP_RETRIES,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            model,
            dims,
            endpoint,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({ "model": self.model, "input": text });
        let json = self.endpoint.post(&body).await?;
        check_dims(parse_ollama_response(&json)?, self.dims)
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::Mutex;

    /// In-process embeddings. The model is downloaded from Hugging Face on
    /// first use, cached, and then kept loaded for the life of the process.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        model: fastembed::EmbeddingModel,
        loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            let model = fastembed_model(&model_name)?;
            let dims = config.dims.unwrap_or(match model_name.as_str() {
                "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
                "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
                _ => 384,
            });
            Ok(Self {
                model_name,
                dims,
                model,
                loaded: Arc::new(Mutex::new(None)),
            })
        }
    }

    fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        use fastembed::EmbeddingModel as M;
        Ok(match name {
            "all-minilm-l6-v2" => M::AllMiniLML6V2,
            "bge-small-en-v1.5" => M::BGESmallENV15,
            "bge-base-en-v1.5" => M::BGEBaseENV15,
            "bge-large-en-v1.5" => M::BGELargeENV15,
            "nomic-embed-text-v1.5" => M::NomicEmbedTextV15,
            "multilingual-e5-small" => M::MultilingualE5Small,
            "multilingual-e5-base" => M::MultilingualE5Base,
            "multilingual-e5-large" => M::MultilingualE5Large,
            other => bail!("Unknown local embedding model: '{}'", other),
        })
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let loaded = Arc::clone(&self.loaded);
            let model = self.model.clone();
            let text = text.to_string();

            let vector = tokio::task::spawn_blocking(move || {
                let mut guard = loaded
                    .lock()
                    .map_err(|_| ProviderError::Unavailable("local model lock poisoned".into()))?;
                if guard.is_none() {
                    let init = fastembed::InitOptions::new(model).with_show_download_progress(false);
                    let embedding = fastembed::TextEmbedding::try_new(init)
                        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
                    *guard = Some(embedding);
                }
                let embedding = guard
                    .as_mut()
                    .ok_or_else(|| ProviderError::Unavailable("local model not loaded".into()))?;
                let mut vectors = embedding
                    .embed(vec![text], None)
                    .map_err(|e| ProviderError::Request(e.to_string()))?;
                vectors
                    .pop()
                    .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned".into()))
            })
            .await
            .map_err(|e| ProviderError::Request(format!("local embedding task failed: {}", e)))??;

            check_dims(vector, self.dims)
        }
    }
}

/// Build the [`Embedder`] named by `[embedding].provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_openai_response() {
        let json = json!({ "data": [ { "index": 0, "embedding": [0.5, -1.0, 2.0] } ] });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -1.0, 2.0]);
        assert!(parse_openai_response(&json!({ "data": [] })).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "model": "m", "embeddings": [[0.25, 0.75]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![0.25, 0.75]);
        assert!(parse_ollama_response(&json!({ "embeddings": [["x"]] })).is_err());
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(vec![1.0, 2.0], 2).is_ok());
        assert!(check_dims(vec![1.0, 2.0], 0).is_ok());
        assert!(matches!(
            check_dims(vec![1.0], 2),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(check_dims(Vec::new(), 0).is_err());
    }

    #[tokio::test]
    async fn test_disabled_embedder_is_unavailable() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert!(matches!(
            embedder.embed("hello").await,
            Err(ProviderError::Disabled(_))
        ));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
