//! Model-backed summarizers.
//!
//! `[summarizer].provider` selects one of:
//! - `disabled`: every call fails, so the pipeline stores the extractive
//!   fallback with provenance `fallback`.
//! - `ollama`: `POST {url}/api/generate`, non-streaming.
//! - `openai`: `POST https://api.openai.com/v1/chat/completions`.
//!
//! Both HTTP providers share the retry policy of
//! [`crate::embedding::JsonEndpoint`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use docsift_core::error::ProviderError;
use docsift_core::summary::{Summarizer, SummaryMode};

use crate::config::SummarizerConfig;
use crate::embedding::JsonEndpoint;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const SUMMARY_RETRIES: u32 = 1;

pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn summarize(&self, _text: &str, _mode: SummaryMode) -> Result<String, ProviderError> {
        Err(ProviderError::Disabled(
            "no summarizer configured".to_string(),
        ))
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub(crate) fn build_prompt(text: &str, mode: SummaryMode, max_input_chars: usize) -> String {
    let sentences = match mode.sentence_limit() {
        1 => "one sentence".to_string(),
        n => format!("at most {} sentences", n),
    };
    format!(
        "Summarize the following document in {}. Reply with the summary only, \
         without preamble.\n\n---\n{}\n---",
        sentences,
        truncate_chars(text, max_input_chars)
    )
}

fn clean_output(raw: &str) -> Result<String, ProviderError> {
    let out = raw.trim();
    if out.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "model returned an empty summary".to_string(),
        ));
    }
    Ok(out.to_string())
}

pub struct OllamaSummarizer {
    model: String,
    max_input_chars: usize,
    endpoint: JsonEndpoint,
}

impl OllamaSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
        let endpoint = JsonEndpoint::new(
            "Ollama",
            format!("{}/api/generate", base.trim_end_matches('/')),
            None,
            SUMMARY_RETRIES,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            model,
            max_input_chars: config.max_input_chars,
            endpoint,
        })
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str, mode: SummaryMode) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "prompt": build_prompt(text, mode, self.max_input_chars),
            "stream": false,
            "options": { "temperature": 0.1, "num_predict": mode.max_tokens() },
        });
        let json = self.endpoint.post(&body).await?;
        let raw = json
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse("missing response field".into()))?;
        clean_output(raw)
    }
}

pub struct OpenAISummarizer {
    model: String,
    max_input_chars: usize,
    endpoint: JsonEndpoint,
}

impl OpenAISummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let endpoint = JsonEndpoint::new(
            "OpenAI",
            OPENAI_CHAT_URL.to_string(),
            Some(api_key),
            SUMMARY_RETRIES,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            model,
            max_input_chars: config.max_input_chars,
            endpoint,
        })
    }
}

fn parse_chat_response(json: &Value) -> Result<String, ProviderError> {
    let raw = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message".into()))?;
    clean_output(raw)
}

#[async_trait]
impl Summarizer for OpenAISummarizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str, mode: SummaryMode) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.1,
            "max_tokens": mode.max_tokens(),
            "messages": [
                { "role": "system", "content": "You write concise, factual document summaries." },
                { "role": "user", "content": build_prompt(text, mode, self.max_input_chars) },
            ],
        });
        let json = self.endpoint.post(&body).await?;
        parse_chat_response(&json)
    }
}

/// Build the [`Summarizer`] named by `[summarizer].provider`.
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSummarizer)),
        "ollama" => Ok(Arc::new(OllamaSummarizer::new(config)?)),
        "openai" => Ok(Arc::new(OpenAISummarizer::new(config)?)),
        other => bail!("Unknown summarizer provider: {}", other),
    }
}
