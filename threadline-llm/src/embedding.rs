//! HTTP embedding provider for Ollama and OpenAI-compatible endpoints.
//!
//! Errors are returned to the [`EmbeddingWorker`](threadline_core::EmbeddingWorker),
//! which degrades them to empty vectors; nothing here retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use threadline_core::config::EmbeddingConfig;
use threadline_core::embedding::{DisabledEmbeddingProvider, EmbeddingProvider};
use threadline_core::types::Embedding;
use tracing::{debug, warn};

use crate::error::LlmError;

/// Where embeddings come from.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    /// `POST {base_url}/api/embeddings` with `{model, prompt}`.
    Ollama {
        /// Server root.
        base_url: String,
    },
    /// `POST {base_url}/v1/embeddings` with `{model, input}`.
    OpenAiCompatible {
        /// Server root without the `/v1` suffix.
        base_url: String,
        /// Optional bearer token.
        api_key: Option<String>,
    },
}

/// Embedding provider backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    backend: EmbeddingBackend,
    http: Client,
    model: String,
    timeout: Duration,
}

impl HttpEmbeddingProvider {
    /// Create a provider for `model` on `backend`.
    #[must_use]
    pub fn new(backend: EmbeddingBackend, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            http: Client::new(),
            model: model.into(),
            timeout,
        }
    }

    /// Build from the `[embedding]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] when the provider name is not an
    /// HTTP backend.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let backend = match config.provider.trim().to_ascii_lowercase().as_str() {
            "ollama" => EmbeddingBackend::Ollama { base_url },
            "openai" | "openai-compatible" => EmbeddingBackend::OpenAiCompatible {
                base_url,
                api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            },
            other => {
                return Err(LlmError::ConfigError(format!(
                    "{other:?} is not an HTTP embedding provider"
                )));
            }
        };
        Ok(Self::new(
            backend,
            config.model.clone(),
            Duration::from_millis(config.request_timeout_ms),
        ))
    }

    async fn request(&self, text: &str) -> Result<Embedding, LlmError> {
        let builder = match &self.backend {
            EmbeddingBackend::Ollama { base_url } => self
                .http
                .post(format!("{base_url}/api/embeddings"))
                .json(&json!({ "model": self.model, "prompt": text })),
            EmbeddingBackend::OpenAiCompatible { base_url, api_key } => {
                let builder = self
                    .http
                    .post(format!("{base_url}/v1/embeddings"))
                    .json(&json!({ "model": self.model, "input": text }));
                match api_key {
                    Some(key) => builder.bearer_auth(key),
                    None => builder,
                }
            }
        };

        let resp = builder.timeout(self.timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
            } else {
                LlmError::from(e)
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("HTTP {status}: {body}")));
        }
        let json: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        extract_embedding(&json)
    }
}

/// Pull the vector out of a response: top-level `embedding`, or
/// `data[0].embedding` for OpenAI-style bodies.
///
/// # Errors
///
/// Returns [`LlmError::ParseError`] if neither field is present or the
/// array holds a non-numeric value.
pub fn extract_embedding(json: &Value) -> Result<Embedding, LlmError> {
    let array = json
        .get("embedding")
        .or_else(|| json.pointer("/data/0/embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::ParseError("response has no embedding array".into()))?;

    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| LlmError::ParseError(format!("non-numeric embedding value {v}")))
        })
        .collect::<Result<Vec<f32>, _>>()
        .map(Embedding)
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> threadline_core::error::Result<Embedding> {
        let start = Instant::now();
        let embedding = self.request(text).await?;
        debug!(
            model = %self.model,
            dims = embedding.dimensions(),
            elapsed_ms = start.elapsed().as_millis(),
            "Embedded text"
        );
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// The provider the `[embedding]` section asks for: HTTP when enabled and
/// valid, otherwise the disabled provider (with a warning for bad names).
#[must_use]
pub fn provider_from_config(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    if !config.enabled || config.provider.trim().eq_ignore_ascii_case("none") {
        return Arc::new(DisabledEmbeddingProvider);
    }
    match HttpEmbeddingProvider::from_config(config) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            warn!(error = %e, "Embedding provider misconfigured; threading will be inactive");
            Arc::new(DisabledEmbeddingProvider)
        }
    }
}
