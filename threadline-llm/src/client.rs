//! Chat client — turns an assembled context into a completion from Ollama
//! or an OpenAI-compatible endpoint.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use threadline_core::config::LlmConfig;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatResponse};

/// Provider backend for chat completion.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// Server root without the `/v1` suffix.
        base_url: String,
        /// Bearer token (may be empty for local servers).
        api_key: String,
    },
    /// No backend; every call fails.
    None,
}

impl LlmProvider {
    /// Parse a provider name as used in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for unknown provider names.
    pub fn from_parts(name: &str, base_url: &str, api_key: Option<&str>) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" | "openai-compatible" => Ok(Self::OpenAiCompatible {
                base_url,
                api_key: api_key.unwrap_or_default().to_string(),
            }),
            "none" | "" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown provider {other:?}"))),
        }
    }
}

/// Chat completion client with retry.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// Build a client from the `[llm]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider name.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = LlmProvider::from_parts(&config.provider, &config.base_url, config.api_key.as_deref())?;
        Ok(Self::new(provider, config.model.clone(), config.max_retries))
    }

    /// A client with no backend; all calls fail.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Model used for completions.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run a chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unavailable`] when no provider is configured,
    /// [`LlmError::RequestFailed`] for non-retryable HTTP statuses, and
    /// [`LlmError::RetriesExhausted`] once every attempt has failed.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let url = format!("{base_url}/api/chat");
                let body = json!({
                    "model": self.model,
                    "messages": request.messages,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                self.send_with_retry("ollama", request.timeout_ms, || self.http.post(&url).json(&body), |json| {
                    let text = json["message"]["content"].as_str()?.to_string();
                    let tokens = json["eval_count"].as_u64().unwrap_or(0);
                    Some((text, tokens))
                })
                .await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let url = format!("{base_url}/v1/chat/completions");
                let body = json!({
                    "model": self.model,
                    "messages": request.messages,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                self.send_with_retry(
                    "openai",
                    request.timeout_ms,
                    || {
                        let builder = self.http.post(&url).json(&body);
                        if api_key.is_empty() {
                            builder
                        } else {
                            builder.bearer_auth(api_key)
                        }
                    },
                    |json| {
                        let text = json["choices"][0]["message"]["content"].as_str()?.to_string();
                        let tokens = json["usage"]["completion_tokens"].as_u64().unwrap_or(0);
                        Some((text, tokens))
                    },
                )
                .await
            }
        }
    }

    /// Send the request up to `max_retries + 1` times. Client errors other
    /// than 429 are returned immediately.
    async fn send_with_retry<B, P>(
        &self,
        backend: &'static str,
        timeout_ms: u64,
        build: B,
        parse: P,
    ) -> Result<ChatResponse, LlmError>
    where
        B: Fn() -> RequestBuilder,
        P: Fn(&Value) -> Option<(String, u64)>,
    {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(backend, attempt = attempt + 1, of = self.max_retries + 1, "Retrying chat call");
            }

            let start = Instant::now();
            let result = build().timeout(Duration::from_millis(timeout_ms)).send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens) = parse(&json).ok_or_else(|| {
                        LlmError::ParseError(format!("{backend} response has no message content"))
                    })?;
                    debug!(backend, latency_ms, tokens, "Chat completion received");
                    return Ok(ChatResponse {
                        text,
                        tokens_generated: u32::try_from(tokens).unwrap_or(u32::MAX),
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(backend, %status, "Chat endpoint returned error");
                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        return Err(LlmError::RequestFailed(last_error));
                    }
                }
                Err(e) if e.is_timeout() => {
                    last_error = format!("timed out after {timeout_ms}ms");
                    warn!(backend, timeout_ms, "Chat request timed out");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(backend, error = %last_error, "Chat request failed");
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}
