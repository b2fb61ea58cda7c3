//! Configuration for the Threadline memory system.
//!
//! Maps directly to `threadline.toml`. Every field has a serde default, so a
//! partial (or empty) file is valid. Values that the engine clamps are
//! exposed through `effective_*` accessors; the raw value is kept so it
//! round-trips unchanged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Smallest window the memory log will accept.
pub const MIN_MAX_ENTRIES: usize = 10;
/// Lower bound of the effective similarity threshold.
pub const MIN_SIMILARITY_THRESHOLD: f32 = 0.1;
/// Upper bound of the effective similarity threshold.
pub const MAX_SIMILARITY_THRESHOLD: f32 = 0.95;
/// Default on-disk size at which the log file is compacted (10 MiB).
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Top-level Threadline configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadlineConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Where durable files live.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Memory log settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Topic threading settings.
    #[serde(default)]
    pub threading: ThreadingConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Chat completion settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl ThreadlineConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ThreadlineError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ThreadlineError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize back to TOML.
    ///
    /// # Errors
    /// Returns `ThreadlineError::Config` if serialization fails.
    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::ThreadlineError::Config(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Storage directory and durable file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory owned exclusively by this process.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
    /// Newline-delimited JSON entry log, relative to `dir`.
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Thread index document, relative to `dir`.
    #[serde(default = "default_threads_file")]
    pub threads_file: String,
    /// Log file size (bytes) above which it is rewritten to the live window.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold_bytes: u64,
}

impl StorageConfig {
    /// Full path of the entry log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(&self.log_file)
    }

    /// Full path of the thread index document.
    #[must_use]
    pub fn threads_path(&self) -> PathBuf {
        self.dir.join(&self.threads_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            log_file: default_log_file(),
            threads_file: default_threads_file(),
            compaction_threshold_bytes: DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

/// Memory log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether turns are recorded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Window size; values below [`MIN_MAX_ENTRIES`] are raised to it.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl MemoryConfig {
    /// The window size actually enforced.
    #[must_use]
    pub fn effective_max_entries(&self) -> usize {
        self.max_entries.max(MIN_MAX_ENTRIES)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 500,
        }
    }
}

/// Topic threading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadingConfig {
    /// Whether turns are clustered into threads.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum cosine similarity for joining an existing thread.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Most recent log entries included in every context.
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,
    /// Most recently joined thread members appended after the recency window.
    #[serde(default = "default_max_from_thread")]
    pub max_from_thread: usize,
    /// Words taken from the founding entry when no topic is supplied.
    #[serde(default = "default_label_max_words")]
    pub label_max_words: usize,
    /// Hard cap on label length in characters.
    #[serde(default = "default_label_max_chars")]
    pub label_max_chars: usize,
}

impl ThreadingConfig {
    /// The threshold actually used, clamped to
    /// [`MIN_SIMILARITY_THRESHOLD`, `MAX_SIMILARITY_THRESHOLD`].
    /// A NaN threshold falls back to the default.
    #[must_use]
    pub fn effective_similarity_threshold(&self) -> f32 {
        if self.similarity_threshold.is_nan() {
            return default_similarity_threshold();
        }
        self.similarity_threshold
            .clamp(MIN_SIMILARITY_THRESHOLD, MAX_SIMILARITY_THRESHOLD)
    }
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.78,
            max_recent: 12,
            max_from_thread: 6,
            label_max_words: 6,
            label_max_chars: 48,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// When false every embedding request yields an empty vector.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the embeddings API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Bearer token for OpenAI-compatible endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard timeout for one embedding request in milliseconds.
    #[serde(default = "default_5000")]
    pub request_timeout_ms: u64,
    /// Provider calls allowed in flight at once.
    #[serde(default = "default_2_usize")]
    pub max_concurrent_requests: usize,
    /// Pending requests buffered by the embedding worker.
    #[serde(default = "default_64")]
    pub queue_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            request_timeout_ms: 5000,
            max_concurrent_requests: 2,
            queue_capacity: 64,
        }
    }
}

/// Chat completion settings for the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Chat model name.
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Bearer token for OpenAI-compatible endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default = "default_0_7")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_300")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:3b".to_string(),
            api_key: None,
            request_timeout_ms: 30_000,
            max_retries: 2,
            temperature: 0.7,
            max_tokens: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_storage_dir() -> PathBuf { PathBuf::from("threadline-data") }
fn default_log_file() -> String { "memory.jsonl".to_string() }
fn default_threads_file() -> String { "threads.json".to_string() }
fn default_compaction_threshold() -> u64 { DEFAULT_COMPACTION_THRESHOLD }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text".to_string() }
fn default_chat_model() -> String { "qwen2.5:3b".to_string() }
fn default_similarity_threshold() -> f32 { 0.78 }
fn default_0_7() -> f32 { 0.7 }
fn default_2() -> u32 { 2 }
fn default_2_usize() -> usize { 2 }
fn default_max_recent() -> usize { 12 }
fn default_max_from_thread() -> usize { 6 }
fn default_label_max_words() -> usize { 6 }
fn default_label_max_chars() -> usize { 48 }
fn default_max_entries() -> usize { 500 }
fn default_64() -> usize { 64 }
fn default_300() -> u32 { 300 }
fn default_5000() -> u64 { 5000 }
fn default_30000() -> u64 { 30_000 }
