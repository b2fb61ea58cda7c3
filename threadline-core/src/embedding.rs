//! Vector embedding abstraction layer.
//!
//! Provides a trait-based interface for turning text into embeddings, the
//! similarity math the thread index clusters with, and the
//! [`EmbeddingWorker`] that runs provider calls on a background task so no
//! caller ever awaits a network round trip while holding a lock.
//!
//! The production provider lives in `threadline-llm` (HTTP endpoints).
//! The providers here cover disabled operation, tests and benchmarks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Result, ThreadlineError};
use crate::metrics::ThreadlineCounters;
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync`; they are shared with the
/// embedding worker task.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// A disabled provider returns an empty embedding rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the model or remote endpoint fails to produce a
    /// vector.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// The dimensionality of embeddings produced by this provider
    /// (0 when unknown or disabled).
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` if either vector is
/// empty, the dimensions differ, or either has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() || a.0.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON || !denom.is_finite() {
        return 0.0;
    }

    // Rounding can push identical vectors a hair past 1.0.
    (dot / denom).clamp(-1.0, 1.0)
}

// ---------------------------------------------------------------------------
// Disabled provider
// ---------------------------------------------------------------------------

/// A provider for installations with embeddings switched off.
///
/// Every request yields an empty vector, so turns are logged but never
/// threaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding::empty())
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

// ---------------------------------------------------------------------------
// Normalized random provider (for load testing)
// ---------------------------------------------------------------------------

/// An embedding provider that returns random unit-length vectors.
///
/// Useful for benchmarks that need non-zero, diverse embeddings without a
/// real model. High-dimensional random vectors are nearly orthogonal, so
/// with any sensible threshold almost every turn founds its own thread.
pub struct RandomEmbeddingProvider {
    dims: usize,
}

impl RandomEmbeddingProvider {
    /// Create a new random provider.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for RandomEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        use rand::Rng;
        let raw: Vec<f32> = {
            let mut rng = rand::thread_rng();
            (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect()
        };
        Ok(Embedding(raw).normalized())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "random-unit-vector"
    }
}

// ---------------------------------------------------------------------------
// Lookup-table provider (deterministic tests)
// ---------------------------------------------------------------------------

/// A provider backed by a fixed text → vector table.
///
/// Unknown text is an error, which lets tests exercise the failure path
/// alongside deterministic routing.
#[derive(Debug, Default, Clone)]
pub struct StaticEmbeddingProvider {
    table: HashMap<String, Embedding>,
    dims: usize,
}

impl StaticEmbeddingProvider {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the vector returned for `text`.
    #[must_use]
    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        if self.dims == 0 {
            self.dims = vector.len();
        }
        self.table.insert(text.into(), Embedding(vector));
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| ThreadlineError::Embedding(format!("no vector registered for {text:?}")))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "static-table"
    }
}

// ---------------------------------------------------------------------------
// Embedding worker
// ---------------------------------------------------------------------------

/// One queued request: the text and where to send the answer.
struct EmbedJob {
    text: String,
    reply: oneshot::Sender<Result<Embedding>>,
}

/// Message-passing front end to an [`EmbeddingProvider`].
///
/// Requests travel over a bounded channel to a background task that runs
/// at most `max_concurrent_requests` provider calls at a time. Callers
/// await the reply with their own cancellation token and a hard timeout;
/// any failure degrades to an empty embedding. Cloning shares the worker.
#[derive(Clone)]
pub struct EmbeddingWorker {
    tx: mpsc::Sender<EmbedJob>,
    timeout: Duration,
    counters: Arc<ThreadlineCounters>,
    model: String,
}

impl std::fmt::Debug for EmbeddingWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingWorker")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl EmbeddingWorker {
    /// Spawn the worker task on the current tokio runtime.
    ///
    /// When `config.enabled` is false the given provider is replaced with
    /// [`DisabledEmbeddingProvider`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(
        provider: Arc<dyn EmbeddingProvider>,
        config: &EmbeddingConfig,
        counters: Arc<ThreadlineCounters>,
    ) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = if config.enabled {
            provider
        } else {
            Arc::new(DisabledEmbeddingProvider)
        };
        let model = provider.model_name().to_string();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        tokio::spawn(run_worker(provider, rx, permits));
        debug!(model = %model, "Embedding worker started");

        Self {
            tx,
            timeout: Duration::from_millis(config.request_timeout_ms),
            counters,
            model,
        }
    }

    /// Name of the model behind this worker.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Embed `text`, falling back to an empty vector on any failure.
    ///
    /// Blank text, cancellation through `cancel`, timeout, a provider error
    /// or a stopped worker all return [`Embedding::empty`].
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Embedding {
        if text.trim().is_empty() {
            return Embedding::empty();
        }

        let (reply, response) = oneshot::channel();
        let job = EmbedJob {
            text: text.to_string(),
            reply,
        };
        let tx = self.tx.clone();
        let request = async move {
            if tx.send(job).await.is_err() {
                return Err(ThreadlineError::Unavailable("embedding worker stopped".into()));
            }
            response.await.unwrap_or_else(|_| {
                Err(ThreadlineError::Unavailable(
                    "embedding worker dropped the request".into(),
                ))
            })
        };

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ThreadlineError::Cancelled),
            result = tokio::time::timeout(self.timeout, request) => {
                result.unwrap_or_else(|_| Err(ThreadlineError::Timeout(timeout_ms)))
            }
        };

        match outcome {
            Ok(embedding) => embedding,
            Err(ThreadlineError::Cancelled) => {
                ThreadlineCounters::bump(&self.counters.embedding_cancellations);
                debug!(model = %self.model, "Embedding request cancelled");
                Embedding::empty()
            }
            Err(ThreadlineError::Timeout(ms)) => {
                ThreadlineCounters::bump(&self.counters.embedding_timeouts);
                warn!(model = %self.model, timeout_ms = ms, "Embedding request timed out");
                Embedding::empty()
            }
            Err(e) => {
                ThreadlineCounters::bump(&self.counters.embedding_failures);
                warn!(model = %self.model, error = %e, "Embedding request failed");
                Embedding::empty()
            }
        }
    }
}

/// Worker loop: pull jobs, run each provider call on its own task under a
/// concurrency permit, and abandon calls whose caller stopped listening.
async fn run_worker(
    provider: Arc<dyn EmbeddingProvider>,
    mut rx: mpsc::Receiver<EmbedJob>,
    permits: Arc<Semaphore>,
) {
    while let Some(job) = rx.recv().await {
        if job.reply.is_closed() {
            debug!("Skipping embedding request abandoned by its caller");
            continue;
        }
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let provider = Arc::clone(&provider);

        tokio::spawn(async move {
            let EmbedJob { text, mut reply } = job;
            let outcome = tokio::select! {
                result = provider.embed(&text) => Some(result),
                () = reply.closed() => None,
            };
            drop(permit);
            if let Some(result) = outcome {
                // The caller may have timed out in the meantime.
                let _ = reply.send(result);
            }
        });
    }
    debug!("Embedding worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
