//! Context assembly: the orchestration layer over the memory log, the
//! thread index and the embedding worker.
//!
//! Recording a turn appends it to the log first, then embeds it and routes
//! it into a thread. Building a context embeds the pending user text, picks
//! the closest thread and returns the recency window followed by the tail of
//! that thread. No lock is held while an embedding is awaited.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::{ThreadingConfig, ThreadlineConfig};
use crate::embedding::{EmbeddingProvider, EmbeddingWorker};
use crate::log::MemoryLog;
use crate::metrics::{spans, CounterSnapshot, ThreadlineCounters};
use crate::threads::{RouteOutcome, ThreadIndex};
use crate::types::{ContextMessage, Entry, EntryId, Role, ThreadId, ThreadSummary};

/// Knobs the assembler reads on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSettings {
    /// Route turns into threads and blend thread history into contexts.
    pub threading_enabled: bool,
    /// Size of the recency window.
    pub max_recent: usize,
    /// Most thread members appended after the recency window.
    pub max_from_thread: usize,
}

impl ContextSettings {
    /// Settings taken from the threading section.
    #[must_use]
    pub fn from_config(config: &ThreadingConfig) -> Self {
        Self {
            threading_enabled: config.enabled,
            max_recent: config.max_recent,
            max_from_thread: config.max_from_thread,
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self::from_config(&ThreadingConfig::default())
    }
}

/// What [`ContextAssembler::record_turn`] did with a turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedTurn {
    /// Stable id of the logged entry.
    pub entry_id: EntryId,
    /// Position of the entry right after the append.
    pub position: usize,
    /// Routing outcome; `None` when threading is off or no usable
    /// embedding was obtained.
    pub thread: Option<RouteOutcome>,
}

/// Records dialogue turns and assembles generator context.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct ContextAssembler {
    log: MemoryLog,
    index: ThreadIndex,
    worker: EmbeddingWorker,
    settings: ContextSettings,
    counters: Arc<ThreadlineCounters>,
}

impl ContextAssembler {
    /// Open the log and thread index under the configured storage directory
    /// and start an embedding worker around `provider`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime (the worker is spawned).
    #[must_use]
    pub fn open(config: &ThreadlineConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let counters = Arc::new(ThreadlineCounters::new());
        let log = MemoryLog::open(
            config.storage.log_path(),
            &config.memory,
            config.storage.compaction_threshold_bytes,
        )
        .with_counters(Arc::clone(&counters));
        let index = ThreadIndex::open(config.storage.threads_path(), &config.threading)
            .with_counters(Arc::clone(&counters));
        let worker = EmbeddingWorker::spawn(provider, &config.embedding, Arc::clone(&counters));

        info!(
            dir = %config.storage.dir.display(),
            entries = log.len(),
            threads = index.len(),
            model = %worker.model_name(),
            "Threadline memory opened"
        );
        Self::from_parts(log, index, worker, ContextSettings::from_config(&config.threading))
    }

    /// Assemble from explicitly constructed collaborators. Context counters
    /// are reported into the log's counter set.
    ///
    /// New entry ids always start past every id the thread index still
    /// references, even when the log file was lost or truncated.
    #[must_use]
    pub fn from_parts(
        log: MemoryLog,
        index: ThreadIndex,
        worker: EmbeddingWorker,
        settings: ContextSettings,
    ) -> Self {
        if let Some(highest) = index.max_member_id() {
            log.reserve_ids_after(highest);
        }
        let counters = log.counters();
        Self {
            log,
            index,
            worker,
            settings,
            counters,
        }
    }

    /// The memory log.
    #[must_use]
    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    /// The thread index.
    #[must_use]
    pub fn index(&self) -> &ThreadIndex {
        &self.index
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> ContextSettings {
        self.settings
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Log a turn, then embed it and route it into a thread.
    ///
    /// Returns `None` only when the log rejected the turn (blank content or
    /// logging disabled). Embedding failure, timeout or cancellation leaves
    /// the turn logged but unthreaded.
    pub async fn record_turn(
        &self,
        role: Role,
        content: &str,
        topic: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<RecordedTurn> {
        let span = tracing::debug_span!(spans::RECORD_TURN, role = %role);
        async {
            let Some(appended) = self.log.append(role, content, topic) else {
                return None;
            };
            if appended.evicted > 0 {
                if let Some(oldest) = self.log.oldest_id() {
                    self.index.forget_before(oldest);
                }
            }

            let mut recorded = RecordedTurn {
                entry_id: appended.id,
                position: appended.position,
                thread: None,
            };
            if !self.settings.threading_enabled {
                return Some(recorded);
            }

            let embedding = self.worker.embed(content, cancel).await;
            if !embedding.is_usable() {
                debug!(entry = %appended.id, "No usable embedding; turn left unthreaded");
                return Some(recorded);
            }
            // Concurrent appends may have evicted the entry while we waited.
            if self.log.position_of(appended.id).is_none() {
                debug!(entry = %appended.id, "Entry evicted before routing");
                return Some(recorded);
            }

            recorded.thread = Some(self.index.route_entry(appended.id, &embedding, topic, content));
            Some(recorded)
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    /// Build the ordered context for a reply to `user_text`.
    ///
    /// The result is the recency window followed by up to
    /// `max_from_thread` of the most recently joined members of the best
    /// matching thread, in join order. Overlap between the two parts is
    /// kept. If the query cannot be embedded no thread matches.
    pub async fn build_context(
        &self,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Vec<ContextMessage> {
        let span = tracing::debug_span!(spans::BUILD_CONTEXT);
        async {
            let start = Instant::now();
            ThreadlineCounters::bump(&self.counters.contexts_built);

            if !self.settings.threading_enabled {
                return self.log.recent_for_context(self.settings.max_recent);
            }

            let query = self.worker.embed(user_text, cancel).await;
            let mut context = self.log.recent_for_context(self.settings.max_recent);
            let recent = context.len();

            let matched = if query.is_usable() {
                self.index.best_match_scored(&query)
            } else {
                None
            };
            if let Some((thread, similarity)) = matched.as_ref() {
                let live = self.log.resolve(&thread.member_ids);
                let skip = live.len().saturating_sub(self.settings.max_from_thread);
                context.extend(live.into_iter().skip(skip).map(ContextMessage::from));
                debug!(thread = %thread.id, similarity, "Blended thread history");
            }

            debug!(
                recent,
                from_thread = context.len() - recent,
                matched = matched.is_some(),
                elapsed_us = start.elapsed().as_micros(),
                "Built context"
            );
            context
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------
    // Inspection and lifecycle
    // ------------------------------------------------------------------

    /// Entries of one thread that are still in the log, in join order.
    #[must_use]
    pub fn thread_entries(&self, id: ThreadId) -> Vec<Entry> {
        self.index
            .get(id)
            .map(|thread| self.log.resolve(&thread.member_ids))
            .unwrap_or_default()
    }

    /// Thread summaries, most recently updated first.
    #[must_use]
    pub fn summaries(&self) -> Vec<ThreadSummary> {
        self.index.summaries()
    }

    /// Empty the log and the thread index together.
    pub fn clear_all(&self) {
        self.log.clear_all_with(|| self.index.clear());
    }

    /// Compact the log and persist the index (shutdown path).
    pub fn flush(&self) {
        self.log.flush();
        if let Err(e) = self.index.save() {
            warn!(error = %e, "Thread index flush failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
