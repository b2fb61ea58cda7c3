//! Topic threads, built by online nearest-centroid clustering of dialogue turns.
//!
//! Every routed entry either joins the thread whose centroid it is most
//! similar to (when the similarity clears the threshold) or founds a new
//! thread. A join replaces the centroid with the equal-weight mean of the
//! old centroid and the newcomer, so drift follows recent conversation.
//!
//! Threads reference entries by [`EntryId`], never by position, and the
//! whole index is persisted as one JSON document after every mutation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ThreadingConfig;
use crate::error::Result;
use crate::metrics::{spans, ThreadlineCounters};
use crate::persistence;
use crate::types::{Embedding, EntryId, ThreadId, ThreadSummary};

const DOCUMENT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// A cluster of semantically related entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Stable identifier.
    pub id: ThreadId,
    /// Short label from the founding entry's topic or first words.
    pub label: String,
    /// Representative vector; empty if no usable embedding ever arrived.
    #[serde(default)]
    pub centroid: Embedding,
    /// Member entries in join order.
    #[serde(default)]
    pub member_ids: Vec<EntryId>,
    /// Last membership change.
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// The `n` most recently joined members, in join order.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[EntryId] {
        let start = self.member_ids.len().saturating_sub(n);
        &self.member_ids[start..]
    }

    fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id,
            label: self.label.clone(),
            member_count: self.member_ids.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Whether a routed entry founded a thread or joined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// A new thread was created around the entry.
    Created,
    /// The entry joined an existing thread.
    Joined,
}

/// Outcome of [`ThreadIndex::route_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteOutcome {
    /// Thread the entry now belongs to.
    pub thread_id: ThreadId,
    /// Created or joined.
    pub kind: RouteKind,
    /// Similarity to the best existing centroid (0 when there was none).
    pub similarity: f32,
}

/// Derive a thread label: the trimmed topic if present, else the first
/// `max_words` words of `content`, capped at `max_chars` characters.
#[must_use]
pub fn derive_label(topic: Option<&str>, content: &str, max_words: usize, max_chars: usize) -> String {
    let base = match topic.map(str::trim).filter(|t| !t.is_empty()) {
        Some(topic) => topic.to_string(),
        None => content
            .split_whitespace()
            .take(max_words.max(1))
            .collect::<Vec<_>>()
            .join(" "),
    };
    if base.chars().count() <= max_chars {
        return base;
    }
    base.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

// ---------------------------------------------------------------------------
// On-disk document
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ThreadDocumentRef<'a> {
    version: u32,
    threads: &'a [Thread],
}

/// Parse a thread document leniently: a `{version, threads}` object or a
/// bare array, skipping individual threads that do not deserialize.
fn parse_document(raw: &str) -> Option<(Vec<Thread>, usize)> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("threads") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let total = items.len();
    let threads: Vec<Thread> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    let skipped = total - threads.len();
    Some((threads, skipped))
}

// ---------------------------------------------------------------------------
// ThreadIndex
// ---------------------------------------------------------------------------

/// The set of topic threads.
///
/// One mutex guards the thread list and its persistence; routing reads the
/// centroids and commits the join/create inside a single critical section,
/// so a decision is never made against a stale snapshot.
pub struct ThreadIndex {
    threads: Mutex<Vec<Thread>>,
    threshold: f32,
    label_max_words: usize,
    label_max_chars: usize,
    path: Option<PathBuf>,
    counters: Arc<ThreadlineCounters>,
}

impl std::fmt::Debug for ThreadIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadIndex")
            .field("path", &self.path)
            .field("threshold", &self.threshold)
            .field("threads", &self.threads.lock().len())
            .finish_non_exhaustive()
    }
}

impl ThreadIndex {
    /// Open the index backed by `path`, loading existing threads.
    /// A missing or malformed file yields an empty index.
    pub fn open(path: impl Into<PathBuf>, config: &ThreadingConfig) -> Self {
        let index = Self::build(Some(path.into()), config);
        index.load();
        index
    }

    /// An index with no backing file.
    #[must_use]
    pub fn in_memory(config: &ThreadingConfig) -> Self {
        Self::build(None, config)
    }

    fn build(path: Option<PathBuf>, config: &ThreadingConfig) -> Self {
        Self {
            threads: Mutex::new(Vec::new()),
            threshold: config.effective_similarity_threshold(),
            label_max_words: config.label_max_words,
            label_max_chars: config.label_max_chars,
            path,
            counters: Arc::new(ThreadlineCounters::new()),
        }
    }

    /// Report into a shared counter set instead of a private one.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ThreadlineCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// The clamped similarity threshold in use.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    /// Whether there are no threads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }

    /// Copy of one thread.
    #[must_use]
    pub fn get(&self, id: ThreadId) -> Option<Thread> {
        self.threads.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Copy of every thread, in creation order.
    #[must_use]
    pub fn threads(&self) -> Vec<Thread> {
        self.threads.lock().clone()
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Route a newly appended entry into a thread.
    ///
    /// Creates a new thread when there are none, when the best similarity
    /// is below the threshold, or when the best thread has no usable
    /// centroid. Otherwise joins the best thread and blends its centroid.
    /// The index is persisted before returning; persistence failures are
    /// logged.
    pub fn route_entry(
        &self,
        id: EntryId,
        embedding: &Embedding,
        topic: Option<&str>,
        content: &str,
    ) -> RouteOutcome {
        let start = Instant::now();
        let mut threads = self.threads.lock();

        let best = best_index(&threads, embedding);
        let outcome = match best {
            Some((i, similarity))
                if similarity >= self.threshold && threads[i].centroid.is_usable() =>
            {
                let thread = &mut threads[i];
                thread.member_ids.push(id);
                thread.centroid = thread.centroid.blend(embedding);
                thread.updated_at = Utc::now();
                ThreadlineCounters::bump(&self.counters.threads_joined);
                RouteOutcome {
                    thread_id: thread.id,
                    kind: RouteKind::Joined,
                    similarity,
                }
            }
            _ => {
                let thread = Thread {
                    id: ThreadId::new(),
                    label: derive_label(topic, content, self.label_max_words, self.label_max_chars),
                    centroid: embedding.clone(),
                    member_ids: vec![id],
                    updated_at: Utc::now(),
                };
                let thread_id = thread.id;
                debug!(thread = %thread_id, label = %thread.label, "Created thread");
                threads.push(thread);
                ThreadlineCounters::bump(&self.counters.threads_created);
                RouteOutcome {
                    thread_id,
                    kind: RouteKind::Created,
                    similarity: best.map_or(0.0, |(_, s)| s),
                }
            }
        };

        self.persist_locked(&threads);
        debug!(
            entry = %id,
            thread = %outcome.thread_id,
            kind = ?outcome.kind,
            similarity = outcome.similarity,
            elapsed_us = start.elapsed().as_micros(),
            "Routed entry"
        );
        outcome
    }

    /// The thread most similar to `embedding`, or `None` when there are no
    /// threads. Ties go to the earliest thread. No threshold is applied.
    #[must_use]
    pub fn best_match(&self, embedding: &Embedding) -> Option<Thread> {
        let threads = self.threads.lock();
        best_index(&threads, embedding).map(|(i, _)| threads[i].clone())
    }

    /// Like [`best_match`](Self::best_match), also returning the similarity.
    #[must_use]
    pub fn best_match_scored(&self, embedding: &Embedding) -> Option<(Thread, f32)> {
        let threads = self.threads.lock();
        best_index(&threads, embedding).map(|(i, s)| (threads[i].clone(), s))
    }

    // ------------------------------------------------------------------
    // Inspection and maintenance
    // ------------------------------------------------------------------

    /// One summary per thread, most recently updated first.
    #[must_use]
    pub fn summaries(&self) -> Vec<ThreadSummary> {
        let mut out: Vec<ThreadSummary> = self.threads.lock().iter().map(Thread::summary).collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// Highest entry id referenced by any thread.
    #[must_use]
    pub fn max_member_id(&self) -> Option<EntryId> {
        self.threads
            .lock()
            .iter()
            .flat_map(|thread| thread.member_ids.iter().copied())
            .max()
    }

    /// Drop member ids older than `oldest_live`. Threads themselves are kept.
    /// Returns the number of ids removed; persists only if something changed.
    pub fn forget_before(&self, oldest_live: EntryId) -> usize {
        let mut threads = self.threads.lock();
        let mut removed = 0usize;
        for thread in threads.iter_mut() {
            let before = thread.member_ids.len();
            thread.member_ids.retain(|id| *id >= oldest_live);
            removed += before - thread.member_ids.len();
        }
        if removed > 0 {
            self.persist_locked(&threads);
            debug!(removed, oldest_live = %oldest_live, "Forgot evicted thread members");
        }
        removed
    }

    /// Remove every thread and persist the empty index.
    pub fn clear(&self) {
        let mut threads = self.threads.lock();
        let dropped = threads.len();
        threads.clear();
        self.persist_locked(&threads);
        info!(dropped, "Cleared thread index");
    }

    /// Replace the in-memory threads with the contents of the backing file.
    /// Returns the number of threads loaded.
    pub fn load(&self) -> usize {
        let Some(path) = self.path.as_deref() else {
            return 0;
        };
        let loaded = match std::fs::read_to_string(path) {
            Ok(raw) => match parse_document(&raw) {
                Some((threads, skipped)) => {
                    if skipped > 0 {
                        warn!(path = %path.display(), skipped, "Skipped malformed threads");
                    }
                    threads
                }
                None => {
                    warn!(path = %path.display(), "Thread index is malformed; starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read thread index; starting empty");
                Vec::new()
            }
        };

        let count = loaded.len();
        *self.threads.lock() = loaded;
        info!(path = %path.display(), threads = count, "Loaded thread index");
        count
    }

    /// Write the index to its backing file now.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self) -> Result<()> {
        let threads = self.threads.lock();
        self.write_document(&threads)
    }

    fn persist_locked(&self, threads: &[Thread]) {
        if let Err(e) = self.write_document(threads) {
            warn!(error = %e, "Thread index persistence failed; in-memory state kept");
        }
    }

    fn write_document(&self, threads: &[Thread]) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _span = tracing::debug_span!(spans::THREADS_SAVE, threads = threads.len()).entered();
        let doc = ThreadDocumentRef {
            version: DOCUMENT_VERSION,
            threads,
        };
        persistence::write_atomically(path, |out| {
            serde_json::to_writer_pretty(&mut *out, &doc)?;
            Ok(out.write_all(b"\n")?)
        })
    }
}

/// Index and similarity of the most similar thread. Strict `>` keeps the
/// first thread on ties.
fn best_index(threads: &[Thread], embedding: &Embedding) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, thread) in threads.iter().enumerate() {
        let similarity = thread.centroid.cosine_similarity(embedding);
        match best {
            Some((_, s)) if similarity <= s => {}
            _ => best = Some((i, similarity)),
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
