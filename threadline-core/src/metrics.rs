//! Runtime counters for the memory system.
//!
//! Lock-free `AtomicU64` counters, one set per [`crate::ContextAssembler`]
//! (shared with its log, index and embedding worker through an `Arc`).
//! Read them with [`ThreadlineCounters::snapshot`] for dashboards or
//! Prometheus text export.

use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for high-frequency events.
#[derive(Debug)]
pub struct ThreadlineCounters {
    /// Entries appended to the log.
    pub entries_appended: AtomicU64,
    /// Appends rejected (blank content or disabled log).
    pub entries_rejected: AtomicU64,
    /// Entries dropped from the front of the window.
    pub entries_evicted: AtomicU64,
    /// Log file rewrites.
    pub compactions: AtomicU64,
    /// Threads founded.
    pub threads_created: AtomicU64,
    /// Entries joined to an existing thread.
    pub threads_joined: AtomicU64,
    /// Embedding requests that errored.
    pub embedding_failures: AtomicU64,
    /// Embedding requests that ran out of time.
    pub embedding_timeouts: AtomicU64,
    /// Embedding requests cancelled by the caller.
    pub embedding_cancellations: AtomicU64,
    /// Contexts assembled for the generator.
    pub contexts_built: AtomicU64,
}

impl ThreadlineCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries_appended: AtomicU64::new(0),
            entries_rejected: AtomicU64::new(0),
            entries_evicted: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            threads_created: AtomicU64::new(0),
            threads_joined: AtomicU64::new(0),
            embedding_failures: AtomicU64::new(0),
            embedding_timeouts: AtomicU64::new(0),
            embedding_cancellations: AtomicU64::new(0),
            contexts_built: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
            entries_evicted: self.entries_evicted.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            threads_created: self.threads_created.load(Ordering::Relaxed),
            threads_joined: self.threads_joined.load(Ordering::Relaxed),
            embedding_failures: self.embedding_failures.load(Ordering::Relaxed),
            embedding_timeouts: self.embedding_timeouts.load(Ordering::Relaxed),
            embedding_cancellations: self.embedding_cancellations.load(Ordering::Relaxed),
            contexts_built: self.contexts_built.load(Ordering::Relaxed),
        }
    }
}

impl Default for ThreadlineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Entries appended.
    pub entries_appended: u64,
    /// Appends rejected.
    pub entries_rejected: u64,
    /// Entries evicted.
    pub entries_evicted: u64,
    /// Log compactions.
    pub compactions: u64,
    /// Threads founded.
    pub threads_created: u64,
    /// Thread joins.
    pub threads_joined: u64,
    /// Failed embedding requests.
    pub embedding_failures: u64,
    /// Timed-out embedding requests.
    pub embedding_timeouts: u64,
    /// Cancelled embedding requests.
    pub embedding_cancellations: u64,
    /// Contexts built.
    pub contexts_built: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 10] = [
            ("entries_appended", "Entries appended to the memory log", self.entries_appended),
            ("entries_rejected", "Appends rejected", self.entries_rejected),
            ("entries_evicted", "Entries evicted from the window", self.entries_evicted),
            ("compactions", "Log file compactions", self.compactions),
            ("threads_created", "Threads founded", self.threads_created),
            ("threads_joined", "Entries joined to existing threads", self.threads_joined),
            ("embedding_failures", "Embedding requests that failed", self.embedding_failures),
            ("embedding_timeouts", "Embedding requests that timed out", self.embedding_timeouts),
            (
                "embedding_cancellations",
                "Embedding requests cancelled by the caller",
                self.embedding_cancellations,
            ),
            ("contexts_built", "Generator contexts assembled", self.contexts_built),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP threadline_{name}_total {help}\n\
                 # TYPE threadline_{name}_total counter\n\
                 threadline_{name}_total {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Recording one dialogue turn.
    pub const RECORD_TURN: &str = "threadline::record_turn";
    /// Assembling generator context.
    pub const BUILD_CONTEXT: &str = "threadline::build_context";
    /// Embedding request (async).
    pub const EMBED: &str = "threadline::embed";
    /// Log file compaction.
    pub const COMPACT: &str = "threadline::log::compact";
    /// Log load.
    pub const LOG_LOAD: &str = "threadline::log::load";
    /// Thread index persistence.
    pub const THREADS_SAVE: &str = "threadline::threads::save";
}
