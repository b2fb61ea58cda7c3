//! The memory log: an append-only, capacity-bounded window of dialogue
//! turns, mirrored to a newline-delimited JSON file.
//!
//! The in-memory window is authoritative. Every append is written as one
//! record to the file; when the file grows past the compaction threshold it
//! is rewritten (atomically) to hold exactly the current window. File
//! failures are logged and never take the in-memory state down with them.
//!
//! Each entry carries an [`EntryId`] from a never-reused counter alongside
//! its position. Positions shift on every eviction; ids do not.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MemoryConfig, DEFAULT_COMPACTION_THRESHOLD};
use crate::error::{Result, ThreadlineError};
use crate::metrics::{spans, ThreadlineCounters};
use crate::persistence;
use crate::types::{ContextMessage, Entry, EntryId, Role};

// ---------------------------------------------------------------------------
// On-disk record
// ---------------------------------------------------------------------------

/// One line of the log file.
///
/// `id` is absent in files written by other tools; such records get fresh
/// ids on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<EntryId>,
    timestamp: DateTime<Utc>,
    role: Role,
    content: String,
    #[serde(default)]
    topic: Option<String>,
}

impl LogRecord {
    fn new(id: EntryId, entry: &Entry) -> Self {
        Self {
            id: Some(id),
            timestamp: entry.timestamp,
            role: entry.role,
            content: entry.content.clone(),
            topic: entry.topic.clone(),
        }
    }

    fn into_entry(self) -> Entry {
        Entry {
            timestamp: self.timestamp,
            role: self.role,
            content: self.content,
            topic: self.topic,
        }
    }
}

/// Only non-blank user and assistant turns belong in the transcript.
fn is_loggable(role: Role, content: &str) -> bool {
    role != Role::System && !content.trim().is_empty()
}

// ---------------------------------------------------------------------------
// MemoryLog
// ---------------------------------------------------------------------------

/// Result of a successful [`MemoryLog::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Stable id of the new entry.
    pub id: EntryId,
    /// Position of the new entry in the window right after the append.
    pub position: usize,
    /// How many entries were evicted from the front to make room.
    pub evicted: usize,
}

struct LogInner {
    window: VecDeque<(EntryId, Entry)>,
    next_id: EntryId,
    /// Lazily opened append handle; dropped after compaction or failure.
    file: Option<File>,
}

/// Append-only, capacity-bounded dialogue log.
///
/// All methods take `&self`; a single mutex guards the window and the file
/// writer, and is never held across an `.await`.
///
/// # Usage
///
/// ```no_run
/// # use threadline_core::log::MemoryLog;
/// # use threadline_core::config::MemoryConfig;
/// # use threadline_core::types::Role;
/// let log = MemoryLog::open("data/memory.jsonl", &MemoryConfig::default(), 10 * 1024 * 1024);
/// let appended = log.append(Role::User, "hello there", Some("Ayla"));
/// assert_eq!(appended.map(|a| a.position), Some(log.len() - 1));
/// ```
pub struct MemoryLog {
    inner: Mutex<LogInner>,
    enabled: bool,
    max_entries: usize,
    compaction_threshold: u64,
    path: Option<PathBuf>,
    counters: Arc<ThreadlineCounters>,
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("path", &self.path)
            .field("enabled", &self.enabled)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

impl MemoryLog {
    /// Open the log backed by `path` and load whatever it already holds.
    ///
    /// Load failures are logged; the log then starts empty.
    pub fn open(path: impl Into<PathBuf>, config: &MemoryConfig, compaction_threshold: u64) -> Self {
        let log = Self::build(Some(path.into()), config, compaction_threshold);
        log.load();
        log
    }

    /// A log with no backing file (tests, ephemeral sessions).
    #[must_use]
    pub fn in_memory(config: &MemoryConfig) -> Self {
        Self::build(None, config, DEFAULT_COMPACTION_THRESHOLD)
    }

    fn build(path: Option<PathBuf>, config: &MemoryConfig, compaction_threshold: u64) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                window: VecDeque::new(),
                next_id: EntryId(0),
                file: None,
            }),
            enabled: config.enabled,
            max_entries: config.effective_max_entries(),
            compaction_threshold,
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

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The counter set this log reports into.
    #[must_use]
    pub fn counters(&self) -> Arc<ThreadlineCounters> {
        Arc::clone(&self.counters)
    }

    /// Whether the log records turns.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Effective capacity of the window.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of entries in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().window.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().window.is_empty()
    }

    /// Id of the oldest entry still in the window.
    #[must_use]
    pub fn oldest_id(&self) -> Option<EntryId> {
        self.inner.lock().window.front().map(|(id, _)| *id)
    }

    /// Current position of the entry with `id`, if it is still in the window.
    #[must_use]
    pub fn position_of(&self, id: EntryId) -> Option<usize> {
        let inner = self.inner.lock();
        inner.window.binary_search_by_key(&id, |(i, _)| *i).ok()
    }

    /// Make sure every future id is greater than `after`.
    ///
    /// Other stores (the thread index) can outlive the log file; seeding
    /// from them keeps a lost or truncated log from handing out ids that
    /// are still referenced elsewhere.
    pub fn reserve_ids_after(&self, after: EntryId) {
        let floor = after.checked_next().unwrap_or(EntryId(u64::MAX));
        let mut inner = self.inner.lock();
        if floor > inner.next_id {
            debug!(from = %inner.next_id, to = %floor, "Raised entry id counter");
            inner.next_id = floor;
        }
    }

    // ------------------------------------------------------------------
    // Append
    // ------------------------------------------------------------------

    /// Append a turn.
    ///
    /// Blank content, a `System` role (system text belongs to assembled
    /// context, not the transcript) or a disabled log is rejected and
    /// returns `None`.
    /// Otherwise the entry is written to the file, the oldest entries are
    /// evicted if the window overflows, and the file is compacted if it has
    /// grown past the threshold.
    pub fn append(&self, role: Role, content: &str, topic: Option<&str>) -> Option<Appended> {
        if !self.enabled || !is_loggable(role, content) {
            ThreadlineCounters::bump(&self.counters.entries_rejected);
            debug!(enabled = self.enabled, role = %role, "Rejected append");
            return None;
        }

        let topic = topic
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let entry = Entry::new(role, content, topic);

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        let Some(next) = id.checked_next() else {
            drop(inner);
            ThreadlineCounters::bump(&self.counters.entries_rejected);
            warn!(id = %id, "Entry id space exhausted; append rejected");
            return None;
        };
        inner.next_id = next;

        self.write_record(&mut inner, id, &entry);
        inner.window.push_back((id, entry));
        let evicted = self.evict_overflow(&mut inner);
        let position = inner.window.len() - 1;

        ThreadlineCounters::bump(&self.counters.entries_appended);
        debug!(id = %id, position, evicted, "Appended entry");

        if self.file_len(&inner) > self.compaction_threshold {
            if let Err(e) = self.compact_locked(&mut inner) {
                warn!(error = %e, "Log compaction failed; file left as is");
            }
        }

        Some(Appended { id, position, evicted })
    }

    fn write_record(&self, inner: &mut LogInner, id: EntryId, entry: &Entry) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if inner.file.is_none() {
            match persistence::open_append(path) {
                Ok(file) => inner.file = Some(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot open log file; entry kept in memory only");
                    return;
                }
            }
        }
        if let Some(file) = inner.file.as_mut() {
            if let Err(e) = persistence::append_jsonl(file, &LogRecord::new(id, entry)) {
                warn!(path = %path.display(), error = %e, "Log write failed; entry kept in memory only");
                inner.file = None;
            }
        }
    }

    fn evict_overflow(&self, inner: &mut LogInner) -> usize {
        let overflow = inner.window.len().saturating_sub(self.max_entries);
        if overflow > 0 {
            inner.window.drain(..overflow);
            self.counters
                .entries_evicted
                .fetch_add(overflow as u64, Ordering::Relaxed);
        }
        overflow
    }

    fn file_len(&self, inner: &LogInner) -> u64 {
        if let Some(file) = inner.file.as_ref() {
            if let Ok(meta) = file.metadata() {
                return meta.len();
            }
        }
        self.path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map_or(0, |m| m.len())
    }

    /// Rewrite the file to exactly the current window.
    fn compact_locked(&self, inner: &mut LogInner) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _span = tracing::debug_span!(spans::COMPACT).entered();
        let start = Instant::now();
        let records: Vec<LogRecord> = inner
            .window
            .iter()
            .map(|(id, entry)| LogRecord::new(*id, entry))
            .collect();

        // The old handle would keep appending to the replaced inode.
        inner.file = None;
        persistence::write_jsonl(path, &records)?;

        ThreadlineCounters::bump(&self.counters.compactions);
        info!(
            path = %path.display(),
            entries = records.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Compacted memory log"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The last `min(n, len)` turns, oldest first. Empty when disabled.
    #[must_use]
    pub fn recent_for_context(&self, n: usize) -> Vec<ContextMessage> {
        if !self.enabled {
            return Vec::new();
        }
        let inner = self.inner.lock();
        let skip = inner.window.len().saturating_sub(n);
        inner
            .window
            .iter()
            .skip(skip)
            .map(|(_, entry)| ContextMessage::from(entry))
            .collect()
    }

    /// Consistent copy of the whole window.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Entry> {
        self.inner.lock().window.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Consistent copy of the whole window with entry ids.
    #[must_use]
    pub fn snapshot_with_ids(&self) -> Vec<(EntryId, Entry)> {
        self.inner.lock().window.iter().cloned().collect()
    }

    /// Look up entries by id, in the order given, skipping ids that are no
    /// longer in the window.
    #[must_use]
    pub fn resolve(&self, ids: &[EntryId]) -> Vec<Entry> {
        let inner = self.inner.lock();
        ids.iter()
            .filter_map(|id| {
                inner
                    .window
                    .binary_search_by_key(id, |(i, _)| *i)
                    .ok()
                    .map(|pos| inner.window[pos].1.clone())
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Rebuild the window from the backing file.
    ///
    /// Malformed and blank records are skipped; if the file holds more than
    /// the capacity, only the newest entries are kept. Returns the number of
    /// entries now in the window.
    pub fn load(&self) -> usize {
        let Some(path) = self.path.as_deref() else {
            return 0;
        };
        if !self.enabled {
            return 0;
        }
        let _span = tracing::debug_span!(spans::LOG_LOAD).entered();
        let start = Instant::now();

        let read = match persistence::read_jsonl::<LogRecord>(path) {
            Ok(read) => read,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read memory log; starting empty");
                return 0;
            }
        };

        let mut window = VecDeque::with_capacity(read.records.len().min(self.max_entries));
        let mut last: Option<EntryId> = None;
        let mut rejected = 0usize;
        for record in read.records {
            if !is_loggable(record.role, &record.content) {
                rejected += 1;
                continue;
            }
            let candidate = match (record.id, last) {
                (Some(id), Some(prev)) if id > prev => Some(id),
                (Some(id), None) => Some(id),
                (_, Some(prev)) => prev.checked_next(),
                (None, None) => Some(EntryId(0)),
            };
            // The counter must be able to move past every accepted id.
            let Some(id) = candidate.filter(|id| id.checked_next().is_some()) else {
                rejected += 1;
                continue;
            };
            last = Some(id);
            window.push_back((id, record.into_entry()));
        }
        let dropped = window.len().saturating_sub(self.max_entries);
        window.drain(..dropped);

        let mut inner = self.inner.lock();
        let next_from_file = last.and_then(EntryId::checked_next).unwrap_or(EntryId(0));
        inner.next_id = inner.next_id.max(next_from_file);
        inner.window = window;
        inner.file = None;
        let loaded = inner.window.len();
        drop(inner);

        info!(
            path = %path.display(),
            loaded,
            skipped = read.skipped + rejected,
            truncated = dropped,
            elapsed_us = start.elapsed().as_micros(),
            "Loaded memory log"
        );
        loaded
    }

    /// Force a compaction (used at shutdown). Failures are logged.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        if let Err(e) = self.compact_locked(&mut inner) {
            warn!(error = %e, "Log flush failed");
        }
    }

    /// Empty the window and truncate the file. Best-effort.
    pub fn clear_all(&self) {
        self.clear_all_with(|| {});
    }

    /// Like [`clear_all`](Self::clear_all), running `also` while the log
    /// lock is still held so another store can be cleared atomically with
    /// this one.
    pub fn clear_all_with<F: FnOnce()>(&self, also: F) {
        let mut inner = self.inner.lock();
        let dropped = inner.window.len();
        inner.window.clear();
        inner.file = None;

        if let Some(path) = self.path.as_deref() {
            if path.exists() {
                if let Err(e) = File::create(path) {
                    warn!(path = %path.display(), error = %e, "Cannot truncate memory log");
                }
            }
        }
        also();
        drop(inner);
        info!(dropped, "Cleared memory log");
    }

    // ------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------

    /// Write the window to `path` (or a timestamped file next to the log)
    /// as JSONL. Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns an error if the export file cannot be written.
    pub fn export_to(&self, path: Option<&Path>) -> Result<PathBuf> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let dir = self
                    .path
                    .as_deref()
                    .and_then(Path::parent)
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                dir.join(format!("export-{}.jsonl", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")))
            }
        };

        let records: Vec<LogRecord> = {
            let inner = self.inner.lock();
            inner
                .window
                .iter()
                .map(|(id, entry)| LogRecord::new(*id, entry))
                .collect()
        };
        persistence::write_jsonl(&target, &records)?;
        info!(path = %target.display(), entries = records.len(), "Exported memory log");
        Ok(target)
    }

    /// Read entries from a JSONL export and append them (after clearing the
    /// window when `keep_existing` is false), then compact. Imported entries
    /// get fresh ids. Returns the number of entries accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist or cannot be read.
    /// Individual malformed records are skipped.
    pub fn import_from(&self, path: &Path, keep_existing: bool) -> Result<usize> {
        if !path.exists() {
            return Err(ThreadlineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("import file {} not found", path.display()),
            )));
        }
        let read = persistence::read_jsonl::<LogRecord>(path)?;

        let mut inner = self.inner.lock();
        if !keep_existing {
            inner.window.clear();
        }
        let mut imported = 0usize;
        for record in read.records {
            if !is_loggable(record.role, &record.content) {
                continue;
            }
            let id = inner.next_id;
            let Some(next) = id.checked_next() else {
                warn!(id = %id, "Entry id space exhausted; import stopped early");
                break;
            };
            inner.next_id = next;
            inner.window.push_back((id, record.into_entry()));
            imported += 1;
        }
        let evicted = self.evict_overflow(&mut inner);
        if let Err(e) = self.compact_locked(&mut inner) {
            warn!(error = %e, "Compaction after import failed");
        }
        drop(inner);

        info!(
            path = %path.display(),
            imported,
            skipped = read.skipped,
            evicted,
            keep_existing,
            "Imported memory log"
        );
        Ok(imported)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(max_entries: usize) -> MemoryConfig {
        MemoryConfig {
            enabled: true,
            max_entries,
        }
    }

    fn contents(log: &MemoryLog) -> Vec<String> {
        log.snapshot().into_iter().map(|e| e.content).collect()
    }

    #[test]
    fn blank_content_is_rejected() {
        let log = MemoryLog::in_memory(&config(10));
        assert!(log.append(Role::User, "", None).is_none());
        assert!(log.append(Role::User, "  \n\t", None).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn system_turns_are_rejected() {
        let log = MemoryLog::in_memory(&config(10));
        assert!(log.append(Role::System, "You are a helpful narrator.", None).is_none());
        assert!(log.is_empty());
        assert_eq!(log.counters().snapshot().entries_rejected, 1);
    }

    #[test]
    fn disabled_log_records_nothing() {
        let log = MemoryLog::in_memory(&MemoryConfig {
            enabled: false,
            max_entries: 10,
        });
        assert!(log.append(Role::User, "hello", None).is_none());
        assert!(log.recent_for_context(5).is_empty());
    }

    #[test]
    fn positions_and_ids_increase() {
        let log = MemoryLog::in_memory(&config(10));
        let a = log.append(Role::User, "one", Some("Ayla")).expect("append");
        let b = log.append(Role::Assistant, "two", None).expect("append");
        assert_eq!((a.position, b.position), (0, 1));
        assert!(b.id > a.id);
        assert_eq!(log.snapshot()[0].topic.as_deref(), Some("Ayla"));
    }

    #[test]
    fn capacity_floor_applies() {
        // Configured 3, enforced 10.
        let log = MemoryLog::in_memory(&config(3));
        for i in 0..15 {
            log.append(Role::User, &format!("m{i}"), None);
        }
        assert_eq!(log.len(), 10);
        assert_eq!(contents(&log).first().map(String::as_str), Some("m5"));
    }

    #[test]
    fn eviction_keeps_newest_and_renumbers() {
        let log = MemoryLog::in_memory(&config(10));
        let mut ids = Vec::new();
        for i in 0..12 {
            ids.push(log.append(Role::User, &format!("m{i}"), None).expect("append"));
        }
        assert_eq!(ids[10].evicted, 1);
        assert_eq!(ids[11].position, 9);
        assert_eq!(log.position_of(ids[2].id), Some(0));
        assert_eq!(log.position_of(ids[0].id), None);
        assert_eq!(log.oldest_id(), Some(ids[2].id));
    }

    #[test]
    fn recent_for_context_is_chronological() {
        let log = MemoryLog::in_memory(&config(10));
        for i in 0..5 {
            log.append(Role::User, &format!("m{i}"), None);
        }
        let recent = log.recent_for_context(2);
        assert_eq!(
            recent,
            vec![
                ContextMessage::new(Role::User, "m3"),
                ContextMessage::new(Role::User, "m4")
            ]
        );
        assert_eq!(log.recent_for_context(50).len(), 5);
        assert!(log.recent_for_context(0).is_empty());
    }

    #[test]
    fn resolve_skips_evicted_ids() {
        let log = MemoryLog::in_memory(&config(10));
        let ids: Vec<EntryId> = (0..12)
            .filter_map(|i| log.append(Role::User, &format!("m{i}"), None))
            .map(|a| a.id)
            .collect();
        let resolved = log.resolve(&[ids[0], ids[5], ids[11]]);
        let texts: Vec<&str> = resolved.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(texts, vec!["m5", "m11"]);
    }

    #[test]
    fn reload_restores_window_and_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let last = {
            let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
            log.append(Role::User, "first", Some("Ayla"));
            log.append(Role::Assistant, "second", None).expect("append")
        };

        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        assert_eq!(contents(&log), vec!["first", "second"]);
        assert_eq!(log.position_of(last.id), Some(1));
        let next = log.append(Role::User, "third", None).expect("append");
        assert!(next.id > last.id, "ids are never reused across restarts");
    }

    #[test]
    fn load_skips_malformed_and_truncates_front() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let mut file = File::create(&path).expect("create");
        for i in 0..12 {
            writeln!(
                file,
                r#"{{"timestamp":"2026-01-01T00:00:00Z","role":"user","content":"m{i}","topic":null}}"#
            )
            .expect("write");
            writeln!(file, "garbage line {i}").expect("write");
        }
        writeln!(file, r#"{{"timestamp":"2026-01-01T00:00:00Z","role":"user","content":"  "}}"#)
            .expect("write");
        drop(file);

        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        assert_eq!(log.len(), 10);
        assert_eq!(contents(&log).first().map(String::as_str), Some("m2"));
    }

    #[test]
    fn load_survives_ids_at_the_top_of_the_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let mut file = File::create(&path).expect("create");
        writeln!(file, r#"{{"id":5,"timestamp":"2026-01-01T00:00:00Z","role":"user","content":"kept"}}"#)
            .expect("write");
        writeln!(
            file,
            r#"{{"id":18446744073709551615,"timestamp":"2026-01-01T00:00:00Z","role":"user","content":"no successor"}}"#
        )
        .expect("write");
        writeln!(file, r#"{{"id":7,"timestamp":"2026-01-01T00:00:00Z","role":"system","content":"prompt"}}"#)
            .expect("write");
        drop(file);

        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        assert_eq!(contents(&log), vec!["kept"]);
        let next = log.append(Role::User, "after", None).expect("append");
        assert_eq!(next.id, EntryId(6));
    }

    #[test]
    fn exhausted_id_space_rejects_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let mut file = File::create(&path).expect("create");
        writeln!(
            file,
            r#"{{"id":18446744073709551614,"timestamp":"2026-01-01T00:00:00Z","role":"user","content":"last"}}"#
        )
        .expect("write");
        drop(file);

        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        assert_eq!(contents(&log), vec!["last"]);
        assert!(log.append(Role::User, "one more", None).is_none());
        assert_eq!(contents(&log), vec!["last"]);
    }

    #[test]
    fn reserve_ids_after_only_moves_forward() {
        let log = MemoryLog::in_memory(&config(10));
        log.reserve_ids_after(EntryId(40));
        let first = log.append(Role::User, "a", None).expect("append");
        assert_eq!(first.id, EntryId(41));
        log.reserve_ids_after(EntryId(3));
        let second = log.append(Role::User, "b", None).expect("append");
        assert_eq!(second.id, EntryId(42));
    }

    #[test]
    fn compaction_rewrites_file_to_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let log = MemoryLog::open(&path, &config(10), 512);
        for i in 0..40 {
            log.append(Role::User, &format!("message number {i}"), None);
        }
        // The window alone exceeds the threshold, so every append compacts.
        let lines = std::fs::read_to_string(&path).expect("read").lines().count();
        assert_eq!(lines, 10);

        let reloaded = MemoryLog::open(&path, &config(10), 512);
        assert_eq!(contents(&reloaded), contents(&log));
    }

    #[test]
    fn flush_leaves_exactly_the_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        for i in 0..25 {
            log.append(Role::User, &format!("m{i}"), None);
        }
        log.flush();
        let lines = std::fs::read_to_string(&path).expect("read").lines().count();
        assert_eq!(lines, 10);

        // Appends after a compaction go to the new file.
        log.append(Role::User, "after", None);
        let lines = std::fs::read_to_string(&path).expect("read").lines().count();
        assert_eq!(lines, 11);
    }

    #[test]
    fn clear_all_empties_memory_and_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.jsonl");
        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        let before = log.append(Role::User, "secret", None).expect("append");
        let mut ran = false;
        log.clear_all_with(|| ran = true);
        assert!(ran);
        assert!(log.is_empty());
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), 0);
        let after = log.append(Role::User, "fresh", None).expect("append");
        assert!(after.id > before.id);
    }

    #[test]
    fn export_import_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = MemoryLog::open(dir.path().join("memory.jsonl"), &config(10), DEFAULT_COMPACTION_THRESHOLD);
        log.append(Role::User, "alpha", Some("Ayla"));
        log.append(Role::Assistant, "beta", None);
        let original = log.snapshot();

        let exported = log.export_to(None).expect("export");
        assert!(exported.starts_with(dir.path()));
        log.append(Role::User, "noise", None);

        let imported = log.import_from(&exported, false).expect("import");
        assert_eq!(imported, 2);
        assert_eq!(log.snapshot(), original);
    }

    #[test]
    fn import_keep_existing_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = MemoryLog::in_memory(&config(10));
        source.append(Role::User, "imported", None);
        let file = source.export_to(Some(dir.path().join("x.jsonl").as_path())).expect("export");

        let log = MemoryLog::in_memory(&config(10));
        log.append(Role::User, "existing", None);
        assert_eq!(log.import_from(&file, true).expect("import"), 1);
        assert_eq!(contents(&log), vec!["existing", "imported"]);
    }

    #[test]
    fn import_missing_file_is_an_error() {
        let log = MemoryLog::in_memory(&config(10));
        assert!(log.import_from(Path::new("/definitely/not/here.jsonl"), true).is_err());
    }

    #[test]
    fn unwritable_path_keeps_memory_authoritative() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory where the file should be makes every open fail.
        let path = dir.path().join("memory.jsonl");
        std::fs::create_dir(&path).expect("mkdir");
        let log = MemoryLog::open(&path, &config(10), DEFAULT_COMPACTION_THRESHOLD);
        assert!(log.append(Role::User, "still here", None).is_some());
        assert_eq!(contents(&log), vec!["still here"]);
    }
}
