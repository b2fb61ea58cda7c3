//! Core type definitions for the Threadline memory system.
//!
//! Entries are immutable dialogue turns; threads reference them through
//! [`EntryId`]s, which are never reused, so a thread stays valid no matter
//! how many entries the log evicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Stable identifier of a log entry.
///
/// Assigned from a strictly increasing counter at append time. Unlike a
/// position, an id survives eviction of older entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// The id that follows this one, or `None` at the top of the id space.
    ///
    /// An id is only ever handed out if it has a successor, so the counter
    /// can always move past every live id.
    #[must_use]
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for a topic thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    /// Create a new random thread ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Dialogue
// ---------------------------------------------------------------------------

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human participant.
    User,
    /// The generator's own reply.
    Assistant,
    /// Instructions for the generator; only used in assembled context.
    System,
}

impl Role {
    /// The wire name of the role (`"user"`, `"assistant"`, `"system"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dialogue turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// When the turn was appended.
    pub timestamp: DateTime<Utc>,
    /// Who spoke.
    pub role: Role,
    /// What was said. Never blank.
    pub content: String,
    /// Optional label, usually the speaker's display name.
    #[serde(default)]
    pub topic: Option<String>,
}

impl Entry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            role,
            content: content.into(),
            topic,
        }
    }
}

/// A `(role, content)` pair handed to the text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Speaker role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ContextMessage {
    /// Create a new context message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Entry> for ContextMessage {
    fn from(entry: &Entry) -> Self {
        Self::new(entry.role, entry.content.clone())
    }
}

impl From<Entry> for ContextMessage {
    fn from(entry: Entry) -> Self {
        Self {
            role: entry.role,
            content: entry.content,
        }
    }
}

// ---------------------------------------------------------------------------
// Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity.
///
/// An empty vector means "no embedding": the provider was disabled, failed,
/// or the request was cancelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// The empty embedding.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean norm.
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Whether this embedding can take part in similarity comparisons:
    /// non-empty and of non-zero magnitude.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.is_empty() && self.magnitude() >= f32::EPSILON
    }

    /// Cosine similarity between two embeddings.
    /// See [`crate::embedding::cosine_similarity`].
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        crate::embedding::cosine_similarity(self, other)
    }

    /// Equal-weight mean of `self` and `other`.
    ///
    /// This is the centroid update rule: the result is dominated by recent
    /// joins rather than being a running mean over all members. When the
    /// dimensions differ (or `self` is empty) the newcomer wins outright.
    #[must_use]
    pub fn blend(&self, other: &Self) -> Self {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return other.clone();
        }
        Self(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a + b) * 0.5)
                .collect(),
        )
    }

    /// Unit-length copy of the vector (the zero vector is returned unchanged).
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mag = self.magnitude();
        if mag < f32::EPSILON {
            return self.clone();
        }
        Self(self.0.iter().map(|x| x / mag).collect())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

// ---------------------------------------------------------------------------
// Thread inspection
// ---------------------------------------------------------------------------

/// A one-line view of a thread for inspection / UI listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    /// Thread identifier.
    pub id: ThreadId,
    /// Short descriptive label.
    pub label: String,
    /// Number of member references (including ones evicted from the log
    /// but not yet forgotten).
    pub member_count: usize,
    /// Last membership change.
    pub updated_at: DateTime<Utc>,
}
