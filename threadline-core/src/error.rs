//! Error types for the Threadline core library.

use thiserror::Error;

/// Top-level error type for all Threadline operations.
///
/// Most operations on the memory log and thread index are best-effort and
/// log failures instead of returning them; this type surfaces where a caller
/// needs to react (export, import, configuration, embedding).
#[derive(Error, Debug)]
pub enum ThreadlineError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding provider failed to produce a vector.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// An external call did not finish in time.
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// A collaborator (embedding worker, remote endpoint) is not available.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ThreadlineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ThreadlineError>;
