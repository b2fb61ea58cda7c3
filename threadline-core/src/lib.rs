//! # Threadline Core Library
//!
//! Conversational memory for a text generator. Every dialogue turn is kept
//! in two structures:
//!
//! - **Memory log** — a capacity-bounded, append-only transcript mirrored to
//!   a JSONL file ([`MemoryLog`])
//! - **Thread index** — topic threads built by online nearest-centroid
//!   clustering of turn embeddings ([`ThreadIndex`])
//!
//! The [`ContextAssembler`] records turns into both and builds the context
//! for a reply: the most recent turns followed by the latest members of the
//! thread closest to the pending user text.
//!
//! ## Concurrency Contract
//!
//! - The log and the index each sit behind one short-lived mutex
//! - Embedding requests go through an [`EmbeddingWorker`] and are awaited
//!   with no lock held
//! - A failed, timed-out or cancelled embedding degrades to an empty vector;
//!   the turn is still logged

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod log;
pub mod metrics;
pub mod persistence;
pub mod telemetry;
pub mod threads;
pub mod types;

pub use config::ThreadlineConfig;
pub use context::{ContextAssembler, ContextSettings, RecordedTurn};
pub use embedding::{EmbeddingProvider, EmbeddingWorker};
pub use error::ThreadlineError;
pub use log::MemoryLog;
pub use threads::{RouteKind, RouteOutcome, Thread, ThreadIndex};
pub use types::*;
