//! # threadline-llm — HTTP collaborators for Threadline
//!
//! The memory core only sees the [`EmbeddingProvider`] trait and hands out
//! [`ContextMessage`] lists. This crate supplies the network side:
//!   - **Embeddings** from Ollama (`/api/embeddings`) or any
//!     OpenAI-compatible server (`/v1/embeddings`)
//!   - **Chat completion** seeded from an assembled context, with retry
//!
//! [`EmbeddingProvider`]: threadline_core::EmbeddingProvider
//! [`ContextMessage`]: threadline_core::ContextMessage

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]

pub mod client;
pub mod embedding;
pub mod error;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use embedding::{provider_from_config, EmbeddingBackend, HttpEmbeddingProvider};
pub use error::LlmError;
pub use types::{ChatMessage, ChatRequest, ChatResponse};
