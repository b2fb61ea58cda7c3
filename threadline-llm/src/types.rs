//! Chat request and response types.

use serde::{Deserialize, Serialize};
use threadline_core::config::LlmConfig;
use threadline_core::types::{ContextMessage, Role};

/// One message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"` or `"assistant"`.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<ContextMessage> for ChatMessage {
    fn from(msg: ContextMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content,
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Ordered conversation, system prompt first if any.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl ChatRequest {
    /// Seed a request from an assembled context.
    ///
    /// A blank `system_prompt` is left out. The context is passed through
    /// unchanged, duplicates included.
    #[must_use]
    pub fn from_context(system_prompt: &str, context: Vec<ContextMessage>) -> Self {
        let mut messages = Vec::with_capacity(context.len() + 1);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage::new(Role::System, system_prompt));
        }
        messages.extend(context.into_iter().map(ChatMessage::from));
        Self {
            messages,
            max_tokens: 300,
            temperature: 0.7,
            timeout_ms: 30_000,
        }
    }

    /// Take sampling and timeout settings from configuration.
    #[must_use]
    pub fn with_config(mut self, config: &LlmConfig) -> Self {
        self.max_tokens = config.max_tokens;
        self.temperature = config.temperature;
        self.timeout_ms = config.request_timeout_ms;
        self
    }

    /// Append the pending user text.
    #[must_use]
    pub fn with_user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::new(Role::User, text));
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Generated text.
    pub text: String,
    /// Tokens generated (0 when the backend does not report it).
    pub tokens_generated: u32,
    /// Wall-clock latency of the successful attempt.
    pub latency_ms: u64,
    /// Model that produced the text.
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_context_prepends_system_prompt() {
        let context = vec![
            ContextMessage::new(Role::User, "hi"),
            ContextMessage::new(Role::Assistant, "hello"),
            ContextMessage::new(Role::User, "hi"),
        ];
        let request = ChatRequest::from_context("You are Ayla.", context).with_user("and now?");
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::User]
        );
        assert_eq!(request.messages[3].content, "hi");
    }

    #[test]
    fn blank_system_prompt_is_skipped() {
        let request = ChatRequest::from_context("  ", vec![ContextMessage::new(Role::User, "x")]);
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn config_overrides_sampling() {
        let config = LlmConfig {
            max_tokens: 42,
            temperature: 0.1,
            request_timeout_ms: 900,
            ..LlmConfig::default()
        };
        let request = ChatRequest::from_context("", Vec::new()).with_config(&config);
        assert_eq!((request.max_tokens, request.timeout_ms), (42, 900));
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn messages_serialize_with_wire_roles() {
        let json = serde_json::to_value(ChatMessage::new(Role::Assistant, "ok")).expect("serialize");
        assert_eq!(json, serde_json::json!({ "role": "assistant", "content": "ok" }));
    }
}
