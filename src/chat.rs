//! Chat completion capability consumed by the pipeline.
//!
//! The pipeline never talks to a model provider directly. It is handed an
//! implementation of [`ChatClient`] at construction: the host application
//! supplies the real transport, tests supply scripted fakes. A streamed
//! completion is an async sequence of [`ChatDelta`] items, content fragments
//! in arrival order with usage totals reported at most once near the end.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl ChatUsage {
    /// Providers that do not meter a request report all-zero usage.
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

/// One item of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatDelta {
    /// A verbatim text fragment, append-only.
    Content(String),
    /// Usage totals for the whole request.
    Usage(ChatUsage),
}

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A non-streamed completion result.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<ChatUsage>,
}

/// Failure surfaced by the chat capability.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat capability unavailable: {0}")]
    Unavailable(String),
    #[error("chat stream failed: {0}")]
    Stream(String),
    #[error("chat completion failed: {0}")]
    Completion(String),
}

/// Streamed completion deltas in arrival order.
pub type DeltaStream = BoxStream<'static, Result<ChatDelta, ChatError>>;

/// The external chat completion capability.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Start a streamed completion.
    async fn stream_completion(&self, request: ChatRequest) -> Result<DeltaStream, ChatError>;

    /// Run a single non-streamed completion.
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, ChatError>;

    /// Approximate token count for a transcript, used when the provider
    /// reports no usage. Roughly four characters per token, rounded up.
    fn estimate_tokens(&self, messages: &[ChatMessage]) -> u32 {
        estimate_tokens(messages)
    }
}

/// Default token estimate: total characters divided by four, rounded up.
pub fn estimate_tokens(messages: &[ChatMessage]) -> u32 {
    let total_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    total_chars.div_ceil(4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        let messages = vec![ChatMessage::user("abcde")];
        assert_eq!(estimate_tokens(&messages), 2);
    }

    #[test]
    fn test_estimate_sums_all_messages() {
        let messages = vec![
            ChatMessage::system("abcd"),
            ChatMessage::user("efgh"),
            ChatMessage::assistant("ijkl"),
        ];
        assert_eq!(estimate_tokens(&messages), 3);
    }

    #[test]
    fn test_estimate_empty_is_zero() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_usage_is_empty_on_zeros() {
        assert!(ChatUsage::default().is_empty());
        assert!(!ChatUsage {
            prompt_tokens: 3,
            completion_tokens: 0,
            total_tokens: 3
        }
        .is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }
}
