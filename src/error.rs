//! Request-level error taxonomy.
//!
//! Everything that can stop a stream funnels into [`StreamError`]. Errors
//! raised before the first event is emitted surface to the caller as a
//! failed request; errors raised mid-stream become a terminal `error`
//! event on the wire instead.

use thiserror::Error;

use crate::chat::ChatError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("token quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("chat backend error: {0}")]
    Chat(#[from] ChatError),

    /// Only raised when the fallback mode treats detection failures as
    /// fatal; by default detection degrades silently.
    #[error("detection failed: {0}")]
    Detection(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl StreamError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Validation(_) => "validation",
            StreamError::NotFound(_) => "not_found",
            StreamError::Forbidden(_) => "forbidden",
            StreamError::RateLimited { .. } => "rate_limited",
            StreamError::QuotaExceeded(_) => "quota_exceeded",
            StreamError::Chat(_) => "chat",
            StreamError::Detection(_) => "detection",
            StreamError::Persistence(_) => "persistence",
        }
    }

    /// True for errors the pre-stream gate produces. These reject the
    /// request outright; nothing has been persisted or emitted yet.
    pub fn is_pre_stream(&self) -> bool {
        matches!(
            self,
            StreamError::Validation(_)
                | StreamError::NotFound(_)
                | StreamError::Forbidden(_)
                | StreamError::RateLimited { .. }
                | StreamError::QuotaExceeded(_)
        )
    }

    /// Message safe to put on the wire. Internal detail stays in logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            StreamError::Validation(_) => "Invalid request",
            StreamError::NotFound(_) => "Conversation not found",
            StreamError::Forbidden(_) => "Access denied",
            StreamError::RateLimited { .. } => "Too many requests",
            StreamError::QuotaExceeded(_) => "Daily token limit reached",
            StreamError::Chat(_) => "Failed to get AI response",
            StreamError::Detection(_) => "Failed to verify message safety",
            StreamError::Persistence(_) => "Failed to process message",
        }
    }
}
