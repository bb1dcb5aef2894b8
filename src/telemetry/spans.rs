//! Span utilities and extension traits for pipeline tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for creating standardized stream spans.
pub struct StreamSpan;

impl StreamSpan {
    /// Create a new stream span with standard fields.
    ///
    /// Fields included:
    /// - `request_id`: Unique identifier for the request
    /// - `conversation_id`: Conversation being streamed into
    /// - `model_id`: Chat model producing the response
    /// - `status`: To be filled in by `SpanExt::record_result`
    /// - `error.message`: To be filled in on error
    /// - `latency_ms`: To be filled in after completion
    /// - `total_tokens`: To be filled in after finalization
    /// - `masks_emitted`: To be filled in after finalization
    pub fn new(request_id: &str, conversation_id: &str, model_id: &str) -> Span {
        info_span!(
            "chat_stream",
            request_id = %request_id,
            conversation_id = %conversation_id,
            model_id = %model_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            total_tokens = tracing::field::Empty,
            masks_emitted = tracing::field::Empty,
        )
    }
}

/// Factory for per-batch detection spans.
pub struct DetectionSpan;

impl DetectionSpan {
    /// Create a span covering one detection dispatch.
    pub fn new(request_id: &str, batch_index: u64, batch_chars: usize) -> Span {
        info_span!(
            "pii_detection",
            request_id = %request_id,
            batch_index,
            batch_chars,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            findings = tracing::field::Empty,
        )
    }
}
