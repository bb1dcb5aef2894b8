//! Wire protocol for the streaming response.
//!
//! Events travel as server-sent event frames, `data: <json>\n\n`, one JSON
//! payload per frame. The payload is a tagged union: `content` deltas in
//! strict arrival order, `pii_mask` corrections in any order, then exactly
//! one terminal `done` or `error`. Because mask events are merged by the
//! receiver with the same coalescing rule the server uses, the protocol is
//! idempotent and order-tolerant for everything except visible text.
//!
//! [`FrameParser`] implements the receiving side, including the defensive
//! validation contract: any `pii_mask` frame that fails the field checks is
//! silently discarded rather than surfaced.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::pii::MaskRegion;

/// Upper bound on one frame's payload; larger partial input is discarded.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One event on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A verbatim text delta, append-only.
    #[serde(rename = "content")]
    Content { content: String },
    /// One canonical, already-merged mask region.
    #[serde(rename = "pii_mask")]
    PiiMask {
        #[serde(flatten)]
        region: MaskRegion,
    },
    /// Terminal success.
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "userMessageId")]
        user_message_id: String,
        #[serde(rename = "assistantMessageId")]
        assistant_message_id: String,
        #[serde(rename = "totalTokens")]
        total_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Terminal failure; the stream closes immediately after.
    #[serde(rename = "error")]
    Error { error: String },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content {
            content: text.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encode one event as an SSE frame.
pub fn encode_frame(event: &StreamEvent) -> Result<String, ProtocolError> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Field checks applied to received mask regions.
///
/// Type and integer checks are enforced by deserialization; what remains is
/// the range contract. Offsets are unsigned, so only ordering and a positive
/// span need checking.
pub fn is_valid_mask_region(region: &MaskRegion) -> bool {
    region.end_offset > region.start_offset && region.original_length > 0
}

/// Incremental SSE frame parser.
///
/// Feed arbitrary chunk boundaries into [`push`](FrameParser::push); frames
/// complete on a blank line. Malformed payloads and invalid mask events are
/// dropped without error.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk, returning every event completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(frame_end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..frame_end + 2).collect();
            if let Some(event) = parse_frame(frame.trim_end()) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_FRAME_SIZE {
            warn!(len = self.buffer.len(), "oversized partial frame discarded");
            self.buffer.clear();
        }

        events
    }

    /// Bytes buffered waiting for a frame terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let data = frame.strip_prefix("data: ")?;
    let event = match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "skipping unparseable frame");
            return None;
        }
    };

    if let StreamEvent::PiiMask { region } = &event {
        if !is_valid_mask_region(region) {
            debug!(
                start = region.start_offset,
                end = region.end_offset,
                "discarding invalid mask event"
            );
            return None;
        }
    }
    Some(event)
}
