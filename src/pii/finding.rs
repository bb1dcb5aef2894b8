//! Detection result types.
//!
//! A [`PiiFinding`] is the detector's raw, semantic claim: a kind, the exact
//! substring, and optionally a confidence. It carries no position. Locating
//! the substring inside the batch that produced it is the offset resolver's
//! job, which yields a [`ResolvedDetection`] with absolute character offsets
//! into the full assistant message.

use serde::{Deserialize, Serialize};

use super::kind::PiiKind;

/// Confidence assumed when the detector omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Raw detector output: semantic only, no offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiFinding {
    /// Kind of PII claimed.
    #[serde(rename = "piiType")]
    pub kind: PiiKind,
    /// Exact substring the detector saw.
    pub value: String,
    /// Detector confidence in [0,1], if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl PiiFinding {
    pub fn new(kind: PiiKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(kind: PiiKind, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            value: value.into(),
            confidence: Some(confidence),
        }
    }

    /// Confidence with the default applied and clamped to [0,1].
    pub fn effective_confidence(&self) -> f64 {
        self.confidence
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0)
    }
}

/// A finding located at an absolute character range in the full message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDetection {
    pub kind: PiiKind,
    /// Absolute character offset where the PII starts (0-indexed).
    pub start_offset: usize,
    /// Absolute character offset one past the PII end (exclusive).
    pub end_offset: usize,
    /// Replacement string for masked rendering.
    pub placeholder: String,
    /// Clamped confidence in [0,1].
    pub confidence: f64,
}

impl ResolvedDetection {
    /// Character length of the located span.
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.end_offset == self.start_offset
    }
}
