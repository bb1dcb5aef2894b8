//! Detector capability and the LLM-backed adapter.
//!
//! Detection is a black-box async call: text in, zero or more semantic
//! findings out. Every failure mode stays behind [`DetectorError`] so the
//! stream orchestrator can catch it at the task boundary and degrade to zero
//! findings. The timeout is applied where a batch is dispatched, via
//! [`detect_with_timeout`], not inside implementations.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::chat::{ChatClient, ChatMessage, ChatRequest};

use super::finding::PiiFinding;
use super::kind::PiiKind;
use super::prompts::{build_detection_prompt, build_system_prompt};

/// Detection failure. Always caught at the task boundary, never fatal to the
/// stream under the default degrade policy.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detection timed out after {0}ms")]
    Timeout(u64),
    #[error("detection call failed: {0}")]
    Transport(String),
    #[error("detector response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("detector response was not a JSON array")]
    NotAnArray,
}

/// The PII detection capability.
#[async_trait]
pub trait PiiDetector: Send + Sync {
    /// Scan one batch of text for PII.
    async fn detect(&self, text: &str) -> Result<Vec<PiiFinding>, DetectorError>;
}

/// Run one detection bounded by `timeout_ms`.
pub async fn detect_with_timeout(
    detector: &dyn PiiDetector,
    text: &str,
    timeout_ms: u64,
) -> Result<Vec<PiiFinding>, DetectorError> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), detector.detect(text)).await {
        Ok(result) => result,
        Err(_) => Err(DetectorError::Timeout(timeout_ms)),
    }
}

/// Detector backed by a chat completion model.
///
/// Builds the detection prompt pair, runs a deterministic (temperature 0)
/// completion, and parses the JSON findings out of the response, tolerating
/// markdown code fences and skipping malformed entries.
pub struct LlmPiiDetector {
    client: Arc<dyn ChatClient>,
    model: String,
    kinds: Vec<PiiKind>,
}

impl LlmPiiDetector {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, kinds: Vec<PiiKind>) -> Self {
        Self {
            client,
            model: model.into(),
            kinds,
        }
    }
}

#[async_trait]
impl PiiDetector for LlmPiiDetector {
    async fn detect(&self, text: &str) -> Result<Vec<PiiFinding>, DetectorError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let messages = vec![
            ChatMessage::system(build_system_prompt(&self.kinds)),
            ChatMessage::user(build_detection_prompt(text, &self.kinds)),
        ];
        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(0.0)
            .with_max_tokens(2000);

        let completion = self
            .client
            .complete(request)
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;

        if completion.content.trim().is_empty() {
            warn!("detector returned empty content");
            return Ok(Vec::new());
        }

        let findings = parse_findings(&completion.content)?;
        debug!(count = findings.len(), "detection completed");
        Ok(findings)
    }
}

/// Parse a detector response into findings.
///
/// Accepts a bare JSON array or one wrapped in a markdown code fence.
/// Entries with an unknown kind or a missing/empty value are skipped with a
/// warning rather than failing the whole batch.
pub fn parse_findings(response: &str) -> Result<Vec<PiiFinding>, DetectorError> {
    let trimmed = response.trim();
    let json_str = match fence_regex().captures(trimmed) {
        Some(captures) => captures
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or(trimmed),
        None => trimmed,
    };

    let parsed: Value = serde_json::from_str(json_str)?;
    let items = parsed.as_array().ok_or(DetectorError::NotAnArray)?;

    let mut findings = Vec::with_capacity(items.len());
    for item in items {
        let Some(kind_raw) = item.get("piiType").and_then(Value::as_str) else {
            warn!("detector entry missing piiType, skipping");
            continue;
        };
        let Some(kind) = PiiKind::parse(&kind_raw.to_ascii_lowercase()) else {
            warn!(pii_type = kind_raw, "unknown PII type, skipping");
            continue;
        };
        let Some(value) = item.get("value").and_then(Value::as_str) else {
            warn!(kind = %kind, "detector entry missing value, skipping");
            continue;
        };
        if value.is_empty() {
            warn!(kind = %kind, "detector entry with empty value, skipping");
            continue;
        }
        let confidence = item.get("confidence").and_then(Value::as_f64);

        findings.push(PiiFinding {
            kind,
            value: value.to_string(),
            confidence,
        });
    }

    Ok(findings)
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*(\[[\s\S]*\])\s*```").unwrap())
}
