//! Pipeline configuration loading from environment variables.
//!
//! All configuration values are loaded from `VEIL_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without
//! crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `VEIL_PII_ENABLED` | false | Enable sensitive-data detection |
//! | `VEIL_PII_MODEL` | openai/gpt-4o-mini | Detection model id |
//! | `VEIL_PII_MAX_BATCH_CHARS` | 800 | Max characters per detection batch |
//! | `VEIL_PII_BATCH_DELTAS` | 10 | Content deltas between dispatches |
//! | `VEIL_PII_TIMEOUT_MS` | 5000 | Per-dispatch detection deadline (ms) |
//! | `VEIL_PII_FALLBACK` | continue_without_masking | Behavior on detection failure |
//! | `VEIL_PII_MIN_CONFIDENCE` | 0.0 | Drop findings below this confidence |
//! | `VEIL_CHAT_MODEL` | openai/gpt-5-mini | Default chat model id |
//! | `VEIL_CHAT_CONTEXT_WINDOW` | 20 | Messages of history sent to the model |
//! | `VEIL_CHAT_MAX_MESSAGE_CHARS` | 4000 | Max user message length |
//! | `VEIL_CHAT_MAX_MESSAGES_PER_CONVERSATION` | 200 | Conversation size cap |
//! | `VEIL_CHAT_DAILY_TOKEN_LIMIT` | 50000 | Per-user daily token quota |
//! | `VEIL_CHAT_REQUESTS_PER_MINUTE` | 10 | Per-user stream rate limit |

use std::time::Duration;

use crate::models::DEFAULT_MODEL_ID;

/// What the stream does when detection cannot deliver a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Finish the stream unmasked; the failure is logged and audited.
    ContinueWithoutMasking,
    /// Treat a detection failure as a stream failure.
    Fail,
}

impl FallbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::ContinueWithoutMasking => "continue_without_masking",
            FallbackMode::Fail => "fail",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "continue_without_masking" => Some(FallbackMode::ContinueWithoutMasking),
            "fail" => Some(FallbackMode::Fail),
            _ => None,
        }
    }
}

/// Sensitive-data detection configuration.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub enabled: bool,
    pub model: String,
    pub max_batch_chars: usize,
    /// Dispatch a detection pass every N content deltas.
    pub batch_deltas: usize,
    pub timeout: Duration,
    pub fallback: FallbackMode,
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "openai/gpt-4o-mini".to_string(),
            max_batch_chars: 800,
            batch_deltas: 10,
            timeout: Duration::from_millis(5000),
            fallback: FallbackMode::ContinueWithoutMasking,
            min_confidence: 0.0,
        }
    }
}

/// Chat transport and quota configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub default_model: String,
    pub context_window: usize,
    pub max_message_chars: usize,
    pub max_messages_per_conversation: usize,
    pub daily_token_limit: u64,
    pub requests_per_minute: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL_ID.to_string(),
            context_window: 20,
            max_message_chars: 4000,
            max_messages_per_conversation: 200,
            daily_token_limit: 50_000,
            requests_per_minute: 10,
        }
    }
}

/// All pipeline configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub chat: ChatConfig,
}

/// Effective configuration summary for startup logging and the CLI.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub pii_enabled: bool,
    pub pii_model: String,
    pub pii_max_batch_chars: usize,
    pub pii_batch_deltas: usize,
    pub pii_timeout_ms: u64,
    pub pii_fallback: &'static str,
    pub pii_min_confidence: f64,
    pub chat_model: String,
    pub chat_context_window: usize,
    pub chat_max_message_chars: usize,
    pub chat_max_messages_per_conversation: usize,
    pub chat_daily_token_limit: u64,
    pub chat_requests_per_minute: usize,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an `f64` env var, returning `default` on missing or invalid.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<f64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var; only the exact strings "true" and "false"
/// (case-insensitive) override the default.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Load detection configuration from environment.
fn load_detection_config() -> DetectionConfig {
    let defaults = DetectionConfig::default();
    let enabled = parse_bool("VEIL_PII_ENABLED", defaults.enabled);
    let model = std::env::var("VEIL_PII_MODEL")
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(defaults.model);
    let max_batch_chars = parse_usize("VEIL_PII_MAX_BATCH_CHARS", defaults.max_batch_chars);
    let batch_deltas = parse_usize("VEIL_PII_BATCH_DELTAS", defaults.batch_deltas);
    let timeout_ms = parse_u64("VEIL_PII_TIMEOUT_MS", defaults.timeout.as_millis() as u64);
    let fallback = std::env::var("VEIL_PII_FALLBACK")
        .ok()
        .and_then(|v| FallbackMode::parse(&v))
        .unwrap_or(defaults.fallback);
    let min_confidence = parse_f64("VEIL_PII_MIN_CONFIDENCE", defaults.min_confidence);

    let max_batch_chars = max_batch_chars.max(64); // floor: a useful batch
    let batch_deltas = batch_deltas.max(1);
    let timeout_ms = timeout_ms.max(1000); // floor: 1s deadline
    let min_confidence = min_confidence.clamp(0.0, 1.0);

    DetectionConfig {
        enabled,
        model,
        max_batch_chars,
        batch_deltas,
        timeout: Duration::from_millis(timeout_ms),
        fallback,
        min_confidence,
    }
}

/// Load chat configuration from environment.
fn load_chat_config() -> ChatConfig {
    let defaults = ChatConfig::default();
    let default_model = std::env::var("VEIL_CHAT_MODEL")
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(defaults.default_model);
    let context_window = parse_usize("VEIL_CHAT_CONTEXT_WINDOW", defaults.context_window);
    let max_message_chars =
        parse_usize("VEIL_CHAT_MAX_MESSAGE_CHARS", defaults.max_message_chars);
    let max_messages_per_conversation = parse_usize(
        "VEIL_CHAT_MAX_MESSAGES_PER_CONVERSATION",
        defaults.max_messages_per_conversation,
    );
    let daily_token_limit = parse_u64("VEIL_CHAT_DAILY_TOKEN_LIMIT", defaults.daily_token_limit);
    let requests_per_minute =
        parse_usize("VEIL_CHAT_REQUESTS_PER_MINUTE", defaults.requests_per_minute);

    ChatConfig {
        default_model,
        context_window: context_window.max(1),
        max_message_chars: max_message_chars.max(1),
        max_messages_per_conversation: max_messages_per_conversation.max(1),
        daily_token_limit: daily_token_limit.max(1),
        requests_per_minute: requests_per_minute.max(1),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> PipelineConfig {
    PipelineConfig {
        detection: load_detection_config(),
        chat: load_chat_config(),
    }
}

impl PipelineConfig {
    /// Return a summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            pii_enabled: self.detection.enabled,
            pii_model: self.detection.model.clone(),
            pii_max_batch_chars: self.detection.max_batch_chars,
            pii_batch_deltas: self.detection.batch_deltas,
            pii_timeout_ms: self.detection.timeout.as_millis() as u64,
            pii_fallback: self.detection.fallback.as_str(),
            pii_min_confidence: self.detection.min_confidence,
            chat_model: self.chat.default_model.clone(),
            chat_context_window: self.chat.context_window,
            chat_max_message_chars: self.chat.max_message_chars,
            chat_max_messages_per_conversation: self.chat.max_messages_per_conversation,
            chat_daily_token_limit: self.chat.daily_token_limit,
            chat_requests_per_minute: self.chat.requests_per_minute,
        }
    }
}
