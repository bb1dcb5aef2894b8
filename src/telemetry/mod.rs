//! Telemetry module for the streaming pipeline.
//!
//! Provides structured logging, tracing spans, and metrics recording.
//! All output goes through the `tracing` and `metrics` facades; no
//! network dependencies.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    init_metrics, record_detection_completed, record_detection_dispatch,
    record_detection_failure, record_detection_timeout, record_findings_dropped,
    record_mask_emitted, record_stream_failure, record_stream_success,
};
pub use spans::{DetectionSpan, SpanExt, StreamSpan};
