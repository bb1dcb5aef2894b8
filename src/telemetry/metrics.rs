//! Metric names and recording helpers for the streaming pipeline.
//!
//! Uses the `metrics` facade; the host installs whatever recorder it
//! wants. Without a recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register metric descriptions with the installed recorder.
///
/// Call once at startup, after the recorder is in place.
pub fn init_metrics() {
    describe_counter!(
        "veil_stream_requests_total",
        "Streams started, labeled by final status"
    );
    describe_histogram!(
        "veil_stream_duration_ms",
        "Wall time from first delta to done event"
    );
    describe_counter!("veil_stream_tokens_total", "Tokens billed across streams");
    describe_counter!(
        "veil_detection_dispatches_total",
        "Detection batches handed to the detector"
    );
    describe_counter!(
        "veil_detection_outcomes_total",
        "Detection batch outcomes, labeled by result"
    );
    describe_histogram!(
        "veil_detection_latency_ms",
        "Detector round-trip time per batch"
    );
    describe_counter!(
        "veil_detection_findings_dropped_total",
        "Findings discarded before masking, unlocatable or below the confidence floor"
    );
    describe_counter!(
        "veil_mask_regions_total",
        "Mask regions put on the wire, labeled by kind"
    );
}

pub fn record_stream_success(latency_ms: f64, total_tokens: u64) {
    counter!("veil_stream_requests_total", "status" => "ok").increment(1);
    histogram!("veil_stream_duration_ms").record(latency_ms);
    counter!("veil_stream_tokens_total").increment(total_tokens);
}

pub fn record_stream_failure(kind: &'static str) {
    counter!("veil_stream_requests_total", "status" => "error", "kind" => kind).increment(1);
}

pub fn record_detection_dispatch() {
    counter!("veil_detection_dispatches_total").increment(1);
}

pub fn record_detection_completed(latency_ms: f64) {
    counter!("veil_detection_outcomes_total", "result" => "completed").increment(1);
    histogram!("veil_detection_latency_ms").record(latency_ms);
}

pub fn record_detection_timeout() {
    counter!("veil_detection_outcomes_total", "result" => "timeout").increment(1);
}

pub fn record_detection_failure() {
    counter!("veil_detection_outcomes_total", "result" => "failed").increment(1);
}

pub fn record_findings_dropped(count: u64) {
    counter!("veil_detection_findings_dropped_total").increment(count);
}

pub fn record_mask_emitted(kind: &str) {
    counter!("veil_mask_regions_total", "kind" => kind.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // With no recorder installed these must all be silent no-ops.
    #[test]
    fn helpers_are_safe_without_a_recorder() {
        init_metrics();
        record_stream_success(12.5, 128);
        record_stream_failure("chat");
        record_detection_dispatch();
        record_detection_completed(340.0);
        record_detection_timeout();
        record_detection_failure();
        record_findings_dropped(2);
        record_mask_emitted("email");
    }
}
