//! Fuzz target for inbound message sanitization.
//!
//! Tests that arbitrary strings cannot cause panics, that sanitization never
//! grows its input, and that a second pass is a no-op.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::sanitize::sanitize_input;

fuzz_target!(|data: &str| {
    let sanitized = sanitize_input(data);

    // Tag stripping and trimming only ever remove text.
    assert!(
        sanitized.len() <= data.len(),
        "sanitization grew the input"
    );

    // Sanitized text is a fixed point.
    assert_eq!(
        sanitize_input(&sanitized),
        sanitized,
        "sanitization is not idempotent"
    );
});
