//! Fuzz target for offset resolution.
//!
//! Tests that arbitrary batches and detector claims cannot cause panics, and
//! that resolved detections always land inside the batch, sorted and
//! non-overlapping.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::pii::{resolve_offsets, PiiFinding, PiiKind};

fuzz_target!(|input: (String, Vec<(u8, String)>)| {
    let (batch, raw_findings) = input;
    let findings: Vec<PiiFinding> = raw_findings
        .into_iter()
        .take(16)
        .map(|(kind, value)| {
            PiiFinding::new(PiiKind::ALL[kind as usize % PiiKind::ALL.len()], value)
        })
        .collect();

    let resolved = resolve_offsets(&batch, 0, &findings);

    let batch_chars = batch.chars().count();
    for detection in &resolved {
        assert!(
            detection.start_offset < detection.end_offset,
            "empty or inverted span"
        );
        assert!(
            detection.end_offset <= batch_chars,
            "resolved span leaves the batch"
        );
    }
    for pair in resolved.windows(2) {
        assert!(
            pair[0].end_offset <= pair[1].start_offset,
            "resolved spans overlap or are unsorted"
        );
    }
});
