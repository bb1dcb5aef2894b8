//! Fuzz target for detection batch extraction.
//!
//! Tests that arbitrary text and budgets cannot cause panics, that batches
//! respect the budget, and that no text is lost or duplicated.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::stream::extract_batches;

fuzz_target!(|input: (String, u8)| {
    let (text, raw_budget) = input;
    let budget = raw_budget as usize;
    let extraction = extract_batches(&text, budget);

    let effective = budget.max(1);
    for batch in &extraction.batches {
        let chars = batch.chars().count();
        assert!(
            chars >= 1 && chars <= effective,
            "batch of {chars} chars violates budget {effective}"
        );
    }
    assert!(extraction.remaining.chars().count() <= effective);

    // Batches plus remainder reconstruct the input exactly.
    let mut reassembled = String::with_capacity(text.len());
    for batch in &extraction.batches {
        reassembled.push_str(batch);
    }
    reassembled.push_str(&extraction.remaining);
    assert_eq!(reassembled, text, "extraction lost or duplicated text");
});
