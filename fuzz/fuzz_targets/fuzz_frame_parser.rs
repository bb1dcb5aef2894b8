//! Fuzz target for SSE frame parsing.
//!
//! Tests that arbitrary wire input cannot cause panics, and that the events
//! produced are independent of how the input is chunked.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::events::{FrameParser, MAX_FRAME_SIZE};

fuzz_target!(|data: &str| {
    // Parsing the whole input at once should never panic.
    let mut whole = FrameParser::new();
    let whole_events = whole.push(data);

    // Past the frame budget the oversize discard may land mid-frame, so the
    // chunking equivalence only holds for in-budget input.
    if data.len() > MAX_FRAME_SIZE {
        return;
    }

    // Feeding the same input in small chunks must yield the same events.
    let mut chunked = FrameParser::new();
    let mut chunked_events = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let take = rest
            .char_indices()
            .nth(7)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(take);
        chunked_events.extend(chunked.push(head));
        rest = tail;
    }

    assert_eq!(
        whole_events, chunked_events,
        "chunk boundaries changed the parse"
    );
});
