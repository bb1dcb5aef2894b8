//! Batch extraction over buffered stream text.
//!
//! Splits the unconsumed buffer into detection-sized batches without ever
//! holding back content delivery. A batch is cut only while the buffer
//! exceeds the budget; the under-budget tail stays as `remaining` until the
//! next extraction or the forced final batch at end of stream. Cuts prefer
//! the last sentence end inside the window, then the last whitespace, then a
//! hard cut at the budget. The split is deterministic and exhaustive:
//! batches plus remainder always reconstruct the input exactly.

/// Result of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Batches ready for detection, each between 1 and `max_batch_chars`
    /// characters.
    pub batches: Vec<String>,
    /// Unconsumed tail, at most `max_batch_chars` characters.
    pub remaining: String,
}

/// Split `buffer` into detection batches of at most `max_batch_chars`
/// characters. A budget of zero is treated as one.
pub fn extract_batches(buffer: &str, max_batch_chars: usize) -> Extraction {
    let max = max_batch_chars.max(1);
    let mut batches = Vec::new();
    let mut rest = buffer;
    let mut rest_chars = buffer.chars().count();

    while rest_chars > max {
        let (cut_bytes, cut_chars) = find_cut(rest, max);
        batches.push(rest[..cut_bytes].to_string());
        rest = &rest[cut_bytes..];
        rest_chars -= cut_chars;
    }

    Extraction {
        batches,
        remaining: rest.to_string(),
    }
}

/// Byte and character length of the next batch to cut from `text`, which is
/// known to exceed `max_chars` characters. Always at least one character.
fn find_cut(text: &str, max_chars: usize) -> (usize, usize) {
    let mut sentence_end: Option<(usize, usize)> = None;
    let mut whitespace_end: Option<(usize, usize)> = None;
    let mut window_end = (text.len(), max_chars);

    for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
        if char_idx >= max_chars {
            window_end = (byte_idx, max_chars);
            break;
        }
        let after = (byte_idx + ch.len_utf8(), char_idx + 1);
        if matches!(ch, '.' | '!' | '?' | '\n') {
            sentence_end = Some(after);
        } else if ch.is_whitespace() {
            whitespace_end = Some(after);
        }
    }

    sentence_end.or(whitespace_end).unwrap_or(window_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(extraction: &Extraction) -> String {
        let mut out = String::new();
        for batch in &extraction.batches {
            out.push_str(batch);
        }
        out.push_str(&extraction.remaining);
        out
    }

    #[test]
    fn test_short_buffer_yields_no_batches() {
        let extraction = extract_batches("under budget", 50);
        assert!(extraction.batches.is_empty());
        assert_eq!(extraction.remaining, "under budget");
    }

    #[test]
    fn test_buffer_at_budget_stays_remaining() {
        let extraction = extract_batches("abcde", 5);
        assert!(extraction.batches.is_empty());
        assert_eq!(extraction.remaining, "abcde");
    }

    #[test]
    fn test_prefers_sentence_break() {
        let extraction = extract_batches("First sentence. Second part trails on", 20);
        assert_eq!(extraction.batches[0], "First sentence.");
    }

    #[test]
    fn test_falls_back_to_whitespace_break() {
        let extraction = extract_batches("words without sentence punctuation here", 20);
        assert_eq!(extraction.batches[0], "words without ");
    }

    #[test]
    fn test_hard_cut_without_any_break() {
        let extraction = extract_batches(&"x".repeat(25), 10);
        assert_eq!(extraction.batches[0].len(), 10);
        assert!(!extraction.batches.iter().any(|b| b.is_empty()));
    }

    #[test]
    fn test_batches_respect_budget() {
        let text = "One two. Three four five six seven. Eight nine ten eleven twelve.";
        let extraction = extract_batches(text, 16);
        for batch in &extraction.batches {
            let chars = batch.chars().count();
            assert!(chars >= 1 && chars <= 16, "bad batch: {batch:?}");
        }
        assert!(extraction.remaining.chars().count() <= 16);
    }

    #[test]
    fn test_exhaustive_reconstruction() {
        let inputs = [
            "short",
            "First sentence. Second sentence! Third? Fourth keeps going on and on",
            "no-breaks-at-all-just-one-long-token-without-any-whitespace-anywhere",
            "héllo wörld. ünïcode cöntent flows onward püshing past the budget",
        ];
        for input in inputs {
            for max in [1, 4, 10, 30] {
                let extraction = extract_batches(input, max);
                assert_eq!(reassemble(&extraction), input, "max={max} input={input:?}");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta. Gamma delta epsilon zeta eta theta iota kappa";
        assert_eq!(extract_batches(text, 12), extract_batches(text, 12));
    }

    #[test]
    fn test_zero_budget_treated_as_one() {
        let extraction = extract_batches("abc", 0);
        assert_eq!(extraction.batches, vec!["a", "b"]);
        assert_eq!(extraction.remaining, "c");
    }

    #[test]
    fn test_multibyte_hard_cut_respects_char_boundaries() {
        let text = "éééééééééé";
        let extraction = extract_batches(text, 3);
        assert_eq!(reassemble(&extraction), text);
        for batch in &extraction.batches {
            assert_eq!(batch.chars().count(), 3);
        }
    }
}
