//! Offset resolution: locate semantic findings inside their source batch.
//!
//! The detector reports exact substrings with no positions. Resolution finds
//! each value's first occurrence at the lowest index not already claimed by
//! an earlier finding in the same batch, then translates the local range to
//! absolute character offsets via the batch's base offset. A finding whose
//! value cannot be located anywhere outside claimed ranges is dropped: a
//! substring the batch does not contain is indistinguishable from detector
//! hallucination, and masking the wrong span is worse than not masking.

use tracing::warn;

use super::finding::{PiiFinding, ResolvedDetection};

/// Resolve a batch worth of findings to absolute character offsets.
///
/// `base_offset` is the character offset of `batch` within the full message.
/// Findings are processed in order of their first possible occurrence so the
/// outcome is deterministic regardless of detector output order. Returned
/// detections are sorted by start offset and never overlap.
pub fn resolve_offsets(
    batch: &str,
    base_offset: usize,
    findings: &[PiiFinding],
) -> Vec<ResolvedDetection> {
    if findings.is_empty() || batch.is_empty() {
        return Vec::new();
    }

    // Order by first possible occurrence; unlocatable values drop here.
    let mut ordered: Vec<(usize, &PiiFinding)> = Vec::with_capacity(findings.len());
    for finding in findings {
        if finding.value.is_empty() {
            warn!(kind = %finding.kind, "detector finding with empty value, dropping");
            continue;
        }
        match batch.find(&finding.value) {
            Some(first) => ordered.push((first, finding)),
            None => {
                warn!(
                    kind = %finding.kind,
                    value_len = finding.value.len(),
                    "detector finding not present in batch, dropping"
                );
            }
        }
    }
    ordered.sort_by_key(|(first, _)| *first);

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut resolved = Vec::with_capacity(ordered.len());

    for (first, finding) in ordered {
        match claim_occurrence(batch, &finding.value, first, &claimed) {
            Some((start, end)) => {
                claimed.push((start, end));
                resolved.push(ResolvedDetection {
                    kind: finding.kind,
                    start_offset: base_offset + char_index(batch, start),
                    end_offset: base_offset + char_index(batch, end),
                    placeholder: finding.kind.placeholder().to_string(),
                    confidence: finding.effective_confidence(),
                });
            }
            None => {
                warn!(
                    kind = %finding.kind,
                    value_len = finding.value.len(),
                    "all occurrences already claimed, dropping finding"
                );
            }
        }
    }

    resolved.sort_by_key(|d| d.start_offset);
    resolved
}

/// First occurrence of `value` at or after `from` that does not overlap a
/// claimed byte range. Returns the claimed byte range on success.
fn claim_occurrence(
    batch: &str,
    value: &str,
    from: usize,
    claimed: &[(usize, usize)],
) -> Option<(usize, usize)> {
    let mut search_from = from;
    while search_from <= batch.len() {
        let found = batch[search_from..].find(value)?;
        let start = search_from + found;
        let end = start + value.len();

        if claimed.iter().any(|&(s, e)| start < e && end > s) {
            // Overlaps an earlier claim; resume after this occurrence start.
            search_from = match next_char_boundary(batch, start) {
                Some(next) => next,
                None => return None,
            };
            continue;
        }
        return Some((start, end));
    }
    None
}

/// Byte index of the character boundary after `idx`.
fn next_char_boundary(s: &str, idx: usize) -> Option<usize> {
    s[idx..].chars().next().map(|c| idx + c.len_utf8())
}

/// Character offset of byte index `idx` in `s`.
fn char_index(s: &str, idx: usize) -> usize {
    s[..idx].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pii::kind::PiiKind;

    #[test]
    fn test_resolves_exact_offsets() {
        let findings = vec![PiiFinding::new(PiiKind::Phone, "555-1234")];
        let resolved = resolve_offsets("call 555-1234 now", 0, &findings);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].start_offset, 5);
        assert_eq!(resolved[0].end_offset, 13);
        assert_eq!(resolved[0].placeholder, "[PHONE]");
    }

    #[test]
    fn test_base_offset_is_added() {
        let findings = vec![PiiFinding::new(PiiKind::Phone, "555-1234")];
        let resolved = resolve_offsets("call 555-1234 now", 100, &findings);

        assert_eq!(resolved[0].start_offset, 105);
        assert_eq!(resolved[0].end_offset, 113);
    }

    #[test]
    fn test_missing_value_is_dropped_not_error() {
        let findings = vec![PiiFinding::new(PiiKind::Email, "not-present")];
        let resolved = resolve_offsets("nothing to see here", 0, &findings);
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_empty_value_is_dropped() {
        let findings = vec![PiiFinding::new(PiiKind::Email, "")];
        let resolved = resolve_offsets("some text", 0, &findings);
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_duplicate_values_claim_successive_occurrences() {
        let findings = vec![
            PiiFinding::new(PiiKind::Phone, "555-1234"),
            PiiFinding::new(PiiKind::Phone, "555-1234"),
        ];
        let resolved = resolve_offsets("555-1234 or 555-1234", 0, &findings);

        assert_eq!(resolved.len(), 2);
        assert_eq!(
            (resolved[0].start_offset, resolved[0].end_offset),
            (0, 8)
        );
        assert_eq!(
            (resolved[1].start_offset, resolved[1].end_offset),
            (12, 20)
        );
    }

    #[test]
    fn test_duplicate_beyond_occurrences_is_dropped() {
        let findings = vec![
            PiiFinding::new(PiiKind::Phone, "555-1234"),
            PiiFinding::new(PiiKind::Phone, "555-1234"),
        ];
        let resolved = resolve_offsets("only 555-1234 here", 0, &findings);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_overlapping_claim_moves_to_later_occurrence() {
        // "12345" is claimed first; "345" inside it must move to its later,
        // free occurrence.
        let findings = vec![
            PiiFinding::new(PiiKind::GovId, "12345"),
            PiiFinding::new(PiiKind::GovId, "345"),
        ];
        let resolved = resolve_offsets("12345 and 345", 0, &findings);

        assert_eq!(resolved.len(), 2);
        assert_eq!((resolved[0].start_offset, resolved[0].end_offset), (0, 5));
        assert_eq!((resolved[1].start_offset, resolved[1].end_offset), (10, 13));
    }

    #[test]
    fn test_results_sorted_and_non_overlapping() {
        let findings = vec![
            PiiFinding::new(PiiKind::Email, "b@example.com"),
            PiiFinding::new(PiiKind::Email, "a@example.com"),
        ];
        let resolved = resolve_offsets("a@example.com b@example.com", 0, &findings);

        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].start_offset < resolved[1].start_offset);
        assert!(resolved[0].end_offset <= resolved[1].start_offset);
    }

    #[test]
    fn test_confidence_default_and_clamp() {
        let findings = vec![
            PiiFinding::new(PiiKind::Email, "a@b.co"),
            PiiFinding::with_confidence(PiiKind::Phone, "555-1234", 2.0),
        ];
        let resolved = resolve_offsets("a@b.co 555-1234", 0, &findings);

        assert_eq!(resolved[0].confidence, 0.5);
        assert_eq!(resolved[1].confidence, 1.0);
    }

    #[test]
    fn test_offsets_are_character_offsets() {
        // Multibyte characters before the match shift byte offsets but not
        // character offsets.
        let findings = vec![PiiFinding::new(PiiKind::Email, "a@b.co")];
        let resolved = resolve_offsets("héllo a@b.co", 0, &findings);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].start_offset, 6);
        assert_eq!(resolved[0].end_offset, 12);
    }

    #[test]
    fn test_empty_batch_yields_nothing() {
        let findings = vec![PiiFinding::new(PiiKind::Email, "a@b.co")];
        assert!(resolve_offsets("", 0, &findings).is_empty());
    }
}
