//! Placeholder substitution for masked rendering.

use super::regions::{merge_regions, MaskRegion};

/// Replace every masked range in `content` with its kind's placeholder.
///
/// Regions are canonicalized first, then applied right to left so earlier
/// offsets stay valid while the string shrinks or grows. Offsets are
/// character offsets; ranges beyond the end of `content` are clamped.
pub fn mask_text(content: &str, regions: &[MaskRegion]) -> String {
    if regions.is_empty() {
        return content.to_string();
    }

    let regions = merge_regions(regions.to_vec());

    // Byte position of each character boundary, with one-past-the-end.
    let mut boundaries: Vec<usize> = content.char_indices().map(|(i, _)| i).collect();
    boundaries.push(content.len());
    let char_len = boundaries.len() - 1;

    let mut result = content.to_string();
    for region in regions.iter().rev() {
        let start = region.start_offset.min(char_len);
        let end = region.end_offset.min(char_len);
        if start >= end {
            continue;
        }
        result.replace_range(boundaries[start]..boundaries[end], region.kind.placeholder());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pii::kind::PiiKind;

    #[test]
    fn test_masks_single_region() {
        let regions = vec![MaskRegion::new(12, 29, PiiKind::Email)];
        let masked = mask_text("My email is alice@example.com thanks", &regions);
        assert_eq!(masked, "My email is [EMAIL] thanks");
    }

    #[test]
    fn test_masks_multiple_regions_preserving_earlier_offsets() {
        let content = "mail a@b.co or call 555-1234 now";
        let regions = vec![
            MaskRegion::new(5, 11, PiiKind::Email),
            MaskRegion::new(20, 28, PiiKind::Phone),
        ];
        assert_eq!(mask_text(content, &regions), "mail [EMAIL] or call [PHONE] now");
    }

    #[test]
    fn test_unsorted_overlapping_input_is_canonicalized() {
        let content = "0123456789";
        let regions = vec![
            MaskRegion::new(5, 8, PiiKind::Ssn),
            MaskRegion::new(3, 6, PiiKind::Ssn),
        ];
        assert_eq!(mask_text(content, &regions), "012[SSN]89");
    }

    #[test]
    fn test_out_of_range_region_is_clamped() {
        let regions = vec![MaskRegion::new(4, 50, PiiKind::Address)];
        assert_eq!(mask_text("abcdef", &regions), "abcd[ADDRESS]");
    }

    #[test]
    fn test_no_regions_returns_content() {
        assert_eq!(mask_text("plain text", &[]), "plain text");
    }

    #[test]
    fn test_character_offsets_with_multibyte_content() {
        let content = "héllo a@b.co!";
        let regions = vec![MaskRegion::new(6, 12, PiiKind::Email)];
        assert_eq!(mask_text(content, &regions), "héllo [EMAIL]!");
    }
}
