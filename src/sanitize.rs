//! Inbound message hygiene.

use std::sync::OnceLock;

use regex::Regex;

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

/// Strip markup tags and surrounding whitespace from user input.
///
/// Angle-bracket runs are removed wholesale. The result is what gets
/// persisted, sent to the model, and scanned for sensitive content, so
/// every downstream offset refers to the sanitized text.
pub fn sanitize_input(input: &str) -> String {
    tag_re().replace_all(input, "").trim().to_string()
}
