//! Append-only log of streamed assistant text.
//!
//! The buffer only grows; consumers track their own position with a
//! [`Cursor`] and read forward via [`StreamBuffer::appended_since`]. The
//! cursor pairs the byte index (for O(1) slicing) with the character offset
//! (the unit of the wire protocol), so no caller ever does its own length
//! arithmetic across the two spaces.

/// Position inside a [`StreamBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    byte: usize,
    chars: usize,
}

impl Cursor {
    /// Character offset of this position from the start of the stream.
    pub fn offset(&self) -> usize {
        self.chars
    }

    /// Move forward past `consumed`, which must be exactly the text read
    /// from this position.
    pub fn advance(&mut self, consumed: &str) {
        self.byte += consumed.len();
        self.chars += consumed.chars().count();
    }
}

/// Accumulator of all assistant text observed so far.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    text: String,
    char_len: usize,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one delta. The text has already been forwarded to the client
    /// by the time it lands here, so `char_len` doubles as the count of
    /// characters the client has seen.
    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.char_len += delta.chars().count();
    }

    /// Total characters appended.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The full accumulated text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Everything appended after `cursor`, with the cursor for the new end.
    pub fn appended_since(&self, cursor: Cursor) -> (&str, Cursor) {
        let slice = self.text.get(cursor.byte..).unwrap_or("");
        (slice, self.end_cursor())
    }

    /// Cursor at the current end of the log.
    pub fn end_cursor(&self) -> Cursor {
        Cursor {
            byte: self.text.len(),
            chars: self.char_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates() {
        let mut buffer = StreamBuffer::new();
        buffer.append("My email is ");
        buffer.append("alice@example.com");

        assert_eq!(buffer.as_str(), "My email is alice@example.com");
        assert_eq!(buffer.char_len(), 29);
    }

    #[test]
    fn test_appended_since_start_returns_everything() {
        let mut buffer = StreamBuffer::new();
        buffer.append("hello ");
        buffer.append("world");

        let (slice, end) = buffer.appended_since(Cursor::default());
        assert_eq!(slice, "hello world");
        assert_eq!(end.offset(), 11);
    }

    #[test]
    fn test_cursor_tracks_consumed_prefix() {
        let mut buffer = StreamBuffer::new();
        buffer.append("first second");

        let mut cursor = Cursor::default();
        cursor.advance("first ");
        let (slice, _) = buffer.appended_since(cursor);

        assert_eq!(slice, "second");
        assert_eq!(cursor.offset(), 6);
    }

    #[test]
    fn test_cursor_offset_counts_characters_not_bytes() {
        let mut buffer = StreamBuffer::new();
        buffer.append("héllo wörld");

        let mut cursor = Cursor::default();
        cursor.advance("héllo ");
        assert_eq!(cursor.offset(), 6);

        let (slice, end) = buffer.appended_since(cursor);
        assert_eq!(slice, "wörld");
        assert_eq!(end.offset(), 11);
    }

    #[test]
    fn test_appended_since_end_is_empty() {
        let mut buffer = StreamBuffer::new();
        buffer.append("done");

        let (slice, _) = buffer.appended_since(buffer.end_cursor());
        assert_eq!(slice, "");
    }
}
