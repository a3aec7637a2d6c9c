// src/util.rs — Shared utility functions

/// Truncate a string to at most `max_len` bytes on a UTF-8 boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Derive a chat title from the first user message.
pub fn title_from(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "New chat".to_string()
    } else {
        truncate_str(trimmed, 100).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate_str("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_multibyte() {
        // é is 2 bytes; the cut must not split it
        assert_eq!(truncate_str("café", 4), "caf");
    }

    #[test]
    fn test_title_from_trims() {
        assert_eq!(title_from("  what is a citation?  "), "what is a citation?");
    }

    #[test]
    fn test_title_from_empty() {
        assert_eq!(title_from("   "), "New chat");
    }

    #[test]
    fn test_title_from_caps_length() {
        let long = "x".repeat(300);
        assert_eq!(title_from(&long).len(), 100);
    }
}
