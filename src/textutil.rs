//! UTF-8-safe truncation helpers.
//!
//! Prompt attachments, request descriptions, and command previews all cut
//! text to a bound. Byte slicing panics when the cut lands inside a
//! multi-byte character, so every caller goes through these helpers.

/// Return a UTF-8-safe prefix whose byte length is at most `max_bytes`.
pub fn safe_prefix_by_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Keep at most `max_chars` characters. The flag reports whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    match truncate_chars(text, max_chars) {
        (prefix, true) => format!("{prefix}{suffix}"),
        (whole, false) => whole,
    }
}

/// Collapse a possibly multi-line string into one trimmed preview line.
pub fn single_line_preview(text: &str, max_chars: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_suffix_by_chars(&joined, max_chars, "...")
}
