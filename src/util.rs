//! Small text helpers shared across the runtime.

/// Truncate `input` to at most `max_chars` characters, appending an ellipsis
/// marker when anything was cut. Counts characters, not bytes, so multi-byte
/// text never splits mid-codepoint.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let boundary = input
        .char_indices()
        .take(max_chars)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let remainder = char_count - max_chars;
    format!("{}\n\n... {} chars truncated", &input[..boundary], remainder)
}
