//! Log-safe previews of caller text.

/// Single-line preview of at most `max_bytes` bytes of `text`, cut on a
/// UTF-8 boundary, with the total size appended when anything was dropped.
pub fn preview(text: &str, max_bytes: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= max_bytes {
        return flat;
    }

    let mut end = max_bytes;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &flat[..end], text.len())
}
