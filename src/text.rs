//! Small character-safe string helpers shared by the store, the topic
//! selector and the claim fan-out.

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Keep at most `max` characters, appending `…` when something was cut.
pub fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}…", truncate_chars(s, max))
    } else {
        s.to_string()
    }
}
