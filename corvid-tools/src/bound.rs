//! Output bounding.

/// Default preview budget for a single tool output, in chars.
pub const PREVIEW_BUDGET: usize = 1_000;

/// Truncate `text` to `limit` chars, appending an explicit marker with
/// the number of chars dropped.
pub fn bound(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((i, _)) => {
            let dropped = text.chars().count() - limit;
            format!("{}[...truncated {dropped} chars]", &text[..i])
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_untouched() {
        assert_eq!(bound("hello", 10), "hello");
    }

    #[test]
    fn long_text_marked() {
        let out = bound(&"x".repeat(20), 10);
        assert_eq!(out, format!("{}[...truncated 10 chars]", "x".repeat(10)));
    }

    #[test]
    fn multibyte_boundary_is_safe() {
        let out = bound("ééééé", 3);
        assert!(out.starts_with("ééé"));
        assert!(out.contains("truncated 2 chars"));
    }
}
