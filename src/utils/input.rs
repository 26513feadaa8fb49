//! Input utilities for terminal applications.

/// Sanitize pasted or typed text to prevent TUI corruption: tabs become four
/// spaces, carriage returns become newlines, and other control characters
/// are dropped.
pub fn sanitize_text_input(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\t' => sanitized.push_str("    "),
            '\r' => sanitized.push('\n'),
            '\n' => sanitized.push(c),
            _ if !c.is_control() => sanitized.push(c),
            _ => {}
        }
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(sanitize_text_input("hello world"), "hello world");
    }

    #[test]
    fn tabs_and_carriage_returns_are_rewritten() {
        assert_eq!(sanitize_text_input("a\tb\rc"), "a    b\nc");
    }

    #[test]
    fn newlines_survive_but_other_controls_are_dropped() {
        assert_eq!(sanitize_text_input("one\ntwo\x07\x01three"), "one\ntwothree");
    }
}
