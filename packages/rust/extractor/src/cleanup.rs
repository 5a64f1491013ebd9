//! Text cleanup passes applied to extracted page text.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw extracted text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = strip_leftover_entities(text);
    result = strip_control_chars(&result);
    result = collapse_whitespace(&result);
    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Strip leftover entities
// ---------------------------------------------------------------------------

/// Remove HTML entities that survived parsing (double-escaped markup).
fn strip_leftover_entities(text: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(?:nbsp|amp|lt|gt|quot|#\d{1,5}|#x[0-9a-fA-F]{1,4});").expect("valid regex")
    });

    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| match &caps[0] {
            "&amp;" => "&".to_string(),
            "&lt;" => "<".to_string(),
            "&gt;" => ">".to_string(),
            "&quot;" => "\"".to_string(),
            _ => " ".to_string(),
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip control characters
// ---------------------------------------------------------------------------

/// Replace control characters (except newlines and tabs) with spaces.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_control() && c != '\n' && c != '\t' {
                ' '
            } else {
                c
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse whitespace
// ---------------------------------------------------------------------------

/// Collapse every whitespace run (including newlines and NBSP) into one space.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\s\u{00A0}]+").expect("valid regex"));

    WS_RE.replace_all(text, " ").to_string()
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_joins_lines() {
        let input = "Line 1\n\n\n   Line 2\t\tend";
        assert_eq!(collapse_whitespace(input), "Line 1 Line 2 end");
    }

    #[test]
    fn collapse_whitespace_handles_nbsp() {
        assert_eq!(collapse_whitespace("a\u{00A0}\u{00A0}b"), "a b");
    }

    #[test]
    fn strip_control_chars_replaces_nul() {
        assert_eq!(strip_control_chars("a\u{0000}b"), "a b");
    }

    #[test]
    fn leftover_entities_are_decoded_or_dropped() {
        assert_eq!(strip_leftover_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_leftover_entities("a&nbsp;b"), "a b");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 4), "héll");
        assert_eq!(truncate_chars(text, 100), text);
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn full_pipeline_cleans_text() {
        let input = "  Title\n\n  Body &amp; more\u{0007}  text  ";
        assert_eq!(run_pipeline(input), "Title Body & more text");
    }

    #[test]
    fn entity_spaces_are_collapsed_too() {
        assert_eq!(run_pipeline("a &nbsp; b"), "a b");
        assert_eq!(run_pipeline("x&#160;&#160;y"), "x y");
    }
}
