//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use regex::Regex;
use std::sync::OnceLock;

/// Return the final `/`-separated segment of an internal identifier
///
/// Returns `None` when the identifier has no separator or ends with one.
pub fn last_path_segment(identifier: &str) -> Option<&str> {
    let (_, segment) = identifier.rsplit_once('/')?;
    if segment.is_empty() {
        None
    } else {
        Some(segment)
    }
}

/// Remove user, role and broadcast mentions from text
pub fn strip_mentions(text: &str) -> String {
    static MENTION_RE: OnceLock<Regex> = OnceLock::new();

    let re = MENTION_RE.get_or_init(|| {
        Regex::new(r"<@[!&]?\d+>|@everyone|@here").expect("Invalid regex pattern")
    });

    normalize_whitespace(&re.replace_all(text, ""))
}

/// Normalize runs of spaces in text while keeping line breaks
pub fn normalize_whitespace(text: &str) -> String {
    static SPACES_RE: OnceLock<Regex> = OnceLock::new();

    let re = SPACES_RE.get_or_init(|| Regex::new(r"[ \t]+").expect("Invalid regex pattern"));

    text.lines()
        .map(|line| re.replace_all(line.trim(), " ").to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Format a Discord relative timestamp marker
pub fn relative_time(at: chrono::DateTime<chrono::Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_path_segment() {
        assert_eq!(
            last_path_segment("/Lotus/Types/Items/MiscItems/Forma"),
            Some("Forma")
        );
        assert_eq!(last_path_segment("MT_SURVIVAL"), None);
        assert_eq!(last_path_segment("/Lotus/Types/"), None);
    }

    #[test]
    fn test_strip_mentions() {
        assert_eq!(strip_mentions("<@&1234> Baro is here"), "Baro is here");
        assert_eq!(strip_mentions("hey <@!42> and @everyone"), "hey and");
        assert_eq!(strip_mentions("line one\n<@99> line two"), "line one\nline two");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a longer piece of text", 10), "a longe...");
    }

    #[test]
    fn test_relative_time() {
        let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(relative_time(at), "<t:1700000000:R>");
    }
}
