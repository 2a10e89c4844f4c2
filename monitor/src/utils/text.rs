//! Text helpers for commit display.

/// Suffix appended to truncated strings.
pub const ELLIPSIS: &str = "...";

/// Truncates `text` to at most `max_chars` characters.
///
/// When the text is longer, it is cut and [`ELLIPSIS`] is appended in place
/// of the last characters so the result still fits in `max_chars`. Counts
/// characters, not bytes, so multi-byte text is never split mid-character.
///
/// # Examples
///
/// ```
/// use commitfeed_monitor::utils::max_string_length;
///
/// assert_eq!(max_string_length("short", 10), "short");
/// assert_eq!(max_string_length("a long commit message", 10), "a long ...");
/// ```
#[must_use]
pub fn max_string_length(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    if max_chars <= ellipsis_len {
        return text.chars().take(max_chars).collect();
    }

    let mut truncated: String = text.chars().take(max_chars - ellipsis_len).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(max_string_length("fix", 160), "fix");
        assert_eq!(max_string_length("", 5), "");
    }

    #[test]
    fn exact_length_is_unchanged() {
        assert_eq!(max_string_length("abcde", 5), "abcde");
    }

    #[test]
    fn long_text_is_cut_with_ellipsis() {
        let result = max_string_length("abcdefghij", 8);
        assert_eq!(result, "abcde...");
        assert_eq!(result.chars().count(), 8);
    }

    #[test]
    fn tiny_limit_skips_ellipsis() {
        assert_eq!(max_string_length("abcdef", 2), "ab");
        assert_eq!(max_string_length("abcdef", 0), "");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let result = max_string_length("héllo wörld", 8);
        assert_eq!(result, "héllo...");
    }
}
