//! Width-based word wrapping

use super::font::is_wide;

/// Marker line appended when text is cut short
pub const ELLIPSIS: &str = "...";

/// Split `text` into lines no wider than `max_width`.
///
/// Breaks happen at whitespace; words wider than a line and runs of wide
/// (CJK) characters break between characters. Explicit newlines are kept.
/// Every line holds at least one character, so a tiny width never loops.
pub fn wrap_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let start = lines.len();
        let mut current = String::new();

        for token in tokenize(paragraph) {
            let is_space = token.chars().all(char::is_whitespace);
            if current.is_empty() && is_space {
                continue;
            }

            let candidate = format!("{}{}", current, token);
            if measure(candidate.trim_end()) <= max_width {
                current = candidate;
                continue;
            }

            if !current.trim_end().is_empty() {
                lines.push(current.trim_end().to_string());
            }
            current.clear();
            if is_space {
                continue;
            }

            if measure(token) <= max_width {
                current.push_str(token);
                continue;
            }

            for ch in token.chars() {
                let mut next = current.clone();
                next.push(ch);
                if !current.is_empty() && measure(&next) > max_width {
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                } else {
                    current = next;
                }
            }
        }

        if !current.trim_end().is_empty() {
            lines.push(current.trim_end().to_string());
        }
        if lines.len() == start {
            lines.push(String::new());
        }
    }

    lines
}

/// Split into whitespace runs, words and single wide characters
pub(crate) fn tokenize(text: &str) -> Vec<&str> {
    #[derive(PartialEq, Clone, Copy)]
    enum Kind {
        Space,
        Word,
        Wide,
    }

    let kind = |ch: char| {
        if ch.is_whitespace() {
            Kind::Space
        } else if is_wide(ch) {
            Kind::Wide
        } else {
            Kind::Word
        }
    };

    let mut tokens = Vec::new();
    let mut start = 0;
    let mut prev: Option<Kind> = None;

    for (i, ch) in text.char_indices() {
        let k = kind(ch);
        if let Some(p) = prev {
            if p != k || k == Kind::Wide {
                tokens.push(&text[start..i]);
                start = i;
            }
        }
        prev = Some(k);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Break a single line between characters, keeping whitespace as-is
pub fn split_to_width(line: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for ch in line.chars() {
        let mut next = current.clone();
        next.push(ch);
        if !current.is_empty() && measure(&next) > max_width {
            parts.push(std::mem::replace(&mut current, ch.to_string()));
        } else {
            current = next;
        }
    }
    parts.push(current);
    parts
}

/// Keep at most `max` lines, appending an ellipsis line when truncated
pub fn limit_lines(mut lines: Vec<String>, max: usize) -> Vec<String> {
    if lines.len() > max {
        lines.truncate(max);
        lines.push(ELLIPSIS.to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One unit per character
    fn chars(s: &str) -> f32 {
        s.chars().count() as f32
    }

    #[test]
    fn test_wrap_at_words() {
        let lines = wrap_text("the quick brown fox jumps", 10.0, chars);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn test_long_word_breaks_by_character() {
        let lines = wrap_text("abcdefghij", 4.0, chars);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_cjk_breaks_anywhere() {
        let lines = wrap_text("今天要完成报告", 3.0, chars);
        assert_eq!(lines, vec!["今天要", "完成报", "告"]);
    }

    #[test]
    fn test_newlines_kept() {
        let lines = wrap_text("one\n\ntwo", 10.0, chars);
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn test_zero_width_still_progresses() {
        let lines = wrap_text("abc", 0.0, chars);
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_keeps_indentation() {
        assert_eq!(split_to_width("    let x = 1;", 8.0, chars), vec!["    let ", "x = 1;"]);
        assert_eq!(split_to_width("", 8.0, chars), vec![""]);
    }

    #[test]
    fn test_limit_lines() {
        let lines: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(limit_lines(lines.clone(), 3), vec!["a", "b", "c", "..."]);
        assert_eq!(limit_lines(lines[..2].to_vec(), 3), vec!["a", "b"]);
    }
}
