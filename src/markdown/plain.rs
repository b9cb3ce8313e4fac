//! Markdown to plain text for the fallback drawing path

#[cfg(feature = "markdown")]
use pulldown_cmark::{Event, Parser, Tag};

/// Strip formatting, keeping one line per block and per line break.
///
/// Never fails; anything the parser cannot interpret is kept as text.
#[cfg(feature = "markdown")]
pub fn to_plain_text(markdown: &str) -> String {
    let mut out = String::new();

    fn newline(out: &mut String) {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }

    for event in Parser::new_ext(markdown, super::blocks::parser_options()) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::Html(html) => out.push_str(html.trim_end()),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::TaskListMarker(checked) => out.push_str(if checked { "[x] " } else { "[ ] " }),
            Event::FootnoteReference(label) => {
                out.push('[');
                out.push_str(&label);
                out.push(']');
            }
            Event::Start(Tag::TableCell) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push_str(" | ");
                }
            }
            Event::Start(Tag::Item) => newline(&mut out),
            Event::End(
                Tag::Paragraph
                | Tag::Heading(..)
                | Tag::CodeBlock(_)
                | Tag::Item
                | Tag::TableHead
                | Tag::TableRow,
            ) => newline(&mut out),
            Event::Rule => newline(&mut out),
            _ => {}
        }
    }

    out.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip common line-level markers without a Markdown parser
#[cfg(not(feature = "markdown"))]
pub fn to_plain_text(markdown: &str) -> String {
    markdown
        .lines()
        .map(|line| {
            let line = line.trim();
            let line = line.trim_start_matches('#').trim_start_matches('>').trim_start();
            let line = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("+ "))
                .unwrap_or(line);
            line.replace("**", "")
                .replace("__", "")
                .replace("~~", "")
                .replace('`', "")
        })
        .filter(|line| !line.is_empty() && !line.chars().all(|c| matches!(c, '-' | '*' | '_')))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_formatting() {
        let text = to_plain_text("# Title\n\nSome **bold** and `code`.\n\n- one\n- two");
        assert_eq!(text, "Title\nSome bold and code.\none\ntwo");
    }

    #[test]
    fn test_keeps_line_breaks() {
        assert_eq!(to_plain_text("first\nsecond"), "first\nsecond");
    }

    #[test]
    fn test_empty() {
        assert_eq!(to_plain_text(""), "");
        assert_eq!(to_plain_text("\n\n   \n"), "");
    }

    #[cfg(feature = "markdown")]
    #[test]
    fn test_task_list_and_table() {
        let text = to_plain_text("- [x] done\n- [ ] open\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert_eq!(text, "[x] done\n[ ] open\na | b\n1 | 2");
    }

    #[test]
    fn test_never_panics_on_odd_input() {
        let inputs = [
            "```unterminated\ncode",
            "**unclosed *emphasis",
            "[link](",
            "| only | header |",
            "<div><span>html",
            "\u{0}\u{feff}控制字符\r\n\t",
            "> > > nested\n>>>",
            "1. \n2. \n   - \n",
            "![img]()",
            "---\n***\n___",
            "[^1]\n\n[^1]: note",
        ];
        for input in inputs {
            let _ = to_plain_text(input);
        }
    }
}
