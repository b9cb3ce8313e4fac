//! Markdown to styled blocks
//!
//! Walks pulldown-cmark events and groups inline text into blocks that the
//! layout pass can position: headings, paragraphs, list items, code,
//! diagrams, rules and table rows.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

/// Fenced code language rendered as a diagram
pub const DIAGRAM_LANGUAGE: &str = "mermaid";

/// Inline formatting flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub strike: bool,
    pub link: bool,
}

/// A run of text with one style. A span holding "\n" is a line break.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn is_break(&self) -> bool {
        self.text == "\n"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        spans: Vec<Span>,
    },
    Paragraph {
        spans: Vec<Span>,
        quote: bool,
    },
    ListItem {
        depth: usize,
        /// Bullet, number or checkbox; empty for a continuation paragraph
        marker: String,
        spans: Vec<Span>,
        quote: bool,
    },
    Code {
        text: String,
    },
    Diagram {
        source: String,
    },
    Rule,
    TableRow {
        cells: Vec<Vec<Span>>,
        header: bool,
    },
}

const BULLETS: [&str; 3] = ["•", "◦", "▪"];

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    spans: Vec<Span>,
    bold: u32,
    italic: u32,
    strike: u32,
    link: u32,
    heading: Option<u8>,
    /// Next number for ordered lists, `None` for bullet lists
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    quote: u32,
    code: Option<(String, String)>,
    row: Option<(Vec<Vec<Span>>, bool)>,
}

impl Walker {
    fn style(&self) -> SpanStyle {
        SpanStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code: false,
            strike: self.strike > 0,
            link: self.link > 0,
        }
    }

    fn push_text(&mut self, text: &str, style: SpanStyle) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == style && !last.is_break() => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                style,
            }),
        }
    }

    fn push_break(&mut self) {
        self.spans.push(Span {
            text: "\n".to_string(),
            style: SpanStyle::default(),
        });
    }

    /// Emit buffered inline content as a block for the current context
    fn flush(&mut self) {
        while self.spans.last().is_some_and(Span::is_break) {
            self.spans.pop();
        }
        if self.spans.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.spans);
        let quote = self.quote > 0;

        let block = if let Some(level) = self.heading {
            Block::Heading { level, spans }
        } else if !self.lists.is_empty() {
            Block::ListItem {
                depth: self.lists.len(),
                marker: self.item_marker.take().unwrap_or_default(),
                spans,
                quote,
            }
        } else {
            Block::Paragraph { spans, quote }
        };
        self.blocks.push(block);
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading(level, _, _) => {
                self.flush();
                self.heading = Some(heading_level(level));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_lowercase()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((lang, String::new()));
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len();
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}.", n);
                        *n += 1;
                        marker
                    }
                    _ => BULLETS[depth.saturating_sub(1) % BULLETS.len()].to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link(..) => self.link += 1,
            Tag::Table(_) => self.flush(),
            Tag::TableHead => self.row = Some((Vec::new(), true)),
            Tag::TableRow => self.row = Some((Vec::new(), false)),
            Tag::TableCell => self.spans.clear(),
            Tag::Image(..) | Tag::FootnoteDefinition(_) => {}
        }
    }

    fn end(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush(),
            Tag::Heading(..) => {
                self.flush();
                self.heading = None;
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote = self.quote.saturating_sub(1);
            }
            Tag::CodeBlock(_) => {
                if let Some((lang, text)) = self.code.take() {
                    let block = if lang == DIAGRAM_LANGUAGE {
                        Block::Diagram {
                            source: text.trim().to_string(),
                        }
                    } else {
                        Block::Code {
                            text: text.trim_end_matches('\n').to_string(),
                        }
                    };
                    self.blocks.push(block);
                }
            }
            Tag::List(_) => {
                self.flush();
                self.lists.pop();
            }
            Tag::Item => {
                self.flush();
                self.item_marker = None;
            }
            Tag::Emphasis => self.italic = self.italic.saturating_sub(1),
            Tag::Strong => self.bold = self.bold.saturating_sub(1),
            Tag::Strikethrough => self.strike = self.strike.saturating_sub(1),
            Tag::Link(..) => self.link = self.link.saturating_sub(1),
            Tag::TableCell => {
                let cell = std::mem::take(&mut self.spans);
                if let Some((cells, _)) = self.row.as_mut() {
                    cells.push(cell);
                }
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some((cells, header)) = self.row.take() {
                    self.blocks.push(Block::TableRow { cells, header });
                }
            }
            Tag::Table(_) | Tag::Image(..) | Tag::FootnoteDefinition(_) => {}
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.code.as_mut() {
                Some((_, buffer)) => buffer.push_str(&text),
                None => self.push_text(&text, self.style()),
            },
            Event::Code(code) => {
                let style = SpanStyle {
                    code: true,
                    ..self.style()
                };
                self.push_text(&code, style);
            }
            Event::Html(html) => match self.code.as_mut() {
                Some((_, buffer)) => buffer.push_str(&html),
                None => self.push_text(html.trim_end(), self.style()),
            },
            // Soft breaks render as line breaks, like typed notes expect
            Event::SoftBreak | Event::HardBreak => self.push_break(),
            Event::Rule => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                self.item_marker = Some(if checked { "[x]" } else { "[ ]" }.to_string());
            }
            Event::FootnoteReference(label) => {
                let text = format!("[{}]", label);
                self.push_text(&text, self.style());
            }
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Parse Markdown into blocks
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut walker = Walker::default();
    for event in Parser::new_ext(markdown, parser_options()) {
        walker.event(event);
    }
    walker.flush();
    walker.blocks
}

/// Whether any block is a diagram
pub fn has_diagrams(blocks: &[Block]) -> bool {
    blocks.iter().any(|b| matches!(b, Block::Diagram { .. }))
}
