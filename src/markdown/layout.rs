//! Block layout and painting
//!
//! Positions blocks top to bottom inside a fixed-width bitmap, wrapping
//! inline spans at word boundaries, then paints the result onto a
//! transparent pixmap.

use tiny_skia::Pixmap;

use super::blocks::{Block, Span, SpanStyle};
use super::MarkdownStyle;
use crate::error::RenderError;
use crate::geometry::Rect;
use crate::render::{canvas, wrap, Color, FontSet, TextStyle};

pub const PADDING: f32 = 10.0;
const RIGHT_PADDING: f32 = 15.0;
pub const LINE_HEIGHT: f32 = 1.6;
pub const MAX_HEIGHT: u32 = 500;
pub const MAX_HEIGHT_WITH_DIAGRAMS: u32 = 600;
/// Horizontal room kept free beside diagrams
const DIAGRAM_INSET: f32 = 40.0;
const DIAGRAM_MARGIN: f32 = 10.0;
/// Heading sizes relative to the body, h1..h3
const HEADING_SCALE: [f32; 3] = [1.6, 1.4, 1.2];
const CODE_SCALE: f32 = 0.9;
/// Indent per list level (margin + padding of 0.8em each)
const LIST_INDENT: f32 = 1.6;

pub const DIAGRAM_ERROR_TEXT: &str = "Unable to render diagram";

/// Outcome of rendering one diagram block
pub enum DiagramSlot {
    Image(Pixmap),
    Failed,
    /// Diagrams are off; show the source as code
    AsCode,
}

enum Item {
    Text {
        x: f32,
        baseline: f32,
        text: String,
        style: TextStyle,
    },
    Fill {
        rect: Rect,
        radius: f32,
        color: Color,
    },
    Frame {
        rect: Rect,
        radius: f32,
        color: Color,
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        color: Color,
        width: f32,
    },
    Image {
        x: f32,
        y: f32,
        pixmap: Pixmap,
    },
}

/// Positioned drawing commands for one bitmap
pub struct Layout {
    items: Vec<Item>,
    width: u32,
    height: f32,
}

impl Layout {
    /// Content height including padding, before clamping
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Paint onto a transparent pixmap no taller than `max_height`
    pub fn paint(&self, fonts: &FontSet, max_height: u32) -> Result<Pixmap, RenderError> {
        let height = (self.height.ceil() as u32).clamp(1, max_height.max(1));
        let mut pixmap = canvas::new_pixmap(self.width, height)?;

        for item in &self.items {
            match item {
                Item::Text {
                    x,
                    baseline,
                    text,
                    style,
                } => {
                    fonts.draw(&mut pixmap, text, *x, *baseline, style);
                }
                Item::Fill {
                    rect,
                    radius,
                    color,
                } => canvas::fill_rounded_rect(&mut pixmap, rect, *radius, *color),
                Item::Frame {
                    rect,
                    radius,
                    color,
                } => canvas::stroke_rounded_rect(&mut pixmap, rect, *radius, *color, 1.0),
                Item::Line {
                    from,
                    to,
                    color,
                    width,
                } => canvas::draw_line(&mut pixmap, *from, *to, *color, *width),
                Item::Image { x, y, pixmap: image } => {
                    canvas::composite_layer(&mut pixmap, image, x.round() as i32, y.round() as i32)
                }
            }
        }
        Ok(pixmap)
    }
}

/// A run of same-styled text on one line
struct Run {
    x: f32,
    text: String,
    style: TextStyle,
    deco: SpanStyle,
}

struct Builder<'a> {
    fonts: &'a FontSet,
    style: &'a MarkdownStyle,
    width: f32,
    left: f32,
    right: f32,
    y: f32,
    items: Vec<Item>,
}

impl<'a> Builder<'a> {
    fn size(&self) -> f32 {
        self.style.font_size
    }

    fn text_style(&self, span: SpanStyle, base: Color, size: f32, bold: bool) -> TextStyle {
        let color = if span.strike {
            self.style.strike
        } else if span.link {
            self.style.link
        } else if span.bold {
            self.style.strong
        } else if span.italic {
            self.style.emphasis
        } else {
            base
        };
        TextStyle {
            size: if span.code { size * CODE_SCALE } else { size },
            color,
            bold: span.bold || bold,
            italic: span.italic,
            mono: span.code,
        }
    }

    /// Lay out spans between `x0` and `right`, advancing `y`
    fn flow(&mut self, spans: &[Span], x0: f32, right: f32, base: Color, size: f32, bold: bool) {
        let mut line: Vec<Run> = Vec::new();
        let mut x = x0;

        for span in spans {
            if span.is_break() {
                self.emit_line(&mut line, size, true);
                x = x0;
                continue;
            }

            let style = self.text_style(span.style, base, size, bold);
            for token in wrap::tokenize(&span.text) {
                let is_space = token.chars().all(char::is_whitespace);
                if is_space && line.is_empty() {
                    continue;
                }

                let w = self.fonts.measure(token, &style);
                if x + w > right && !line.is_empty() {
                    self.emit_line(&mut line, size, true);
                    x = x0;
                    if is_space {
                        continue;
                    }
                }

                if x + w > right {
                    // Wider than a whole line: break between characters
                    let mut buf = [0u8; 4];
                    for ch in token.chars() {
                        let piece = ch.encode_utf8(&mut buf);
                        let cw = self.fonts.measure(piece, &style);
                        if x + cw > right && !line.is_empty() {
                            self.emit_line(&mut line, size, true);
                            x = x0;
                        }
                        push_run(&mut line, x, piece, style, span.style);
                        x += cw;
                    }
                    continue;
                }

                push_run(&mut line, x, token, style, span.style);
                x += w;
            }
        }
        self.emit_line(&mut line, size, false);
    }

    /// Turn the pending runs into items; `force` advances even when empty
    fn emit_line(&mut self, line: &mut Vec<Run>, size: f32, force: bool) {
        if line.is_empty() {
            if force {
                self.y += size * LINE_HEIGHT;
            }
            return;
        }

        let height = line
            .iter()
            .map(|r| r.style.size * LINE_HEIGHT)
            .fold(size * LINE_HEIGHT, f32::max);
        let ascent = line
            .iter()
            .map(|r| self.fonts.metrics(&r.style).ascent)
            .fold(0.0, f32::max);
        let descent = line
            .iter()
            .map(|r| self.fonts.metrics(&r.style).descent)
            .fold(0.0, f32::max);
        let baseline = self.y + (height - ascent - descent) / 2.0 + ascent;

        for run in line.drain(..) {
            let w = self.fonts.measure(&run.text, &run.style);
            let metrics = self.fonts.metrics(&run.style);
            if run.deco.code {
                self.items.push(Item::Fill {
                    rect: Rect::new(
                        run.x - 2.0,
                        baseline - metrics.ascent - 1.0,
                        run.x + w + 2.0,
                        baseline + metrics.descent + 1.0,
                    ),
                    radius: 3.0,
                    color: self.style.code_background,
                });
            }
            let line_width = (run.style.size / 14.0).max(1.0);
            if run.deco.strike {
                let y = baseline - run.style.size * 0.3;
                self.items.push(Item::Line {
                    from: (run.x, y),
                    to: (run.x + w, y),
                    color: run.style.color,
                    width: line_width,
                });
            }
            if run.deco.link {
                let y = baseline + run.style.size * 0.12;
                self.items.push(Item::Line {
                    from: (run.x, y),
                    to: (run.x + w, y),
                    color: run.style.color,
                    width: line_width,
                });
            }
            self.items.push(Item::Text {
                x: run.x,
                baseline,
                text: run.text,
                style: run.style,
            });
        }

        self.y += height;
    }

    fn heading(&mut self, level: u8, spans: &[Span]) {
        let index = usize::from(level.clamp(1, 6)) - 1;
        let size = self.size() * HEADING_SCALE.get(index).copied().unwrap_or(1.0);
        if self.y > PADDING {
            self.y += size * 0.5;
        }
        let (left, right, color) = (self.left, self.right, self.style.heading);
        self.flow(spans, left, right, color, size, true);
        self.y += size * 0.3;
    }

    /// Left edge of text inside a block quote, drawing the bar afterwards
    fn quoted<F: FnOnce(&mut Self, f32)>(&mut self, quote: bool, body: F) {
        if !quote {
            let left = self.left;
            body(self, left);
            return;
        }
        let bar_x = self.left + self.size() * 0.5;
        let text_left = bar_x + 3.0 + self.size() * 0.5;
        let top = self.y;
        body(self, text_left);
        self.items.push(Item::Fill {
            rect: Rect::new(bar_x, top, bar_x + 3.0, self.y),
            radius: 0.0,
            color: self.style.quote_bar,
        });
    }

    fn base_color(&self, quote: bool) -> Color {
        if quote {
            self.style.quote_text
        } else {
            self.style.text
        }
    }

    fn paragraph(&mut self, spans: &[Span], quote: bool) {
        let (right, size, color) = (self.right, self.size(), self.base_color(quote));
        self.quoted(quote, |b, left| b.flow(spans, left, right, color, size, false));
        self.y += size * 0.3;
    }

    fn list_item(&mut self, depth: usize, marker: &str, spans: &[Span], quote: bool) {
        let (right, size, color) = (self.right, self.size(), self.base_color(quote));
        self.y += size * 0.1;
        self.quoted(quote, |b, left| {
            let indent = left + depth as f32 * size * LIST_INDENT;
            if !marker.is_empty() {
                let style = TextStyle::new(size, color);
                let metrics = b.fonts.metrics(&style);
                let baseline =
                    b.y + (size * LINE_HEIGHT - metrics.height()) / 2.0 + metrics.ascent;
                let marker_x = indent - size * 0.4 - b.fonts.measure(marker, &style);
                b.items.push(Item::Text {
                    x: marker_x.max(left),
                    baseline,
                    text: marker.to_string(),
                    style,
                });
            }
            b.flow(spans, indent, right, color, size, false);
        });
        self.y += size * 0.1;
    }

    fn code(&mut self, text: &str) {
        let style = TextStyle {
            mono: true,
            ..TextStyle::new(self.size() * CODE_SCALE, self.style.text)
        };
        let first_item = self.items.len();
        let top = self.y;
        let (left, right) = (self.left, self.right);
        self.y += 4.0;

        for source_line in text.split('\n') {
            let fonts = self.fonts;
            let parts = wrap::split_to_width(source_line, right - left - 12.0, |s| {
                fonts.measure(s, &style)
            });
            for part in parts {
                let mut line = Vec::new();
                if !part.is_empty() {
                    line.push(Run {
                        x: left + 6.0,
                        text: part,
                        style,
                        deco: SpanStyle::default(),
                    });
                }
                self.emit_line(&mut line, style.size, true);
            }
        }

        self.y += 4.0;
        self.items.insert(
            first_item,
            Item::Fill {
                rect: Rect::new(left, top, right, self.y),
                radius: 3.0,
                color: self.style.code_background,
            },
        );
        self.y += self.size() * 0.3;
    }

    fn diagram(&mut self, slot: DiagramSlot, source: &str) {
        match slot {
            DiagramSlot::Image(image) => {
                let max_width = (self.width - DIAGRAM_INSET).max(1.0);
                let image = if image.width() as f32 > max_width {
                    let w = max_width.floor() as u32;
                    let h = ((image.height() as f32 * w as f32 / image.width() as f32).round()
                        as u32)
                        .max(1);
                    match canvas::scale_pixmap(&image, w, h) {
                        Ok(scaled) => scaled,
                        Err(e) => {
                            tracing::warn!("Failed to scale diagram: {}", e);
                            return self.diagram(DiagramSlot::Failed, source);
                        }
                    }
                } else {
                    image
                };

                self.y += DIAGRAM_MARGIN;
                let x = ((self.width - image.width() as f32) / 2.0).max(0.0);
                let height = image.height() as f32;
                self.items.push(Item::Image {
                    x,
                    y: self.y,
                    pixmap: image,
                });
                self.y += height + DIAGRAM_MARGIN;
            }
            DiagramSlot::Failed => {
                let size = self.size();
                let rect = Rect::new(
                    self.left,
                    self.y + DIAGRAM_MARGIN,
                    self.right,
                    self.y + DIAGRAM_MARGIN + size * LINE_HEIGHT + 20.0,
                );
                self.items.push(Item::Frame {
                    rect,
                    radius: 5.0,
                    color: self.style.error,
                });

                let style = TextStyle::new(size, self.style.error);
                let metrics = self.fonts.metrics(&style);
                let text_width = self.fonts.measure(DIAGRAM_ERROR_TEXT, &style);
                self.items.push(Item::Text {
                    x: (rect.left + (rect.width() - text_width) / 2.0).max(rect.left),
                    baseline: rect.top + (rect.height() - metrics.height()) / 2.0 + metrics.ascent,
                    text: DIAGRAM_ERROR_TEXT.to_string(),
                    style,
                });
                self.y = rect.bottom + DIAGRAM_MARGIN;
            }
            DiagramSlot::AsCode => self.code(source),
        }
    }

    fn rule(&mut self) {
        let gap = self.size() * 0.4;
        self.y += gap;
        self.items.push(Item::Line {
            from: (self.left, self.y),
            to: (self.right, self.y),
            color: self.style.rule,
            width: 1.0,
        });
        self.y += gap;
    }

    fn table_row(&mut self, cells: &[Vec<Span>], header: bool) {
        let columns = cells.len().max(1);
        let column_width = (self.right - self.left) / columns as f32;
        let (size, color) = (self.size(), self.style.text);
        let top = self.y;
        let mut bottom = top;

        for (i, cell) in cells.iter().enumerate() {
            self.y = top;
            let x0 = self.left + i as f32 * column_width + 4.0;
            let x1 = self.left + (i + 1) as f32 * column_width - 4.0;
            self.flow(cell, x0, x1, color, size, header);
            bottom = bottom.max(self.y);
        }

        self.y = bottom.max(top + size * LINE_HEIGHT);
        self.items.push(Item::Line {
            from: (self.left, self.y),
            to: (self.right, self.y),
            color: self.style.rule,
            width: 1.0,
        });
    }
}

fn push_run(line: &mut Vec<Run>, x: f32, text: &str, style: TextStyle, deco: SpanStyle) {
    if let Some(last) = line.last_mut() {
        if last.style == style && last.deco == deco {
            last.text.push_str(text);
            return;
        }
    }
    line.push(Run {
        x,
        text: text.to_string(),
        style,
        deco,
    });
}

/// Lay out `blocks` in a bitmap `width` pixels wide.
///
/// `diagrams` holds one slot per diagram block, in document order.
pub fn layout_blocks(
    blocks: &[Block],
    diagrams: Vec<DiagramSlot>,
    width: u32,
    fonts: &FontSet,
    style: &MarkdownStyle,
) -> Layout {
    let w = width as f32;
    let mut builder = Builder {
        fonts,
        style,
        width: w,
        left: PADDING,
        right: (w - RIGHT_PADDING).max(PADDING + 1.0),
        y: PADDING,
        items: Vec::new(),
    };
    let mut slots = diagrams.into_iter();

    for block in blocks {
        match block {
            Block::Heading { level, spans } => builder.heading(*level, spans),
            Block::Paragraph { spans, quote } => builder.paragraph(spans, *quote),
            Block::ListItem {
                depth,
                marker,
                spans,
                quote,
            } => builder.list_item(*depth, marker, spans, *quote),
            Block::Code { text } => builder.code(text),
            Block::Diagram { source } => {
                let slot = slots.next().unwrap_or(DiagramSlot::AsCode);
                builder.diagram(slot, source);
            }
            Block::Rule => builder.rule(),
            Block::TableRow { cells, header } => builder.table_row(cells, *header),
        }
    }

    Layout {
        items: builder.items,
        width,
        height: builder.y + PADDING,
    }
}

#[cfg(test)]
mod tests {
    use super::super::blocks::parse_blocks;
    use super::*;
    use crate::render::font::fixture_fonts;

    fn layout(markdown: &str, width: u32, diagrams: Vec<DiagramSlot>) -> Layout {
        let style = MarkdownStyle::new(16.0, false);
        layout_blocks(&parse_blocks(markdown), diagrams, width, &FontSet::empty(), &style)
    }

    fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
        pixmap.pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
    }

    #[test]
    fn test_wrapping_grows_height() {
        let short = layout("hello", 400, Vec::new());
        let long = layout(&"hello world ".repeat(40), 400, Vec::new());
        assert!(long.height() > short.height() * 3.0);
    }

    #[test]
    fn test_explicit_breaks_add_lines() {
        let one = layout("a", 400, Vec::new());
        let three = layout("a\nb\nc", 400, Vec::new());
        let line = 16.0 * LINE_HEIGHT;
        assert!((three.height() - one.height() - 2.0 * line).abs() < 0.5);
    }

    #[test]
    fn test_height_is_clamped() {
        let tall = layout(&"para\n\n".repeat(200), 300, Vec::new());
        let pixmap = tall.paint(&FontSet::empty(), MAX_HEIGHT).unwrap();
        assert_eq!(pixmap.height(), MAX_HEIGHT);
        assert_eq!(pixmap.width(), 300);
    }

    #[test]
    fn test_code_block_background() {
        let code = layout("```\nlet x = 1;\n```", 300, Vec::new());
        let pixmap = code.paint(&FontSet::empty(), MAX_HEIGHT).unwrap();
        // rgba(80, 80, 80, 0.3)
        let a = alpha_at(&pixmap, 20, 14);
        assert!((70..=85).contains(&a), "alpha {}", a);
        // Outside the block
        assert_eq!(alpha_at(&pixmap, 2, 2), 0);
    }

    #[test]
    fn test_failed_diagram_draws_placeholder() {
        let layout = layout("```mermaid\ngraph TD\n```", 300, vec![DiagramSlot::Failed]);
        let pixmap = layout.paint(&FontSet::empty(), MAX_HEIGHT_WITH_DIAGRAMS).unwrap();
        // Left edge of the frame
        assert!(alpha_at(&pixmap, 10, 35) > 0);
        // Inside the frame is empty without a font
        assert_eq!(alpha_at(&pixmap, 150, 35), 0);
    }

    #[test]
    fn test_wide_diagram_is_scaled_and_centered() {
        let mut image = Pixmap::new(1000, 100).unwrap();
        image.fill(tiny_skia::Color::WHITE);

        let layout = layout("```mermaid\ngraph TD\n```", 300, vec![DiagramSlot::Image(image)]);
        // 10 padding + 10 margin + 26 scaled height + 10 margin + 10 padding
        assert!((layout.height() - 66.0).abs() < 0.5, "{}", layout.height());

        let pixmap = layout.paint(&FontSet::empty(), MAX_HEIGHT_WITH_DIAGRAMS).unwrap();
        assert_eq!(alpha_at(&pixmap, 150, 33), 255);
        assert_eq!(alpha_at(&pixmap, 5, 33), 0);
    }

    #[test]
    fn test_disabled_diagrams_render_as_code() {
        let as_code = layout("```mermaid\ngraph TD\n```", 300, Vec::new());
        let code = layout("```\ngraph TD\n```", 300, Vec::new());
        assert!((as_code.height() - code.height()).abs() < 0.01);
    }

    /// Style of the first text item whose trimmed text is `text`
    fn style_of(layout: &Layout, text: &str) -> TextStyle {
        layout
            .items
            .iter()
            .find_map(|item| match item {
                Item::Text { text: t, style, .. } if t.trim() == text => Some(*style),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no text item {:?}", text))
    }

    fn close(a: Color, r: u8, g: u8, b: u8) -> bool {
        a.r.abs_diff(r) <= 2 && a.g.abs_diff(g) <= 2 && a.b.abs_diff(b) <= 2
    }

    /// Colours of fully opaque pixels
    fn opaque_colors(pixmap: &Pixmap) -> Vec<Color> {
        pixmap
            .pixels()
            .iter()
            .filter(|p| p.alpha() == 255)
            .map(|p| Color::rgb(p.red(), p.green(), p.blue()))
            .collect()
    }

    #[test]
    fn test_inline_span_colours() {
        let palette = MarkdownStyle::new(16.0, false);
        let layout = layout("**a** *b* ~~c~~ [d](http://x) `f` e", 600, Vec::new());

        let strong = style_of(&layout, "a");
        assert_eq!(strong.color, palette.strong);
        assert!(strong.bold);

        let emphasis = style_of(&layout, "b");
        assert_eq!(emphasis.color, palette.emphasis);
        assert!(emphasis.italic);

        assert_eq!(style_of(&layout, "c").color, palette.strike);
        assert_eq!(style_of(&layout, "d").color, palette.link);

        let code = style_of(&layout, "f");
        assert!(code.mono);
        assert_eq!(code.color, palette.text);

        assert_eq!(style_of(&layout, "e").color, palette.text);
    }

    #[test]
    fn test_heading_colour_and_weight() {
        let palette = MarkdownStyle::new(16.0, false);
        let layout = layout("# Plan **now**", 600, Vec::new());

        let heading = style_of(&layout, "Plan");
        assert_eq!(heading.color, palette.heading);
        assert!(heading.bold);
        assert!(!heading.italic);
        assert!((heading.size - 16.0 * HEADING_SCALE[0]).abs() < 1e-4);

        // Explicit strong markup inside a heading keeps its own colour
        assert_eq!(style_of(&layout, "now").color, palette.strong);
    }

    #[test]
    fn test_completed_and_quoted_text_colours() {
        let done = MarkdownStyle::new(16.0, true);
        let blocks = parse_blocks("## Head\n\ndone\n\n> quoted");
        let layout = layout_blocks(&blocks, Vec::new(), 400, &FontSet::empty(), &done);

        assert_eq!(style_of(&layout, "done").color, Color::rgb(0xaa, 0xaa, 0xaa));
        assert_eq!(style_of(&layout, "Head").color, done.heading);
        assert_eq!(style_of(&layout, "quoted").color, done.quote_text);
    }

    #[test]
    fn test_heading_pixels_use_heading_colour() {
        let fonts = fixture_fonts();
        let palette = MarkdownStyle::new(20.0, false);
        let layout = layout_blocks(&parse_blocks("# Heading"), Vec::new(), 300, &fonts, &palette);
        let pixmap = layout.paint(&fonts, MAX_HEIGHT).unwrap();

        let colors = opaque_colors(&pixmap);
        assert!(colors.len() > 100, "{} opaque pixels", colors.len());
        assert!(colors.iter().all(|c| close(*c, 0xe0, 0xe0, 0xff)));
    }

    #[test]
    fn test_strong_and_plain_pixels() {
        let fonts = fixture_fonts();
        let palette = MarkdownStyle::new(20.0, false);
        let layout = layout_blocks(
            &parse_blocks("**Bold** plain"),
            Vec::new(),
            300,
            &fonts,
            &palette,
        );
        let pixmap = layout.paint(&fonts, MAX_HEIGHT).unwrap();

        let colors = opaque_colors(&pixmap);
        let strong = |c: &Color| close(*c, 0xff, 0xff, 0xb0);
        let white = |c: &Color| close(*c, 0xff, 0xff, 0xff);
        assert!(colors.iter().any(strong));
        assert!(colors.iter().any(white));
        assert!(colors.iter().all(|c| strong(c) || white(c)));
    }
}
