//! Markdown content rendering
//!
//! Task content is parsed into blocks, diagram blocks are rasterized up
//! front, and the whole thing is laid out into a transparent bitmap that the
//! compositor pastes under the task title. Without the `markdown` feature
//! only [`plain::to_plain_text`] remains.

pub mod plain;

#[cfg(feature = "markdown")]
pub mod blocks;
#[cfg(feature = "markdown")]
pub mod diagram;
#[cfg(feature = "markdown")]
pub mod layout;

pub use plain::to_plain_text;

#[cfg(feature = "markdown")]
pub use self::renderer::{diagram_slots, MarkdownRenderer, MarkdownStyle};

#[cfg(feature = "markdown")]
mod renderer {
    use tiny_skia::Pixmap;

    use super::blocks::{self, Block};
    use super::diagram::DiagramRenderer;
    use super::layout::{self, DiagramSlot};
    use crate::compositor::ContentRenderer;
    use crate::error::RenderError;
    use crate::render::{Color, FontSet};

    /// Colours and base size for one bitmap
    #[derive(Debug, Clone, PartialEq)]
    pub struct MarkdownStyle {
        pub font_size: f32,
        pub text: Color,
        pub heading: Color,
        pub strong: Color,
        pub emphasis: Color,
        pub strike: Color,
        pub link: Color,
        pub quote_text: Color,
        pub quote_bar: Color,
        pub rule: Color,
        pub code_background: Color,
        pub error: Color,
    }

    impl MarkdownStyle {
        /// Dark-panel palette; completed tasks are greyed out
        pub fn new(font_size: f32, completed: bool) -> Self {
            Self {
                font_size,
                text: if completed {
                    Color::rgb(0xaa, 0xaa, 0xaa)
                } else {
                    Color::WHITE
                },
                heading: Color::rgb(0xe0, 0xe0, 0xff),
                strong: Color::rgb(0xff, 0xff, 0xb0),
                emphasis: Color::rgb(0xb0, 0xff, 0xff),
                strike: Color::rgb(0xff, 0x90, 0x90),
                link: Color::rgb(0x80, 0xc0, 0xff),
                quote_text: Color::rgb(0xcc, 0xcc, 0xcc),
                quote_bar: Color::rgb(0xaa, 0xaa, 0xaa),
                rule: Color::rgb(0x55, 0x55, 0x55),
                code_background: Color::rgba(80, 80, 80, 77),
                error: Color::rgb(0xff, 0x66, 0x66),
            }
        }
    }

    /// Rasterize every diagram block, in document order.
    ///
    /// With no renderer the blocks are shown as code. A failed diagram
    /// becomes a placeholder and does not fail the task.
    pub fn diagram_slots<R: DiagramRenderer + ?Sized>(
        blocks: &[Block],
        mut renderer: Option<&mut R>,
    ) -> Vec<DiagramSlot> {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Diagram { source } => Some(source),
                _ => None,
            })
            .map(|source| match renderer.as_deref_mut() {
                None => DiagramSlot::AsCode,
                Some(r) => match r.render(source) {
                    Ok(pixmap) => DiagramSlot::Image(pixmap),
                    Err(e) => {
                        tracing::warn!("Diagram failed: {}", e);
                        DiagramSlot::Failed
                    }
                },
            })
            .collect()
    }

    /// Offscreen Markdown renderer used for task content
    #[derive(Default)]
    pub struct MarkdownRenderer {
        diagrams: Option<Box<dyn DiagramRenderer>>,
    }

    impl std::fmt::Debug for MarkdownRenderer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MarkdownRenderer")
                .field("diagrams", &self.diagrams.is_some())
                .finish()
        }
    }

    impl MarkdownRenderer {
        /// Renderer without diagram support
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_diagrams(renderer: Box<dyn DiagramRenderer>) -> Self {
            Self {
                diagrams: Some(renderer),
            }
        }
    }

    impl ContentRenderer for MarkdownRenderer {
        fn render(
            &mut self,
            markdown: &str,
            width: u32,
            font_size: f32,
            completed: bool,
            fonts: &FontSet,
        ) -> Result<Pixmap, RenderError> {
            if !fonts.has_font() {
                return Err(RenderError::NoFont);
            }

            let blocks = blocks::parse_blocks(markdown);
            let max_height = if blocks::has_diagrams(&blocks) {
                layout::MAX_HEIGHT_WITH_DIAGRAMS
            } else {
                layout::MAX_HEIGHT
            };
            let slots = diagram_slots(&blocks, self.diagrams.as_deref_mut());
            let style = MarkdownStyle::new(font_size, completed);

            let layout = layout::layout_blocks(&blocks, slots, width, fonts, &style);
            tracing::debug!(
                blocks = blocks.len(),
                height = layout.height(),
                "Laid out task content"
            );
            layout.paint(fonts, max_height)
        }
    }

}
