//! Wallpaper compositing
//!
//! Draws the task panel over a copy of the original wallpaper: a
//! translucent rounded panel, a title with an accent separator, then one
//! entry per visible open task. Task content is rasterized by a
//! [`ContentRenderer`] and pasted under the title; when that fails the
//! content is drawn as a few lines of wrapped plain text instead.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tiny_skia::{IntRect, Pixmap};

use crate::config::WallpaperSettings;
use crate::error::{AppError, RenderError};
use crate::geometry::Rect;
use crate::markdown::to_plain_text;
use crate::overlay::OverlayArea;
use crate::platform::WallpaperApi;
use crate::render::{canvas, wrap, Color, FontSet, TextStyle};
use crate::task::Task;

/// Size of the solid background used when the wallpaper cannot be read
pub const FALLBACK_SIZE: (u32, u32) = (1920, 1080);
pub const JPEG_QUALITY: u8 = 95;

pub const MORE_TASKS_TEXT: &str = "More tasks...";
pub const EMPTY_TEXT: &str = "No tasks yet. Add one to get started";

const PANEL_RADIUS: f32 = 20.0;
const TITLE_OFFSET: f32 = 30.0;
const TITLE_SIZE_BONUS: f32 = 14.0;
const SEPARATOR_OFFSET: f32 = 90.0;
const SEPARATOR_INSET: f32 = 20.0;
const SEPARATOR_WIDTH: f32 = 3.0;
const FIRST_TASK_OFFSET: f32 = 40.0;
const MARKER_X: f32 = 25.0;
const TEXT_X: f32 = 70.0;
/// Content width is the panel width minus this
const CONTENT_INSET: f32 = 80.0;
/// Tasks stop this far above the panel bottom
const BOTTOM_MARGIN: f32 = 40.0;
const LINE_SPACING: f32 = 1.5;
const TASK_GAP: f32 = 16.0;
const CONTENT_SCALE: f32 = 0.75;
const FALLBACK_MAX_LINES: usize = 3;

/// Rasterizes task content for the panel
pub trait ContentRenderer {
    /// Render `markdown` into a transparent bitmap `width` pixels wide
    fn render(
        &mut self,
        markdown: &str,
        width: u32,
        font_size: f32,
        completed: bool,
        fonts: &FontSet,
    ) -> Result<Pixmap, RenderError>;
}

/// Wallpaper state the compositor works from
#[derive(Clone, Debug, PartialEq)]
pub struct CompositorContext {
    /// Wallpaper captured before we replaced it
    pub original: Option<PathBuf>,
    pub area: OverlayArea,
    pub font_size: u32,
    pub title: String,
    /// Where the composited image is written
    pub output: PathBuf,
}

impl CompositorContext {
    pub fn from_settings(settings: &WallpaperSettings, output: PathBuf) -> Self {
        Self {
            original: settings.original.clone(),
            area: settings.overlay_area(),
            font_size: settings.clamped_font_size(),
            title: settings.title.clone(),
            output,
        }
    }
}

/// Panel colours
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanelStyle {
    pub background: Color,
    pub panel: Color,
    pub title: Color,
    pub accent: Color,
    pub text: Color,
    pub marker: Color,
    pub hint: Color,
}

impl Default for PanelStyle {
    fn default() -> Self {
        Self {
            background: Color::rgb(30, 30, 40),
            panel: Color::rgba(30, 30, 40, 160),
            title: Color::rgb(240, 240, 255),
            accent: Color::rgb(100, 150, 250),
            text: Color::WHITE,
            marker: Color::WHITE,
            hint: Color::rgb(200, 200, 200),
        }
    }
}

impl PanelStyle {
    /// Defaults with the configured panel and accent colours applied
    pub fn from_settings(settings: &WallpaperSettings) -> Self {
        let mut style = Self::default();
        let parse = |value: &Option<String>, fallback: Color| match value {
            None => fallback,
            Some(hex) => Color::from_hex(hex).unwrap_or_else(|e| {
                tracing::warn!("Ignoring colour setting: {}", e);
                fallback
            }),
        };
        style.panel = parse(&settings.panel_color, style.panel);
        style.accent = parse(&settings.accent_color, style.accent);
        style
    }
}

/// What a compose pass drew
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComposeReport {
    /// Tasks that got an entry on the panel
    pub drawn: usize,
    /// Tasks whose content went through the plain-text path
    pub fallbacks: usize,
    /// The panel filled up and "More tasks..." was drawn
    pub overflow: bool,
    /// The wallpaper could not be read and a solid background was used
    pub solid_background: bool,
}

/// Composes task panels onto the wallpaper
pub struct WallpaperCompositor {
    context: CompositorContext,
    style: PanelStyle,
    fonts: FontSet,
    content: Option<Box<dyn ContentRenderer>>,
}

impl std::fmt::Debug for WallpaperCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WallpaperCompositor")
            .field("context", &self.context)
            .field("fonts", &self.fonts)
            .field("content", &self.content.is_some())
            .finish()
    }
}

/// Per-pass drawing state
struct Pass<'a> {
    pixmap: &'a mut Pixmap,
    fonts: &'a FontSet,
    style: PanelStyle,
    panel: Rect,
    limit: f32,
    font_size: f32,
}

impl Pass<'_> {
    fn line_height(&self, size: f32) -> f32 {
        size * LINE_SPACING
    }

    /// Draw one line of text inside a line box whose top is `top`
    fn text(&mut self, text: &str, x: f32, top: f32, style: &TextStyle) {
        let metrics = self.fonts.metrics(style);
        let baseline = top + (self.line_height(style.size) - metrics.height()) / 2.0 + metrics.ascent;
        self.fonts.draw(self.pixmap, text, x, baseline, style);
    }

    fn marker(&mut self, top: f32) {
        let radius = self.font_size * 0.35;
        let cx = self.panel.left + MARKER_X + radius;
        let cy = top + self.line_height(self.font_size) / 2.0;
        canvas::stroke_circle(self.pixmap, cx, cy, radius, self.style.marker, 2.0);
    }

    /// Paste a content bitmap, cropped at the bottom limit; returns its drawn height
    fn paste(&mut self, content: &Pixmap, x: f32, top: f32) -> f32 {
        let visible = (self.limit - top).floor().min(content.height() as f32);
        if visible < 1.0 {
            return 0.0;
        }

        let (x, y) = (x.round() as i32, top.round() as i32);
        if visible as u32 == content.height() {
            canvas::composite_layer(self.pixmap, content, x, y);
        } else {
            let cropped = IntRect::from_xywh(0, 0, content.width(), visible as u32)
                .and_then(|rect| content.clone_rect(rect));
            if let Some(cropped) = cropped {
                canvas::composite_layer(self.pixmap, &cropped, x, y);
            }
        }
        visible
    }

    /// Wrapped plain text, at most three lines plus an ellipsis line
    fn fallback(&mut self, content: &str, x: f32, top: f32, width: f32, style: &TextStyle) -> f32 {
        let text = to_plain_text(content);
        if text.is_empty() {
            return 0.0;
        }

        let fonts = self.fonts;
        let lines = wrap::wrap_text(&text, width, |s| fonts.measure(s, style));
        let line_height = self.line_height(style.size);
        let mut y = top;
        for line in wrap::limit_lines(lines, FALLBACK_MAX_LINES) {
            if y + line_height > self.limit {
                break;
            }
            self.text(&line, x, y, style);
            y += line_height;
        }
        y - top
    }
}

impl WallpaperCompositor {
    pub fn new(context: CompositorContext, fonts: FontSet) -> Self {
        Self {
            context,
            style: PanelStyle::default(),
            fonts,
            content: None,
        }
    }

    /// Builder: rasterize content with `renderer`
    pub fn with_content_renderer(mut self, renderer: Box<dyn ContentRenderer>) -> Self {
        self.content = Some(renderer);
        self
    }

    /// Builder: use different panel colours
    pub fn with_style(mut self, style: PanelStyle) -> Self {
        self.style = style;
        self
    }

    pub fn context(&self) -> &CompositorContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CompositorContext {
        &mut self.context
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    /// Decode the wallpaper at `path`, or a solid background when that fails.
    ///
    /// The flag is true when the solid background was used.
    pub fn load_base(&self, path: Option<&Path>) -> Result<(Pixmap, bool), RenderError> {
        if let Some(path) = path {
            match image::open(path) {
                Ok(image) => return Ok((canvas::pixmap_from_rgba(&image.to_rgba8())?, false)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to read wallpaper, using solid background: {}", e);
                }
            }
        } else {
            tracing::info!("No original wallpaper, using solid background");
        }

        let (width, height) = FALLBACK_SIZE;
        let mut pixmap = canvas::new_pixmap(width, height)?;
        pixmap.fill(self.style.background.to_skia());
        Ok((pixmap, true))
    }

    /// Draw the panel for `tasks` over the original wallpaper
    pub fn compose(&mut self, tasks: &[Task]) -> Result<(Pixmap, ComposeReport), RenderError> {
        let (mut pixmap, solid_background) = self.load_base(self.context.original.as_deref())?;
        let mut report = ComposeReport {
            solid_background,
            ..ComposeReport::default()
        };

        let panel = self.context.area.to_pixels(pixmap.width(), pixmap.height());
        let mut layer = canvas::new_pixmap(pixmap.width(), pixmap.height())?;
        canvas::fill_rounded_rect(&mut layer, &panel, PANEL_RADIUS, self.style.panel);
        canvas::composite_layer(&mut pixmap, &layer, 0, 0);
        drop(layer);

        let font_size = self.context.font_size as f32;
        let content_size = font_size * CONTENT_SCALE;
        let content_width = (panel.width() - CONTENT_INSET).max(1.0);
        let text_x = panel.left + TEXT_X;
        let Self {
            context,
            style,
            fonts,
            content,
        } = self;

        let mut pass = Pass {
            pixmap: &mut pixmap,
            fonts,
            style: *style,
            panel,
            limit: panel.bottom - BOTTOM_MARGIN,
            font_size,
        };

        if !context.title.is_empty() {
            let title_style = TextStyle::new(font_size + TITLE_SIZE_BONUS, style.title).bold();
            pass.text(&context.title, panel.left + TITLE_OFFSET, panel.top + TITLE_OFFSET, &title_style);
        }
        let separator = panel.top + SEPARATOR_OFFSET;
        canvas::draw_line(
            pass.pixmap,
            (panel.left + SEPARATOR_INSET, separator),
            (panel.right - SEPARATOR_INSET, separator),
            style.accent,
            SEPARATOR_WIDTH,
        );

        let title_style = TextStyle::new(font_size, style.text).bold();
        let body_style = TextStyle::new(content_size, style.text);
        let line_height = pass.line_height(font_size);
        let mut y = separator + FIRST_TASK_OFFSET;

        for task in tasks.iter().filter(|t| t.is_drawn()) {
            if y > pass.limit {
                report.overflow = true;
                break;
            }

            pass.marker(y);
            let title = first_line_fitting(&task.title, content_width, |s| {
                pass.fonts.measure(s, &title_style)
            });
            pass.text(&title, text_x, y, &title_style);
            y += line_height;

            if !task.content.trim().is_empty() {
                let rendered = match content.as_mut() {
                    Some(renderer) => renderer
                        .render(
                            &task.content,
                            content_width as u32,
                            content_size,
                            task.is_completed,
                            pass.fonts,
                        )
                        .map_err(|e| {
                            tracing::warn!(task = %task.short_id(), "Content rendering failed, drawing plain text: {}", e);
                        })
                        .ok(),
                    None => None,
                };

                y += match rendered {
                    Some(bitmap) => pass.paste(&bitmap, text_x, y),
                    None => {
                        report.fallbacks += 1;
                        pass.fallback(&task.content, text_x, y, content_width, &body_style)
                    }
                };
            }

            y += TASK_GAP;
            report.drawn += 1;
        }

        if report.overflow {
            let top = y.min(panel.bottom - line_height);
            pass.text(MORE_TASKS_TEXT, text_x, top, &TextStyle::new(font_size, style.text));
        } else if report.drawn == 0 {
            pass.text(EMPTY_TEXT, text_x, y, &TextStyle::new(font_size, style.hint));
        }

        tracing::debug!(
            drawn = report.drawn,
            fallbacks = report.fallbacks,
            overflow = report.overflow,
            "Composed wallpaper"
        );
        Ok((pixmap, report))
    }

    /// Compose and write the image to `path`
    pub fn render_to(&mut self, tasks: &[Task], path: &Path) -> Result<ComposeReport, RenderError> {
        let (pixmap, report) = self.compose(tasks)?;
        write_output(&pixmap, path)?;
        tracing::info!(path = %path.display(), "Wrote wallpaper");
        Ok(report)
    }

    /// Compose, write to the output path and apply it as the wallpaper
    pub fn refresh(&mut self, tasks: &[Task], api: &dyn WallpaperApi) -> Result<ComposeReport, AppError> {
        let output = self.context.output.clone();
        let report = self.render_to(tasks, &output)?;
        api.set_wallpaper(&output)?;
        Ok(report)
    }

    /// Put the captured original wallpaper back
    pub fn restore_original(&self, api: &dyn WallpaperApi) -> Result<(), AppError> {
        match self.context.original.as_deref() {
            Some(original) if original.exists() => {
                api.set_wallpaper(original)?;
                tracing::info!(path = %original.display(), "Restored original wallpaper");
                Ok(())
            }
            _ => Err(AppError::NoOriginalWallpaper),
        }
    }
}

/// First wrapped line of `text`, with "..." when more would follow
fn first_line_fitting(text: &str, width: f32, measure: impl Fn(&str) -> f32) -> String {
    let mut lines = wrap::wrap_text(text, width, measure).into_iter();
    let first = lines.next().unwrap_or_default();
    if lines.next().is_some() {
        format!("{}{}", first, wrap::ELLIPSIS)
    } else {
        first
    }
}

/// Encode as PNG when the path says so, JPEG otherwise
pub fn write_output(pixmap: &Pixmap, path: &Path) -> Result<(), RenderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let image = canvas::rgba_from_pixmap(pixmap);
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        image.save(path)?;
        return Ok(());
    }

    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(writer, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(())
}
