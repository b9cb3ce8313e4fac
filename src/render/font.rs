//! Font loading, measurement and glyph rasterization
//!
//! Glyph outlines come from `ttf-parser` and are filled as `tiny-skia`
//! paths. Bold is synthesized by a second, slightly offset fill and italic
//! by a horizontal skew, so a single regular face covers every style the
//! panel and the Markdown renderer need.
//!
//! When no face can be loaded, measurement falls back to a per-character
//! estimate and drawing becomes a no-op.

use std::fs;
use std::path::{Path, PathBuf};

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use super::color::Color;
use crate::error::RenderError;

/// Extra advance and offset of the second fill used for synthetic bold
const BOLD_OFFSET: f32 = 0.04;
/// Horizontal shear used for synthetic italic
const ITALIC_SKEW: f32 = 0.2;
const TAB_WIDTH: usize = 4;

/// How a run of text is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub mono: bool,
}

impl TextStyle {
    pub fn new(size: f32, color: Color) -> Self {
        Self {
            size,
            color,
            bold: false,
            italic: false,
            mono: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

/// Vertical metrics of a line of text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl LineMetrics {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }

    fn estimate(size: f32) -> Self {
        Self {
            ascent: size * 0.8,
            descent: size * 0.2,
        }
    }
}

/// A loaded font face
pub struct Font {
    data: Vec<u8>,
    index: u32,
    path: PathBuf,
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("path", &self.path)
            .field("index", &self.index)
            .finish()
    }
}

impl Font {
    /// Load the first face of a font file (.ttf, .otf or .ttc)
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let data = fs::read(path)?;
        Self::from_bytes(data, path)
    }

    pub fn from_bytes(data: Vec<u8>, path: &Path) -> Result<Self, RenderError> {
        if Face::parse(&data, 0).is_err() {
            return Err(RenderError::InvalidFont(path.to_path_buf()));
        }
        Ok(Self {
            data,
            index: 0,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.index).ok()
    }

    fn metrics(&self, size: f32) -> LineMetrics {
        match self.face() {
            Some(face) => {
                let scale = size / face.units_per_em() as f32;
                LineMetrics {
                    ascent: face.ascender() as f32 * scale,
                    descent: -(face.descender() as f32) * scale,
                }
            }
            None => LineMetrics::estimate(size),
        }
    }

    fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        let Some(face) = self.face() else {
            return estimate_width(text, style);
        };
        let scale = style.size / face.units_per_em() as f32;
        let extra = if style.bold { style.size * BOLD_OFFSET } else { 0.0 };

        expand_tabs(text)
            .map(|ch| glyph_advance(&face, ch) * scale + extra)
            .sum()
    }

    fn draw(&self, pixmap: &mut Pixmap, text: &str, x: f32, baseline: f32, style: &TextStyle) -> f32 {
        let Some(face) = self.face() else {
            return 0.0;
        };
        let scale = style.size / face.units_per_em() as f32;
        let bold_offset = style.size * BOLD_OFFSET;

        let mut paint = Paint::default();
        paint.set_color(style.color.to_skia());
        paint.anti_alias = true;

        // Shear around the baseline so glyphs lean without drifting
        let transform = if style.italic {
            Transform::from_row(1.0, 0.0, -ITALIC_SKEW, 1.0, ITALIC_SKEW * baseline, 0.0)
        } else {
            Transform::identity()
        };

        let mut pen = x;
        for ch in expand_tabs(text) {
            let glyph = face.glyph_index(ch).unwrap_or(GlyphId(0));
            if !ch.is_whitespace() {
                if let Some(path) = build_glyph_path(&face, glyph, pen, baseline, scale) {
                    pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
                    if style.bold {
                        let bold = transform.pre_translate(bold_offset, 0.0);
                        pixmap.fill_path(&path, &paint, FillRule::Winding, bold, None);
                    }
                }
            }
            pen += glyph_advance(&face, ch) * scale;
            if style.bold {
                pen += bold_offset;
            }
        }
        pen - x
    }
}

fn expand_tabs(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().flat_map(|ch| {
        let (c, n) = if ch == '\t' { (' ', TAB_WIDTH) } else { (ch, 1) };
        std::iter::repeat(c).take(n)
    })
}

fn glyph_advance(face: &Face<'_>, ch: char) -> f32 {
    let glyph = face.glyph_index(ch).unwrap_or(GlyphId(0));
    face.glyph_hor_advance(glyph).unwrap_or(0) as f32
}

fn build_glyph_path(
    face: &Face<'_>,
    glyph: GlyphId,
    x: f32,
    baseline: f32,
    scale: f32,
) -> Option<tiny_skia::Path> {
    struct PathConverter {
        builder: PathBuilder,
        scale: f32,
        x: f32,
        y: f32,
    }

    impl OutlineBuilder for PathConverter {
        fn move_to(&mut self, px: f32, py: f32) {
            self.builder
                .move_to(self.x + px * self.scale, self.y - py * self.scale);
        }

        fn line_to(&mut self, px: f32, py: f32) {
            self.builder
                .line_to(self.x + px * self.scale, self.y - py * self.scale);
        }

        fn quad_to(&mut self, x1: f32, y1: f32, px: f32, py: f32) {
            self.builder.quad_to(
                self.x + x1 * self.scale,
                self.y - y1 * self.scale,
                self.x + px * self.scale,
                self.y - py * self.scale,
            );
        }

        fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, px: f32, py: f32) {
            self.builder.cubic_to(
                self.x + x1 * self.scale,
                self.y - y1 * self.scale,
                self.x + x2 * self.scale,
                self.y - y2 * self.scale,
                self.x + px * self.scale,
                self.y - py * self.scale,
            );
        }

        fn close(&mut self) {
            self.builder.close();
        }
    }

    let mut converter = PathConverter {
        builder: PathBuilder::new(),
        scale,
        x,
        y: baseline,
    };

    face.outline_glyph(glyph, &mut converter)?;
    converter.builder.finish()
}

/// Width estimate used when no face is available
fn estimate_width(text: &str, style: &TextStyle) -> f32 {
    let extra = if style.bold { style.size * BOLD_OFFSET } else { 0.0 };
    expand_tabs(text)
        .map(|ch| {
            let factor = if ch.is_whitespace() {
                0.3
            } else if is_wide(ch) {
                1.0
            } else if style.mono {
                0.6
            } else {
                0.55
            };
            style.size * factor + extra
        })
        .sum()
}

/// East Asian wide characters (CJK, Hangul, fullwidth forms)
pub fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x3FFFD)
}

/// The faces used for drawing: a regular face and an optional monospace one
#[derive(Debug, Default)]
pub struct FontSet {
    regular: Option<Font>,
    mono: Option<Font>,
}

impl FontSet {
    /// A set without any face; text is measured by estimate and not drawn
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_regular(font: Font) -> Self {
        Self {
            regular: Some(font),
            mono: None,
        }
    }

    /// Load the first usable face from the standard locations.
    ///
    /// `preferred` is tried first when given.
    pub fn discover(preferred: Option<&Path>) -> Self {
        let regular = first_loadable(regular_candidates(preferred));
        match &regular {
            Some(font) => tracing::info!(path = %font.path().display(), "Loaded font"),
            None => tracing::warn!("No font could be loaded, text will not be drawn"),
        }
        let mono = first_loadable(mono_candidates());

        Self { regular, mono }
    }

    pub fn has_font(&self) -> bool {
        self.regular.is_some()
    }

    fn face_for(&self, style: &TextStyle) -> Option<&Font> {
        if style.mono {
            self.mono.as_ref().or(self.regular.as_ref())
        } else {
            self.regular.as_ref()
        }
    }

    /// Advance width of `text`
    pub fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        match self.face_for(style) {
            Some(font) => font.measure(text, style),
            None => estimate_width(text, style),
        }
    }

    pub fn metrics(&self, style: &TextStyle) -> LineMetrics {
        match self.face_for(style) {
            Some(font) => font.metrics(style.size),
            None => LineMetrics::estimate(style.size),
        }
    }

    /// Draw `text` with its baseline at `baseline`; returns the advance
    pub fn draw(&self, pixmap: &mut Pixmap, text: &str, x: f32, baseline: f32, style: &TextStyle) -> f32 {
        match self.face_for(style) {
            Some(font) => font.draw(pixmap, text, x, baseline, style),
            None => 0.0,
        }
    }
}

fn first_loadable(candidates: Vec<PathBuf>) -> Option<Font> {
    candidates.into_iter().find_map(|path| {
        if !path.exists() {
            return None;
        }
        match Font::load(&path) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to load font: {}", e);
                None
            }
        }
    })
}

fn windows_fonts_dir() -> PathBuf {
    std::env::var_os("WINDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Windows"))
        .join("Fonts")
}

/// Regular face search order
pub fn regular_candidates(preferred: Option<&Path>) -> Vec<PathBuf> {
    let fonts = windows_fonts_dir();
    let mut candidates: Vec<PathBuf> = preferred.map(Path::to_path_buf).into_iter().collect();
    candidates.extend([
        fonts.join("msyh.ttc"),
        fonts.join("msyh.ttf"),
        fonts.join("segoeui.ttf"),
        fonts.join("arial.ttf"),
        PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
        PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"),
        PathBuf::from("/usr/share/fonts/noto/NotoSans-Regular.ttf"),
    ]);
    candidates
}

/// Monospace face search order
pub fn mono_candidates() -> Vec<PathBuf> {
    let fonts = windows_fonts_dir();
    vec![
        fonts.join("consola.ttf"),
        fonts.join("cour.ttf"),
        PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf"),
        PathBuf::from("/usr/share/fonts/TTF/DejaVuSansMono.ttf"),
    ]
}

/// DejaVu Sans bundled for tests that need real glyphs
#[cfg(test)]
pub(crate) fn fixture_fonts() -> FontSet {
    let data = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/DejaVuSans.ttf"
    ));
    match Font::from_bytes(data.to_vec(), Path::new("DejaVuSans.ttf")) {
        Ok(font) => FontSet::with_regular(font),
        Err(e) => panic!("bundled font rejected: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_without_font() {
        let fonts = FontSet::empty();
        let style = TextStyle::new(20.0, Color::WHITE);

        assert!(!fonts.has_font());
        assert_eq!(fonts.measure("", &style), 0.0);
        assert!((fonts.measure("ab", &style) - 22.0).abs() < 1e-4);
        // Wide characters take a full em
        assert!((fonts.measure("任务", &style) - 40.0).abs() < 1e-4);
        // Bold is wider
        assert!(fonts.measure("ab", &style.bold()) > fonts.measure("ab", &style));
    }

    #[test]
    fn test_tabs_expand() {
        let fonts = FontSet::empty();
        let style = TextStyle::new(10.0, Color::WHITE);
        assert_eq!(fonts.measure("\t", &style), fonts.measure("    ", &style));
    }

    #[test]
    fn test_draw_without_font_is_noop() {
        let fonts = FontSet::empty();
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let advance = fonts.draw(&mut pixmap, "hello", 0.0, 15.0, &TextStyle::new(12.0, Color::WHITE));
        assert_eq!(advance, 0.0);
        assert!(pixmap.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_font_rejected() {
        let err = Font::from_bytes(vec![1, 2, 3], Path::new("bogus.ttf")).unwrap_err();
        assert!(matches!(err, RenderError::InvalidFont(_)));
    }

    #[test]
    fn test_preferred_font_first() {
        let candidates = regular_candidates(Some(Path::new("/custom/font.ttf")));
        assert_eq!(candidates[0], PathBuf::from("/custom/font.ttf"));
        assert!(candidates.iter().any(|p| p.ends_with("msyh.ttc")));
    }

    #[test]
    fn test_is_wide() {
        assert!(is_wide('任'));
        assert!(is_wide('한'));
        assert!(!is_wide('a'));
        assert!(!is_wide('é'));
    }

    fn painted(pixmap: &Pixmap) -> usize {
        pixmap.pixels().iter().filter(|p| p.alpha() > 0).count()
    }

    #[test]
    fn test_fixture_font_draws_glyphs() {
        let fonts = fixture_fonts();
        let style = TextStyle::new(24.0, Color::rgb(0x20, 0x40, 0x60));
        assert!(fonts.has_font());

        let mut pixmap = Pixmap::new(120, 40).unwrap();
        let advance = fonts.draw(&mut pixmap, "Hi", 4.0, 30.0, &style);
        assert!((advance - fonts.measure("Hi", &style)).abs() < 1e-3);
        assert!(painted(&pixmap) > 20);

        // Opaque glyph pixels carry the requested colour
        let opaque: Vec<_> = pixmap.pixels().iter().filter(|p| p.alpha() == 255).collect();
        assert!(!opaque.is_empty());
        assert!(opaque.iter().all(|p| {
            let diff = |a: u8, b: u8| a.abs_diff(b) <= 2;
            diff(p.red(), 0x20) && diff(p.green(), 0x40) && diff(p.blue(), 0x60)
        }));

        // Nothing is drawn above the ascender or left of the pen
        let metrics = fonts.metrics(&style);
        let top = (30.0 - metrics.ascent - 1.0).floor() as u32;
        for y in 0..top {
            for x in 0..120 {
                assert_eq!(pixmap.pixel(x, y).map(|p| p.alpha()), Some(0));
            }
        }
    }

    #[test]
    fn test_synthetic_bold_and_italic() {
        let fonts = fixture_fonts();
        let regular = TextStyle::new(24.0, Color::WHITE);
        let bold = regular.bold();
        let italic = TextStyle {
            italic: true,
            ..regular
        };

        assert!(fonts.measure("Hello", &bold) > fonts.measure("Hello", &regular));
        assert_eq!(fonts.measure("Hello", &italic), fonts.measure("Hello", &regular));

        let draw = |style: &TextStyle| {
            let mut pixmap = Pixmap::new(160, 40).unwrap();
            fonts.draw(&mut pixmap, "Hello", 10.0, 30.0, style);
            pixmap
        };
        let plain = draw(&regular);
        assert!(painted(&draw(&bold)) > painted(&plain));
        assert_ne!(draw(&italic).data(), plain.data());
    }

    #[test]
    fn test_fixture_metrics_and_spaces() {
        let fonts = fixture_fonts();
        let style = TextStyle::new(20.0, Color::WHITE);
        let metrics = fonts.metrics(&style);
        assert!(metrics.ascent > 10.0 && metrics.ascent < 20.0);
        assert!(metrics.descent > 0.0 && metrics.descent < 10.0);

        let mut pixmap = Pixmap::new(60, 30).unwrap();
        let advance = fonts.draw(&mut pixmap, "   ", 0.0, 20.0, &style);
        assert!(advance > 0.0);
        assert_eq!(painted(&pixmap), 0);
    }
}
