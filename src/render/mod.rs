//! Offscreen drawing primitives shared by the compositor and the Markdown
//! renderer

pub mod canvas;
pub mod color;
pub mod font;
pub mod wrap;

pub use color::Color;
pub use font::{FontSet, LineMetrics, TextStyle};
