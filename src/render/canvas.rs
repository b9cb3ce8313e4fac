//! Pixmap helpers: conversion to and from `image` buffers, rounded
//! rectangles, lines, circles and layer compositing

use image::{Rgba, RgbaImage};
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

use super::color::Color;
use crate::error::RenderError;
use crate::geometry::Rect;

/// Control point distance for a quarter circle drawn as a cubic
const KAPPA: f32 = 0.552_284_8;

/// Allocate a transparent pixmap
pub fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, RenderError> {
    Pixmap::new(width, height).ok_or(RenderError::CanvasSize { width, height })
}

/// Copy a straight-alpha image into a premultiplied pixmap
pub fn pixmap_from_rgba(image: &RgbaImage) -> Result<Pixmap, RenderError> {
    let (width, height) = image.dimensions();
    let mut pixmap = new_pixmap(width, height)?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Copy a pixmap back into a straight-alpha image
pub fn rgba_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    image
}

fn solid_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

/// Path of a rectangle with circular corners.
///
/// The radius is reduced to fit small rectangles.
pub fn rounded_rect_path(rect: &Rect, radius: f32) -> Option<tiny_skia::Path> {
    let r = radius.min(rect.width() / 2.0).min(rect.height() / 2.0).max(0.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(rect.to_skia()?));
    }

    let Rect {
        left: l,
        top: t,
        right: rt,
        bottom: b,
    } = *rect;
    let k = r * KAPPA;

    let mut pb = PathBuilder::new();
    pb.move_to(l + r, t);
    pb.line_to(rt - r, t);
    pb.cubic_to(rt - r + k, t, rt, t + r - k, rt, t + r);
    pb.line_to(rt, b - r);
    pb.cubic_to(rt, b - r + k, rt - r + k, b, rt - r, b);
    pb.line_to(l + r, b);
    pb.cubic_to(l + r - k, b, l, b - r + k, l, b - r);
    pb.line_to(l, t + r);
    pb.cubic_to(l, t + r - k, l + r - k, t, l + r, t);
    pb.close();
    pb.finish()
}

pub fn fill_rounded_rect(pixmap: &mut Pixmap, rect: &Rect, radius: f32, color: Color) {
    if let Some(path) = rounded_rect_path(rect, radius) {
        pixmap.fill_path(&path, &solid_paint(color), FillRule::Winding, Transform::identity(), None);
    }
}

pub fn stroke_rounded_rect(pixmap: &mut Pixmap, rect: &Rect, radius: f32, color: Color, width: f32) {
    if let Some(path) = rounded_rect_path(rect, radius) {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &solid_paint(color), &stroke, Transform::identity(), None);
    }
}

pub fn draw_line(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &solid_paint(color), &stroke, Transform::identity(), None);
    }
}

pub fn stroke_circle(pixmap: &mut Pixmap, cx: f32, cy: f32, radius: f32, color: Color, width: f32) {
    if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &solid_paint(color), &stroke, Transform::identity(), None);
    }
}

/// Alpha-composite `layer` onto `target` with its top-left at (x, y)
pub fn composite_layer(target: &mut Pixmap, layer: &Pixmap, x: i32, y: i32) {
    target.draw_pixmap(
        x,
        y,
        layer.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Resample to the given size with bilinear filtering
pub fn scale_pixmap(src: &Pixmap, width: u32, height: u32) -> Result<Pixmap, RenderError> {
    let mut scaled = new_pixmap(width, height)?;
    let sx = width as f32 / src.width() as f32;
    let sy = height as f32 / src.height() as f32;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    scaled.draw_pixmap(0, 0, src.as_ref(), &paint, Transform::from_scale(sx, sy), None);
    Ok(scaled)
}
