//! Relative overlay rectangle
//!
//! The task panel position is stored as fractions of the wallpaper size so
//! it survives resolution changes. A settings front end moves it by dragging
//! the whole rectangle, an edge, or a corner; every mutation re-clamps so the
//! rectangle stays inside [0, 1] with a minimum extent.

use crate::geometry::Rect;

/// Smallest allowed width/height as a fraction of the wallpaper
pub const MIN_EXTENT: f32 = 0.05;
/// Largest allowed start coordinate
pub const MAX_START: f32 = 1.0 - MIN_EXTENT;
/// Smallest panel size in pixels when mapped onto an image
const MIN_PIXELS: f32 = 10.0;

/// Part of the rectangle grabbed by a drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragHandle {
    Whole,
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Overlay rectangle in relative coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayArea {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Default for OverlayArea {
    fn default() -> Self {
        Self {
            x1: 0.5,
            y1: 0.15,
            x2: 0.95,
            y2: 0.95,
        }
    }
}

impl OverlayArea {
    /// Create a clamped area
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Self::default();
        }
        Self { x1, y1, x2, y2 }.clamped()
    }

    /// Build from a `[x1, y1, x2, y2]` list (settings format).
    ///
    /// Anything other than four finite values in [0, 1] yields the default.
    pub fn from_slice(values: &[f32]) -> Self {
        match values {
            [x1, y1, x2, y2]
                if values
                    .iter()
                    .all(|v| v.is_finite() && (0.0..=1.0).contains(v)) =>
            {
                Self::new(*x1, *y1, *x2, *y2)
            }
            _ => {
                tracing::warn!(?values, "Invalid overlay area, using default");
                Self::default()
            }
        }
    }

    /// Re-establish the bounds invariant
    fn clamped(self) -> Self {
        let x1 = self.x1.min(MAX_START).max(0.0);
        let y1 = self.y1.min(MAX_START).max(0.0);
        let x2 = self.x2.min(1.0).max(x1 + MIN_EXTENT);
        let y2 = self.y2.min(1.0).max(y1 + MIN_EXTENT);
        Self { x1, y1, x2, y2 }
    }

    /// Apply a relative drag delta to the grabbed handle
    pub fn apply_drag(&self, handle: DragHandle, dx: f32, dy: f32) -> Self {
        let dx = if dx.is_finite() { dx } else { 0.0 };
        let dy = if dy.is_finite() { dy } else { 0.0 };
        let mut next = *self;

        match handle {
            DragHandle::Whole => {
                next.x1 += dx;
                next.y1 += dy;
                next.x2 += dx;
                next.y2 += dy;
            }
            DragHandle::Left => next.x1 += dx,
            DragHandle::Right => next.x2 += dx,
            DragHandle::Top => next.y1 += dy,
            DragHandle::Bottom => next.y2 += dy,
            DragHandle::TopLeft => {
                next.x1 += dx;
                next.y1 += dy;
            }
            DragHandle::TopRight => {
                next.x2 += dx;
                next.y1 += dy;
            }
            DragHandle::BottomLeft => {
                next.x1 += dx;
                next.y2 += dy;
            }
            DragHandle::BottomRight => {
                next.x2 += dx;
                next.y2 += dy;
            }
        }

        next.clamped()
    }

    /// Apply a drag measured in pixels of a preview of the given size
    pub fn apply_pixel_drag(
        &self,
        handle: DragHandle,
        dx: f32,
        dy: f32,
        view_width: f32,
        view_height: f32,
    ) -> Self {
        if view_width <= 0.0 || view_height <= 0.0 {
            return *self;
        }
        self.apply_drag(handle, dx / view_width, dy / view_height)
    }

    /// Map onto an image of the given pixel size
    pub fn to_pixels(&self, width: u32, height: u32) -> Rect {
        let (w, h) = (width as f32, height as f32);
        let left = (self.x1 * w).round();
        let top = (self.y1 * h).round();
        let right = (self.x2 * w).round().max(left + MIN_PIXELS);
        let bottom = (self.y2 * h).round().max(top + MIN_PIXELS);
        Rect::new(left, top, right, bottom)
    }

    /// Determine which handle a pointer at (x, y) grabs, given the
    /// rectangle as drawn on screen
    pub fn hit_test(rect: &Rect, x: f32, y: f32, tolerance: f32) -> Option<DragHandle> {
        let near = |a: f32, b: f32| (a - b).abs() < tolerance;
        let within_x = rect.left < x && x < rect.right;
        let within_y = rect.top < y && y < rect.bottom;

        // Corners first, then edges, then the body
        if near(x, rect.left) && near(y, rect.top) {
            return Some(DragHandle::TopLeft);
        }
        if near(x, rect.right) && near(y, rect.top) {
            return Some(DragHandle::TopRight);
        }
        if near(x, rect.left) && near(y, rect.bottom) {
            return Some(DragHandle::BottomLeft);
        }
        if near(x, rect.right) && near(y, rect.bottom) {
            return Some(DragHandle::BottomRight);
        }
        if near(x, rect.left) && within_y {
            return Some(DragHandle::Left);
        }
        if near(x, rect.right) && within_y {
            return Some(DragHandle::Right);
        }
        if near(y, rect.top) && within_x {
            return Some(DragHandle::Top);
        }
        if near(y, rect.bottom) && within_x {
            return Some(DragHandle::Bottom);
        }
        if rect.contains(x, y) {
            return Some(DragHandle::Whole);
        }
        None
    }

    /// Whether the bounds invariant holds
    pub fn is_valid(&self) -> bool {
        (0.0..=MAX_START).contains(&self.x1)
            && (0.0..=MAX_START).contains(&self.y1)
            && self.x2 <= 1.0
            && self.y2 <= 1.0
            && self.x2 - self.x1 >= MIN_EXTENT - 1e-6
            && self.y2 - self.y1 >= MIN_EXTENT - 1e-6
    }
}
