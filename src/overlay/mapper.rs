//! Display-space selection to buffer-space crop rectangle.
//!
//! Pure and total: every input either yields a rectangle that lies inside
//! the buffer with a non-empty area, or `None`.

use crate::overlay::selection::DisplayRect;
use crate::overlay::transform::ViewTransform;
use serde::Serialize;

/// Distance from an integer under which a mapped coordinate is treated as
/// that integer. Absorbs float error from the inverse scale.
pub const SNAP_EPSILON: f64 = 1e-6;

/// Buffer-space rectangle; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Lies inside a `width` x `height` buffer and is non-empty.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.left < self.right
            && self.top < self.bottom
            && self.right <= width
            && self.bottom <= height
    }
}

/// Map `rect` through the inverse of `transform` onto a buffer of size
/// `buffer` and clamp it to the buffer bounds.
///
/// Returns `None` when a scale factor is zero or not finite, when the
/// buffer is empty, or when the rectangle itself is not finite.
pub fn map_to_buffer(
    rect: &DisplayRect,
    transform: &ViewTransform,
    buffer: (u32, u32),
) -> Option<CropRect> {
    let (width, height) = buffer;
    if width == 0 || height == 0 || !transform.is_invertible() {
        return None;
    }

    let left = to_buffer(rect.left, transform.tx, transform.sx)?;
    let top = to_buffer(rect.top, transform.ty, transform.sy)?;
    let right = to_buffer(rect.right, transform.tx, transform.sx)?;
    let bottom = to_buffer(rect.bottom, transform.ty, transform.sy)?;

    let (left, right) = clamp_span(left, right, width);
    let (top, bottom) = clamp_span(top, bottom, height);
    Some(CropRect {
        left,
        top,
        right,
        bottom,
    })
}

/// `(display - translation) / scale`, snapped then truncated toward zero.
fn to_buffer(display: f64, translation: f64, scale: f64) -> Option<i64> {
    let value = (display - translation) / scale;
    if !value.is_finite() {
        return None;
    }
    let nearest = value.round();
    let snapped = if (value - nearest).abs() < SNAP_EPSILON {
        nearest
    } else {
        value.trunc()
    };
    // Saturating cast; far out-of-range values are clamped below anyway.
    Some(snapped as i64)
}

/// `start` in `[0, dim-1]`, `end` in `[start+1, dim]`.
fn clamp_span(start: i64, end: i64, dim: u32) -> (u32, u32) {
    let dim = dim as i64;
    let start = start.clamp(0, dim - 1);
    let end = end.min(dim).max(start + 1);
    (start as u32, end as u32)
}
