//! Software compositing of the selection overlay.
//!
//! The preview is drawn on a black surface the size of the view, the whole
//! surface is dimmed, and the selected region is left undimmed with a
//! white outline.

use crate::config::OverlayConfig;
use crate::overlay::selection::DisplayRect;
use crate::overlay::transform::ViewTransform;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

const SURFACE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BORDER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Scale the captured image to the size it is displayed at.
///
/// Done once per transform version; the actor caches the result.
pub fn scale_preview(image: &RgbaImage, transform: &ViewTransform) -> RgbaImage {
    let (w, h) = transform.displayed_size(image.dimensions());
    let (w, h) = (w.round().max(1.0) as u32, h.round().max(1.0) as u32);
    if (w, h) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, w, h, FilterType::Triangle)
}

/// Compose one overlay frame of size `view`.
pub fn compose(
    preview: &RgbaImage,
    transform: &ViewTransform,
    view: (u32, u32),
    selection: Option<DisplayRect>,
    style: &OverlayConfig,
) -> RgbaImage {
    let mut surface = RgbaImage::from_pixel(view.0.max(1), view.1.max(1), SURFACE);
    imageops::overlay(
        &mut surface,
        preview,
        transform.tx.round() as i64,
        transform.ty.round() as i64,
    );

    let hole = selection.map(|r| pixel_bounds(&r, surface.dimensions()));
    let keep = 255 - style.dim_alpha as u32;
    for (x, y, px) in surface.enumerate_pixels_mut() {
        if hole.map_or(false, |b| b.contains(x, y)) {
            continue;
        }
        for c in &mut px.0[..3] {
            *c = (*c as u32 * keep / 255) as u8;
        }
    }

    if let Some(bounds) = hole {
        draw_outline(&mut surface, bounds, style.border_width);
    }
    surface
}

/// Half-open pixel bounds of a display rectangle on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelBounds {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelBounds {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

fn pixel_bounds(rect: &DisplayRect, (w, h): (u32, u32)) -> PixelBounds {
    let clip = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
    PixelBounds {
        x0: clip(rect.left, w),
        y0: clip(rect.top, h),
        x1: clip(rect.right, w),
        y1: clip(rect.bottom, h),
    }
}

/// Stroke drawn just inside `b`.
fn draw_outline(surface: &mut RgbaImage, b: PixelBounds, width: u32) {
    if width == 0 || b.x0 >= b.x1 || b.y0 >= b.y1 {
        return;
    }
    for y in b.y0..b.y1 {
        for x in b.x0..b.x1 {
            let edge = x < b.x0 + width
                || x + width >= b.x1
                || y < b.y0 + width
                || y + width >= b.y1;
            if edge {
                surface.put_pixel(x, y, BORDER);
            }
        }
    }
}
