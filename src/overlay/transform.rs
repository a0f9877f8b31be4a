//! How the captured buffer is laid out on the displayed preview.

use serde::Serialize;

/// Scale and translation from buffer space to display space:
/// `display = buffer * scale + translation`, per axis.
///
/// `version` increases every time the view is re-laid out, so a crop
/// request can carry the exact transform it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewTransform {
    pub sx: f64,
    pub sy: f64,
    pub tx: f64,
    pub ty: f64,
    pub version: u64,
}

impl ViewTransform {
    /// Uniform scale that fits `image` inside `view`, centered.
    pub fn aspect_fit(image: (u32, u32), view: (u32, u32), version: u64) -> Self {
        let (iw, ih) = (image.0 as f64, image.1 as f64);
        let (vw, vh) = (view.0 as f64, view.1 as f64);
        if iw == 0.0 || ih == 0.0 {
            return Self {
                sx: 0.0,
                sy: 0.0,
                tx: 0.0,
                ty: 0.0,
                version,
            };
        }
        let scale = (vw / iw).min(vh / ih);
        Self {
            sx: scale,
            sy: scale,
            tx: (vw - iw * scale) / 2.0,
            ty: (vh - ih * scale) / 2.0,
            version,
        }
    }

    /// Scale and translation are usable for inverse mapping.
    pub fn is_invertible(&self) -> bool {
        self.sx.is_finite()
            && self.sy.is_finite()
            && self.tx.is_finite()
            && self.ty.is_finite()
            && self.sx != 0.0
            && self.sy != 0.0
    }

    /// Displayed size of a buffer of `image` pixels.
    pub fn displayed_size(&self, image: (u32, u32)) -> (f64, f64) {
        (image.0 as f64 * self.sx, image.1 as f64 * self.sy)
    }
}
