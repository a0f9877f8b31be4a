//! Pure region cropping logic: functional core.
//!
//! No infrastructure dependencies. Pixels in, PNG bytes out.

use crate::overlay::CropRect;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// Crops `image` to `rect` and returns lossless PNG bytes.
///
/// `rect` is expected to come from the mapper and therefore already lie
/// inside the image; anything else is rejected rather than clamped again.
pub fn crop_to_png_bytes(image: &RgbaImage, rect: &CropRect) -> Result<Vec<u8>, CropError> {
    if rect.right <= rect.left || rect.bottom <= rect.top {
        return Err(CropError::ZeroDimension);
    }

    let (img_width, img_height) = image.dimensions();
    if !rect.fits(img_width, img_height) {
        return Err(CropError::OutOfBounds {
            requested: *rect,
            image_size: (img_width, img_height),
        });
    }

    let cropped = image::imageops::crop_imm(image, rect.left, rect.top, rect.width(), rect.height())
        .to_image();

    let mut png_bytes: Vec<u8> = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| CropError::EncodingFailed(e.to_string()))?;

    Ok(png_bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Crop rectangle has zero width or height")]
    ZeroDimension,

    #[error(
        "Crop rectangle ({},{})-({},{}) exceeds image bounds ({}x{})",
        requested.left, requested.top, requested.right, requested.bottom,
        image_size.0, image_size.1
    )]
    OutOfBounds {
        requested: CropRect,
        image_size: (u32, u32),
    },

    #[error("PNG encoding failed: {0}")]
    EncodingFailed(String),
}
