//! Raw frame layout and export.
//!
//! Hosts hand us the first plane of a mirrored frame as-is: rows may be
//! padded past `width * pixel_stride` for alignment. Export drops the
//! padding so the image is exactly `width x height`.

use image::RgbaImage;

/// Pixel formats a host may deliver. Both are 4 bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8888,
    /// Swizzled to RGBA on export.
    Bgra8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
        }
    }
}

/// One captured raster plus its byte layout.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// Bytes between horizontally adjacent pixels.
    pub pixel_stride: usize,
    /// Bytes between the starts of vertically adjacent rows.
    pub row_stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame is {actual:?} but the mirroring target is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Frame has zero width or height")]
    Empty,

    #[error("Pixel stride {pixel_stride} does not fit format {format:?}")]
    BadPixelStride {
        pixel_stride: usize,
        format: PixelFormat,
    },

    #[error("Row stride {row_stride} is smaller than one row ({row_bytes} bytes)")]
    RowStrideTooSmall { row_stride: usize, row_bytes: usize },

    #[error("Frame data truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
}

impl FrameBuffer {
    /// A tightly packed RGBA frame (row stride == width * 4).
    pub fn packed_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixel_stride: 4,
            row_stride: width as usize * 4,
            format: PixelFormat::Rgba8888,
            data,
        }
    }

    /// Bytes of real pixels in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_stride
    }

    /// Padding bytes at the end of each row.
    pub fn row_padding(&self) -> usize {
        self.row_stride.saturating_sub(self.row_bytes())
    }

    /// Check that the declared layout actually fits in `data`.
    ///
    /// The last row does not need to carry its padding.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty);
        }
        if self.pixel_stride < self.format.bytes_per_pixel() {
            return Err(FrameError::BadPixelStride {
                pixel_stride: self.pixel_stride,
                format: self.format,
            });
        }
        let row_bytes = self.row_bytes();
        if self.row_stride < row_bytes {
            return Err(FrameError::RowStrideTooSmall {
                row_stride: self.row_stride,
                row_bytes,
            });
        }
        let needed = self.row_stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(FrameError::Truncated {
                needed,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Export to a `width x height` RGBA image, dropping row padding.
    ///
    /// Consumes the buffer: a frame is exported exactly once.
    pub fn into_rgba_image(self) -> Result<RgbaImage, FrameError> {
        self.validate()?;

        let width = self.width as usize;
        let height = self.height as usize;
        let bpp = self.format.bytes_per_pixel();
        let mut out = Vec::with_capacity(width * height * 4);

        for row in 0..height {
            let start = row * self.row_stride;
            let row_data = &self.data[start..start + self.row_bytes()];
            if self.pixel_stride == 4 && self.format == PixelFormat::Rgba8888 {
                out.extend_from_slice(row_data);
                continue;
            }
            for px in row_data.chunks(self.pixel_stride) {
                let p = &px[..bpp];
                match self.format {
                    PixelFormat::Rgba8888 => out.extend_from_slice(&[p[0], p[1], p[2], p[3]]),
                    PixelFormat::Bgra8888 => out.extend_from_slice(&[p[2], p[1], p[0], p[3]]),
                }
            }
        }

        RgbaImage::from_raw(self.width, self.height, out).ok_or(FrameError::Truncated {
            needed: width * height * 4,
            actual: 0,
        })
    }
}
