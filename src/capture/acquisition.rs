//! One-shot frame acquisition.
//!
//! A `FrameReader` is armed per capture attempt. It accepts the first frame
//! that matches the mirroring target and refuses everything after it; there
//! is no streaming mode.

use crate::capture::frame::{FrameBuffer, FrameError};
use crate::capture::host::MirrorTarget;
use crate::capture::scratch::{ScratchError, ScratchImage, ScratchStore};

#[derive(Debug)]
pub struct FrameReader {
    target: MirrorTarget,
    accepted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Scratch(#[from] ScratchError),
}

impl FrameReader {
    pub fn new(target: MirrorTarget) -> Self {
        log::debug!(
            "[FRAME] Reader armed for {}x{} @ {}dpi",
            target.width,
            target.height,
            target.density_dpi
        );
        Self {
            target,
            accepted: false,
        }
    }

    pub fn target(&self) -> &MirrorTarget {
        &self.target
    }

    pub fn has_accepted(&self) -> bool {
        self.accepted
    }

    /// Take `frame` if it is the first one and matches the target.
    ///
    /// Returns `Ok(None)` for frames after the first accepted one.
    pub fn accept(&mut self, frame: FrameBuffer) -> Result<Option<FrameBuffer>, FrameError> {
        if self.accepted {
            log::debug!("[FRAME] Discarding extra frame");
            return Ok(None);
        }
        let expected = (self.target.width, self.target.height);
        let actual = (frame.width, frame.height);
        if expected != actual {
            return Err(FrameError::DimensionMismatch { expected, actual });
        }
        frame.validate()?;
        self.accepted = true;
        Ok(Some(frame))
    }
}

/// Export an accepted frame and write it to scratch storage.
///
/// Blocking. The coordinator runs this on the blocking pool.
pub fn store_frame(frame: FrameBuffer, scratch: &ScratchStore) -> Result<ScratchImage, AcquisitionError> {
    let start = std::time::Instant::now();
    let (width, height, padding) = (frame.width, frame.height, frame.row_padding());
    let image = frame.into_rgba_image()?;
    let export_ms = start.elapsed().as_millis();

    let stored = scratch.write(&image)?;
    log::info!(
        "[FRAME] Stored {}x{} capture (row padding {} bytes) in {}ms (export={}ms) at {}",
        width,
        height,
        padding,
        start.elapsed().as_millis(),
        export_ms,
        stored.path.display()
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PixelFormat;

    fn target(width: u32, height: u32) -> MirrorTarget {
        MirrorTarget {
            width,
            height,
            density_dpi: 160,
            format: PixelFormat::Rgba8888,
        }
    }

    #[test]
    fn accepts_exactly_one_frame() {
        let mut reader = FrameReader::new(target(2, 2));
        let first = reader.accept(FrameBuffer::packed_rgba(2, 2, vec![1; 16])).unwrap();
        assert!(first.is_some());
        assert!(reader.has_accepted());
        let second = reader.accept(FrameBuffer::packed_rgba(2, 2, vec![2; 16])).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn rejects_frame_of_wrong_size() {
        let mut reader = FrameReader::new(target(4, 4));
        let err = reader
            .accept(FrameBuffer::packed_rgba(2, 2, vec![0; 16]))
            .unwrap_err();
        assert!(matches!(err, FrameError::DimensionMismatch { .. }));
        assert!(!reader.has_accepted());
    }

    #[test]
    fn stored_frame_has_target_dimensions_without_padding() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::new(dir.path());
        let frame = FrameBuffer {
            width: 3,
            height: 2,
            pixel_stride: 4,
            row_stride: 16,
            format: PixelFormat::Rgba8888,
            data: vec![200; 32],
        };

        let stored = store_frame(frame, &scratch).unwrap();
        assert_eq!((stored.width, stored.height), (3, 2));
        let img = ScratchStore::load(&stored.path).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }
}
