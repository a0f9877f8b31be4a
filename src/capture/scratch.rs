//! Process-local scratch storage for raw captures.
//!
//! Each accepted frame is written once as a lossless PNG named after the
//! capture time. Nothing here survives beyond the snip that produced it;
//! stale files are overwritten or pruned.

use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};

/// A capture written to scratch storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ScratchImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    #[error("Failed to prepare scratch dir {0}: {1}")]
    Dir(PathBuf, std::io::Error),

    #[error("PNG save failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct ScratchStore {
    dir: PathBuf,
}

impl ScratchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic name for a capture taken at `epoch_ms`.
    pub fn path_for(&self, epoch_ms: u128) -> PathBuf {
        self.dir.join(format!("capture_{}.png", epoch_ms))
    }

    /// Encode `image` losslessly and write it under a timestamp-derived name.
    pub fn write(&self, image: &RgbaImage) -> Result<ScratchImage, ScratchError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ScratchError::Dir(self.dir.clone(), e))?;

        let epoch_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let path = self.path_for(epoch_ms);
        image.save_with_format(&path, ImageFormat::Png)?;

        Ok(ScratchImage {
            path,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Read a scratch capture back.
    pub fn load(path: &Path) -> Result<RgbaImage, image::ImageError> {
        Ok(image::open(path)?.to_rgba8())
    }

    /// Remove a scratch capture. Missing files are fine.
    pub fn remove(&self, image: &ScratchImage) {
        match std::fs::remove_file(&image.path) {
            Ok(()) => log::debug!("[SCRATCH] Removed {}", image.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[SCRATCH] Failed to remove {}: {}", image.path.display(), e),
        }
    }

    /// Delete every scratch capture except the `keep` newest ones.
    ///
    /// Returns how many files were removed.
    pub fn prune(&self, keep: usize) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut captures: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("capture_") && n.ends_with(".png"))
                    .unwrap_or(false)
            })
            .collect();
        // Sort by the numeric stamp; lexical order breaks across digit counts.
        captures.sort_by_key(|p| capture_stamp(p));

        let excess = captures.len().saturating_sub(keep);
        captures
            .into_iter()
            .take(excess)
            .filter(|p| std::fs::remove_file(p).is_ok())
            .count()
    }
}

fn capture_stamp(path: &Path) -> u128 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("capture_"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
