//! Content-addressed storage for chat attachments.
//!
//! Encoded crops are written once under the hash of their bytes, so the
//! same image snipped twice resolves to the same file.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex digits of the SHA-256 used in a blob's file name.
const NAME_PREFIX_LEN: usize = 16;

pub const PNG_MIME: &str = "image/png";

/// A persisted attachment the messaging side can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAttachmentRef {
    pub path: PathBuf,
    pub uri: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub byte_len: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Failed to create blob dir {0}: {1}")]
    Dir(PathBuf, std::io::Error),

    #[error("Failed to write blob {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// Result of [`BlobStore::persist`].
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub attachment: ChatAttachmentRef,
    /// The file did not exist before this call.
    pub fresh: bool,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<sha256-prefix>.png` for `bytes`.
    pub fn name_for(bytes: &[u8]) -> String {
        let hash = format!("{:x}", Sha256::digest(bytes));
        format!("{}.png", &hash[..NAME_PREFIX_LEN])
    }

    /// Write PNG `bytes` of a `width` x `height` image. Blocking.
    pub fn persist(&self, bytes: &[u8], width: u32, height: u32) -> Result<StoredBlob, PersistError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PersistError::Dir(self.dir.clone(), e))?;
        let dir = std::fs::canonicalize(&self.dir).map_err(|e| PersistError::Dir(self.dir.clone(), e))?;
        let path = dir.join(Self::name_for(bytes));

        let fresh = !path.exists();
        if fresh {
            // Only complete blobs ever carry the final name.
            let partial = path.with_extension("png.partial");
            std::fs::write(&partial, bytes).map_err(|e| PersistError::Write(partial.clone(), e))?;
            std::fs::rename(&partial, &path).map_err(|e| PersistError::Write(path.clone(), e))?;
            log::info!("[HANDOFF] Persisted {} ({} bytes)", path.display(), bytes.len());
        } else {
            log::debug!("[HANDOFF] Blob {} already present", path.display());
        }

        Ok(StoredBlob {
            attachment: ChatAttachmentRef {
                uri: format!("file://{}", path.display()),
                path,
                mime_type: PNG_MIME.to_string(),
                width,
                height,
                byte_len: bytes.len() as u64,
            },
            fresh,
        })
    }

    /// Delete a blob that never made it into a sent message.
    pub fn remove(&self, attachment: &ChatAttachmentRef) {
        match std::fs::remove_file(&attachment.path) {
            Ok(()) => log::info!("[HANDOFF] Removed unsent blob {}", attachment.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "[HANDOFF] Failed to remove {}: {}",
                attachment.path.display(),
                e
            ),
        }
    }
}
