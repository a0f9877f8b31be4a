//! Crate-level failure taxonomy.
//!
//! Module errors (`FrameError`, `CropError`, `MessagingError`, ...) stay
//! local to their module and are folded into `SnipError` at the boundary
//! where the pipeline decides what the user sees.

use crate::handoff::{CropError, MessagingError, PersistError};
use crate::signals::UserSignal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnipError {
    /// The user declined the mirroring permission prompt. Retryable.
    #[error("Screen capture permission denied")]
    PermissionDenied,

    /// The host revoked mirroring while a capture was in flight.
    #[error("Mirroring session lost: {0}")]
    SessionLost(String),

    /// No frame arrived within the capture timeout.
    #[error("No frame within {0}ms")]
    CaptureTimeout(u64),

    /// Mirroring could not be started or the frame could not be stored.
    #[error("Capture failed: {0}")]
    CaptureFailure(String),

    /// The scratch capture could not be read back.
    #[error("Failed to decode captured image: {0}")]
    DecodeFailure(String),

    /// The selection is below the minimum span.
    #[error("No region selected")]
    NoSelection,

    /// The view transform was degenerate or the crop bounds were invalid.
    #[error("Crop failed: {0}")]
    CropFailure(String),

    /// Encoding, persisting or sending the crop failed.
    #[error("Handoff failed: {0}")]
    HandoffFailure(String),
}

impl SnipError {
    /// The toast shown for this failure.
    ///
    /// Lost sessions and timeouts reset silently; the trigger stays
    /// available and the user simply snips again.
    pub fn signal(&self) -> Option<UserSignal> {
        match self {
            SnipError::PermissionDenied => Some(UserSignal::PermissionRequired),
            SnipError::SessionLost(_) | SnipError::CaptureTimeout(_) => None,
            SnipError::CaptureFailure(_) | SnipError::DecodeFailure(_) => {
                Some(UserSignal::DecodeFailed)
            }
            SnipError::NoSelection => Some(UserSignal::NoRegionSelected),
            SnipError::CropFailure(_) => Some(UserSignal::CropFailed),
            SnipError::HandoffFailure(_) => Some(UserSignal::SendFailed),
        }
    }

    /// Whether the user can simply try again without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SnipError::PermissionDenied
                | SnipError::SessionLost(_)
                | SnipError::CaptureTimeout(_)
                | SnipError::NoSelection
        )
    }
}

impl From<CropError> for SnipError {
    fn from(e: CropError) -> Self {
        match e {
            // The bounds were fine; the bytes could not be produced.
            CropError::EncodingFailed(msg) => SnipError::HandoffFailure(msg),
            other => SnipError::CropFailure(other.to_string()),
        }
    }
}

impl From<PersistError> for SnipError {
    fn from(e: PersistError) -> Self {
        SnipError::HandoffFailure(e.to_string())
    }
}

impl From<MessagingError> for SnipError {
    fn from(e: MessagingError) -> Self {
        SnipError::HandoffFailure(e.to_string())
    }
}
