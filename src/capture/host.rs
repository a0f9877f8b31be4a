//! Seams to the host environment.
//!
//! The coordinator never talks to the OS directly. A `PermissionBroker`
//! runs the permission prompt, a `MirroringHost` turns a granted token into
//! a mirroring session, and both answer through handles that enqueue events
//! on the coordinator's control loop instead of calling back into it.

use crate::capture::coordinator::ControlEvent;
use crate::capture::frame::{FrameBuffer, PixelFormat};
use tokio::sync::mpsc::UnboundedSender;

/// Opaque proof that the user allowed screen mirroring.
///
/// Only the host that issued it knows what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionToken(pub String);

/// Live resolution and density of the display being mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMetrics {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

/// What a mirroring session is configured to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorTarget {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
    pub format: PixelFormat,
}

impl MirrorTarget {
    pub fn for_display(metrics: DisplayMetrics) -> Self {
        Self {
            width: metrics.width,
            height: metrics.height,
            density_dpi: metrics.density_dpi,
            format: PixelFormat::Rgba8888,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Display unavailable: {0}")]
    DisplayUnavailable(String),

    /// The grant is no longer valid; a new permission prompt is needed.
    #[error("Mirroring permission revoked: {0}")]
    Revoked(String),

    #[error("Failed to start mirroring: {0}")]
    MirroringFailed(String),
}

/// Runs the external permission prompt.
pub trait PermissionBroker: Send + Sync {
    /// Start the prompt. Must not block; answer later through `reply`.
    ///
    /// Dropping `reply` without resolving it counts as a denial.
    fn request(&self, reply: PermissionReply);
}

/// Creates mirroring sessions from a granted token.
pub trait MirroringHost: Send + Sync {
    fn display_metrics(&self) -> Result<DisplayMetrics, HostError>;

    /// Start streaming the display into a buffer sized to `target`.
    ///
    /// Frames and termination notices go through `sink`; the host may call
    /// it from any thread, at any time, until the session is released.
    fn start_mirroring(
        &self,
        token: &PermissionToken,
        target: &MirrorTarget,
        sink: HostEventSink,
    ) -> Result<Box<dyn MirroringSession>, HostError>;
}

/// A live mirroring session. Owned exclusively by the coordinator.
pub trait MirroringSession: Send {
    /// Stop mirroring and free host resources. Must be idempotent.
    fn release(&mut self);
}

/// One-shot answer to a permission prompt.
pub struct PermissionReply {
    tx: Option<UnboundedSender<ControlEvent>>,
    ticket: u64,
}

impl PermissionReply {
    pub(crate) fn new(tx: UnboundedSender<ControlEvent>, ticket: u64) -> Self {
        Self {
            tx: Some(tx),
            ticket,
        }
    }

    pub fn resolve(mut self, granted: bool, token: Option<PermissionToken>) {
        self.send(granted, token);
    }

    pub fn grant(self, token: PermissionToken) {
        self.resolve(true, Some(token));
    }

    pub fn deny(self) {
        self.resolve(false, None);
    }

    fn send(&mut self, granted: bool, token: Option<PermissionToken>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(ControlEvent::PermissionResult {
                ticket: self.ticket,
                granted,
                token,
            });
        }
    }
}

impl Drop for PermissionReply {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::debug!("[CAPTURE] Permission reply dropped unanswered, treating as denial");
            self.send(false, None);
        }
    }
}

/// Where a mirroring session reports frames and termination.
///
/// Tagged with the capture attempt it was created for, so anything it
/// sends after that attempt ends is discarded by the coordinator.
#[derive(Clone)]
pub struct HostEventSink {
    tx: UnboundedSender<ControlEvent>,
    generation: u64,
}

impl HostEventSink {
    pub(crate) fn new(tx: UnboundedSender<ControlEvent>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Deliver a frame. Returns `false` once the coordinator is gone.
    pub fn frame_ready(&self, frame: FrameBuffer) -> bool {
        self.tx
            .send(ControlEvent::FrameReady {
                generation: self.generation,
                frame,
            })
            .is_ok()
    }

    /// The host ended mirroring on its own (user revoked, display gone).
    pub fn terminated(&self, reason: impl Into<String>) {
        let _ = self.tx.send(ControlEvent::HostTerminated {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}
