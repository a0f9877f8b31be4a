//! The one capture session a coordinator may hold.
//!
//! A session owns everything that must not leak across a teardown: the
//! permission grant, the mirroring handle and the armed frame reader.
//! Dropping the session releases all of it.

use crate::capture::acquisition::FrameReader;
use crate::capture::host::{MirroringSession, PermissionToken};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    AwaitingPermission,
    PermissionGranted,
    MirroringActive,
    FrameRequested,
    Completed,
    Failed,
}

impl SessionState {
    /// Mirroring is up or a frame is being waited on / stored.
    pub fn is_capturing(self) -> bool {
        matches!(self, SessionState::MirroringActive | SessionState::FrameRequested)
    }
}

pub struct CaptureSession {
    pub id: Uuid,
    pub(crate) state: SessionState,
    pub(crate) grant: Option<PermissionToken>,
    pub(crate) mirroring: Option<Box<dyn MirroringSession>>,
    pub(crate) reader: Option<FrameReader>,
    /// Capture attempt this session is working on; 0 when none.
    pub(crate) generation: u64,
    /// Ticket of the outstanding permission prompt; 0 when none.
    pub(crate) permission_ticket: u64,
    pub(crate) settle_pending: bool,
    /// A capture was requested before the grant arrived.
    pub(crate) capture_wanted: bool,
}

impl CaptureSession {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        log::info!("[CAPTURE] Session {} created", id);
        Self {
            id,
            state: SessionState::Idle,
            grant: None,
            mirroring: None,
            reader: None,
            generation: 0,
            permission_ticket: 0,
            settle_pending: false,
            capture_wanted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_grant(&self) -> bool {
        self.grant.is_some()
    }

    /// A capture is settling, mirroring, or waiting for its frame.
    pub fn in_flight(&self) -> bool {
        self.settle_pending || self.state.is_capturing()
    }

    /// Release the mirroring handle and the reader. Idempotent.
    pub(crate) fn release_capture(&mut self) {
        if let Some(mut mirroring) = self.mirroring.take() {
            mirroring.release();
            log::debug!("[CAPTURE] Session {} released mirroring", self.id);
        }
        if self.reader.take().is_some() {
            log::debug!("[CAPTURE] Session {} released frame reader", self.id);
        }
    }

    /// Drop the current capture attempt entirely and go back to Idle.
    pub(crate) fn reset(&mut self) {
        self.release_capture();
        self.generation = 0;
        self.permission_ticket = 0;
        self.settle_pending = false;
        self.capture_wanted = false;
        self.state = SessionState::Idle;
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_capture();
        log::info!("[CAPTURE] Session {} destroyed", self.id);
    }
}
