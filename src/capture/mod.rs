//! Screen capture domain: public API.
//!
//! This module owns session coordination and one-shot frame acquisition.
//! External code drives it through `CoordinatorHandle` and reads results
//! from the `CaptureEvent` stream; the host seams live in `host`.

mod acquisition;
mod coordinator;
mod frame;
mod host;
mod scratch;
mod screenshot;
mod session;

pub use acquisition::{store_frame, AcquisitionError, FrameReader};
pub use coordinator::{spawn_coordinator, CaptureEvent, CoordinatorHandle};
pub use frame::{FrameBuffer, FrameError, PixelFormat};
pub use host::{
    DisplayMetrics, HostError, HostEventSink, MirrorTarget, MirroringHost, MirroringSession,
    PermissionBroker, PermissionReply, PermissionToken,
};
pub use scratch::{ScratchError, ScratchImage, ScratchStore};
pub use screenshot::{AutoGrantBroker, XcapHost};
pub use session::{CaptureSession, SessionState};
