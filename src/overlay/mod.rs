//! Region selection overlay and the display-to-buffer coordinate mapper.

mod actor;
mod mapper;
mod render;
mod selection;
mod transform;

pub use actor::{open_overlay, OverlayFrame, OverlayHandle, OverlayInput, OverlayOutcome};
pub use mapper::{map_to_buffer, CropRect, SNAP_EPSILON};
pub use render::{compose, scale_preview};
pub use selection::{DisplayRect, Point, SelectionRect, MIN_SELECTION_SPAN};
pub use transform::ViewTransform;
