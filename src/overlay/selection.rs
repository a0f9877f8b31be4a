//! Drag-gesture selection in display coordinates.
//!
//! Pure state, no rendering. The overlay actor feeds it pointer events and
//! asks for the finalized rectangle on confirm.

use serde::{Deserialize, Serialize};

/// Smallest span, in device-independent pixels, a selection may have on
/// either axis before it counts as a region.
pub const MIN_SELECTION_SPAN: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Normalized rectangle in display space (`left <= right`, `top <= bottom`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl DisplayRect {
    /// Rectangle spanned by two corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            left: a.x.min(b.x),
            top: a.y.min(b.y),
            right: a.x.max(b.x),
            bottom: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Dragging,
    Released,
}

/// Anchor and current point of the user's drag.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRect {
    anchor: Point,
    current: Point,
    phase: Phase,
}

impl Default for SelectionRect {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionRect {
    pub fn new() -> Self {
        Self {
            anchor: Point::new(0.0, 0.0),
            current: Point::new(0.0, 0.0),
            phase: Phase::Empty,
        }
    }

    /// Start a new gesture. Any previous selection is discarded.
    pub fn press(&mut self, at: Point) {
        self.anchor = at;
        self.current = at;
        self.phase = Phase::Dragging;
    }

    /// Move the free corner. Ignored when no gesture is active.
    pub fn drag(&mut self, to: Point) {
        if self.phase == Phase::Dragging {
            self.current = to;
        }
    }

    /// Finish the gesture at `at`.
    pub fn release(&mut self, at: Point) {
        if self.phase == Phase::Dragging {
            self.current = at;
            self.phase = Phase::Released;
        }
    }

    /// Pointer cancel finalizes at the last known point.
    pub fn cancel_gesture(&mut self) {
        if self.phase == Phase::Dragging {
            self.phase = Phase::Released;
        }
    }

    pub fn clear(&mut self) {
        self.phase = Phase::Empty;
    }

    pub fn is_dragging(&self) -> bool {
        self.phase == Phase::Dragging
    }

    /// Rectangle currently spanned, including mid-drag. `None` if no
    /// gesture has started or it is below the minimum span.
    pub fn rect(&self) -> Option<DisplayRect> {
        if self.phase == Phase::Empty {
            return None;
        }
        let rect = DisplayRect::from_corners(self.anchor, self.current);
        if rect.width() < MIN_SELECTION_SPAN || rect.height() < MIN_SELECTION_SPAN {
            return None;
        }
        Some(rect)
    }

    /// The confirmable selection: a released gesture of at least the
    /// minimum span. Anything else is "no selection", not an error.
    pub fn selection_rect(&self) -> Option<DisplayRect> {
        if self.phase != Phase::Released {
            return None;
        }
        self.rect()
    }
}
