//! Canvas lifecycle events
//!
//! Events flow from the host component -> binding -> native backend.
//! The host reports what happened to the component; the binding only
//! cares about four transitions (attach, detach, resize, paint).

use serde::{Deserialize, Serialize};

/// Component geometry in host pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Negative dimensions clamp to zero
    pub fn clamped(self) -> (u32, u32) {
        (
            u32::try_from(self.width).unwrap_or_default(),
            u32::try_from(self.height).unwrap_or_default(),
        )
    }
}

/// Lifecycle events delivered by the host component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasEvent {
    /// Component attached to a display (peer created)
    Attached,
    /// Component became visible
    Shown,
    /// Component size changed
    Resized,
    /// Component position changed
    Moved,
    /// Host asked the component to paint itself
    Paint,
    /// Component became invisible
    Hidden,
    /// Component detached from its display (peer removed)
    Detached,
    /// Application is shutting down
    Closed,
}

/// The transitions the binding state machine actually distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Attach,
    Detach,
    Resize,
    Paint,
}

impl CanvasEvent {
    pub fn transition(self) -> Transition {
        match self {
            CanvasEvent::Attached | CanvasEvent::Shown => Transition::Attach,
            CanvasEvent::Resized | CanvasEvent::Moved => Transition::Resize,
            CanvasEvent::Paint => Transition::Paint,
            CanvasEvent::Hidden | CanvasEvent::Detached | CanvasEvent::Closed => {
                Transition::Detach
            }
        }
    }
}
