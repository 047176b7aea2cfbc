//! Screen geometry and relative layout types.
//!
//! Each side of a session is modelled as a single rectangle – the host's
//! whole virtual screen.  [`Layout`] records where the remote rectangle sits
//! relative to the local one; the two peers should hold mirror-image layouts
//! (local `Right` ↔ remote `Left`), though nothing on the wire enforces it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when screen dimensions are unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// A screen dimension was zero.
    #[error("screen dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },
}

/// One side's screen size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
}

impl ScreenGeometry {
    /// Creates a geometry, rejecting zero-sized screens.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroDimension`] when either dimension is 0.
    pub fn new(width: u32, height: u32) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::ZeroDimension { width, height });
        }
        Ok(Self { width, height })
    }

    /// Clamps a point into `[0, width) × [0, height)`.
    ///
    /// Capture coordinates can land outside the screen (multi-monitor
    /// overshoot, synthetic events), and injected coordinates must never
    /// leave the display, so both directions run through this.
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.clamp(0, self.width as i32 - 1),
            y.clamp(0, self.height as i32 - 1),
        )
    }
}

/// Where the remote screen sits relative to the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenPosition {
    Left,
    Right,
    Top,
    Bottom,
}

/// The relative arrangement of the two screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub position: ScreenPosition,
}

impl Layout {
    pub fn new(position: ScreenPosition) -> Self {
        Self { position }
    }

    /// The layout the peer should hold for the screens to line up
    /// (local `Right` ↔ remote `Left`, local `Top` ↔ remote `Bottom`).
    pub fn mirrored(&self) -> Layout {
        let position = match self.position {
            ScreenPosition::Left => ScreenPosition::Right,
            ScreenPosition::Right => ScreenPosition::Left,
            ScreenPosition::Top => ScreenPosition::Bottom,
            ScreenPosition::Bottom => ScreenPosition::Top,
        };
        Layout { position }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
