//! Input capture and synthesis seams.
//!
//! The session engine never talks to the OS directly.  It sees two traits:
//!
//! - [`InputSource`] – global capture.  `start` installs the listeners and
//!   returns a channel of [`CapturedEvent`]s; `stop` tears them down.  Both
//!   are idempotent, and a source must support being restarted – ownership
//!   of the control token toggles capture on every handover.
//! - [`InputInjector`] – synthesis.  Absolute pointer moves, button and key
//!   state changes, wheel steps.  Implementations clamp out-of-range
//!   coordinates to the display bounds.
//!
//! Capture failure (no display server, missing permissions) is a
//! recoverable [`CaptureError`]: the engine logs it and keeps running in
//! inject-only mode, so a headless-ish peer can still be driven from the
//! other side.  The production implementations live in [`native`]; tests
//! use [`mock`].

use std::sync::mpsc;

use kmshare_core::{KeyId, MouseButton};
use thiserror::Error;

pub mod mock;
pub mod native;

/// A raw input event produced by global capture, in local screen
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedEvent {
    /// The pointer moved to an absolute position.
    MouseMove { x: i32, y: i32 },
    /// A pointer button changed state.
    MouseButton {
        x: i32,
        y: i32,
        button: MouseButton,
        pressed: bool,
    },
    /// The wheel scrolled by `(dx, dy)` steps.
    MouseScroll { x: i32, y: i32, dx: i32, dy: i32 },
    /// A key changed state.
    Key { key: KeyId, pressed: bool },
}

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The global listener could not be installed (permissions, no display).
    #[error("failed to start global input listener: {0}")]
    ListenerFailed(String),
    /// Capture is not available in this build or environment.
    #[error("input capture unavailable: {0}")]
    Unavailable(String),
}

/// Error type for synthesis operations.
#[derive(Debug, Error)]
pub enum InjectionError {
    /// The synthesis backend could not be initialised.
    #[error("input injection backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A single injection call failed; the event is dropped.
    #[error("input injection failed: {0}")]
    Platform(String),
}

/// Trait abstracting global input capture.
///
/// The production implementation wraps the platform hook thread; tests use
/// [`mock::MockInputSource`].
pub trait InputSource: Send + Sync {
    /// Starts capture and returns a receiver for captured events.
    ///
    /// Calling `start` on a running source replaces the previous channel;
    /// the old receiver disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] when the listener cannot be installed.
    fn start(&self) -> Result<mpsc::Receiver<CapturedEvent>, CaptureError>;

    /// Stops capture.  Idempotent; a later `start` must work again.
    fn stop(&self);
}

/// Trait abstracting input synthesis.
///
/// All coordinate-taking calls tolerate out-of-range input by clamping to
/// the display bounds.
pub trait InputInjector: Send + Sync {
    /// Moves the pointer to an absolute position.
    fn move_to(&self, x: i32, y: i32) -> Result<(), InjectionError>;

    /// Presses or releases a pointer button.
    fn button(&self, button: MouseButton, pressed: bool) -> Result<(), InjectionError>;

    /// Scrolls the wheel by `(dx, dy)` steps.
    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InjectionError>;

    /// Presses or releases a key.  Unrecognised keys are dropped silently.
    fn key(&self, key: &KeyId, pressed: bool) -> Result<(), InjectionError>;
}
