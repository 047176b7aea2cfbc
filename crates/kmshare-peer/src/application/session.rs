//! SessionEngine: the distributed control-token state machine.
//!
//! # The control token (for beginners)
//!
//! Exactly one side of a session should be the *owner* – capturing input
//! globally and forwarding it – while the other is *passive*, synthesizing
//! what it receives.  There is no arbiter: ownership is a token passed
//! between the peers in `control_transfer` frames.  On session
//! establishment BOTH sides become owner; this deliberate race resolves
//! itself because only one user is physically moving a mouse, and the first
//! edge crossing sends the token to the other side.
//!
//! # Event flow
//!
//! ```text
//! capture thread ─ CapturedEvent ─▶ on_captured()
//!      ├─ not owner?            drop          (capture gating)
//!      ├─ pointer at edge?      send control_transfer, go passive
//!      └─ otherwise             forward via FrameSink
//!
//! receive thread ─ Event ─▶ on_frame()
//!      ├─ control_transfer      honor it (always, even degraded)
//!      ├─ owner?                drop          (synthesis gating)
//!      └─ otherwise             remap + inject via InputInjector
//! ```
//!
//! The token and the cooldown anchor live in one mutex that is never held
//! across a send, an injection, or a sleep: every entry point decides under
//! the lock, releases it, then performs I/O.
//!
//! Failure policy: a failed send is logged (the transport demotes itself), a
//! failed injection drops that one event, and a failed capture start leaves
//! the engine in inject-only mode.  The token never moves on an error –
//! only an explicit `control_transfer` or a shutdown moves it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kmshare_core::{
    local_to_remote, remote_to_local, Event, HandoverPolicy, KeyId, Layout, ScreenGeometry,
};
use tracing::{debug, info, warn};

use crate::infrastructure::input::{CaptureError, CapturedEvent, InputInjector};
use crate::infrastructure::network::transport::TransportError;

/// Delay after positioning the cursor on an inbound handover, letting the
/// display server settle before capture restarts and sees the new position.
const CURSOR_SETTLE: Duration = Duration::from_millis(100);

/// Validated settings snapshot consumed by the session layer.
///
/// Produced by `Settings::session_settings`; geometry is non-zero by
/// construction.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub local_geometry: ScreenGeometry,
    pub remote_geometry: ScreenGeometry,
    pub layout: Layout,
    /// When `false`, this side never initiates a handover.
    pub edge_detection: bool,
    /// Reserved hint for the input backend; not yet wired.
    pub hide_cursor: bool,
    pub listen_port: u16,
    /// Dial target; `None` runs listen-only.
    pub remote_addr: Option<SocketAddr>,
}

/// Outbound frame seam, implemented by the session transport.
pub trait FrameSink: Send + Sync {
    /// Sends one frame to the peer.
    fn send_event(&self, event: &Event) -> Result<(), TransportError>;
}

/// Capture on/off seam, implemented by the peer orchestrator's capture
/// driver.  Both calls are idempotent.
pub trait CaptureGate: Send + Sync {
    /// Starts capture and the pump feeding [`SessionEngine::on_captured`].
    fn engage(&self) -> Result<(), CaptureError>;
    /// Stops capture.
    fn disengage(&self);
}

/// Callbacks surfaced to the embedding front-end.
///
/// Both methods may be invoked from worker threads; a GUI adapter is
/// responsible for posting to its UI thread.
pub trait PeerEventSink: Send + Sync {
    fn connection_changed(&self, connected: bool);
    fn control_changed(&self, has_control: bool);
}

/// Token state protected by the session mutex.
struct ControlState {
    has_control: bool,
    policy: HandoverPolicy,
}

/// What `on_captured` decided under the lock; executed after it is released.
enum CaptureAction {
    Drop,
    Forward(Event),
    HandOver { cursor_x: i32, cursor_y: i32 },
}

/// The session engine.
///
/// Owned by the peer orchestrator; entry points are called from the capture
/// pump and the transport receive pump.
pub struct SessionEngine {
    local_geometry: ScreenGeometry,
    remote_geometry: ScreenGeometry,
    edge_detection: bool,
    layout: Mutex<Layout>,
    state: Mutex<ControlState>,
    sink: Arc<dyn FrameSink>,
    injector: Arc<dyn InputInjector>,
    capture: Arc<dyn CaptureGate>,
    events: Arc<dyn PeerEventSink>,
}

impl SessionEngine {
    pub fn new(
        settings: &SessionSettings,
        sink: Arc<dyn FrameSink>,
        injector: Arc<dyn InputInjector>,
        capture: Arc<dyn CaptureGate>,
        events: Arc<dyn PeerEventSink>,
    ) -> Self {
        Self {
            local_geometry: settings.local_geometry,
            remote_geometry: settings.remote_geometry,
            edge_detection: settings.edge_detection,
            layout: Mutex::new(settings.layout),
            state: Mutex::new(ControlState {
                has_control: false,
                policy: HandoverPolicy::new(),
            }),
            sink,
            injector,
            capture,
            events,
        }
    }

    /// Whether this side currently owns the control token.
    pub fn has_control(&self) -> bool {
        self.state.lock().expect("lock poisoned").has_control
    }

    /// Replaces the layout for a live session; takes effect on the next
    /// captured move, no reconnect needed.
    pub fn set_layout(&self, layout: Layout) {
        *self.layout.lock().expect("lock poisoned") = layout;
        info!(?layout, "layout updated");
    }

    // ── Transport notifications ───────────────────────────────────────────────

    /// A session channel came up.  Both sides start as owner; the first
    /// edge crossing settles the race.
    pub fn on_established(&self) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.has_control = true;
            state.policy.reset();
        }
        self.events.connection_changed(true);
        if let Err(e) = self.capture.engage() {
            warn!("capture unavailable, continuing in inject-only mode: {e}");
        }
        self.events.control_changed(true);
    }

    /// The session ended (peer close, I/O error, or local stop).
    pub fn on_closed(&self) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.has_control = false;
        }
        self.capture.disengage();
        self.events.connection_changed(false);
    }

    // ── Captured input (owner side) ───────────────────────────────────────────

    /// Handles one locally captured event.
    pub fn on_captured(&self, event: CapturedEvent) {
        let action = self.decide_capture(&event);
        match action {
            CaptureAction::Drop => {}
            CaptureAction::Forward(frame) => {
                if let Err(e) = self.sink.send_event(&frame) {
                    debug!("dropping captured event, send failed: {e}");
                }
            }
            CaptureAction::HandOver { cursor_x, cursor_y } => {
                self.hand_over(cursor_x, cursor_y);
            }
        }
    }

    /// Token check and edge evaluation, under the lock.
    fn decide_capture(&self, event: &CapturedEvent) -> CaptureAction {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.has_control {
            // Capture events can be in flight while the token leaves; they
            // must never reach the wire.
            return CaptureAction::Drop;
        }

        if let CapturedEvent::MouseMove { x, y } = *event {
            if self.edge_detection {
                let layout = *self.layout.lock().expect("lock poisoned");
                let now = Instant::now();
                if state
                    .policy
                    .should_transfer(now, layout, self.local_geometry, x, y)
                {
                    let (cursor_x, cursor_y) =
                        local_to_remote(layout, self.local_geometry, self.remote_geometry, x, y);
                    state.has_control = false;
                    state.policy.mark_transferred(now);
                    // The triggering move is consumed by the handover.
                    return CaptureAction::HandOver { cursor_x, cursor_y };
                }
            }
        }

        CaptureAction::Forward(to_frame(event))
    }

    /// Ships the token to the peer.  The token was already flipped under
    /// the lock; everything here is I/O and notification.
    fn hand_over(&self, cursor_x: i32, cursor_y: i32) {
        info!(cursor_x, cursor_y, "edge reached, transferring control to peer");
        let frame = Event::ControlTransfer {
            give_control: true,
            cursor_x,
            cursor_y,
        };
        if let Err(e) = self.sink.send_event(&frame) {
            // The transport demotes itself on send failure; the session
            // teardown path restores consistent state.
            warn!("failed to send control transfer: {e}");
        }
        self.capture.disengage();
        self.events.control_changed(false);
    }

    // ── Received frames (passive side) ────────────────────────────────────────

    /// Handles one frame received from the peer.
    pub fn on_frame(&self, event: Event) {
        match event {
            Event::ControlTransfer {
                give_control,
                cursor_x,
                cursor_y,
            } => self.apply_control_transfer(give_control, cursor_x, cursor_y),
            other => {
                if self.has_control() {
                    // Owner ignores the peer's input events entirely.
                    return;
                }
                self.synthesize(other);
            }
        }
    }

    /// Honors a control-transfer frame.  This must work even when the input
    /// backend is degraded: the token moves regardless, and failures only
    /// cost the cursor positioning.
    fn apply_control_transfer(&self, give_control: bool, cursor_x: i32, cursor_y: i32) {
        if give_control {
            let (x, y) = self.local_geometry.clamp(cursor_x, cursor_y);
            if let Err(e) = self.injector.move_to(x, y) {
                warn!("failed to position cursor for handover: {e}");
            }
            std::thread::sleep(CURSOR_SETTLE);
            if let Err(e) = self.capture.engage() {
                warn!("capture unavailable after handover, inject-only mode: {e}");
            }
            self.state.lock().expect("lock poisoned").has_control = true;
            info!(cursor_x = x, cursor_y = y, "control received");
            self.events.control_changed(true);
        } else {
            self.state.lock().expect("lock poisoned").has_control = false;
            self.capture.disengage();
            info!("control released by peer request");
            self.events.control_changed(false);
        }
    }

    /// Injects one remote input event locally.  Failures drop the event and
    /// leave all state untouched.
    fn synthesize(&self, event: Event) {
        let result = match event {
            Event::MouseMove { x, y } => {
                let (x, y) = remote_to_local(self.local_geometry, self.remote_geometry, x, y);
                let (x, y) = self.local_geometry.clamp(x, y);
                self.injector.move_to(x, y)
            }
            Event::MouseButton { button, pressed, .. } => self.injector.button(button, pressed),
            Event::MouseScroll { dx, dy, .. } => self.injector.scroll(dx, dy),
            Event::Keyboard { key, pressed } => match key {
                KeyId::Unknown(name) => {
                    debug!(%name, "dropping key with unrecognised name");
                    Ok(())
                }
                key => self.injector.key(&key, pressed),
            },
            // Handled in on_frame; kept unreachable-free for refactors.
            Event::ControlTransfer { .. } => Ok(()),
        };
        if let Err(e) = result {
            warn!("input injection failed, event dropped: {e}");
        }
    }
}

/// Converts a captured event into its wire frame.
fn to_frame(event: &CapturedEvent) -> Event {
    match *event {
        CapturedEvent::MouseMove { x, y } => Event::MouseMove { x, y },
        CapturedEvent::MouseButton { x, y, button, pressed } => {
            Event::MouseButton { x, y, button, pressed }
        }
        CapturedEvent::MouseScroll { x, y, dx, dy } => Event::MouseScroll { x, y, dx, dy },
        CapturedEvent::Key { ref key, pressed } => Event::Keyboard { key: key.clone(), pressed },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
