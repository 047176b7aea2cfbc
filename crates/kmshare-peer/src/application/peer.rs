//! Peer orchestrator: wires the transport, session engine, and capture pump.
//!
//! [`Peer`] owns the whole session lifecycle.  `start` binds the listener,
//! launches the dialer, and begins pumping transport events into the
//! engine; `stop` flips the running flag, closes the socket, stops capture,
//! and guarantees exactly one `connection_changed(false)` – the transport's
//! closed-latch makes the guarantee regardless of which side ended the
//! session.
//!
//! The capture pump deserves a note: the engine decides *when* capture runs
//! (ownership toggles it on every handover), but only the orchestrator can
//! wire the capture channel back into the engine.  [`CaptureDriver`] bridges
//! the two – it implements the engine-facing [`CaptureGate`] and holds a
//! weak engine reference, installed right after construction, so the pump
//! thread it spawns can deliver events without creating a reference cycle.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::Receiver,
    Arc, Mutex, Weak,
};

use kmshare_core::Layout;
use tracing::{debug, info, warn};

use crate::application::session::{
    CaptureGate, FrameSink, PeerEventSink, SessionEngine, SessionSettings,
};
use crate::infrastructure::input::{CaptureError, InputInjector, InputSource};
use crate::infrastructure::network::transport::{
    SessionEvent, SessionTransport, TransportError,
};

/// The peer-session orchestrator.
pub struct Peer {
    engine: Arc<SessionEngine>,
    transport: Arc<SessionTransport>,
    driver: Arc<CaptureDriver>,
    session_rx: Mutex<Option<Receiver<SessionEvent>>>,
    started: AtomicBool,
}

impl Peer {
    /// Wires a peer from its collaborators.  Nothing runs until
    /// [`Peer::start`].
    pub fn new(
        settings: SessionSettings,
        source: Arc<dyn InputSource>,
        injector: Arc<dyn InputInjector>,
        events: Arc<dyn PeerEventSink>,
    ) -> Self {
        let (transport, session_rx) =
            SessionTransport::new(settings.listen_port, settings.remote_addr);
        let driver = Arc::new(CaptureDriver::new(source));
        let engine = Arc::new(SessionEngine::new(
            &settings,
            Arc::clone(&transport) as Arc<dyn FrameSink>,
            injector,
            Arc::clone(&driver) as Arc<dyn CaptureGate>,
            events,
        ));
        driver.attach(&engine);

        Self {
            engine,
            transport,
            driver,
            session_rx: Mutex::new(Some(session_rx)),
            started: AtomicBool::new(false),
        }
    }

    /// Starts the listener, the dialer, and the session event pump.
    ///
    /// A `Peer` drives at most one session lifetime: after [`Peer::stop`]
    /// construct a new one to reconnect (the disconnect latch is spent).
    /// Redundant `start` calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] when the listen port is
    /// unavailable; the peer is left stopped and may be started again.
    pub fn start(&self) -> Result<(), TransportError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.transport.start() {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        // Channel events buffer until the pump is up, so starting the
        // transport first loses nothing.
        if let Some(session_rx) = self.session_rx.lock().expect("lock poisoned").take() {
            let engine = Arc::clone(&self.engine);
            std::thread::Builder::new()
                .name("kms-session-pump".to_string())
                .spawn(move || session_pump(session_rx, engine))
                .expect("failed to spawn session pump thread");
        }
        info!("peer started");
        Ok(())
    }

    /// Stops everything.  Safe to call more than once.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.transport.stop();
        self.driver.disengage();
        info!("peer stopped");
    }

    /// Replaces the layout for the live session; no reconnect required.
    pub fn set_layout(&self, layout: Layout) {
        self.engine.set_layout(layout);
    }

    /// Whether this side currently owns the control token.
    pub fn has_control(&self) -> bool {
        self.engine.has_control()
    }

    /// Whether a session channel is up.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

/// Drains transport events into the engine until the channel closes.
fn session_pump(rx: Receiver<SessionEvent>, engine: Arc<SessionEngine>) {
    for event in rx {
        match event {
            SessionEvent::Established { peer } => {
                debug!(%peer, "session pump: established");
                engine.on_established();
            }
            SessionEvent::Frame(frame) => engine.on_frame(frame),
            SessionEvent::Closed => engine.on_closed(),
        }
    }
    debug!("session pump exiting");
}

/// Bridges the engine's [`CaptureGate`] to an [`InputSource`] plus the pump
/// thread that feeds captured events back into the engine.
pub(crate) struct CaptureDriver {
    source: Arc<dyn InputSource>,
    engine: Mutex<Weak<SessionEngine>>,
    engaged: AtomicBool,
}

impl CaptureDriver {
    pub(crate) fn new(source: Arc<dyn InputSource>) -> Self {
        Self {
            source,
            engine: Mutex::new(Weak::new()),
            engaged: AtomicBool::new(false),
        }
    }

    /// Installs the engine reference.  Called once right after the engine is
    /// constructed; weak, so dropping the peer tears everything down.
    pub(crate) fn attach(&self, engine: &Arc<SessionEngine>) {
        *self.engine.lock().expect("lock poisoned") = Arc::downgrade(engine);
    }
}

impl CaptureGate for CaptureDriver {
    fn engage(&self) -> Result<(), CaptureError> {
        if self.engaged.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let receiver = match self.source.start() {
            Ok(receiver) => receiver,
            Err(e) => {
                self.engaged.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let engine = match self.engine.lock().expect("lock poisoned").upgrade() {
            Some(engine) => engine,
            None => {
                // Engine already dropped; nothing left to feed.
                self.engaged.store(false, Ordering::SeqCst);
                self.source.stop();
                return Ok(());
            }
        };

        std::thread::Builder::new()
            .name("kms-capture-pump".to_string())
            .spawn(move || {
                for event in receiver {
                    engine.on_captured(event);
                }
                debug!("capture pump exiting");
            })
            .map_err(|e| {
                self.engaged.store(false, Ordering::SeqCst);
                self.source.stop();
                warn!("failed to spawn capture pump: {e}");
                CaptureError::ListenerFailed(e.to_string())
            })?;
        Ok(())
    }

    fn disengage(&self) {
        self.engaged.store(false, Ordering::SeqCst);
        // Dropping the sender ends the pump thread's loop.
        self.source.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
