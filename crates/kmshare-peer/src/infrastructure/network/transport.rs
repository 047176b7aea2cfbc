//! Dual-role TCP session transport.
//!
//! Each peer simultaneously listens on its configured port *and* dials the
//! remote address; whichever connection establishes first becomes the
//! session channel and the loser is closed.  This race-to-connect keeps the
//! pairing robust when one side starts late or sits behind a one-way
//! firewall.
//!
//! # Worker threads
//!
//! - `kms-listener` – non-blocking accept with a 1 s poll, backlog 1.  While
//!   a session exists, further inbound connections are accepted and
//!   immediately closed so a stray third host cannot hijack the channel.
//! - `kms-dialer`   – up to 3 connect attempts, 2 s apart, 5 s timeout per
//!   attempt; exits early once any connection is promoted.
//! - `kms-receiver` – spawned on promotion.  The socket is switched to
//!   blocking mode; bytes are read into the incremental [`LineDecoder`] and
//!   complete frames are forwarded as [`SessionEvent::Frame`]s.  A
//!   zero-length read or I/O error tears the session down.
//!
//! The application layer consumes [`SessionEvent`]s from the channel
//! returned by [`SessionTransport::new`].  `Closed` is reported exactly once
//! per transport, whether the session ended from the remote side, a send
//! failure, or a local [`SessionTransport::stop`].
//!
//! # Send path
//!
//! [`SessionTransport::send_event`] performs a single whole-buffer write.
//! A write error demotes the session on the spot – no retry, no buffering;
//! input events are worthless milliseconds after they happened.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
    Arc, Mutex,
};
use std::time::Duration;

use kmshare_core::{encode_event, Event, LineDecoder};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::is_timeout_error;

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_secs(1);

/// Dial retry schedule.
const DIAL_ATTEMPTS: u32 = 3;
const DIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive buffer granularity for the blocking read loop.
const RECV_CHUNK: usize = 4096;

/// Error type for session transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listening socket could not be bound.
    #[error("failed to bind session listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// A frame could not be serialised for sending.
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] kmshare_core::DecodeError),
    /// There is no active session channel.
    #[error("no active session")]
    NotConnected,
    /// The whole-buffer write failed; the session has been demoted.
    #[error("send failed: {0}")]
    Send(std::io::Error),
}

/// Events delivered to the application layer.
#[derive(Debug)]
pub enum SessionEvent {
    /// A session channel was promoted (inbound or outbound).
    Established { peer: SocketAddr },
    /// One decoded frame from the peer.
    Frame(Event),
    /// The session ended.  Reported exactly once per transport.
    Closed,
}

/// The dual-role session transport.
pub struct SessionTransport {
    shared: Arc<TransportShared>,
}

struct TransportShared {
    listen_port: u16,
    remote_addr: Option<SocketAddr>,
    running: AtomicBool,
    connected: AtomicBool,
    /// Latch guaranteeing a single `Closed` event per transport lifetime.
    closed_reported: AtomicBool,
    /// Write half of the promoted session, shared by all senders.
    stream: Mutex<Option<TcpStream>>,
    events: Sender<SessionEvent>,
}

impl SessionTransport {
    /// Creates a transport and the channel its events arrive on.
    ///
    /// `remote_addr` is the dial target; `None` runs listen-only.
    pub fn new(
        listen_port: u16,
        remote_addr: Option<SocketAddr>,
    ) -> (Arc<Self>, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::new(Self {
            shared: Arc::new(TransportShared {
                listen_port,
                remote_addr,
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                closed_reported: AtomicBool::new(false),
                stream: Mutex::new(None),
                events: tx,
            }),
        });
        (transport, rx)
    }

    /// Binds the listener and spawns the listener and dialer threads.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the listen port is taken;
    /// nothing is spawned in that case.
    pub fn start(&self) -> Result<(), TransportError> {
        let listener = bind_listener(self.shared.listen_port)?;
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("kms-listener".to_string())
            .spawn(move || listener_loop(listener, shared))
            .expect("failed to spawn listener thread");

        if let Some(remote) = self.shared.remote_addr {
            let shared = Arc::clone(&self.shared);
            std::thread::Builder::new()
                .name("kms-dialer".to_string())
                .spawn(move || dialer_loop(remote, shared))
                .expect("failed to spawn dialer thread");
        }

        info!(port = self.shared.listen_port, "session transport started");
        Ok(())
    }

    /// Signals shutdown, closes the session socket, and reports `Closed`
    /// (once) so the application layer can settle its state.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(stream) = self.shared.stream.lock().expect("lock poisoned").take() {
            // Unblocks the receiver thread's blocking read.
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared.report_closed();
        info!("session transport stopped");
    }

    /// Encodes and sends one frame with a single whole-buffer write.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when no session is active, or
    /// [`TransportError::Send`] when the write fails – in which case the
    /// session has already been demoted.
    pub fn send_event(&self, event: &Event) -> Result<(), TransportError> {
        let bytes = encode_event(event)?;

        let mut guard = self.shared.stream.lock().expect("lock poisoned");
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;
        match stream.write_all(&bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Demote on the spot: close the socket so the receiver
                // observes EOF and emits the single Closed event.
                if let Some(stream) = guard.take() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
                drop(guard);
                self.shared.connected.store(false, Ordering::SeqCst);
                warn!("send failed, session demoted: {e}");
                Err(TransportError::Send(e))
            }
        }
    }

    /// Whether a session channel is currently promoted.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl crate::application::session::FrameSink for SessionTransport {
    fn send_event(&self, event: &Event) -> Result<(), TransportError> {
        SessionTransport::send_event(self, event)
    }
}

/// Binds the listen socket with address reuse and backlog 1.
fn bind_listener(port: u16) -> Result<TcpListener, TransportError> {
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    let bind = || -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        Ok(listener)
    };
    bind().map_err(|source| TransportError::BindFailed { addr, source })
}

/// Accept loop: promotes the first connection, closes the rest.
fn listener_loop(listener: TcpListener, shared: Arc<TransportShared>) {
    while shared.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if !shared.promote(stream, peer) {
                    // Session already active: accept-and-close is the
                    // protocol's rejection signal.
                    debug!(%peer, "rejecting inbound connection, session already active");
                }
            }
            Err(e) if is_timeout_error(&e) => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!("accept error: {e}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("listener thread exiting");
}

/// Bounded-retry outbound connect.
fn dialer_loop(remote: SocketAddr, shared: Arc<TransportShared>) {
    for attempt in 1..=DIAL_ATTEMPTS {
        if !shared.running.load(Ordering::SeqCst) || shared.connected.load(Ordering::SeqCst) {
            return;
        }
        match TcpStream::connect_timeout(&remote, DIAL_TIMEOUT) {
            Ok(stream) => {
                if shared.promote(stream, remote) {
                    info!(%remote, "outbound connection established");
                }
                return;
            }
            Err(e) => {
                warn!(%remote, attempt, "connect attempt failed: {e}");
                if attempt < DIAL_ATTEMPTS {
                    std::thread::sleep(DIAL_RETRY_DELAY);
                }
            }
        }
    }
    debug!("dialer giving up after {DIAL_ATTEMPTS} attempts");
}

impl TransportShared {
    /// Promotes a freshly established connection to THE session channel.
    ///
    /// Returns `false` (and closes the stream) when a session already
    /// exists – at most one of the racing connections wins.
    fn promote(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> bool {
        let mut guard = self.stream.lock().expect("lock poisoned");
        if self.connected.load(Ordering::SeqCst) {
            drop(guard);
            let _ = stream.shutdown(Shutdown::Both);
            return false;
        }

        // The session socket runs in blocking mode for the receive loop; an
        // accepted socket may have inherited the listener's non-blocking flag.
        if let Err(e) = stream.set_nonblocking(false) {
            error!("failed to switch session socket to blocking mode: {e}");
            return false;
        }

        let read_half = match stream.try_clone() {
            Ok(clone) => clone,
            Err(e) => {
                error!("failed to clone session socket: {e}");
                return false;
            }
        };

        *guard = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        drop(guard);

        info!(%peer, "session established");
        let _ = self.events.send(SessionEvent::Established { peer });

        let shared = Arc::clone(self);
        std::thread::Builder::new()
            .name("kms-receiver".to_string())
            .spawn(move || receive_loop(read_half, shared))
            .expect("failed to spawn receiver thread");
        true
    }

    fn report_closed(&self) {
        if !self.closed_reported.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(SessionEvent::Closed);
        }
    }
}

/// Blocking receive loop for the lifetime of one session.
fn receive_loop(mut stream: TcpStream, shared: Arc<TransportShared>) {
    // Blocking mode with no read timeout; stop() unblocks us by closing the
    // socket.
    let _ = stream.set_read_timeout(None);

    let mut decoder = LineDecoder::new();
    let mut chunk = [0u8; RECV_CHUNK];

    loop {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        match stream.read(&mut chunk) {
            Ok(0) => {
                info!("connection closed by peer");
                break;
            }
            Ok(n) => {
                decoder.extend(&chunk[..n]);
                let mut consumer_gone = false;
                while let Some(result) = decoder.next_frame() {
                    match result {
                        Ok(event) => {
                            if shared.events.send(SessionEvent::Frame(event)).is_err() {
                                consumer_gone = true;
                                break;
                            }
                        }
                        Err(e) => warn!("dropping malformed frame: {e}"),
                    }
                }
                if consumer_gone {
                    // Application layer went away; no point reading further.
                    break;
                }
            }
            Err(e) => {
                // Expected during shutdown, when stop() closes the socket
                // under us.
                if shared.running.load(Ordering::SeqCst) {
                    error!("socket error on session channel: {e}");
                }
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    if let Some(stream) = shared.stream.lock().expect("lock poisoned").take() {
        let _ = stream.shutdown(Shutdown::Both);
    }
    shared.report_closed();
    debug!("receiver thread exiting");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
