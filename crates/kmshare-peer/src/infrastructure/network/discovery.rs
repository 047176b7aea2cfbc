//! UDP broadcast-based peer discovery.
//!
//! Two independent activities share one service:
//!
//! - **Listener** – binds `0.0.0.0:<port>` with address reuse (several
//!   KM-Share processes on one machine may share the discovery port) and
//!   receives beacon datagrams with a 1 s poll so `stop` is responsive.
//!   Valid beacons update the peer table; the first beacon from a new IP
//!   additionally invokes every registered callback exactly once.  Beacons
//!   whose source IP belongs to a local interface are our own broadcasts
//!   reflected back and are silently ignored.
//!
//! - **Announcer** – broadcasts this host's beacon at 1 Hz while enabled.
//!   Sends are best-effort: a failure is logged and the announcer keeps
//!   going, since a transient `ENETUNREACH` while an interface flaps is
//!   routine.
//!
//! Peer table entries expire 30 s after their last beacon; expiry is applied
//! on access by [`DiscoveryService::get_peers`].
//!
//! Discovery is deliberately independent of the session: it starts before
//! any session exists and keeps running across session teardown, so a
//! front-end can always offer fresh peers.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

use kmshare_core::Beacon;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::is_timeout_error;

/// Beacons older than this are pruned from the peer table.
const PEER_TTL: Duration = Duration::from_secs(30);

/// Interval between presence broadcasts.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Poll granularity for the listener socket.
const LISTEN_POLL: Duration = Duration::from_secs(1);

/// Error type for discovery operations.
///
/// Only socket setup can fail; everything at runtime is logged and retried.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The broadcast socket could not be created.
    #[error("failed to set up broadcast socket: {0}")]
    BroadcastSetup(std::io::Error),
}

/// A peer known from its beacons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub os: String,
    pub screen_width: u32,
    pub screen_height: u32,
    /// When the most recent beacon arrived.
    pub last_seen: Instant,
}

/// Callback invoked once per newly discovered peer IP.
pub type PeerCallback = Arc<dyn Fn(IpAddr, &PeerInfo) + Send + Sync>;

/// The discovery service.
pub struct DiscoveryService {
    shared: Arc<DiscoveryShared>,
}

struct DiscoveryShared {
    port: u16,
    running: AtomicBool,
    announcing: AtomicBool,
    peers: Mutex<HashMap<IpAddr, PeerInfo>>,
    callbacks: Mutex<Vec<PeerCallback>>,
    local_ips: Vec<IpAddr>,
}

impl DiscoveryService {
    /// Creates a service for the given UDP port.
    pub fn new(port: u16) -> Self {
        Self::with_local_ips(port, local_interface_ips())
    }

    /// Creates a service with an explicit local-address list.
    ///
    /// The production constructor enumerates interfaces; tests inject lists
    /// to exercise the self-beacon filter deterministically.
    pub fn with_local_ips(port: u16, local_ips: Vec<IpAddr>) -> Self {
        Self {
            shared: Arc::new(DiscoveryShared {
                port,
                running: AtomicBool::new(false),
                announcing: AtomicBool::new(false),
                peers: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(Vec::new()),
                local_ips,
            }),
        }
    }

    /// Registers a callback fired once for each newly discovered peer IP.
    pub fn add_callback(&self, callback: PeerCallback) {
        self.shared.callbacks.lock().expect("lock poisoned").push(callback);
    }

    /// Binds the listener socket and spawns the receive thread.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] if the socket cannot be bound.
    pub fn start_listening(&self) -> Result<(), DiscoveryError> {
        let socket = bind_reusable(self.shared.port)?;
        socket
            .set_read_timeout(Some(LISTEN_POLL))
            .map_err(|source| DiscoveryError::BindFailed {
                addr: SocketAddr::from(([0, 0, 0, 0], self.shared.port)),
                source,
            })?;

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("kms-discovery".to_string())
            .spawn(move || listen_loop(socket, shared))
            .expect("failed to spawn discovery thread");

        info!(port = self.shared.port, "discovery listener started");
        Ok(())
    }

    /// Starts broadcasting `beacon` at 1 Hz.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BroadcastSetup`] if the send socket cannot
    /// be created.  Runtime send failures are logged, never fatal.
    pub fn start_announcing(&self, beacon: Beacon) -> Result<(), DiscoveryError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(DiscoveryError::BroadcastSetup)?;
        socket
            .set_broadcast(true)
            .map_err(DiscoveryError::BroadcastSetup)?;

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.announcing.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("kms-announcer".to_string())
            .spawn(move || announce_loop(socket, beacon, shared))
            .expect("failed to spawn announcer thread");

        info!(port = self.shared.port, "presence announcer started");
        Ok(())
    }

    /// Stops the announcer without stopping the listener.
    pub fn stop_announcing(&self) {
        self.shared.announcing.store(false, Ordering::SeqCst);
    }

    /// Stops all discovery threads.  They observe the flag within one poll
    /// cycle.
    pub fn stop(&self) {
        self.shared.announcing.store(false, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);
        info!("discovery stopped");
    }

    /// Returns the current peer table, pruning expired entries first.
    pub fn get_peers(&self) -> HashMap<IpAddr, PeerInfo> {
        let mut peers = self.shared.peers.lock().expect("lock poisoned");
        prune_expired(&mut peers, Instant::now());
        peers.clone()
    }
}

/// Binds a UDP socket with `SO_REUSEADDR` on all interfaces.
fn bind_reusable(port: u16) -> Result<UdpSocket, DiscoveryError> {
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    let bind = || -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        Ok(socket.into())
    };
    bind().map_err(|source| DiscoveryError::BindFailed { addr, source })
}

/// The beacon receive loop executed on the discovery thread.
fn listen_loop(socket: UdpSocket, shared: Arc<DiscoveryShared>) {
    let mut buf = [0u8; 2048];

    while shared.running.load(Ordering::SeqCst) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("discovery recv error: {e}");
                continue;
            }
        };

        let beacon = match Beacon::from_bytes(&buf[..len]) {
            Ok(beacon) => beacon,
            Err(e) => {
                debug!(%src, "ignoring non-beacon datagram: {e}");
                continue;
            }
        };
        if !beacon.is_valid() {
            debug!(%src, "ignoring datagram with foreign magic");
            continue;
        }

        let src_ip = src.ip();
        if shared.local_ips.contains(&src_ip) {
            // Our own broadcast reflected back by the network.
            continue;
        }

        handle_beacon(&shared, src_ip, beacon, Instant::now());
    }

    debug!("discovery listener exiting");
}

/// Updates the peer table and fires callbacks for first-time IPs.
fn handle_beacon(shared: &DiscoveryShared, src_ip: IpAddr, beacon: Beacon, now: Instant) {
    let info = PeerInfo {
        name: beacon.name,
        os: beacon.os,
        screen_width: beacon.screen_width,
        screen_height: beacon.screen_height,
        last_seen: now,
    };

    let is_new = {
        let mut peers = shared.peers.lock().expect("lock poisoned");
        peers.insert(src_ip, info.clone()).is_none()
    };

    if is_new {
        info!(%src_ip, name = %info.name, "discovered peer");
        // Snapshot the callbacks so the list lock is not held during
        // arbitrary user code.
        let callbacks: Vec<PeerCallback> =
            shared.callbacks.lock().expect("lock poisoned").clone();
        for callback in callbacks {
            callback(src_ip, &info);
        }
    }
}

/// Removes entries whose last beacon is older than [`PEER_TTL`].
fn prune_expired(peers: &mut HashMap<IpAddr, PeerInfo>, now: Instant) {
    peers.retain(|_, info| now.duration_since(info.last_seen) <= PEER_TTL);
}

/// The 1 Hz broadcast loop executed on the announcer thread.
fn announce_loop(socket: UdpSocket, beacon: Beacon, shared: Arc<DiscoveryShared>) {
    let dest = SocketAddr::from((Ipv4Addr::BROADCAST, shared.port));
    let payload = match beacon.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to encode presence beacon: {e}");
            return;
        }
    };

    while shared.running.load(Ordering::SeqCst) && shared.announcing.load(Ordering::SeqCst) {
        if let Err(e) = socket.send_to(&payload, dest) {
            warn!("beacon send failed: {e}");
        }
        std::thread::sleep(ANNOUNCE_INTERVAL);
    }

    debug!("announcer exiting");
}

/// Best-effort enumeration of this host's interface addresses.
///
/// Loopback plus the default-route address obtained by "connecting" a UDP
/// socket outward (no packet is sent).  Good enough to recognise our own
/// reflected broadcasts on single-homed hosts, which is what the filter is
/// for.
fn local_interface_ips() -> Vec<IpAddr> {
    let mut ips: Vec<IpAddr> = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];

    if let Ok(socket) = UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(addr) = socket.local_addr() {
                if !ips.contains(&addr.ip()) {
                    ips.push(addr.ip());
                }
            }
        }
    }

    ips
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn make_shared(local_ips: Vec<IpAddr>) -> Arc<DiscoveryShared> {
        Arc::new(DiscoveryShared {
            port: 0,
            running: AtomicBool::new(false),
            announcing: AtomicBool::new(false),
            peers: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            local_ips,
        })
    }

    fn beacon(name: &str) -> Beacon {
        Beacon::new(name, "linux", 1920, 1080)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    // ── Peer table ────────────────────────────────────────────────────────────

    #[test]
    fn test_first_beacon_inserts_peer_and_fires_callback_once() {
        let shared = make_shared(vec![]);
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = Arc::clone(&fired);
        shared.callbacks.lock().unwrap().push(Arc::new(move |_, _| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let now = Instant::now();
        handle_beacon(&shared, ip("10.0.0.5"), beacon("atlas"), now);
        handle_beacon(&shared, ip("10.0.0.5"), beacon("atlas"), now + Duration::from_secs(1));

        assert_eq!(fired.load(Ordering::SeqCst), 1, "callback fires only for the first beacon");
        assert_eq!(shared.peers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_repeat_beacon_refreshes_last_seen() {
        let shared = make_shared(vec![]);
        let t0 = Instant::now();
        handle_beacon(&shared, ip("10.0.0.5"), beacon("atlas"), t0);
        let t1 = t0 + Duration::from_secs(10);
        handle_beacon(&shared, ip("10.0.0.5"), beacon("atlas"), t1);

        let peers = shared.peers.lock().unwrap();
        assert_eq!(peers[&ip("10.0.0.5")].last_seen, t1);
    }

    #[test]
    fn test_beacon_updates_peer_details() {
        let shared = make_shared(vec![]);
        let now = Instant::now();
        handle_beacon(&shared, ip("10.0.0.5"), beacon("atlas"), now);
        handle_beacon(
            &shared,
            ip("10.0.0.5"),
            Beacon::new("atlas-renamed", "windows", 2560, 1440),
            now,
        );

        let peers = shared.peers.lock().unwrap();
        let info = &peers[&ip("10.0.0.5")];
        assert_eq!(info.name, "atlas-renamed");
        assert_eq!(info.os, "windows");
        assert_eq!((info.screen_width, info.screen_height), (2560, 1440));
    }

    // ── Expiry ────────────────────────────────────────────────────────────────

    #[test]
    fn test_peer_present_just_before_ttl_absent_just_after() {
        let mut peers = HashMap::new();
        let t0 = Instant::now();
        peers.insert(
            ip("10.0.0.5"),
            PeerInfo {
                name: "atlas".to_string(),
                os: "linux".to_string(),
                screen_width: 1920,
                screen_height: 1080,
                last_seen: t0,
            },
        );

        let mut at_29 = peers.clone();
        prune_expired(&mut at_29, t0 + Duration::from_secs(29));
        assert!(at_29.contains_key(&ip("10.0.0.5")), "peer must survive at t=29s");

        let mut at_31 = peers.clone();
        prune_expired(&mut at_31, t0 + Duration::from_secs(31));
        assert!(!at_31.contains_key(&ip("10.0.0.5")), "peer must expire at t=31s");
    }

    #[test]
    fn test_prune_keeps_fresh_peers_while_dropping_stale_ones() {
        let now = Instant::now() + Duration::from_secs(60);
        let mut peers = HashMap::new();
        for (addr, age_secs) in [("10.0.0.1", 5), ("10.0.0.2", 40), ("10.0.0.3", 29)] {
            peers.insert(
                ip(addr),
                PeerInfo {
                    name: addr.to_string(),
                    os: "linux".to_string(),
                    screen_width: 1,
                    screen_height: 1,
                    last_seen: now - Duration::from_secs(age_secs),
                },
            );
        }

        prune_expired(&mut peers, now);

        assert!(peers.contains_key(&ip("10.0.0.1")));
        assert!(!peers.contains_key(&ip("10.0.0.2")), "40s-old peer must expire");
        assert!(peers.contains_key(&ip("10.0.0.3")));
    }

    // ── Live socket path ──────────────────────────────────────────────────────

    fn free_udp_port() -> u16 {
        let probe = UdpSocket::bind("127.0.0.1:0").expect("probe bind");
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        port
    }

    #[test]
    fn test_listener_surfaces_beacon_from_foreign_ip() {
        // Empty local-IP list so the loopback source is not filtered.
        let port = free_udp_port();
        let service = DiscoveryService::with_local_ips(port, vec![]);
        service.start_listening().expect("listen");

        let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
        let payload = beacon("atlas").to_bytes().expect("encode");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut found = false;
        while Instant::now() < deadline {
            sender.send_to(&payload, ("127.0.0.1", port)).expect("send");
            std::thread::sleep(Duration::from_millis(50));
            if service.get_peers().values().any(|p| p.name == "atlas") {
                found = true;
                break;
            }
        }
        service.stop();
        assert!(found, "beacon must appear in the peer table");
    }

    #[test]
    fn test_listener_ignores_self_beacons() {
        // Loopback listed as local: the same datagram must now be filtered.
        let port = free_udp_port();
        let service =
            DiscoveryService::with_local_ips(port, vec![ip("127.0.0.1")]);
        service.start_listening().expect("listen");

        let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
        let payload = beacon("atlas").to_bytes().expect("encode");
        for _ in 0..5 {
            sender.send_to(&payload, ("127.0.0.1", port)).expect("send");
            std::thread::sleep(Duration::from_millis(50));
        }

        assert!(service.get_peers().is_empty(), "self-beacons must never surface");
        service.stop();
    }

    #[test]
    fn test_listener_ignores_foreign_magic_and_garbage() {
        let port = free_udp_port();
        let service = DiscoveryService::with_local_ips(port, vec![]);
        service.start_listening().expect("listen");

        let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
        let foreign = br#"{"magic":"SOMETHING_ELSE","name":"x","os":"y","screen_width":1,"screen_height":1}"#;
        for payload in [&foreign[..], b"garbage"] {
            sender.send_to(payload, ("127.0.0.1", port)).expect("send");
        }
        std::thread::sleep(Duration::from_millis(300));

        assert!(service.get_peers().is_empty());
        service.stop();
    }

    #[test]
    fn test_local_interface_ips_always_contains_loopback() {
        let ips = local_interface_ips();
        assert!(ips.contains(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_bind_reusable_reports_bind_failure_with_address() {
        // Port 1 needs elevated privileges almost everywhere; when it does
        // fail, the error must carry the attempted address.
        if let Err(DiscoveryError::BindFailed { addr, .. }) = bind_reusable(1) {
            assert_eq!(addr.port(), 1);
        }
    }
}
