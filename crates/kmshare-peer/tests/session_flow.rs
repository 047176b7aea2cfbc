//! End-to-end session tests: two live peers over loopback TCP.
//!
//! # Purpose
//!
//! These tests wire two complete `Peer` instances together the way two real
//! hosts would – one listening, one dialing – with mock input backends
//! substituted for the OS hooks.  They verify the full chain:
//!
//! ```text
//! mock capture ─▶ engine A ─▶ codec ─▶ TCP ─▶ codec ─▶ engine B ─▶ mock injector
//! ```
//!
//! covering the symmetric initial-ownership race, the edge-triggered
//! handover in both directions, and motion synthesis on the passive side.
//!
//! Everything here polls with generous deadlines instead of fixed sleeps:
//! the handover path deliberately contains a 100 ms cursor-settle delay, and
//! CI machines are slow.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kmshare_core::{Layout, ScreenGeometry, ScreenPosition};
use kmshare_peer::application::peer::Peer;
use kmshare_peer::application::session::{PeerEventSink, SessionSettings};
use kmshare_peer::infrastructure::input::mock::{MockInputSource, RecordingInjector};
use kmshare_peer::infrastructure::input::{CapturedEvent, InputInjector, InputSource};

#[derive(Default)]
struct RecordingEvents {
    connection: Mutex<Vec<bool>>,
    control: Mutex<Vec<bool>>,
}

impl PeerEventSink for RecordingEvents {
    fn connection_changed(&self, connected: bool) {
        self.connection.lock().unwrap().push(connected);
    }

    fn control_changed(&self, has_control: bool) {
        self.control.lock().unwrap().push(has_control);
    }
}

/// One side of the test topology: a peer plus handles to its test doubles.
struct TestHost {
    peer: Peer,
    source: Arc<MockInputSource>,
    injector: Arc<RecordingInjector>,
    events: Arc<RecordingEvents>,
}

fn free_port() -> u16 {
    let probe = TcpListener::bind("127.0.0.1:0").expect("probe bind");
    let port = probe.local_addr().unwrap().port();
    drop(probe);
    port
}

fn make_host(listen_port: u16, remote_port: Option<u16>, position: ScreenPosition) -> TestHost {
    let settings = SessionSettings {
        local_geometry: ScreenGeometry::new(1920, 1080).unwrap(),
        remote_geometry: ScreenGeometry::new(1920, 1080).unwrap(),
        layout: Layout::new(position),
        edge_detection: true,
        hide_cursor: true,
        listen_port,
        remote_addr: remote_port.map(|p| format!("127.0.0.1:{p}").parse().unwrap()),
    };
    let source = Arc::new(MockInputSource::new());
    let injector = Arc::new(RecordingInjector::new());
    let events = Arc::new(RecordingEvents::default());
    let peer = Peer::new(
        settings,
        Arc::clone(&source) as Arc<dyn InputSource>,
        Arc::clone(&injector) as Arc<dyn InputInjector>,
        Arc::clone(&events) as Arc<dyn PeerEventSink>,
    );
    TestHost { peer, source, injector, events }
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Brings up a connected listener/dialer pair with mirror-image layouts:
/// the remote screen sits to the right of host A, so A sits to the left of
/// host B.
fn connected_pair() -> (TestHost, TestHost) {
    let port_a = free_port();
    let port_b = free_port();

    let a = make_host(port_a, None, ScreenPosition::Right);
    a.peer.start().expect("start a");
    let b = make_host(port_b, Some(port_a), ScreenPosition::Left);
    b.peer.start().expect("start b");

    assert!(
        wait_until(Duration::from_secs(10), || {
            a.peer.is_connected() && b.peer.is_connected()
        }),
        "the dial must establish a session on both sides"
    );
    (a, b)
}

#[test]
fn test_session_establishment_makes_both_sides_owner() {
    let (a, b) = connected_pair();

    // The deliberate symmetric race: both sides hold the token until an
    // edge crossing settles it.
    assert!(wait_until(Duration::from_secs(5), || a.peer.has_control()));
    assert!(wait_until(Duration::from_secs(5), || b.peer.has_control()));
    assert!(wait_until(Duration::from_secs(5), || {
        a.source.is_capturing() && b.source.is_capturing()
    }));
    assert_eq!(*a.events.connection.lock().unwrap(), vec![true]);
    assert_eq!(*b.events.connection.lock().unwrap(), vec![true]);

    a.peer.stop();
    b.peer.stop();
}

#[test]
fn test_edge_crossing_hands_control_to_the_peer() {
    let (a, b) = connected_pair();
    assert!(wait_until(Duration::from_secs(5), || a.source.is_capturing()));

    // Host A's user pushes into the right-hand trigger band.
    a.source.inject_event(CapturedEvent::MouseMove { x: 1910, y: 500 });

    // A goes passive and stops capturing; B parks the cursor at the safe
    // inset on its left edge.
    assert!(wait_until(Duration::from_secs(5), || !a.peer.has_control()));
    assert!(wait_until(Duration::from_secs(5), || !a.source.is_capturing()));
    assert!(wait_until(Duration::from_secs(5), || {
        b.injector.moves.lock().unwrap().contains(&(150, 500))
    }));
    assert!(wait_until(Duration::from_secs(5), || b.peer.has_control()));
    assert!(
        a.events.control.lock().unwrap().ends_with(&[false]),
        "host A must report losing control"
    );

    a.peer.stop();
    b.peer.stop();
}

#[test]
fn test_motion_flows_to_the_passive_side_after_handover() {
    let (a, b) = connected_pair();
    assert!(wait_until(Duration::from_secs(5), || a.source.is_capturing()));

    a.source.inject_event(CapturedEvent::MouseMove { x: 1910, y: 500 });
    assert!(wait_until(Duration::from_secs(5), || !a.peer.has_control()));

    // B now drives; its motion is synthesized on A (identical geometry, so
    // scaling is the identity).
    b.source.inject_event(CapturedEvent::MouseMove { x: 400, y: 300 });
    b.source.inject_event(CapturedEvent::MouseMove { x: 401, y: 300 });

    assert!(wait_until(Duration::from_secs(5), || {
        let moves = a.injector.moves.lock().unwrap();
        moves.contains(&(400, 300)) && moves.contains(&(401, 300))
    }));

    // The owner never synthesizes the passive side's stale events.
    assert!(b.injector.buttons.lock().unwrap().is_empty());

    a.peer.stop();
    b.peer.stop();
}

#[test]
fn test_control_returns_when_the_peer_crosses_back() {
    let (a, b) = connected_pair();
    assert!(wait_until(Duration::from_secs(5), || a.source.is_capturing()));

    // A → B.
    a.source.inject_event(CapturedEvent::MouseMove { x: 1910, y: 500 });
    assert!(wait_until(Duration::from_secs(5), || b.peer.has_control() && !a.peer.has_control()));
    assert!(wait_until(Duration::from_secs(5), || b.source.is_capturing()));

    // B → A: host B's user pushes through its left edge (mirror layout),
    // which parks A's cursor at the inset inside A's right edge.
    b.source.inject_event(CapturedEvent::MouseMove { x: 10, y: 300 });

    assert!(wait_until(Duration::from_secs(5), || a.peer.has_control()));
    assert!(wait_until(Duration::from_secs(5), || !b.peer.has_control()));
    assert!(wait_until(Duration::from_secs(5), || {
        a.injector.moves.lock().unwrap().contains(&(1920 - 150, 300))
    }));
    assert!(
        wait_until(Duration::from_secs(5), || a.source.is_capturing()),
        "capture must restart on the side that regained control"
    );

    a.peer.stop();
    b.peer.stop();
}

#[test]
fn test_buttons_scrolls_and_keys_reach_the_passive_side() {
    use kmshare_core::{KeyId, MouseButton, SpecialKey};

    let (a, b) = connected_pair();
    assert!(wait_until(Duration::from_secs(5), || a.source.is_capturing()));

    a.source.inject_event(CapturedEvent::MouseMove { x: 1910, y: 500 });
    assert!(wait_until(Duration::from_secs(5), || !a.peer.has_control()));

    b.source.inject_event(CapturedEvent::MouseButton {
        x: 600,
        y: 400,
        button: MouseButton::Left,
        pressed: true,
    });
    b.source.inject_event(CapturedEvent::MouseScroll { x: 600, y: 400, dx: 0, dy: -3 });
    b.source.inject_event(CapturedEvent::Key {
        key: KeyId::Special(SpecialKey::Enter),
        pressed: true,
    });
    b.source.inject_event(CapturedEvent::Key {
        key: KeyId::Char('k'),
        pressed: true,
    });

    assert!(wait_until(Duration::from_secs(5), || {
        a.injector.buttons.lock().unwrap().len() == 1
            && a.injector.scrolls.lock().unwrap().len() == 1
            && a.injector.keys.lock().unwrap().len() == 2
    }));
    assert_eq!(*a.injector.buttons.lock().unwrap(), vec![(MouseButton::Left, true)]);
    assert_eq!(*a.injector.scrolls.lock().unwrap(), vec![(0, -3)]);
    assert_eq!(
        *a.injector.keys.lock().unwrap(),
        vec![
            (KeyId::Special(SpecialKey::Enter), true),
            (KeyId::Char('k'), true),
        ]
    );

    a.peer.stop();
    b.peer.stop();
}

#[test]
fn test_peer_shutdown_is_observed_by_the_other_side() {
    let (a, b) = connected_pair();

    b.peer.stop();

    assert!(
        wait_until(Duration::from_secs(5), || !a.peer.is_connected()),
        "host A must observe the torn-down session"
    );
    assert!(wait_until(Duration::from_secs(5), || {
        a.events.connection.lock().unwrap().ends_with(&[false])
    }));

    a.peer.stop();
}
