//! Mock input source and recording injector for tests.
//!
//! [`MockInputSource`] lets tests inject synthetic [`CapturedEvent`]s as if
//! they came from hardware, without OS hooks.  [`RecordingInjector`] records
//! every synthesis call so tests can assert on what would have reached the
//! display, and can be switched into a failing mode to exercise the
//! drop-and-continue error path.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    mpsc::{self, Sender},
    Mutex,
};

use kmshare_core::{KeyId, MouseButton};

use super::{CaptureError, CapturedEvent, InjectionError, InputInjector, InputSource};

/// A mock implementation of [`InputSource`] that allows tests to inject events.
#[derive(Default)]
pub struct MockInputSource {
    sender: Mutex<Option<Sender<CapturedEvent>>>,
    start_count: AtomicU32,
    fail_start: AtomicBool,
}

impl MockInputSource {
    /// Creates a new mock input source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `start` call fail, simulating a capture
    /// backend without permissions.
    pub fn fail_on_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::Relaxed);
    }

    /// Injects a synthetic event, as if captured from hardware.
    ///
    /// Panics if the source is not currently started.
    pub fn inject_event(&self, event: CapturedEvent) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(event)
                .expect("receiver dropped; did the consumer exit?"),
            None => panic!("MockInputSource::inject_event called while stopped"),
        }
    }

    /// Returns `true` while the source has an active channel.
    pub fn is_capturing(&self) -> bool {
        self.sender.lock().expect("lock poisoned").is_some()
    }

    /// Number of successful `start` calls so far.
    pub fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::Relaxed)
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<mpsc::Receiver<CapturedEvent>, CaptureError> {
        if self.fail_start.load(Ordering::Relaxed) {
            return Err(CaptureError::ListenerFailed("injected failure".to_string()));
        }
        let (tx, rx) = mpsc::channel();
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        self.start_count.fetch_add(1, Ordering::Relaxed);
        Ok(rx)
    }

    fn stop(&self) {
        // Drop the sender to close the channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

/// A call-recording implementation of [`InputInjector`].
#[derive(Default)]
pub struct RecordingInjector {
    pub moves: Mutex<Vec<(i32, i32)>>,
    pub buttons: Mutex<Vec<(MouseButton, bool)>>,
    pub scrolls: Mutex<Vec<(i32, i32)>>,
    pub keys: Mutex<Vec<(KeyId, bool)>>,
    fail: AtomicBool,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail, simulating a broken display link.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), InjectionError> {
        if self.fail.load(Ordering::Relaxed) {
            Err(InjectionError::Platform("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl InputInjector for RecordingInjector {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        self.check()?;
        self.moves.lock().expect("lock poisoned").push((x, y));
        Ok(())
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<(), InjectionError> {
        self.check()?;
        self.buttons.lock().expect("lock poisoned").push((button, pressed));
        Ok(())
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        self.check()?;
        self.scrolls.lock().expect("lock poisoned").push((dx, dy));
        Ok(())
    }

    fn key(&self, key: &KeyId, pressed: bool) -> Result<(), InjectionError> {
        self.check()?;
        self.keys.lock().expect("lock poisoned").push((key.clone(), pressed));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_delivers_injected_events() {
        let source = MockInputSource::new();
        let rx = source.start().expect("start");

        source.inject_event(CapturedEvent::MouseMove { x: 100, y: 200 });

        assert_eq!(rx.recv().expect("event"), CapturedEvent::MouseMove { x: 100, y: 200 });
    }

    #[test]
    fn test_mock_source_stop_closes_channel() {
        let source = MockInputSource::new();
        let rx = source.start().expect("start");

        source.stop();

        assert!(rx.recv().is_err(), "channel must disconnect after stop()");
        assert!(!source.is_capturing());
    }

    #[test]
    fn test_mock_source_restart_after_stop_works() {
        let source = MockInputSource::new();
        let _rx1 = source.start().expect("first start");
        source.stop();

        let rx2 = source.start().expect("restart");
        source.inject_event(CapturedEvent::Key { key: KeyId::Char('a'), pressed: true });

        assert!(rx2.recv().is_ok());
        assert_eq!(source.start_count(), 2);
    }

    #[test]
    fn test_mock_source_fail_on_start_returns_error() {
        let source = MockInputSource::new();
        source.fail_on_start(true);

        assert!(matches!(source.start(), Err(CaptureError::ListenerFailed(_))));
        assert!(!source.is_capturing());
    }

    #[test]
    fn test_recording_injector_records_all_call_kinds() {
        let injector = RecordingInjector::new();

        injector.move_to(10, 20).expect("move");
        injector.button(MouseButton::Left, true).expect("button");
        injector.scroll(0, -1).expect("scroll");
        injector.key(&KeyId::Char('z'), false).expect("key");

        assert_eq!(*injector.moves.lock().unwrap(), vec![(10, 20)]);
        assert_eq!(*injector.buttons.lock().unwrap(), vec![(MouseButton::Left, true)]);
        assert_eq!(*injector.scrolls.lock().unwrap(), vec![(0, -1)]);
        assert_eq!(*injector.keys.lock().unwrap(), vec![(KeyId::Char('z'), false)]);
    }

    #[test]
    fn test_recording_injector_fail_mode_returns_platform_error() {
        let injector = RecordingInjector::new();
        injector.fail_all(true);

        assert!(matches!(injector.move_to(1, 1), Err(InjectionError::Platform(_))));
        assert!(injector.moves.lock().unwrap().is_empty());
    }
}
