//! Native input backends: `rdev` for global capture, `enigo` for synthesis.
//!
//! # Capture
//!
//! `rdev::listen` blocks its thread for the lifetime of the process and has
//! no stop API, so the listener thread is the one piece of process-wide
//! state in the system: it is spawned lazily on the first `start` and then
//! gates event forwarding on whether a channel sender is installed.
//! `start`/`stop` swap that sender, which makes both calls cheap,
//! idempotent, and restartable.
//!
//! Button and wheel events from `rdev` carry no pointer position, so the
//! forwarder tracks the last seen move and stamps it onto those events.
//!
//! # Synthesis
//!
//! `enigo` performs the actual injection.  Every coordinate is clamped to
//! the local screen bounds before it reaches the OS; key names outside the
//! fixed table are dropped with a debug log, never an error.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};

use enigo::{Axis, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use kmshare_core::{KeyId, MouseButton, ScreenGeometry, SpecialKey};
use tracing::{debug, error};

use super::{CaptureError, CapturedEvent, InjectionError, InputInjector, InputSource};

// ── Capture ───────────────────────────────────────────────────────────────────

/// Global input capture backed by `rdev`.
pub struct RdevInputSource {
    shared: Arc<ListenerShared>,
}

struct ListenerShared {
    sender: Mutex<Option<Sender<CapturedEvent>>>,
    last_pos: Mutex<(i32, i32)>,
    listener_spawned: AtomicBool,
    listener_failed: Mutex<Option<String>>,
}

impl RdevInputSource {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ListenerShared {
                sender: Mutex::new(None),
                last_pos: Mutex::new((0, 0)),
                listener_spawned: AtomicBool::new(false),
                listener_failed: Mutex::new(None),
            }),
        }
    }

    /// Spawns the process-wide `rdev` listener thread on first use.
    fn ensure_listener(&self) -> Result<(), CaptureError> {
        if let Some(reason) = self.shared.listener_failed.lock().expect("lock poisoned").clone() {
            return Err(CaptureError::ListenerFailed(reason));
        }
        if self.shared.listener_spawned.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("kms-capture".to_string())
            .spawn(move || {
                let forward = Arc::clone(&shared);
                if let Err(e) = rdev::listen(move |event| forward.forward(event)) {
                    // Surface the failure to the next start() call; the
                    // session keeps running inject-only.
                    let reason = format!("{e:?}");
                    error!("global input listener exited: {reason}");
                    *shared.listener_failed.lock().expect("lock poisoned") = Some(reason);
                }
            })
            .map_err(|e| CaptureError::ListenerFailed(e.to_string()))?;
        Ok(())
    }
}

impl Default for RdevInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for RdevInputSource {
    fn start(&self) -> Result<mpsc::Receiver<CapturedEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel();
        *self.shared.sender.lock().expect("lock poisoned") = Some(tx);
        if let Err(e) = self.ensure_listener() {
            *self.shared.sender.lock().expect("lock poisoned") = None;
            return Err(e);
        }
        Ok(rx)
    }

    fn stop(&self) {
        *self.shared.sender.lock().expect("lock poisoned") = None;
    }
}

impl ListenerShared {
    /// Runs inside the rdev callback; must stay cheap.
    fn forward(&self, event: rdev::Event) {
        let captured = match self.translate(&event) {
            Some(captured) => captured,
            None => return,
        };
        let guard = self.sender.lock().expect("lock poisoned");
        if let Some(sender) = guard.as_ref() {
            // A send error means the consumer went away between stop/start;
            // the next start() installs a fresh channel.
            let _ = sender.send(captured);
        }
    }

    fn translate(&self, event: &rdev::Event) -> Option<CapturedEvent> {
        match event.event_type {
            rdev::EventType::MouseMove { x, y } => {
                let pos = (x as i32, y as i32);
                *self.last_pos.lock().expect("lock poisoned") = pos;
                Some(CapturedEvent::MouseMove { x: pos.0, y: pos.1 })
            }
            rdev::EventType::ButtonPress(button) => self.button_event(button, true),
            rdev::EventType::ButtonRelease(button) => self.button_event(button, false),
            rdev::EventType::Wheel { delta_x, delta_y } => {
                let (x, y) = *self.last_pos.lock().expect("lock poisoned");
                Some(CapturedEvent::MouseScroll {
                    x,
                    y,
                    dx: delta_x as i32,
                    dy: delta_y as i32,
                })
            }
            rdev::EventType::KeyPress(key) => {
                key_id_from_rdev(key, event.name.as_deref())
                    .map(|key| CapturedEvent::Key { key, pressed: true })
            }
            rdev::EventType::KeyRelease(key) => {
                key_id_from_rdev(key, None).map(|key| CapturedEvent::Key { key, pressed: false })
            }
        }
    }

    fn button_event(&self, button: rdev::Button, pressed: bool) -> Option<CapturedEvent> {
        let button = match button {
            rdev::Button::Left => MouseButton::Left,
            rdev::Button::Right => MouseButton::Right,
            rdev::Button::Middle => MouseButton::Middle,
            rdev::Button::Unknown(_) => return None,
        };
        let (x, y) = *self.last_pos.lock().expect("lock poisoned");
        Some(CapturedEvent::MouseButton { x, y, button, pressed })
    }
}

/// Maps an `rdev` key to the wire [`KeyId`].
///
/// A key-press carries the produced text in `name`; a single printable
/// character there wins, since it reflects the active keyboard layout.
/// Otherwise the physical key is looked up in the table below; keys with no
/// table entry are dropped.
fn key_id_from_rdev(key: rdev::Key, name: Option<&str>) -> Option<KeyId> {
    if let Some(text) = name {
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() {
                return Some(KeyId::Char(c));
            }
        }
    }

    use rdev::Key as R;
    let special = match key {
        R::Alt => SpecialKey::Alt,
        R::AltGr => SpecialKey::AltGr,
        R::Backspace => SpecialKey::Backspace,
        R::CapsLock => SpecialKey::CapsLock,
        R::ControlLeft => SpecialKey::Ctrl,
        R::ControlRight => SpecialKey::CtrlR,
        R::Delete => SpecialKey::Delete,
        R::DownArrow => SpecialKey::Down,
        R::End => SpecialKey::End,
        R::Escape => SpecialKey::Esc,
        R::F1 => SpecialKey::F1,
        R::F2 => SpecialKey::F2,
        R::F3 => SpecialKey::F3,
        R::F4 => SpecialKey::F4,
        R::F5 => SpecialKey::F5,
        R::F6 => SpecialKey::F6,
        R::F7 => SpecialKey::F7,
        R::F8 => SpecialKey::F8,
        R::F9 => SpecialKey::F9,
        R::F10 => SpecialKey::F10,
        R::F11 => SpecialKey::F11,
        R::F12 => SpecialKey::F12,
        R::Home => SpecialKey::Home,
        R::Insert => SpecialKey::Insert,
        R::LeftArrow => SpecialKey::Left,
        R::MetaLeft => SpecialKey::Cmd,
        R::MetaRight => SpecialKey::CmdR,
        R::NumLock => SpecialKey::NumLock,
        R::PageDown => SpecialKey::PageDown,
        R::PageUp => SpecialKey::PageUp,
        R::Pause => SpecialKey::Pause,
        R::PrintScreen => SpecialKey::PrintScreen,
        R::Return => SpecialKey::Enter,
        R::RightArrow => SpecialKey::Right,
        R::ScrollLock => SpecialKey::ScrollLock,
        R::ShiftLeft => SpecialKey::Shift,
        R::ShiftRight => SpecialKey::ShiftR,
        R::Space => SpecialKey::Space,
        R::Tab => SpecialKey::Tab,
        R::UpArrow => SpecialKey::Up,
        _ => return None,
    };
    Some(KeyId::Special(special))
}

// ── Synthesis ─────────────────────────────────────────────────────────────────

/// Event synthesis backed by `enigo`, clamped to the local screen.
pub struct EnigoInjector {
    enigo: Mutex<Enigo>,
    bounds: ScreenGeometry,
}

impl EnigoInjector {
    /// Initialises the synthesis backend.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::BackendUnavailable`] when the display
    /// connection cannot be established.
    pub fn new(bounds: ScreenGeometry) -> Result<Self, InjectionError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InjectionError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
            bounds,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Enigo>, InjectionError> {
        self.enigo
            .lock()
            .map_err(|_| InjectionError::Platform("injector lock poisoned".to_string()))
    }
}

impl InputInjector for EnigoInjector {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        let (x, y) = self.bounds.clamp(x, y);
        self.lock()?
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| InjectionError::Platform(e.to_string()))
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<(), InjectionError> {
        let button = match button {
            MouseButton::Left => enigo::Button::Left,
            MouseButton::Right => enigo::Button::Right,
            MouseButton::Middle => enigo::Button::Middle,
        };
        let direction = if pressed { Direction::Press } else { Direction::Release };
        self.lock()?
            .button(button, direction)
            .map_err(|e| InjectionError::Platform(e.to_string()))
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        let mut enigo = self.lock()?;
        if dy != 0 {
            enigo
                .scroll(dy, Axis::Vertical)
                .map_err(|e| InjectionError::Platform(e.to_string()))?;
        }
        if dx != 0 {
            enigo
                .scroll(dx, Axis::Horizontal)
                .map_err(|e| InjectionError::Platform(e.to_string()))?;
        }
        Ok(())
    }

    fn key(&self, key: &KeyId, pressed: bool) -> Result<(), InjectionError> {
        let key = match enigo_key(key) {
            Some(key) => key,
            None => {
                debug!(key = %key, "dropping key with no local mapping");
                return Ok(());
            }
        };
        let direction = if pressed { Direction::Press } else { Direction::Release };
        self.lock()?
            .key(key, direction)
            .map_err(|e| InjectionError::Platform(e.to_string()))
    }
}

/// Maps a wire [`KeyId`] to an `enigo` key.
///
/// Table keys without an `enigo` equivalent on every platform return `None`
/// and are dropped by the caller with a log line.
fn enigo_key(key: &KeyId) -> Option<enigo::Key> {
    use enigo::Key as E;
    let key = match key {
        KeyId::Char(c) => E::Unicode(*c),
        KeyId::Unknown(_) => return None,
        KeyId::Special(special) => match special {
            SpecialKey::Alt | SpecialKey::AltR | SpecialKey::AltGr => E::Alt,
            SpecialKey::Backspace => E::Backspace,
            SpecialKey::CapsLock => E::CapsLock,
            SpecialKey::Cmd | SpecialKey::CmdR => E::Meta,
            SpecialKey::Ctrl | SpecialKey::CtrlR => E::Control,
            SpecialKey::Delete => E::Delete,
            SpecialKey::Down => E::DownArrow,
            SpecialKey::End => E::End,
            SpecialKey::Enter => E::Return,
            SpecialKey::Esc => E::Escape,
            SpecialKey::F1 => E::F1,
            SpecialKey::F2 => E::F2,
            SpecialKey::F3 => E::F3,
            SpecialKey::F4 => E::F4,
            SpecialKey::F5 => E::F5,
            SpecialKey::F6 => E::F6,
            SpecialKey::F7 => E::F7,
            SpecialKey::F8 => E::F8,
            SpecialKey::F9 => E::F9,
            SpecialKey::F10 => E::F10,
            SpecialKey::F11 => E::F11,
            SpecialKey::F12 => E::F12,
            SpecialKey::Home => E::Home,
            SpecialKey::Left => E::LeftArrow,
            SpecialKey::PageDown => E::PageDown,
            SpecialKey::PageUp => E::PageUp,
            SpecialKey::Right => E::RightArrow,
            SpecialKey::Shift | SpecialKey::ShiftR => E::Shift,
            SpecialKey::Space => E::Space,
            SpecialKey::Tab => E::Tab,
            SpecialKey::Up => E::UpArrow,
            // No portable enigo mapping for these.
            SpecialKey::Insert
            | SpecialKey::Menu
            | SpecialKey::NumLock
            | SpecialKey::Pause
            | SpecialKey::PrintScreen
            | SpecialKey::ScrollLock => {
                debug!(key = special.wire_name(), "key has no portable injection mapping");
                return None;
            }
        },
    };
    Some(key)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // The listener and enigo need a display server; only the pure mapping
    // layers are unit-tested here.  The trait seams are covered through the
    // mock implementations.

    #[test]
    fn test_key_id_prefers_printable_name_over_physical_key() {
        let key = key_id_from_rdev(rdev::Key::KeyA, Some("a"));
        assert_eq!(key, Some(KeyId::Char('a')));
    }

    #[test]
    fn test_key_id_falls_back_to_special_table_without_name() {
        let key = key_id_from_rdev(rdev::Key::Return, None);
        assert_eq!(key, Some(KeyId::Special(SpecialKey::Enter)));
    }

    #[test]
    fn test_key_id_ignores_control_character_names() {
        // Enter produces "\r" as its name on some platforms; the table
        // mapping must win over the control character.
        let key = key_id_from_rdev(rdev::Key::Return, Some("\r"));
        assert_eq!(key, Some(KeyId::Special(SpecialKey::Enter)));
    }

    #[test]
    fn test_key_id_drops_unmapped_physical_keys() {
        assert_eq!(key_id_from_rdev(rdev::Key::Function, None), None);
    }

    #[test]
    fn test_enigo_key_maps_printable_characters_to_unicode() {
        assert_eq!(enigo_key(&KeyId::Char('x')), Some(enigo::Key::Unicode('x')));
    }

    #[test]
    fn test_enigo_key_merges_left_and_right_modifiers() {
        assert_eq!(enigo_key(&KeyId::Special(SpecialKey::Shift)), Some(enigo::Key::Shift));
        assert_eq!(enigo_key(&KeyId::Special(SpecialKey::ShiftR)), Some(enigo::Key::Shift));
    }

    #[test]
    fn test_enigo_key_drops_unknown_and_unmapped_keys() {
        assert_eq!(enigo_key(&KeyId::Unknown("Key.zzz".to_string())), None);
        assert_eq!(enigo_key(&KeyId::Special(SpecialKey::Pause)), None);
    }
}
