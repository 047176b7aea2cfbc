//! Typed wire events for the session channel.
//!
//! Every frame on the TCP session is one of these events, serialised as a
//! single-line JSON object with a `type` discriminator:
//!
//! ```text
//! {"type":"mouse_move","x":INT,"y":INT}
//! {"type":"mouse_button","x":INT,"y":INT,"button":STR,"pressed":BOOL}
//! {"type":"mouse_scroll","x":INT,"y":INT,"dx":INT,"dy":INT}
//! {"type":"keyboard","key":STR,"pressed":BOOL}
//! {"type":"control_transfer","give_control":BOOL,"cursor_x":INT,"cursor_y":INT}
//! ```
//!
//! `button` is one of the fixed strings `"Button.left"`, `"Button.right"`,
//! `"Button.middle"`.  `key` is either a single printable character or a
//! `"Key.<name>"` string from the table in [`crate::keymap`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::keymap::{KeyId, SpecialKey};

/// A single event on the session channel.
///
/// `control_transfer` is the control-plane message multiplexed onto the same
/// stream as the input events; everything else is input data.  Coordinates
/// are absolute screen positions in the *sender's* coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The pointer moved to an absolute position.
    MouseMove { x: i32, y: i32 },
    /// A pointer button changed state at the given position.
    MouseButton {
        x: i32,
        y: i32,
        button: MouseButton,
        pressed: bool,
    },
    /// The wheel scrolled by `(dx, dy)` steps at the given position.
    MouseScroll { x: i32, y: i32, dx: i32, dy: i32 },
    /// A key changed state.
    Keyboard { key: KeyId, pressed: bool },
    /// Control-token handover.  `cursor_x`/`cursor_y` are where the receiver
    /// should place its cursor, already remapped into the receiver's space.
    ControlTransfer {
        give_control: bool,
        cursor_x: i32,
        cursor_y: i32,
    },
}

/// The three pointer buttons carried on the wire.
///
/// The wire strings are fixed; anything else fails to decode and the frame
/// is dropped by the codec (the stream itself stays usable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    #[serde(rename = "Button.left")]
    Left,
    #[serde(rename = "Button.right")]
    Right,
    #[serde(rename = "Button.middle")]
    Middle,
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MouseButton::Left => "Button.left",
            MouseButton::Right => "Button.right",
            MouseButton::Middle => "Button.middle",
        };
        f.write_str(name)
    }
}

// ── KeyId wire form ───────────────────────────────────────────────────────────
//
// `KeyId` lives in the keymap module; its wire form is defined here with the
// rest of the frame schema.  A printable key is its character, a special key
// is `Key.<name>`, and anything we do not recognise round-trips verbatim as
// `KeyId::Unknown` so a newer peer cannot poison the stream.

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(KeyId::from_wire(&raw))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Char(c) => write!(f, "{c}"),
            KeyId::Special(key) => write!(f, "Key.{}", key.wire_name()),
            KeyId::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl KeyId {
    /// Parses the wire form of a key name.
    ///
    /// A one-character string is a printable key; `"Key.<name>"` is looked up
    /// in the special-key table; everything else is preserved as
    /// [`KeyId::Unknown`] and dropped at the injection boundary.
    pub fn from_wire(raw: &str) -> KeyId {
        let mut chars = raw.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return KeyId::Char(c);
        }
        if let Some(name) = raw.strip_prefix("Key.") {
            if let Some(key) = SpecialKey::from_wire(name) {
                return KeyId::Special(key);
            }
        }
        KeyId::Unknown(raw.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
