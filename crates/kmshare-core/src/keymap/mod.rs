//! The fixed special-key name table shared by both peers.
//!
//! Key events carry either a single printable character or a symbolic name
//! of the form `Key.<name>`.  Both hosts must agree on the name table or
//! special keys silently stop working across the link, so the table below is
//! fixed and versioned with the protocol.  Unrecognised names are preserved
//! as [`KeyId::Unknown`] and dropped at the injection boundary – never an
//! error, so a peer with a newer table cannot break an older one.

/// A key identifier as carried on the wire.
///
/// The wire form is defined alongside the frame schema in
/// [`crate::protocol::events`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// A printable character key (`"a"`, `"/"`, `"ü"`).
    Char(char),
    /// A named special key from the fixed table (`"Key.space"`).
    Special(SpecialKey),
    /// A name this build does not recognise; round-trips verbatim.
    Unknown(String),
}

/// The fixed table of named special keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    Alt,
    AltGr,
    AltR,
    Backspace,
    CapsLock,
    Cmd,
    CmdR,
    Ctrl,
    CtrlR,
    Delete,
    Down,
    End,
    Enter,
    Esc,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Home,
    Insert,
    Left,
    Menu,
    NumLock,
    PageDown,
    PageUp,
    Pause,
    PrintScreen,
    Right,
    ScrollLock,
    Shift,
    ShiftR,
    Space,
    Tab,
    Up,
}

impl SpecialKey {
    /// The `<name>` part of the `Key.<name>` wire form.
    pub fn wire_name(&self) -> &'static str {
        match self {
            SpecialKey::Alt => "alt",
            SpecialKey::AltGr => "alt_gr",
            SpecialKey::AltR => "alt_r",
            SpecialKey::Backspace => "backspace",
            SpecialKey::CapsLock => "caps_lock",
            SpecialKey::Cmd => "cmd",
            SpecialKey::CmdR => "cmd_r",
            SpecialKey::Ctrl => "ctrl",
            SpecialKey::CtrlR => "ctrl_r",
            SpecialKey::Delete => "delete",
            SpecialKey::Down => "down",
            SpecialKey::End => "end",
            SpecialKey::Enter => "enter",
            SpecialKey::Esc => "esc",
            SpecialKey::F1 => "f1",
            SpecialKey::F2 => "f2",
            SpecialKey::F3 => "f3",
            SpecialKey::F4 => "f4",
            SpecialKey::F5 => "f5",
            SpecialKey::F6 => "f6",
            SpecialKey::F7 => "f7",
            SpecialKey::F8 => "f8",
            SpecialKey::F9 => "f9",
            SpecialKey::F10 => "f10",
            SpecialKey::F11 => "f11",
            SpecialKey::F12 => "f12",
            SpecialKey::Home => "home",
            SpecialKey::Insert => "insert",
            SpecialKey::Left => "left",
            SpecialKey::Menu => "menu",
            SpecialKey::NumLock => "num_lock",
            SpecialKey::PageDown => "page_down",
            SpecialKey::PageUp => "page_up",
            SpecialKey::Pause => "pause",
            SpecialKey::PrintScreen => "print_screen",
            SpecialKey::Right => "right",
            SpecialKey::ScrollLock => "scroll_lock",
            SpecialKey::Shift => "shift",
            SpecialKey::ShiftR => "shift_r",
            SpecialKey::Space => "space",
            SpecialKey::Tab => "tab",
            SpecialKey::Up => "up",
        }
    }

    /// Looks up a `<name>` from the wire.  Returns `None` for names outside
    /// the table.
    pub fn from_wire(name: &str) -> Option<SpecialKey> {
        let key = match name {
            "alt" => SpecialKey::Alt,
            "alt_gr" => SpecialKey::AltGr,
            "alt_r" => SpecialKey::AltR,
            "backspace" => SpecialKey::Backspace,
            "caps_lock" => SpecialKey::CapsLock,
            "cmd" => SpecialKey::Cmd,
            "cmd_r" => SpecialKey::CmdR,
            "ctrl" => SpecialKey::Ctrl,
            "ctrl_r" => SpecialKey::CtrlR,
            "delete" => SpecialKey::Delete,
            "down" => SpecialKey::Down,
            "end" => SpecialKey::End,
            "enter" => SpecialKey::Enter,
            "esc" => SpecialKey::Esc,
            "f1" => SpecialKey::F1,
            "f2" => SpecialKey::F2,
            "f3" => SpecialKey::F3,
            "f4" => SpecialKey::F4,
            "f5" => SpecialKey::F5,
            "f6" => SpecialKey::F6,
            "f7" => SpecialKey::F7,
            "f8" => SpecialKey::F8,
            "f9" => SpecialKey::F9,
            "f10" => SpecialKey::F10,
            "f11" => SpecialKey::F11,
            "f12" => SpecialKey::F12,
            "home" => SpecialKey::Home,
            "insert" => SpecialKey::Insert,
            "left" => SpecialKey::Left,
            "menu" => SpecialKey::Menu,
            "num_lock" => SpecialKey::NumLock,
            "page_down" => SpecialKey::PageDown,
            "page_up" => SpecialKey::PageUp,
            "pause" => SpecialKey::Pause,
            "print_screen" => SpecialKey::PrintScreen,
            "right" => SpecialKey::Right,
            "scroll_lock" => SpecialKey::ScrollLock,
            "shift" => SpecialKey::Shift,
            "shift_r" => SpecialKey::ShiftR,
            "space" => SpecialKey::Space,
            "tab" => SpecialKey::Tab,
            "up" => SpecialKey::Up,
            _ => return None,
        };
        Some(key)
    }

    /// Every key in the table, for exhaustive round-trip checks.
    pub const ALL: [SpecialKey; 42] = [
        SpecialKey::Alt,
        SpecialKey::AltGr,
        SpecialKey::AltR,
        SpecialKey::Backspace,
        SpecialKey::CapsLock,
        SpecialKey::Cmd,
        SpecialKey::CmdR,
        SpecialKey::Ctrl,
        SpecialKey::CtrlR,
        SpecialKey::Delete,
        SpecialKey::Down,
        SpecialKey::End,
        SpecialKey::Enter,
        SpecialKey::Esc,
        SpecialKey::F1,
        SpecialKey::F2,
        SpecialKey::F3,
        SpecialKey::F4,
        SpecialKey::F5,
        SpecialKey::F6,
        SpecialKey::F7,
        SpecialKey::F8,
        SpecialKey::F9,
        SpecialKey::F10,
        SpecialKey::F11,
        SpecialKey::F12,
        SpecialKey::Home,
        SpecialKey::Insert,
        SpecialKey::Left,
        SpecialKey::Menu,
        SpecialKey::NumLock,
        SpecialKey::PageDown,
        SpecialKey::PageUp,
        SpecialKey::Pause,
        SpecialKey::PrintScreen,
        SpecialKey::Right,
        SpecialKey::ScrollLock,
        SpecialKey::Shift,
        SpecialKey::ShiftR,
        SpecialKey::Space,
        SpecialKey::Tab,
        SpecialKey::Up,
    ];
}

// ── Tests ─────────────────────────────────────────────────────────────────────
