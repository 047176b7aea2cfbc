//! # kmshare-core
//!
//! Shared library for KM-Share containing the wire protocol, the discovery
//! beacon format, the special-key name table, and the screen-handover domain
//! logic.
//!
//! This crate is used by the peer application on both sides of a session.
//! It has zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! KM-Share shares a single keyboard and mouse between two computers: move
//! the cursor off a configured edge of one screen and control transfers to
//! the other machine, where the captured events are replayed.  Unlike a
//! classic master/client KVM, the two peers are symmetric – either side can
//! hold the control token and either side can hand it over.
//!
//! This crate (`kmshare-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Events are encoded
//!   as one JSON object per line; the incremental decoder reassembles frames
//!   from arbitrary TCP chunk boundaries.  The UDP discovery beacon format
//!   lives here too.
//!
//! - **`domain`** – Pure business logic with no OS dependencies: screen
//!   geometry, the relative layout of the two screens, and the handover
//!   policy (edge detection, re-trigger cooldown, coordinate remapping).
//!
//! - **`keymap`** – The fixed table of special-key names used on the wire
//!   (`"Key.space"`, `"Key.shift"`, …) and the [`KeyId`] type that carries
//!   either a printable character or one of those names.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `kmshare_core::Event` instead of `kmshare_core::protocol::events::Event`.
pub use domain::geometry::{GeometryError, Layout, ScreenGeometry, ScreenPosition};
pub use domain::handover::{
    edge_reached, local_to_remote, remote_to_local, HandoverPolicy, EDGE_THRESHOLD, SAFE_INSET,
    TRANSFER_COOLDOWN,
};
pub use keymap::{KeyId, SpecialKey};
pub use protocol::beacon::{Beacon, DEFAULT_DISCOVERY_PORT, DISCOVERY_MAGIC};
pub use protocol::codec::{encode_event, DecodeError, LineDecoder};
pub use protocol::events::{Event, MouseButton};
