//! LAN discovery beacon format.
//!
//! A beacon is a single UDP datagram carrying a JSON object:
//!
//! ```text
//! { "magic": "KM_SHARE_DISCOVERY", "name": S, "os": S,
//!   "screen_width": N, "screen_height": N }
//! ```
//!
//! The magic string identifies valid beacons; datagrams without it are
//! silently ignored by the listener.  The screen dimensions let a front-end
//! pre-fill the remote geometry from a discovered peer without any extra
//! round trip.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::DecodeError;

/// Magic string identifying KM-Share discovery datagrams.
pub const DISCOVERY_MAGIC: &str = "KM_SHARE_DISCOVERY";

/// Default UDP port for presence beacons.
pub const DEFAULT_DISCOVERY_PORT: u16 = 12346;

/// One presence announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub magic: String,
    /// Human-readable host name.
    pub name: String,
    /// Operating system identifier (e.g. `"linux"`).
    pub os: String,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Beacon {
    /// Creates a beacon with the magic string filled in.
    pub fn new(name: impl Into<String>, os: impl Into<String>, screen_width: u32, screen_height: u32) -> Self {
        Self {
            magic: DISCOVERY_MAGIC.to_string(),
            name: name.into(),
            os: os.into(),
            screen_width,
            screen_height,
        }
    }

    /// Returns `true` if the magic string matches.
    pub fn is_valid(&self) -> bool {
        self.magic == DISCOVERY_MAGIC
    }

    /// Serialises the beacon into datagram bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedFrame`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a received datagram.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedFrame`] when the datagram is not a
    /// beacon-shaped JSON object.  Callers must still check
    /// [`Beacon::is_valid`]: a well-formed object with the wrong magic is
    /// not an error, just somebody else's traffic.
    pub fn from_bytes(bytes: &[u8]) -> Result<Beacon, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
