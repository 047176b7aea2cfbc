//! Wire protocol: event frames, the line codec, and the discovery beacon.
//!
//! The session channel carries UTF-8 JSON objects, one per line.  The
//! discovery channel carries a single JSON datagram per beacon.  Both
//! formats are fixed; see the individual modules for the schemas.

pub mod beacon;
pub mod codec;
pub mod events;
