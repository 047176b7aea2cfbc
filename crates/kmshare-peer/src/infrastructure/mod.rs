//! Infrastructure layer: everything that touches the OS or the network.
//!
//! - **`input`**   – global capture and event synthesis behind trait seams,
//!   with mock implementations for tests.
//! - **`network`** – the TCP session transport and the UDP discovery service.
//! - **`storage`** – TOML settings persistence and the validated session
//!   snapshot.

pub mod input;
pub mod network;
pub mod storage;
