//! Application layer: the session engine and the peer orchestrator.
//!
//! Use cases here orchestrate domain logic through trait seams and contain
//! no socket, OS, or file-system calls of their own:
//!
//! - **`session`** – the control-token state machine.  Decides, for every
//!   captured and every received event, whether to forward, synthesize,
//!   hand over control, or drop.  This is the code path that runs on every
//!   keystroke and pointer movement.
//! - **`peer`**    – lifecycle orchestration: wires the transport, the
//!   session engine, and the capture pump together, and owns start/stop.

pub mod peer;
pub mod session;
