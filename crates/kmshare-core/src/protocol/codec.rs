//! Newline-framed JSON codec for session events.
//!
//! Wire format: one UTF-8 JSON object per event, terminated by a single
//! `\n`.  JSON string escaping guarantees that no field can contain a raw
//! newline, so the terminator is unambiguous.
//!
//! # Incremental decoding
//!
//! TCP is a byte stream: a single `recv` may return half a frame, three
//! frames, or a frame and a half.  [`LineDecoder`] owns the reassembly
//! buffer – feed it whatever the socket produced with [`LineDecoder::extend`]
//! and drain complete frames with [`LineDecoder::next_frame`].  Partial
//! trailing bytes are retained across calls.
//!
//! A malformed frame (bad JSON, unknown `type`, unknown button name) yields
//! a [`DecodeError`] for that frame only; the decoder stays usable and the
//! next frame decodes normally.

use thiserror::Error;

use crate::protocol::events::Event;

/// Error produced when a single frame cannot be encoded or decoded.
///
/// Decode errors are local to one frame: the caller logs and drops the
/// frame, and the stream continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not a valid JSON event object.
    #[error("malformed event frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}

/// Encodes an event as a JSON line terminated by exactly one `\n`.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedFrame`] if serialization fails (which
/// cannot happen for the derived event types, but the send path still
/// propagates rather than panics).
pub fn encode_event(event: &Event) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = serde_json::to_vec(event)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Incremental line-frame decoder.
///
/// Owns the partial-frame buffer that survives between socket reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends raw bytes from the socket to the reassembly buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts the next complete frame, if one is buffered.
    ///
    /// Returns `None` when no full line is available yet.  Empty lines are
    /// skipped.  A complete but malformed line is consumed and returned as
    /// `Some(Err(_))` so the caller can log it; subsequent frames are
    /// unaffected.
    pub fn next_frame(&mut self) -> Option<Result<Event, DecodeError>> {
        loop {
            let newline = self.buffer.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=newline).take(newline).collect();
            if line.is_empty() {
                continue;
            }
            return Some(serde_json::from_slice(&line).map_err(DecodeError::from));
        }
    }

    /// Number of buffered bytes not yet consumed as a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
