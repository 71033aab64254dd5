//! Incremental framer — rebuilds complete frames from an arbitrarily
//! chunked byte stream.
//!
//! One `Framer` per connection. The transport hands it bytes in stream
//! order; the framer buffers until the current frame's termination rule is
//! satisfied, then decodes and resets. Termination is opcode-dependent and
//! lives in exactly one place ([`Framer::is_complete`]).

use crate::wire::{Frame, Opcode, WireError, MAX_DATA_PAYLOAD};

/// Per-connection frame reassembly state.
///
/// A framer that has returned an error must not be fed again: an unknown
/// opcode or malformed frame means the byte stream has lost sync and the
/// connection is torn down rather than resynchronized.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one byte; returns a frame when one closes.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>, WireError> {
        self.buf.push(byte);

        if self.buf.len() < 2 {
            return Ok(None);
        }

        let opcode = match Opcode::try_from(u16::from_be_bytes([self.buf[0], self.buf[1]])) {
            Ok(opcode) => opcode,
            Err(e) => {
                self.buf.clear();
                return Err(e);
            }
        };

        if self.is_complete(opcode)? {
            let frame = Frame::decode(&self.buf);
            self.buf.clear();
            return frame.map(Some);
        }

        Ok(None)
    }

    /// Termination predicate for the frame currently in the buffer.
    ///
    /// The buffer holds at least the 2 opcode bytes when this is called.
    fn is_complete(&mut self, opcode: Opcode) -> Result<bool, WireError> {
        let len = self.buf.len();
        let complete = match opcode {
            // Zero-terminated argument after the opcode.
            Opcode::Logrq | Opcode::Rrq | Opcode::Wrq | Opcode::Delrq => {
                len > 2 && self.buf[len - 1] == 0
            }

            // Fixed-length frames.
            Opcode::Dirq | Opcode::Disc => true,
            Opcode::Ack => len == 4,

            // 6-byte header, then exactly the declared payload. A 0-length
            // payload is legitimate (it is the end-of-transfer sentinel).
            Opcode::Data => {
                if len < 4 {
                    false
                } else {
                    let declared = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
                    if declared > MAX_DATA_PAYLOAD {
                        self.buf.clear();
                        return Err(WireError::PayloadTooLarge(declared));
                    }
                    len == 6 + declared
                }
            }

            // Zero-terminated trailing text; the leading fixed bytes
            // (error code, added flag) may themselves be zero, so the
            // terminator is only looked for past them.
            Opcode::Error => len >= 5 && self.buf[len - 1] == 0,
            Opcode::Bcast => len >= 4 && self.buf[len - 1] == 0,
        };
        Ok(complete)
    }
}
