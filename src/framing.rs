//! Message recovery for the raw TCP transport.
//!
//! Remotes write bare JSON objects back to back, sometimes newline separated,
//! sometimes not. TCP gives no guarantee that one `read` returns exactly one
//! of them, so bytes are accumulated here and complete top-level JSON values
//! are cut out as they become available.

use serde_json::{Deserializer, Value};

use crate::error::ControlError;

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

pub struct JsonFramer {
    buffer: Vec<u8>,
    max_message_size: usize,
}

impl JsonFramer {
    pub fn new(max_message_size: usize) -> Self {
        JsonFramer {
            buffer: Vec::with_capacity(max_message_size),
            max_message_size,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed as a message.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete message, if any.
    ///
    /// `None` means more bytes are needed. `Some(Err(DecodeFailure))` is
    /// returned once per stretch of garbage; the framer then skips to the
    /// next `{` or newline and carries on. A message cut short is only seen
    /// as garbage once the bytes after it contradict it.
    pub fn next_message(&mut self) -> Option<Result<Value, ControlError>> {
        let start = self
            .buffer
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buffer.len());
        self.buffer.drain(..start);
        if self.buffer.is_empty() {
            return None;
        }

        let (next, consumed) = {
            let mut stream = Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            let next = stream.next();
            (next, stream.byte_offset())
        };
        match next {
            Some(Ok(value)) => {
                self.buffer.drain(..consumed);
                Some(Ok(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buffer.len() > self.max_message_size {
                    let dropped = self.buffer.len();
                    self.buffer.clear();
                    return Some(Err(ControlError::DecodeFailure(format!(
                        "message exceeds {} bytes ({} pending)",
                        self.max_message_size, dropped
                    ))));
                }
                None
            }
            Some(Err(e)) => {
                self.resync();
                Some(Err(ControlError::DecodeFailure(e.to_string())))
            }
            None => {
                self.buffer.clear();
                None
            }
        }
    }

    // Skip to whichever comes first: the next `{` (kept, it may open the
    // following message) or the end of the current line.
    fn resync(&mut self) {
        let restart = self
            .buffer
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(i, b)| match b {
                b'{' => Some(i),
                b'\n' => Some(i + 1),
                _ => None,
            })
            .unwrap_or(self.buffer.len());
        self.buffer.drain(..restart);
    }
}

impl Default for JsonFramer {
    fn default() -> Self {
        JsonFramer::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}
