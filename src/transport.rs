use std::io::{self, Read, Write};

use serde_json::Value;
use tungstenite::{Message, WebSocket};

use crate::error::ControlError;
use crate::framing::JsonFramer;

pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Where a session gets its messages from.
pub trait MessageSource {
    /// Block until at least one read completes and return every message it
    /// completed, possibly none. `Err(ConnectionClosed)` means the peer is gone.
    fn receive(&mut self) -> Result<Vec<Result<Value, ControlError>>, ControlError>;
}

/// Raw byte stream carrying JSON objects back to back.
pub struct StreamSource<R> {
    reader: R,
    framer: JsonFramer,
    buffer: Vec<u8>,
}

impl<R: Read> StreamSource<R> {
    pub fn new(reader: R, read_buffer_size: usize, max_message_size: usize) -> Self {
        StreamSource {
            reader,
            framer: JsonFramer::new(max_message_size),
            buffer: vec![0; read_buffer_size.max(1)],
        }
    }
}

impl<R: Read> MessageSource for StreamSource<R> {
    fn receive(&mut self) -> Result<Vec<Result<Value, ControlError>>, ControlError> {
        let n = match self.reader.read(&mut self.buffer) {
            Ok(0) => return Err(ControlError::ConnectionClosed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(ControlError::Io(e)),
        };
        self.framer.push(&self.buffer[..n]);
        Ok(std::iter::from_fn(|| self.framer.next_message()).collect())
    }
}

/// WebSocket link; each text or binary frame is one message.
pub struct WebSocketSource<S> {
    socket: WebSocket<S>,
}

impl<S: Read + Write> WebSocketSource<S> {
    pub fn new(socket: WebSocket<S>) -> Self {
        WebSocketSource { socket }
    }
}

impl<S: Read + Write> MessageSource for WebSocketSource<S> {
    fn receive(&mut self) -> Result<Vec<Result<Value, ControlError>>, ControlError> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(vec![decode_frame(text.as_bytes())]),
            Ok(Message::Binary(bytes)) => Ok(vec![decode_frame(&bytes)]),
            Ok(Message::Close(_)) => {
                // push out the queued close reply
                let _ = self.socket.flush();
                Err(ControlError::ConnectionClosed)
            }
            Ok(_) => Ok(Vec::new()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Err(ControlError::ConnectionClosed)
            }
            Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(ControlError::ConnectionClosed)
            }
            Err(tungstenite::Error::Io(e)) => Err(ControlError::Io(e)),
            Err(e) => Err(ControlError::WebSocket(e)),
        }
    }
}

fn decode_frame(bytes: &[u8]) -> Result<Value, ControlError> {
    serde_json::from_slice(bytes).map_err(|e| ControlError::DecodeFailure(e.to_string()))
}
