use std::io;
use thiserror::Error;

/// Per-message and per-connection failures of the control pipeline.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid mapping range: source bounds are both {0}")]
    InvalidRange(f64),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("servo output error: {0}")]
    Servo(#[from] ServoError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ControlError {
    /// Read timeouts surface as one of two kinds depending on platform.
    pub fn is_timeout(&self) -> bool {
        match self {
            ControlError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServoError {
    #[error("I2C bus error: {0}")]
    Bus(#[from] rppal::i2c::Error),

    #[error("channel {0} out of range (driver has {1} channels)")]
    InvalidChannel(usize, usize),

    #[error("unsupported PWM frequency {0} Hz")]
    InvalidFrequency(f64),
}
