//! One connected remote, from first byte to disconnect.

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::ControlError;
use crate::router::ChannelRouter;
use crate::servo::ServoHandle;
use crate::snapshot::ControlSnapshot;
use crate::transport::MessageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingData,
    Decoding,
    Dispatching,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub connected_at: DateTime<Local>,
    pub last_applied: Option<DateTime<Local>>,
    pub applied: u64,
    pub dropped: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        SessionStats {
            connected_at: Local::now(),
            last_applied: None,
            applied: 0,
            dropped: 0,
        }
    }
}

pub struct ControlSession<M> {
    source: M,
    peer: String,
    router: ChannelRouter,
    servo: ServoHandle,
    state: SessionState,
    stats: SessionStats,
}

impl<M: MessageSource> ControlSession<M> {
    pub fn new(
        source: M,
        peer: impl Into<String>,
        router: ChannelRouter,
        servo: ServoHandle,
    ) -> Self {
        ControlSession {
            source,
            peer: peer.into(),
            router,
            servo,
            state: SessionState::AwaitingData,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Serve the peer until it disconnects, the link fails or goes quiet
    /// past the read timeout.
    pub fn run(&mut self) -> SessionStats {
        info!("Session {} opened", self.peer);

        while self.state != SessionState::Closed {
            match self.step() {
                Ok(()) => {}
                Err(ControlError::ConnectionClosed) => {
                    info!("Client {} disconnected", self.peer);
                }
                Err(e) if e.is_timeout() => {
                    warn!("Client {} stalled, closing session", self.peer);
                }
                Err(e) => {
                    warn!("Session {} read error: {}", self.peer, e);
                }
            }
        }

        info!(
            "Session {} closed: {} applied, {} dropped, connected since {}",
            self.peer,
            self.stats.applied,
            self.stats.dropped,
            self.stats.connected_at.format("%H:%M:%S")
        );
        self.stats.clone()
    }

    /// One read and everything it completed. An error here always leaves
    /// the session `Closed`; bad messages are counted and skipped instead.
    pub fn step(&mut self) -> Result<(), ControlError> {
        self.state = SessionState::AwaitingData;
        let messages = match self.source.receive() {
            Ok(messages) => messages,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        for message in messages {
            match self.dispatch(message) {
                Ok(()) => {
                    self.stats.applied += 1;
                    self.stats.last_applied = Some(Local::now());
                }
                Err(e) => {
                    self.stats.dropped += 1;
                    match e {
                        ControlError::DecodeFailure(_) | ControlError::MalformedSnapshot(_) => {
                            warn!("Invalid message from {}: {}", self.peer, e)
                        }
                        _ => warn!("Could not apply message from {}: {}", self.peer, e),
                    }
                }
            }
        }

        self.state = SessionState::AwaitingData;
        Ok(())
    }

    fn dispatch(&mut self, message: Result<Value, ControlError>) -> Result<(), ControlError> {
        self.state = SessionState::Decoding;
        let snapshot = ControlSnapshot::from_value(message?)?;

        self.state = SessionState::Dispatching;
        let assignments = self.router.route(&snapshot)?;
        debug!("{} -> {:?}", self.peer, snapshot);
        self.servo.apply(&assignments)?;
        Ok(())
    }
}
