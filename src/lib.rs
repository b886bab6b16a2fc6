//! Remote-control snapshots in, servo pulses out.
//!
//! A remote sends JSON snapshots of its sticks and switches; each one is
//! routed onto six servo channels and written to a PCA9685 driver board.

pub mod config;
pub mod error;
pub mod framing;
pub mod pulse;
pub mod router;
pub mod server;
pub mod servo;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use config::Config;
pub use error::{ControlError, ServoError};
pub use router::{ChannelAssignment, ChannelRouter};
pub use server::ControlServer;
pub use servo::{Pca9685, ServoHandle, ServoOutput, SimulatedServo};
pub use session::ControlSession;
pub use snapshot::ControlSnapshot;
