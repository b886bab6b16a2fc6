use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::framing::DEFAULT_MAX_MESSAGE_SIZE;
use crate::pulse::PulseRange;
use crate::router::StickRange;
use crate::servo::PCA9685_DEFAULT_ADDRESS;
use crate::transport::DEFAULT_READ_BUFFER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    WebSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Pca9685,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub kind: OutputKind,
    pub i2c_bus: u8,
    pub address: u16,
    /// Channel count of the simulated output.
    pub channels: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            kind: OutputKind::Pca9685,
            i2c_bus: 1,
            address: PCA9685_DEFAULT_ADDRESS,
            channels: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub read_buffer_size: usize,
    pub max_message_size: usize,
    pub read_timeout_ms: Option<u64>,
    /// Stop accepting after this many sessions; `Some(1)` serves a single remote.
    pub max_sessions: Option<usize>,
    pub pulse: PulseRange,
    pub stick: StickRange,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::from("0.0.0.0"),
            port: 65535,
            transport: Transport::Tcp,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout_ms: None,
            max_sessions: None,
            pulse: PulseRange::default(),
            stick: StickRange::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that would make every message fail or the output
    /// misbehave, before anything binds or touches hardware.
    pub fn validate(&self) -> io::Result<()> {
        let invalid = |msg: String| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::InvalidInput, msg))
        };

        if !(self.pulse.frequency_hz > 0.0) {
            return invalid(format!(
                "pulse.frequency_hz must be positive, got {}",
                self.pulse.frequency_hz
            ));
        }
        if self.pulse.resolution < 2 {
            return invalid(format!(
                "pulse.resolution must be at least 2, got {}",
                self.pulse.resolution
            ));
        }
        if self.pulse.min_pulse_us > self.pulse.max_pulse_us {
            return invalid(format!(
                "pulse.min_pulse_us {} above pulse.max_pulse_us {}",
                self.pulse.min_pulse_us, self.pulse.max_pulse_us
            ));
        }
        if self.stick.min == self.stick.max {
            return invalid(format!("stick.min and stick.max are both {}", self.stick.min));
        }
        if self.read_buffer_size == 0 || self.max_message_size == 0 {
            return invalid(String::from("buffer sizes must be non-zero"));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load `path`, or write the defaults there when it does not exist yet.
    pub fn load_or_create(path: &Path) -> io::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Config::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }
}
