use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, trace};
use rppal::i2c::I2c;

use crate::error::ServoError;
use crate::pulse::PulseRange;
use crate::router::ChannelAssignment;

/// Something that can hold PWM duty values on numbered channels.
pub trait ServoOutput {
    fn configure(&mut self, frequency_hz: f64) -> Result<(), ServoError>;

    /// `duty` is expressed in the output's configured resolution.
    fn set_channel_duty(&mut self, channel: usize, duty: u32) -> Result<(), ServoError>;

    fn channel_count(&self) -> usize;
}

const PCA9685_CHANNELS: usize = 16;
const PCA9685_OSCILLATOR_HZ: f64 = 25_000_000.0;
const PCA9685_STEPS: u32 = 4096;

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

const MODE1_RESTART: u8 = 0x80;
const MODE1_AI: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

pub const PCA9685_DEFAULT_ADDRESS: u16 = 0x40;

/// PCA9685 16-channel PWM driver on the Pi's I2C bus.
pub struct Pca9685 {
    i2c: I2c,
    input_resolution: u32,
}

impl Pca9685 {
    pub fn new(bus: u8, address: u16, input_resolution: u32) -> Result<Self, ServoError> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;
        info!("PCA9685 initialized on I2C bus {} address {:#04x}", bus, address);
        Ok(Pca9685 {
            i2c,
            input_resolution,
        })
    }

    fn prescale_for(frequency_hz: f64) -> Result<u8, ServoError> {
        if !(frequency_hz > 0.0) {
            return Err(ServoError::InvalidFrequency(frequency_hz));
        }
        let prescale =
            (PCA9685_OSCILLATOR_HZ / (PCA9685_STEPS as f64 * frequency_hz)).round() - 1.0;
        if !(3.0..=255.0).contains(&prescale) {
            return Err(ServoError::InvalidFrequency(frequency_hz));
        }
        Ok(prescale as u8)
    }
}

// Duty in `input_resolution` steps to the chip's 12-bit ON/OFF registers.
// Full scale uses the dedicated full-on bit, zero the full-off bit.
fn pca9685_registers(duty: u32, input_resolution: u32) -> [u8; 4] {
    let top = input_resolution.saturating_sub(1);
    if duty >= top && top > 0 {
        return [0x00, 0x10, 0x00, 0x00];
    }
    let off = (duty as u64 * PCA9685_STEPS as u64 / input_resolution.max(1) as u64) as u16;
    if off == 0 {
        return [0x00, 0x00, 0x00, 0x10];
    }
    [0x00, 0x00, (off & 0xFF) as u8, (off >> 8) as u8]
}

impl ServoOutput for Pca9685 {
    fn configure(&mut self, frequency_hz: f64) -> Result<(), ServoError> {
        let prescale = Self::prescale_for(frequency_hz)?;
        let old_mode = self.i2c.smbus_read_byte(MODE1)?;
        self.i2c
            .smbus_write_byte(MODE1, (old_mode & !MODE1_RESTART) | MODE1_SLEEP)?;
        self.i2c.smbus_write_byte(PRESCALE, prescale)?;
        self.i2c.smbus_write_byte(MODE1, old_mode & !MODE1_SLEEP)?;
        thread::sleep(Duration::from_millis(5));
        self.i2c
            .smbus_write_byte(MODE1, (old_mode & !MODE1_SLEEP) | MODE1_RESTART | MODE1_AI)?;
        info!("PCA9685 frequency set to {} Hz (prescale {})", frequency_hz, prescale);
        Ok(())
    }

    fn set_channel_duty(&mut self, channel: usize, duty: u32) -> Result<(), ServoError> {
        if channel >= PCA9685_CHANNELS {
            return Err(ServoError::InvalidChannel(channel, PCA9685_CHANNELS));
        }
        let registers = pca9685_registers(duty, self.input_resolution);
        self.i2c
            .block_write(LED0_ON_L + 4 * channel as u8, &registers)?;
        Ok(())
    }

    fn channel_count(&self) -> usize {
        PCA9685_CHANNELS
    }
}

/// In-memory output for running without the driver board.
///
/// Clones share state, so a clone kept aside sees every write.
#[derive(Clone)]
pub struct SimulatedServo {
    duties: Arc<Mutex<Vec<Option<u32>>>>,
    frequency_hz: Arc<Mutex<Option<f64>>>,
    writes: Arc<AtomicUsize>,
}

impl SimulatedServo {
    pub fn new(channels: usize) -> Self {
        SimulatedServo {
            duties: Arc::new(Mutex::new(vec![None; channels])),
            frequency_hz: Arc::new(Mutex::new(None)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn duty(&self, channel: usize) -> Option<u32> {
        lock(&self.duties).get(channel).copied().flatten()
    }

    pub fn duties(&self) -> Vec<Option<u32>> {
        lock(&self.duties).clone()
    }

    pub fn frequency_hz(&self) -> Option<f64> {
        *lock(&self.frequency_hz)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedServo {
    fn default() -> Self {
        SimulatedServo::new(PCA9685_CHANNELS)
    }
}

impl ServoOutput for SimulatedServo {
    fn configure(&mut self, frequency_hz: f64) -> Result<(), ServoError> {
        if !(frequency_hz > 0.0) {
            return Err(ServoError::InvalidFrequency(frequency_hz));
        }
        *lock(&self.frequency_hz) = Some(frequency_hz);
        info!("Simulated servo output at {} Hz", frequency_hz);
        Ok(())
    }

    fn set_channel_duty(&mut self, channel: usize, duty: u32) -> Result<(), ServoError> {
        let mut duties = lock(&self.duties);
        let count = duties.len();
        let slot = duties
            .get_mut(channel)
            .ok_or(ServoError::InvalidChannel(channel, count))?;
        *slot = Some(duty);
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("sim channel {} duty {}", channel, duty);
        Ok(())
    }

    fn channel_count(&self) -> usize {
        lock(&self.duties).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle on the single servo output.
///
/// Every session writes through one of these. A whole snapshot's worth of
/// channels is committed while holding the lock once, so two sessions can
/// never interleave their channels.
#[derive(Clone)]
pub struct ServoHandle {
    output: Arc<Mutex<Box<dyn ServoOutput + Send>>>,
    range: PulseRange,
}

impl ServoHandle {
    pub fn new<O>(output: O, range: PulseRange) -> Self
    where
        O: ServoOutput + Send + 'static,
    {
        ServoHandle {
            output: Arc::new(Mutex::new(Box::new(output))),
            range,
        }
    }

    pub fn range(&self) -> PulseRange {
        self.range
    }

    pub fn configure(&self) -> Result<(), ServoError> {
        lock(&self.output).configure(self.range.frequency_hz)
    }

    /// Convert pulses to duties and write them all, or none if a channel
    /// does not exist on the output.
    pub fn apply(&self, assignments: &[ChannelAssignment]) -> Result<(), ServoError> {
        let mut output = lock(&self.output);
        let count = output.channel_count();
        if let Some(bad) = assignments.iter().find(|a| a.channel >= count) {
            return Err(ServoError::InvalidChannel(bad.channel, count));
        }
        for assignment in assignments {
            let duty = self.range.duty_for(assignment.pulse_us);
            trace!(
                "channel {} pulse {:.1}us duty {}",
                assignment.channel, assignment.pulse_us, duty
            );
            output.set_channel_duty(assignment.channel, duty)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(channel: usize, pulse_us: f64) -> ChannelAssignment {
        ChannelAssignment { channel, pulse_us }
    }

    #[test]
    fn prescale_matches_datasheet() {
        assert_eq!(Pca9685::prescale_for(50.0).unwrap(), 121);
        assert_eq!(Pca9685::prescale_for(60.0).unwrap(), 101);
        assert!(Pca9685::prescale_for(0.0).is_err());
        assert!(Pca9685::prescale_for(5000.0).is_err());
        assert!(Pca9685::prescale_for(f64::NAN).is_err());
    }

    #[test]
    fn register_encoding() {
        assert_eq!(pca9685_registers(0, 65536), [0x00, 0x00, 0x00, 0x10]);
        assert_eq!(pca9685_registers(65535, 65536), [0x00, 0x10, 0x00, 0x00]);
        // 5898 / 16 = 368 = 0x170
        assert_eq!(pca9685_registers(5898, 65536), [0x00, 0x00, 0x70, 0x01]);
        assert_eq!(pca9685_registers(2048, 4096), [0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn handle_writes_converted_duties() {
        let sim = SimulatedServo::new(6);
        let handle = ServoHandle::new(sim.clone(), PulseRange::default());
        handle.configure().unwrap();
        assert_eq!(sim.frequency_hz(), Some(60.0));

        handle
            .apply(&[assignment(0, 500.0), assignment(3, 2500.0), assignment(5, 1e9)])
            .unwrap();
        assert_eq!(sim.duty(0), Some(1966));
        assert_eq!(sim.duty(3), Some(9830));
        assert_eq!(sim.duty(5), Some(65535));
        assert_eq!(sim.duty(1), None);
        assert_eq!(sim.write_count(), 3);
    }

    #[test]
    fn unknown_channel_writes_nothing() {
        let sim = SimulatedServo::new(4);
        let handle = ServoHandle::new(sim.clone(), PulseRange::default());
        let err = handle
            .apply(&[assignment(0, 1500.0), assignment(4, 1500.0)])
            .unwrap_err();
        assert!(matches!(err, ServoError::InvalidChannel(4, 4)));
        assert_eq!(sim.write_count(), 0);
    }

    #[test]
    fn simulated_rejects_bad_frequency() {
        let mut sim = SimulatedServo::default();
        assert!(sim.configure(0.0).is_err());
        assert!(sim.configure(-3.0).is_err());
        assert_eq!(sim.frequency_hz(), None);
    }
}
