//! Value mapping and pulse-width to duty conversion.
//!
//! Everything here is pure arithmetic. The only clamp in the pipeline lives
//! in [`pulse_to_duty`]: whatever pulse width comes out of the mapping stage,
//! the duty handed to the driver stays inside `[0, resolution - 1]`.

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

pub const SERVO_MIN_US: f64 = 500.0;
pub const SERVO_MAX_US: f64 = 2500.0;
pub const PWM_FREQUENCY_HZ: f64 = 60.0;
pub const DUTY_RESOLUTION: u32 = 65536;

/// Output pulse domain shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseRange {
    pub min_pulse_us: f64,
    pub max_pulse_us: f64,
    pub frequency_hz: f64,
    pub resolution: u32,
}

impl Default for PulseRange {
    fn default() -> Self {
        PulseRange {
            min_pulse_us: SERVO_MIN_US,
            max_pulse_us: SERVO_MAX_US,
            frequency_hz: PWM_FREQUENCY_HZ,
            resolution: DUTY_RESOLUTION,
        }
    }
}

impl PulseRange {
    pub fn period_us(&self) -> f64 {
        1_000_000.0 / self.frequency_hz
    }

    pub fn duty_for(&self, pulse_us: f64) -> u32 {
        pulse_to_duty(pulse_us, self.period_us(), self.resolution)
    }

    pub fn pulse_for(&self, duty: u32) -> f64 {
        duty_to_pulse(duty, self.period_us(), self.resolution)
    }

    /// Width of one duty step, in microseconds.
    pub fn quantum_us(&self) -> f64 {
        self.period_us() / self.resolution as f64
    }
}

/// Affine interpolation of `value` from `[from_min, from_max]` onto
/// `[to_min, to_max]`. Values outside the source range extrapolate.
pub fn map_value(
    value: f64,
    from_min: f64,
    from_max: f64,
    to_min: f64,
    to_max: f64,
) -> Result<f64, ControlError> {
    if from_max == from_min {
        return Err(ControlError::InvalidRange(from_min));
    }
    Ok((value - from_min) * (to_max - to_min) / (from_max - from_min) + to_min)
}

pub fn pulse_to_duty(pulse_us: f64, period_us: f64, resolution: u32) -> u32 {
    let top = resolution.saturating_sub(1);
    let duty = (pulse_us / period_us * resolution as f64).round();
    if duty.is_nan() {
        return 0;
    }
    duty.clamp(0.0, top as f64) as u32
}

pub fn duty_to_pulse(duty: u32, period_us: f64, resolution: u32) -> f64 {
    duty as f64 / resolution as f64 * period_us
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_value_hits_endpoints_and_midpoint() {
        assert_eq!(map_value(1000.0, 1000.0, 2000.0, 500.0, 2500.0).unwrap(), 500.0);
        assert_eq!(map_value(2000.0, 1000.0, 2000.0, 500.0, 2500.0).unwrap(), 2500.0);
        assert_eq!(map_value(1500.0, 1000.0, 2000.0, 500.0, 2500.0).unwrap(), 1500.0);
    }

    #[test]
    fn map_value_handles_inverted_target() {
        assert_eq!(map_value(0.0, 0.0, 10.0, 100.0, -100.0).unwrap(), 100.0);
        assert_eq!(map_value(10.0, 0.0, 10.0, 100.0, -100.0).unwrap(), -100.0);
        assert_eq!(map_value(5.0, 0.0, 10.0, 100.0, -100.0).unwrap(), 0.0);
    }

    #[test]
    fn map_value_extrapolates_outside_source() {
        let v = map_value(2500.0, 1000.0, 2000.0, 500.0, 2500.0).unwrap();
        assert_eq!(v, 3500.0);
        let v = map_value(0.0, 1000.0, 2000.0, 500.0, 2500.0).unwrap();
        assert_eq!(v, -1500.0);
    }

    #[test]
    fn degenerate_source_range_is_rejected() {
        let err = map_value(1500.0, 1000.0, 1000.0, 500.0, 2500.0).unwrap_err();
        assert!(matches!(err, ControlError::InvalidRange(r) if r == 1000.0));
    }

    #[test]
    fn duty_is_clamped_for_wild_pulses() {
        let range = PulseRange::default();
        assert_eq!(range.duty_for(-1.0e9), 0);
        assert_eq!(range.duty_for(1.0e9), 65535);
        assert_eq!(range.duty_for(f64::INFINITY), 65535);
        assert_eq!(range.duty_for(f64::NEG_INFINITY), 0);
        assert_eq!(range.duty_for(f64::NAN), 0);
    }

    #[test]
    fn duty_is_monotonic() {
        let range = PulseRange::default();
        let mut last = 0;
        let mut pulse = -5000.0;
        while pulse < 25000.0 {
            let duty = range.duty_for(pulse);
            assert!(duty >= last, "duty went down at {pulse}");
            assert!(duty < range.resolution);
            last = duty;
            pulse += 37.5;
        }
    }

    #[test]
    fn duty_matches_known_values() {
        let range = PulseRange::default();
        // 1500us of a 16666.67us period at 16 bits
        assert_eq!(range.duty_for(1500.0), 5898);
        assert_eq!(range.duty_for(500.0), 1966);
        assert_eq!(range.duty_for(2500.0), 9830);
    }

    #[test]
    fn pulse_recovered_within_one_step() {
        let range = PulseRange::default();
        let mut pulse = range.min_pulse_us;
        while pulse <= range.max_pulse_us {
            let back = range.pulse_for(range.duty_for(pulse));
            assert!((back - pulse).abs() <= range.quantum_us(), "{pulse} -> {back}");
            pulse += 13.7;
        }
    }

    #[test]
    fn zero_resolution_never_underflows() {
        assert_eq!(pulse_to_duty(1500.0, 20_000.0, 0), 0);
    }
}
