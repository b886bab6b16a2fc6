use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::pulse::{PulseRange, map_value};
use crate::snapshot::ControlSnapshot;

pub const CHANNEL_COUNT: usize = 6;

pub const LEFT_STICK_X_CHANNEL: usize = 0;
pub const LEFT_STICK_Y_CHANNEL: usize = 1;
pub const RIGHT_STICK_X_CHANNEL: usize = 2;
pub const RIGHT_STICK_Y_CHANNEL: usize = 3;
pub const CH5_CHANNEL: usize = 4;
pub const CH6_CHANNEL: usize = 5;

/// Input domain of the stick axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickRange {
    pub min: f64,
    pub max: f64,
    /// Refuse snapshots with a stick outside `[min, max]` instead of
    /// extrapolating them.
    pub reject_out_of_range: bool,
}

impl Default for StickRange {
    fn default() -> Self {
        StickRange {
            min: 1000.0,
            max: 2000.0,
            reject_out_of_range: false,
        }
    }
}

impl StickRange {
    fn contains(&self, value: f64) -> bool {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        value >= lo && value <= hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelAssignment {
    pub channel: usize,
    pub pulse_us: f64,
}

/// Fixed layout: sticks on channels 0-3, switches CH5/CH6 on 4 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelRouter {
    pub stick: StickRange,
    pub pulse: PulseRange,
}

impl ChannelRouter {
    pub fn new(stick: StickRange, pulse: PulseRange) -> Self {
        ChannelRouter { stick, pulse }
    }

    /// Translate one snapshot into all six channel assignments, or nothing.
    pub fn route(
        &self,
        snapshot: &ControlSnapshot,
    ) -> Result<[ChannelAssignment; CHANNEL_COUNT], ControlError> {
        let sticks = snapshot.sticks();

        if self.stick.reject_out_of_range {
            if let Some(bad) = sticks.iter().find(|v| !self.stick.contains(**v)) {
                return Err(ControlError::MalformedSnapshot(format!(
                    "stick value {} outside [{}, {}]",
                    bad, self.stick.min, self.stick.max
                )));
            }
        }

        let mut pulses = [0.0; CHANNEL_COUNT];
        for (i, value) in sticks.iter().enumerate() {
            pulses[i] = self.stick_pulse(*value)?;
        }
        pulses[CH5_CHANNEL] = self.switch_pulse(snapshot.ch5_state);
        pulses[CH6_CHANNEL] = self.switch_pulse(snapshot.ch6_state);

        Ok(std::array::from_fn(|channel| ChannelAssignment {
            channel,
            pulse_us: pulses[channel],
        }))
    }

    fn stick_pulse(&self, value: f64) -> Result<f64, ControlError> {
        map_value(
            value,
            self.stick.min,
            self.stick.max,
            self.pulse.min_pulse_us,
            self.pulse.max_pulse_us,
        )
    }

    fn switch_pulse(&self, on: bool) -> f64 {
        if on {
            self.pulse.max_pulse_us
        } else {
            self.pulse.min_pulse_us
        }
    }
}
