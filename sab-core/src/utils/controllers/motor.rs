//! ESC motor driver.
//!
//! Throttle commands are percentages mapped linearly onto the throttle pulse
//! range. The ESC must be armed once at startup before it accepts them.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;

use super::{delay_for, pwm::PulseWidthOutput, ActuatorError};
use crate::utils::math::pulse::PulseRange;

/// Electronic speed controller on a pulse-width channel.
pub struct Motor<C> {
    channel: C,
    throttle: PulseRange,
    arm_us: u16,
    settle: Duration,
    armed: bool,
    last_pulse_us: Option<u16>,
}

impl<C: PulseWidthOutput> Motor<C> {
    /// Wrap an attached channel. Nothing is written until [`Motor::arm`].
    pub fn new(
        channel: C,
        throttle: PulseRange,
        arm_us: u16,
        settle: Duration,
    ) -> Self {
        Self {
            channel,
            throttle,
            arm_us,
            settle,
            armed: false,
            last_pulse_us: None,
        }
    }

    /// Send the arm pulse, wait for the ESC to settle, then command zero
    /// throttle.
    ///
    /// Blocks for the whole settle time. Call once at startup.
    pub fn arm<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), ActuatorError> {
        tracing::info!(
            arm_us = self.arm_us,
            settle_ms = self.settle.as_millis(),
            "arming ESC"
        );
        self.write(self.arm_us)?;
        delay_for(delay, self.settle);
        self.armed = true;
        self.set_throttle(0)?;
        tracing::info!("ESC armed");
        Ok(())
    }

    /// Map `percent` (clamped to `[0, 100]`) onto the throttle range and apply it
    /// immediately. Returns the pulse width written.
    pub fn set_throttle(
        &mut self,
        percent: i32,
    ) -> Result<u16, ActuatorError> {
        if !self.armed {
            return Err(ActuatorError::NotArmed);
        }
        let pulse_us = self.throttle.from_percent(percent);
        self.write(pulse_us)?;
        Ok(pulse_us)
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn throttle_range(&self) -> PulseRange {
        self.throttle
    }

    pub fn last_pulse_us(&self) -> Option<u16> {
        self.last_pulse_us
    }

    fn write(
        &mut self,
        pulse_us: u16,
    ) -> Result<(), ActuatorError> {
        self.channel.write_pulse_width(pulse_us)?;
        self.last_pulse_us = Some(pulse_us);
        Ok(())
    }
}
