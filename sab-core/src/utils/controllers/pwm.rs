//! Pulse-width outputs for servos and ESCs.
//!
//! [`PulseWidthOutput`] is the seam the motor and servo drivers write
//! microseconds through. [`AttachedChannel`] implements it over any
//! `embedded-hal` [`SetDutyCycle`] timer channel.

use embedded_hal::pwm::{Error as _, SetDutyCycle};

use super::ActuatorError;
use crate::utils::math::pulse::PulseRange;

/// Default refresh rate for hobby servos and ESCs.
pub const SERVO_FREQUENCY_HZ: u32 = 50;

/// Output that can hold a pulse width, in microseconds.
pub trait PulseWidthOutput {
    fn write_pulse_width(
        &mut self,
        pulse_us: u16,
    ) -> Result<(), ActuatorError>;
}

/// Placeholder channel type for boards without a motor or servo light.
pub enum Unattached {}

impl PulseWidthOutput for Unattached {
    fn write_pulse_width(
        &mut self,
        _pulse_us: u16,
    ) -> Result<(), ActuatorError> {
        match *self {}
    }
}

/// Convert a pulse width into a duty value for a channel with `period_us`.
pub fn pulse_to_duty(
    pulse_us: u16,
    period_us: u32,
    max_duty: u16,
) -> u16 {
    if period_us == 0 {
        return max_duty;
    }
    let duty = u64::from(pulse_us) * u64::from(max_duty) / u64::from(period_us);
    duty.min(u64::from(max_duty)) as u16
}

/// A timer channel attached with fixed pulse bounds and frequency.
///
/// Every write is clamped into the attach range before it is converted into
/// a duty value.
pub struct AttachedChannel<P> {
    pwm: P,
    range: PulseRange,
    period_us: u32,
    max_duty: u16,
    last_pulse_us: Option<u16>,
}

impl<P: SetDutyCycle> AttachedChannel<P> {
    pub fn attach(
        pwm: P,
        range: PulseRange,
        frequency_hz: u32,
    ) -> Self {
        let max_duty = pwm.max_duty_cycle();
        let period_us = 1_000_000 / frequency_hz.max(1);
        tracing::debug!(
            min_us = range.min_us,
            max_us = range.max_us,
            frequency_hz,
            max_duty,
            "PWM channel attached"
        );
        Self {
            pwm,
            range,
            period_us,
            max_duty,
            last_pulse_us: None,
        }
    }

    pub fn range(&self) -> PulseRange {
        self.range
    }

    /// Last pulse width successfully written, after clamping.
    pub fn last_pulse_us(&self) -> Option<u16> {
        self.last_pulse_us
    }

    /// Give the timer channel back.
    pub fn detach(self) -> P {
        self.pwm
    }
}

impl<P: SetDutyCycle> PulseWidthOutput for AttachedChannel<P> {
    fn write_pulse_width(
        &mut self,
        pulse_us: u16,
    ) -> Result<(), ActuatorError> {
        let pulse_us = self.range.clamp(i32::from(pulse_us));
        let duty = pulse_to_duty(pulse_us, self.period_us, self.max_duty);
        self.pwm
            .set_duty_cycle(duty)
            .map_err(|e| ActuatorError::Pwm(e.kind()))?;
        tracing::trace!(pulse_us, duty, "pulse width written");
        self.last_pulse_us = Some(pulse_us);
        Ok(())
    }
}
