//! Servo-actuated light switch.
//!
//! The servo rests at neutral. Switching the light swings the horn to
//! `neutral + offset` (on) or `neutral - offset` (off), holds it there for the
//! dwell time, and returns to neutral. The logical light state only changes
//! once the servo is back at neutral.
//!
//! The swing is an explicit state machine driven by [`ServoLight::poll`], so
//! a caller can keep servicing other work during the dwell. [`ServoLight::rotate`]
//! drives the same machine with a blocking delay.

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;

use super::{delay_for, pwm::PulseWidthOutput, ActuatorError};
use crate::utils::math::pulse::PulseRange;

/// Where the servo is in a rotate-and-return swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Idle,
    MovingToTarget { on: bool },
    Holding { on: bool, until: Instant },
    ReturningToNeutral { on: bool },
}

/// Swing geometry of a servo light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swing {
    /// Attach range; every target is clamped into it.
    pub range: PulseRange,
    pub neutral_us: u16,
    pub rotate_offset_us: u16,
    pub dwell: Duration,
}

/// Bistable light flipped by a servo.
pub struct ServoLight<C> {
    channel: C,
    swing: Swing,
    is_on: bool,
    phase: RotationPhase,
}

impl<C: PulseWidthOutput> ServoLight<C> {
    /// Take the channel and move the servo to the midpoint of its range.
    pub fn new(
        mut channel: C,
        swing: Swing,
    ) -> Result<Self, ActuatorError> {
        channel.write_pulse_width(swing.range.midpoint())?;
        Ok(Self {
            channel,
            swing,
            is_on: false,
            phase: RotationPhase::Idle,
        })
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != RotationPhase::Idle
    }

    /// Pulse width the servo swings to for the given direction.
    pub fn target_us(
        &self,
        on: bool,
    ) -> u16 {
        let neutral = i32::from(self.swing.neutral_us);
        let offset = i32::from(self.swing.rotate_offset_us);
        self.swing
            .range
            .clamp(if on { neutral + offset } else { neutral - offset })
    }

    /// Start a swing. Nothing is written until the next [`poll`](Self::poll).
    pub fn begin(
        &mut self,
        on: bool,
    ) -> Result<(), ActuatorError> {
        if self.is_busy() {
            return Err(ActuatorError::Busy);
        }
        tracing::debug!(on, target_us = self.target_us(on), "servo swing started");
        self.phase = RotationPhase::MovingToTarget { on };
        Ok(())
    }

    /// Advance the swing as far as `now` allows.
    ///
    /// Returns the new light state once the servo is back at neutral. A
    /// failed write abandons the swing and leaves the light state unchanged.
    pub fn poll(
        &mut self,
        now: Instant,
    ) -> Result<Option<bool>, ActuatorError> {
        let result = self.step(now);
        if result.is_err() {
            self.phase = RotationPhase::Idle;
        }
        result
    }

    fn step(
        &mut self,
        now: Instant,
    ) -> Result<Option<bool>, ActuatorError> {
        loop {
            match self.phase {
                RotationPhase::Idle => return Ok(None),
                RotationPhase::MovingToTarget { on } => {
                    self.channel.write_pulse_width(self.target_us(on))?;
                    self.phase = RotationPhase::Holding {
                        on,
                        until: now + self.swing.dwell,
                    };
                }
                RotationPhase::Holding { on, until } => {
                    if now < until {
                        return Ok(None);
                    }
                    self.phase = RotationPhase::ReturningToNeutral { on };
                }
                RotationPhase::ReturningToNeutral { on } => {
                    self.channel.write_pulse_width(self.swing.neutral_us)?;
                    self.is_on = on;
                    self.phase = RotationPhase::Idle;
                    tracing::info!(on, "light switched");
                    return Ok(Some(on));
                }
            }
        }
    }

    /// Swing and return, blocking on `delay` for the dwell.
    pub fn rotate<D: DelayNs>(
        &mut self,
        on: bool,
        delay: &mut D,
    ) -> Result<bool, ActuatorError> {
        let start = Instant::from_ticks(0);
        self.begin(on)?;
        self.poll(start)?;
        delay_for(delay, self.swing.dwell);
        let state = self.poll(start + self.swing.dwell)?;
        Ok(state.unwrap_or(self.is_on))
    }
}
