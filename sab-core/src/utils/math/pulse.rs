//! Pulse-width arithmetic for servo and ESC outputs.
//!
//! All values are in microseconds. A [`PulseRange`] is both the target of the
//! linear `[0, 100]` percentage mapping and the clamp applied to raw writes.
//!
//! # Example
//! ```rust
//! use sab_core::utils::math::pulse::PulseRange;
//! let throttle = PulseRange::new(1110, 1900).unwrap();
//! assert_eq!(throttle.from_percent(50), 1505);
//! assert_eq!(throttle.from_percent(150), 1900);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound of a percentage command.
pub const PERCENT_MAX: i32 = 100;

/// Inclusive pulse-width bounds in microseconds. Valid when `min_us < max_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseRange {
    pub min_us: u16,
    pub max_us: u16,
}

/// Returned when a range does not satisfy `min_us < max_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPulseRange {
    pub min_us: u16,
    pub max_us: u16,
}

impl fmt::Display for InvalidPulseRange {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "pulse range {}..={} us is empty or inverted",
            self.min_us, self.max_us
        )
    }
}

impl PulseRange {
    /// Build a range, rejecting empty or inverted bounds.
    pub fn new(
        min_us: u16,
        max_us: u16,
    ) -> Result<Self, InvalidPulseRange> {
        let range = Self { min_us, max_us };
        if range.is_valid() {
            Ok(range)
        } else {
            Err(InvalidPulseRange { min_us, max_us })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_us < self.max_us
    }

    pub fn span(&self) -> u16 {
        self.max_us.saturating_sub(self.min_us)
    }

    /// Center of the range, rounded down.
    pub fn midpoint(&self) -> u16 {
        self.min_us + self.span() / 2
    }

    pub fn contains(
        &self,
        pulse_us: u16,
    ) -> bool {
        (self.min_us..=self.max_us).contains(&pulse_us)
    }

    /// Clamp a (possibly negative) pulse width into the range.
    pub fn clamp(
        &self,
        pulse_us: i32,
    ) -> u16 {
        pulse_us
            .max(i32::from(self.min_us))
            .min(i32::from(self.max_us)) as u16
    }

    /// Map a percentage onto the range.
    ///
    /// The input is clamped to `[0, 100]` first, so `from_percent(v)` equals
    /// `from_percent(v.clamp(0, 100))` for every `v`. Integer division
    /// truncates toward `min_us`.
    pub fn from_percent(
        &self,
        percent: i32,
    ) -> u16 {
        let percent = percent.clamp(0, PERCENT_MAX) as u32;
        let offset = percent * u32::from(self.span()) / PERCENT_MAX as u32;
        self.min_us + offset as u16
    }
}
