//! Board configuration.
//!
//! A [`BoardConfig`] selects the LED syntax and which actuators exist, and
//! carries the pulse-width constants for each of them. The presets reproduce
//! the boards the protocol was first written for; any field can be
//! overridden from a serialized config.

use core::fmt;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::utils::{
    controllers::leds::{ToggleSource, MAX_LEDS},
    math::pulse::PulseRange,
    protocol::grammar::LedSyntax,
};

/// Per-read timeout used by the handshake and the command loop.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;

/// Longest timeout, settle or dwell a config may ask for (about 49 days).
pub const MAX_DURATION_MS: u64 = u32::MAX as u64;

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_DURATION_MS))
}

/// How the command loop waits out a servo dwell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DwellMode {
    /// Block inside the command until the servo is back at neutral.
    #[default]
    Blocking,
    /// Keep the loop running and reply once the swing completes.
    Polled,
}

/// Link behaviour shared by every board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub read_timeout_ms: u64,
    /// `None` waits for `READY` forever.
    pub handshake_attempts: Option<u32>,
    pub dwell: DwellMode,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            handshake_attempts: None,
            dwell: DwellMode::Blocking,
        }
    }
}

impl LinkConfig {
    /// Capped at [`MAX_DURATION_MS`].
    pub fn read_timeout(&self) -> Duration {
        millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedConfig {
    pub syntax: LedSyntax,
    pub pins: heapless::Vec<u8, MAX_LEDS>,
    #[serde(default)]
    pub toggle: ToggleSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorConfig {
    pub pin: u8,
    pub frequency_hz: u32,
    /// Bounds the channel is attached with.
    pub attach: PulseRange,
    /// Bounds `THROTTLE 0..=100` maps onto.
    pub throttle: PulseRange,
    pub arm_us: u16,
    pub settle_ms: u64,
}

impl MotorConfig {
    pub fn settle(&self) -> Duration {
        millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightConfig {
    pub pin: u8,
    pub frequency_hz: u32,
    pub attach: PulseRange,
    pub neutral_us: u16,
    pub rotate_offset_us: u16,
    pub dwell_ms: u64,
}

impl LightConfig {
    pub fn dwell(&self) -> Duration {
        millis(self.dwell_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub name: heapless::String<32>,
    pub leds: LedConfig,
    #[serde(default)]
    pub motor: Option<MotorConfig>,
    #[serde(default)]
    pub light: Option<LightConfig>,
    #[serde(default)]
    pub link: LinkConfig,
}

/// Reasons a [`BoardConfig`] cannot drive a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidRange {
        what: &'static str,
        range: PulseRange,
    },
    PulseOutsideAttach {
        what: &'static str,
        pulse_us: u16,
    },
    LedCount {
        syntax: LedSyntax,
        count: usize,
    },
    ZeroFrequency {
        what: &'static str,
    },
    DurationTooLong {
        what: &'static str,
        ms: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConfigError::InvalidRange { what, range } => write!(
                f,
                "{what} range {}..={} us must have min < max",
                range.min_us, range.max_us
            ),
            ConfigError::PulseOutsideAttach { what, pulse_us } => {
                write!(f, "{what} pulse {pulse_us} us is outside the attach range")
            }
            ConfigError::LedCount { syntax, count } => {
                write!(f, "LED syntax {syntax:?} cannot drive {count} LEDs")
            }
            ConfigError::ZeroFrequency { what } => write!(f, "{what} frequency must be non-zero"),
            ConfigError::DurationTooLong { what, ms } => {
                write!(f, "{what} of {ms} ms exceeds {MAX_DURATION_MS} ms")
            }
        }
    }
}

fn range(
    min_us: u16,
    max_us: u16,
) -> PulseRange {
    PulseRange { min_us, max_us }
}

fn pins(list: &[u8]) -> heapless::Vec<u8, MAX_LEDS> {
    heapless::Vec::from_slice(list).unwrap_or_default()
}

fn name(text: &str) -> heapless::String<32> {
    heapless::String::try_from(text).unwrap_or_default()
}

fn check_range(
    what: &'static str,
    range: PulseRange,
) -> Result<(), ConfigError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange { what, range })
    }
}

fn check_duration(
    what: &'static str,
    ms: u64,
) -> Result<(), ConfigError> {
    if ms <= MAX_DURATION_MS {
        Ok(())
    } else {
        Err(ConfigError::DurationTooLong { what, ms })
    }
}

fn check_within(
    what: &'static str,
    attach: PulseRange,
    pulse_us: u16,
) -> Result<(), ConfigError> {
    if attach.contains(pulse_us) {
        Ok(())
    } else {
        Err(ConfigError::PulseOutsideAttach { what, pulse_us })
    }
}

impl BoardConfig {
    /// One LED on GPIO23 driven by bare `ON` / `OFF`.
    pub fn single_led() -> Self {
        Self {
            name: name("single-led"),
            leds: LedConfig {
                syntax: LedSyntax::Bare,
                pins: pins(&[23]),
                toggle: ToggleSource::Cached,
            },
            motor: None,
            light: None,
            link: LinkConfig::default(),
        }
    }

    /// One LED on GPIO23 driven by `LED ON` / `LED OFF`.
    pub fn switched_led() -> Self {
        Self {
            name: name("switched-led"),
            leds: LedConfig {
                syntax: LedSyntax::Switched,
                ..Self::single_led().leds
            },
            ..Self::single_led()
        }
    }

    /// Four indexed LEDs plus an ESC on GPIO17.
    pub fn led_bank() -> Self {
        Self {
            name: name("led-bank"),
            leds: LedConfig {
                syntax: LedSyntax::Indexed,
                pins: pins(&[23, 22, 19, 18]),
                toggle: ToggleSource::Readback,
            },
            motor: Some(MotorConfig {
                pin: 17,
                frequency_hz: 50,
                attach: range(500, 2500),
                throttle: range(1110, 1900),
                arm_us: 900,
                settle_ms: 3000,
            }),
            light: None,
            link: LinkConfig::default(),
        }
    }

    /// A servo on GPIO23 flipping a wall light switch.
    pub fn servo_light() -> Self {
        Self {
            name: name("servo-light"),
            leds: LedConfig {
                syntax: LedSyntax::None,
                pins: heapless::Vec::new(),
                toggle: ToggleSource::Cached,
            },
            motor: None,
            light: Some(LightConfig {
                pin: 23,
                frequency_hz: 50,
                attach: range(500, 2500),
                neutral_us: 1500,
                rotate_offset_us: 500,
                dwell_ms: 800,
            }),
            link: LinkConfig::default(),
        }
    }

    /// Check that the config describes a drivable board.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let count = self.leds.pins.len();
        let count_ok = match self.leds.syntax {
            LedSyntax::None => count == 0,
            LedSyntax::Bare | LedSyntax::Switched => count == 1,
            LedSyntax::Indexed => count >= 1,
        };
        if !count_ok {
            return Err(ConfigError::LedCount {
                syntax: self.leds.syntax,
                count,
            });
        }

        check_duration("read timeout", self.link.read_timeout_ms)?;

        if let Some(motor) = &self.motor {
            check_duration("motor settle", motor.settle_ms)?;
            check_range("motor attach", motor.attach)?;
            check_range("motor throttle", motor.throttle)?;
            check_within("motor throttle min", motor.attach, motor.throttle.min_us)?;
            check_within("motor throttle max", motor.attach, motor.throttle.max_us)?;
            check_within("motor arm", motor.attach, motor.arm_us)?;
            if motor.frequency_hz == 0 {
                return Err(ConfigError::ZeroFrequency { what: "motor" });
            }
        }

        if let Some(light) = &self.light {
            check_duration("light dwell", light.dwell_ms)?;
            check_range("light attach", light.attach)?;
            check_within("light neutral", light.attach, light.neutral_us)?;
            if light.frequency_hz == 0 {
                return Err(ConfigError::ZeroFrequency { what: "light" });
            }
        }

        Ok(())
    }
}
