//! Actuator drivers and the command dispatcher.
//!
//! - `leds`: digital LED outputs with cached state
//! - `motor`: ESC throttle mapping
//! - `pwm`: pulse-width output seam over `embedded-hal` PWM channels
//! - `servo`: servo-actuated light switch
//!
//! [`SystemController`] owns every driver of a board and turns each input line
//! into exactly one reply line.

pub mod leds;
pub mod motor;
pub mod pwm;
pub mod servo;

use core::fmt;

use embassy_time::{Duration, Instant};
use embedded_hal::{delay::DelayNs, digital::StatefulOutputPin, pwm::SetDutyCycle};

pub use leds::{Led, LedBank, ToggleSource};
pub use motor::Motor;
pub use pwm::{AttachedChannel, PulseWidthOutput, Unattached};
pub use servo::{ServoLight, Swing};

use crate::utils::{
    config::{BoardConfig, ConfigError},
    protocol::{
        reply, Capabilities, Command, CommandError, LedAction, LedSyntax, LightAction, Reply,
    },
};

/// Errors reported by actuator drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    Pin(embedded_hal::digital::ErrorKind),
    Pwm(embedded_hal::pwm::ErrorKind),
    /// Throttle commanded before the ESC was armed.
    NotArmed,
    /// A servo swing is still in progress.
    Busy,
    TooManyLeds,
    /// Drivers handed over do not match the board config.
    ProfileMismatch(&'static str),
    Config(ConfigError),
}

impl fmt::Display for ActuatorError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ActuatorError::Pin(kind) => write!(f, "digital output failed: {kind:?}"),
            ActuatorError::Pwm(kind) => write!(f, "PWM output failed: {kind:?}"),
            ActuatorError::NotArmed => f.write_str("ESC is not armed"),
            ActuatorError::Busy => f.write_str("servo swing in progress"),
            ActuatorError::TooManyLeds => {
                write!(f, "at most {} LEDs are supported", leds::MAX_LEDS)
            }
            ActuatorError::ProfileMismatch(what) => write!(f, "board mismatch: {what}"),
            ActuatorError::Config(error) => write!(f, "invalid config: {error}"),
        }
    }
}

impl From<ConfigError> for ActuatorError {
    fn from(error: ConfigError) -> Self {
        ActuatorError::Config(error)
    }
}

/// Block for `duration`, in `u32` millisecond chunks so long waits are not cut short.
pub(crate) fn delay_for<D: DelayNs>(
    delay: &mut D,
    duration: Duration,
) {
    let mut remaining = duration.as_millis();
    while remaining > 0 {
        let chunk = u32::try_from(remaining).unwrap_or(u32::MAX);
        delay.delay_ms(chunk);
        remaining -= u64::from(chunk);
    }
}

/// Result of handing a line to [`SystemController::begin_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The command finished; send this reply.
    Reply(Reply),
    /// A servo swing started; the reply comes from [`SystemController::poll`].
    Pending,
}

/// Owns the drivers of one board and maps commands onto them.
///
/// `P` is the LED pin type, `M` the ESC channel and `S` the servo channel.
/// Boards without a motor or light use [`Unattached`] for that slot.
pub struct SystemController<P, M, S> {
    capabilities: Capabilities,
    toggle: ToggleSource,
    leds: LedBank<P>,
    motor: Option<Motor<M>>,
    light: Option<ServoLight<S>>,
}

impl<P, M, S> SystemController<P, M, S>
where
    P: StatefulOutputPin,
    M: PulseWidthOutput,
    S: PulseWidthOutput,
{
    pub fn new(
        led_syntax: LedSyntax,
        toggle: ToggleSource,
        leds: LedBank<P>,
        motor: Option<Motor<M>>,
        light: Option<ServoLight<S>>,
    ) -> Result<Self, ActuatorError> {
        let count_ok = match led_syntax {
            LedSyntax::None => leds.is_empty(),
            LedSyntax::Bare | LedSyntax::Switched => leds.len() == 1,
            LedSyntax::Indexed => !leds.is_empty(),
        };
        if !count_ok {
            return Err(ActuatorError::ProfileMismatch(
                "LED count does not fit the LED syntax",
            ));
        }

        let capabilities = Capabilities {
            led_syntax,
            led_count: leds.len(),
            throttle: motor.is_some(),
            light: light.is_some(),
        };
        tracing::info!(
            ?led_syntax,
            leds = leds.len(),
            throttle = capabilities.throttle,
            light = capabilities.light,
            "system controller ready"
        );

        Ok(Self {
            capabilities,
            toggle,
            leds,
            motor,
            light,
        })
    }

    /// Build every driver a [`BoardConfig`] describes.
    ///
    /// `motor` and `light` are pulse-width outputs that must already honour
    /// the section's `attach` range and `frequency_hz`; only the throttle,
    /// arm and swing constants are applied here. They must be present exactly
    /// when the config has the matching section. For bare timer channels use
    /// [`attach_from_config`](SystemController::attach_from_config).
    pub fn from_config<I>(
        config: &BoardConfig,
        pins: I,
        motor: Option<M>,
        light: Option<S>,
    ) -> Result<Self, ActuatorError>
    where
        I: IntoIterator<Item = P>,
    {
        config.validate()?;
        let leds = LedBank::new(pins)?;
        if leds.len() != config.leds.pins.len() {
            return Err(ActuatorError::ProfileMismatch(
                "LED pin count differs from config",
            ));
        }

        let motor = match (&config.motor, motor) {
            (Some(cfg), Some(channel)) => Some(Motor::new(
                channel,
                cfg.throttle,
                cfg.arm_us,
                cfg.settle(),
            )),
            (None, None) => None,
            _ => return Err(ActuatorError::ProfileMismatch("motor channel vs config")),
        };

        let light = match (&config.light, light) {
            (Some(cfg), Some(channel)) => Some(ServoLight::new(
                channel,
                Swing {
                    range: cfg.attach,
                    neutral_us: cfg.neutral_us,
                    rotate_offset_us: cfg.rotate_offset_us,
                    dwell: cfg.dwell(),
                },
            )?),
            (None, None) => None,
            _ => return Err(ActuatorError::ProfileMismatch("light channel vs config")),
        };

        Self::new(config.leds.syntax, config.leds.toggle, leds, motor, light)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn leds(&self) -> &LedBank<P> {
        &self.leds
    }

    pub fn motor(&self) -> Option<&Motor<M>> {
        self.motor.as_ref()
    }

    pub fn light(&self) -> Option<&ServoLight<S>> {
        self.light.as_ref()
    }

    /// Startup work that must finish before commands are accepted: arm the ESC.
    pub fn start<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), ActuatorError> {
        if let Some(motor) = self.motor.as_mut() {
            motor.arm(delay)?;
        }
        Ok(())
    }

    /// True while a servo swing started by [`begin_line`](Self::begin_line)
    /// has not returned to neutral.
    pub fn is_busy(&self) -> bool {
        self.light.as_ref().is_some_and(ServoLight::is_busy)
    }

    /// Handle one line to completion, blocking on `delay` for servo dwells.
    pub fn handle_line<D: DelayNs>(
        &mut self,
        line: &str,
        delay: &mut D,
    ) -> Reply {
        let result = match self.parse(line) {
            Ok(Command::SetLed { action, index }) => self.set_led(action, index),
            Ok(Command::Led(on)) => self.switch_led(on),
            Ok(Command::Throttle(raw)) => self.throttle(raw),
            Ok(Command::Light(action)) => self.light_mut().and_then(|light| {
                let on = light_target(light, action);
                light.rotate(on, delay).map(reply::light)
            }),
            Err(error) => return self.reject(error),
        };
        self.finish(result)
    }

    /// Handle one line without blocking.
    ///
    /// Light commands start a swing and return [`Dispatch::Pending`]; every
    /// other line completes immediately.
    pub fn begin_line(
        &mut self,
        line: &str,
        now: Instant,
    ) -> Dispatch {
        let result = match self.parse(line) {
            Ok(Command::SetLed { action, index }) => self.set_led(action, index),
            Ok(Command::Led(on)) => self.switch_led(on),
            Ok(Command::Throttle(raw)) => self.throttle(raw),
            Ok(Command::Light(action)) => {
                let started = self.light_mut().and_then(|light| {
                    let on = light_target(light, action);
                    light.begin(on)?;
                    light.poll(now)
                });
                match started {
                    Ok(None) => return Dispatch::Pending,
                    Ok(Some(on)) => Ok(reply::light(on)),
                    Err(error) => Err(error),
                }
            }
            Err(error) => return Dispatch::Reply(self.reject(error)),
        };
        Dispatch::Reply(self.finish(result))
    }

    /// Advance a pending swing. Returns its reply once the servo is back at
    /// neutral, or a fault reply if a write failed.
    pub fn poll(
        &mut self,
        now: Instant,
    ) -> Option<Reply> {
        let light = self.light.as_mut()?;
        if !light.is_busy() {
            return None;
        }
        match light.poll(now) {
            Ok(Some(on)) => Some(reply::light(on)),
            Ok(None) => None,
            Err(error) => Some(self.finish(Err(error))),
        }
    }

    fn parse(
        &self,
        line: &str,
    ) -> Result<Command, CommandError> {
        let command = self.capabilities.parse(line);
        tracing::debug!(line, ?command, "line parsed");
        command
    }

    fn light_mut(&mut self) -> Result<&mut ServoLight<S>, ActuatorError> {
        self.light
            .as_mut()
            .ok_or(ActuatorError::ProfileMismatch("no servo light"))
    }

    fn throttle(
        &mut self,
        raw: i32,
    ) -> Result<Reply, ActuatorError> {
        let motor = self
            .motor
            .as_mut()
            .ok_or(ActuatorError::ProfileMismatch("no motor"))?;
        let pulse_us = motor.set_throttle(raw)?;
        tracing::info!(raw, pulse_us, "throttle applied");
        Ok(reply::throttle(raw))
    }

    fn set_led(
        &mut self,
        action: LedAction,
        index: usize,
    ) -> Result<Reply, ActuatorError> {
        let toggle = self.toggle;
        let led = self
            .leds
            .get_mut(index)
            .ok_or(ActuatorError::ProfileMismatch("LED index past bank"))?;
        match action {
            LedAction::High => led.on().map(|()| reply::led_level(index, true)),
            LedAction::Low => led.off().map(|()| reply::led_level(index, false)),
            LedAction::Toggle => led
                .toggle_from(toggle)
                .map(|high| reply::led_toggled(index, high)),
        }
    }

    fn switch_led(
        &mut self,
        on: bool,
    ) -> Result<Reply, ActuatorError> {
        let led = self
            .leds
            .get_mut(0)
            .ok_or(ActuatorError::ProfileMismatch("no LED"))?;
        led.set(on).map(|()| reply::led_switched(on))
    }

    fn reject(
        &self,
        error: CommandError,
    ) -> Reply {
        tracing::warn!(%error, "command rejected");
        self.capabilities.error_reply(error)
    }

    fn finish(
        &self,
        result: Result<Reply, ActuatorError>,
    ) -> Reply {
        result.unwrap_or_else(|error| {
            tracing::error!(%error, "actuator command failed");
            reply::actuator_fault()
        })
    }
}

impl<P, MP, SP> SystemController<P, AttachedChannel<MP>, AttachedChannel<SP>>
where
    P: StatefulOutputPin,
    MP: SetDutyCycle,
    SP: SetDutyCycle,
{
    /// Attach bare timer channels with the attach range and frequency of
    /// their config sections, then build the board as
    /// [`from_config`](Self::from_config) does.
    pub fn attach_from_config<I>(
        config: &BoardConfig,
        pins: I,
        motor: Option<MP>,
        light: Option<SP>,
    ) -> Result<Self, ActuatorError>
    where
        I: IntoIterator<Item = P>,
    {
        config.validate()?;
        let motor = match (&config.motor, motor) {
            (Some(cfg), Some(pwm)) => {
                Some(AttachedChannel::attach(pwm, cfg.attach, cfg.frequency_hz))
            }
            (None, Some(_)) => {
                return Err(ActuatorError::ProfileMismatch("motor channel vs config"))
            }
            (_, None) => None,
        };
        let light = match (&config.light, light) {
            (Some(cfg), Some(pwm)) => {
                Some(AttachedChannel::attach(pwm, cfg.attach, cfg.frequency_hz))
            }
            (None, Some(_)) => {
                return Err(ActuatorError::ProfileMismatch("light channel vs config"))
            }
            (_, None) => None,
        };
        Self::from_config(config, pins, motor, light)
    }
}

/// Direction a light command swings toward, given the current state.
fn light_target<S>(
    light: &ServoLight<S>,
    action: LightAction,
) -> bool
where
    S: PulseWidthOutput,
{
    match action {
        LightAction::On => true,
        LightAction::Off => false,
        LightAction::Toggle => !light.is_on(),
    }
}
