//! LED drivers.
//!
//! Each [`Led`] owns one digital output and caches the last level it wrote.
//! A [`LedBank`] is the ordered set of LEDs addressed by index in
//! `LED H|L|T <idx>` commands.

use embedded_hal::digital::{Error as _, OutputPin, PinState, StatefulOutputPin};
use serde::{Deserialize, Serialize};

use super::ActuatorError;

/// Most LEDs a bank can hold.
pub const MAX_LEDS: usize = 8;

/// Where a toggle reads the current level from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleSource {
    /// The driver's cached flag.
    #[default]
    Cached,
    /// The output latch of the pin (`StatefulOutputPin::is_set_high`).
    Readback,
}

fn pin_error<E: embedded_hal::digital::Error>(error: E) -> ActuatorError {
    ActuatorError::Pin(error.kind())
}

/// Binary output with a cached on/off flag.
pub struct Led<P> {
    pin: P,
    is_on: bool,
}

impl<P: OutputPin> Led<P> {
    /// Take ownership of `pin` and drive it low.
    pub fn new(mut pin: P) -> Result<Self, ActuatorError> {
        pin.set_low().map_err(pin_error)?;
        Ok(Self { pin, is_on: false })
    }

    pub fn set(
        &mut self,
        on: bool,
    ) -> Result<(), ActuatorError> {
        self.pin.set_state(PinState::from(on)).map_err(pin_error)?;
        self.is_on = on;
        Ok(())
    }

    pub fn on(&mut self) -> Result<(), ActuatorError> {
        self.set(true)
    }

    pub fn off(&mut self) -> Result<(), ActuatorError> {
        self.set(false)
    }

    /// Invert the cached flag and write it. Returns the new level.
    pub fn toggle(&mut self) -> Result<bool, ActuatorError> {
        self.set(!self.is_on)?;
        Ok(self.is_on)
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }
}

impl<P: StatefulOutputPin> Led<P> {
    /// Invert whatever level the pin currently drives. Returns the new level.
    pub fn toggle_readback(&mut self) -> Result<bool, ActuatorError> {
        let was_high = self.pin.is_set_high().map_err(pin_error)?;
        self.set(!was_high)?;
        Ok(!was_high)
    }

    pub fn toggle_from(
        &mut self,
        source: ToggleSource,
    ) -> Result<bool, ActuatorError> {
        match source {
            ToggleSource::Cached => self.toggle(),
            ToggleSource::Readback => self.toggle_readback(),
        }
    }
}

/// Ordered LEDs addressed by index.
pub struct LedBank<P> {
    leds: heapless::Vec<Led<P>, MAX_LEDS>,
}

impl<P: OutputPin> LedBank<P> {
    /// Initialise every pin low, in order.
    pub fn new<I>(pins: I) -> Result<Self, ActuatorError>
    where
        I: IntoIterator<Item = P>,
    {
        let mut leds = heapless::Vec::new();
        for pin in pins {
            leds.push(Led::new(pin)?)
                .map_err(|_| ActuatorError::TooManyLeds)?;
        }
        Ok(Self { leds })
    }

    pub fn len(&self) -> usize {
        self.leds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<&Led<P>> {
        self.leds.get(index)
    }

    pub fn get_mut(
        &mut self,
        index: usize,
    ) -> Option<&mut Led<P>> {
        self.leds.get_mut(index)
    }
}
