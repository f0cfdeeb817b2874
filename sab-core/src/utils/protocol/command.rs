//! Parsed command values.

use core::fmt;

/// Sub-state letter of an indexed `LED <S> <idx>` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAction {
    /// `H`: drive the output high.
    High,
    /// `L`: drive the output low.
    Low,
    /// `T`: invert the output.
    Toggle,
}

impl LedAction {
    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'H' => Some(Self::High),
            b'L' => Some(Self::Low),
            b'T' => Some(Self::Toggle),
            _ => None,
        }
    }
}

/// Argument of a `LIGHT` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightAction {
    On,
    Off,
    Toggle,
}

/// A command parsed from one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `LED H|L|T <idx>` on boards with an indexed LED bank.
    SetLed { action: LedAction, index: usize },
    /// `ON`/`OFF` or `LED ON`/`LED OFF` on single-LED boards.
    Led(bool),
    /// `THROTTLE <value>`; keeps the raw value, clamping happens at mapping.
    Throttle(i32),
    /// `LIGHT ON|OFF|TOGGLE` on boards with a servo-actuated light.
    Light(LightAction),
}

/// Why a line did not produce a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Starts with `LED ` but the sub-state or spacing is wrong.
    MalformedLed,
    /// Indexed LED command naming an LED the board does not have.
    OutOfRangeIndex(i32),
    /// No form accepted by this board matched.
    Unrecognized,
}

impl fmt::Display for CommandError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            CommandError::MalformedLed => f.write_str("malformed LED command"),
            CommandError::OutOfRangeIndex(index) => write!(f, "LED index {index} out of range"),
            CommandError::Unrecognized => f.write_str("unrecognized command"),
        }
    }
}

/// Parse the leading integer of `text`.
///
/// Skips leading whitespace, accepts one optional sign and then as many ASCII
/// digits as follow. Text without a leading number yields `0`, trailing
/// garbage is ignored and overflow saturates.
pub fn leading_int(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |value, digit| {
            let digit = i32::from(digit - b'0');
            if negative {
                value.saturating_mul(10).saturating_sub(digit)
            } else {
                value.saturating_mul(10).saturating_add(digit)
            }
        })
}
