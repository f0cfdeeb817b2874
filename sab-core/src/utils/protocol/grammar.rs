//! Per-board command grammar.
//!
//! A board accepts one LED syntax plus optional `THROTTLE` and `LIGHT`
//! commands. [`Capabilities`] captures that set, parses lines against it and
//! renders the usage text for lines that match nothing.

use core::fmt::Write;

use serde::{Deserialize, Serialize};

use super::{
    command::{leading_int, Command, CommandError, LedAction, LightAction},
    reply::Reply,
};

/// LED command syntax of a board. Only one syntax is active per board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedSyntax {
    /// No LED commands.
    None,
    /// Bare `ON` / `OFF` for a single LED.
    Bare,
    /// `LED ON` / `LED OFF` for a single LED.
    Switched,
    /// `LED H|L|T <idx>` over a bank of LEDs.
    #[default]
    Indexed,
}

/// Command forms accepted by one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub led_syntax: LedSyntax,
    pub led_count: usize,
    pub throttle: bool,
    pub light: bool,
}

const LED_USAGE: &str =
    "Unknown LED command. Use 'LED H <index>' or 'LED L <index>' or 'LED T <index>'.";

impl Capabilities {
    /// Parse one line. Surrounding whitespace is ignored, verbs are
    /// case-sensitive.
    pub fn parse(
        &self,
        line: &str,
    ) -> Result<Command, CommandError> {
        let line = line.trim();

        match self.led_syntax {
            LedSyntax::Bare => match line {
                "ON" => return Ok(Command::Led(true)),
                "OFF" => return Ok(Command::Led(false)),
                _ => {}
            },
            LedSyntax::Switched => match line {
                "LED ON" => return Ok(Command::Led(true)),
                "LED OFF" => return Ok(Command::Led(false)),
                _ => {}
            },
            LedSyntax::Indexed => {
                if let Some(rest) = line.strip_prefix("LED ") {
                    return self.parse_indexed(rest);
                }
            }
            LedSyntax::None => {}
        }

        if self.throttle {
            if let Some(value) = line.strip_prefix("THROTTLE ") {
                return Ok(Command::Throttle(leading_int(value)));
            }
        }

        if self.light {
            match line {
                "LIGHT ON" => return Ok(Command::Light(LightAction::On)),
                "LIGHT OFF" => return Ok(Command::Light(LightAction::Off)),
                "LIGHT TOGGLE" => return Ok(Command::Light(LightAction::Toggle)),
                _ => {}
            }
        }

        Err(CommandError::Unrecognized)
    }

    /// `<S> <idx>`: one sub-state letter, one space, then a leading integer.
    fn parse_indexed(
        &self,
        rest: &str,
    ) -> Result<Command, CommandError> {
        let bytes = rest.as_bytes();
        let action = bytes
            .first()
            .and_then(|&letter| LedAction::from_letter(letter))
            .ok_or(CommandError::MalformedLed)?;
        if bytes.len() <= 2 || bytes[1] != b' ' {
            return Err(CommandError::MalformedLed);
        }

        let index = leading_int(&rest[2..]);
        match usize::try_from(index) {
            Ok(i) if i < self.led_count => Ok(Command::SetLed { action, index: i }),
            _ => Err(CommandError::OutOfRangeIndex(index)),
        }
    }

    /// Command forms this board accepts, in usage order.
    pub fn forms(&self) -> heapless::Vec<&'static str, 8> {
        let mut forms = heapless::Vec::new();
        let led_forms: &[&'static str] = match self.led_syntax {
            LedSyntax::None => &[],
            LedSyntax::Bare => &["ON", "OFF"],
            LedSyntax::Switched => &["LED ON", "LED OFF"],
            LedSyntax::Indexed => &["LED H <index>", "LED L <index>", "LED T <index>"],
        };
        let throttle_forms: &[&'static str] = if self.throttle {
            &["THROTTLE <value>"]
        } else {
            &[]
        };
        let light_forms: &[&'static str] = if self.light {
            &["LIGHT ON", "LIGHT OFF", "LIGHT TOGGLE"]
        } else {
            &[]
        };

        for form in led_forms.iter().chain(throttle_forms).chain(light_forms) {
            // at most 3 + 1 + 3 forms
            let _ = forms.push(*form);
        }
        forms
    }

    /// Reply for a line that matched no form: `Unknown command. Use 'A' or 'B'.`
    pub fn usage(&self) -> Reply {
        let forms = self.forms();
        let mut reply = Reply::new();
        let _ = reply.push_str("Unknown command.");
        if forms.is_empty() {
            return reply;
        }

        let _ = reply.push_str(" Use ");
        let last = forms.len() - 1;
        for (i, form) in forms.iter().enumerate() {
            if i > 0 {
                let separator = match (i == last, forms.len()) {
                    (true, 2) => " or ",
                    (true, _) => ", or ",
                    (false, _) => ", ",
                };
                let _ = reply.push_str(separator);
            }
            let _ = write!(reply, "'{form}'");
        }
        let _ = reply.push('.');
        reply
    }

    /// Reply for a rejected line.
    pub fn error_reply(
        &self,
        error: CommandError,
    ) -> Reply {
        match error {
            CommandError::MalformedLed => Reply::try_from(LED_USAGE).unwrap_or_default(),
            CommandError::OutOfRangeIndex(_) => {
                Reply::try_from("Invalid LED index.").unwrap_or_default()
            }
            CommandError::Unrecognized => self.usage(),
        }
    }
}
