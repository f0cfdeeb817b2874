//! Simulated board peripherals.
//!
//! GPIO and PWM writes are logged instead of driving hardware; the link is
//! stdin/stdout so a host adapter can be piped straight in.

use std::{
    convert::Infallible,
    io::{self, BufRead, Write},
};

use embedded_hal::{
    digital::{self, OutputPin, StatefulOutputPin},
    pwm::{self, SetDutyCycle},
};
use sab_core::utils::{
    Duration,
    connection::transport::{Line, LineTransport, MAX_LINE_LEN},
};
use tracing::info;

/// Output pin that remembers and logs its level.
pub struct SimPin {
    gpio: u8,
    high: bool,
}

impl SimPin {
    pub fn new(gpio: u8) -> Self {
        Self { gpio, high: false }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        info!(gpio = self.gpio, "GPIO low");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        info!(gpio = self.gpio, "GPIO high");
        Ok(())
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.high)
    }
}

/// 16-bit timer channel.
pub struct SimPwm {
    gpio: u8,
    duty: u16,
}

impl SimPwm {
    pub fn new(gpio: u8) -> Self {
        Self { gpio, duty: 0 }
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }
}

impl pwm::ErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Infallible> {
        self.duty = duty;
        info!(gpio = self.gpio, duty, "PWM duty");
        Ok(())
    }
}

/// Line transport over a buffered reader and a writer.
///
/// Reads block until a full line arrives, so the timeout is not applied.
/// End of input is reported as [`io::ErrorKind::UnexpectedEof`].
pub struct StdioLink<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> StdioLink<R, W> {
    pub fn new(
        reader: R,
        writer: W,
    ) -> Self {
        Self { reader, writer }
    }
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "input closed")
}

impl<R: BufRead, W: Write> LineTransport for StdioLink<R, W> {
    type Error = io::Error;

    fn available(&mut self) -> Result<bool, io::Error> {
        if self.reader.fill_buf()?.is_empty() {
            return Err(eof());
        }
        Ok(true)
    }

    fn read_line(
        &mut self,
        _timeout: Duration,
    ) -> Result<Line, io::Error> {
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw)? == 0 {
            return Err(eof());
        }
        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.len() > MAX_LINE_LEN {
            tracing::warn!(len = raw.len(), "input line too long, truncated");
            raw.truncate(MAX_LINE_LEN);
        }

        let mut line = Line::new();
        for &b in &raw {
            // one byte per char, always fits after truncation
            let _ = line.push(if b.is_ascii() { char::from(b) } else { '?' });
        }
        Ok(line)
    }

    fn write_line(
        &mut self,
        line: &str,
    ) -> Result<(), io::Error> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }
}
