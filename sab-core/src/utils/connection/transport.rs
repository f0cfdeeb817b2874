//! Line transport.
//!
//! The protocol only needs three operations from the link: is input waiting,
//! read one line within a deadline, write one line. [`LineTransport`] is that
//! seam; [`SerialLink`] implements it over any `embedded-io` byte stream
//! (hardware UART, Bluetooth SPP bridge, USB CDC).

use embassy_time::{Duration, Instant};
use embedded_io::{Read, ReadReady, Write};

/// Longest line kept; further bytes up to the newline are dropped.
pub const MAX_LINE_LEN: usize = 128;

/// One received line, without its terminator.
pub type Line = heapless::String<MAX_LINE_LEN>;

/// Byte stream that can read and write newline-delimited lines.
pub trait LineTransport {
    type Error: core::fmt::Debug;

    /// True when at least one byte can be read without blocking.
    fn available(&mut self) -> Result<bool, Self::Error>;

    /// Read up to the next `\n`, waiting at most `timeout`.
    ///
    /// On timeout the bytes received so far are returned, possibly none.
    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> Result<Line, Self::Error>;

    /// Write `line` followed by `\n`.
    fn write_line(
        &mut self,
        line: &str,
    ) -> Result<(), Self::Error>;
}

/// Monotonic time source for read deadlines.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by the `embassy-time` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// [`LineTransport`] over a polled `embedded-io` stream.
pub struct SerialLink<U, C> {
    uart: U,
    clock: C,
}

impl<U, C> SerialLink<U, C>
where
    U: Read + ReadReady + Write,
    C: Clock,
{
    pub fn new(
        uart: U,
        clock: C,
    ) -> Self {
        Self { uart, clock }
    }

    pub fn into_inner(self) -> (U, C) {
        (self.uart, self.clock)
    }
}

impl<U, C> LineTransport for SerialLink<U, C>
where
    U: Read + ReadReady + Write,
    C: Clock,
{
    type Error = U::Error;

    fn available(&mut self) -> Result<bool, Self::Error> {
        self.uart.read_ready()
    }

    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> Result<Line, Self::Error> {
        let deadline = self.clock.now() + timeout;
        let mut line = Line::new();
        let mut dropped = 0usize;
        let mut byte = [0u8; 1];

        loop {
            if !self.uart.read_ready()? {
                if self.clock.now() >= deadline {
                    tracing::trace!(len = line.len(), "line read timed out");
                    break;
                }
                continue;
            }

            if self.uart.read(&mut byte)? == 0 {
                break;
            }

            let ch = match byte[0] {
                b'\n' => break,
                b if b.is_ascii() => char::from(b),
                _ => '?',
            };
            if line.push(ch).is_err() {
                dropped += 1;
            }
        }

        if dropped > 0 {
            tracing::warn!(dropped, "input line too long, truncated");
        }
        Ok(line)
    }

    fn write_line(
        &mut self,
        line: &str,
    ) -> Result<(), Self::Error> {
        self.uart.write_all(line.as_bytes())?;
        self.uart.write_all(b"\n")?;
        self.uart.flush()
    }
}
