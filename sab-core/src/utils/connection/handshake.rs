//! `READY` / `READY_ACK` handshake.
//!
//! The board waits for a line reading `READY` and answers `READY_ACK` once.
//! Hosts use [`connect`] for the other half of the exchange.

use core::fmt;

use embassy_time::Duration;

use super::transport::LineTransport;
use crate::utils::config::LinkConfig;

pub const READY: &str = "READY";
pub const READY_ACK: &str = "READY_ACK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingReady,
    /// Terminal: the acknowledgement was written.
    AckSent,
}

/// How long to keep listening for the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePolicy {
    pub read_timeout: Duration,
    /// Number of line reads before giving up. `None` waits forever.
    pub max_attempts: Option<u32>,
}

impl From<&LinkConfig> for HandshakePolicy {
    fn from(link: &LinkConfig) -> Self {
        Self {
            read_timeout: link.read_timeout(),
            max_attempts: link.handshake_attempts,
        }
    }
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError<E> {
    Transport(E),
    /// The attempt limit ran out before the expected line arrived.
    Exhausted { attempts: u32 },
}

impl<E: fmt::Debug> fmt::Display for HandshakeError<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            HandshakeError::Transport(e) => write!(f, "transport error during handshake: {e:?}"),
            HandshakeError::Exhausted { attempts } => {
                write!(f, "no handshake after {attempts} reads")
            }
        }
    }
}

/// Board side of the handshake.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    attempts: u32,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitingReady,
            attempts: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Lines read so far, `READY` included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Feed one received line. Returns true when it completes the handshake
    /// and `READY_ACK` must be sent.
    pub fn accept(
        &mut self,
        line: &str,
    ) -> bool {
        if self.state == HandshakeState::AckSent {
            return false;
        }
        self.attempts = self.attempts.saturating_add(1);
        if line.trim() == READY {
            self.state = HandshakeState::AckSent;
            true
        } else {
            if !line.trim().is_empty() {
                tracing::debug!(line, "ignoring line before READY");
            }
            false
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::AckSent
    }

    /// True once `policy` allows no further reads.
    pub fn is_exhausted(
        &self,
        policy: HandshakePolicy,
    ) -> bool {
        exhausted(self.attempts, policy)
    }

    /// Read one line (waiting at most the policy timeout) and answer it if it
    /// is `READY`. Returns true once the handshake is complete.
    pub fn step<T: LineTransport>(
        &mut self,
        transport: &mut T,
        policy: HandshakePolicy,
    ) -> Result<bool, HandshakeError<T::Error>> {
        if self.is_complete() {
            return Ok(true);
        }
        if self.is_exhausted(policy) {
            tracing::warn!(attempts = self.attempts, "handshake gave up");
            return Err(HandshakeError::Exhausted {
                attempts: self.attempts,
            });
        }
        let line = transport
            .read_line(policy.read_timeout)
            .map_err(HandshakeError::Transport)?;
        if !self.accept(&line) {
            return Ok(false);
        }
        transport
            .write_line(READY_ACK)
            .map_err(HandshakeError::Transport)?;
        tracing::info!(attempts = self.attempts, "handshake complete");
        Ok(true)
    }

    /// Step until the handshake completes.
    pub fn complete<T: LineTransport>(
        &mut self,
        transport: &mut T,
        policy: HandshakePolicy,
    ) -> Result<(), HandshakeError<T::Error>> {
        tracing::info!("waiting for READY");
        while !self.step(transport, policy)? {}
        Ok(())
    }

    /// Read lines until `READY` arrives, then write `READY_ACK`.
    #[tracing::instrument(level = "debug", skip(transport))]
    pub fn establish<T: LineTransport>(
        transport: &mut T,
        policy: HandshakePolicy,
    ) -> Result<Self, HandshakeError<T::Error>> {
        let mut handshake = Self::new();
        handshake.complete(transport, policy)?;
        Ok(handshake)
    }
}

fn exhausted(
    attempts: u32,
    policy: HandshakePolicy,
) -> bool {
    policy.max_attempts.is_some_and(|max| attempts >= max)
}

/// Host side: send `READY` once, then read until `READY_ACK`.
pub fn connect<T: LineTransport>(
    transport: &mut T,
    policy: HandshakePolicy,
) -> Result<(), HandshakeError<T::Error>> {
    transport
        .write_line(READY)
        .map_err(HandshakeError::Transport)?;

    let mut attempts = 0u32;
    loop {
        if exhausted(attempts, policy) {
            return Err(HandshakeError::Exhausted { attempts });
        }
        let line = transport
            .read_line(policy.read_timeout)
            .map_err(HandshakeError::Transport)?;
        attempts = attempts.saturating_add(1);
        if line.trim() == READY_ACK {
            tracing::info!(attempts, "board acknowledged");
            return Ok(());
        }
    }
}
