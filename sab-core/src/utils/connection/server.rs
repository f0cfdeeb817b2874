//! Command Loop Module
//!
//! Runs the board side of the protocol: arm the actuators, complete the
//! handshake, then answer every received line with exactly one reply line.
//! One iteration of the loop is exposed as [`CommandLoop::service`] so the
//! caller can interleave other work; [`CommandLoop::run`] just repeats it.
//! Commands are never dispatched before the ESC is armed and `READY_ACK`
//! has been sent, whichever entry point drives the loop.

use core::{convert::Infallible, fmt};

use embassy_time::Instant;
use embedded_hal::{delay::DelayNs, digital::StatefulOutputPin};

use super::{
    handshake::{Handshake, HandshakeError, HandshakePolicy},
    transport::{Clock, LineTransport},
};
use crate::utils::{
    config::{DwellMode, LinkConfig},
    controllers::{ActuatorError, Dispatch, PulseWidthOutput, SystemController},
};

/// Outcome of one [`CommandLoop::service`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serviced {
    /// The handshake is still waiting for `READY`.
    AwaitingReady,
    /// Nothing to read.
    Idle,
    /// A reply line was written.
    Replied,
    /// A servo swing is in progress; input is held back until it finishes.
    Busy,
}

/// Failures that stop the loop.
#[derive(Debug, PartialEq, Eq)]
pub enum LoopError<E> {
    Transport(E),
    Handshake(HandshakeError<E>),
    /// Startup actuator work failed (ESC arming).
    Actuator(ActuatorError),
}

impl<E: fmt::Debug> fmt::Display for LoopError<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            LoopError::Transport(e) => write!(f, "transport error: {e:?}"),
            LoopError::Handshake(e) => write!(f, "{e}"),
            LoopError::Actuator(e) => write!(f, "startup failed: {e}"),
        }
    }
}

impl<E> From<HandshakeError<E>> for LoopError<E> {
    fn from(error: HandshakeError<E>) -> Self {
        LoopError::Handshake(error)
    }
}

impl<E> From<ActuatorError> for LoopError<E> {
    fn from(error: ActuatorError) -> Self {
        LoopError::Actuator(error)
    }
}

pub struct CommandLoop<T, P, M, S> {
    transport: T,
    controller: SystemController<P, M, S>,
    link: LinkConfig,
    armed: bool,
    handshake: Handshake,
}

impl<T, P, M, S> CommandLoop<T, P, M, S>
where
    T: LineTransport,
    P: StatefulOutputPin,
    M: PulseWidthOutput,
    S: PulseWidthOutput,
{
    pub fn new(
        transport: T,
        controller: SystemController<P, M, S>,
        link: LinkConfig,
    ) -> Self {
        Self {
            transport,
            controller,
            link,
            armed: false,
            handshake: Handshake::new(),
        }
    }

    /// Arm the ESC (if any), then wait for the peer's `READY`.
    ///
    /// Arming comes first so the settle delay is over before the peer is
    /// told the board is ready.
    pub fn start<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), LoopError<T::Error>> {
        self.arm(delay)?;
        let policy = HandshakePolicy::from(&self.link);
        self.handshake.complete(&mut self.transport, policy)?;
        Ok(())
    }

    fn arm<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), ActuatorError> {
        if !self.armed {
            self.controller.start(delay)?;
            self.armed = true;
        }
        Ok(())
    }

    /// True once `READY_ACK` has been sent.
    pub fn is_connected(&self) -> bool {
        self.handshake.is_complete()
    }

    /// One loop iteration.
    ///
    /// The first call arms the ESC. Until the handshake completes, each call
    /// performs one bounded read looking for `READY` and nothing else is
    /// dispatched. While a polled swing is pending, only the swing is
    /// advanced and no input is read. Otherwise at most one line is read and
    /// answered.
    pub fn service<D: DelayNs>(
        &mut self,
        now: Instant,
        delay: &mut D,
    ) -> Result<Serviced, LoopError<T::Error>> {
        self.arm(delay)?;
        if !self.is_connected() {
            let policy = HandshakePolicy::from(&self.link);
            let acked = self.handshake.step(&mut self.transport, policy)?;
            return Ok(if acked {
                Serviced::Replied
            } else {
                Serviced::AwaitingReady
            });
        }

        if self.controller.is_busy() {
            return match self.controller.poll(now) {
                Some(reply) => {
                    self.transport
                        .write_line(&reply)
                        .map_err(LoopError::Transport)?;
                    Ok(Serviced::Replied)
                }
                None => Ok(Serviced::Busy),
            };
        }

        if !self.transport.available().map_err(LoopError::Transport)? {
            return Ok(Serviced::Idle);
        }
        let line = self
            .transport
            .read_line(self.link.read_timeout())
            .map_err(LoopError::Transport)?;

        let reply = match self.link.dwell {
            DwellMode::Blocking => self.controller.handle_line(&line, delay),
            DwellMode::Polled => match self.controller.begin_line(&line, now) {
                Dispatch::Reply(reply) => reply,
                Dispatch::Pending => return Ok(Serviced::Busy),
            },
        };
        tracing::debug!(reply = reply.as_str(), "sending reply");
        self.transport
            .write_line(&reply)
            .map_err(LoopError::Transport)?;
        Ok(Serviced::Replied)
    }

    /// Service lines until the transport fails or startup gives up.
    pub fn run<C, D>(
        &mut self,
        clock: &C,
        delay: &mut D,
    ) -> Result<Infallible, LoopError<T::Error>>
    where
        C: Clock,
        D: DelayNs,
    {
        loop {
            match self.service(clock.now(), delay) {
                Ok(Serviced::Replied | Serviced::AwaitingReady) => {}
                Ok(Serviced::Idle | Serviced::Busy) => delay.delay_ms(1),
                Err(error) => {
                    tracing::error!(?error, "leaving command loop");
                    return Err(error);
                }
            }
        }
    }

    pub fn controller(&self) -> &SystemController<P, M, S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SystemController<P, M, S> {
        &mut self.controller
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn link(&self) -> &LinkConfig {
        &self.link
    }

    pub fn into_parts(self) -> (T, SystemController<P, M, S>) {
        (self.transport, self.controller)
    }
}
