//! Module Exports
//!
//! This file exports the modules that talk to the peer over the link.
//!
//! # Modules
//! - `transport`: line-oriented reads and writes over a byte stream.
//! - `handshake`: the `READY` / `READY_ACK` exchange, board and host side.
//! - `server`: the startup sequence and the read → dispatch → reply loop.

pub mod handshake;
/// Startup sequence and command loop.
pub mod server;
pub mod transport;

pub use handshake::{connect, Handshake, HandshakeError, HandshakePolicy};
pub use server::{CommandLoop, LoopError, Serviced};
pub use transport::{Clock, Line, LineTransport, SerialLink, SystemClock};
