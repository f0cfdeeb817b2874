//! Utility re-exports for the serial actuator bridge.
//!
//! - `config`: board profiles and their serde representation
//! - `connection`: line transport, handshake and the command loop
//! - `controllers`: LED, ESC and servo drivers plus the command dispatcher
//! - `math`: pulse-width arithmetic
//! - `protocol`: command grammar, parsing and reply lines

pub mod config;
pub mod connection;
pub mod controllers;
pub mod math;
pub mod protocol;

pub use config::BoardConfig;
pub use connection::server::CommandLoop;
pub use controllers::SystemController;
pub use embassy_time::{Duration, Instant};
pub use math::pulse::PulseRange;
