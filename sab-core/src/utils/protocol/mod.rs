//! Text protocol spoken over the link.
//!
//! One ASCII command per line in, exactly one reply line out.
//!
//! - `command`: parsed command values and the leading-integer parser
//! - `grammar`: which command forms a board accepts and how lines map to them
//! - `reply`: the reply lines sent back to the peer

pub mod command;
pub mod grammar;
pub mod reply;

pub use command::{Command, CommandError, LedAction, LightAction};
pub use grammar::{Capabilities, LedSyntax};
pub use reply::Reply;
