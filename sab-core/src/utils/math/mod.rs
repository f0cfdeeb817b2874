//! Math helpers for actuator outputs.
//!
//! - `pulse`: linear percentage to pulse-width mapping with clamping.

pub mod pulse;
