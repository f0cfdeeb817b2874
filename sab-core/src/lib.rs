//! Line-oriented serial command protocol and actuator drivers for small boards.
//!
//! For a runnable host simulation, see the `mock-mcu` crate under `sab-app/`.
#![no_std]

pub mod utils;
