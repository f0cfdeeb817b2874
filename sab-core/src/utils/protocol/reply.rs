//! Reply lines written back to the peer.

use core::fmt::Write;

/// Longest reply line, without the line terminator.
pub const REPLY_CAPACITY: usize = 192;

/// One reply line.
pub type Reply = heapless::String<REPLY_CAPACITY>;

fn format(args: core::fmt::Arguments<'_>) -> Reply {
    let mut reply = Reply::new();
    // every reply built here is far below REPLY_CAPACITY
    let _ = reply.write_fmt(args);
    reply
}

fn level(high: bool) -> &'static str {
    if high {
        "HIGH"
    } else {
        "LOW"
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// `LED<idx> is HIGH|LOW`
pub fn led_level(
    index: usize,
    high: bool,
) -> Reply {
    format(format_args!("LED{index} is {}", level(high)))
}

/// `LED<idx> toggled to HIGH|LOW`
pub fn led_toggled(
    index: usize,
    high: bool,
) -> Reply {
    format(format_args!("LED{index} toggled to {}", level(high)))
}

/// `LED is ON|OFF`
pub fn led_switched(on: bool) -> Reply {
    format(format_args!("LED is {}", on_off(on)))
}

/// `Throttle set to <raw>%`, echoing the value as sent, not as clamped.
pub fn throttle(raw: i32) -> Reply {
    format(format_args!("Throttle set to {raw}%"))
}

/// `LIGHT is ON|OFF`
pub fn light(on: bool) -> Reply {
    format(format_args!("LIGHT is {}", on_off(on)))
}

/// Sent when a driver reported a hardware error.
pub fn actuator_fault() -> Reply {
    format(format_args!("Actuator fault."))
}
