//! Output wire frame
//!
//! One ASCII line per tick: `"<throttle>,<steer>:\n"`, both values with
//! exactly two decimals, e.g. `"0.35,-0.12:\n"`. The micro:bit program splits
//! on `,` and `:` so the layout must stay byte-stable.

use crate::domain::command::CommandValue;

/// Text of one frame, including the trailing newline
pub fn format_frame(value: &CommandValue) -> String {
    format!("{:.2},{:.2}:\n", value.throttle, value.steer)
}

pub fn encode_frame(value: &CommandValue) -> Vec<u8> {
    format_frame(value).into_bytes()
}
