mod png;
mod ramp;

pub use png::{encode_gray8, encode_levels};
pub use ramp::{ramp_value, ramp_with_threshold, ramp_with_tiles, LevelImage};
