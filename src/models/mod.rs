pub mod config;

pub use config::{ColorKind, ColorModelConfig, HalftoneConfig, ScreenConfig};
