pub mod screen_builder;

pub use screen_builder::{BuildError, BuiltScreen, ScreenBuilder};
