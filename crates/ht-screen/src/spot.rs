//! Built-in spot functions.
//!
//! A spot function maps a point of the unit cell (`-1..1` in both axes) to
//! a value in `-1..=1`. Pixels with higher values turn on first as the
//! gray level rises, so the function's contour lines are the dot shapes.

use std::fmt;
use std::str::FromStr;

use crate::error::ScreenError;

/// A named spot shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpotFunction {
    /// Circular dot
    #[default]
    Round,
    /// Round dot that becomes a square at 50% and inverts above it
    Euclidean,
    /// Elliptical dot, slightly elongated vertically
    Ellipse,
    /// Horizontal lines
    Line,
    /// Diamond dot
    Diamond,
    /// Square dot
    Square,
    /// Cross-shaped dot
    Cross,
}

impl SpotFunction {
    /// Every built-in spot function.
    pub const ALL: [SpotFunction; 7] = [
        SpotFunction::Round,
        SpotFunction::Euclidean,
        SpotFunction::Ellipse,
        SpotFunction::Line,
        SpotFunction::Diamond,
        SpotFunction::Square,
        SpotFunction::Cross,
    ];

    /// Evaluate the spot at `(x, y)` with both coordinates in `-1..1`.
    pub fn evaluate(self, x: f64, y: f64) -> f64 {
        let (ax, ay) = (x.abs(), y.abs());
        match self {
            SpotFunction::Round => 1.0 - (x * x + y * y),
            SpotFunction::Euclidean => {
                if ax + ay <= 1.0 {
                    1.0 - (x * x + y * y)
                } else {
                    (ax - 1.0) * (ax - 1.0) + (ay - 1.0) * (ay - 1.0) - 1.0
                }
            }
            SpotFunction::Ellipse => 1.0 - (x * x + 0.9 * y * y) / 1.9 * 2.0,
            SpotFunction::Line => -ay,
            SpotFunction::Diamond => 1.0 - (ax + ay),
            SpotFunction::Square => -ax.max(ay),
            SpotFunction::Cross => -ax.min(ay),
        }
    }

    /// Lower-case name as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            SpotFunction::Round => "round",
            SpotFunction::Euclidean => "euclidean",
            SpotFunction::Ellipse => "ellipse",
            SpotFunction::Line => "line",
            SpotFunction::Diamond => "diamond",
            SpotFunction::Square => "square",
            SpotFunction::Cross => "cross",
        }
    }
}

impl fmt::Display for SpotFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpotFunction {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        SpotFunction::ALL
            .into_iter()
            .find(|spot| spot.name() == lower)
            .ok_or_else(|| ScreenError::UnknownSpot(s.to_string()))
    }
}
