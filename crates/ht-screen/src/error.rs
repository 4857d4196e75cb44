//! Error types for screen construction
//!
//! Screens are built from user-supplied frequency, angle and spot
//! parameters, so every failure here is a parameter problem rather than
//! an internal one.

use std::fmt;

/// Error type for screen cell selection and spot sampling.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenError {
    /// Requested frequency is below the supported minimum (0.1 lpi)
    FrequencyTooLow(f64),
    /// Cell vectors are collinear or zero, so the cell has no area
    DegenerateCell,
    /// No cell within the size limit reaches the requested level count
    NoCellFits {
        /// Byte limit for one strip of the cell bitmap
        max_size: usize,
    },
    /// The spot function returned a value outside -1.0..=1.0
    SpotOutOfRange {
        /// Offending value
        value: f64,
        /// Column of the sample in the cell
        x: u32,
        /// Row of the sample in the cell
        y: u32,
    },
    /// Spot function name is not known
    UnknownSpot(String),
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenError::FrequencyTooLow(freq) => {
                write!(f, "screen frequency {} is below the 0.1 minimum", freq)
            }
            ScreenError::DegenerateCell => write!(f, "screen cell has zero area"),
            ScreenError::NoCellFits { max_size } => {
                write!(f, "no screen cell fits in {} bytes", max_size)
            }
            ScreenError::SpotOutOfRange { value, x, y } => write!(
                f,
                "spot function value {} at ({}, {}) is outside -1..1",
                value, x, y
            ),
            ScreenError::UnknownSpot(name) => write!(f, "unknown spot function '{}'", name),
        }
    }
}

impl std::error::Error for ScreenError {}
