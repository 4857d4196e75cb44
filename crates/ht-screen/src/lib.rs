//! Halftone screen geometry for threshold-order construction.
//!
//! This crate turns a screen request (frequency, angle, resolution) into a
//! rational cell and samples a spot function over it. The resulting
//! [`CellSamples`] carry everything a halftone order needs: strip width and
//! height, the per-strip shift, and one priority value per pixel.
//!
//! # Quick Start
//!
//! ```
//! use ht_screen::{pick_cell, sample_spot, ScreenRequest, SpotFunction};
//!
//! let request = ScreenRequest {
//!     frequency: 75.0,
//!     angle: 0.0,
//!     resolution: 600.0,
//!     ..ScreenRequest::default()
//! };
//! let cell = pick_cell(&request).unwrap();
//! let samples = sample_spot(&cell.params, SpotFunction::Round).unwrap();
//! assert_eq!(samples.samples.len(), 64);
//! ```

pub mod cell;
pub mod error;
pub mod sampler;
pub mod spot;

pub use cell::{bitmap_raster, full_height, gcd, pick_cell, CellParams, CellSelection, ScreenRequest};
pub use error::ScreenError;
pub use sampler::{sample_spot, sample_with, CellSamples, Matrix, MAX_HT_SAMPLE};
pub use spot::SpotFunction;

/// Pick a cell for `request` and sample `spot` over it.
pub fn build_screen(
    request: &ScreenRequest,
    spot: SpotFunction,
) -> Result<(CellSelection, CellSamples), ScreenError> {
    let selection = pick_cell(request)?;
    let samples = sample_spot(&selection.params, spot)?;
    Ok((selection, samples))
}
