//! Threshold arrays.
//!
//! A threshold array stores, for every pixel of the unshifted tile, the
//! lowest 8-bit input level at which that pixel turns on. Comparing an input
//! row against it gives the same pixels the tile cache would paint, without
//! rendering a tile per level.

use super::CellOrder;
use crate::color::{ColorModel, Polarity};
use crate::error::{HalftoneError, Result};
use crate::memory::Memory;
use crate::transfer::TransferMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdArray {
    width: u32,
    height: u32,
    data: Vec<u8>,
    max_value: u32,
    subtractive: bool,
    transfer_inverted: bool,
}

impl ThresholdArray {
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Rows in the array; the full height of the order.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw values, stored inverted for subtractive color models.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_subtractive(&self) -> bool {
        self.subtractive
    }

    /// Highest device level of the component the array was derived for.
    pub fn max_value(&self) -> u32 {
        self.max_value
    }

    /// Whether this array quantizes like `component` of `model`.
    pub fn fits(&self, model: &ColorModel, component: usize) -> bool {
        self.max_value == model.max_value(component)
            && self.subtractive == (model.polarity == Polarity::Subtractive)
    }

    /// True when the transfer function was decreasing, so thresholds count
    /// down from 255.
    pub fn is_transfer_inverted(&self) -> bool {
        self.transfer_inverted
    }

    /// Lowest level (after undoing any polarity inversion) at which the
    /// pixel at `(x, y)` of the tile turns on.
    pub fn threshold_at(&self, x: u32, y: u32) -> u8 {
        let x = x % self.width;
        let y = y % self.height;
        let raw = self.data[y as usize * self.width as usize + x as usize];
        if self.subtractive {
            255 - raw
        } else {
            raw
        }
    }

    /// Whether input level `v` turns on the pixel at `(x, y)`.
    pub fn is_on(&self, v: u8, x: u32, y: u32) -> bool {
        let v = if self.transfer_inverted { 255 - v } else { v };
        v >= self.threshold_at(x, y)
    }

    /// Halftone one row of 8-bit input starting at device column `x`,
    /// writing MSB-first packed bits to `out`.
    pub fn threshold_row(&self, input: &[u8], x: u32, y: u32, out: &mut [u8]) -> Result<()> {
        let needed = input.len().div_ceil(8);
        if out.len() < needed {
            return Err(HalftoneError::BufferTooSmall {
                required: needed,
                available: out.len(),
            });
        }
        out[..needed].fill(0);
        let phase = x % self.width;
        for (i, &v) in input.iter().enumerate() {
            let col = (phase as u64 + i as u64) % self.width as u64;
            if self.is_on(v, col as u32, y) {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Ok(())
    }
}

/// Derive the threshold array of `order` for `component` of `model`.
///
/// Every input level is quantized exactly as the tile path does; the pixels
/// that a level adds to the rendered tile get that level as threshold.
/// A byte cannot say "never", so orders whose last level leaves pixels off
/// are rejected.
pub fn derive_threshold(
    memory: &Memory,
    order: &CellOrder,
    model: &ColorModel,
    component: usize,
    transfer: Option<&TransferMap>,
) -> Result<ThresholdArray> {
    let width = order.width();
    let height = order.height();
    let full_height = order.full_height();
    let shift = order.shift() as u64;
    let levels = order.levels();
    if levels.last() != Some(&order.num_bits()) {
        return Err(HalftoneError::InvalidOrder(format!(
            "last level {:?} leaves pixels of {} never painted",
            levels.last(),
            order.num_bits()
        )));
    }
    let len = width as usize * full_height as usize;
    let mut data = memory.alloc_vec(len, 255u8, "threshold array")?;

    let quantizer = model.quantizer(component, order.num_levels());
    let transfer_inverted = transfer.is_some_and(TransferMap::is_decreasing);
    let shade_of = |u: u8| {
        let v = if transfer_inverted { 255 - u } else { u };
        let q = quantizer.quantize_byte(v, transfer);
        if q.base > 0 {
            quantizer.num_shades()
        } else {
            q.level
        }
    };

    let num_repeat = (full_height / height) as u64;
    let mut on = 0u32;
    for u in 0..=255u8 {
        let target = levels[shade_of(u) as usize];
        while on < target {
            let (x, y) = order.bit_index(on)?;
            for kk in 0..num_repeat {
                let row = y as u64 + kk * height as u64;
                let col = (x as u64 + kk * (width as u64 - shift)) % width as u64;
                data[(row * width as u64 + col) as usize] = u;
            }
            on += 1;
        }
    }

    let subtractive = model.polarity == Polarity::Subtractive;
    if subtractive {
        data.iter_mut().for_each(|t| *t = 255 - *t);
    }
    tracing::debug!(
        width,
        height = full_height,
        subtractive,
        transfer_inverted,
        "Derived threshold array"
    );
    Ok(ThresholdArray {
        width,
        height: full_height,
        data,
        max_value: model.max_value(component),
        subtractive,
        transfer_inverted,
    })
}
