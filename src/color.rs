//! Device color model and level quantization.
//!
//! The color model says how many components a device has, how many levels
//! each can reproduce, and whether it is additive or subtractive. The
//! [`Quantizer`] turns a transferred intensity into a pair of adjacent device
//! levels plus the halftone level that mixes them; the tile path and the
//! threshold path both go through it so they agree pixel for pixel.

use crate::transfer::{byte_to_frac, TransferMap, FRAC_1};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Additive,
    Subtractive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorModel {
    pub num_components: usize,
    /// Component that carries gray, if any
    pub gray_index: Option<usize>,
    /// Levels per gray component (2 for bilevel)
    pub dither_grays: u32,
    /// Levels per non-gray component
    pub dither_colors: u32,
    pub polarity: Polarity,
}

impl ColorModel {
    pub fn gray(levels: u32) -> Self {
        let levels = levels.max(2);
        Self {
            num_components: 1,
            gray_index: Some(0),
            dither_grays: levels,
            dither_colors: levels,
            polarity: Polarity::Additive,
        }
    }

    pub fn rgb(levels: u32) -> Self {
        let levels = levels.max(2);
        Self {
            num_components: 3,
            gray_index: None,
            dither_grays: levels,
            dither_colors: levels,
            polarity: Polarity::Additive,
        }
    }

    pub fn cmyk(levels: u32) -> Self {
        let levels = levels.max(2);
        Self {
            num_components: 4,
            gray_index: Some(3),
            dither_grays: levels,
            dither_colors: levels,
            polarity: Polarity::Subtractive,
        }
    }

    /// Highest device level of `component`.
    pub fn max_value(&self, component: usize) -> u32 {
        let levels = if self.gray_index == Some(component) {
            self.dither_grays
        } else {
            self.dither_colors
        };
        levels.saturating_sub(1).max(1)
    }

    pub fn quantizer(&self, component: usize, num_levels: u32) -> Quantizer {
        Quantizer::new(num_levels, self.max_value(component))
    }
}

impl Default for ColorModel {
    fn default() -> Self {
        Self::gray(2)
    }
}

/// Result of quantizing one intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    /// Device level painted by halftone bits that are off
    pub base: u32,
    /// Index into the order's `levels` table; `levels[level]` bits are on
    /// and paint `base + 1`
    pub level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantizer {
    num_shades: u32,
    max_value: u32,
}

impl Quantizer {
    /// `num_levels` is the order's level count, `max_value` the component's
    /// highest device level.
    pub fn new(num_levels: u32, max_value: u32) -> Self {
        Self {
            num_shades: num_levels.saturating_sub(1),
            max_value: max_value.max(1),
        }
    }

    pub fn num_shades(&self) -> u32 {
        self.num_shades
    }

    pub fn quantize(&self, frac: u16) -> Quantized {
        if self.num_shades == 0 {
            return Quantized { base: 0, level: 0 };
        }
        let total = self.num_shades as u64 * self.max_value as u64;
        let s = frac.min(FRAC_1) as u64 * total / FRAC_1 as u64;
        if s >= total {
            Quantized {
                base: self.max_value - 1,
                level: self.num_shades,
            }
        } else {
            Quantized {
                base: (s / self.num_shades as u64) as u32,
                level: (s % self.num_shades as u64) as u32,
            }
        }
    }

    /// Quantize an 8-bit input, mapped through `transfer` when present.
    pub fn quantize_byte(&self, v: u8, transfer: Option<&TransferMap>) -> Quantized {
        let frac = match transfer {
            Some(map) => map.sample(v),
            None => byte_to_frac(v),
        };
        self.quantize(frac)
    }
}
