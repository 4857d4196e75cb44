//! Bit-record packing strategies.
//!
//! An order's `bit_data` is a sequence of fixed-size little-endian records,
//! one per cell pixel in darkness order. The record format is chosen per
//! order:
//!
//! - [`Packing::Mask32`]: `offset:u32, mask:u32`. `offset` is the byte
//!   offset of a 32-bit unit in the tile bitmap, `mask` is applied to that
//!   unit read big-endian (so the most significant bit is the leftmost
//!   pixel). For cells of 16 pixels or less the mask repeats across the
//!   unit, which pre-replicates the tile horizontally.
//! - [`Packing::Index16`]: `pixel:u16`, the pixel index `y * width + x`.
//!   Compact, for cells of at most 65536 pixels.
//!
//! Bitmaps are MSB-first with rows padded to 64 bits.

use serde::Deserialize;

use crate::cache::bitmap_raster;
use crate::error::{HalftoneError, Result};

/// Number of bits in a [`Packing::Mask32`] unit.
pub const MASK_BITS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packing {
    #[default]
    Mask32,
    Index16,
}

impl Packing {
    pub const fn tag(self) -> u8 {
        match self {
            Packing::Mask32 => 0,
            Packing::Index16 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Packing::Mask32),
            1 => Some(Packing::Index16),
            _ => None,
        }
    }

    /// Bytes per record.
    pub const fn element_size(self) -> usize {
        match self {
            Packing::Mask32 => 8,
            Packing::Index16 => 2,
        }
    }

    /// Largest cell area (in pixels) the packing can address.
    pub const fn max_pixels(self) -> u64 {
        match self {
            Packing::Mask32 => u32::MAX as u64 / 8,
            Packing::Index16 => 1 << 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Packing::Mask32 => "mask32",
            Packing::Index16 => "index16",
        }
    }

    /// Write the record for pixel index `pixel` of a cell `width` pixels
    /// wide into `out` (exactly `element_size` bytes).
    pub fn encode(self, pixel: u32, width: u32, out: &mut [u8]) {
        match self {
            Packing::Mask32 => {
                let (offset, mask) = mask32_record(pixel, width);
                out[..4].copy_from_slice(&offset.to_le_bytes());
                out[4..8].copy_from_slice(&mask.to_le_bytes());
            }
            Packing::Index16 => {
                out[..2].copy_from_slice(&(pixel as u16).to_le_bytes());
            }
        }
    }

    /// Position `(x, y)` of the pixel a record turns on, or `None` if the
    /// record does not address a pixel of a `width x height` cell.
    pub fn position(self, record: &[u8], width: u32, height: u32) -> Option<(u32, u32)> {
        match self {
            Packing::Mask32 => {
                let (offset, mask) = read_mask32(record);
                if mask == 0 || offset % 4 != 0 {
                    return None;
                }
                let row_bits = bitmap_raster(width) as u64 * 8;
                let pix = offset as u64 * 8 + mask.leading_zeros() as u64;
                let (x, y) = (pix % row_bits, pix / row_bits);
                if x >= width as u64 || y >= height as u64 {
                    return None;
                }
                // the mask must be exactly the one this pixel encodes to
                let (x, y) = (x as u32, y as u32);
                (mask32_record(y * width + x, width) == (offset, mask)).then_some((x, y))
            }
            Packing::Index16 => {
                let pixel = u16::from_le_bytes([record[0], record[1]]) as u32;
                let (x, y) = (pixel % width, pixel / width);
                (y < height).then_some((x, y))
            }
        }
    }

    /// Flip the pixels of `record` in a tile bitmap with `raster` bytes per
    /// row.
    pub fn toggle(self, record: &[u8], width: u32, tile: &mut [u8], raster: usize) -> Result<()> {
        let tile_len = tile.len();
        match self {
            Packing::Mask32 => {
                let (offset, mask) = read_mask32(record);
                let start = offset as usize;
                let unit = tile.get_mut(start..start + 4).ok_or_else(|| {
                    HalftoneError::RenderFailed(format!(
                        "record offset {} outside {}-byte tile",
                        offset, tile_len
                    ))
                })?;
                let value = u32::from_be_bytes([unit[0], unit[1], unit[2], unit[3]]) ^ mask;
                unit.copy_from_slice(&value.to_be_bytes());
            }
            Packing::Index16 => {
                let pixel = u16::from_le_bytes([record[0], record[1]]) as u32;
                let (x, y) = (pixel % width, pixel / width);
                let byte = y as usize * raster + x as usize / 8;
                let b = tile.get_mut(byte).ok_or_else(|| {
                    HalftoneError::RenderFailed(format!(
                        "pixel {} outside {}-byte tile",
                        pixel, tile_len
                    ))
                })?;
                *b ^= 0x80 >> (x % 8);
            }
        }
        Ok(())
    }
}

fn read_mask32(record: &[u8]) -> (u32, u32) {
    (
        u32::from_le_bytes([record[0], record[1], record[2], record[3]]),
        u32::from_le_bytes([record[4], record[5], record[6], record[7]]),
    )
}

/// Offset and mask for pixel `pixel` of a cell `width` pixels wide.
pub const fn mask32_record(pixel: u32, width: u32) -> (u32, u32) {
    let row_bits = (width as u64).div_ceil(64) * 64;
    let padding = row_bits - width as u64;
    let pix = pixel as u64 + pixel as u64 / width as u64 * padding;
    let offset = ((pix >> 3) & !3) as u32;
    let mut mask: u32 = 1 << (!pix & (MASK_BITS as u64 - 1));
    if width < MASK_BITS {
        let mut rest = MASK_BITS as i64 - width as i64;
        loop {
            rest -= width as i64;
            if rest < 0 {
                break;
            }
            mask |= mask >> width;
        }
    }
    (offset, mask)
}
