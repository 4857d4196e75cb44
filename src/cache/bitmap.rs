//! Tile bitmaps.
//!
//! Bitmaps are MSB-first, one bit per pixel, with each row padded to a
//! multiple of 64 bits.

pub use ht_screen::bitmap_raster;

#[inline]
pub(crate) fn get_bit(row: &[u8], x: usize) -> bool {
    row[x / 8] & (0x80 >> (x % 8)) != 0
}

#[inline]
pub(crate) fn set_bit(row: &mut [u8], x: usize) {
    row[x / 8] |= 0x80 >> (x % 8);
}

/// Widen a tile in place from `width` pixels at `src_raster` bytes per row
/// to `dst_width` pixels at `dst_raster`, repeating each row.
///
/// Rows are processed bottom-up so the source rows are read before the
/// wider destination rows overwrite them. `scratch` must hold `src_raster`
/// bytes.
pub(crate) fn replicate_horizontally(
    tile: &mut [u8],
    width: u32,
    height: u32,
    src_raster: usize,
    dst_width: u32,
    dst_raster: usize,
    scratch: &mut [u8],
) {
    let scratch = &mut scratch[..src_raster];
    for y in (0..height as usize).rev() {
        scratch.copy_from_slice(&tile[y * src_raster..(y + 1) * src_raster]);
        let dst = &mut tile[y * dst_raster..(y + 1) * dst_raster];
        dst.fill(0);
        for x in 0..dst_width as usize {
            if get_bit(scratch, x % width as usize) {
                set_bit(dst, x);
            }
        }
    }
}

/// A rendered halftone tile, borrowed from a tile cache slot.
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    pub data: &'a [u8],
    /// Bytes per row
    pub raster: usize,
    /// Width of the stored bitmap; a whole multiple of `rep_width`
    pub size_x: u32,
    pub size_y: u32,
    /// Width of one cell repetition
    pub rep_width: u32,
    pub rep_height: u32,
    /// Columns each strip of `rep_height` rows sits left of the one above
    pub shift: u32,
    /// Identifies the rendered level to downstream consumers
    pub id: u64,
    /// Number of cell bits on
    pub level: u32,
}

impl Tile<'_> {
    /// Pixel `(x, y)` of the stored bitmap.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.size_x || y >= self.size_y {
            return false;
        }
        get_bit(self.row(y), x as usize)
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.raster;
        &self.data[start..start + self.raster]
    }

    /// Pixel at device position `(x, y)` when the tile is laid over the
    /// page, taking the strip shift into account.
    pub fn sample(&self, x: u64, y: u64) -> bool {
        let strip = y / self.rep_height as u64;
        let row = (y % self.rep_height as u64) as u32;
        let offset = (strip % self.rep_width as u64) * self.shift as u64;
        let col = ((x + offset) % self.rep_width as u64) as u32;
        self.get(col, row)
    }

    /// Number of pixels on in one cell repetition.
    pub fn count_on(&self) -> usize {
        (0..self.rep_height)
            .map(|y| {
                let row = self.row(y);
                (0..self.rep_width as usize)
                    .filter(|&x| get_bit(row, x))
                    .count()
            })
            .sum()
    }
}
