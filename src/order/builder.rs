//! Order construction.
//!
//! Building an order takes three steps: allocate the arrays, sort the cell
//! pixels by their sample value, then turn pixel indices into packed bit
//! records. Screen orders sampled as one shifted strip add a replication
//! step in between.

use std::rc::Rc;

use ht_screen::CellSamples;

use super::{CellOrder, OrderData, OrderGeometry, Packing};
use crate::error::{HalftoneError, Result};
use crate::memory::Memory;
use crate::transfer::TransferMap;

/// Sample value and pixel index of one cell pixel during construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct HtBit {
    value: u32,
    index: u32,
}

/// An order under construction. Nothing is visible to callers until
/// [`OrderBuilder::derive_positions`] returns the finished [`CellOrder`].
pub struct OrderBuilder<'m> {
    memory: &'m Memory,
    geometry: OrderGeometry,
    packing: Packing,
    levels: Vec<u32>,
    bits: Vec<HtBit>,
    sorted: usize,
    transfer: Option<Rc<TransferMap>>,
}

impl<'m> OrderBuilder<'m> {
    /// Allocate `levels` and bit arrays sized exactly to `geometry`.
    pub fn allocate(memory: &'m Memory, geometry: OrderGeometry, packing: Packing) -> Result<Self> {
        geometry.check(packing)?;
        let levels = memory.alloc_vec(geometry.num_levels as usize, 0u32, "order levels")?;
        let bits = memory.alloc_vec(geometry.num_bits as usize, HtBit::default(), "order bits")?;
        Ok(Self {
            memory,
            geometry,
            packing,
            levels,
            bits,
            sorted: 0,
            transfer: None,
        })
    }

    pub fn with_transfer(mut self, transfer: Option<Rc<TransferMap>>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Sort the first `samples.len()` pixels by ascending sample value.
    ///
    /// Pixel `i` gets sample `samples[i]`; equal samples keep pixel index
    /// order so the result does not depend on the sort algorithm.
    pub fn sort_by_darkness(&mut self, samples: &[u32]) -> Result<()> {
        if samples.len() > self.bits.len() {
            return Err(HalftoneError::InvalidOrder(format!(
                "{} samples for {} bits",
                samples.len(),
                self.bits.len()
            )));
        }
        for (i, (bit, &value)) in self.bits.iter_mut().zip(samples).enumerate() {
            *bit = HtBit {
                value,
                index: i as u32,
            };
        }
        self.bits[..samples.len()].sort_unstable_by_key(|b| (b.value, b.index));
        self.sorted = samples.len();
        Ok(())
    }

    /// Fill `levels` for a complete order: one more pixel per level.
    fn complete_levels(&mut self) {
        for (i, level) in self.levels.iter_mut().enumerate() {
            *level = (i as u32).min(self.geometry.num_bits);
        }
    }

    /// Expand a sorted strip of `width x height` pixels to all `num_bits`
    /// positions.
    ///
    /// Each sorted strip pixel becomes `num_bits / strip` consecutive bits,
    /// one per strip repetition; every repetition sits one strip lower and
    /// `shift` columns further left. The level table steps by the same
    /// factor. If the repetitions cover the full tile, the order becomes an
    /// unshifted order of the full height.
    pub fn replicate_strip(&mut self) -> Result<()> {
        let width = self.geometry.width;
        let strip = self.sorted as u32;
        if strip == 0 || strip % width != 0 || self.geometry.num_bits % strip != 0 {
            return Err(HalftoneError::InvalidOrder(format!(
                "cannot replicate {} sorted bits of width {} into {} bits",
                strip, width, self.geometry.num_bits
            )));
        }
        if self.levels.len() != strip as usize + 1 {
            return Err(HalftoneError::InvalidOrder(format!(
                "{} levels for a {}-pixel strip",
                self.levels.len(),
                strip
            )));
        }
        let copies = self.geometry.num_bits / strip;
        let shift = self.geometry.shift;

        for (i, level) in self.levels.iter_mut().enumerate() {
            *level = i as u32 * copies;
        }
        let mut bp = self.bits.len();
        for i in (0..strip as usize).rev() {
            let offset = self.bits[i].index;
            let mut x = offset % width;
            let mut hy = offset - x;
            for _ in 0..copies {
                bp -= 1;
                self.bits[bp].index = hy + x;
                hy += strip;
                x = (x + width - shift) % width;
            }
        }

        let full_height = self.geometry.full_height();
        if self.geometry.num_bits as u64 == width as u64 * full_height as u64 {
            self.geometry.height = full_height;
            self.geometry.shift = 0;
        }
        tracing::debug!(
            width,
            height = self.geometry.height,
            copies,
            "Replicated order strip"
        );
        Ok(())
    }

    /// Pack every pixel index into a bit record and return the finished
    /// order.
    pub fn derive_positions(self) -> Result<CellOrder> {
        let g = self.geometry;
        let area = g.width as u64 * g.height as u64;
        let size = self.packing.element_size();
        let mut records = self
            .memory
            .alloc_vec(self.bits.len() * size, 0u8, "order bit records")?;
        for (bit, out) in self.bits.iter().zip(records.chunks_exact_mut(size)) {
            if bit.index as u64 >= area {
                return Err(HalftoneError::InvalidOrder(format!(
                    "pixel {} outside {}x{} cell",
                    bit.index, g.width, g.height
                )));
            }
            self.packing.encode(bit.index, g.width, out);
        }
        CellOrder::from_parts(
            self.memory.id(),
            g,
            self.packing,
            OrderData::owned(self.levels),
            OrderData::owned(records),
            self.transfer,
        )
    }

    /// Build a complete order from one threshold value per pixel; pixels
    /// with lower values turn on first.
    pub fn from_thresholds(
        memory: &'m Memory,
        width: u32,
        height: u32,
        values: &[u32],
        packing: Packing,
    ) -> Result<CellOrder> {
        if values.len() as u64 != width as u64 * height as u64 || values.len() >= u32::MAX as usize {
            return Err(HalftoneError::InvalidOrder(format!(
                "{} thresholds for a {}x{} cell",
                values.len(),
                width,
                height
            )));
        }
        let geometry = OrderGeometry::complete(width, height);
        let mut builder = Self::allocate(memory, geometry, packing)?;
        builder.sort_by_darkness(values)?;
        builder.complete_levels();
        builder.derive_positions()
    }

    /// Build an order from spot samples of one screen strip.
    ///
    /// When the whole unshifted tile fits in `max_order_bytes` the strip is
    /// replicated to the full height; otherwise the order keeps the strip
    /// and its shift.
    pub fn from_screen(
        memory: &'m Memory,
        cell: &CellSamples,
        max_order_bytes: usize,
        packing: Packing,
    ) -> Result<CellOrder> {
        let strip = cell.width as u64 * cell.strip_height as u64;
        if cell.samples.len() as u64 != strip {
            return Err(HalftoneError::InvalidOrder(format!(
                "{} samples for a {}x{} strip",
                cell.samples.len(),
                cell.width,
                cell.strip_height
            )));
        }
        let full = cell.width as u64 * cell.full_height as u64;
        let full_bytes = crate::cache::bitmap_raster(cell.width) as u64 * cell.full_height as u64;
        let num_bits = if full_bytes <= max_order_bytes as u64 && full <= packing.max_pixels() {
            full
        } else {
            strip
        };
        let geometry = OrderGeometry {
            width: cell.width,
            height: cell.strip_height,
            shift: cell.shift,
            num_levels: u32::try_from(strip + 1)
                .map_err(|_| HalftoneError::InvalidOrder("strip too large".into()))?,
            num_bits: u32::try_from(num_bits)
                .map_err(|_| HalftoneError::InvalidOrder("cell too large".into()))?,
        };
        let mut builder = Self::allocate(memory, geometry, packing)?;
        builder.sort_by_darkness(&cell.samples)?;
        builder.replicate_strip()?;
        let order = builder.derive_positions()?;
        tracing::debug!(
            width = order.width(),
            height = order.height(),
            shift = order.shift(),
            num_bits = order.num_bits(),
            "Built screen order"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ht_screen::{sample_spot, CellParams, SpotFunction};

    #[test]
    fn test_allocate_failure_releases_everything() {
        let memory = Memory::new();
        memory.fail_after(1);
        let err = OrderBuilder::allocate(&memory, OrderGeometry::complete(4, 4), Packing::Mask32)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let memory = Memory::new();
        let values = [5, 1, 5, 1, 0, 5];
        let order = OrderBuilder::from_thresholds(&memory, 3, 2, &values, Packing::Index16).unwrap();
        let positions: Vec<(u32, u32)> = (0..6).map(|i| order.bit_index(i).unwrap()).collect();
        assert_eq!(
            positions,
            vec![(1, 1), (1, 0), (0, 1), (0, 0), (2, 0), (2, 1)]
        );
        assert_eq!(order.levels(), &[0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_threshold_count_mismatch() {
        let memory = Memory::new();
        let err = OrderBuilder::from_thresholds(&memory, 4, 4, &[0; 15], Packing::Mask32).unwrap_err();
        assert!(matches!(err, HalftoneError::InvalidOrder(_)));
    }

    #[test]
    fn test_replicate_shifted_strip_to_full_tile() {
        // 4 wide, 1 high strip, shifted by 1 per strip: full height 4
        let memory = Memory::new();
        let cell = CellSamples {
            width: 4,
            strip_height: 1,
            full_height: 4,
            shift: 1,
            samples: vec![30, 10, 40, 20],
        };
        let order = OrderBuilder::from_screen(&memory, &cell, 1024, Packing::Mask32).unwrap();
        assert_eq!((order.width(), order.height(), order.shift()), (4, 4, 0));
        assert_eq!(order.num_bits(), 16);
        assert_eq!(order.levels(), &[0, 4, 8, 12, 16]);
        // lowest sample is pixel 1; its copies walk one column left per row
        let first: Vec<(u32, u32)> = (0..4).map(|i| order.bit_index(i).unwrap()).collect();
        assert_eq!(first, vec![(2, 3), (3, 2), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_strip_kept_when_tile_too_large() {
        let memory = Memory::new();
        let cell = CellSamples {
            width: 4,
            strip_height: 1,
            full_height: 4,
            shift: 1,
            samples: vec![30, 10, 40, 20],
        };
        let order = OrderBuilder::from_screen(&memory, &cell, 16, Packing::Mask32).unwrap();
        assert_eq!((order.width(), order.height(), order.shift()), (4, 1, 1));
        assert_eq!(order.full_height(), 4);
        assert_eq!(order.levels(), &[0, 1, 2, 3, 4]);
        assert_eq!(order.bit_index(0).unwrap(), (1, 0));
    }

    #[test]
    fn test_screen_order_is_permutation() {
        let memory = Memory::new();
        let params = CellParams::square(3, 2, 1).unwrap();
        let cell = sample_spot(&params, SpotFunction::Round).unwrap();
        let order = OrderBuilder::from_screen(&memory, &cell, 1 << 20, Packing::Mask32).unwrap();
        let area = (order.width() * order.height()) as usize;
        assert_eq!(order.num_bits() as usize, area);
        let mut seen = vec![false; area];
        for i in 0..order.num_bits() {
            let (x, y) = order.bit_index(i).unwrap();
            let p = (y * order.width() + x) as usize;
            assert!(!seen[p], "pixel {p} twice");
            seen[p] = true;
        }
        assert_eq!(*order.levels().last().unwrap(), order.num_bits());
    }
}
