//! Rendered tile cache.
//!
//! A [`TileCache`] holds a fixed number of rendered tiles for one order. Each
//! slot remembers how many of the order's bits it has on; asking for a level
//! renders into the slot only when that count differs. When there are fewer
//! slots than levels, neighbouring levels share a slot and evict each other.

mod bitmap;

use serde::Deserialize;

pub use bitmap::{bitmap_raster, Tile};

use crate::error::{HalftoneError, Result};
use crate::memory::{next_ids, Memory};
use crate::order::{CellOrder, OrderData, Packing, MASK_BITS};

/// Row alignment of replicated tiles, in bytes.
const ALIGN_BITMAP: usize = 8;

/// Most cell repetitions a replicated tile carries.
const MAX_REP_COUNT: usize = 64;

/// Byte and slot limits for caches attached at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheBudget {
    pub bits_size: usize,
    pub max_tiles: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            bits_size: 32 * 1024,
            max_tiles: 1024,
        }
    }
}

impl CacheBudget {
    /// Arena size and slot count for a cache serving `order`.
    ///
    /// Small cells get fewer slots than the budget allows, leaving room for
    /// horizontal replication without allocating slots that no level uses.
    pub fn sized_for(&self, order: &CellOrder) -> (usize, usize) {
        let width = order.width() as u64;
        let height = order.height() as u64;
        let tile_bytes = (order.raster() as u64 * (order.num_bits() as u64 / width).max(1)).max(1);
        let mut num_tiles = 1 + self.bits_size as u64 / tile_bytes;
        let slots_wanted = 1 + width * height;
        let rep_raster =
            ((num_tiles * tile_bytes) / height / slots_wanted) & !(ALIGN_BITMAP as u64 - 1);
        let rep_count = rep_raster * 8 / width;
        let limit = 1 + num_tiles * MAX_REP_COUNT as u64 / rep_count.max(1);
        if rep_count > MAX_REP_COUNT as u64 && num_tiles > limit {
            num_tiles = limit;
        }
        let num_tiles = num_tiles.min(self.max_tiles.max(1) as u64);
        ((tile_bytes * num_tiles) as usize, num_tiles as usize)
    }
}

/// One cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileSlot {
    /// Number of order bits on in the slot's bitmap; 0 for a fresh slot
    pub level: u32,
    pub index: usize,
    pub id: u64,
}

/// The order a cache is built for. The arrays alias the order's own.
#[derive(Debug)]
struct BoundOrder {
    width: u32,
    height: u32,
    raster: usize,
    shift: u32,
    num_levels: u32,
    packing: Packing,
    levels: OrderData<u32>,
    bit_data: OrderData<u8>,
}

impl BoundOrder {
    /// Toggle records `lo..hi` in a tile laid out at `raster` bytes per row.
    fn toggle_range(&self, lo: u32, hi: u32, tile: &mut [u8], raster: usize) -> Result<()> {
        let size = self.packing.element_size();
        for i in lo as usize..hi as usize {
            let record = self.bit_data.get(i * size..(i + 1) * size).ok_or_else(|| {
                HalftoneError::RenderFailed(format!("bit {} beyond order data", i))
            })?;
            self.packing.toggle(record, self.width, tile, raster)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TileCache {
    bits: Vec<u8>,
    slots: Vec<TileSlot>,
    max_tiles: usize,
    num_cached: usize,
    levels_per_tile: u32,
    tile_bytes: usize,
    tile_raster: usize,
    width_unit: u32,
    replicated: bool,
    base_id: u64,
    renders: u64,
    scratch: Vec<u8>,
    order: Option<BoundOrder>,
}

impl TileCache {
    /// Allocate an unbound cache of at most `max_tiles` slots over a
    /// `bits_size`-byte arena.
    pub fn allocate(memory: &Memory, max_tiles: usize, bits_size: usize) -> Result<Self> {
        let max_tiles = max_tiles.max(1);
        let bits = memory.alloc_vec(bits_size, 0u8, "tile cache bits")?;
        let slots = memory.alloc_vec(max_tiles, TileSlot::default(), "tile cache slots")?;
        Ok(Self {
            bits,
            slots,
            max_tiles,
            num_cached: 0,
            levels_per_tile: 1,
            tile_bytes: 0,
            tile_raster: 0,
            width_unit: 0,
            replicated: false,
            base_id: 0,
            renders: 0,
            scratch: Vec::new(),
            order: None,
        })
    }

    /// Allocate a cache and bind it to `order`.
    pub fn attach(memory: &Memory, order: &CellOrder, bits_size: usize, max_tiles: usize) -> Result<Self> {
        let mut cache = Self::allocate(memory, max_tiles, bits_size)?;
        cache.init(order)?;
        Ok(cache)
    }

    /// Bind the cache to `order`, dropping every rendered tile.
    pub fn init(&mut self, order: &CellOrder) -> Result<()> {
        self.order = None;
        let width = order.width();
        let height = order.height();
        let raster = order.raster();
        let size = (width as u64 * height as u64).max(order.num_bits() as u64) + 1;
        let mut width_unit = if order.packing() == Packing::Mask32 && width <= MASK_BITS / 2 {
            MASK_BITS / width * width
        } else {
            width
        };
        let mut tile_raster = raster;
        let mut tile_bytes = raster * height as usize;

        if self.bits.len() < tile_bytes {
            let extra = tile_bytes - self.bits.len();
            self.bits
                .try_reserve_exact(extra)
                .map_err(|_| HalftoneError::OutOfMemory {
                    what: "tile cache bits",
                    requested: tile_bytes,
                })?;
            self.bits.resize(tile_bytes, 0);
        }
        let num_cached = (self.bits.len() / tile_bytes)
            .min(self.max_tiles)
            .min(size.min(usize::MAX as u64) as usize)
            .max(1);

        let mut replicated = false;
        if num_cached as u64 == size && tile_bytes * num_cached <= self.bits.len() / 2 {
            let rep_raster = ((self.bits.len() / num_cached) / height as usize) & !(ALIGN_BITMAP - 1);
            let rep_count = (rep_raster * 8 / width as usize).min(MAX_REP_COUNT);
            width_unit = width * rep_count as u32;
            tile_raster = bitmap_raster(width_unit);
            tile_bytes = tile_raster * height as usize;
            replicated = tile_raster > raster;
        }

        self.scratch.clear();
        self.scratch
            .try_reserve_exact(raster)
            .map_err(|_| HalftoneError::OutOfMemory {
                what: "tile cache scratch",
                requested: raster,
            })?;
        self.scratch.resize(raster, 0);

        self.base_id = next_ids(order.num_levels() as u64 + 1);
        self.num_cached = num_cached;
        self.levels_per_tile = size.div_ceil(num_cached as u64) as u32;
        self.tile_bytes = tile_bytes;
        self.tile_raster = tile_raster;
        self.width_unit = width_unit;
        self.replicated = replicated;
        self.bits.fill(0);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = TileSlot {
                level: 0,
                index: i,
                id: self.base_id,
            };
        }
        self.order = Some(BoundOrder {
            width,
            height,
            raster,
            shift: order.shift(),
            num_levels: order.num_levels(),
            packing: order.packing(),
            levels: order.levels_shared().clone(),
            bit_data: order.bits_shared().clone(),
        });
        tracing::debug!(
            width,
            height,
            num_cached,
            levels_per_tile = self.levels_per_tile,
            replicated,
            "Initialized tile cache"
        );
        Ok(())
    }

    /// True when the cache was built for exactly this order's arrays.
    pub fn is_bound_to(&self, order: &CellOrder) -> bool {
        self.order.as_ref().is_some_and(|b| {
            b.bit_data.same_as(order.bits_shared())
                && b.levels.same_as(order.levels_shared())
                && b.width == order.width()
                && b.height == order.height()
                && b.packing == order.packing()
        })
    }

    pub fn num_cached(&self) -> usize {
        self.num_cached
    }

    pub fn levels_per_tile(&self) -> u32 {
        self.levels_per_tile
    }

    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// Width and height of a stored tile.
    pub fn tile_size(&self) -> (u32, u32) {
        (
            self.width_unit,
            self.order.as_ref().map_or(0, |b| b.height),
        )
    }

    pub fn bits_size(&self) -> usize {
        self.bits.len()
    }

    pub fn slots(&self) -> &[TileSlot] {
        &self.slots[..self.num_cached]
    }

    /// Number of renders performed since the cache was created.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    fn bound(&self) -> Result<&BoundOrder> {
        self.order
            .as_ref()
            .ok_or_else(|| HalftoneError::Invariant("tile cache is not bound to an order".into()))
    }

    /// Slot that serves level index `b_level`.
    pub fn slot_index(&self, b_level: u32) -> Result<usize> {
        let order = self.bound()?;
        let level = *order.levels.get(b_level as usize).ok_or_else(|| {
            HalftoneError::InvalidOrder(format!("level {} of {}", b_level, order.num_levels))
        })?;
        Ok(if (self.num_cached as u64) < order.num_levels as u64 {
            (level / self.levels_per_tile) as usize
        } else {
            b_level as usize
        })
    }

    /// Tile for level index `b_level`, rendered if its slot holds another
    /// level.
    pub fn lookup(&mut self, b_level: u32) -> Result<Tile<'_>> {
        let index = self.slot_index(b_level)?;
        let level = self.bound()?.levels[b_level as usize];
        if self.slots[index].level != level {
            self.render(index, b_level)?;
        }
        self.tile(index)
    }

    /// Render level index `b_level` into slot `index`.
    ///
    /// Plain tiles toggle only the bits between the old and the new level;
    /// replicated tiles are redrawn from scratch. On failure the slot is
    /// cleared back to the fresh state and the error is fatal for the fill.
    pub fn render(&mut self, index: usize, b_level: u32) -> Result<()> {
        let Self {
            bits,
            slots,
            scratch,
            order,
            tile_bytes,
            tile_raster,
            width_unit,
            replicated,
            base_id,
            renders,
            num_cached,
            ..
        } = self;
        let order = order
            .as_ref()
            .ok_or_else(|| HalftoneError::Invariant("tile cache is not bound to an order".into()))?;
        if index >= *num_cached {
            return Err(HalftoneError::Invariant(format!(
                "slot {} of {}",
                index, num_cached
            )));
        }
        let level = *order.levels.get(b_level as usize).ok_or_else(|| {
            HalftoneError::InvalidOrder(format!("level {} of {}", b_level, order.num_levels))
        })?;
        let slot = &mut slots[index];
        if slot.level == level {
            return Ok(());
        }
        let start = index * *tile_bytes;
        let tile = &mut bits[start..start + *tile_bytes];
        let compact = order.raster * order.height as usize;

        let result = if *replicated {
            tile.fill(0);
            order
                .toggle_range(0, level, &mut tile[..compact], order.raster)
                .map(|()| {
                    bitmap::replicate_horizontally(
                        tile,
                        order.width,
                        order.height,
                        order.raster,
                        *width_unit,
                        *tile_raster,
                        scratch,
                    )
                })
        } else {
            let (lo, hi) = (slot.level.min(level), slot.level.max(level));
            order.toggle_range(lo, hi, tile, order.raster)
        };

        match result {
            Ok(()) => {
                slot.level = level;
                slot.id = *base_id + b_level as u64;
                *renders += 1;
                tracing::trace!(index, b_level, level, "Rendered halftone tile");
                Ok(())
            }
            Err(e) => {
                tile.fill(0);
                slot.level = 0;
                slot.id = *base_id;
                tracing::warn!(%e, index, b_level, "Halftone tile render failed");
                Err(e)
            }
        }
    }

    fn tile(&self, index: usize) -> Result<Tile<'_>> {
        let order = self.bound()?;
        let slot = &self.slots[index];
        let start = index * self.tile_bytes;
        Ok(Tile {
            data: &self.bits[start..start + self.tile_bytes],
            raster: self.tile_raster,
            size_x: self.width_unit,
            size_y: order.height,
            rep_width: order.width,
            rep_height: order.height,
            shift: order.shift,
            id: slot.id,
            level: slot.level,
        })
    }
}
