//! Halftone cell orders.
//!
//! A [`CellOrder`] describes one repeating halftone cell: its geometry, the
//! pixels of the cell in the order they turn on as the level rises
//! (`bit_data`), and the cumulative number of pixels on at each level
//! (`levels`). Orders are immutable once built; the tile cache and the
//! threshold array attached to an order are filled lazily.

mod builder;
mod packing;
mod threshold;

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use ht_screen::full_height;

pub use builder::OrderBuilder;
pub use packing::{mask32_record, Packing, MASK_BITS};
pub use threshold::{derive_threshold, ThresholdArray};

use crate::cache::{bitmap_raster, Tile, TileCache};
use crate::color::ColorModel;
use crate::error::{HalftoneError, Result};
use crate::memory::{Memory, MemoryId};
use crate::transfer::TransferMap;

/// Backing storage of an order array.
///
/// `Owned` arrays belong to the order (and to whatever shares the `Rc`, such
/// as the order's tile cache); `Resident` arrays point into the built-in
/// pattern table and are never freed or mutated.
pub enum OrderData<T: 'static> {
    Owned(Rc<[T]>),
    Resident(&'static [T]),
}

impl<T: 'static> OrderData<T> {
    pub fn owned(v: Vec<T>) -> Self {
        OrderData::Owned(Rc::from(v))
    }

    pub fn is_resident(&self) -> bool {
        matches!(self, OrderData::Resident(_))
    }

    /// True when both refer to the very same array.
    pub fn same_as(&self, other: &OrderData<T>) -> bool {
        let a: &[T] = self;
        let b: &[T] = other;
        std::ptr::eq(a.as_ptr(), b.as_ptr()) && a.len() == b.len()
    }

    /// Number of holders of an owned array; resident arrays report 0.
    pub fn holders(&self) -> usize {
        match self {
            OrderData::Owned(rc) => Rc::strong_count(rc),
            OrderData::Resident(_) => 0,
        }
    }
}

impl<T: 'static> Clone for OrderData<T> {
    fn clone(&self) -> Self {
        match self {
            OrderData::Owned(rc) => OrderData::Owned(Rc::clone(rc)),
            OrderData::Resident(s) => OrderData::Resident(s),
        }
    }
}

impl<T: 'static> Deref for OrderData<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            OrderData::Owned(rc) => rc,
            OrderData::Resident(s) => s,
        }
    }
}

impl<T: 'static> fmt::Debug for OrderData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderData::Owned(rc) => write!(f, "Owned({} elements)", rc.len()),
            OrderData::Resident(s) => write!(f, "Resident({} elements)", s.len()),
        }
    }
}

/// Declared dimensions of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderGeometry {
    pub width: u32,
    pub height: u32,
    /// Columns each strip is offset to the left of the one above
    pub shift: u32,
    pub num_levels: u32,
    pub num_bits: u32,
}

impl OrderGeometry {
    /// Geometry of a complete order: every pixel of a `width x height`
    /// cell, one level per pixel plus the empty level.
    pub fn complete(width: u32, height: u32) -> Self {
        let num_bits = width * height;
        Self {
            width,
            height,
            shift: 0,
            num_levels: num_bits + 1,
            num_bits,
        }
    }

    pub fn raster(&self) -> usize {
        bitmap_raster(self.width)
    }

    pub fn full_height(&self) -> u32 {
        full_height(self.width, self.height, self.shift)
    }

    /// Reject geometry no order can have.
    pub fn check(&self, packing: Packing) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HalftoneError::InvalidOrder(format!(
                "empty cell {}x{}",
                self.width, self.height
            )));
        }
        if self.shift >= self.width {
            return Err(HalftoneError::InvalidOrder(format!(
                "shift {} not below width {}",
                self.shift, self.width
            )));
        }
        if self.num_levels == 0 {
            return Err(HalftoneError::InvalidOrder("no levels".into()));
        }
        let area = self.width as u64 * self.height as u64;
        if area > packing.max_pixels() {
            return Err(HalftoneError::InvalidOrder(format!(
                "{}x{} cell too large for {} packing",
                self.width,
                self.height,
                packing.name()
            )));
        }
        Ok(())
    }
}

/// Lifetime status of an order's arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Held by this order alone (apart from its own tile cache)
    Exclusive,
    /// Aliased by another order
    Shared,
    /// Points into the built-in resident table
    Resident,
}

/// One halftone cell.
#[derive(Debug)]
pub struct CellOrder {
    geometry: OrderGeometry,
    raster: usize,
    full_height: u32,
    packing: Packing,
    levels: OrderData<u32>,
    bit_data: OrderData<u8>,
    transfer: Option<Rc<TransferMap>>,
    threshold: RefCell<Option<Rc<ThresholdArray>>>,
    cache: Option<RefCell<TileCache>>,
    memory: MemoryId,
}

impl CellOrder {
    /// Assemble an order from finished arrays, checking every invariant.
    pub fn from_parts(
        memory: MemoryId,
        geometry: OrderGeometry,
        packing: Packing,
        levels: OrderData<u32>,
        bit_data: OrderData<u8>,
        transfer: Option<Rc<TransferMap>>,
    ) -> Result<Self> {
        geometry.check(packing)?;
        let order = Self {
            geometry,
            raster: geometry.raster(),
            full_height: geometry.full_height(),
            packing,
            levels,
            bit_data,
            transfer,
            threshold: RefCell::new(None),
            cache: None,
            memory,
        };
        order.validate()?;
        Ok(order)
    }

    pub fn geometry(&self) -> OrderGeometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn shift(&self) -> u32 {
        self.geometry.shift
    }

    pub fn num_levels(&self) -> u32 {
        self.geometry.num_levels
    }

    pub fn num_bits(&self) -> u32 {
        self.geometry.num_bits
    }

    /// Bytes per row of the cell bitmap.
    pub fn raster(&self) -> usize {
        self.raster
    }

    pub fn full_height(&self) -> u32 {
        self.full_height
    }

    pub fn packing(&self) -> Packing {
        self.packing
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn bit_data(&self) -> &[u8] {
        &self.bit_data
    }

    pub(crate) fn levels_shared(&self) -> &OrderData<u32> {
        &self.levels
    }

    pub(crate) fn bits_shared(&self) -> &OrderData<u8> {
        &self.bit_data
    }

    pub fn transfer(&self) -> Option<&Rc<TransferMap>> {
        self.transfer.as_ref()
    }

    /// Replace the transfer function; any derived threshold array is
    /// dropped since it depends on it.
    pub fn set_transfer(&mut self, transfer: Option<Rc<TransferMap>>) {
        self.transfer = transfer;
        self.threshold.get_mut().take();
    }

    pub fn memory(&self) -> MemoryId {
        self.memory
    }

    pub fn ownership(&self) -> Ownership {
        if self.bit_data.is_resident() && self.levels.is_resident() {
            return Ownership::Resident;
        }
        let own_cache = usize::from(self.cache.is_some());
        if self.bit_data.holders() > 1 + own_cache || self.levels.holders() > 1 + own_cache {
            Ownership::Shared
        } else {
            Ownership::Exclusive
        }
    }

    pub fn is_resident(&self) -> bool {
        self.ownership() == Ownership::Resident
    }

    /// True when both orders use the very same `levels` and `bit_data`.
    pub fn shares_data_with(&self, other: &CellOrder) -> bool {
        self.levels.same_as(&other.levels) && self.bit_data.same_as(&other.bit_data)
    }

    /// Record `index` of `bit_data`.
    pub fn record(&self, index: u32) -> &[u8] {
        let size = self.packing.element_size();
        let start = index as usize * size;
        &self.bit_data[start..start + size]
    }

    /// Cell position of the `index`-th pixel to turn on.
    pub fn bit_index(&self, index: u32) -> Result<(u32, u32)> {
        if index >= self.num_bits() {
            return Err(HalftoneError::Invariant(format!(
                "bit {} of {}",
                index,
                self.num_bits()
            )));
        }
        self.packing
            .position(self.record(index), self.width(), self.height())
            .ok_or_else(|| HalftoneError::InvalidOrder(format!("record {} outside cell", index)))
    }

    /// Check the level table and every bit record.
    pub fn validate(&self) -> Result<()> {
        let g = &self.geometry;
        if self.levels.len() != g.num_levels as usize {
            return Err(HalftoneError::InvalidOrder(format!(
                "{} levels declared, {} present",
                g.num_levels,
                self.levels.len()
            )));
        }
        if self.bit_data.len() != g.num_bits as usize * self.packing.element_size() {
            return Err(HalftoneError::InvalidOrder(format!(
                "{} bits declared, {} bytes present",
                g.num_bits,
                self.bit_data.len()
            )));
        }
        if self.levels.windows(2).any(|w| w[0] > w[1]) {
            return Err(HalftoneError::InvalidOrder("levels decrease".into()));
        }
        if let Some(&last) = self.levels.last() {
            if last > g.num_bits {
                return Err(HalftoneError::InvalidOrder(format!(
                    "last level {} exceeds {} bits",
                    last, g.num_bits
                )));
            }
        }
        // sized by the records present, never by the declared cell area
        let mut seen = HashSet::with_capacity(g.num_bits as usize);
        for i in 0..g.num_bits {
            let (x, y) = self.bit_index(i)?;
            if !seen.insert((x, y)) {
                return Err(HalftoneError::InvalidOrder(format!(
                    "record {} repeats pixel ({}, {})",
                    i, x, y
                )));
            }
        }
        Ok(())
    }

    /// Copy this order into `memory`.
    ///
    /// Owned arrays are duplicated; resident arrays stay aliased since they
    /// outlive every memory. The transfer function is shared. The copy has
    /// no tile cache and no threshold array.
    pub fn clone_in(&self, memory: &Memory) -> Result<CellOrder> {
        let levels = match &self.levels {
            OrderData::Resident(s) => OrderData::Resident(s),
            OrderData::Owned(rc) => OrderData::owned(memory.alloc_copy(rc, "order levels")?),
        };
        let bit_data = match &self.bit_data {
            OrderData::Resident(s) => OrderData::Resident(s),
            OrderData::Owned(rc) => OrderData::owned(memory.alloc_copy(rc, "order bits")?),
        };
        Ok(CellOrder {
            geometry: self.geometry,
            raster: self.raster,
            full_height: self.full_height,
            packing: self.packing,
            levels,
            bit_data,
            transfer: self.transfer.clone(),
            threshold: RefCell::new(None),
            cache: None,
            memory: memory.id(),
        })
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Build and attach a tile cache within the given budgets.
    pub fn attach_cache(&mut self, memory: &Memory, bits_size: usize, max_tiles: usize) -> Result<()> {
        let cache = TileCache::attach(memory, self, bits_size, max_tiles)?;
        self.cache = Some(RefCell::new(cache));
        Ok(())
    }

    /// Hand over an existing cache; it is rebuilt for this order on first use
    /// if it was built for another one.
    pub fn set_cache(&mut self, cache: TileCache) {
        self.cache = Some(RefCell::new(cache));
    }

    pub fn detach_cache(&mut self) -> Option<TileCache> {
        self.cache.take().map(RefCell::into_inner)
    }

    /// Run `f` on the tile for level index `b_level`, rendering it first if
    /// its slot holds another level.
    pub fn with_tile<R>(&self, b_level: u32, f: impl FnOnce(&Tile<'_>) -> R) -> Result<R> {
        let cell = self
            .cache
            .as_ref()
            .ok_or_else(|| HalftoneError::Invariant("order has no tile cache".into()))?;
        let mut cache = cell
            .try_borrow_mut()
            .map_err(|_| HalftoneError::Invariant("tile cache already in use".into()))?;
        if !cache.is_bound_to(self) {
            tracing::debug!(width = self.width(), "Rebinding tile cache to order");
            cache.init(self)?;
        }
        let tile = cache.lookup(b_level)?;
        Ok(f(&tile))
    }

    /// Inspect the attached cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&TileCache) -> R) -> Option<R> {
        self.cache.as_ref().and_then(|c| c.try_borrow().ok()).map(|c| f(&c))
    }

    /// Threshold array for `component` of `model`, derived on first use with
    /// this order's transfer function. The cached array is replaced when a
    /// component with another level count or polarity asks for it.
    pub fn threshold(
        &self,
        memory: &Memory,
        model: &ColorModel,
        component: usize,
    ) -> Result<Rc<ThresholdArray>> {
        if let Some(existing) = self.threshold.borrow().as_ref() {
            if existing.fits(model, component) {
                return Ok(Rc::clone(existing));
            }
        }
        let array = Rc::new(derive_threshold(
            memory,
            self,
            model,
            component,
            self.transfer.as_deref(),
        )?);
        *self.threshold.borrow_mut() = Some(Rc::clone(&array));
        Ok(array)
    }

    pub fn has_threshold(&self) -> bool {
        self.threshold.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferMap;

    fn order_4x4(memory: &Memory) -> CellOrder {
        let values: Vec<u32> = (0..16).map(|i| (i * 7) % 16).collect();
        OrderBuilder::from_thresholds(memory, 4, 4, &values, Packing::Mask32).unwrap()
    }

    #[test]
    fn test_from_parts_rejects_decreasing_levels() {
        let memory = Memory::new();
        let order = order_4x4(&memory);
        let mut levels = order.levels().to_vec();
        levels.swap(3, 4);
        let err = CellOrder::from_parts(
            memory.id(),
            order.geometry(),
            Packing::Mask32,
            OrderData::owned(levels),
            order.bits_shared().clone(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, HalftoneError::InvalidOrder(_)));
    }

    #[test]
    fn test_from_parts_rejects_wrong_lengths() {
        let memory = Memory::new();
        let order = order_4x4(&memory);
        let err = CellOrder::from_parts(
            memory.id(),
            order.geometry(),
            Packing::Mask32,
            order.levels_shared().clone(),
            OrderData::owned(order.bit_data()[..8].to_vec()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, HalftoneError::InvalidOrder(_)));
    }

    #[test]
    fn test_from_parts_rejects_repeated_pixel() {
        let memory = Memory::new();
        let order = order_4x4(&memory);
        let mut bits = order.bit_data().to_vec();
        let first = bits[..8].to_vec();
        bits[8..16].copy_from_slice(&first);
        let err = CellOrder::from_parts(
            memory.id(),
            order.geometry(),
            Packing::Mask32,
            order.levels_shared().clone(),
            OrderData::owned(bits),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("repeats pixel"), "{err}");
    }

    #[test]
    fn test_threshold_cache_follows_component_levels() {
        let memory = Memory::new();
        let order = order_4x4(&memory);
        let (bilevel, four) = (ColorModel::gray(2), ColorModel::gray(4));

        let a = order.threshold(&memory, &bilevel, 0).unwrap();
        assert!(Rc::ptr_eq(&a, &order.threshold(&memory, &bilevel, 0).unwrap()));

        let b = order.threshold(&memory, &four, 0).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(*b, derive_threshold(&memory, &order, &four, 0, None).unwrap());
        assert_ne!(a.data(), b.data());
        assert!(Rc::ptr_eq(&b, &order.threshold(&memory, &four, 0).unwrap()));
    }

    #[test]
    fn test_geometry_check() {
        let g = OrderGeometry {
            width: 4,
            height: 4,
            shift: 4,
            num_levels: 17,
            num_bits: 16,
        };
        assert!(g.check(Packing::Mask32).is_err());
        let big = OrderGeometry::complete(300, 300);
        assert!(big.check(Packing::Index16).is_err());
        assert!(big.check(Packing::Mask32).is_ok());
    }

    #[test]
    fn test_clone_in_copies_arrays_and_shares_transfer() {
        let memory = Memory::new();
        let mut order = order_4x4(&memory);
        order.set_transfer(Some(Rc::new(TransferMap::gamma(1.8))));
        let other = Memory::new();
        let copy = order.clone_in(&other).unwrap();
        assert_eq!(copy.memory(), other.id());
        assert_eq!(copy.levels(), order.levels());
        assert_eq!(copy.bit_data(), order.bit_data());
        assert!(!copy.shares_data_with(&order));
        assert!(Rc::ptr_eq(
            copy.transfer().unwrap(),
            order.transfer().unwrap()
        ));
        assert!(!copy.has_cache());
        assert_eq!(copy.ownership(), Ownership::Exclusive);
    }

    #[test]
    fn test_clone_in_failure_is_clean() {
        let memory = Memory::new();
        let order = order_4x4(&memory);
        let other = Memory::new();
        other.fail_after(1);
        let err = order.clone_in(&other).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_ownership_tracks_aliases() {
        let memory = Memory::new();
        let mut order = order_4x4(&memory);
        assert_eq!(order.ownership(), Ownership::Exclusive);
        order.attach_cache(&memory, 4096, 32).unwrap();
        assert_eq!(order.ownership(), Ownership::Exclusive);
        let alias = CellOrder::from_parts(
            memory.id(),
            order.geometry(),
            order.packing(),
            order.levels_shared().clone(),
            order.bits_shared().clone(),
            None,
        )
        .unwrap();
        assert_eq!(order.ownership(), Ownership::Shared);
        assert!(alias.shares_data_with(&order));
    }

    #[test]
    fn test_with_tile_requires_cache() {
        let memory = Memory::new();
        let order = order_4x4(&memory);
        let err = order.with_tile(3, |t| t.count_on()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InternalInvariant);
    }

    #[test]
    fn test_moved_cache_is_rebuilt() {
        let memory = Memory::new();
        let mut a = order_4x4(&memory);
        a.attach_cache(&memory, 4096, 32).unwrap();
        assert_eq!(a.with_tile(5, |t| t.count_on()).unwrap(), 5);
        let cache = a.detach_cache().unwrap();

        let values: Vec<u32> = (0..36).collect();
        let mut b = OrderBuilder::from_thresholds(&memory, 6, 6, &values, Packing::Mask32).unwrap();
        b.set_cache(cache);
        assert_eq!(b.with_tile(20, |t| (t.rep_width, t.count_on())).unwrap(), (6, 20));
    }
}
