//! Installing a device halftone into a rendering context.
//!
//! Installation stages every component first and only touches the context
//! once nothing can fail any more. Orders allocated from the context's own
//! memory are moved out of the candidate; anything else is cloned. If a
//! step fails, taken orders go back into the candidate, caches attached
//! here are dropped, and the context keeps its previous halftone.

use std::rc::Rc;

use super::{lcm_saturating, DeviceHalftone, HalftoneSet, MAX_COMPONENTS};
use crate::cache::{CacheBudget, Tile};
use crate::color::{ColorModel, Quantized};
use crate::error::{HalftoneError, Result};
use crate::memory::{next_ids, Memory};
use crate::order::{CellOrder, ThresholdArray};

/// Where a staged order was taken from.
#[derive(Debug, Clone, Copy)]
enum Origin {
    Component(usize),
    Default,
}

#[derive(Debug)]
struct Staged {
    order: CellOrder,
    taken: Option<Origin>,
    attached_cache: bool,
}

impl Staged {
    fn taken(order: CellOrder, origin: Origin) -> Self {
        Self {
            order,
            taken: Some(origin),
            attached_cache: false,
        }
    }

    fn copied(order: CellOrder) -> Self {
        Self {
            order,
            taken: None,
            attached_cache: false,
        }
    }
}

/// Rendering state that owns an allocator and the active halftone.
#[derive(Debug)]
pub struct HalftoneContext {
    memory: Memory,
    color_model: ColorModel,
    cache_budget: CacheBudget,
    halftone: Option<Rc<HalftoneSet>>,
}

impl HalftoneContext {
    pub fn new(memory: Memory, color_model: ColorModel) -> Self {
        Self {
            memory,
            color_model,
            cache_budget: CacheBudget::default(),
            halftone: None,
        }
    }

    pub fn with_cache_budget(mut self, budget: CacheBudget) -> Self {
        self.cache_budget = budget;
        self
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn color_model(&self) -> &ColorModel {
        &self.color_model
    }

    pub fn cache_budget(&self) -> CacheBudget {
        self.cache_budget
    }

    pub fn halftone(&self) -> Option<&Rc<HalftoneSet>> {
        self.halftone.as_ref()
    }

    /// Another handle on the active halftone, as held by a pattern instance.
    pub fn share(&self) -> Option<Rc<HalftoneSet>> {
        self.halftone.clone()
    }

    /// Drop the active halftone.
    pub fn release(&mut self) {
        if let Some(mut set) = self.halftone.take() {
            if let Some(unique) = Rc::get_mut(&mut set) {
                unique.release();
            }
        }
    }

    /// Make `candidate` the active halftone.
    ///
    /// Each device component gets the candidate's explicit order for it, or
    /// else the default order. The default is taken or cloned once and
    /// shared by every component that falls back to it. On error nothing
    /// observable changes: the context keeps its halftone and the candidate
    /// gets back every order taken from it.
    pub fn install(&mut self, candidate: &mut DeviceHalftone) -> Result<()> {
        let num_comps = self.color_model.num_components;
        if num_comps == 0 || num_comps > MAX_COMPONENTS {
            return Err(HalftoneError::Invariant(format!(
                "{} device components",
                num_comps
            )));
        }
        let mut staged = Vec::new();
        let assign = match self.stage(candidate, &mut staged, num_comps) {
            Ok(assign) => assign,
            Err(e) => {
                tracing::debug!(%e, staged = staged.len(), "Rolling back halftone install");
                rollback(candidate, staged);
                return Err(e);
            }
        };

        let mut lcm_width = 1;
        let mut lcm_height = 1;
        for &index in &assign {
            let order = &staged[index].order;
            lcm_width = lcm_saturating(lcm_width, order.width());
            lcm_height = lcm_saturating(lcm_height, order.full_height());
        }

        let orders: Vec<Rc<CellOrder>> = staged.into_iter().map(|s| Rc::new(s.order)).collect();
        let components = assign.iter().map(|&i| Rc::clone(&orders[i])).collect();
        let set = HalftoneSet {
            id: next_ids(1),
            kind: candidate.kind,
            components,
            lcm_width,
            lcm_height,
        };
        tracing::debug!(
            id = set.id,
            components = num_comps,
            distinct = orders.len(),
            lcm_width,
            lcm_height,
            "Installed halftone"
        );

        match self.halftone.as_mut() {
            Some(current) => match Rc::get_mut(current) {
                Some(unique) => {
                    unique.release();
                    *unique = set;
                }
                None => *current = Rc::new(set),
            },
            None => self.halftone = Some(Rc::new(set)),
        }
        Ok(())
    }

    /// Resolve every component to an index into `staged`.
    fn stage(
        &self,
        candidate: &mut DeviceHalftone,
        staged: &mut Vec<Staged>,
        num_comps: usize,
    ) -> Result<Vec<usize>> {
        let mut assign = self.memory.alloc_vec(num_comps, None, "halftone components")?;
        let memory_id = self.memory.id();

        for (i, comp) in candidate.components.iter_mut().enumerate() {
            let n = comp.comp_number;
            if n >= num_comps {
                tracing::warn!(component = n, num_comps, "Ignoring halftone component out of range");
                continue;
            }
            if assign[n].is_some() {
                tracing::warn!(component = n, "Ignoring duplicate halftone component");
                continue;
            }
            let entry = match comp.order.take() {
                None => continue,
                Some(order) if order.memory() == memory_id => {
                    Staged::taken(order, Origin::Component(i))
                }
                Some(order) => {
                    let copy = order.clone_in(&self.memory);
                    comp.order = Some(order);
                    Staged::copied(copy?)
                }
            };
            staged.push(entry);
            assign[n] = Some(staged.len() - 1);
        }

        let mut default_index = None;
        for n in 0..num_comps {
            if assign[n].is_some() {
                continue;
            }
            let index = match default_index {
                Some(index) => index,
                None => {
                    let index = self.stage_default(candidate, staged, n)?;
                    default_index = Some(index);
                    index
                }
            };
            assign[n] = Some(index);
        }

        for entry in staged.iter_mut().filter(|e| !e.order.has_cache()) {
            let (bits_size, max_tiles) = self.cache_budget.sized_for(&entry.order);
            entry.order.attach_cache(&self.memory, bits_size, max_tiles)?;
            entry.attached_cache = true;
        }

        assign
            .into_iter()
            .enumerate()
            .map(|(n, a)| {
                a.ok_or_else(|| HalftoneError::Invariant(format!("component {} unassigned", n)))
            })
            .collect()
    }

    fn stage_default(
        &self,
        candidate: &mut DeviceHalftone,
        staged: &mut Vec<Staged>,
        component: usize,
    ) -> Result<usize> {
        let default = candidate.default.as_ref().ok_or_else(|| {
            HalftoneError::InvalidOrder(format!(
                "no order for component {} and no default order",
                component
            ))
        })?;
        if let Some(index) = staged.iter().position(|s| paints_like(&s.order, default)) {
            return Ok(index);
        }
        let entry = match candidate.default.take() {
            Some(order) if order.memory() == self.memory.id() => {
                Staged::taken(order, Origin::Default)
            }
            Some(order) => {
                let copy = order.clone_in(&self.memory);
                candidate.default = Some(order);
                Staged::copied(copy?)
            }
            None => return Err(HalftoneError::Invariant("default order vanished".into())),
        };
        staged.push(entry);
        Ok(staged.len() - 1)
    }

    fn active(&self) -> Result<&HalftoneSet> {
        self.halftone
            .as_deref()
            .ok_or_else(|| HalftoneError::Invariant("no halftone installed".into()))
    }

    /// Run `f` on the tile that paints input `v` for `component`.
    pub fn with_tile<R>(
        &self,
        component: usize,
        v: u8,
        f: impl FnOnce(Quantized, &Tile<'_>) -> R,
    ) -> Result<R> {
        self.active()?.with_tile(&self.color_model, component, v, f)
    }

    /// Threshold array of `component`'s order, derived on first use.
    pub fn threshold(&self, component: usize) -> Result<Rc<ThresholdArray>> {
        let set = self.active()?;
        let order = set.component(component).ok_or_else(|| {
            HalftoneError::Invariant(format!("component {} of {}", component, set.num_components()))
        })?;
        order.threshold(&self.memory, &self.color_model, component)
    }
}

/// Whether `staged` can stand in for `default`: same arrays read the same
/// way through the same transfer function.
fn paints_like(staged: &CellOrder, default: &CellOrder) -> bool {
    let same_transfer = match (staged.transfer(), default.transfer()) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b) || a == b,
        _ => false,
    };
    staged.shares_data_with(default)
        && staged.geometry() == default.geometry()
        && staged.packing() == default.packing()
        && same_transfer
}

/// Undo a failed staging pass.
fn rollback(candidate: &mut DeviceHalftone, staged: Vec<Staged>) {
    for entry in staged.into_iter().rev() {
        let mut order = entry.order;
        if entry.attached_cache {
            order.detach_cache();
        }
        match entry.taken {
            Some(Origin::Component(i)) => {
                if let Some(slot) = candidate.components.get_mut(i) {
                    slot.order = Some(order);
                }
            }
            Some(Origin::Default) => candidate.default = Some(order),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::halftone::{HalftoneType, MAX_LCM};
    use crate::order::{OrderBuilder, Packing};
    use crate::transfer::TransferMap;

    fn ramp(memory: &Memory, w: u32, h: u32) -> CellOrder {
        let values: Vec<u32> = (0..w * h).collect();
        OrderBuilder::from_thresholds(memory, w, h, &values, Packing::Mask32).unwrap()
    }

    #[test]
    fn test_default_is_taken_once_and_shared() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::cmyk(2));
        let order = ramp(ctx.memory(), 4, 4);
        let mut candidate = DeviceHalftone::new(HalftoneType::Screen, order);
        ctx.install(&mut candidate).unwrap();
        assert!(candidate.is_consumed());
        let set = ctx.halftone().unwrap();
        assert_eq!(set.num_components(), 4);
        assert_eq!(set.distinct_orders(), 1);
        assert!(Rc::ptr_eq(&set.components()[0], &set.components()[3]));
        assert!(set.components()[0].has_cache());
    }

    #[test]
    fn test_foreign_default_is_cloned_once() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::rgb(2));
        let other = Memory::new();
        let mut candidate = DeviceHalftone::new(HalftoneType::Screen, ramp(&other, 4, 4));
        ctx.install(&mut candidate).unwrap();
        let original = candidate.default.as_ref().unwrap();
        let set = ctx.halftone().unwrap();
        assert_eq!(set.distinct_orders(), 1);
        assert_eq!(set.components()[1].memory(), ctx.memory().id());
        assert!(!set.components()[1].shares_data_with(original));
        assert_eq!(set.components()[1].bit_data(), original.bit_data());
    }

    #[test]
    fn test_explicit_components_and_lcm() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::cmyk(2));
        let memory = ctx.memory();
        let mut candidate = DeviceHalftone::new(HalftoneType::Multiple, ramp(memory, 4, 4))
            .with_component(0, ramp(memory, 6, 6))
            .with_component(2, ramp(memory, 3, 2))
            .with_component(9, ramp(memory, 5, 5));
        ctx.install(&mut candidate).unwrap();
        let set = ctx.halftone().unwrap();
        assert_eq!(set.component(0).unwrap().width(), 6);
        assert_eq!(set.component(1).unwrap().width(), 4);
        assert_eq!(set.component(2).unwrap().width(), 3);
        assert!(Rc::ptr_eq(&set.components()[1], &set.components()[3]));
        assert_eq!(set.distinct_orders(), 3);
        assert_eq!(set.lcm_size(), (12, 12));
        assert_eq!(set.kind(), HalftoneType::Multiple);
        // the out of range component stays with the caller
        assert!(candidate.component(9).is_some());
    }

    #[test]
    fn test_component_aliasing_default_shares_owner() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::rgb(2));
        let order = ramp(ctx.memory(), 4, 4);
        // same arrays, distinct orders
        let alias = CellOrder::from_parts(
            ctx.memory().id(),
            order.geometry(),
            order.packing(),
            order.levels_shared().clone(),
            order.bits_shared().clone(),
            None,
        )
        .unwrap();
        let mut candidate = DeviceHalftone::new(HalftoneType::Screen, order).with_component(1, alias);
        ctx.install(&mut candidate).unwrap();
        let set = ctx.halftone().unwrap();
        assert_eq!(set.distinct_orders(), 1);
        // the default was never needed as a separate owner
        assert!(candidate.default.is_some());
    }

    #[test]
    fn test_alias_with_other_transfer_keeps_default_separate() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::rgb(2));
        let gamma = Rc::new(TransferMap::gamma(2.2));
        let mut order = ramp(ctx.memory(), 4, 4);
        order.set_transfer(Some(gamma.clone()));
        let alias = CellOrder::from_parts(
            ctx.memory().id(),
            order.geometry(),
            order.packing(),
            order.levels_shared().clone(),
            order.bits_shared().clone(),
            None,
        )
        .unwrap();
        let mut candidate = DeviceHalftone::new(HalftoneType::Screen, order).with_component(1, alias);
        ctx.install(&mut candidate).unwrap();

        let set = ctx.halftone().unwrap();
        assert_eq!(set.distinct_orders(), 2);
        assert!(Rc::ptr_eq(set.component(0).unwrap().transfer().unwrap(), &gamma));
        assert!(Rc::ptr_eq(&set.components()[0], &set.components()[2]));
        assert!(set.component(1).unwrap().transfer().is_none());

        let level = |c| ctx.with_tile(c, 128, |q, _| q.level).unwrap();
        assert_eq!(level(0), 3);
        assert_eq!(level(1), 8);
    }

    #[test]
    fn test_missing_default_is_an_error() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::rgb(2));
        let mut candidate =
            DeviceHalftone::explicit(HalftoneType::Multiple).with_component(0, ramp(ctx.memory(), 4, 4));
        let err = ctx.install(&mut candidate).unwrap_err();
        assert!(matches!(err, HalftoneError::InvalidOrder(_)));
        assert!(ctx.halftone().is_none());
        assert!(candidate.component(0).is_some(), "taken order returned");
    }

    #[test]
    fn test_failed_clone_rolls_back() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::rgb(2));
        let first = ramp(ctx.memory(), 4, 4);
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, first)).unwrap();
        let before = ctx.share().unwrap();
        let before_id = before.id();

        let other = Memory::new();
        let mut candidate = DeviceHalftone::explicit(HalftoneType::Multiple)
            .with_component(0, ramp(ctx.memory(), 2, 2))
            .with_component(1, ramp(&other, 3, 3))
            .with_component(2, ramp(&other, 5, 5));
        // components array, then both arrays of component 1, then fail
        ctx.memory().fail_after(3);
        let err = ctx.install(&mut candidate).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);

        let after = ctx.halftone().unwrap();
        assert!(Rc::ptr_eq(&before, after));
        assert_eq!(after.id(), before_id);
        assert_eq!(Rc::strong_count(&before), 2);
        let restored = candidate.component(0).unwrap();
        assert_eq!(restored.width(), 2);
        assert!(!restored.has_cache());
        assert!(candidate.component(1).is_some());
        assert!(candidate.component(2).is_some());
    }

    #[test]
    fn test_failed_cache_attach_rolls_back() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::gray(2));
        let mut candidate = DeviceHalftone::new(HalftoneType::Screen, ramp(ctx.memory(), 4, 4));
        ctx.memory().fail_after(1);
        assert!(ctx.install(&mut candidate).is_err());
        let order = candidate.default.as_ref().unwrap();
        assert!(!order.has_cache());
        assert!(ctx.halftone().is_none());
    }

    #[test]
    fn test_unique_set_is_replaced_in_place() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::gray(2));
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, ramp(ctx.memory(), 4, 4)))
            .unwrap();
        let slot = Rc::as_ptr(ctx.halftone().unwrap());
        let old_id = ctx.halftone().unwrap().id();
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Spot, ramp(ctx.memory(), 2, 2)))
            .unwrap();
        let set = ctx.halftone().unwrap();
        assert_eq!(Rc::as_ptr(set), slot);
        assert_ne!(set.id(), old_id);
        assert_eq!(set.component(0).unwrap().width(), 2);
    }

    #[test]
    fn test_shared_set_is_unshared() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::gray(2));
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, ramp(ctx.memory(), 4, 4)))
            .unwrap();
        let pattern = ctx.share().unwrap();
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, ramp(ctx.memory(), 2, 2)))
            .unwrap();
        assert!(!Rc::ptr_eq(&pattern, ctx.halftone().unwrap()));
        assert_eq!(pattern.component(0).unwrap().width(), 4);
        assert_eq!(Rc::strong_count(&pattern), 1);
    }

    #[test]
    fn test_tile_and_threshold_through_context() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::gray(2));
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, ramp(ctx.memory(), 4, 4)))
            .unwrap();
        let count = ctx.with_tile(0, 128, |q, tile| (q.level, tile.count_on())).unwrap();
        assert_eq!(count, (8, 8));
        let t = ctx.threshold(0).unwrap();
        assert!(Rc::ptr_eq(&t, &ctx.threshold(0).unwrap()));
        assert!(ctx.with_tile(1, 0, |_, _| ()).is_err());
    }

    #[test]
    fn test_lcm_saturates_for_coprime_cells() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::rgb(2));
        let memory = ctx.memory();
        let mut candidate = DeviceHalftone::explicit(HalftoneType::Multiple)
            .with_component(0, ramp(memory, 251, 1))
            .with_component(1, ramp(memory, 241, 1))
            .with_component(2, ramp(memory, 239, 1));
        ctx.install(&mut candidate).unwrap();
        assert_eq!(ctx.halftone().unwrap().lcm_size().0, 251 * 241 * 239);
        assert!(251u64 * 241 * 239 < MAX_LCM as u64);
    }

    #[test]
    fn test_release_drops_set() {
        let mut ctx = HalftoneContext::new(Memory::new(), ColorModel::gray(2));
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, ramp(ctx.memory(), 4, 4)))
            .unwrap();
        ctx.release();
        assert!(ctx.halftone().is_none());
    }
}
