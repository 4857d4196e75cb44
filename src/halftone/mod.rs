//! Device halftones.
//!
//! A [`HalftoneSet`] holds one [`CellOrder`] per device color component.
//! Components that use the same pattern hold the same `Rc`, so each
//! distinct order has a single owner and a single tile cache. Sets are
//! built from a [`DeviceHalftone`] candidate by [`HalftoneContext::install`].

mod install;

use std::rc::Rc;

pub use install::HalftoneContext;

use crate::cache::Tile;
use crate::color::{ColorModel, Quantized};
use crate::error::{HalftoneError, Result};
use crate::order::CellOrder;

/// Most color components a device halftone can carry.
pub const MAX_COMPONENTS: usize = 64;

/// Value `lcm_width` and `lcm_height` saturate at.
pub const MAX_LCM: u32 = i32::MAX as u32;

/// How a halftone was defined. Carried through serialization unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HalftoneType {
    None = 0,
    #[default]
    Screen,
    ColorScreen,
    Spot,
    Threshold,
    Threshold2,
    Multiple,
    MultipleColorScreen,
    ClientOrder,
}

impl HalftoneType {
    const ALL: [HalftoneType; 9] = [
        HalftoneType::None,
        HalftoneType::Screen,
        HalftoneType::ColorScreen,
        HalftoneType::Spot,
        HalftoneType::Threshold,
        HalftoneType::Threshold2,
        HalftoneType::Multiple,
        HalftoneType::MultipleColorScreen,
        HalftoneType::ClientOrder,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

/// A candidate order for one color component.
#[derive(Debug)]
pub struct ComponentOrder {
    pub comp_number: usize,
    pub order: Option<CellOrder>,
}

/// A halftone definition waiting to be installed.
///
/// Components without an explicit order fall back to the default order.
/// Installation takes the orders it can use directly, leaving `None`
/// behind; whatever is left afterwards still belongs to the caller.
#[derive(Debug, Default)]
pub struct DeviceHalftone {
    pub kind: HalftoneType,
    pub default: Option<CellOrder>,
    pub components: Vec<ComponentOrder>,
}

impl DeviceHalftone {
    /// A candidate whose every component uses `order`.
    pub fn new(kind: HalftoneType, order: CellOrder) -> Self {
        Self {
            kind,
            default: Some(order),
            components: Vec::new(),
        }
    }

    /// A candidate with no default order; every component must be given.
    pub fn explicit(kind: HalftoneType) -> Self {
        Self {
            kind,
            default: None,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, comp_number: usize, order: CellOrder) -> Self {
        self.push_component(comp_number, order);
        self
    }

    pub fn push_component(&mut self, comp_number: usize, order: CellOrder) {
        self.components.push(ComponentOrder {
            comp_number,
            order: Some(order),
        });
    }

    /// Explicit order for component `comp_number`, if still present.
    pub fn component(&self, comp_number: usize) -> Option<&CellOrder> {
        self.components
            .iter()
            .find(|c| c.comp_number == comp_number)
            .and_then(|c| c.order.as_ref())
    }

    /// True once installation has taken every order.
    pub fn is_consumed(&self) -> bool {
        self.default.is_none() && self.components.iter().all(|c| c.order.is_none())
    }
}

/// The installed halftone of a context.
#[derive(Debug)]
pub struct HalftoneSet {
    id: u64,
    kind: HalftoneType,
    components: Vec<Rc<CellOrder>>,
    lcm_width: u32,
    lcm_height: u32,
}

impl HalftoneSet {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> HalftoneType {
        self.kind
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Rc<CellOrder>] {
        &self.components
    }

    pub fn component(&self, index: usize) -> Option<&Rc<CellOrder>> {
        self.components.get(index)
    }

    /// Smallest tile that repeats every component cell, full heights
    /// included.
    pub fn lcm_size(&self) -> (u32, u32) {
        (self.lcm_width, self.lcm_height)
    }

    /// Number of distinct orders; components sharing one count once.
    pub fn distinct_orders(&self) -> usize {
        self.components
            .iter()
            .enumerate()
            .filter(|(i, c)| !self.components[..*i].iter().any(|p| Rc::ptr_eq(p, c)))
            .count()
    }

    /// Plain description of the set, for reports.
    pub fn summary(&self) -> SetSummary {
        SetSummary {
            id: self.id,
            kind: self.kind,
            lcm_width: self.lcm_width,
            lcm_height: self.lcm_height,
            distinct_orders: self.distinct_orders(),
            components: self
                .components
                .iter()
                .map(|order| ComponentSummary {
                    width: order.width(),
                    height: order.height(),
                    shift: order.shift(),
                    num_levels: order.num_levels(),
                    num_bits: order.num_bits(),
                    packing: order.packing().name(),
                    resident: order.is_resident(),
                    transfer: order.transfer().is_some(),
                })
                .collect(),
        }
    }

    fn order(&self, component: usize) -> Result<&CellOrder> {
        self.components.get(component).map(Rc::as_ref).ok_or_else(|| {
            HalftoneError::Invariant(format!(
                "component {} of {}",
                component,
                self.components.len()
            ))
        })
    }

    /// Quantize 8-bit input `v` for `component`, through the component
    /// order's transfer function.
    pub fn quantize(&self, model: &ColorModel, component: usize, v: u8) -> Result<Quantized> {
        let order = self.order(component)?;
        let quantizer = model.quantizer(component, order.num_levels());
        Ok(quantizer.quantize_byte(v, order.transfer().map(Rc::as_ref)))
    }

    /// Run `f` on the tile that paints input `v` for `component`.
    pub fn with_tile<R>(
        &self,
        model: &ColorModel,
        component: usize,
        v: u8,
        f: impl FnOnce(Quantized, &Tile<'_>) -> R,
    ) -> Result<R> {
        let q = self.quantize(model, component, v)?;
        self.order(component)?.with_tile(q.level, |tile| f(q, tile))
    }

    /// Drop every component, releasing orders no one else holds.
    fn release(&mut self) {
        tracing::debug!(
            id = self.id,
            components = self.components.len(),
            "Releasing halftone components"
        );
        self.components.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SetSummary {
    pub id: u64,
    pub kind: HalftoneType,
    pub lcm_width: u32,
    pub lcm_height: u32,
    pub distinct_orders: usize,
    pub components: Vec<ComponentSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ComponentSummary {
    pub width: u32,
    pub height: u32,
    pub shift: u32,
    pub num_levels: u32,
    pub num_bits: u32,
    pub packing: &'static str,
    pub resident: bool,
    pub transfer: bool,
}

fn gcd(a: u32, b: u32) -> u32 {
    ht_screen::gcd(a as u64, b as u64) as u32
}

/// `lcm(acc, v)`, saturating at [`MAX_LCM`].
pub(crate) fn lcm_saturating(acc: u32, v: u32) -> u32 {
    if v == 0 || acc == 0 {
        return acc.max(v);
    }
    let reduced = acc / gcd(acc, v);
    (reduced as u64 * v as u64).min(MAX_LCM as u64) as u32
}
