use std::collections::HashMap;
use std::rc::Rc;
use std::str::FromStr;

use ht_screen::{CellSelection, ScreenRequest, SpotFunction};

use crate::codec::resident;
use crate::error::HalftoneError;
use crate::halftone::{DeviceHalftone, HalftoneContext, HalftoneType, MAX_COMPONENTS};
use crate::memory::Memory;
use crate::models::{HalftoneConfig, ScreenConfig};
use crate::order::{CellOrder, OrderBuilder};
use crate::transfer::TransferMap;

/// Error type for building orders from configuration
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Halftone(#[from] HalftoneError),

    #[error("Screen not found: {0}")]
    ScreenNotFound(String),

    #[error("Unknown resident pattern: {0}")]
    UnknownResident(String),

    #[error("No screen configured for component {0}")]
    NoScreen(usize),
}

impl From<ht_screen::ScreenError> for BuildError {
    fn from(e: ht_screen::ScreenError) -> Self {
        BuildError::Halftone(e.into())
    }
}

/// An order built from one configured screen.
#[derive(Debug)]
pub struct BuiltScreen {
    pub order: CellOrder,
    /// Cell picked for a spot screen; `None` for resident patterns
    pub selection: Option<CellSelection>,
}

/// Builds cell orders and device halftones from a [`HalftoneConfig`]
pub struct ScreenBuilder {
    config: HalftoneConfig,
}

impl ScreenBuilder {
    pub fn new(config: HalftoneConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HalftoneConfig {
        &self.config
    }

    /// A fresh context for the configured color model and cache budget.
    pub fn context(&self, memory: Memory) -> HalftoneContext {
        HalftoneContext::new(memory, self.config.color_model.model())
            .with_cache_budget(self.config.cache)
    }

    /// Build the order of screen `name`.
    pub fn build_order(&self, memory: &Memory, name: &str) -> Result<BuiltScreen, BuildError> {
        let screen = self
            .config
            .get_screen(name)
            .ok_or_else(|| BuildError::ScreenNotFound(name.to_string()))?;
        let built = self.build_screen(memory, screen)?;
        tracing::debug!(
            screen = name,
            width = built.order.width(),
            height = built.order.height(),
            levels = built.order.num_levels(),
            "Built screen"
        );
        Ok(built)
    }

    fn build_screen(&self, memory: &Memory, screen: &ScreenConfig) -> Result<BuiltScreen, BuildError> {
        let mut built = match screen.resident.as_deref() {
            Some(pattern) => {
                let resident = resident::find(pattern)
                    .ok_or_else(|| BuildError::UnknownResident(pattern.to_string()))?;
                BuiltScreen {
                    order: resident.to_order(memory.id())?,
                    selection: None,
                }
            }
            None => {
                let spot = SpotFunction::from_str(&screen.spot)?;
                let request = ScreenRequest {
                    frequency: screen.frequency,
                    angle: screen.angle,
                    resolution: screen.resolution,
                    accurate: screen.accurate,
                    max_size: self.config.max_order_bytes,
                    ..ScreenRequest::default()
                };
                let (selection, samples) = ht_screen::build_screen(&request, spot)?;
                let order = OrderBuilder::from_screen(
                    memory,
                    &samples,
                    self.config.max_order_bytes,
                    screen.packing,
                )?;
                BuiltScreen {
                    order,
                    selection: Some(selection),
                }
            }
        };
        if let Some(gamma) = screen.gamma {
            built.order.set_transfer(Some(Rc::new(TransferMap::gamma(gamma))));
        }
        Ok(built)
    }

    /// Build the device halftone the configuration describes.
    ///
    /// The default screen covers every component without an entry in
    /// `component_screens`. Components naming the same screen share one
    /// set of order arrays.
    pub fn build_halftone(&self, memory: &Memory) -> Result<DeviceHalftone, BuildError> {
        let num_components = self.config.color_model.model().num_components;
        let default = match self.config.default_screen.as_deref() {
            Some(name) => Some((name, self.build_order(memory, name)?.order)),
            None => None,
        };
        if self.config.component_screens.is_empty() {
            let Some((name, order)) = default else {
                return Err(BuildError::NoScreen(0));
            };
            let kind = self.kind_of(name);
            return Ok(DeviceHalftone::new(kind, order));
        }

        let mut built: HashMap<&str, CellOrder> = HashMap::new();
        let mut halftone = DeviceHalftone::explicit(HalftoneType::Multiple);
        for (comp, name) in self
            .config
            .component_screens
            .iter()
            .enumerate()
            .take(num_components.min(MAX_COMPONENTS))
        {
            if !built.contains_key(name.as_str()) {
                let order = self.build_order(memory, name)?.order;
                built.insert(name.as_str(), order);
            }
            halftone.push_component(comp, alias(memory, &built[name.as_str()])?);
        }
        match default {
            Some((_, order)) => halftone.default = Some(order),
            None if self.config.component_screens.len() < num_components => {
                return Err(BuildError::NoScreen(self.config.component_screens.len()));
            }
            None => {}
        }
        tracing::info!(
            components = halftone.components.len(),
            distinct = built.len(),
            "Built device halftone"
        );
        Ok(halftone)
    }

    fn kind_of(&self, name: &str) -> HalftoneType {
        match self.config.get_screen(name) {
            Some(screen) if screen.resident.is_some() => HalftoneType::Threshold,
            _ => HalftoneType::Screen,
        }
    }
}

/// A second order over the same arrays as `order`.
fn alias(memory: &Memory, order: &CellOrder) -> Result<CellOrder, HalftoneError> {
    CellOrder::from_parts(
        memory.id(),
        order.geometry(),
        order.packing(),
        order.levels_shared().clone(),
        order.bits_shared().clone(),
        order.transfer().cloned(),
    )
}
