//! Test fixtures and constants.

use std::path::{Path, PathBuf};

use halftone::color::ColorModel;
use halftone::halftone::{DeviceHalftone, HalftoneContext, HalftoneType};
use halftone::memory::Memory;
use halftone::order::{CellOrder, OrderBuilder, Packing};
use ht_screen::{ScreenRequest, SpotFunction};

/// Standard 4x4 Bayer ranks, row by row
pub const BAYER4: [u32; 16] = [0, 8, 2, 10, 12, 4, 14, 6, 3, 11, 1, 9, 15, 7, 13, 5];

/// Configuration exercising spot screens, a resident screen and
/// per-component screens on a CMYK device
pub const CMYK_CONFIG: &str = r#"
color_model:
  kind: cmyk
  levels: 2
cache:
  bits_size: 16384
  max_tiles: 64
default_screen: round
component_screens: [dither, lines]
screens:
  round:
    frequency: 60
    angle: 45
    resolution: 300
    spot: round
  lines:
    frequency: 40
    angle: 15
    resolution: 300
    spot: line
    packing: index16
    gamma: 1.5
  dither:
    resident: bayer8
"#;

/// A complete order whose thresholds are a fixed scramble of pixel indices.
pub fn scrambled_order(memory: &Memory, width: u32, height: u32, packing: Packing) -> CellOrder {
    let n = width * height;
    let values: Vec<u32> = (0..n).map(|i| (i * 7 + 3) % n).collect();
    OrderBuilder::from_thresholds(memory, width, height, &values, packing)
        .expect("scrambled order")
}

pub fn bayer4_order(memory: &Memory) -> CellOrder {
    OrderBuilder::from_thresholds(memory, 4, 4, &BAYER4, Packing::Mask32).expect("bayer order")
}

/// A spot-screen order; `max_order_bytes` of 0 keeps the sampled strip.
pub fn screen_order(
    memory: &Memory,
    frequency: f64,
    angle: f64,
    max_order_bytes: usize,
    packing: Packing,
) -> CellOrder {
    let request = ScreenRequest {
        frequency,
        angle,
        resolution: 300.0,
        ..ScreenRequest::default()
    };
    let (_, samples) = ht_screen::build_screen(&request, SpotFunction::Round).expect("screen");
    OrderBuilder::from_screen(memory, &samples, max_order_bytes, packing).expect("screen order")
}

/// A context of `model` with `order` installed for every component.
pub fn installed(model: ColorModel, order: impl FnOnce(&Memory) -> CellOrder) -> HalftoneContext {
    let mut ctx = HalftoneContext::new(Memory::new(), model);
    let order = order(ctx.memory());
    ctx.install(&mut DeviceHalftone::new(HalftoneType::Screen, order))
        .expect("install");
    ctx
}

/// Write `yaml` to a config file inside `dir`.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("halftone.yaml");
    std::fs::write(&path, yaml).expect("write config");
    path
}
