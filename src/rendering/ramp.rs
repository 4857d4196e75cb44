//! Gray ramps painted through the installed halftone, for inspecting
//! screens.

use crate::color::Polarity;
use crate::error::{HalftoneError, Result};
use crate::halftone::HalftoneContext;

/// One byte per pixel, each a device level of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelImage {
    pub width: u32,
    pub height: u32,
    /// Device levels per pixel (2 for bilevel)
    pub levels: u32,
    /// Level 0 is paper white rather than black
    pub subtractive: bool,
    pub pixels: Vec<u8>,
}

/// Input level of column `x` of a ramp `width` columns wide.
pub fn ramp_value(x: u32, width: u32) -> u8 {
    if width <= 1 {
        return 0;
    }
    ((x as u64 * 255 + (width as u64 - 1) / 2) / (width as u64 - 1)) as u8
}

fn blank(ctx: &HalftoneContext, component: usize, width: u32, height: u32) -> Result<LevelImage> {
    let model = ctx.color_model();
    if component >= model.num_components {
        return Err(HalftoneError::Invariant(format!(
            "component {} of {}",
            component, model.num_components
        )));
    }
    let pixels = ctx
        .memory()
        .alloc_vec(width as usize * height as usize, 0u8, "ramp pixels")?;
    Ok(LevelImage {
        width,
        height,
        levels: model.max_value(component) + 1,
        subtractive: model.polarity == Polarity::Subtractive,
        pixels,
    })
}

/// Paint a left-to-right ramp from 0 to 255 using rendered tiles.
pub fn ramp_with_tiles(
    ctx: &HalftoneContext,
    component: usize,
    width: u32,
    height: u32,
) -> Result<LevelImage> {
    let mut image = blank(ctx, component, width, height)?;
    let stride = width as usize;
    for x in 0..width {
        let pixels = &mut image.pixels;
        ctx.with_tile(component, ramp_value(x, width), |q, tile| {
            for y in 0..height {
                let on = tile.sample(x as u64, y as u64);
                pixels[y as usize * stride + x as usize] = (q.base + u32::from(on)) as u8;
            }
        })?;
    }
    tracing::debug!(component, width, height, "Painted ramp from tiles");
    Ok(image)
}

/// Paint the same ramp by comparing against the threshold array. Only
/// meaningful for bilevel components.
pub fn ramp_with_threshold(
    ctx: &HalftoneContext,
    component: usize,
    width: u32,
    height: u32,
) -> Result<LevelImage> {
    let mut image = blank(ctx, component, width, height)?;
    if image.levels != 2 {
        return Err(HalftoneError::InvalidOrder(format!(
            "threshold ramps need a bilevel component, not {} levels",
            image.levels
        )));
    }
    let threshold = ctx.threshold(component)?;
    let input: Vec<u8> = (0..width).map(|x| ramp_value(x, width)).collect();
    let mut row = vec![0u8; (width as usize).div_ceil(8)];
    for y in 0..height {
        threshold.threshold_row(&input, 0, y, &mut row)?;
        let out = &mut image.pixels[y as usize * width as usize..(y as usize + 1) * width as usize];
        for (x, px) in out.iter_mut().enumerate() {
            *px = (row[x / 8] >> (7 - x % 8)) & 1;
        }
    }
    tracing::debug!(component, width, height, "Painted ramp from threshold array");
    Ok(image)
}
