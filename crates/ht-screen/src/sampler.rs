//! Spot function sampling over a screen cell.
//!
//! Every pixel of the `W x D` strip is mapped into the unit cell of the
//! spot it belongs to, the spot function is evaluated there, and the result
//! is scaled to `0..=2 * MAX_HT_SAMPLE`. The samples are what a halftone
//! order is sorted from.

use crate::cell::CellParams;
use crate::error::ScreenError;
use crate::spot::SpotFunction;

/// Half of the sample range; a spot value of `v` samples to
/// `(v + 1) * MAX_HT_SAMPLE`.
pub const MAX_HT_SAMPLE: u32 = 0x7fff;

/// A 2D affine transform in PostScript layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub xx: f64,
    pub xy: f64,
    pub yx: f64,
    pub yy: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Matrix {
    /// Map device space into spot space, where each spot covers a 2x2
    /// square centered on an even lattice point.
    pub fn for_cell(p: &CellParams) -> Self {
        let q = 2.0 / p.c as f64;
        let (r, r1) = (p.r as f64, p.r1 as f64);
        Self {
            xx: q * r * p.m1 as f64,
            xy: q * -r1 * p.n as f64,
            yx: q * r * p.n1 as f64,
            yy: q * r1 * p.m as f64,
            tx: -1.0,
            ty: -1.0,
        }
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.xx * x + self.yx * y + self.tx,
            self.xy * x + self.yy * y + self.ty,
        )
    }

    pub fn transform_distance(&self, x: f64, y: f64) -> (f64, f64) {
        (self.xx * x + self.yx * y, self.xy * x + self.yy * y)
    }

    /// Inverse transform, or `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Self> {
        let det = self.xx * self.yy - self.xy * self.yx;
        if det == 0.0 {
            return None;
        }
        let xx = self.yy / det;
        let xy = -self.xy / det;
        let yx = -self.yx / det;
        let yy = self.xx / det;
        Some(Self {
            xx,
            xy,
            yx,
            yy,
            tx: -(self.tx * xx + self.ty * yx),
            ty: -(self.tx * xy + self.ty * yy),
        })
    }
}

/// Samples of one strip of a screen cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSamples {
    /// Strip width
    pub width: u32,
    /// Strip height
    pub strip_height: u32,
    /// Rows after which the shifted strip repeats
    pub full_height: u32,
    /// Horizontal shift between strips
    pub shift: u32,
    /// `width * strip_height` samples in row-major order
    pub samples: Vec<u32>,
}

/// Wrap a coordinate back into `-1..1` by whole spot periods.
fn wrap_unit(v: f64) -> f64 {
    if v < -1.0 {
        v + (((-v.ceil()) as i64 + 1) & !1) as f64
    } else if v >= 1.0 {
        v - (((v as i64) + 1) & !1) as f64
    } else {
        v
    }
}

/// Position of pixel `(x, y)` within its spot, in `-1..1` on both axes.
fn spot_point(mat: &Matrix, inv: &Matrix, x: u32, y: u32) -> (f64, f64) {
    let (fx, fy) = (x as f64 + 0.501, y as f64 + 0.498);
    let (px, py) = mat.transform_point(fx, fy);
    let sx = (px / 2.0).ceil() * 2.0;
    let sy = (py / 2.0).ceil() * 2.0;
    let (cx, cy) = inv.transform_point(sx, sy);
    let (cx, cy) = (cx.floor() + 0.5, cy.floor() + 0.5);
    let (dx, dy) = mat.transform_distance(fx - cx, fy - cy);
    (wrap_unit(dx + 1.0), wrap_unit(dy + 1.0))
}

/// Sample a built-in spot function over the cell.
pub fn sample_spot(p: &CellParams, spot: SpotFunction) -> Result<CellSamples, ScreenError> {
    sample_with(p, |x, y| spot.evaluate(x, y))
}

/// Sample an arbitrary spot function over the cell.
///
/// Fails if the function leaves `-1..=1` anywhere.
pub fn sample_with<F>(p: &CellParams, spot: F) -> Result<CellSamples, ScreenError>
where
    F: Fn(f64, f64) -> f64,
{
    let mat = Matrix::for_cell(p);
    let inv = mat.invert().ok_or(ScreenError::DegenerateCell)?;
    let mut samples = Vec::with_capacity(p.w as usize * p.d as usize);
    for y in 0..p.d {
        for x in 0..p.w {
            let (sx, sy) = spot_point(&mat, &inv, x, y);
            let value = spot(sx, sy);
            if !(-1.0..=1.0).contains(&value) {
                return Err(ScreenError::SpotOutOfRange { value, x, y });
            }
            samples.push(((value + 1.0) * MAX_HT_SAMPLE as f64) as u32);
        }
    }
    Ok(CellSamples {
        width: p.w,
        strip_height: p.d,
        full_height: p.full_height(),
        shift: p.s,
        samples,
    })
}
