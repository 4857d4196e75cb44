//! Rational screen cell geometry.
//!
//! A screen at an arbitrary angle is approximated by a cell spanned by two
//! integer device-space vectors `(M, N)` and `(-N1, M1)`, each covering `R`
//! (resp. `R1`) repetitions of the spot. Such a cell tiles the plane as a
//! `W x D` strip that is repeated with a horizontal shift of `S` pixels per
//! strip, which is exactly the shape a halftone order stores.

use crate::error::ScreenError;

/// Greatest common divisor; `gcd(0, n) == n`.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Number of rows after which a strip of `height` rows shifted by `shift`
/// columns per repetition lines up with itself again.
pub fn full_height(width: u32, height: u32, shift: u32) -> u32 {
    if shift == 0 {
        height
    } else {
        let period = width as u64 / gcd(width as u64, shift as u64);
        (period * height as u64).min(u32::MAX as u64) as u32
    }
}

/// Bytes per row of a bitmap `width` pixels wide, padded to 64 bits.
pub const fn bitmap_raster(width: u32) -> usize {
    (width as usize).div_ceil(64) * 8
}

/// Derived geometry of a rational screen cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellParams {
    /// First cell vector, x component
    pub m: i32,
    /// First cell vector, y component
    pub n: i32,
    /// Spot repetitions along the first vector
    pub r: i32,
    /// Second cell vector, y component
    pub m1: i32,
    /// Second cell vector, x component (negated)
    pub n1: i32,
    /// Spot repetitions along the second vector
    pub r1: i32,
    /// Cell area in pixels
    pub c: u64,
    /// Strip height
    pub d: u32,
    /// Strip height of the transposed tiling
    pub d1: u32,
    /// Strip width
    pub w: u32,
    /// Strip width of the transposed tiling
    pub w1: u32,
    /// Horizontal shift between consecutive strips
    pub s: u32,
}

impl CellParams {
    /// Compute the strip geometry for the given cell vectors.
    pub fn new(m: i32, n: i32, r: i32, m1: i32, n1: i32, r1: i32) -> Result<Self, ScreenError> {
        let (am, an) = (m.unsigned_abs() as u64, n.unsigned_abs() as u64);
        let (am1, an1) = (m1.unsigned_abs() as u64, n1.unsigned_abs() as u64);
        let c = am * am1 + an * an1;
        if c == 0 || r <= 0 || r1 <= 0 {
            return Err(ScreenError::DegenerateCell);
        }
        let d = gcd(am1, an);
        let d1 = gcd(am, an1);
        let w = c / d;
        let w1 = c / d1;
        if w > u32::MAX as u64 || w1 > u32::MAX as u64 || d > u32::MAX as u64 {
            return Err(ScreenError::DegenerateCell);
        }

        let s = if m1 != 0 && n != 0 {
            strip_shift(m, n, m1, n1, d as i64, w as i64)?
        } else {
            0
        };

        Ok(Self {
            m,
            n,
            r,
            m1,
            n1,
            r1,
            c,
            d: d as u32,
            d1: d1 as u32,
            w: w as u32,
            w1: w1 as u32,
            s,
        })
    }

    /// Cell for an isotropic screen, whose second vector is the first one
    /// rotated by 90 degrees.
    pub fn square(m: i32, n: i32, r: i32) -> Result<Self, ScreenError> {
        Self::new(m, n, r, m, n, r)
    }

    /// Rows after which the shifted strip repeats exactly.
    pub fn full_height(&self) -> u32 {
        full_height(self.w, self.d, self.s)
    }
}

/// Walk the lattice until a point one strip below the origin is found and
/// return how far it sits horizontally, folded into `0..w`.
fn strip_shift(m: i32, n: i32, m1: i32, n1: i32, d: i64, w: i64) -> Result<u32, ScreenError> {
    let (am1, an) = (m1.unsigned_abs() as i64, n.unsigned_abs() as i64);
    let (mut h, mut k, mut dy) = (0i64, 0i64, 0i64);
    let mut steps = 0i64;
    while dy != d {
        if dy > d {
            k += m1.signum() as i64;
            dy -= am1;
        } else {
            h += n.signum() as i64;
            dy += an;
        }
        steps += 1;
        if steps > am1 + an + 2 {
            return Err(ScreenError::DegenerateCell);
        }
    }
    let shift = h * m as i64 + k * n1 as i64;
    Ok((-shift).rem_euclid(w) as u32)
}

/// Request for a screen cell approximating a frequency and angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRequest {
    /// Lines per inch
    pub frequency: f64,
    /// Degrees, counter-clockwise
    pub angle: f64,
    /// Device pixels per inch
    pub resolution: f64,
    /// Keep trying larger multiples until the angle error drops under 1%
    pub accurate: bool,
    /// Smallest acceptable number of gray levels (cell area)
    pub min_levels: u64,
    /// Upper bound in bytes for one strip of the cell bitmap
    pub max_size: usize,
}

impl Default for ScreenRequest {
    fn default() -> Self {
        Self {
            frequency: 60.0,
            angle: 45.0,
            resolution: 300.0,
            accurate: false,
            min_levels: 1,
            max_size: 64 * 1024,
        }
    }
}

/// Cell chosen for a [`ScreenRequest`] and the screen it actually yields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSelection {
    /// Chosen cell
    pub params: CellParams,
    /// Frequency the cell reproduces
    pub actual_frequency: f64,
    /// Angle the cell reproduces, in `0..360`
    pub actual_angle: f64,
}

const MAX_MULTIPLE: i32 = 64;

/// Choose the integer cell that best approximates the requested screen.
///
/// For each multiple `rt` of the ideal spot the cell vectors are rounded to
/// whole pixels; the candidate with the smallest rounding error per spot
/// wins. Without `accurate` the first acceptable candidate is taken.
pub fn pick_cell(req: &ScreenRequest) -> Result<CellSelection, ScreenError> {
    if !(req.frequency >= 0.1) {
        return Err(ScreenError::FrequencyTooLow(req.frequency));
    }
    let size = req.resolution / req.frequency;
    let (sin, cos) = req.angle.to_radians().sin_cos();
    let u0 = (size * cos, size * sin);
    let u1 = (-size * sin, size * cos);

    let mut best: Option<CellParams> = None;
    let mut best_var = f64::MAX;
    for rt in 1..=MAX_MULTIPLE {
        let f = rt as f64;
        let (x0, y0) = (u0.0 * f, u0.1 * f);
        let (x1, y1) = (u1.0 * f, u1.1 * f);
        let (ix0, iy0) = (x0.round(), y0.round());
        let (ix1, iy1) = (x1.round(), y1.round());
        let var = ((x0 - ix0).hypot(y0 - iy0) + (x1 - ix1).hypot(y1 - iy1)) / f;
        if var >= best_var {
            continue;
        }
        let (m, n) = (ix0 as i32, iy0 as i32);
        let m1 = if ix0 >= 0.0 { iy1.abs() } else { -iy1.abs() } as i32;
        let n1 = if iy0 >= 0.0 { ix1.abs() } else { -ix1.abs() } as i32;
        let params = match CellParams::new(m, n, rt, m1, n1, rt) {
            Ok(params) => params,
            Err(_) => continue,
        };
        if params.w >= i16::MAX as u32 {
            continue;
        }
        if bitmap_raster(params.w) * params.d as usize > req.max_size {
            break;
        }
        if params.c < req.min_levels {
            continue;
        }
        best = Some(params);
        best_var = var;
        if !req.accurate || var / size <= 0.01 {
            break;
        }
    }

    let params = best.ok_or(ScreenError::NoCellFits {
        max_size: req.max_size,
    })?;
    let (um, un) = (
        params.m as f64 / params.r as f64,
        params.n as f64 / params.r as f64,
    );
    let actual_angle = (un.atan2(um).to_degrees()).rem_euclid(360.0);
    Ok(CellSelection {
        params,
        actual_frequency: req.resolution / um.hypot(un),
        actual_angle,
    })
}
