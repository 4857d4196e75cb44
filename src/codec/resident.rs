//! Built-in resident orders.
//!
//! Ordered-dither (Bayer) cells of size 2, 4 and 8, computed at compile time
//! in [`Packing::Mask32`] form. A received order whose arrays match a
//! resident one is switched over to the static arrays, and screens may name
//! a resident pattern directly.

use crate::error::Result;
use crate::memory::MemoryId;
use crate::order::{mask32_record, CellOrder, OrderData, OrderGeometry, Packing};

#[derive(Debug)]
pub struct ResidentOrder {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub packing: Packing,
    pub levels: &'static [u32],
    pub bit_data: &'static [u8],
}

impl ResidentOrder {
    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn num_bits(&self) -> u32 {
        (self.bit_data.len() / self.packing.element_size()) as u32
    }

    /// A complete order pointing at the static arrays.
    pub fn to_order(&'static self, memory: MemoryId) -> Result<CellOrder> {
        let geometry = OrderGeometry::complete(self.width, self.height);
        CellOrder::from_parts(
            memory,
            geometry,
            self.packing,
            OrderData::Resident(self.levels),
            OrderData::Resident(self.bit_data),
            None,
        )
    }

    /// True if transmitted `levels` and `bit_data` are a prefix of this
    /// order's arrays.
    pub fn covers(&self, packing: Packing, levels: &[u32], bit_data: &[u8]) -> bool {
        self.packing == packing
            && self.levels.len() >= levels.len()
            && self.bit_data.len() >= bit_data.len()
            && self.levels[..levels.len()] == *levels
            && self.bit_data[..bit_data.len()] == *bit_data
    }
}

/// Rank of pixel `(x, y)` in a Bayer matrix of size `1 << bits`.
const fn bayer_rank(x: u32, y: u32, bits: u32) -> u32 {
    let mut v = 0;
    let mut i = 0;
    while i < bits {
        let xb = (x >> i) & 1;
        let yb = (y >> i) & 1;
        v = (v << 2) | ((xb ^ yb) << 1) | yb;
        i += 1;
    }
    v
}

/// Mask32 records of a Bayer cell of size `1 << bits`, darkest rank first.
const fn bayer_records<const LEN: usize>(bits: u32) -> [u8; LEN] {
    let size = 1u32 << bits;
    let mut out = [0u8; LEN];
    let mut y = 0;
    while y < size {
        let mut x = 0;
        while x < size {
            let rank = bayer_rank(x, y, bits) as usize;
            let (offset, mask) = mask32_record(y * size + x, size);
            let o = offset.to_le_bytes();
            let m = mask.to_le_bytes();
            let mut k = 0;
            while k < 4 {
                out[rank * 8 + k] = o[k];
                out[rank * 8 + 4 + k] = m[k];
                k += 1;
            }
            x += 1;
        }
        y += 1;
    }
    out
}

const fn complete_levels<const LEN: usize>() -> [u32; LEN] {
    let mut out = [0u32; LEN];
    let mut i = 0;
    while i < LEN {
        out[i] = i as u32;
        i += 1;
    }
    out
}

static BAYER2_LEVELS: [u32; 5] = complete_levels::<5>();
static BAYER2_BITS: [u8; 32] = bayer_records::<32>(1);
static BAYER4_LEVELS: [u32; 17] = complete_levels::<17>();
static BAYER4_BITS: [u8; 128] = bayer_records::<128>(2);
static BAYER8_LEVELS: [u32; 65] = complete_levels::<65>();
static BAYER8_BITS: [u8; 512] = bayer_records::<512>(3);

static RESIDENTS: [ResidentOrder; 3] = [
    ResidentOrder {
        name: "bayer2",
        width: 2,
        height: 2,
        packing: Packing::Mask32,
        levels: &BAYER2_LEVELS,
        bit_data: &BAYER2_BITS,
    },
    ResidentOrder {
        name: "bayer4",
        width: 4,
        height: 4,
        packing: Packing::Mask32,
        levels: &BAYER4_LEVELS,
        bit_data: &BAYER4_BITS,
    },
    ResidentOrder {
        name: "bayer8",
        width: 8,
        height: 8,
        packing: Packing::Mask32,
        levels: &BAYER8_LEVELS,
        bit_data: &BAYER8_BITS,
    },
];

/// Every resident order, smallest first.
pub fn candidates() -> impl Iterator<Item = &'static ResidentOrder> {
    RESIDENTS.iter()
}

pub fn find(name: &str) -> Option<&'static ResidentOrder> {
    candidates().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// First resident order covering the given arrays.
pub fn find_match(packing: Packing, levels: &[u32], bit_data: &[u8]) -> Option<&'static ResidentOrder> {
    candidates().find(|r| r.covers(packing, levels, bit_data))
}
