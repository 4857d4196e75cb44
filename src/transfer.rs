//! Transfer functions.
//!
//! A transfer function remaps intensities before halftoning to compensate
//! for device response. It is stored as a 256-entry table of fractions in
//! `0..=FRAC_1`, indexed by the 8-bit input level.

/// Fixed-point representation of 1.0.
pub const FRAC_1: u16 = 0x7ff8;

/// Number of samples in a [`TransferMap`].
pub const TRANSFER_MAP_SIZE: usize = 256;

/// Convert an 8-bit level to a fraction, rounding to nearest.
pub fn byte_to_frac(v: u8) -> u16 {
    ((v as u32 * FRAC_1 as u32 + 127) / 255) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Identity,
    Sampled,
}

/// A sampled transfer function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMap {
    kind: TransferKind,
    values: [u16; TRANSFER_MAP_SIZE],
}

impl TransferMap {
    pub fn identity() -> Self {
        let mut values = [0u16; TRANSFER_MAP_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            *v = byte_to_frac(i as u8);
        }
        Self {
            kind: TransferKind::Identity,
            values,
        }
    }

    /// Sample `f` on `0.0..=1.0`; results are clamped to the unit range.
    pub fn from_fn(f: impl Fn(f64) -> f64) -> Self {
        let mut values = [0u16; TRANSFER_MAP_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            let y = f(i as f64 / 255.0);
            let y = if y.is_nan() { 0.0 } else { y.clamp(0.0, 1.0) };
            *v = (y * FRAC_1 as f64).round() as u16;
        }
        Self {
            kind: TransferKind::Sampled,
            values,
        }
    }

    pub fn gamma(gamma: f64) -> Self {
        Self::from_fn(|x| x.powf(gamma))
    }

    /// Build a map from raw samples; `None` if any sample exceeds `FRAC_1`.
    pub fn from_samples(values: [u16; TRANSFER_MAP_SIZE]) -> Option<Self> {
        if values.iter().any(|&v| v > FRAC_1) {
            return None;
        }
        Some(Self {
            kind: TransferKind::Sampled,
            values,
        })
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn is_identity(&self) -> bool {
        self.kind == TransferKind::Identity
    }

    pub fn values(&self) -> &[u16; TRANSFER_MAP_SIZE] {
        &self.values
    }

    /// Transferred intensity of an 8-bit input level.
    #[inline]
    pub fn sample(&self, v: u8) -> u16 {
        self.values[v as usize]
    }

    /// True when the map darkens as the input brightens.
    pub fn is_decreasing(&self) -> bool {
        self.values[0] > self.values[TRANSFER_MAP_SIZE - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_to_frac_endpoints() {
        assert_eq!(byte_to_frac(0), 0);
        assert_eq!(byte_to_frac(255), FRAC_1);
        assert_eq!(byte_to_frac(128), 16444);
    }

    #[test]
    fn test_identity_matches_byte_to_frac() {
        let map = TransferMap::identity();
        assert!(map.is_identity());
        for v in [0u8, 1, 17, 128, 254, 255] {
            assert_eq!(map.sample(v), byte_to_frac(v));
        }
    }

    #[test]
    fn test_gamma_is_monotonic() {
        let map = TransferMap::gamma(2.2);
        assert_eq!(map.kind(), TransferKind::Sampled);
        assert_eq!(map.sample(0), 0);
        assert_eq!(map.sample(255), FRAC_1);
        assert!(map.values().windows(2).all(|w| w[0] <= w[1]));
        assert!(!map.is_decreasing());
    }

    #[test]
    fn test_inverted_map_is_decreasing() {
        let map = TransferMap::from_fn(|x| 1.0 - x);
        assert!(map.is_decreasing());
        assert_eq!(map.sample(0), FRAC_1);
    }

    #[test]
    fn test_from_samples_rejects_overflow() {
        let mut values = [0u16; TRANSFER_MAP_SIZE];
        assert!(TransferMap::from_samples(values).is_some());
        values[3] = FRAC_1 + 1;
        assert!(TransferMap::from_samples(values).is_none());
    }
}
