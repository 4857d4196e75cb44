//! Variable-length unsigned integers: 7 bits per byte, least significant
//! group first, high bit set on every byte but the last.

use crate::error::{HalftoneError, Result};

/// Most bytes a `u32` takes.
pub const MAX_LEN: usize = 5;

pub fn encoded_len(mut v: u32) -> usize {
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Encode `v` into the front of `out`, returning the number of bytes used.
pub fn encode(mut v: u32, out: &mut [u8]) -> Result<usize> {
    let mut i = 0;
    loop {
        let slot = out
            .get_mut(i)
            .ok_or_else(|| HalftoneError::Invariant("varint overruns its buffer".into()))?;
        if v < 0x80 {
            *slot = v as u8;
            return Ok(i + 1);
        }
        *slot = (v as u8 & 0x7f) | 0x80;
        v >>= 7;
        i += 1;
    }
}

/// Decode a varint from the front of `data`, returning the value and the
/// number of bytes consumed. `offset` is only used for error reporting.
pub fn decode(data: &[u8], offset: usize) -> Result<(u32, usize)> {
    let mut value: u64 = 0;
    for (i, &b) in data.iter().take(MAX_LEN).enumerate() {
        value |= ((b & 0x7f) as u64) << (7 * i);
        if b & 0x80 == 0 {
            let value = u32::try_from(value)
                .map_err(|_| HalftoneError::malformed(offset, "integer exceeds 32 bits"))?;
            return Ok((value, i + 1));
        }
    }
    if data.len() < MAX_LEN {
        Err(HalftoneError::malformed(offset, "truncated integer"))
    } else {
        Err(HalftoneError::malformed(offset, "integer longer than 5 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        let cases: [(u32, &[u8]); 5] = [
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (300, &[0xac, 0x02]),
            (u32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];
        for (v, bytes) in cases {
            let mut buf = [0u8; MAX_LEN];
            let n = encode(v, &mut buf).unwrap();
            assert_eq!(&buf[..n], bytes, "{v}");
            assert_eq!(encoded_len(v), n);
            assert_eq!(decode(bytes, 0).unwrap(), (v, n));
        }
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode(&[0x80, 0x80], 3).is_err());
        assert!(decode(&[], 0).is_err());
        assert!(decode(&[0xff, 0xff, 0xff, 0xff, 0x1f], 0).is_err());
        assert!(decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00], 0).is_err());
        match decode(&[0x80], 7).unwrap_err() {
            HalftoneError::Malformed { offset, .. } => assert_eq!(offset, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_encode_needs_room() {
        let mut buf = [0u8; 1];
        assert!(encode(300, &mut buf).is_err());
    }
}
