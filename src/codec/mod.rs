//! Halftone wire record.
//!
//! ```text
//! set        := type:u8 count:u8 component{count}
//! component  := width height shift num_levels num_bits   (varints)
//!               packing:u8 levels:u32le{num_levels}
//!               bit_data:[u8; num_bits * element_size] transfer
//! transfer   := 0 (absent) | 1 (identity) | 2 values:u16le{256}
//! ```
//!
//! The writer sizes the record before touching the buffer. The reader checks
//! every declared length against the bytes left before allocating, rebuilds
//! each order in the context's memory and installs the set; an order that
//! matches a resident pattern is switched to the static arrays.

pub mod resident;
pub mod varint;

use std::rc::Rc;

use crate::error::{HalftoneError, Result};
use crate::halftone::{DeviceHalftone, HalftoneContext, HalftoneSet, HalftoneType, MAX_COMPONENTS};
use crate::memory::Memory;
use crate::order::{CellOrder, OrderData, OrderGeometry, Packing};
use crate::transfer::{TransferKind, TransferMap, TRANSFER_MAP_SIZE};

const TF_NONE: u8 = 0;
const TF_IDENTITY: u8 = 1;
const TF_COMPLETE: u8 = 2;

const TRANSFER_BYTES: usize = TRANSFER_MAP_SIZE * 2;

fn transfer_len(transfer: Option<&TransferMap>) -> usize {
    match transfer {
        Some(map) if map.kind() == TransferKind::Sampled => 1 + TRANSFER_BYTES,
        _ => 1,
    }
}

fn component_len(order: &CellOrder) -> usize {
    let g = order.geometry();
    varint::encoded_len(g.width)
        + varint::encoded_len(g.height)
        + varint::encoded_len(g.shift)
        + varint::encoded_len(g.num_levels)
        + varint::encoded_len(g.num_bits)
        + 1
        + order.levels().len() * 4
        + order.bit_data().len()
        + transfer_len(order.transfer().map(Rc::as_ref))
}

/// Exact size of the record for `set`.
pub fn encoded_len(set: &HalftoneSet) -> usize {
    2 + set.components().iter().map(|c| component_len(c)).sum::<usize>()
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn bytes(&mut self, data: &[u8]) -> Result<()> {
        let end = self.pos + data.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or_else(|| HalftoneError::Invariant("record larger than its computed size".into()))?
            .copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn u8(&mut self, v: u8) -> Result<()> {
        self.bytes(&[v])
    }

    fn varint(&mut self, v: u32) -> Result<()> {
        let tail = self.buf.get_mut(self.pos..).unwrap_or_default();
        self.pos += varint::encode(v, tail)?;
        Ok(())
    }

    fn component(&mut self, order: &CellOrder) -> Result<()> {
        let g = order.geometry();
        for v in [g.width, g.height, g.shift, g.num_levels, g.num_bits] {
            self.varint(v)?;
        }
        self.u8(order.packing().tag())?;
        for level in order.levels() {
            self.bytes(&level.to_le_bytes())?;
        }
        self.bytes(order.bit_data())?;
        match order.transfer().map(Rc::as_ref) {
            None => self.u8(TF_NONE),
            Some(map) if map.kind() == TransferKind::Identity => self.u8(TF_IDENTITY),
            Some(map) => {
                self.u8(TF_COMPLETE)?;
                for v in map.values() {
                    self.bytes(&v.to_le_bytes())?;
                }
                Ok(())
            }
        }
    }
}

/// Serialize `set` into `buf`, returning the bytes written.
///
/// If `buf` is too small nothing is written and the error carries the exact
/// size needed.
pub fn write(set: &HalftoneSet, buf: &mut [u8]) -> Result<usize> {
    let count = set.num_components();
    if count == 0 || count > MAX_COMPONENTS {
        return Err(HalftoneError::Invariant(format!("{} halftone components", count)));
    }
    let required = encoded_len(set);
    if buf.len() < required {
        return Err(HalftoneError::BufferTooSmall {
            required,
            available: buf.len(),
        });
    }
    let mut w = Writer { buf, pos: 0 };
    w.u8(set.kind().tag())?;
    w.u8(count as u8)?;
    for order in set.components() {
        w.component(order)?;
    }
    if w.pos != required {
        return Err(HalftoneError::Invariant(format!(
            "wrote {} bytes, expected {}",
            w.pos, required
        )));
    }
    tracing::debug!(id = set.id(), bytes = required, components = count, "Wrote halftone record");
    Ok(required)
}

/// Serialize `set` into a new vector.
pub fn to_vec(set: &HalftoneSet) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; encoded_len(set)];
    let n = write(set, &mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let out = data
            .get(self.pos..self.pos.saturating_add(n))
            .ok_or_else(|| HalftoneError::malformed(self.pos, format!("{} bytes past the end", n)))?;
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn varint(&mut self) -> Result<u32> {
        let (v, n) = varint::decode(&self.data[self.pos..], self.pos)?;
        self.pos += n;
        Ok(v)
    }

    fn transfer(&mut self) -> Result<Option<Rc<TransferMap>>> {
        let at = self.pos;
        match self.u8()? {
            TF_NONE => Ok(None),
            TF_IDENTITY => Ok(Some(Rc::new(TransferMap::identity()))),
            TF_COMPLETE => {
                let raw = self.bytes(TRANSFER_BYTES)?;
                let mut values = [0u16; TRANSFER_MAP_SIZE];
                for (v, b) in values.iter_mut().zip(raw.chunks_exact(2)) {
                    *v = u16::from_le_bytes([b[0], b[1]]);
                }
                TransferMap::from_samples(values)
                    .map(|map| Some(Rc::new(map)))
                    .ok_or_else(|| HalftoneError::malformed(at, "transfer value out of range"))
            }
            tag => Err(HalftoneError::malformed(at, format!("unknown transfer tag {}", tag))),
        }
    }

    fn component(&mut self, memory: &Memory) -> Result<CellOrder> {
        let start = self.pos;
        let geometry = OrderGeometry {
            width: self.varint()?,
            height: self.varint()?,
            shift: self.varint()?,
            num_levels: self.varint()?,
            num_bits: self.varint()?,
        };
        let tag = self.u8()?;
        let packing = Packing::from_tag(tag)
            .ok_or_else(|| HalftoneError::malformed(start, format!("unknown packing tag {}", tag)))?;
        geometry
            .check(packing)
            .map_err(|e| HalftoneError::malformed(start, e.to_string()))?;

        let levels_size = geometry.num_levels as u64 * 4;
        let bits_size = geometry.num_bits as u64 * packing.element_size() as u64;
        let needed = levels_size + bits_size + 1;
        if needed > self.remaining() as u64 {
            return Err(HalftoneError::malformed(
                start,
                format!("component needs {} bytes, {} remain", needed, self.remaining()),
            ));
        }

        let raw_levels = self.bytes(levels_size as usize)?;
        let mut levels = memory.alloc_vec(geometry.num_levels as usize, 0u32, "order levels")?;
        for (level, b) in levels.iter_mut().zip(raw_levels.chunks_exact(4)) {
            *level = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        }
        let bit_data = memory.alloc_copy(self.bytes(bits_size as usize)?, "order bits")?;
        let transfer = self.transfer()?;

        let (levels, bit_data) = match resident::find_match(packing, &levels, &bit_data) {
            Some(r) => {
                tracing::debug!(resident = r.name, "Substituting resident halftone order");
                (
                    OrderData::Resident(&r.levels[..levels.len()]),
                    OrderData::Resident(&r.bit_data[..bit_data.len()]),
                )
            }
            None => (OrderData::owned(levels), OrderData::owned(bit_data)),
        };
        CellOrder::from_parts(memory.id(), geometry, packing, levels, bit_data, transfer).map_err(
            |e| match e {
                HalftoneError::InvalidOrder(reason) => HalftoneError::malformed(start, reason),
                other => other,
            },
        )
    }
}

/// Parse one record from the front of `data`, install it in `ctx`, and
/// return the bytes consumed.
///
/// On error every array read so far is dropped and the context keeps its
/// current halftone.
pub fn read_and_install(ctx: &mut HalftoneContext, data: &[u8]) -> Result<usize> {
    let mut r = Reader { data, pos: 0 };
    let tag = r.u8()?;
    let kind = HalftoneType::from_tag(tag)
        .ok_or_else(|| HalftoneError::malformed(0, format!("unknown halftone type {}", tag)))?;
    let count = r.u8()? as usize;
    if count == 0 || count > MAX_COMPONENTS {
        return Err(HalftoneError::malformed(1, format!("{} components", count)));
    }

    let mut candidate = DeviceHalftone::explicit(kind);
    for comp in 0..count {
        let order = r.component(ctx.memory())?;
        candidate.push_component(comp, order);
    }
    ctx.install(&mut candidate)?;
    tracing::debug!(bytes = r.pos, components = count, "Read halftone record");
    Ok(r.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorModel;
    use crate::error::ErrorKind;
    use crate::order::OrderBuilder;

    fn gray_context() -> HalftoneContext {
        HalftoneContext::new(Memory::new(), ColorModel::gray(2))
    }

    fn installed(ctx: &mut HalftoneContext, w: u32, h: u32, transfer: Option<TransferMap>) {
        let values: Vec<u32> = (0..w * h).map(|i| (i * 5) % (w * h)).collect();
        let mut order =
            OrderBuilder::from_thresholds(ctx.memory(), w, h, &values, Packing::Index16).unwrap();
        order.set_transfer(transfer.map(Rc::new));
        ctx.install(&mut DeviceHalftone::new(HalftoneType::Threshold, order)).unwrap();
    }

    #[test]
    fn test_header_layout() {
        let mut ctx = gray_context();
        installed(&mut ctx, 3, 1, None);
        let bytes = to_vec(ctx.halftone().unwrap()).unwrap();
        assert_eq!(
            bytes,
            vec![
                4, 1, // type, count
                3, 1, 0, 4, 3, 1, // width height shift levels bits packing
                0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, // levels
                0, 0, 2, 0, 1, 0, // pixels by rank
                0, // no transfer
            ]
        );
    }

    #[test]
    fn test_transfer_tags() {
        let mut ctx = gray_context();
        installed(&mut ctx, 2, 2, Some(TransferMap::identity()));
        let bytes = to_vec(ctx.halftone().unwrap()).unwrap();
        assert_eq!(*bytes.last().unwrap(), TF_IDENTITY);

        installed(&mut ctx, 2, 2, Some(TransferMap::gamma(2.2)));
        let set = ctx.share().unwrap();
        let bytes = to_vec(&set).unwrap();
        assert_eq!(bytes.len(), encoded_len(&set));
        assert_eq!(bytes[bytes.len() - 1 - TRANSFER_BYTES], TF_COMPLETE);

        let mut other = gray_context();
        read_and_install(&mut other, &bytes).unwrap();
        let read = other.halftone().unwrap().component(0).unwrap().transfer().unwrap().clone();
        assert_eq!(read.values(), set.component(0).unwrap().transfer().unwrap().values());
    }

    #[test]
    fn test_undersized_buffer_reports_exact_size() {
        let mut ctx = gray_context();
        installed(&mut ctx, 5, 5, None);
        let set = ctx.share().unwrap();
        let mut small = vec![0xaa; 10];
        let err = write(&set, &mut small).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RangeCheck);
        let required = match err {
            HalftoneError::BufferTooSmall { required, available } => {
                assert_eq!(available, 10);
                required
            }
            other => panic!("unexpected {other:?}"),
        };
        assert!(small.iter().all(|&b| b == 0xaa), "nothing written");
        let mut exact = vec![0u8; required];
        assert_eq!(write(&set, &mut exact).unwrap(), required);
    }

    #[test]
    fn test_truncated_record_leaves_context_alone() {
        let mut writer = gray_context();
        installed(&mut writer, 4, 4, None);
        let bytes = to_vec(writer.halftone().unwrap()).unwrap();

        let mut reader = gray_context();
        installed(&mut reader, 2, 2, None);
        let before = reader.share().unwrap();
        for cut in [0, 1, 2, 7, bytes.len() - 1] {
            let err = read_and_install(&mut reader, &bytes[..cut]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RangeCheck, "cut at {cut}");
            assert!(Rc::ptr_eq(&before, reader.halftone().unwrap()));
        }
    }

    #[test]
    fn test_huge_declared_size_is_rejected_before_allocating() {
        let mut bytes = vec![1, 1];
        for v in [4u32, 4, 0, u32::MAX, 16] {
            let mut buf = [0u8; varint::MAX_LEN];
            let n = varint::encode(v, &mut buf).unwrap();
            bytes.extend_from_slice(&buf[..n]);
        }
        bytes.push(Packing::Mask32.tag());
        let mut ctx = gray_context();
        let err = read_and_install(&mut ctx, &bytes).unwrap_err();
        assert!(matches!(err, HalftoneError::Malformed { .. }));
    }

    #[test]
    fn test_bad_tags() {
        let mut ctx = gray_context();
        assert!(read_and_install(&mut ctx, &[42, 1]).is_err());
        assert!(read_and_install(&mut ctx, &[1, 0]).is_err());
        assert!(read_and_install(&mut ctx, &[1, 1, 1, 1, 0, 2, 1, 9]).is_err());
    }

    #[test]
    fn test_inconsistent_levels_are_malformed() {
        let mut writer = gray_context();
        installed(&mut writer, 2, 1, None);
        let mut bytes = to_vec(writer.halftone().unwrap()).unwrap();
        // levels start after 2 header bytes and 6 geometry bytes; make them decrease
        bytes[8 + 4] = 2;
        bytes[8 + 8] = 1;
        let mut reader = gray_context();
        let err = read_and_install(&mut reader, &bytes).unwrap_err();
        assert!(matches!(err, HalftoneError::Malformed { offset: 2, .. }));
    }

    #[test]
    fn test_records_that_paint_extra_pixels_are_malformed() {
        let mut writer = gray_context();
        let values: Vec<u32> = (0..40).rev().collect();
        let order =
            OrderBuilder::from_thresholds(writer.memory(), 40, 1, &values, Packing::Mask32).unwrap();
        writer
            .install(&mut DeviceHalftone::new(HalftoneType::Threshold, order))
            .unwrap();
        let clean = to_vec(writer.halftone().unwrap()).unwrap();
        let bits_start = clean.len() - 1 - 40 * 8;

        // first record also flips the last pixel of its unit
        let mut bytes = clean.clone();
        bytes[bits_start + 4] |= 1;
        let mut reader = gray_context();
        let err = read_and_install(&mut reader, &bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RangeCheck);
        assert!(reader.halftone().is_none());

        assert_eq!(read_and_install(&mut reader, &clean).unwrap(), clean.len());
    }

    #[test]
    fn test_repeated_pixels_are_malformed() {
        let mut writer = gray_context();
        installed(&mut writer, 3, 1, None);
        let mut bytes = to_vec(writer.halftone().unwrap()).unwrap();
        // records start at byte 24: pixels 0, 2, 1 become 0, 0, 1
        bytes[26] = 0;
        let mut reader = gray_context();
        installed(&mut reader, 2, 2, None);
        let before = reader.share().unwrap();
        let err = read_and_install(&mut reader, &bytes).unwrap_err();
        assert!(matches!(err, HalftoneError::Malformed { offset: 2, .. }));
        assert!(Rc::ptr_eq(&before, reader.halftone().unwrap()));
    }

    #[test]
    fn test_resident_substitution() {
        let writer_mem = Memory::new();
        let resident = resident::find("bayer4").unwrap();
        let values: Vec<u32> = {
            // rebuild the Bayer 4 ranks from the resident records
            let order = resident.to_order(writer_mem.id()).unwrap();
            let mut v = vec![0u32; 16];
            for rank in 0..16 {
                let (x, y) = order.bit_index(rank).unwrap();
                v[(y * 4 + x) as usize] = rank;
            }
            v
        };
        let mut writer = HalftoneContext::new(writer_mem, ColorModel::gray(2));
        let order =
            OrderBuilder::from_thresholds(writer.memory(), 4, 4, &values, Packing::Mask32).unwrap();
        writer
            .install(&mut DeviceHalftone::new(HalftoneType::Threshold, order))
            .unwrap();
        let bytes = to_vec(writer.halftone().unwrap()).unwrap();

        let mut reader = gray_context();
        assert_eq!(read_and_install(&mut reader, &bytes).unwrap(), bytes.len());
        let read = reader.halftone().unwrap().component(0).unwrap().clone();
        assert!(read.is_resident());
        assert_eq!(read.bit_data(), resident.bit_data);
        assert_eq!(to_vec(reader.halftone().unwrap()).unwrap(), bytes);
    }
}
