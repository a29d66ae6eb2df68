use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{read_varint, write_varint, CodecError, CodecResult};

/// A paletted container in its on-wire form.
///
/// Single-value containers write bitsPerEntry = 0 and the lone id; indirect
/// containers write the palette followed by the packed index data. There is
/// no long-count prefix: the reader derives the data length from the entry
/// count and bits per entry. Direct palettes (above 8 bits) are not produced
/// by this server.
#[derive(Debug, Clone, PartialEq)]
pub enum PalettedContainer {
    Single(i32),
    Indirect {
        bits_per_entry: u8,
        palette: Vec<i32>,
        data: Vec<u64>,
    },
}

/// Bits needed for `len` distinct palette entries.
fn palette_bits(len: usize) -> u8 {
    if len <= 1 {
        0
    } else {
        (usize::BITS - (len - 1).leading_zeros()) as u8
    }
}

impl PalettedContainer {
    /// Build a container from raw values. The palette is sorted ascending by
    /// id; bits per entry is clamped into [min_bits, max_bits].
    pub fn from_values(values: &[i32], min_bits: u8, max_bits: u8) -> CodecResult<Self> {
        let mut palette: Vec<i32> = values.to_vec();
        palette.sort_unstable();
        palette.dedup();

        if palette.len() == 1 {
            return Ok(PalettedContainer::Single(palette[0]));
        }

        let bits = palette_bits(palette.len()).clamp(min_bits, max_bits);
        if palette_bits(palette.len()) > max_bits {
            // More distinct ids than the indirect palette can index.
            return Err(CodecError::InvalidPaletteIndex {
                index: palette.len() - 1,
                len: 1 << max_bits,
            });
        }

        let indices: Vec<u16> = values
            .iter()
            .map(|v| palette.binary_search(v).expect("value in palette") as u16)
            .collect();
        Self::from_palette_and_indices(palette, &indices, bits)
    }

    /// Build an indirect container from an explicit palette and index array.
    /// Every index must address the palette; anything else is an invariant
    /// violation reported as `InvalidPaletteIndex`.
    pub fn from_palette_and_indices(
        palette: Vec<i32>,
        indices: &[u16],
        bits_per_entry: u8,
    ) -> CodecResult<Self> {
        for &idx in indices {
            if idx as usize >= palette.len() {
                return Err(CodecError::InvalidPaletteIndex {
                    index: idx as usize,
                    len: palette.len(),
                });
            }
        }
        let data = pack_indices(indices, bits_per_entry);
        Ok(PalettedContainer::Indirect {
            bits_per_entry,
            palette,
            data,
        })
    }

    pub fn write(&self, buf: &mut BytesMut) {
        match self {
            PalettedContainer::Single(id) => {
                buf.put_u8(0);
                write_varint(buf, *id);
            }
            PalettedContainer::Indirect {
                bits_per_entry,
                palette,
                data,
            } => {
                buf.put_u8(*bits_per_entry);
                write_varint(buf, palette.len() as i32);
                for &entry in palette {
                    write_varint(buf, entry);
                }
                for &long in data {
                    buf.put_u64(long);
                }
            }
        }
    }

    /// Decode a container holding `entries` values back into the value array.
    pub fn read(buf: &mut BytesMut, entries: usize) -> CodecResult<Vec<i32>> {
        if !buf.has_remaining() {
            return Err(CodecError::TruncatedField);
        }
        let bits_per_entry = buf.get_u8();
        if bits_per_entry == 0 {
            let id = read_varint(buf)?;
            return Ok(vec![id; entries]);
        }
        let palette_len = read_varint(buf)? as usize;
        let mut palette = Vec::with_capacity(palette_len);
        for _ in 0..palette_len {
            palette.push(read_varint(buf)?);
        }
        let entries_per_long = 64 / bits_per_entry as usize;
        let long_count = (entries + entries_per_long - 1) / entries_per_long;
        if buf.remaining() < long_count * 8 {
            return Err(CodecError::TruncatedField);
        }
        let mask = (1u64 << bits_per_entry) - 1;
        let mut values = Vec::with_capacity(entries);
        let mut longs = Vec::with_capacity(long_count);
        for _ in 0..long_count {
            longs.push(buf.get_u64());
        }
        for i in 0..entries {
            let long = longs[i / entries_per_long];
            let shift = (i % entries_per_long) * bits_per_entry as usize;
            let idx = ((long >> shift) & mask) as usize;
            let value = palette
                .get(idx)
                .copied()
                .ok_or(CodecError::InvalidPaletteIndex {
                    index: idx,
                    len: palette.len(),
                })?;
            values.push(value);
        }
        Ok(values)
    }
}

/// Pack indices into 64-bit words: floor(64/bits) entries per long, no entry
/// straddling a long boundary.
pub fn pack_indices(indices: &[u16], bits_per_entry: u8) -> Vec<u64> {
    let entries_per_long = 64 / bits_per_entry as usize;
    let long_count = (indices.len() + entries_per_long - 1) / entries_per_long;
    let mask = (1u64 << bits_per_entry) - 1;
    let mut data = vec![0u64; long_count];
    for (i, &idx) in indices.iter().enumerate() {
        let shift = (i % entries_per_long) * bits_per_entry as usize;
        data[i / entries_per_long] |= (idx as u64 & mask) << shift;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_wire_form() {
        let container = PalettedContainer::from_values(&[7; 4096], 4, 8).unwrap();
        assert_eq!(container, PalettedContainer::Single(7));
        let mut buf = BytesMut::new();
        container.write(&mut buf);
        // bitsPerEntry 0, VarInt 7, nothing else
        assert_eq!(&buf[..], &[0x00, 0x07]);
    }

    #[test]
    fn test_indirect_roundtrip() {
        // Two ids -> still 4 bits (floor), palette sorted ascending.
        let mut values = vec![9i32; 4096];
        for v in values.iter_mut().skip(100).take(50) {
            *v = 1;
        }
        let container = PalettedContainer::from_values(&values, 4, 8).unwrap();
        match &container {
            PalettedContainer::Indirect {
                bits_per_entry,
                palette,
                ..
            } => {
                assert_eq!(*bits_per_entry, 4);
                assert_eq!(palette, &vec![1, 9]);
            }
            other => panic!("expected indirect container, got {:?}", other),
        }
        let mut buf = BytesMut::new();
        container.write(&mut buf);
        assert_eq!(PalettedContainer::read(&mut buf, 4096).unwrap(), values);
        assert!(buf.is_empty(), "no trailing bytes after packed data");
    }

    #[test]
    fn test_bits_grow_with_palette() {
        // 17 distinct ids need 5 bits.
        let values: Vec<i32> = (0..4096).map(|i| i % 17).collect();
        let container = PalettedContainer::from_values(&values, 4, 8).unwrap();
        match &container {
            PalettedContainer::Indirect { bits_per_entry, .. } => assert_eq!(*bits_per_entry, 5),
            other => panic!("expected indirect container, got {:?}", other),
        }
        let mut buf = BytesMut::new();
        container.write(&mut buf);
        assert_eq!(PalettedContainer::read(&mut buf, 4096).unwrap(), values);
    }

    #[test]
    fn test_no_cross_long_spill() {
        // At 5 bits, 12 entries fit per long with 4 dead bits at the top.
        let indices: Vec<u16> = (0..24).map(|i| (i % 31) as u16).collect();
        let data = pack_indices(&indices, 5);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0] >> 60, 0, "top bits of each long stay empty");
        // Entry 12 starts fresh in the second long.
        assert_eq!(data[1] & 0x1F, indices[12] as u64);
    }

    #[test]
    fn test_invalid_index_rejected() {
        let err = PalettedContainer::from_palette_and_indices(vec![1, 2, 3], &[0, 1, 5], 4);
        assert!(matches!(
            err,
            Err(CodecError::InvalidPaletteIndex { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_identity_for_every_index() {
        let palette: Vec<i32> = vec![10, 20, 30, 40, 50];
        for idx in 0..palette.len() as u16 {
            let indices = vec![idx; 64];
            let container =
                PalettedContainer::from_palette_and_indices(palette.clone(), &indices, 4).unwrap();
            let mut buf = BytesMut::new();
            container.write(&mut buf);
            let values = PalettedContainer::read(&mut buf, 64).unwrap();
            assert!(values.iter().all(|&v| v == palette[idx as usize]));
        }
    }
}
