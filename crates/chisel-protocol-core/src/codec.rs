use bytes::{Buf, BufMut, BytesMut};
use chisel_nbt::skip_network_value;
use chisel_types::{BlockPos, ItemStack};
use thiserror::Error;
use uuid::Uuid;

/// Largest frame the protocol permits (3-byte VarInt maximum).
pub const MAX_FRAME_LEN: usize = 2_097_151;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed VarInt: over-long encoding")]
    MalformedVarInt,
    #[error("string too long: {0} bytes > {1} allowed")]
    StringTooLong(usize, usize),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("truncated field")]
    TruncatedField,
    #[error("palette index {index} out of range for palette of {len}")]
    InvalidPaletteIndex { index: usize, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut BytesMut) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::TruncatedField);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(CodecError::MalformedVarInt);
        }
    }
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut BytesMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

/// Read a VarLong from the buffer.
pub fn read_varlong(buf: &mut BytesMut) -> CodecResult<i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::TruncatedField);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 70 {
            return Err(CodecError::MalformedVarInt);
        }
    }
}

/// Write a VarLong to the buffer.
pub fn write_varlong(buf: &mut BytesMut, mut value: i64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u64) >> 7) as i64;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a protocol string (varint-prefixed UTF-8).
/// `max_chars` bounds the character count; the encoded form may be at most
/// three bytes per character.
pub fn read_string(buf: &mut BytesMut, max_chars: usize) -> CodecResult<String> {
    let len = read_varint(buf)? as usize;
    if len > max_chars * 3 {
        return Err(CodecError::StringTooLong(len, max_chars * 3));
    }
    if buf.remaining() < len {
        return Err(CodecError::TruncatedField);
    }
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a protocol string.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a UUID (128 bits, big endian on the wire regardless of host order).
pub fn read_uuid(buf: &mut BytesMut) -> CodecResult<Uuid> {
    if buf.remaining() < 16 {
        return Err(CodecError::TruncatedField);
    }
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID.
pub fn write_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// Read a packed block position.
pub fn read_position(buf: &mut BytesMut) -> CodecResult<BlockPos> {
    if buf.remaining() < 8 {
        return Err(CodecError::TruncatedField);
    }
    Ok(BlockPos::decode(buf.get_u64()))
}

/// Write a packed block position.
pub fn write_position(buf: &mut BytesMut, pos: &BlockPos) {
    buf.put_u64(pos.encode());
}

/// Convert degrees to a protocol angle byte (256ths of a turn).
pub fn angle_from_degrees(degrees: f32) -> u8 {
    let scaled = (degrees as f64 * 256.0 / 360.0).round() as i64;
    scaled.rem_euclid(256) as u8
}

/// Convert a protocol angle byte back to degrees.
pub fn angle_to_degrees(angle: u8) -> f32 {
    angle as f32 * 360.0 / 256.0
}

/// Write a variable-length BitSet: VarInt word count, then 64-bit words.
pub fn write_bitset(buf: &mut BytesMut, words: &[i64]) {
    write_varint(buf, words.len() as i32);
    for w in words {
        buf.put_i64(*w);
    }
}

/// Read a variable-length BitSet.
pub fn read_bitset(buf: &mut BytesMut) -> CodecResult<Vec<i64>> {
    let count = read_varint(buf)? as usize;
    if buf.remaining() < count * 8 {
        return Err(CodecError::TruncatedField);
    }
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        words.push(buf.get_i64());
    }
    Ok(words)
}

/// Pack bit flags into BitSet words: bit i lives in word i/64 at bit i%64.
pub fn bitset_words(bits: &[bool]) -> Vec<i64> {
    if bits.is_empty() {
        return Vec::new();
    }
    let mut words = vec![0i64; (bits.len() + 63) / 64];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            words[i / 64] |= 1 << (i % 64);
        }
    }
    words
}

/// Unpack `n` bits from BitSet words.
pub fn bitset_bits(words: &[i64], n: usize) -> Vec<bool> {
    (0..n)
        .map(|i| {
            words
                .get(i / 64)
                .map(|w| (w >> (i % 64)) & 1 == 1)
                .unwrap_or(false)
        })
        .collect()
}

/// Write a fixed-size BitSet of `bits.len()` bits: ceil(n/8) bytes, LSB first.
pub fn write_fixed_bitset(buf: &mut BytesMut, bits: &[bool]) {
    let mut bytes = vec![0u8; (bits.len() + 7) / 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    buf.put_slice(&bytes);
}

/// Read a fixed-size BitSet of `n` bits.
pub fn read_fixed_bitset(buf: &mut BytesMut, n: usize) -> CodecResult<Vec<bool>> {
    let byte_len = (n + 7) / 8;
    if buf.remaining() < byte_len {
        return Err(CodecError::TruncatedField);
    }
    let bytes = buf.split_to(byte_len);
    Ok((0..n).map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1).collect())
}

/// Magnitudes below this encode as the single zero byte.
const LP_VEC3_EPSILON: f64 = 3.051944088384301e-5;
/// Component clamp bound for the low-precision encoding.
const LP_VEC3_CLAMP: f64 = 1.7179869183e10;

fn lp_clamp(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-LP_VEC3_CLAMP, LP_VEC3_CLAMP)
    }
}

fn lp_pack(v: f64, scale: f64) -> u64 {
    ((v / scale * 0.5 + 0.5) * 32766.0).round() as u64
}

/// Write a low-precision velocity vector.
///
/// Near-zero vectors are the single byte 0x00. Otherwise the three components
/// are packed at 15 bits each into a 48-bit little-endian lead whose low bits
/// carry the scale, with a VarInt continuation for scales >= 3.
pub fn write_lpvec3(buf: &mut BytesMut, x: f64, y: f64, z: f64) {
    let (x, y, z) = (lp_clamp(x), lp_clamp(y), lp_clamp(z));
    let magnitude = x.abs().max(y.abs()).max(z.abs());
    if magnitude < LP_VEC3_EPSILON {
        buf.put_u8(0);
        return;
    }
    let scale = magnitude.ceil();
    let scale_bits = scale as u64;
    let need_continuation = scale_bits >= 3;
    let mut lead: u64 = (lp_pack(x, scale) << 3)
        | (lp_pack(y, scale) << 18)
        | (lp_pack(z, scale) << 33)
        | (scale_bits & 3);
    if need_continuation {
        lead |= 4;
    }
    buf.put_slice(&lead.to_le_bytes()[..6]);
    if need_continuation {
        write_varint(buf, (scale_bits >> 2) as i32);
    }
}

/// Read a Slot from the wire (component-based format).
/// Returns None for empty slots (item_count == 0).
///
/// Component payloads are not consumed by the core: added components are
/// walked with the NBT skipper and discarded. A payload the skipper cannot
/// walk aborts the remainder of the slot but keeps the connection.
pub fn read_slot(buf: &mut BytesMut) -> CodecResult<Option<ItemStack>> {
    let item_count = read_varint(buf)?;
    if item_count <= 0 {
        return Ok(None);
    }
    let item_id = read_varint(buf)?;
    let add_count = read_varint(buf)?;
    let remove_count = read_varint(buf)?;
    let stack = ItemStack::new(item_id, item_count as i8);
    for _ in 0..add_count {
        let component_type = read_varint(buf)?;
        if let Err(e) = skip_network_value(buf) {
            tracing::debug!(
                "Could not skip slot component type {}: {} — dropping remainder",
                component_type,
                e
            );
            buf.clear();
            return Ok(Some(stack));
        }
    }
    for _ in 0..remove_count {
        let _component_type = read_varint(buf)?;
    }
    Ok(Some(stack))
}

/// Write a Slot to the wire. The core never attaches components.
pub fn write_slot(buf: &mut BytesMut, slot: &Option<ItemStack>) {
    match slot {
        None => {
            write_varint(buf, 0);
        }
        Some(item) => {
            write_varint(buf, item.count as i32);
            write_varint(buf, item.item_id);
            write_varint(buf, 0); // no added components
            write_varint(buf, 0); // no removed components
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_known_encodings() {
        let test_cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (255, vec![0xFF, 0x01]),
            (25565, vec![0xDD, 0xC7, 0x01]),
            (2097151, vec![0xFF, 0xFF, 0x7F]),
            (i32::MAX, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]),
            (-1, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
            (i32::MIN, vec![0x80, 0x80, 0x80, 0x80, 0x08]),
        ];

        for (value, expected_bytes) in test_cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.to_vec(), expected_bytes, "write_varint({})", value);

            let mut buf = BytesMut::from(&expected_bytes[..]);
            assert_eq!(read_varint(&mut buf).unwrap(), value, "read_varint({})", value);
        }
    }

    #[test]
    fn test_varint_roundtrip_sweep() {
        // Sweep boundary neighbourhoods across the whole i32 range.
        let anchors: [i64; 9] = [
            i32::MIN as i64,
            -(1 << 21),
            -(1 << 14),
            -1,
            0,
            (1 << 7),
            (1 << 14),
            (1 << 28),
            i32::MAX as i64,
        ];
        for anchor in anchors {
            for delta in -3..=3i64 {
                let value = (anchor + delta).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                let mut buf = BytesMut::new();
                write_varint(&mut buf, value);
                assert!(buf.len() <= 5);
                assert_eq!(read_varint(&mut buf).unwrap(), value);
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn test_varint_overlong_rejected() {
        // Six continuation bytes can never be a valid VarInt.
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
        assert!(matches!(
            read_varint(&mut buf),
            Err(CodecError::MalformedVarInt)
        ));
    }

    #[test]
    fn test_varint_truncated() {
        let mut buf = BytesMut::from(&[0x80][..]);
        assert!(matches!(
            read_varint(&mut buf),
            Err(CodecError::TruncatedField)
        ));
    }

    #[test]
    fn test_varlong_roundtrip() {
        let values: [i64; 8] = [
            0,
            1,
            -1,
            i64::MAX,
            i64::MIN,
            25565,
            -(1 << 40),
            1 << 55,
        ];
        for value in values {
            let mut buf = BytesMut::new();
            write_varlong(&mut buf, value);
            assert!(buf.len() <= 10, "encoded length for {}", value);
            assert_eq!(read_varlong(&mut buf).unwrap(), value);
        }
    }

    #[test]
    fn test_varlong_overlong_rejected() {
        let mut buf = BytesMut::from(&[0xFF; 11][..]);
        assert!(matches!(
            read_varlong(&mut buf),
            Err(CodecError::MalformedVarInt)
        ));
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(25565), 3);
        assert_eq!(varint_len(-1), 5);
    }

    #[test]
    fn test_string_roundtrip() {
        for s in ["", "Hello, Minecraft!", "κόσμε", "ClemenPine"] {
            let mut buf = BytesMut::new();
            write_string(&mut buf, s);
            assert_eq!(read_string(&mut buf, 32767).unwrap(), s);
        }
    }

    #[test]
    fn test_string_too_long() {
        let oversized = "a".repeat(49);
        let mut buf = BytesMut::new();
        write_string(&mut buf, &oversized);
        assert!(matches!(
            read_string(&mut buf, 16).err(),
            Some(CodecError::StringTooLong(49, 48))
        ));
    }

    #[test]
    fn test_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, &uuid);
        assert_eq!(read_uuid(&mut buf).unwrap(), uuid);
    }

    #[test]
    fn test_uuid_wire_is_big_endian() {
        let uuid = Uuid::from_u128(0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, &uuid);
        assert_eq!(buf[0], 0x00);
        assert_eq!(buf[15], 0xFF);
    }

    #[test]
    fn test_position_roundtrip() {
        let cases = [
            BlockPos::new(0, 0, 0),
            BlockPos::new(0, 63, 0),
            BlockPos::new(-1, -64, -1),
            BlockPos::new((1 << 25) - 1, 2047, -(1 << 25)),
        ];
        for pos in cases {
            let mut buf = BytesMut::new();
            write_position(&mut buf, &pos);
            assert_eq!(read_position(&mut buf).unwrap(), pos);
        }
    }

    #[test]
    fn test_angle_conversion() {
        assert_eq!(angle_from_degrees(0.0), 0);
        assert_eq!(angle_from_degrees(90.0), 64);
        assert_eq!(angle_from_degrees(180.0), 128);
        assert_eq!(angle_from_degrees(360.0), 0);
        assert_eq!(angle_from_degrees(-90.0), 192);
        assert_eq!(angle_from_degrees(450.0), 64);
    }

    #[test]
    fn test_bitset_roundtrip() {
        for n in [0usize, 1, 26, 63, 64, 65, 130] {
            let bits: Vec<bool> = (0..n).map(|i| i % 3 == 0).collect();
            let words = bitset_words(&bits);
            let mut buf = BytesMut::new();
            write_bitset(&mut buf, &words);
            let read = read_bitset(&mut buf).unwrap();
            assert_eq!(bitset_bits(&read, n), bits, "bitset of {} bits", n);
        }
    }

    #[test]
    fn test_fixed_bitset_roundtrip() {
        for n in [1usize, 7, 8, 9, 20] {
            let bits: Vec<bool> = (0..n).map(|i| i % 2 == 1).collect();
            let mut buf = BytesMut::new();
            write_fixed_bitset(&mut buf, &bits);
            assert_eq!(buf.len(), (n + 7) / 8);
            assert_eq!(read_fixed_bitset(&mut buf, n).unwrap(), bits);
        }
    }

    #[test]
    fn test_lpvec3_zero() {
        let mut buf = BytesMut::new();
        write_lpvec3(&mut buf, 0.0, 0.0, 0.0);
        assert_eq!(&buf[..], &[0x00]);

        let mut buf = BytesMut::new();
        write_lpvec3(&mut buf, 1.0e-5, -2.0e-5, 0.0);
        assert_eq!(&buf[..], &[0x00], "sub-epsilon vector encodes as zero");
    }

    #[test]
    fn test_lpvec3_nan_is_zero() {
        let mut buf = BytesMut::new();
        write_lpvec3(&mut buf, f64::NAN, f64::NAN, f64::NAN);
        assert_eq!(&buf[..], &[0x00]);
    }

    #[test]
    fn test_lpvec3_small_scale_no_continuation() {
        let mut buf = BytesMut::new();
        write_lpvec3(&mut buf, 1.0, 0.0, 0.0);
        assert_eq!(buf.len(), 6);
        // scale = 1, no continuation bit
        assert_eq!(buf[0] & 0b111, 0b001);
    }

    #[test]
    fn test_lpvec3_large_scale_continuation() {
        let mut buf = BytesMut::new();
        write_lpvec3(&mut buf, 10.0, 0.0, 0.0);
        // scale = 10 -> continuation bit set, low bits 10 & 3 = 2, VarInt(2) appended
        assert!(buf.len() > 6);
        assert_eq!(buf[0] & 0b100, 0b100);
        assert_eq!(buf[0] & 0b011, 10 & 3);
        let mut tail = buf.clone();
        tail.advance(6);
        assert_eq!(read_varint(&mut tail).unwrap(), 10 >> 2);
    }

    #[test]
    fn test_slot_roundtrip_empty_and_plain() {
        let mut buf = BytesMut::new();
        write_slot(&mut buf, &None);
        assert_eq!(read_slot(&mut buf).unwrap(), None);

        let stack = Some(ItemStack::new(42, 3));
        let mut buf = BytesMut::new();
        write_slot(&mut buf, &stack);
        assert_eq!(read_slot(&mut buf).unwrap(), stack);
    }

    #[test]
    fn test_slot_with_component_payload() {
        use chisel_nbt::NbtValue;
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 1); // count
        write_varint(&mut buf, 7); // item id
        write_varint(&mut buf, 1); // one added component
        write_varint(&mut buf, 0); // no removed components
        write_varint(&mut buf, 12); // component type
        NbtValue::Compound(vec![("damage".into(), NbtValue::Int(3))])
            .write_root_network(&mut buf);
        let slot = read_slot(&mut buf).unwrap();
        assert_eq!(slot, Some(ItemStack::new(7, 1)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_slot_hostile_component_recovers() {
        // Component payload is garbage; the reader must terminate and still
        // yield the item it already parsed.
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 1);
        write_varint(&mut buf, 7);
        write_varint(&mut buf, 1);
        write_varint(&mut buf, 0);
        write_varint(&mut buf, 12);
        buf.extend_from_slice(&[0xFE, 0xBA, 0xAD]); // not a valid NBT tag
        let slot = read_slot(&mut buf).unwrap();
        assert_eq!(slot, Some(ItemStack::new(7, 1)));
    }
}
