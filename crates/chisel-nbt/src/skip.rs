use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::{
    TAG_BYTE, TAG_BYTE_ARRAY, TAG_COMPOUND, TAG_DOUBLE, TAG_END, TAG_FLOAT, TAG_INT,
    TAG_INT_ARRAY, TAG_LIST, TAG_LONG, TAG_LONG_ARRAY, TAG_SHORT, TAG_STRING,
};

#[derive(Debug, Error)]
pub enum NbtSkipError {
    #[error("truncated NBT payload")]
    Truncated,
    #[error("unknown NBT tag id {0}")]
    UnknownTag(u8),
    #[error("NBT nesting deeper than {0}")]
    TooDeep(usize),
}

const MAX_DEPTH: usize = 64;

/// Skip one network-NBT value (unnamed root: tag id followed by payload).
///
/// Used to walk past slot-component data whose schema the core does not
/// consume. The depth cap guarantees termination on hostile input.
pub fn skip_network_value(buf: &mut BytesMut) -> Result<(), NbtSkipError> {
    if !buf.has_remaining() {
        return Err(NbtSkipError::Truncated);
    }
    let tag = buf.get_u8();
    if tag == TAG_END {
        return Ok(());
    }
    skip_payload(buf, tag, 0)
}

fn skip_bytes(buf: &mut BytesMut, n: usize) -> Result<(), NbtSkipError> {
    if buf.remaining() < n {
        return Err(NbtSkipError::Truncated);
    }
    buf.advance(n);
    Ok(())
}

fn skip_payload(buf: &mut BytesMut, tag: u8, depth: usize) -> Result<(), NbtSkipError> {
    if depth > MAX_DEPTH {
        return Err(NbtSkipError::TooDeep(MAX_DEPTH));
    }
    match tag {
        TAG_BYTE => skip_bytes(buf, 1),
        TAG_SHORT => skip_bytes(buf, 2),
        TAG_INT | TAG_FLOAT => skip_bytes(buf, 4),
        TAG_LONG | TAG_DOUBLE => skip_bytes(buf, 8),
        TAG_BYTE_ARRAY => {
            let len = read_i32(buf)?;
            skip_bytes(buf, usize_len(len)?)
        }
        TAG_STRING => {
            let len = read_u16(buf)? as usize;
            skip_bytes(buf, len)
        }
        TAG_LIST => {
            if !buf.has_remaining() {
                return Err(NbtSkipError::Truncated);
            }
            let elem_tag = buf.get_u8();
            let len = read_i32(buf)?;
            if len > 0 && elem_tag == TAG_END {
                return Err(NbtSkipError::UnknownTag(TAG_END));
            }
            for _ in 0..len.max(0) {
                skip_payload(buf, elem_tag, depth + 1)?;
            }
            Ok(())
        }
        TAG_COMPOUND => {
            loop {
                if !buf.has_remaining() {
                    return Err(NbtSkipError::Truncated);
                }
                let entry_tag = buf.get_u8();
                if entry_tag == TAG_END {
                    return Ok(());
                }
                let name_len = read_u16(buf)? as usize;
                skip_bytes(buf, name_len)?;
                skip_payload(buf, entry_tag, depth + 1)?;
            }
        }
        TAG_INT_ARRAY => {
            let len = read_i32(buf)?;
            skip_bytes(buf, usize_len(len)?.saturating_mul(4))
        }
        TAG_LONG_ARRAY => {
            let len = read_i32(buf)?;
            skip_bytes(buf, usize_len(len)?.saturating_mul(8))
        }
        other => Err(NbtSkipError::UnknownTag(other)),
    }
}

fn read_i32(buf: &mut BytesMut) -> Result<i32, NbtSkipError> {
    if buf.remaining() < 4 {
        return Err(NbtSkipError::Truncated);
    }
    Ok(buf.get_i32())
}

fn read_u16(buf: &mut BytesMut) -> Result<u16, NbtSkipError> {
    if buf.remaining() < 2 {
        return Err(NbtSkipError::Truncated);
    }
    Ok(buf.get_u16())
}

fn usize_len(len: i32) -> Result<usize, NbtSkipError> {
    if len < 0 {
        return Err(NbtSkipError::Truncated);
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NbtValue;

    fn roundtrip_skip(value: NbtValue) {
        let mut buf = BytesMut::new();
        value.write_root_network(&mut buf);
        buf.extend_from_slice(b"tail");
        skip_network_value(&mut buf).expect("skip failed");
        assert_eq!(&buf[..], b"tail", "skip must land exactly past the value");
    }

    #[test]
    fn test_skips_scalars() {
        roundtrip_skip(NbtValue::Byte(7));
        roundtrip_skip(NbtValue::Double(1.5));
        roundtrip_skip(NbtValue::String("hello".into()));
    }

    #[test]
    fn test_skips_nested_structures() {
        roundtrip_skip(NbtValue::Compound(vec![
            ("a".into(), NbtValue::Int(1)),
            (
                "b".into(),
                NbtValue::List(vec![
                    NbtValue::Compound(vec![("x".into(), NbtValue::LongArray(vec![1, 2]))]),
                    NbtValue::Compound(vec![]),
                ]),
            ),
        ]));
    }

    #[test]
    fn test_truncated_input_errors() {
        // String claims 10 bytes but only 2 follow.
        let mut buf = BytesMut::from(&[TAG_STRING, 0x00, 0x0A, b'h', b'i'][..]);
        assert!(matches!(
            skip_network_value(&mut buf),
            Err(NbtSkipError::Truncated)
        ));
    }

    #[test]
    fn test_hostile_list_terminates() {
        // A list of TAG_END elements with a huge count must not loop.
        let mut buf = BytesMut::from(&[TAG_LIST, TAG_END, 0x7F, 0xFF, 0xFF, 0xFF][..]);
        assert!(skip_network_value(&mut buf).is_err());
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        // 100 nested lists exceed the depth cap and must error, not recurse forever.
        let mut framed = BytesMut::new();
        framed.extend_from_slice(&[TAG_LIST]);
        for _ in 0..100 {
            framed.extend_from_slice(&[TAG_LIST, 0, 0, 0, 1]);
        }
        assert!(skip_network_value(&mut framed).is_err());
    }
}
