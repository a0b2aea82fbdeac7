//! Scalar value records: the eight value kinds and their codec.
//!
//! A decoded [`Value`] is a lightweight view: `Text`/`Bin` borrow their
//! payload from the document buffer and stay valid for its lifetime, while
//! `Arr`/`Map` carry only the 32-bit offset of the referenced node.

use crate::error::{Error, Result};
use crate::node;
use crate::tag::{
    self, ValueKind, LEN_MASK, PACKED_BIT, TAG_BOOL_FALSE, TAG_BOOL_TRUE, TAG_F64, TAG_I64,
    TAG_NIL,
};

/// A decoded TRON value.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    /// Nil (JSON null).
    Nil,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    I64(i64),
    /// 64-bit float.
    F64(f64),
    /// UTF-8 text, borrowed from the document buffer.
    Text(&'a [u8]),
    /// Opaque bytes, borrowed from the document buffer.
    Bin(&'a [u8]),
    /// Array node reference (absolute offset in the same document).
    Arr(u32),
    /// Map node reference (absolute offset in the same document).
    Map(u32),
}

impl<'a> Value<'a> {
    /// The kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::I64(_) => ValueKind::I64,
            Value::F64(_) => ValueKind::F64,
            Value::Text(_) => ValueKind::Txt,
            Value::Bin(_) => ValueKind::Bin,
            Value::Arr(_) => ValueKind::Arr,
            Value::Map(_) => ValueKind::Map,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// True for `Arr` and `Map` values.
    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Arr(_) | Value::Map(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload as a str, if this is a text value holding valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Text(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Raw payload bytes for text and binary values.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Value::Text(b) | Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    /// Node offset for container values.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        match self {
            Value::Arr(off) | Value::Map(off) => Some(*off),
            _ => None,
        }
    }
}

/// Structural equality for scalars; containers compare by offset.
///
/// `F64` compares by bit pattern so idempotent-write detection stays total
/// (NaN payloads included).
impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) | (Value::Bin(a), Value::Bin(b)) => a == b,
            (Value::Arr(a), Value::Arr(b)) | (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value<'_> {}

/// Decode a value record from the start of `buf`.
///
/// Returns the value and the number of bytes consumed. Non-minimal length
/// prefixes are accepted; reserved tag bits are not.
pub fn decode_value(buf: &[u8]) -> Result<(Value<'_>, usize)> {
    let tag = *buf.first().ok_or(Error::Truncated)?;
    match ValueKind::from_tag(tag) {
        ValueKind::Nil => {
            if tag != TAG_NIL {
                return Err(Error::BadTag(tag));
            }
            Ok((Value::Nil, 1))
        }
        ValueKind::Bool => {
            if tag & 0x1E != 0 {
                return Err(Error::BadTag(tag));
            }
            Ok((Value::Bool(tag & 1 == 1), 1))
        }
        ValueKind::I64 => {
            if tag != TAG_I64 {
                return Err(Error::BadTag(tag));
            }
            let payload = buf.get(1..9).ok_or(Error::Truncated)?;
            Ok((Value::I64(i64::from_le_bytes(payload.try_into().unwrap())), 9))
        }
        ValueKind::F64 => {
            if tag != TAG_F64 {
                return Err(Error::BadTag(tag));
            }
            let payload = buf.get(1..9).ok_or(Error::Truncated)?;
            let bits = u64::from_le_bytes(payload.try_into().unwrap());
            Ok((Value::F64(f64::from_bits(bits)), 9))
        }
        kind @ (ValueKind::Txt | ValueKind::Bin) => {
            let (len, n) = tag::decode_length(tag, &buf[1..])?;
            let end = (1 + n).checked_add(len).ok_or(Error::Truncated)?;
            let payload = buf.get(1 + n..end).ok_or(Error::Truncated)?;
            let value = if kind == ValueKind::Txt {
                Value::Text(payload)
            } else {
                Value::Bin(payload)
            };
            Ok((value, end))
        }
        kind @ (ValueKind::Arr | ValueKind::Map) => {
            let (len, n) = tag::decode_length(tag, &buf[1..])?;
            if len == 0 || len > 4 {
                return Err(Error::BadLengthEncoding);
            }
            let payload = buf.get(1 + n..1 + n + len).ok_or(Error::Truncated)?;
            let mut raw = [0u8; 4];
            raw[..len].copy_from_slice(payload);
            let offset = u32::from_le_bytes(raw);
            let value = if kind == ValueKind::Arr {
                Value::Arr(offset)
            } else {
                Value::Map(offset)
            };
            Ok((value, 1 + n + len))
        }
    }
}

/// Decode a value at an absolute address in `doc`.
///
/// A valid node header at `addr` yields an `Arr`/`Map` value pointing at
/// that node; otherwise the bytes are decoded as a scalar record in place.
pub fn decode_value_at(doc: &[u8], addr: u32) -> Result<Value<'_>> {
    if addr as usize >= doc.len() {
        return Err(Error::Truncated);
    }
    if let Ok((header, _)) = node::node_slice_at(doc, addr) {
        return Ok(match header.key_type {
            node::KeyType::Array => Value::Arr(addr),
            node::KeyType::Map => Value::Map(addr),
        });
    }
    let (value, _) = decode_value(&doc[addr as usize..])?;
    Ok(value)
}

/// Append the minimal encoding of `v` to `out`.
pub fn encode_value_into(v: &Value<'_>, out: &mut Vec<u8>) {
    match v {
        Value::Nil => out.push(TAG_NIL),
        Value::Bool(b) => out.push(if *b { TAG_BOOL_TRUE } else { TAG_BOOL_FALSE }),
        Value::I64(n) => {
            out.push(TAG_I64);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::F64(x) => {
            out.push(TAG_F64);
            out.extend_from_slice(&x.to_bits().to_le_bytes());
        }
        Value::Text(b) => {
            tag::write_length(out, ValueKind::Txt, b.len());
            out.extend_from_slice(b);
        }
        Value::Bin(b) => {
            tag::write_length(out, ValueKind::Bin, b.len());
            out.extend_from_slice(b);
        }
        Value::Arr(off) | Value::Map(off) => {
            let kind = if matches!(v, Value::Arr(_)) {
                ValueKind::Arr
            } else {
                ValueKind::Map
            };
            let n = tag::offset_payload_bytes(*off);
            out.push(kind.base_tag() | PACKED_BIT | (n as u8 & LEN_MASK));
            out.extend_from_slice(&off.to_le_bytes()[..n]);
        }
    }
}

/// Encode `v` as a fresh record.
#[must_use]
pub fn encode_value(v: &Value<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_value_len(v));
    encode_value_into(v, &mut out);
    out
}

/// Byte length of the minimal encoding of `v`.
#[must_use]
pub fn encoded_value_len(v: &Value<'_>) -> usize {
    match v {
        Value::Nil | Value::Bool(_) => 1,
        Value::I64(_) | Value::F64(_) => 9,
        Value::Text(b) | Value::Bin(b) => tag::encoded_bytes_len(b.len()),
        Value::Arr(off) | Value::Map(off) => 1 + tag::offset_payload_bytes(*off),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: Value<'_>) {
        let bytes = encode_value(&v);
        assert_eq!(bytes.len(), encoded_value_len(&v));
        let (decoded, consumed) = decode_value(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, v);
    }

    #[test]
    fn scalar_round_trips() {
        round_trip(Value::Nil);
        round_trip(Value::Bool(false));
        round_trip(Value::Bool(true));
        round_trip(Value::I64(0));
        round_trip(Value::I64(42));
        round_trip(Value::I64(i64::MIN));
        round_trip(Value::F64(0.0));
        round_trip(Value::F64(1.5));
        round_trip(Value::F64(f64::NEG_INFINITY));
        round_trip(Value::Text(b""));
        round_trip(Value::Text(b"hi"));
        round_trip(Value::Text(b"abcdefghijklmnop")); // 16 bytes, unpacked
        round_trip(Value::Bin(&[0xAA, 0xBB, 0xCC]));
        round_trip(Value::Bin(&[0u8; 300]));
        round_trip(Value::Arr(0x0C));
        round_trip(Value::Arr(0x1234_5678));
        round_trip(Value::Map(0xFF));
        round_trip(Value::Map(0x10000));
    }

    #[test]
    fn nan_round_trip_preserves_bits() {
        let v = Value::F64(f64::NAN);
        let bytes = encode_value(&v);
        let (decoded, _) = decode_value(&bytes).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode_value(&Value::Nil), vec![0x00]);
        assert_eq!(encode_value(&Value::Bool(false)), vec![0x20]);
        assert_eq!(encode_value(&Value::Bool(true)), vec![0x21]);
        assert_eq!(
            encode_value(&Value::I64(1)),
            vec![0x40, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(encode_value(&Value::Text(b"hi")), vec![0x92, b'h', b'i']);
        // Offset 0x1234 needs two payload bytes.
        assert_eq!(encode_value(&Value::Arr(0x1234)), vec![0xD2, 0x34, 0x12]);
        assert_eq!(encode_value(&Value::Map(0x0C)), vec![0xF1, 0x0C]);
    }

    #[test]
    fn reserved_bits_rejected() {
        assert_eq!(decode_value(&[0x01]), Err(Error::BadTag(0x01)));
        assert_eq!(decode_value(&[0x10]), Err(Error::BadTag(0x10)));
        assert_eq!(decode_value(&[0x22]), Err(Error::BadTag(0x22)));
        assert_eq!(decode_value(&[0x41, 0, 0, 0, 0, 0, 0, 0, 0]), Err(Error::BadTag(0x41)));
        assert_eq!(decode_value(&[0x70, 0, 0, 0, 0, 0, 0, 0, 0]), Err(Error::BadTag(0x70)));
    }

    #[test]
    fn truncated_payloads_rejected() {
        assert_eq!(decode_value(&[]), Err(Error::Truncated));
        assert_eq!(decode_value(&[0x40, 0, 0]), Err(Error::Truncated));
        assert_eq!(decode_value(&[0x93, b'h', b'i']), Err(Error::Truncated));
        // Unpacked length says 300 bytes follow, but they do not.
        assert_eq!(decode_value(&[0x82, 0x2C, 0x01, 0xFF]), Err(Error::Truncated));
    }

    #[test]
    fn container_offset_length_bounds() {
        // Zero-length offset payload is meaningless.
        assert_eq!(decode_value(&[0xD0]), Err(Error::BadLengthEncoding));
        // Five offset bytes exceed u32.
        assert_eq!(
            decode_value(&[0xD5, 1, 2, 3, 4, 5]),
            Err(Error::BadLengthEncoding)
        );
    }

    #[test]
    fn non_minimal_text_length_accepted() {
        // "hi" with a 1-byte unpacked prefix instead of the packed form.
        let (v, n) = decode_value(&[0x81, 0x02, b'h', b'i']).unwrap();
        assert_eq!(v, Value::Text(b"hi"));
        assert_eq!(n, 4);
    }
}
