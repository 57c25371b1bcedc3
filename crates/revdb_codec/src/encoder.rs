//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Deepest nesting the encoder accepts.
pub const MAX_NESTING_DEPTH: usize = 128;

/// 2^53 - 1.
const SAFE_INTEGER_BOUND: f64 = 9_007_199_254_740_991.0;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;
const FLOAT64: u8 = 0xfb;

/// CBOR major types used by [`Value`].
#[derive(Clone, Copy)]
enum Major {
    Unsigned = 0,
    Negative = 1,
    Bytes = 2,
    Text = 3,
    Array = 4,
    Map = 5,
}

/// Encode a value to canonical CBOR bytes.
///
/// Revision digests hash these bytes, so two documents that hold the same
/// fields must encode identically no matter how they were built. The rules
/// follow RFC 8949 §4.2.1 with one addition for numbers:
///
/// | Item            | Encoding                                              |
/// |-----------------|-------------------------------------------------------|
/// | heads           | shortest argument width                               |
/// | map entries     | ordered by encoded key, shorter keys first            |
/// | integral floats | written as the integer when within ±(2^53 - 1)        |
/// | other floats    | always the 8-byte form (`0xfb`)                       |
/// | NaN             | rejected                                              |
///
/// Indefinite-length items are never produced.
///
/// # Errors
///
/// Returns an error if the value contains NaN, nests deeper than
/// [`MAX_NESTING_DEPTH`], or holds a map with two equal keys.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    write_value(&mut out, value, 0)?;
    Ok(out)
}

/// Incremental canonical encoder.
///
/// Several values can be written back to back; the buffer then holds their
/// concatenated encodings.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    out: Vec<u8>,
}

impl CanonicalEncoder {
    /// Empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty encoder with a preallocated buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
        }
    }

    /// Append the encoding of `value`.
    ///
    /// On error the buffer is left as it was before the call.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        let mark = self.out.len();
        write_value(&mut self.out, value, 0).inspect_err(|_| self.out.truncate(mark))
    }

    /// Finish and take the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.out
    }
}

fn write_value(out: &mut Vec<u8>, value: &Value, depth: usize) -> CodecResult<()> {
    match value {
        Value::Null => out.push(SIMPLE_NULL),
        Value::Bool(false) => out.push(SIMPLE_FALSE),
        Value::Bool(true) => out.push(SIMPLE_TRUE),
        Value::Integer(n) => write_int(out, *n),
        Value::Float(f) => write_float(out, *f)?,
        Value::Bytes(bytes) => {
            write_head(out, Major::Bytes, bytes.len() as u64);
            out.extend_from_slice(bytes);
        }
        Value::Text(text) => {
            write_head(out, Major::Text, text.len() as u64);
            out.extend_from_slice(text.as_bytes());
        }
        Value::Array(items) => {
            let depth = descend(depth)?;
            write_head(out, Major::Array, items.len() as u64);
            for item in items {
                write_value(out, item, depth)?;
            }
        }
        Value::Map(entries) => write_map(out, entries, descend(depth)?)?,
    }
    Ok(())
}

fn descend(depth: usize) -> CodecResult<usize> {
    if depth < MAX_NESTING_DEPTH {
        Ok(depth + 1)
    } else {
        Err(CodecError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
        })
    }
}

fn write_int(out: &mut Vec<u8>, n: i64) {
    // Negative integers carry -1 - n, which `!n` yields for two's complement.
    match u64::try_from(n) {
        Ok(unsigned) => write_head(out, Major::Unsigned, unsigned),
        Err(_) => write_head(out, Major::Negative, (!n).unsigned_abs()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_float(out: &mut Vec<u8>, f: f64) -> CodecResult<()> {
    if f.is_nan() {
        return Err(CodecError::NaNForbidden);
    }
    if f.trunc() == f && f.abs() <= SAFE_INTEGER_BOUND {
        // -0.0 lands here too and becomes 0.
        write_int(out, f as i64);
    } else {
        out.push(FLOAT64);
        out.extend_from_slice(&f.to_bits().to_be_bytes());
    }
    Ok(())
}

/// Writes an item head with the narrowest argument that holds `arg`.
fn write_head(out: &mut Vec<u8>, major: Major, arg: u64) {
    let tag = (major as u8) << 5;
    let be = arg.to_be_bytes();
    let (info, width) = match arg {
        0..=23 => (arg as u8, 0),
        24..=0xff => (24, 1),
        0x100..=0xffff => (25, 2),
        0x1_0000..=0xffff_ffff => (26, 4),
        _ => (27, 8),
    };
    out.push(tag | info);
    out.extend_from_slice(&be[8 - width..]);
}

fn write_map(out: &mut Vec<u8>, entries: &[(Value, Value)], depth: usize) -> CodecResult<()> {
    let mut keyed = entries
        .iter()
        .map(|(key, value)| {
            let mut encoded = Vec::new();
            write_value(&mut encoded, key, depth)?;
            Ok((encoded, value))
        })
        .collect::<CodecResult<Vec<_>>>()?;

    keyed.sort_unstable_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(CodecError::encoding_failed(format!(
            "map key encoded as {:02x?} appears twice",
            pair[0].0
        )));
    }

    write_head(out, Major::Map, keyed.len() as u64);
    for (key, value) in keyed {
        out.extend_from_slice(&key);
        write_value(out, value, depth)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cbor(value: impl Into<Value>) -> Vec<u8> {
        to_canonical_cbor(&value.into()).unwrap()
    }

    #[test]
    fn simple_values() {
        assert_eq!(cbor(()), [0xf6]);
        assert_eq!(cbor(false), [0xf4]);
        assert_eq!(cbor(true), [0xf5]);
    }

    #[test]
    fn heads_use_narrowest_width() {
        assert_eq!(cbor(0i64), [0x00]);
        assert_eq!(cbor(23i64), [0x17]);
        assert_eq!(cbor(24i64), [0x18, 0x18]);
        assert_eq!(cbor(255i64), [0x18, 0xff]);
        assert_eq!(cbor(256i64), [0x19, 0x01, 0x00]);
        assert_eq!(cbor(65_536i64), [0x1a, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(cbor(1i64 << 32)[0], 0x1b);
    }

    #[test]
    fn negative_integers() {
        assert_eq!(cbor(-1i64), [0x20]);
        assert_eq!(cbor(-24i64), [0x37]);
        assert_eq!(cbor(-100i64), [0x38, 99]);
        assert_eq!(
            cbor(i64::MIN),
            [0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn integral_floats_match_integers() {
        assert_eq!(cbor(30.0), cbor(30i64));
        assert_eq!(cbor(-0.0), cbor(0i64));
        assert_eq!(cbor(-7.0), cbor(-7i64));
    }

    #[test]
    fn other_floats_use_eight_bytes() {
        let bytes = cbor(1.5);
        assert_eq!(bytes[0], 0xfb);
        assert_eq!(&bytes[1..], &1.5f64.to_be_bytes());

        // Beyond the safe range the float form is kept even when integral.
        assert_eq!(cbor(2f64.powi(60))[0], 0xfb);
        assert_eq!(cbor(f64::INFINITY)[0], 0xfb);
    }

    #[test]
    fn nan_is_rejected() {
        assert_eq!(
            to_canonical_cbor(&Value::Float(f64::NAN)),
            Err(CodecError::NaNForbidden)
        );
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(cbor("hello"), [0x65, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(cbor(vec![1u8, 2]), [0x42, 1, 2]);
    }

    #[test]
    fn map_entries_ordered_by_encoded_key() {
        let map = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        // map(2), "a", 1, "bb", 2
        assert_eq!(cbor(map), [0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]);
    }

    #[test]
    fn entry_order_does_not_matter() {
        let zs = Value::Map(vec![
            (Value::from("z"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        let az = Value::Map(vec![
            (Value::from("a"), Value::Integer(2)),
            (Value::from("z"), Value::Integer(1)),
        ]);
        assert_eq!(cbor(zs), cbor(az));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let map = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        assert!(matches!(
            to_canonical_cbor(&map),
            Err(CodecError::EncodingFailed { .. })
        ));
    }

    #[test]
    fn nesting_limit() {
        let mut value = Value::Null;
        for _ in 0..MAX_NESTING_DEPTH {
            value = Value::Array(vec![value]);
        }
        assert!(to_canonical_cbor(&value).is_ok());

        let value = Value::Array(vec![value]);
        assert_eq!(
            to_canonical_cbor(&value),
            Err(CodecError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH
            })
        );
    }

    #[test]
    fn failed_encode_leaves_buffer_untouched() {
        let mut encoder = CanonicalEncoder::with_capacity(16);
        encoder.encode(&Value::Integer(1)).unwrap();
        let bad = Value::Array(vec![Value::Integer(2), Value::Float(f64::NAN)]);
        assert!(encoder.encode(&bad).is_err());
        encoder.encode(&Value::from("x")).unwrap();
        assert_eq!(encoder.into_bytes(), [0x01, 0x61, b'x']);
    }
}
