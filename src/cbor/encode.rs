//! CBOR encoder
//!
//! Arguments use the shortest form, floats the narrowest width that keeps the
//! exact bit pattern, lengths are always definite and map entries keep their
//! order. Decoding the output yields a value equal to the input.

use super::decode::half_to_f64;
use super::value::Value;

/// Encode a value into a fresh buffer
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Append the encoding of `value` to `out`
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Unsigned(n) => write_head(out, 0, *n),
        Value::Negative(n) => write_head(out, 1, *n),
        Value::Bytes(bytes) => {
            write_head(out, 2, bytes.len() as u64);
            out.extend_from_slice(bytes);
        }
        Value::Text(text) => {
            write_head(out, 3, text.len() as u64);
            out.extend_from_slice(text.as_bytes());
        }
        Value::Array(items) => {
            write_head(out, 4, items.len() as u64);
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Map(map) => {
            write_head(out, 5, map.len() as u64);
            for (key, item) in map {
                encode_into(key, out);
                encode_into(item, out);
            }
        }
        Value::Tag(tag, inner) => {
            write_head(out, 6, *tag);
            encode_into(inner, out);
        }
        Value::Bool(false) => out.push(0xf4),
        Value::Bool(true) => out.push(0xf5),
        Value::Null => out.push(0xf6),
        Value::Undefined => out.push(0xf7),
        Value::Simple(n) if *n < 24 => out.push(0xe0 | n),
        Value::Simple(n) => out.extend_from_slice(&[0xf8, *n]),
        Value::Float(x) => write_float(out, *x),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_head(out: &mut Vec<u8>, major: u8, argument: u64) {
    let major = major << 5;
    if argument < 24 {
        out.push(major | argument as u8);
    } else if let Ok(byte) = u8::try_from(argument) {
        out.extend_from_slice(&[major | 24, byte]);
    } else if let Ok(short) = u16::try_from(argument) {
        out.push(major | 25);
        out.extend_from_slice(&short.to_be_bytes());
    } else if let Ok(word) = u32::try_from(argument) {
        out.push(major | 26);
        out.extend_from_slice(&word.to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&argument.to_be_bytes());
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_float(out: &mut Vec<u8>, x: f64) {
    if let Some(half) = f64_to_half_exact(x) {
        out.push(0xf9);
        out.extend_from_slice(&half.to_be_bytes());
        return;
    }
    let single = x as f32;
    if f64::from(single).to_bits() == x.to_bits() {
        out.push(0xfa);
        out.extend_from_slice(&single.to_bits().to_be_bytes());
        return;
    }
    out.push(0xfb);
    out.extend_from_slice(&x.to_bits().to_be_bytes());
}

/// Half-precision bits for `x`, only if widening them gives back `x` exactly
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn f64_to_half_exact(x: f64) -> Option<u16> {
    let bits = x.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let mantissa = bits & 0x000f_ffff_ffff_ffff;

    let candidate = if exponent == 0x7ff {
        // Infinity or NaN: payload must fit in the top ten mantissa bits
        if mantissa & ((1 << 42) - 1) != 0 {
            return None;
        }
        sign | 0x7c00 | (mantissa >> 42) as u16
    } else if x == 0.0 {
        sign
    } else {
        let unbiased = exponent - 1023;
        if !(-24..=15).contains(&unbiased) {
            return None;
        }
        let magnitude = x.abs();
        if unbiased < -14 {
            let scaled = magnitude * 2f64.powi(24);
            if scaled.fract() != 0.0 {
                return None;
            }
            sign | scaled as u16
        } else {
            let fraction = (magnitude / 2f64.powi(unbiased) - 1.0) * 1024.0;
            if fraction.fract() != 0.0 {
                return None;
            }
            sign | (((unbiased + 15) as u16) << 10) | fraction as u16
        }
    };

    (half_to_f64(candidate).to_bits() == bits).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::decode::decode;
    use crate::cbor::value::Map;

    #[test]
    fn test_shortest_integer_heads() {
        assert_eq!(encode(&Value::Unsigned(0)), vec![0x00]);
        assert_eq!(encode(&Value::Unsigned(23)), vec![0x17]);
        assert_eq!(encode(&Value::Unsigned(24)), vec![0x18, 0x18]);
        assert_eq!(encode(&Value::Unsigned(256)), vec![0x19, 0x01, 0x00]);
        assert_eq!(encode(&Value::Unsigned(65_536)), vec![0x1a, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(
            encode(&Value::Unsigned(u64::MAX)),
            vec![0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(encode(&Value::integer(-1)), vec![0x20]);
        assert_eq!(encode(&Value::integer(-1000)), vec![0x39, 0x03, 0xe7]);
    }

    #[test]
    fn test_narrowest_float_width() {
        assert_eq!(encode(&Value::Float(0.0)), vec![0xf9, 0x00, 0x00]);
        assert_eq!(encode(&Value::Float(-0.0)), vec![0xf9, 0x80, 0x00]);
        assert_eq!(encode(&Value::Float(1.5)), vec![0xf9, 0x3e, 0x00]);
        assert_eq!(encode(&Value::Float(65504.0)), vec![0xf9, 0x7b, 0xff]);
        assert_eq!(encode(&Value::Float(5.960_464_477_539_063e-8)), vec![0xf9, 0x00, 0x01]);
        assert_eq!(encode(&Value::Float(f64::INFINITY)), vec![0xf9, 0x7c, 0x00]);
        assert_eq!(encode(&Value::Float(f64::NEG_INFINITY)), vec![0xf9, 0xfc, 0x00]);
        assert_eq!(encode(&Value::Float(f64::NAN)), vec![0xf9, 0x7e, 0x00]);
        assert_eq!(
            encode(&Value::Float(100_000.0)),
            vec![0xfa, 0x47, 0xc3, 0x50, 0x00]
        );
        assert_eq!(
            encode(&Value::Float(1.1)),
            vec![0xfb, 0x3f, 0xf1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9a]
        );
    }

    #[test]
    fn test_map_order_preserved() {
        let map = Map::new().entry("b", 1i64).entry("a", 2i64);
        assert_eq!(
            encode(&Value::Map(map)),
            vec![0xa2, 0x61, 0x62, 0x01, 0x61, 0x61, 0x02]
        );
    }

    #[test]
    fn test_indefinite_input_reencodes_definite() {
        let decoded = decode(&[0x5f, 0x41, 0x01, 0x41, 0x02, 0xff]).unwrap();
        assert_eq!(encode(&decoded), vec![0x42, 0x01, 0x02]);
    }

    #[test]
    fn test_simple_values() {
        assert_eq!(encode(&Value::Simple(16)), vec![0xf0]);
        assert_eq!(encode(&Value::Simple(255)), vec![0xf8, 0xff]);
        assert_eq!(encode(&Value::Undefined), vec![0xf7]);
    }

    #[test]
    fn test_decode_of_encode_is_identity() {
        let value = Value::Array(vec![
            Value::Tag(2, Box::new(Value::Bytes(vec![0x01; 20]))),
            Value::Float(f64::from_bits(0x7ff0_0000_0000_0001)),
            Value::Map(Map::new().entry(1i64, 2i64).entry(3i64, -7i64)),
            Value::Text("\u{1f511}".to_string()),
            Value::Null,
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }
}
