//! CBOR decoder
//!
//! Decoding is a pure function of the input bytes and the nesting limit. Every
//! malformed input ends in a `DecodeError` carrying the byte offset; lengths are
//! checked against the remaining input before anything is allocated, and
//! recursion is bounded by the nesting limit.

use super::error::{DecodeError, DecodeErrorKind};
use super::value::{Map, Value};

/// Default limit on nested arrays, maps and tags
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Hard ceiling applied to any configured limit to keep recursion stack-safe
pub const MAX_SUPPORTED_DEPTH: usize = 256;

const BREAK: u8 = 0xff;

/// Decoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    /// Set the nesting limit, clamped to [`MAX_SUPPORTED_DEPTH`]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_SUPPORTED_DEPTH);
        self
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Decode exactly one data item spanning the whole input
///
/// # Errors
/// Returns a `DecodeError` if the input is malformed, nested too deeply,
/// or followed by trailing bytes.
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    decode_with(input, DecodeOptions::default())
}

/// [`decode`] with explicit options
///
/// # Errors
/// See [`decode`].
pub fn decode_with(input: &[u8], options: DecodeOptions) -> Result<Value, DecodeError> {
    let (value, consumed) = decode_prefix_with(input, options)?;
    if consumed != input.len() {
        return Err(DecodeError::new(
            consumed,
            DecodeErrorKind::TrailingBytes(input.len() - consumed),
        ));
    }
    Ok(value)
}

/// Decode the first data item and report how many bytes it occupied
///
/// Used where a CBOR item is embedded in a larger binary layout, such as the
/// credential public key inside authenticator data.
///
/// # Errors
/// Returns a `DecodeError` if the leading item is malformed.
pub fn decode_prefix(input: &[u8]) -> Result<(Value, usize), DecodeError> {
    decode_prefix_with(input, DecodeOptions::default())
}

/// [`decode_prefix`] with explicit options
///
/// # Errors
/// See [`decode_prefix`].
pub fn decode_prefix_with(
    input: &[u8],
    options: DecodeOptions,
) -> Result<(Value, usize), DecodeError> {
    let mut decoder = Decoder {
        input,
        pos: 0,
        max_depth: options.max_depth,
    };
    let value = decoder.item(0)?;
    Ok((value, decoder.pos))
}

/// Decoded head argument
enum Argument {
    Value(u64),
    Indefinite,
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    max_depth: usize,
}

impl<'a> Decoder<'a> {
    #[allow(clippy::unused_self)]
    fn error(&self, offset: usize, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(offset, kind)
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(self.pos, DecodeErrorKind::UnexpectedEnd))
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: u64) -> Result<&'a [u8], DecodeError> {
        let len_usize = usize::try_from(len)
            .ok()
            .filter(|l| *l <= self.remaining())
            .ok_or_else(|| self.error(self.pos, DecodeErrorKind::LengthTooLarge(len)))?;
        let slice = &self.input[self.pos..self.pos + len_usize];
        self.pos += len_usize;
        Ok(slice)
    }

    fn read_uint(&mut self, width: usize) -> Result<u64, DecodeError> {
        if self.remaining() < width {
            return Err(self.error(self.input.len(), DecodeErrorKind::UnexpectedEnd));
        }
        let value = self.input[self.pos..self.pos + width]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        self.pos += width;
        Ok(value)
    }

    fn argument(&mut self, info: u8, start: usize) -> Result<Argument, DecodeError> {
        match info {
            0..=23 => Ok(Argument::Value(u64::from(info))),
            24 => self.read_uint(1).map(Argument::Value),
            25 => self.read_uint(2).map(Argument::Value),
            26 => self.read_uint(4).map(Argument::Value),
            27 => self.read_uint(8).map(Argument::Value),
            31 => Ok(Argument::Indefinite),
            _ => Err(self.error(start, DecodeErrorKind::ReservedAdditionalInfo(info))),
        }
    }

    fn definite(&mut self, major: u8, info: u8, start: usize) -> Result<u64, DecodeError> {
        match self.argument(info, start)? {
            Argument::Value(v) => Ok(v),
            Argument::Indefinite => {
                Err(self.error(start, DecodeErrorKind::IndefiniteNotAllowed(major)))
            }
        }
    }

    fn enter(&self, nesting: usize, start: usize) -> Result<usize, DecodeError> {
        if nesting >= self.max_depth {
            return Err(self.error(start, DecodeErrorKind::DepthExceeded(self.max_depth)));
        }
        Ok(nesting + 1)
    }

    fn item(&mut self, nesting: usize) -> Result<Value, DecodeError> {
        let start = self.pos;
        let initial = self.read_u8()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => Ok(Value::Unsigned(self.definite(major, info, start)?)),
            1 => Ok(Value::Negative(self.definite(major, info, start)?)),
            2 => Ok(Value::Bytes(self.byte_string(major, info, start)?)),
            3 => {
                let bytes = self.byte_string(major, info, start)?;
                String::from_utf8(bytes)
                    .map(Value::Text)
                    .map_err(|_| self.error(start, DecodeErrorKind::InvalidUtf8))
            }
            4 => {
                let inner = self.enter(nesting, start)?;
                self.array(info, start, inner)
            }
            5 => {
                let inner = self.enter(nesting, start)?;
                self.map(info, start, inner)
            }
            6 => {
                let tag = self.definite(major, info, start)?;
                let inner = self.enter(nesting, start)?;
                Ok(Value::Tag(tag, Box::new(self.item(inner)?)))
            }
            _ => self.simple_or_float(info, start),
        }
    }

    fn byte_string(&mut self, major: u8, info: u8, start: usize) -> Result<Vec<u8>, DecodeError> {
        match self.argument(info, start)? {
            Argument::Value(len) => Ok(self.read_slice(len)?.to_vec()),
            Argument::Indefinite => {
                let mut out = Vec::new();
                loop {
                    if self.peek()? == BREAK {
                        self.pos += 1;
                        return Ok(out);
                    }
                    let chunk_start = self.pos;
                    let header = self.read_u8()?;
                    if header >> 5 != major || header & 0x1f == 31 {
                        return Err(self.error(chunk_start, DecodeErrorKind::InvalidChunk));
                    }
                    let len = self.definite(major, header & 0x1f, chunk_start)?;
                    let chunk = self.read_slice(len)?;
                    // Each text chunk must be valid UTF-8 on its own
                    if major == 3 && std::str::from_utf8(chunk).is_err() {
                        return Err(self.error(chunk_start, DecodeErrorKind::InvalidUtf8));
                    }
                    out.extend_from_slice(chunk);
                }
            }
        }
    }

    fn array(&mut self, info: u8, start: usize, nesting: usize) -> Result<Value, DecodeError> {
        match self.argument(info, start)? {
            Argument::Value(count) => {
                // Every item occupies at least one byte
                if count > self.remaining() as u64 {
                    return Err(self.error(start, DecodeErrorKind::LengthTooLarge(count)));
                }
                let mut items = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
                for _ in 0..count {
                    items.push(self.item(nesting)?);
                }
                Ok(Value::Array(items))
            }
            Argument::Indefinite => {
                let mut items = Vec::new();
                while self.peek()? != BREAK {
                    items.push(self.item(nesting)?);
                }
                self.pos += 1;
                Ok(Value::Array(items))
            }
        }
    }

    fn map(&mut self, info: u8, start: usize, nesting: usize) -> Result<Value, DecodeError> {
        match self.argument(info, start)? {
            Argument::Value(count) => {
                if count.saturating_mul(2) > self.remaining() as u64 {
                    return Err(self.error(start, DecodeErrorKind::LengthTooLarge(count)));
                }
                let mut map = Map::with_capacity(usize::try_from(count).unwrap_or(0));
                for _ in 0..count {
                    let key = self.item(nesting)?;
                    let value = self.item(nesting)?;
                    map.push(key, value);
                }
                Ok(Value::Map(map))
            }
            Argument::Indefinite => {
                let mut map = Map::new();
                while self.peek()? != BREAK {
                    let key = self.item(nesting)?;
                    let value = self.item(nesting)?;
                    map.push(key, value);
                }
                self.pos += 1;
                Ok(Value::Map(map))
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn simple_or_float(&mut self, info: u8, start: usize) -> Result<Value, DecodeError> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            23 => Ok(Value::Undefined),
            0..=19 => Ok(Value::Simple(info)),
            24 => {
                let simple = self.read_u8()?;
                if simple < 32 {
                    return Err(self.error(start, DecodeErrorKind::InvalidSimpleValue(simple)));
                }
                Ok(Value::Simple(simple))
            }
            25 => Ok(Value::Float(half_to_f64(self.read_uint(2)? as u16))),
            26 => Ok(Value::Float(f64::from(f32::from_bits(
                self.read_uint(4)? as u32,
            )))),
            27 => Ok(Value::Float(f64::from_bits(self.read_uint(8)?))),
            31 => Err(self.error(start, DecodeErrorKind::UnexpectedBreak)),
            _ => Err(self.error(start, DecodeErrorKind::ReservedAdditionalInfo(info))),
        }
    }
}

/// Widen an IEEE 754 half-precision value, preserving NaN payloads
pub(crate) fn half_to_f64(bits: u16) -> f64 {
    let sign = u64::from(bits >> 15) << 63;
    let exponent = (bits >> 10) & 0x1f;
    let mantissa = u64::from(bits & 0x03ff);

    match exponent {
        0 => {
            // Subnormal: mantissa * 2^-24
            #[allow(clippy::cast_precision_loss)]
            let magnitude = mantissa as f64 * 2f64.powi(-24);
            f64::from_bits(sign | magnitude.to_bits())
        }
        31 => f64::from_bits(sign | (0x7ff << 52) | (mantissa << 42)),
        _ => {
            let exp = u64::from(exponent) + 1023 - 15;
            f64::from_bits(sign | (exp << 52) | (mantissa << 42))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc8949_integer_vectors() {
        assert_eq!(decode(&[0x00]).unwrap(), Value::Unsigned(0));
        assert_eq!(decode(&[0x17]).unwrap(), Value::Unsigned(23));
        assert_eq!(decode(&[0x18, 0x18]).unwrap(), Value::Unsigned(24));
        assert_eq!(decode(&[0x19, 0x03, 0xe8]).unwrap(), Value::Unsigned(1000));
        assert_eq!(
            decode(&[0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap(),
            Value::Unsigned(u64::MAX)
        );
        assert_eq!(decode(&[0x20]).unwrap().as_i64(), Some(-1));
        assert_eq!(decode(&[0x38, 0x63]).unwrap().as_i64(), Some(-100));
        assert_eq!(
            decode(&[0x3b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
                .unwrap()
                .as_i128(),
            Some(-18_446_744_073_709_551_616)
        );
    }

    #[test]
    fn test_rfc8949_float_vectors() {
        assert_eq!(decode(&[0xf9, 0x3c, 0x00]).unwrap(), Value::Float(1.0));
        assert_eq!(decode(&[0xf9, 0x80, 0x00]).unwrap(), Value::Float(-0.0));
        assert_eq!(decode(&[0xf9, 0x7b, 0xff]).unwrap(), Value::Float(65504.0));
        assert_eq!(
            decode(&[0xf9, 0x00, 0x01]).unwrap(),
            Value::Float(5.960_464_477_539_063e-8)
        );
        assert_eq!(decode(&[0xf9, 0x7c, 0x00]).unwrap(), Value::Float(f64::INFINITY));
        assert!(decode(&[0xf9, 0x7e, 0x00]).unwrap().as_f64().unwrap().is_nan());
        assert_eq!(
            decode(&[0xfa, 0x47, 0xc3, 0x50, 0x00]).unwrap(),
            Value::Float(100_000.0)
        );
        assert_eq!(
            decode(&[0xfb, 0x3f, 0xf1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9a]).unwrap(),
            Value::Float(1.1)
        );
    }

    #[test]
    fn test_strings_and_containers() {
        assert_eq!(
            decode(&[0x44, 0x01, 0x02, 0x03, 0x04]).unwrap(),
            Value::Bytes(vec![1, 2, 3, 4])
        );
        assert_eq!(
            decode(&[0x62, 0xc3, 0xbc]).unwrap(),
            Value::Text("\u{fc}".to_string())
        );
        let map = decode(&[0xa2, 0x61, 0x61, 0x01, 0x61, 0x62, 0x82, 0x02, 0x03]).unwrap();
        let map = map.as_map().unwrap();
        assert_eq!(map.get_text("a"), Some(&Value::Unsigned(1)));
        assert_eq!(
            map.get_text("b"),
            Some(&Value::Array(vec![Value::Unsigned(2), Value::Unsigned(3)]))
        );
    }

    #[test]
    fn test_indefinite_lengths() {
        // (_ h'0102', h'030405')
        assert_eq!(
            decode(&[0x5f, 0x42, 0x01, 0x02, 0x43, 0x03, 0x04, 0x05, 0xff]).unwrap(),
            Value::Bytes(vec![1, 2, 3, 4, 5])
        );
        // (_ "strea", "ming")
        assert_eq!(
            decode(&[
                0x7f, 0x65, 0x73, 0x74, 0x72, 0x65, 0x61, 0x64, 0x6d, 0x69, 0x6e, 0x67, 0xff
            ])
            .unwrap(),
            Value::Text("streaming".to_string())
        );
        // [_ 1, [2, 3]]
        assert_eq!(
            decode(&[0x9f, 0x01, 0x82, 0x02, 0x03, 0xff]).unwrap(),
            Value::Array(vec![
                Value::Unsigned(1),
                Value::Array(vec![Value::Unsigned(2), Value::Unsigned(3)])
            ])
        );
        // {_ "a": 1}
        let map = decode(&[0xbf, 0x61, 0x61, 0x01, 0xff]).unwrap();
        assert_eq!(map.as_map().unwrap().len(), 1);
    }

    #[test]
    fn test_simple_values() {
        assert_eq!(decode(&[0xf4]).unwrap(), Value::Bool(false));
        assert_eq!(decode(&[0xf5]).unwrap(), Value::Bool(true));
        assert_eq!(decode(&[0xf6]).unwrap(), Value::Null);
        assert_eq!(decode(&[0xf7]).unwrap(), Value::Undefined);
        assert_eq!(decode(&[0xf0]).unwrap(), Value::Simple(16));
        assert_eq!(decode(&[0xf8, 0xff]).unwrap(), Value::Simple(255));
    }

    #[test]
    fn test_truncated_input_reports_offset() {
        let err = decode(&[0x19, 0x03]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEnd);

        let err = decode(&[0x82, 0x01]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEnd);
        assert_eq!(err.offset, 2);

        let err = decode(&[0x45, 0x01, 0x02]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::LengthTooLarge(5));
        assert_eq!(err.offset, 1);

        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_malformed_heads_are_rejected() {
        assert_eq!(
            decode(&[0x1c]).unwrap_err().kind,
            DecodeErrorKind::ReservedAdditionalInfo(28)
        );
        assert_eq!(
            decode(&[0x1f]).unwrap_err().kind,
            DecodeErrorKind::IndefiniteNotAllowed(0)
        );
        assert_eq!(decode(&[0xff]).unwrap_err().kind, DecodeErrorKind::UnexpectedBreak);
        assert_eq!(
            decode(&[0xf8, 0x10]).unwrap_err().kind,
            DecodeErrorKind::InvalidSimpleValue(16)
        );
        // Byte string chunk inside an indefinite text string
        assert_eq!(
            decode(&[0x7f, 0x41, 0x61, 0xff]).unwrap_err().kind,
            DecodeErrorKind::InvalidChunk
        );
        // Nested indefinite chunk
        assert_eq!(
            decode(&[0x5f, 0x5f, 0xff, 0xff]).unwrap_err().kind,
            DecodeErrorKind::InvalidChunk
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode(&[0x62, 0xc3, 0x28]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidUtf8);
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_trailing_bytes_rejected_but_prefix_allowed() {
        let err = decode(&[0x01, 0x02]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::TrailingBytes(1));
        assert_eq!(err.offset, 1);

        let (value, used) = decode_prefix(&[0x01, 0x02]).unwrap();
        assert_eq!(value, Value::Unsigned(1));
        assert_eq!(used, 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut nested = vec![0x81; 16];
        nested.push(0x00);
        assert!(decode(&nested).is_ok());

        let mut too_deep = vec![0x81; 17];
        too_deep.push(0x00);
        assert_eq!(
            decode(&too_deep).unwrap_err().kind,
            DecodeErrorKind::DepthExceeded(DEFAULT_MAX_DEPTH)
        );

        let options = DecodeOptions::default().with_max_depth(2);
        assert!(decode_with(&[0x81, 0x81, 0x00], options).is_ok());
        assert!(decode_with(&[0x81, 0x81, 0x81, 0x00], options).is_err());
        // Tags count toward the limit
        assert!(decode_with(&[0xc1, 0xc1, 0xc1, 0x00], options).is_err());
    }

    #[test]
    fn test_huge_declared_counts_fail_fast() {
        let err = decode(&[0x9b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::LengthTooLarge(u64::MAX));
        let err = decode(&[0xbb, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::LengthTooLarge(_)));
    }

    #[test]
    fn test_with_max_depth_is_clamped() {
        let options = DecodeOptions::default().with_max_depth(usize::MAX);
        assert_eq!(options.max_depth(), MAX_SUPPORTED_DEPTH);
    }
}
