//! Minimal DER reader
//!
//! Just enough ASN.1 to walk certificate extensions (`KeyDescription`, the
//! Apple nonce, FIDO AAGUID, basic constraints, extended key usage). Input is
//! untrusted; every length is bounds-checked.

use std::fmt::Write;

use thiserror::Error;

pub const CLASS_UNIVERSAL: u8 = 0;
pub const CLASS_CONTEXT: u8 = 2;

pub const TAG_BOOLEAN: u32 = 1;
pub const TAG_INTEGER: u32 = 2;
pub const TAG_BIT_STRING: u32 = 3;
pub const TAG_OCTET_STRING: u32 = 4;
pub const TAG_NULL: u32 = 5;
pub const TAG_OID: u32 = 6;
pub const TAG_ENUMERATED: u32 = 10;
pub const TAG_SEQUENCE: u32 = 16;
pub const TAG_SET: u32 = 17;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerError {
    #[error("unexpected end of DER input")]
    UnexpectedEnd,

    #[error("unsupported DER length encoding")]
    InvalidLength,

    #[error("expected tag {expected}, found {found}")]
    UnexpectedTag { expected: u32, found: u32 },

    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// One tag-length-value element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub class: u8,
    pub constructed: bool,
    pub tag: u32,
    pub content: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Reader over the element's content
    #[must_use]
    pub fn reader(&self) -> DerReader<'a> {
        DerReader::new(self.content)
    }

    #[must_use]
    pub fn is_universal(&self, tag: u32) -> bool {
        self.class == CLASS_UNIVERSAL && self.tag == tag
    }

    #[must_use]
    pub fn is_context(&self, tag: u32) -> bool {
        self.class == CLASS_CONTEXT && self.tag == tag
    }

    /// Interpret an INTEGER or ENUMERATED element as `i64`
    ///
    /// # Errors
    /// Fails for empty or oversized encodings.
    pub fn as_i64(&self) -> Result<i64, DerError> {
        if self.content.is_empty() || self.content.len() > 8 {
            return Err(DerError::Malformed("integer"));
        }
        let negative = self.content[0] & 0x80 != 0;
        let initial = if negative { -1i64 } else { 0 };
        Ok(self
            .content
            .iter()
            .fold(initial, |acc, b| (acc << 8) | i64::from(*b)))
    }
}

/// Sequential reader over DER elements
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte(&mut self) -> Result<u8, DerError> {
        let b = *self.data.get(self.pos).ok_or(DerError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read the next element
    ///
    /// # Errors
    /// Fails on truncated input or unsupported length forms.
    pub fn read(&mut self) -> Result<Tlv<'a>, DerError> {
        let first = self.byte()?;
        let class = first >> 6;
        let constructed = first & 0x20 != 0;
        let mut tag = u32::from(first & 0x1f);

        if tag == 0x1f {
            // High tag number form, as used by KeyDescription fields like [702]
            tag = 0;
            loop {
                let b = self.byte()?;
                if tag > (u32::MAX >> 7) {
                    return Err(DerError::Malformed("tag"));
                }
                tag = (tag << 7) | u32::from(b & 0x7f);
                if b & 0x80 == 0 {
                    break;
                }
            }
        }

        let len_byte = self.byte()?;
        let len = if len_byte & 0x80 == 0 {
            usize::from(len_byte)
        } else {
            let count = usize::from(len_byte & 0x7f);
            if count == 0 || count > 4 {
                return Err(DerError::InvalidLength);
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | usize::from(self.byte()?);
            }
            len
        };

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DerError::UnexpectedEnd)?;
        let content = &self.data[self.pos..end];
        self.pos = end;

        Ok(Tlv {
            class,
            constructed,
            tag,
            content,
        })
    }

    /// Read the next element and require a universal tag
    ///
    /// # Errors
    /// Fails if the element is missing or carries a different tag.
    pub fn expect(&mut self, tag: u32) -> Result<Tlv<'a>, DerError> {
        let tlv = self.read()?;
        if !tlv.is_universal(tag) {
            return Err(DerError::UnexpectedTag {
                expected: tag,
                found: tlv.tag,
            });
        }
        Ok(tlv)
    }

    /// # Errors
    /// Fails unless the next element is a SEQUENCE.
    pub fn read_sequence(&mut self) -> Result<DerReader<'a>, DerError> {
        self.expect(TAG_SEQUENCE).map(|tlv| tlv.reader())
    }

    /// # Errors
    /// Fails unless the next element is an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<&'a [u8], DerError> {
        self.expect(TAG_OCTET_STRING).map(|tlv| tlv.content)
    }

    /// # Errors
    /// Fails unless the next element is an INTEGER that fits in `i64`.
    pub fn read_integer(&mut self) -> Result<i64, DerError> {
        self.expect(TAG_INTEGER)?.as_i64()
    }

    /// # Errors
    /// Fails unless the next element is a BOOLEAN.
    pub fn read_bool(&mut self) -> Result<bool, DerError> {
        let tlv = self.expect(TAG_BOOLEAN)?;
        match tlv.content {
            [b] => Ok(*b != 0),
            _ => Err(DerError::Malformed("boolean")),
        }
    }

    /// Read an OBJECT IDENTIFIER as dotted text
    ///
    /// # Errors
    /// Fails unless the next element is a well-formed OID.
    pub fn read_oid(&mut self) -> Result<String, DerError> {
        oid_to_string(self.expect(TAG_OID)?.content)
    }

    /// Skip the next element
    ///
    /// # Errors
    /// Fails on truncated input.
    pub fn skip(&mut self) -> Result<(), DerError> {
        self.read().map(|_| ())
    }

    /// Read the next element only if it is the given context-specific tag
    ///
    /// # Errors
    /// Fails on truncated input.
    pub fn read_optional_context(&mut self, tag: u32) -> Result<Option<Tlv<'a>>, DerError> {
        if self.is_empty() {
            return Ok(None);
        }
        let checkpoint = self.pos;
        let tlv = self.read()?;
        if tlv.is_context(tag) {
            Ok(Some(tlv))
        } else {
            self.pos = checkpoint;
            Ok(None)
        }
    }
}

/// Decode the content octets of an OBJECT IDENTIFIER
///
/// # Errors
/// Fails for empty content, unterminated arcs or arcs over 64 bits.
pub fn oid_to_string(content: &[u8]) -> Result<String, DerError> {
    if content.is_empty() {
        return Err(DerError::Malformed("object identifier"));
    }

    let mut arcs: Vec<u64> = Vec::new();
    let mut current: u64 = 0;
    for (i, b) in content.iter().enumerate() {
        if current > (u64::MAX >> 7) {
            return Err(DerError::Malformed("object identifier"));
        }
        current = (current << 7) | u64::from(b & 0x7f);
        if b & 0x80 == 0 {
            arcs.push(current);
            current = 0;
        } else if i == content.len() - 1 {
            return Err(DerError::Malformed("object identifier"));
        }
    }

    let first = arcs[0];
    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut out = format!("{a}.{b}");
    for arc in &arcs[1..] {
        let _ = write!(out, ".{arc}");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_decoding() {
        // 1.2.840.113549.1.1.11 (sha256WithRSAEncryption)
        let oid = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];
        assert_eq!(oid_to_string(&oid).unwrap(), "1.2.840.113549.1.1.11");
        // 2.23.133.8.3 (tcg-kp-AIKCertificate)
        assert_eq!(
            oid_to_string(&[0x67, 0x81, 0x05, 0x08, 0x03]).unwrap(),
            "2.23.133.8.3"
        );
        assert!(oid_to_string(&[0x2a, 0x86]).is_err());
    }

    #[test]
    fn test_sequence_walk() {
        // SEQUENCE { INTEGER 3, BOOLEAN true, OCTET STRING 'ab' }
        let der = [
            0x30, 0x09, 0x02, 0x01, 0x03, 0x01, 0x01, 0xff, 0x04, 0x01, 0xab,
        ];
        let mut outer = DerReader::new(&der);
        let mut seq = outer.read_sequence().unwrap();
        assert_eq!(seq.read_integer().unwrap(), 3);
        assert!(seq.read_bool().unwrap());
        assert_eq!(seq.read_octet_string().unwrap(), &[0xab]);
        assert!(seq.is_empty());
        assert!(outer.is_empty());
    }

    #[test]
    fn test_high_tag_number_and_optional_context() {
        // [702] EXPLICIT INTEGER 0, then [1] EXPLICIT SET {}
        let der = [0xbf, 0x85, 0x3e, 0x03, 0x02, 0x01, 0x00, 0xa1, 0x02, 0x31, 0x00];
        let mut reader = DerReader::new(&der);
        assert!(reader.read_optional_context(1).unwrap().is_none());
        let origin = reader.read().unwrap();
        assert!(origin.is_context(702));
        assert_eq!(origin.reader().read_integer().unwrap(), 0);
        assert!(reader.read_optional_context(1).unwrap().is_some());
    }

    #[test]
    fn test_negative_integer_and_long_length() {
        let tlv = Tlv {
            class: CLASS_UNIVERSAL,
            constructed: false,
            tag: TAG_INTEGER,
            content: &[0xff, 0x7f],
        };
        assert_eq!(tlv.as_i64().unwrap(), -129);

        let mut der = vec![0x04, 0x81, 0x80];
        der.extend(std::iter::repeat(0x11).take(128));
        assert_eq!(DerReader::new(&der).read_octet_string().unwrap().len(), 128);
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(
            DerReader::new(&[0x04, 0x05, 0x01]).read().unwrap_err(),
            DerError::UnexpectedEnd
        );
        assert_eq!(
            DerReader::new(&[0x30, 0x80]).read().unwrap_err(),
            DerError::InvalidLength
        );
    }
}
