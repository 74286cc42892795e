//! Authenticator data parsing
//!
//! Layout (bit-exact):
//! - 32 bytes: RP ID hash
//! - 1 byte: flags
//! - 4 bytes: signature counter, big-endian
//! - if AT: 16-byte AAGUID, 2-byte big-endian credential id length,
//!   credential id, COSE public key (CBOR)
//! - if ED: one CBOR map of extension outputs

use uuid::Uuid;

use super::cose::CoseKey;
use super::errors::VerifyError;
use crate::cbor::{self, Map, Value};
use crate::crypto::{constant_time_eq, sha256};

pub const RP_ID_HASH_LEN: usize = 32;
pub const HEADER_LEN: usize = 37;
pub const AAGUID_LEN: usize = 16;
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Authenticator data flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKED_UP: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    #[must_use]
    pub fn user_present(self) -> bool {
        self.has(Self::USER_PRESENT)
    }

    #[must_use]
    pub fn user_verified(self) -> bool {
        self.has(Self::USER_VERIFIED)
    }

    #[must_use]
    pub fn backup_eligible(self) -> bool {
        self.has(Self::BACKUP_ELIGIBLE)
    }

    #[must_use]
    pub fn backed_up(self) -> bool {
        self.has(Self::BACKED_UP)
    }

    #[must_use]
    pub fn attested_credential_data(self) -> bool {
        self.has(Self::ATTESTED_CREDENTIAL_DATA)
    }

    #[must_use]
    pub fn extension_data(self) -> bool {
        self.has(Self::EXTENSION_DATA)
    }
}

/// Credential created during registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
    pub public_key_bytes: Vec<u8>, // Exact COSE_Key bytes as sent by the authenticator
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    raw: Vec<u8>,
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    pub extensions: Option<Map>,
}

impl AuthenticatorData {
    /// Parse raw authenticator data
    ///
    /// # Errors
    /// `MalformedAuthenticatorData` for truncated or inconsistent data,
    /// `Decode` for a malformed embedded CBOR item.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        if bytes.len() < HEADER_LEN {
            return Err(VerifyError::MalformedAuthenticatorData(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flags = AuthenticatorFlags::from_bits(bytes[32]);
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        if flags.backed_up() && !flags.backup_eligible() {
            return Err(VerifyError::MalformedAuthenticatorData(
                "backup state set without backup eligibility".to_string(),
            ));
        }

        let mut pos = HEADER_LEN;

        let attested_credential = if flags.attested_credential_data() {
            let (data, used) = parse_attested_credential(&bytes[pos..], pos)?;
            pos += used;
            Some(data)
        } else {
            None
        };

        let extensions = if flags.extension_data() {
            let (value, used) = cbor::decode_prefix(&bytes[pos..]).map_err(|e| offset(e, pos))?;
            let Value::Map(map) = value else {
                return Err(VerifyError::MalformedAuthenticatorData(
                    "extension data is not a map".to_string(),
                ));
            };
            pos += used;
            Some(map)
        } else {
            None
        };

        if pos != bytes.len() {
            return Err(VerifyError::MalformedAuthenticatorData(format!(
                "{} unexpected trailing bytes",
                bytes.len() - pos
            )));
        }

        Ok(Self {
            raw: bytes.to_vec(),
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
            extensions,
        })
    }

    /// Raw bytes as signed by the authenticator
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Check the RP ID hash against the configured relying party id
    ///
    /// # Errors
    /// Returns `RelyingPartyMismatch` when the hashes differ.
    pub fn verify_rp_id(&self, rp_id: &str) -> Result<(), VerifyError> {
        if constant_time_eq(&self.rp_id_hash, &sha256(rp_id.as_bytes())) {
            Ok(())
        } else {
            Err(VerifyError::RelyingPartyMismatch)
        }
    }
}

fn parse_attested_credential(
    bytes: &[u8],
    base: usize,
) -> Result<(AttestedCredentialData, usize), VerifyError> {
    if bytes.len() < AAGUID_LEN + 2 {
        return Err(VerifyError::MalformedAuthenticatorData(
            "attested credential data truncated".to_string(),
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&bytes[..AAGUID_LEN]);
    let id_len = usize::from(u16::from_be_bytes([bytes[16], bytes[17]]));
    if id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(VerifyError::MalformedAuthenticatorData(format!(
            "credential id length {id_len} exceeds {MAX_CREDENTIAL_ID_LEN}"
        )));
    }

    let id_start = AAGUID_LEN + 2;
    let key_start = id_start + id_len;
    if bytes.len() <= key_start {
        return Err(VerifyError::MalformedAuthenticatorData(
            "credential id or public key truncated".to_string(),
        ));
    }

    let (key_value, key_len) =
        cbor::decode_prefix(&bytes[key_start..]).map_err(|e| offset(e, base + key_start))?;
    let public_key = CoseKey::from_value(&key_value)?;

    Ok((
        AttestedCredentialData {
            aaguid: Uuid::from_bytes(aaguid),
            credential_id: bytes[id_start..key_start].to_vec(),
            public_key,
            public_key_bytes: bytes[key_start..key_start + key_len].to_vec(),
        },
        key_start + key_len,
    ))
}

/// Shift a nested decode error so its offset refers to the whole structure
fn offset(mut err: cbor::DecodeError, base: usize) -> VerifyError {
    err.offset += base;
    VerifyError::Decode(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::encode;
    use crate::webauthn::cose::CoseAlgorithm;

    fn header(flags: u8, count: u32) -> Vec<u8> {
        let mut out = sha256(b"good.example").to_vec();
        out.push(flags);
        out.extend_from_slice(&count.to_be_bytes());
        out
    }

    fn es256_key() -> Vec<u8> {
        let key = Map::new()
            .entry(1i64, 2i64)
            .entry(3i64, -7i64)
            .entry(-1i64, 1i64)
            .entry(-2i64, vec![0x11u8; 32])
            .entry(-3i64, vec![0x22u8; 32]);
        encode(&Value::Map(key))
    }

    #[test]
    fn test_header_only() {
        let data = AuthenticatorData::parse(&header(0x05, 0x0102_0304)).unwrap();
        assert!(data.flags.user_present());
        assert!(data.flags.user_verified());
        assert_eq!(data.sign_count, 0x0102_0304);
        assert!(data.attested_credential.is_none());
        assert!(data.verify_rp_id("good.example").is_ok());
        assert_eq!(
            data.verify_rp_id("evil.example").unwrap_err(),
            VerifyError::RelyingPartyMismatch
        );
    }

    #[test]
    fn test_attested_credential_and_extensions() {
        let mut raw = header(0x41 | 0x80, 0);
        raw.extend_from_slice(&[0xaa; 16]);
        raw.extend_from_slice(&[0x00, 0x03, 9, 8, 7]);
        raw.extend_from_slice(&es256_key());
        raw.extend_from_slice(&encode(&Value::Map(Map::new().entry("credProtect", 2i64))));

        let data = AuthenticatorData::parse(&raw).unwrap();
        let attested = data.attested_credential.unwrap();
        assert_eq!(attested.aaguid, Uuid::from_bytes([0xaa; 16]));
        assert_eq!(attested.credential_id, vec![9, 8, 7]);
        assert_eq!(attested.public_key.algorithm(), CoseAlgorithm::Es256);
        assert_eq!(attested.public_key_bytes, es256_key());
        assert_eq!(
            data.extensions.unwrap().get_text("credProtect"),
            Some(&Value::Unsigned(2))
        );
    }

    #[test]
    fn test_rejects_truncation_and_trailing_bytes() {
        assert!(matches!(
            AuthenticatorData::parse(&[0u8; 36]),
            Err(VerifyError::MalformedAuthenticatorData(_))
        ));

        let mut trailing = header(0x01, 1);
        trailing.push(0);
        assert!(matches!(
            AuthenticatorData::parse(&trailing),
            Err(VerifyError::MalformedAuthenticatorData(_))
        ));

        // AT flag set but nothing follows
        assert!(AuthenticatorData::parse(&header(0x41, 0)).is_err());
    }

    #[test]
    fn test_rejects_oversized_credential_id() {
        let mut raw = header(0x41, 0);
        raw.extend_from_slice(&[0u8; 16]);
        raw.extend_from_slice(&1024u16.to_be_bytes());
        raw.extend_from_slice(&vec![0u8; 1024]);
        raw.extend_from_slice(&es256_key());
        assert!(matches!(
            AuthenticatorData::parse(&raw),
            Err(VerifyError::MalformedAuthenticatorData(_))
        ));
    }

    #[test]
    fn test_cose_decode_error_offset_is_absolute() {
        let mut raw = header(0x41, 0);
        raw.extend_from_slice(&[0u8; 16]);
        raw.extend_from_slice(&[0x00, 0x01, 0x05]);
        raw.push(0xa1); // map of one entry, then nothing
        let Err(VerifyError::Decode(err)) = AuthenticatorData::parse(&raw) else {
            panic!("expected a decode error");
        };
        assert_eq!(err.offset, raw.len() - 1);
    }

    #[test]
    fn test_backup_state_requires_eligibility() {
        assert!(AuthenticatorData::parse(&header(0x11, 0)).is_err());
        let data = AuthenticatorData::parse(&header(0x19, 0)).unwrap();
        assert!(data.flags.backup_eligible() && data.flags.backed_up());
    }

    #[test]
    fn test_parse_never_panics_on_damaged_input() {
        let mut raw = header(0x45 | 0x80, 7);
        raw.extend_from_slice(&[0xaa; 16]);
        raw.extend_from_slice(&[0x00, 0x03, 9, 8, 7]);
        raw.extend_from_slice(&es256_key());
        raw.extend_from_slice(&encode(&Value::Map(Map::new().entry("credProtect", 2i64))));
        assert!(AuthenticatorData::parse(&raw).is_ok());

        for end in 0..raw.len() {
            assert!(AuthenticatorData::parse(&raw[..end]).is_err(), "prefix of {end} bytes");
        }

        // xorshift64, fixed seed so failures reproduce
        let mut state = 0x9e37_79b9_7f4a_7c15_u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..2000 {
            let mut damaged = raw.clone();
            for _ in 0..=next() % 4 {
                let at = usize::try_from(next() % damaged.len() as u64).unwrap();
                damaged[at] = next().to_le_bytes()[0];
            }
            let cut = usize::try_from(next() % (damaged.len() as u64 + 1)).unwrap();
            let _ = AuthenticatorData::parse(&damaged[..cut]);
        }
    }
}
