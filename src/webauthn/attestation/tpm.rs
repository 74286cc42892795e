//! `tpm` attestation (TPM 2.0)
//!
//! The AIK signs `certInfo`, a `TPMS_ATTEST` structure that certifies the
//! credential key described by `pubArea`.

use super::{
    check_aaguid_extension, invalid, verify_with_certificate, AttestationContext,
    AttestationOutcome,
};
use crate::crypto::{constant_time_eq, hash, Certificate, HashAlgorithm};
use crate::webauthn::cose::{CoseKey, EcCurve};
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_ECC: u16 = 0x0023;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000b;
const TPM_ALG_SHA384: u16 = 0x000c;
const TPM_ALG_SHA512: u16 = 0x000d;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

const RSA_DEFAULT_EXPONENT: u32 = 65_537;

/// tcg-kp-AIKCertificate
const OID_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// Big-endian cursor over TPM marshalled structures
struct TpmReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TpmReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], VerifyError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| invalid("TPM structure truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VerifyError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, VerifyError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, VerifyError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, VerifyError> {
        let b = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_be_bytes(out))
    }

    /// `TPM2B_*`: 2-byte size followed by that many bytes
    fn sized(&mut self) -> Result<&'a [u8], VerifyError> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }

    fn finish(&self) -> Result<(), VerifyError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(invalid("unexpected bytes after TPM structure"))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TpmPublicKey<'a> {
    Rsa { modulus: &'a [u8], exponent: u32 },
    Ecc { curve: u16, x: &'a [u8], y: &'a [u8] },
}

/// `TPMT_PUBLIC`
#[derive(Debug)]
struct PubArea<'a> {
    name_alg: u16,
    key: TpmPublicKey<'a>,
}

fn parse_pub_area(bytes: &[u8]) -> Result<PubArea<'_>, VerifyError> {
    let mut reader = TpmReader::new(bytes);
    let key_type = reader.u16()?;
    let name_alg = reader.u16()?;
    reader.u32()?; // objectAttributes
    reader.sized()?; // authPolicy

    let key = match key_type {
        TPM_ALG_RSA => {
            if reader.u16()? != TPM_ALG_NULL {
                return Err(invalid("RSA pubArea symmetric algorithm must be NULL"));
            }
            reader.u16()?; // scheme
            reader.u16()?; // keyBits
            let exponent = match reader.u32()? {
                0 => RSA_DEFAULT_EXPONENT,
                e => e,
            };
            TpmPublicKey::Rsa {
                modulus: reader.sized()?,
                exponent,
            }
        }
        TPM_ALG_ECC => {
            if reader.u16()? != TPM_ALG_NULL {
                return Err(invalid("ECC pubArea symmetric algorithm must be NULL"));
            }
            reader.u16()?; // scheme
            let curve = reader.u16()?;
            reader.u16()?; // kdf
            TpmPublicKey::Ecc {
                curve,
                x: reader.sized()?,
                y: reader.sized()?,
            }
        }
        other => return Err(invalid(&format!("unsupported pubArea type {other:#06x}"))),
    };
    reader.finish()?;

    Ok(PubArea { name_alg, key })
}

/// The parts of `TPMS_ATTEST` that are checked
#[derive(Debug)]
struct CertInfo<'a> {
    extra_data: &'a [u8],
    attested_name: &'a [u8],
}

fn parse_cert_info(bytes: &[u8]) -> Result<CertInfo<'_>, VerifyError> {
    let mut reader = TpmReader::new(bytes);
    if reader.u32()? != TPM_GENERATED_VALUE {
        return Err(invalid("certInfo magic is not TPM_GENERATED_VALUE"));
    }
    if reader.u16()? != TPM_ST_ATTEST_CERTIFY {
        return Err(invalid("certInfo type is not TPM_ST_ATTEST_CERTIFY"));
    }
    reader.sized()?; // qualifiedSigner
    let extra_data = reader.sized()?;
    // clockInfo: clock, resetCount, restartCount, safe
    reader.u64()?;
    reader.u32()?;
    reader.u32()?;
    reader.u8()?;
    reader.u64()?; // firmwareVersion
    let attested_name = reader.sized()?;
    reader.sized()?; // qualifiedName
    reader.finish()?;

    Ok(CertInfo {
        extra_data,
        attested_name,
    })
}

fn name_hash(name_alg: u16) -> Result<HashAlgorithm, VerifyError> {
    match name_alg {
        TPM_ALG_SHA1 => Ok(HashAlgorithm::Sha1),
        TPM_ALG_SHA256 => Ok(HashAlgorithm::Sha256),
        TPM_ALG_SHA384 => Ok(HashAlgorithm::Sha384),
        TPM_ALG_SHA512 => Ok(HashAlgorithm::Sha512),
        other => Err(invalid(&format!("unsupported nameAlg {other:#06x}"))),
    }
}

fn key_matches(pub_key: &TpmPublicKey<'_>, credential: &CoseKey) -> bool {
    match (pub_key, credential) {
        (TpmPublicKey::Rsa { modulus, exponent }, CoseKey::Rsa { n, e, .. }) => {
            let e_value = e.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            e.len() <= 8 && *modulus == n.as_slice() && u64::from(*exponent) == e_value
        }
        (TpmPublicKey::Ecc { curve, x, y }, CoseKey::Ec2 { curve: c, x: cx, y: cy, .. }) => {
            let expected_curve = match c {
                EcCurve::P256 => TPM_ECC_NIST_P256,
                EcCurve::P384 => TPM_ECC_NIST_P384,
                EcCurve::P521 => TPM_ECC_NIST_P521,
            };
            *curve == expected_curve && *x == cx.as_slice() && *y == cy.as_slice()
        }
        _ => false,
    }
}

fn check_aik_certificate(aik: &Certificate) -> Result<(), VerifyError> {
    if aik.version() != 2 {
        return Err(invalid("AIK certificate must be X.509 v3"));
    }
    if !aik.subject_is_empty() {
        return Err(invalid("AIK certificate subject must be empty"));
    }
    if !aik.has_extended_key_usage(OID_AIK_CERTIFICATE)? {
        return Err(invalid("AIK certificate lacks the tcg-kp-AIKCertificate usage"));
    }
    if aik.is_ca()? {
        return Err(invalid("AIK certificate must not be a CA"));
    }
    Ok(())
}

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    let version = context.statement.get_text("ver").and_then(|v| v.as_text());
    if version != Some("2.0") {
        return Err(invalid("TPM statement version must be 2.0"));
    }
    let algorithm = context.algorithm()?;
    let signature = context.signature()?;
    let pub_area_bytes = context.bytes("pubArea")?;
    let cert_info_bytes = context.bytes("certInfo")?;
    let certificates = context.required_certificates()?;

    let pub_area = parse_pub_area(pub_area_bytes)?;
    if !key_matches(&pub_area.key, &context.credential.public_key) {
        return Err(invalid("pubArea key does not match the credential key"));
    }

    let cert_info = parse_cert_info(cert_info_bytes)?;
    let expected_extra = hash(algorithm.hash(), &context.signed_data());
    if !constant_time_eq(cert_info.extra_data, &expected_extra) {
        return Err(invalid("certInfo extraData does not match"));
    }

    let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
    expected_name.extend(hash(name_hash(pub_area.name_alg)?, pub_area_bytes));
    if !constant_time_eq(cert_info.attested_name, &expected_name) {
        return Err(invalid("certInfo name does not match pubArea"));
    }

    let aik = &certificates[0];
    verify_with_certificate(aik, algorithm, cert_info_bytes, signature)?;
    check_aik_certificate(aik)?;
    check_aaguid_extension(aik, context.credential)?;

    Ok(AttestationOutcome::new(AttestationType::AttCa, certificates))
}
