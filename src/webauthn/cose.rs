//! COSE public keys (RFC 9053) and signature verification
//!
//! Credential keys arrive as a COSE_Key map inside authenticator data and are
//! stored in that same encoding, so the key's algorithm always travels with it.

use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::rsa::Rsa;
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use p256::EncodedPoint;
use rsa::{BigUint, RsaPublicKey};
use sha2::Sha256;

use super::errors::VerifyError;
use crate::cbor::{self, Map, Value};
use crate::crypto::x509::{verify_signature, SignatureScheme};
use crate::crypto::HashAlgorithm;

const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1; // Also `n` for RSA keys
const LABEL_X: i64 = -2; // Also `e` for RSA keys
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_ED25519: i64 = 6;

/// Supported COSE signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Rs256,
    Ps256,
    /// RSASSA-PKCS1-v1_5 with SHA-1, only for TPM attestation statements
    Rs1,
}

impl CoseAlgorithm {
    /// # Errors
    /// Returns `UnsupportedAlgorithm` for any other identifier.
    pub fn from_id(id: i64) -> Result<Self, VerifyError> {
        match id {
            -7 => Ok(CoseAlgorithm::Es256),
            -35 => Ok(CoseAlgorithm::Es384),
            -36 => Ok(CoseAlgorithm::Es512),
            -8 => Ok(CoseAlgorithm::EdDsa),
            -257 => Ok(CoseAlgorithm::Rs256),
            -37 => Ok(CoseAlgorithm::Ps256),
            -65535 => Ok(CoseAlgorithm::Rs1),
            other => Err(VerifyError::UnsupportedAlgorithm(other)),
        }
    }

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::Es384 => -35,
            CoseAlgorithm::Es512 => -36,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Rs256 => -257,
            CoseAlgorithm::Ps256 => -37,
            CoseAlgorithm::Rs1 => -65535,
        }
    }

    #[must_use]
    pub fn signature_scheme(self) -> SignatureScheme {
        match self {
            CoseAlgorithm::Es256 => SignatureScheme::EcdsaSha256,
            CoseAlgorithm::Es384 => SignatureScheme::EcdsaSha384,
            CoseAlgorithm::Es512 => SignatureScheme::EcdsaSha512,
            CoseAlgorithm::EdDsa => SignatureScheme::Ed25519,
            CoseAlgorithm::Rs256 => SignatureScheme::RsaPkcs1Sha256,
            CoseAlgorithm::Ps256 => SignatureScheme::RsaPssSha256,
            CoseAlgorithm::Rs1 => SignatureScheme::RsaPkcs1Sha1,
        }
    }

    /// Digest paired with the algorithm (TPM `extraData`)
    #[must_use]
    pub fn hash(self) -> HashAlgorithm {
        match self {
            CoseAlgorithm::Es384 => HashAlgorithm::Sha384,
            CoseAlgorithm::Es512 => HashAlgorithm::Sha512,
            CoseAlgorithm::Rs1 => HashAlgorithm::Sha1,
            _ => HashAlgorithm::Sha256,
        }
    }
}

/// Elliptic curves for EC2 keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(EcCurve::P256),
            2 => Some(EcCurve::P384),
            3 => Some(EcCurve::P521),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            EcCurve::P256 => 1,
            EcCurve::P384 => 2,
            EcCurve::P521 => 3,
        }
    }

    /// Coordinate length in bytes
    #[must_use]
    pub fn coordinate_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }

    fn nid(self) -> Nid {
        match self {
            EcCurve::P256 => Nid::X9_62_PRIME256V1,
            EcCurve::P384 => Nid::SECP384R1,
            EcCurve::P521 => Nid::SECP521R1,
        }
    }

    fn algorithm(self) -> CoseAlgorithm {
        match self {
            EcCurve::P256 => CoseAlgorithm::Es256,
            EcCurve::P384 => CoseAlgorithm::Es384,
            EcCurve::P521 => CoseAlgorithm::Es512,
        }
    }
}

/// A credential public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 {
        algorithm: CoseAlgorithm,
        curve: EcCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    /// Ed25519 only
    Okp { algorithm: CoseAlgorithm, x: Vec<u8> },
    Rsa {
        algorithm: CoseAlgorithm,
        n: Vec<u8>,
        e: Vec<u8>,
    },
}

fn required_bytes<'a>(map: &'a Map, label: i64, what: &str) -> Result<&'a [u8], VerifyError> {
    map.get_int(label)
        .and_then(Value::as_bytes)
        .ok_or_else(|| VerifyError::MalformedResponse(format!("COSE key is missing {what}")))
}

impl CoseKey {
    /// Interpret a decoded COSE_Key map
    ///
    /// Only the structure is checked here; curve membership is checked when
    /// the key is used.
    ///
    /// # Errors
    /// `MalformedResponse` for missing or inconsistent parameters,
    /// `UnsupportedAlgorithm` for algorithms outside the supported set.
    pub fn from_value(value: &Value) -> Result<Self, VerifyError> {
        let map = value
            .as_map()
            .ok_or_else(|| VerifyError::MalformedResponse("COSE key is not a map".to_string()))?;

        let kty = map
            .get_int(LABEL_KTY)
            .and_then(Value::as_i64)
            .ok_or_else(|| VerifyError::MalformedResponse("COSE key has no kty".to_string()))?;
        let alg = map
            .get_int(LABEL_ALG)
            .and_then(Value::as_i64)
            .ok_or_else(|| VerifyError::MalformedResponse("COSE key has no alg".to_string()))?;
        let algorithm = CoseAlgorithm::from_id(alg)?;

        match kty {
            KTY_EC2 => {
                let curve = map
                    .get_int(LABEL_CRV)
                    .and_then(Value::as_i64)
                    .and_then(EcCurve::from_id)
                    .ok_or_else(|| {
                        VerifyError::MalformedResponse("unsupported EC2 curve".to_string())
                    })?;
                if curve.algorithm() != algorithm {
                    return Err(VerifyError::MalformedResponse(format!(
                        "algorithm {alg} does not match curve {curve:?}"
                    )));
                }
                let x = required_bytes(map, LABEL_X, "x")?;
                let y = required_bytes(map, LABEL_Y, "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(VerifyError::MalformedResponse(
                        "EC2 coordinate has the wrong length".to_string(),
                    ));
                }
                Ok(CoseKey::Ec2 {
                    algorithm,
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                })
            }
            KTY_OKP => {
                let crv = map.get_int(LABEL_CRV).and_then(Value::as_i64);
                if crv != Some(CRV_ED25519) || algorithm != CoseAlgorithm::EdDsa {
                    return Err(VerifyError::MalformedResponse(
                        "only Ed25519 OKP keys are supported".to_string(),
                    ));
                }
                let x = required_bytes(map, LABEL_X, "x")?;
                if x.len() != 32 {
                    return Err(VerifyError::MalformedResponse(
                        "Ed25519 key must be 32 bytes".to_string(),
                    ));
                }
                Ok(CoseKey::Okp {
                    algorithm,
                    x: x.to_vec(),
                })
            }
            KTY_RSA => {
                // SHA-1 is only tolerated in attestation statements
                if matches!(algorithm, CoseAlgorithm::Rs1) {
                    return Err(VerifyError::UnsupportedAlgorithm(alg));
                }
                if !matches!(algorithm, CoseAlgorithm::Rs256 | CoseAlgorithm::Ps256) {
                    return Err(VerifyError::MalformedResponse(format!(
                        "algorithm {alg} is not an RSA algorithm"
                    )));
                }
                let n = required_bytes(map, LABEL_CRV, "n")?;
                let e = required_bytes(map, LABEL_X, "e")?;
                if n.is_empty() || e.is_empty() {
                    return Err(VerifyError::MalformedResponse(
                        "RSA key parameters are empty".to_string(),
                    ));
                }
                Ok(CoseKey::Rsa {
                    algorithm,
                    n: n.to_vec(),
                    e: e.to_vec(),
                })
            }
            other => Err(VerifyError::MalformedResponse(format!(
                "unsupported key type {other}"
            ))),
        }
    }

    /// Decode a stored COSE_Key
    ///
    /// # Errors
    /// `Decode` for malformed CBOR, otherwise as [`CoseKey::from_value`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerifyError> {
        Self::from_value(&cbor::decode(bytes)?)
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2 { algorithm, .. }
            | CoseKey::Okp { algorithm, .. }
            | CoseKey::Rsa { algorithm, .. } => *algorithm,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let map = match self {
            CoseKey::Ec2 {
                algorithm,
                curve,
                x,
                y,
            } => Map::new()
                .entry(LABEL_KTY, KTY_EC2)
                .entry(LABEL_ALG, algorithm.id())
                .entry(LABEL_CRV, curve.id())
                .entry(LABEL_X, x.clone())
                .entry(LABEL_Y, y.clone()),
            CoseKey::Okp { algorithm, x } => Map::new()
                .entry(LABEL_KTY, KTY_OKP)
                .entry(LABEL_ALG, algorithm.id())
                .entry(LABEL_CRV, CRV_ED25519)
                .entry(LABEL_X, x.clone()),
            CoseKey::Rsa { algorithm, n, e } => Map::new()
                .entry(LABEL_KTY, KTY_RSA)
                .entry(LABEL_ALG, algorithm.id())
                .entry(LABEL_CRV, n.clone())
                .entry(LABEL_X, e.clone()),
        };
        Value::Map(map)
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        cbor::encode(&self.to_value())
    }

    /// Verify `signature` over `data`
    ///
    /// # Errors
    /// `InvalidSignature` when the signature does not verify,
    /// `MalformedResponse` when the key itself is unusable.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
        let valid = match self {
            CoseKey::Ec2 {
                curve: EcCurve::P256,
                x,
                y,
                ..
            } => {
                let point = EncodedPoint::from_affine_coordinates(
                    x.as_slice().into(),
                    y.as_slice().into(),
                    false,
                );
                let key = P256VerifyingKey::from_encoded_point(&point)
                    .map_err(|e| invalid_key(&e.to_string()))?;
                let Ok(signature) = P256Signature::from_der(signature) else {
                    return Err(VerifyError::InvalidSignature);
                };
                key.verify(data, &signature).is_ok()
            }
            CoseKey::Ec2 { algorithm, .. } => verify_signature(
                &self.to_openssl()?,
                algorithm.signature_scheme(),
                data,
                signature,
            )
            .map_err(|e| invalid_key(&e.to_string()))?,
            CoseKey::Okp { x, .. } => ring::signature::UnparsedPublicKey::new(
                &ring::signature::ED25519,
                x.as_slice(),
            )
            .verify(data, signature)
            .is_ok(),
            CoseKey::Rsa { algorithm, n, e } => {
                let key = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
                    .map_err(|e| invalid_key(&e.to_string()))?;
                match algorithm {
                    CoseAlgorithm::Rs256 => {
                        let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
                            return Err(VerifyError::InvalidSignature);
                        };
                        rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key)
                            .verify(data, &signature)
                            .is_ok()
                    }
                    CoseAlgorithm::Ps256 => {
                        let Ok(signature) = rsa::pss::Signature::try_from(signature) else {
                            return Err(VerifyError::InvalidSignature);
                        };
                        rsa::pss::VerifyingKey::<Sha256>::new(key)
                            .verify(data, &signature)
                            .is_ok()
                    }
                    _ => verify_signature(
                        &self.to_openssl()?,
                        algorithm.signature_scheme(),
                        data,
                        signature,
                    )
                    .map_err(|e| invalid_key(&e.to_string()))?,
                }
            }
        };

        if valid {
            Ok(())
        } else {
            Err(VerifyError::InvalidSignature)
        }
    }

    /// The key as an `openssl` public key, for certificate comparisons
    ///
    /// # Errors
    /// `MalformedResponse` when the parameters do not form a valid key.
    pub fn to_openssl(&self) -> Result<PKey<Public>, VerifyError> {
        let build = || -> Result<PKey<Public>, openssl::error::ErrorStack> {
            match self {
                CoseKey::Ec2 { curve, x, y, .. } => {
                    let group = EcGroup::from_curve_name(curve.nid())?;
                    let x: BigNum = BigNum::from_slice(x)?;
                    let y: BigNum = BigNum::from_slice(y)?;
                    let key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
                    key.check_key()?;
                    PKey::from_ec_key(key)
                }
                CoseKey::Okp { x, .. } => PKey::public_key_from_raw_bytes(x, Id::ED25519),
                CoseKey::Rsa { n, e, .. } => PKey::from_rsa(Rsa::from_public_components(
                    BigNum::from_slice(n)?,
                    BigNum::from_slice(e)?,
                )?),
            }
        };
        build().map_err(|e| invalid_key(&e.to_string()))
    }

    /// Whether `other` holds the same public key
    #[must_use]
    pub fn matches(&self, other: &PKey<Public>) -> bool {
        self.to_openssl()
            .map(|key| key.public_eq(other))
            .unwrap_or(false)
    }
}

fn invalid_key(reason: &str) -> VerifyError {
    VerifyError::MalformedResponse(format!("invalid public key: {reason}"))
}
