//! Credential key pairs for every supported COSE algorithm

use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer};
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey};
use ring::signature::{Ed25519KeyPair, KeyPair};

use crate::webauthn::cose::{CoseAlgorithm, CoseKey, EcCurve};

/// A private key together with the COSE algorithm it signs with
#[derive(Clone, Debug)]
pub enum TestKey {
    Es256(SigningKey),
    Ec {
        algorithm: CoseAlgorithm,
        curve: EcCurve,
        key: PKey<Private>,
    },
    Ed25519([u8; 32]),
    Rsa {
        algorithm: CoseAlgorithm,
        key: PKey<Private>,
    },
}

impl TestKey {
    /// Deterministic P-256 key
    #[must_use]
    pub fn es256() -> Self {
        Self::es256_from_scalar([0x11; 32])
    }

    #[must_use]
    pub fn es256_from_scalar(scalar: [u8; 32]) -> Self {
        TestKey::Es256(SigningKey::from_slice(&scalar).expect("valid P-256 scalar"))
    }

    #[must_use]
    pub fn es384() -> Self {
        Self::generated_ec(CoseAlgorithm::Es384, EcCurve::P384, Nid::SECP384R1)
    }

    #[must_use]
    pub fn es512() -> Self {
        Self::generated_ec(CoseAlgorithm::Es512, EcCurve::P521, Nid::SECP521R1)
    }

    fn generated_ec(algorithm: CoseAlgorithm, curve: EcCurve, nid: Nid) -> Self {
        let group = EcGroup::from_curve_name(nid).expect("known curve");
        let key = EcKey::generate(&group).expect("EC key generation");
        TestKey::Ec {
            algorithm,
            curve,
            key: PKey::from_ec_key(key).expect("EC key wrapping"),
        }
    }

    /// Deterministic Ed25519 key
    #[must_use]
    pub fn ed25519() -> Self {
        TestKey::Ed25519([0x22; 32])
    }

    #[must_use]
    pub fn ed25519_from_seed(seed: [u8; 32]) -> Self {
        TestKey::Ed25519(seed)
    }

    #[must_use]
    pub fn rs256() -> Self {
        Self::generated_rsa(CoseAlgorithm::Rs256)
    }

    #[must_use]
    pub fn ps256() -> Self {
        Self::generated_rsa(CoseAlgorithm::Ps256)
    }

    fn generated_rsa(algorithm: CoseAlgorithm) -> Self {
        let rsa = Rsa::generate(2048).expect("RSA key generation");
        TestKey::Rsa {
            algorithm,
            key: PKey::from_rsa(rsa).expect("RSA key wrapping"),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            TestKey::Es256(_) => CoseAlgorithm::Es256,
            TestKey::Ed25519(_) => CoseAlgorithm::EdDsa,
            TestKey::Ec { algorithm, .. } | TestKey::Rsa { algorithm, .. } => *algorithm,
        }
    }

    /// Public half as a COSE key
    #[must_use]
    pub fn cose_key(&self) -> CoseKey {
        match self {
            TestKey::Es256(signing) => {
                let point = signing.verifying_key().to_encoded_point(false);
                CoseKey::Ec2 {
                    algorithm: CoseAlgorithm::Es256,
                    curve: EcCurve::P256,
                    x: point.x().expect("uncompressed point").to_vec(),
                    y: point.y().expect("uncompressed point").to_vec(),
                }
            }
            TestKey::Ec {
                algorithm,
                curve,
                key,
            } => {
                let ec = key.ec_key().expect("EC key");
                let mut ctx = BigNumContext::new().expect("bignum context");
                let mut x = BigNum::new().expect("bignum");
                let mut y = BigNum::new().expect("bignum");
                ec.public_key()
                    .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)
                    .expect("affine coordinates");
                let width = i32::try_from(curve.coordinate_len()).expect("small width");
                CoseKey::Ec2 {
                    algorithm: *algorithm,
                    curve: *curve,
                    x: x.to_vec_padded(width).expect("padded x"),
                    y: y.to_vec_padded(width).expect("padded y"),
                }
            }
            TestKey::Ed25519(seed) => CoseKey::Okp {
                algorithm: CoseAlgorithm::EdDsa,
                x: Self::ed25519_pair(seed).public_key().as_ref().to_vec(),
            },
            TestKey::Rsa { algorithm, key } => {
                let rsa = key.rsa().expect("RSA key");
                CoseKey::Rsa {
                    algorithm: *algorithm,
                    n: rsa.n().to_vec(),
                    e: rsa.e().to_vec(),
                }
            }
        }
    }

    /// Sign `data` the way an authenticator would (DER for ECDSA)
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        match self {
            TestKey::Es256(signing) => {
                let signature: Signature = signing.sign(data);
                signature.to_der().as_bytes().to_vec()
            }
            TestKey::Ec { algorithm, key, .. } => {
                let digest = if *algorithm == CoseAlgorithm::Es384 {
                    MessageDigest::sha384()
                } else {
                    MessageDigest::sha512()
                };
                openssl_sign(key, digest, data, false)
            }
            TestKey::Ed25519(seed) => Self::ed25519_pair(seed).sign(data).as_ref().to_vec(),
            TestKey::Rsa { algorithm, key } => {
                openssl_sign(key, MessageDigest::sha256(), data, *algorithm == CoseAlgorithm::Ps256)
            }
        }
    }

    /// The same key as an `openssl` private key, for issuing certificates over it
    #[must_use]
    pub fn private_key(&self) -> PKey<Private> {
        match self {
            TestKey::Es256(signing) => {
                let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256");
                let ctx = BigNumContext::new().expect("bignum context");
                let d = BigNum::from_slice(&signing.to_bytes()).expect("scalar");
                let mut point = EcPoint::new(&group).expect("point");
                point.mul_generator(&group, &d, &ctx).expect("public point");
                let ec = EcKey::from_private_components(&group, &d, &point).expect("EC key");
                PKey::from_ec_key(ec).expect("EC key wrapping")
            }
            TestKey::Ec { key, .. } | TestKey::Rsa { key, .. } => key.clone(),
            TestKey::Ed25519(seed) => {
                PKey::private_key_from_raw_bytes(seed, Id::ED25519).expect("Ed25519 key")
            }
        }
    }

    fn ed25519_pair(seed: &[u8; 32]) -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed_unchecked(seed).expect("Ed25519 seed")
    }
}

/// Sign with an `openssl` key, optionally with RSA-PSS padding
pub(crate) fn openssl_sign(
    key: &PKey<Private>,
    digest: MessageDigest,
    data: &[u8],
    pss: bool,
) -> Vec<u8> {
    let mut signer = Signer::new(digest, key).expect("signer");
    if pss {
        signer.set_rsa_padding(Padding::PKCS1_PSS).expect("PSS padding");
        signer
            .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
            .expect("PSS salt length");
        signer.set_rsa_mgf1_md(digest).expect("MGF1 digest");
    }
    signer.update(data).expect("signer update");
    signer.sign_to_vec().expect("signature")
}
