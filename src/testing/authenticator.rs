//! A software authenticator producing real registration and assertion responses
//!
//! Every attestation format the verifier understands can be produced, with
//! attestation certificates issued by a [`CertificateFactory`] so metadata
//! trust can be anchored in tests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::hash::MessageDigest;
use uuid::Uuid;

use super::certificates::{der, sign_compact_jws, CertificateFactory, CertificateProfile};
use super::keys::{openssl_sign, TestKey};
use crate::cbor::{self, Map, Value};
use crate::crypto::{random_bytes, sha256};
use crate::webauthn::authenticator_data::AuthenticatorFlags;
use crate::webauthn::client_data::{TYPE_CREATE, TYPE_GET};
use crate::webauthn::types::{
    base64url, AuthenticationOptions, AuthenticationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, AuthenticatorTransport, RegistrationOptions,
    RegistrationResponse,
};
use crate::webauthn::{CoseKey, EcCurve};

/// Origin the software authenticator reports by default
pub const DEFAULT_ORIGIN: &str = "https://good.example";

const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";
const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";

/// Attestation statement to attach to a registration
#[derive(Debug, Clone, Copy)]
pub enum Attestation<'a> {
    None,
    PackedSelf,
    Packed(&'a CertificateFactory),
    FidoU2f(&'a CertificateFactory),
    AndroidKey(&'a CertificateFactory),
    AndroidSafetyNet(&'a CertificateFactory),
    Tpm(&'a CertificateFactory),
    Apple(&'a CertificateFactory),
}

/// Holds one credential and signs like a real authenticator would
#[derive(Debug, Clone)]
pub struct SoftAuthenticator {
    key: TestKey,
    credential_id: Vec<u8>,
    aaguid: Uuid,
    sign_count: u32,
    counter_step: u32,
    origin: String,
    user_verified: bool,
    backup_eligible: bool,
}

impl SoftAuthenticator {
    /// # Panics
    /// If the system random source fails.
    #[must_use]
    pub fn new(key: TestKey) -> Self {
        Self {
            key,
            credential_id: random_bytes(32).expect("random credential id"),
            aaguid: Uuid::from_u128(0x2fc0_579f_8113_47ea_b116_bb5a_8db9_202a),
            sign_count: 0,
            counter_step: 1,
            origin: DEFAULT_ORIGIN.to_string(),
            user_verified: true,
            backup_eligible: false,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    #[must_use]
    pub fn with_aaguid(mut self, aaguid: Uuid) -> Self {
        self.aaguid = aaguid;
        self
    }

    #[must_use]
    pub fn with_credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    /// Step of zero models an authenticator without a signature counter
    #[must_use]
    pub fn with_counter_step(mut self, step: u32) -> Self {
        self.counter_step = step;
        self
    }

    #[must_use]
    pub fn without_user_verification(mut self) -> Self {
        self.user_verified = false;
        self
    }

    #[must_use]
    pub fn backup_eligible(mut self) -> Self {
        self.backup_eligible = true;
        self
    }

    pub fn set_sign_count(&mut self, count: u32) {
        self.sign_count = count;
    }

    #[must_use]
    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    #[must_use]
    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    #[must_use]
    pub fn aaguid(&self) -> Uuid {
        self.aaguid
    }

    #[must_use]
    pub fn key(&self) -> &TestKey {
        &self.key
    }

    /// `clientDataJSON` as a browser would serialize it
    #[must_use]
    pub fn client_data(&self, ceremony_type: &str, challenge: &[u8]) -> Vec<u8> {
        serde_json::json!({
            "type": ceremony_type,
            "challenge": base64url::encode(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    /// Authenticator data for `rp_id`, with attested credential data on request
    #[must_use]
    pub fn authenticator_data(&self, rp_id: &str, attested: bool) -> Vec<u8> {
        let mut flags = AuthenticatorFlags::USER_PRESENT;
        if self.user_verified {
            flags |= AuthenticatorFlags::USER_VERIFIED;
        }
        if self.backup_eligible {
            flags |= AuthenticatorFlags::BACKUP_ELIGIBLE;
        }
        if attested {
            flags |= AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA;
        }

        let mut data = sha256(rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&self.sign_count.to_be_bytes());
        if attested {
            data.extend_from_slice(self.aaguid.as_bytes());
            let len = u16::try_from(self.credential_id.len()).expect("credential id fits u16");
            data.extend_from_slice(&len.to_be_bytes());
            data.extend_from_slice(&self.credential_id);
            data.extend(self.key.cose_key().to_bytes());
        }
        data
    }

    /// Answer `navigator.credentials.create()`
    ///
    /// # Panics
    /// If certificate issuance fails or the key does not suit the format.
    #[must_use]
    pub fn register(
        &self,
        options: &RegistrationOptions,
        attestation: Attestation<'_>,
    ) -> RegistrationResponse {
        let client_data_json = self.client_data(TYPE_CREATE, &options.challenge);
        let auth_data = self.authenticator_data(&options.rp.id, true);
        let client_data_hash = sha256(&client_data_json);
        let mut signed = auth_data.clone();
        signed.extend_from_slice(&client_data_hash);

        let (format, statement) = self.statement(attestation, &signed, &client_data_hash, &options.rp.id);
        let attestation_object = cbor::encode(&Value::Map(
            Map::new()
                .entry("fmt", format)
                .entry("attStmt", statement)
                .entry("authData", auth_data),
        ));

        RegistrationResponse {
            id: base64url::encode(&self.credential_id),
            raw_id: self.credential_id.clone(),
            response: AuthenticatorAttestationResponse {
                client_data_json,
                attestation_object,
                transports: vec![AuthenticatorTransport::Usb],
            },
            credential_type: "public-key".to_string(),
            client_extension_results: None,
        }
    }

    /// Answer `navigator.credentials.get()`, advancing the counter first
    #[must_use]
    pub fn authenticate(
        &mut self,
        options: &AuthenticationOptions,
        user_handle: Option<Vec<u8>>,
    ) -> AuthenticationResponse {
        self.sign_count = self.sign_count.wrapping_add(self.counter_step);
        let client_data_json = self.client_data(TYPE_GET, &options.challenge);
        let authenticator_data = self.authenticator_data(&options.rp_id, false);
        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));

        AuthenticationResponse {
            id: base64url::encode(&self.credential_id),
            raw_id: self.credential_id.clone(),
            response: AuthenticatorAssertionResponse {
                client_data_json,
                authenticator_data,
                signature: self.key.sign(&signed),
                user_handle,
            },
            credential_type: "public-key".to_string(),
            client_extension_results: None,
        }
    }

    fn statement(
        &self,
        attestation: Attestation<'_>,
        signed: &[u8],
        client_data_hash: &[u8; 32],
        rp_id: &str,
    ) -> (&'static str, Map) {
        let alg = self.key.algorithm().id();
        match attestation {
            Attestation::None => ("none", Map::new()),
            Attestation::PackedSelf => (
                "packed",
                Map::new()
                    .entry("alg", alg)
                    .entry("sig", self.key.sign(signed)),
            ),
            Attestation::Packed(factory) => {
                let leaf = factory
                    .issue_ec(&CertificateProfile::packed_leaf(Some(self.aaguid)))
                    .expect("packed attestation certificate");
                (
                    "packed",
                    Map::new()
                        .entry("alg", -7i64)
                        .entry("sig", leaf.sign_sha256(signed))
                        .entry("x5c", x5c(&[&leaf.der])),
                )
            }
            Attestation::FidoU2f(factory) => {
                let CoseKey::Ec2 {
                    curve: EcCurve::P256,
                    x,
                    y,
                    ..
                } = self.key.cose_key()
                else {
                    panic!("fido-u2f needs a P-256 credential key");
                };
                let leaf = factory
                    .issue_ec(&CertificateProfile::plain("U2F Attestation"))
                    .expect("u2f attestation certificate");
                let mut verification_data = vec![0x00];
                verification_data.extend_from_slice(&sha256(rp_id.as_bytes()));
                verification_data.extend_from_slice(client_data_hash);
                verification_data.extend_from_slice(&self.credential_id);
                verification_data.push(0x04);
                verification_data.extend(x);
                verification_data.extend(y);
                (
                    "fido-u2f",
                    Map::new()
                        .entry("sig", leaf.sign_sha256(&verification_data))
                        .entry("x5c", x5c(&[&leaf.der])),
                )
            }
            Attestation::AndroidKey(factory) => {
                let profile = CertificateProfile::plain("Android Keystore Key").with_extension(
                    OID_ANDROID_KEY_DESCRIPTION,
                    key_description(client_data_hash),
                );
                let leaf = factory
                    .issue_for_key(&profile, self.key.private_key())
                    .expect("android-key attestation certificate");
                (
                    "android-key",
                    Map::new()
                        .entry("alg", alg)
                        .entry("sig", self.key.sign(signed))
                        .entry("x5c", x5c(&[&leaf.der])),
                )
            }
            Attestation::AndroidSafetyNet(factory) => {
                let signer = factory
                    .issue_ec(&CertificateProfile::safetynet())
                    .expect("SafetyNet signing certificate");
                let payload = serde_json::json!({
                    "nonce": STANDARD.encode(sha256(signed)),
                    "timestampMs": chrono::Utc::now().timestamp_millis(),
                    "apkPackageName": "com.google.android.gms",
                    "ctsProfileMatch": true,
                    "basicIntegrity": true,
                });
                let token = sign_compact_jws(&signer, payload.to_string().as_bytes())
                    .expect("SafetyNet JWS");
                (
                    "android-safetynet",
                    Map::new()
                        .entry("ver", "14366018")
                        .entry("response", token.into_bytes()),
                )
            }
            Attestation::Tpm(factory) => {
                let aik = factory
                    .issue_rsa(&CertificateProfile::tpm_aik().with_aaguid(self.aaguid))
                    .expect("AIK certificate");
                let pub_area = tpm_pub_area(&self.key.cose_key());
                let cert_info = tpm_cert_info(&sha256(signed), &pub_area);
                let sig = openssl_sign(&aik.key, MessageDigest::sha256(), &cert_info, false);
                (
                    "tpm",
                    Map::new()
                        .entry("ver", "2.0")
                        .entry("alg", -257i64)
                        .entry("x5c", x5c(&[&aik.der]))
                        .entry("sig", sig)
                        .entry("certInfo", cert_info)
                        .entry("pubArea", pub_area),
                )
            }
            Attestation::Apple(factory) => {
                let nonce = der::sequence(&[der::explicit(1, &der::octet_string(&sha256(signed)))]);
                let profile =
                    CertificateProfile::plain("Apple Test Credential").with_extension(OID_APPLE_NONCE, nonce);
                let leaf = factory
                    .issue_for_key(&profile, self.key.private_key())
                    .expect("apple attestation certificate");
                ("apple", Map::new().entry("x5c", x5c(&[&leaf.der])))
            }
        }
    }
}

fn x5c(certificates: &[&Vec<u8>]) -> Value {
    Value::Array(
        certificates
            .iter()
            .map(|der| Value::Bytes((*der).clone()))
            .collect(),
    )
}

/// Android Keystore `KeyDescription` for a TEE-generated signing key
fn key_description(challenge: &[u8]) -> Vec<u8> {
    let software = der::sequence(&[]);
    let tee = der::sequence(&[
        der::explicit(1, &der::set(&[der::integer(2)])),
        der::explicit(702, &der::integer(0)),
    ]);
    der::sequence(&[
        der::integer(3),
        der::enumerated(1),
        der::integer(4),
        der::enumerated(1),
        der::octet_string(challenge),
        der::octet_string(&[]),
        software,
        tee,
    ])
}

fn put_sized(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = u16::try_from(bytes.len()).expect("TPM2B fits u16");
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

/// `TPMT_PUBLIC` for the credential key, with a SHA-256 name algorithm
fn tpm_pub_area(key: &CoseKey) -> Vec<u8> {
    let mut out = Vec::new();
    match key {
        CoseKey::Rsa { n, e, .. } => {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&0x000bu16.to_be_bytes());
            out.extend_from_slice(&0x0006_0472u32.to_be_bytes());
            put_sized(&mut out, &[]);
            out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric
            out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme
            let bits = u16::try_from(n.len() * 8).expect("key bits fit u16");
            out.extend_from_slice(&bits.to_be_bytes());
            let exponent = e.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
            out.extend_from_slice(&exponent.to_be_bytes());
            put_sized(&mut out, n);
        }
        CoseKey::Ec2 { curve, x, y, .. } => {
            let curve_id: u16 = match curve {
                EcCurve::P256 => 0x0003,
                EcCurve::P384 => 0x0004,
                EcCurve::P521 => 0x0005,
            };
            out.extend_from_slice(&0x0023u16.to_be_bytes());
            out.extend_from_slice(&0x000bu16.to_be_bytes());
            out.extend_from_slice(&0x0006_0472u32.to_be_bytes());
            put_sized(&mut out, &[]);
            out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric
            out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme
            out.extend_from_slice(&curve_id.to_be_bytes());
            out.extend_from_slice(&0x0010u16.to_be_bytes()); // kdf
            put_sized(&mut out, x);
            put_sized(&mut out, y);
        }
        CoseKey::Okp { .. } => panic!("TPM attestation needs an RSA or EC2 credential key"),
    }
    out
}

/// `TPMS_ATTEST` certifying `pub_area`, with `extra_data` bound to the ceremony
fn tpm_cert_info(extra_data: &[u8], pub_area: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xff54_4347u32.to_be_bytes());
    out.extend_from_slice(&0x8017u16.to_be_bytes());
    put_sized(&mut out, &[]); // qualifiedSigner
    put_sized(&mut out, extra_data);
    out.extend_from_slice(&[0u8; 17]); // clockInfo
    out.extend_from_slice(&0u64.to_be_bytes()); // firmwareVersion
    let mut name = 0x000bu16.to_be_bytes().to_vec();
    name.extend_from_slice(&sha256(pub_area));
    put_sized(&mut out, &name);
    put_sized(&mut out, &[]); // qualifiedName
    out
}
