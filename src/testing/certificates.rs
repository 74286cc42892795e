//! Throwaway certificate authorities for attestation and metadata tests

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509NameBuilder, X509};
use uuid::Uuid;

use super::keys::openssl_sign;
use crate::crypto::Certificate;
use crate::webauthn::attestation::OID_FIDO_AAGUID;

/// Minimal DER writer for the extension payloads attestation formats carry
pub mod der {
    fn length(len: usize) -> Vec<u8> {
        if len < 0x80 {
            return vec![u8::try_from(len).unwrap_or(0)];
        }
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        let mut out = vec![0x80 | u8::try_from(bytes.len()).unwrap_or(0)];
        out.extend(bytes);
        out
    }

    /// Identifier, length and content
    #[must_use]
    pub fn tlv(identifier: &[u8], content: &[u8]) -> Vec<u8> {
        let mut out = identifier.to_vec();
        out.extend(length(content.len()));
        out.extend_from_slice(content);
        out
    }

    #[must_use]
    pub fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x30], &items.concat())
    }

    #[must_use]
    pub fn set(items: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x31], &items.concat())
    }

    #[must_use]
    pub fn integer(value: i64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        tlv(&[0x02], &bytes[start..])
    }

    #[must_use]
    pub fn enumerated(value: u8) -> Vec<u8> {
        tlv(&[0x0a], &[value])
    }

    #[must_use]
    pub fn octet_string(content: &[u8]) -> Vec<u8> {
        tlv(&[0x04], content)
    }

    #[must_use]
    pub fn null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    /// `[tag] EXPLICIT` wrapper, including high tag numbers
    #[must_use]
    pub fn explicit(tag: u32, inner: &[u8]) -> Vec<u8> {
        let identifier = if tag < 31 {
            vec![0xa0 | u8::try_from(tag).unwrap_or(0)]
        } else {
            let mut groups = Vec::new();
            let mut rest = tag;
            loop {
                groups.push(u8::try_from(rest & 0x7f).unwrap_or(0));
                rest >>= 7;
                if rest == 0 {
                    break;
                }
            }
            let last = groups.len() - 1;
            let mut identifier = vec![0xbf];
            for (i, group) in groups.iter().rev().enumerate() {
                identifier.push(if i == last { *group } else { group | 0x80 });
            }
            identifier
        };
        tlv(&identifier, inner)
    }
}

/// Subject and extensions of a certificate to issue
#[derive(Debug, Clone, Default)]
pub struct CertificateProfile {
    subject: Vec<(Nid, String)>,
    ca: bool,
    extended_key_usage: Vec<String>,
    dns_names: Vec<String>,
    extensions: Vec<(String, Vec<u8>)>,
}

impl CertificateProfile {
    /// Just a common name
    #[must_use]
    pub fn plain(common_name: &str) -> Self {
        Self {
            subject: vec![(Nid::COMMONNAME, common_name.to_string())],
            ..Self::default()
        }
    }

    /// A `packed` attestation leaf with the required subject fields
    #[must_use]
    pub fn packed_leaf(aaguid: Option<Uuid>) -> Self {
        let profile = Self {
            subject: vec![
                (Nid::COUNTRYNAME, "US".to_string()),
                (Nid::ORGANIZATIONNAME, "Test Vendor".to_string()),
                (
                    Nid::ORGANIZATIONALUNITNAME,
                    "Authenticator Attestation".to_string(),
                ),
                (Nid::COMMONNAME, "Test Authenticator".to_string()),
            ],
            ..Self::default()
        };
        match aaguid {
            Some(aaguid) => profile.with_aaguid(aaguid),
            None => profile,
        }
    }

    /// A TPM attestation identity key certificate: empty subject, AIK usage
    #[must_use]
    pub fn tpm_aik() -> Self {
        Self {
            extended_key_usage: vec!["2.23.133.8.3".to_string()],
            ..Self::default()
        }
    }

    /// The SafetyNet attestation signer
    #[must_use]
    pub fn safetynet() -> Self {
        let mut profile = Self::plain("attest.android.com");
        profile.dns_names.push("attest.android.com".to_string());
        profile
    }

    #[must_use]
    pub fn certificate_authority(common_name: &str) -> Self {
        Self {
            ca: true,
            ..Self::plain(common_name)
        }
    }

    #[must_use]
    pub fn with_aaguid(self, aaguid: Uuid) -> Self {
        self.with_extension(OID_FIDO_AAGUID, der::octet_string(aaguid.as_bytes()))
    }

    #[must_use]
    pub fn with_extension(mut self, oid: &str, value: Vec<u8>) -> Self {
        self.extensions.push((oid.to_string(), value));
        self
    }
}

/// An issued certificate and its private key
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub der: Vec<u8>,
    pub key: PKey<Private>,
}

impl IssuedCertificate {
    /// # Panics
    /// Never for certificates produced by [`CertificateFactory`].
    #[must_use]
    pub fn certificate(&self) -> Certificate {
        Certificate::from_der(&self.der).expect("issued certificate parses")
    }

    /// Sign with SHA-256 (ECDSA or PKCS#1 v1.5 depending on the key)
    #[must_use]
    pub fn sign_sha256(&self, data: &[u8]) -> Vec<u8> {
        openssl_sign(&self.key, MessageDigest::sha256(), data, false)
    }
}

/// A self-signed root that issues leaf and intermediate certificates
#[derive(Debug, Clone)]
pub struct CertificateFactory {
    key: PKey<Private>,
    certificate: X509,
    der: Vec<u8>,
}

impl CertificateFactory {
    /// Create a new P-256 root
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn new(common_name: &str) -> Result<Self, ErrorStack> {
        let key = generate_ec()?;
        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
        let name = name.build();

        let mut builder = base_builder(&key, &name, &name)?;
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;
        builder.sign(&key, MessageDigest::sha256())?;
        let certificate = builder.build();

        Ok(Self {
            der: certificate.to_der()?,
            key,
            certificate,
        })
    }

    #[must_use]
    pub fn root_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    /// # Panics
    /// Never; the root was produced by `openssl`.
    #[must_use]
    pub fn root_certificate(&self) -> Certificate {
        Certificate::from_der(&self.der).expect("root certificate parses")
    }

    /// Issue a certificate over a fresh P-256 key
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn issue_ec(&self, profile: &CertificateProfile) -> Result<IssuedCertificate, ErrorStack> {
        self.issue_for_key(profile, generate_ec()?)
    }

    /// Issue a certificate over a fresh RSA-2048 key
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn issue_rsa(&self, profile: &CertificateProfile) -> Result<IssuedCertificate, ErrorStack> {
        self.issue_for_key(profile, PKey::from_rsa(Rsa::generate(2048)?)?)
    }

    /// Issue a certificate over the given key
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn issue_for_key(
        &self,
        profile: &CertificateProfile,
        key: PKey<Private>,
    ) -> Result<IssuedCertificate, ErrorStack> {
        let mut name = X509NameBuilder::new()?;
        for (nid, value) in &profile.subject {
            name.append_entry_by_nid(*nid, value)?;
        }
        let name = name.build();

        let mut builder = base_builder(&key, &name, self.certificate.subject_name())?;
        if profile.ca {
            builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
            builder.append_extension(KeyUsage::new().critical().key_cert_sign().build()?)?;
        } else {
            builder.append_extension(BasicConstraints::new().build()?)?;
        }
        if !profile.extended_key_usage.is_empty() {
            let mut usage = ExtendedKeyUsage::new();
            for oid in &profile.extended_key_usage {
                usage.other(oid);
            }
            builder.append_extension(usage.build()?)?;
        }
        if !profile.dns_names.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for name in &profile.dns_names {
                san.dns(name);
            }
            let extension = san.build(&builder.x509v3_context(Some(&self.certificate), None))?;
            builder.append_extension(extension)?;
        }
        for (oid, value) in &profile.extensions {
            let object = Asn1Object::from_str(oid)?;
            let contents = Asn1OctetString::new_from_bytes(value)?;
            builder.append_extension(X509Extension::new_from_der(&object, false, &contents)?)?;
        }

        builder.sign(&self.key, MessageDigest::sha256())?;

        Ok(IssuedCertificate {
            der: builder.build().to_der()?,
            key,
        })
    }

    /// Issue an intermediate CA that can itself issue certificates
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn intermediate(&self, common_name: &str) -> Result<CertificateFactory, ErrorStack> {
        let issued = self.issue_ec(&CertificateProfile::certificate_authority(common_name))?;
        Ok(CertificateFactory {
            certificate: X509::from_der(&issued.der)?,
            der: issued.der,
            key: issued.key,
        })
    }
}

fn generate_ec() -> Result<PKey<Private>, ErrorStack> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    PKey::from_ec_key(EcKey::generate(&group)?)
}

fn base_builder(
    key: &PKey<Private>,
    subject: &X509Name,
    issuer: &openssl::x509::X509NameRef,
) -> Result<X509Builder, ErrorStack> {
    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let mut serial = BigNum::new()?;
    serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
    let serial: openssl::asn1::Asn1Integer = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(subject)?;
    builder.set_issuer_name(issuer)?;
    builder.set_pubkey(key)?;
    let now = chrono::Utc::now().timestamp();
    let not_before: Asn1Time = Asn1Time::from_unix(now - 3600)?;
    let not_after: Asn1Time = Asn1Time::from_unix(now + 86_400 * 365)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    Ok(builder)
}

/// Produce a compact JWS signed by `signer` with its certificate in `x5c`
///
/// # Errors
/// Any `openssl` failure.
pub fn sign_compact_jws(signer: &IssuedCertificate, payload: &[u8]) -> Result<String, ErrorStack> {
    let is_ec = signer.key.id() == Id::EC;
    let header = serde_json::json!({
        "alg": if is_ec { "ES256" } else { "RS256" },
        "typ": "JWT",
        "x5c": [STANDARD.encode(&signer.der)],
    });
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let der_signature = signer.sign_sha256(signing_input.as_bytes());
    let signature = if is_ec {
        let sig = EcdsaSig::from_der(&der_signature)?;
        let mut raw = sig.r().to_vec_padded(32)?;
        raw.extend(sig.s().to_vec_padded(32)?);
        raw
    } else {
        der_signature
    };

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}
