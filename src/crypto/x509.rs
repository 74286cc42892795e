//! X.509 certificates for attestation trust paths
//!
//! `openssl` parses certificates, verifies chains and signatures; extension
//! values that `openssl` does not expose are read with the DER walker.

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Verifier};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509};

use super::der::{DerReader, TAG_BOOLEAN, TAG_OCTET_STRING};
use super::CryptoError;

pub const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const OID_EXTENDED_KEY_USAGE: &str = "2.5.29.37";

/// Signature schemes found in attestation statements and JWS headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    RsaPkcs1Sha1,
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    RsaPkcs1Sha512,
    RsaPssSha256,
    Ed25519,
}

/// One certificate extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub oid: String,
    pub critical: bool,
    pub value: Vec<u8>, // Content of the extnValue OCTET STRING
}

/// Parsed certificate with its original DER bytes
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    x509: X509,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.x509.subject_name())
            .field("der_len", &self.der.len())
            .finish()
    }
}

impl Certificate {
    /// # Errors
    /// Returns `CryptoError::Certificate` if the bytes are not a certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let x509 = X509::from_der(der)?;
        Ok(Self {
            der: der.to_vec(),
            x509,
        })
    }

    /// # Errors
    /// Returns `CryptoError::Certificate` if the PEM does not hold a certificate.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CryptoError> {
        let x509 = X509::from_pem(pem)?;
        let der = x509.to_der()?;
        Ok(Self { der, x509 })
    }

    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// # Errors
    /// Fails if the subject public key cannot be loaded.
    pub fn public_key(&self) -> Result<PKey<Public>, CryptoError> {
        Ok(self.x509.public_key()?)
    }

    /// X.509 version number as written on the wire (2 means v3)
    #[must_use]
    pub fn version(&self) -> i32 {
        self.x509.version()
    }

    #[must_use]
    pub fn subject_is_empty(&self) -> bool {
        self.x509.subject_name().entries().next().is_none()
    }

    /// First subject attribute with the given NID as UTF-8 text
    #[must_use]
    pub fn subject_entry(&self, nid: Nid) -> Option<String> {
        self.x509
            .subject_name()
            .entries_by_nid(nid)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
    }

    /// DNS names from the subject alternative name extension
    #[must_use]
    pub fn dns_names(&self) -> Vec<String> {
        self.x509
            .subject_alt_names()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.dnsname().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All extensions, read from the DER encoding
    ///
    /// # Errors
    /// Fails if the TBS certificate is malformed.
    pub fn extensions(&self) -> Result<Vec<Extension>, CryptoError> {
        let mut cert = DerReader::new(&self.der).read_sequence()?;
        let mut tbs = cert.read_sequence()?;

        let mut extensions = Vec::new();
        while !tbs.is_empty() {
            let element = tbs.read()?;
            if !element.is_context(3) {
                continue;
            }
            let mut list = element.reader().read_sequence()?;
            while !list.is_empty() {
                let mut ext = list.read_sequence()?;
                let oid = ext.read_oid()?;
                let mut next = ext.read()?;
                let mut critical = false;
                if next.is_universal(TAG_BOOLEAN) {
                    critical = next.content.first().is_some_and(|b| *b != 0);
                    next = ext.read()?;
                }
                if !next.is_universal(TAG_OCTET_STRING) {
                    return Err(CryptoError::Certificate(format!(
                        "extension {oid} has no value"
                    )));
                }
                extensions.push(Extension {
                    oid,
                    critical,
                    value: next.content.to_vec(),
                });
            }
        }
        Ok(extensions)
    }

    /// Extension by dotted OID
    ///
    /// # Errors
    /// Fails if the extension list is malformed.
    pub fn extension(&self, oid: &str) -> Result<Option<Extension>, CryptoError> {
        Ok(self.extensions()?.into_iter().find(|e| e.oid == oid))
    }

    /// `cA` flag of the basic constraints extension, false when absent
    ///
    /// # Errors
    /// Fails if the extension is malformed.
    pub fn is_ca(&self) -> Result<bool, CryptoError> {
        let Some(ext) = self.extension(OID_BASIC_CONSTRAINTS)? else {
            return Ok(false);
        };
        let mut constraints = DerReader::new(&ext.value).read_sequence()?;
        if constraints.is_empty() {
            return Ok(false);
        }
        let first = constraints.read()?;
        Ok(first.is_universal(TAG_BOOLEAN) && first.content.first().is_some_and(|b| *b != 0))
    }

    /// Whether the extended key usage extension lists `oid`
    ///
    /// # Errors
    /// Fails if the extension is malformed.
    pub fn has_extended_key_usage(&self, oid: &str) -> Result<bool, CryptoError> {
        let Some(ext) = self.extension(OID_EXTENDED_KEY_USAGE)? else {
            return Ok(false);
        };
        let mut usages = DerReader::new(&ext.value).read_sequence()?;
        while !usages.is_empty() {
            if usages.read_oid()? == oid {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Verify `signature` over `data` with this certificate's key
    ///
    /// # Errors
    /// Fails if the key cannot be used with the scheme.
    pub fn verify_signature(
        &self,
        scheme: SignatureScheme,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        verify_signature(&self.public_key()?, scheme, data, signature)
    }
}

/// Verify a signature with an `openssl` public key
///
/// ECDSA signatures are expected in DER form.
///
/// # Errors
/// Fails if the key type does not fit the scheme.
pub fn verify_signature(
    key: &PKey<Public>,
    scheme: SignatureScheme,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    let digest = match scheme {
        SignatureScheme::Ed25519 => {
            let mut verifier = Verifier::new_without_digest(key)?;
            return Ok(verifier.verify_oneshot(signature, data).unwrap_or(false));
        }
        SignatureScheme::RsaPkcs1Sha1 => MessageDigest::sha1(),
        SignatureScheme::EcdsaSha256
        | SignatureScheme::RsaPkcs1Sha256
        | SignatureScheme::RsaPssSha256 => MessageDigest::sha256(),
        SignatureScheme::EcdsaSha384 | SignatureScheme::RsaPkcs1Sha384 => MessageDigest::sha384(),
        SignatureScheme::EcdsaSha512 | SignatureScheme::RsaPkcs1Sha512 => MessageDigest::sha512(),
    };

    let mut verifier = Verifier::new(digest, key)?;
    if scheme == SignatureScheme::RsaPssSha256 {
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        verifier.set_rsa_mgf1_md(MessageDigest::sha256())?;
    }
    verifier.update(data)?;
    // A malformed signature is a failed verification, not an error
    Ok(verifier.verify(signature).unwrap_or(false))
}

/// Verify `leaf` chains to one of `roots` through `intermediates`
///
/// # Errors
/// Returns `CryptoError::Chain` with the `openssl` reason when verification fails.
pub fn verify_chain(
    leaf: &Certificate,
    intermediates: &[Certificate],
    roots: &[Certificate],
) -> Result<(), CryptoError> {
    if roots.is_empty() {
        return Err(CryptoError::Chain("no trust anchors".to_string()));
    }

    let mut builder = X509StoreBuilder::new()?;
    for root in roots {
        builder.add_cert(root.x509.clone())?;
    }
    let store = builder.build();

    let mut chain = Stack::new()?;
    for cert in intermediates {
        chain.push(cert.x509.clone())?;
    }

    let mut context = X509StoreContext::new()?;
    let outcome = context.init(&store, &leaf.x509, &chain, |ctx| {
        Ok(if ctx.verify_cert()? {
            Ok(())
        } else {
            Err(ctx.error().error_string().to_string())
        })
    })?;
    outcome.map_err(CryptoError::Chain)
}
