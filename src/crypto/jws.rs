//! Compact JWS with an `x5c` certificate header
//!
//! Used for the FIDO metadata blob and Android SafetyNet responses. The token
//! is signed by the first `x5c` certificate, which must chain to a caller
//! supplied root.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use serde::Deserialize;

use super::x509::{verify_chain, Certificate, SignatureScheme};
use super::CryptoError;

#[derive(Debug, Clone, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(default)]
    pub x5c: Vec<String>, // Standard base64 DER certificates, leaf first
    #[serde(default)]
    pub typ: Option<String>,
}

/// A parsed but not yet verified token
#[derive(Debug, Clone)]
pub struct ParsedJws {
    pub header: JwsHeader,
    pub payload: Vec<u8>,
    pub certificates: Vec<Certificate>,
    signing_input: Vec<u8>,
    signature: Vec<u8>,
}

/// A token whose signature and certificate chain have been checked
#[derive(Debug, Clone)]
pub struct VerifiedJws {
    pub header: JwsHeader,
    pub payload: Vec<u8>,
    pub certificates: Vec<Certificate>,
}

/// Split and decode a compact JWS
///
/// # Errors
/// Returns `CryptoError::Jws` when the token is structurally invalid.
pub fn parse_compact_jws(token: &str) -> Result<ParsedJws, CryptoError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
        return Err(CryptoError::Jws("expected three dot-separated parts".to_string()));
    };

    let header_json = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| CryptoError::Jws(format!("header encoding: {e}")))?;
    let header: JwsHeader = serde_json::from_slice(&header_json)
        .map_err(|e| CryptoError::Jws(format!("header JSON: {e}")))?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| CryptoError::Jws(format!("payload encoding: {e}")))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| CryptoError::Jws(format!("signature encoding: {e}")))?;

    let certificates = header
        .x5c
        .iter()
        .map(|c| {
            let der = STANDARD
                .decode(c)
                .map_err(|e| CryptoError::Jws(format!("x5c encoding: {e}")))?;
            Certificate::from_der(&der)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedJws {
        header,
        payload,
        certificates,
        signing_input: format!("{header_b64}.{payload_b64}").into_bytes(),
        signature,
    })
}

impl ParsedJws {
    /// Check the signature with the leaf `x5c` certificate
    ///
    /// # Errors
    /// Fails for a missing certificate, unsupported `alg` or a bad signature.
    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        let leaf = self
            .certificates
            .first()
            .ok_or_else(|| CryptoError::Jws("missing x5c header".to_string()))?;

        let (scheme, ecdsa_width) = match self.header.alg.as_str() {
            "RS256" => (SignatureScheme::RsaPkcs1Sha256, None),
            "RS384" => (SignatureScheme::RsaPkcs1Sha384, None),
            "RS512" => (SignatureScheme::RsaPkcs1Sha512, None),
            "PS256" => (SignatureScheme::RsaPssSha256, None),
            "ES256" => (SignatureScheme::EcdsaSha256, Some(32)),
            "ES384" => (SignatureScheme::EcdsaSha384, Some(48)),
            "ES512" => (SignatureScheme::EcdsaSha512, Some(66)),
            "EdDSA" => (SignatureScheme::Ed25519, None),
            other => return Err(CryptoError::Jws(format!("unsupported alg {other}"))),
        };

        // JWS carries ECDSA signatures as fixed-width r || s
        let signature = match ecdsa_width {
            Some(width) => raw_ecdsa_to_der(&self.signature, width)?,
            None => self.signature.clone(),
        };

        if leaf.verify_signature(scheme, &self.signing_input, &signature)? {
            Ok(())
        } else {
            Err(CryptoError::Jws("signature verification failed".to_string()))
        }
    }

    /// Check the `x5c` chain against `roots`
    ///
    /// # Errors
    /// Returns `CryptoError::Chain` when no root anchors the chain.
    pub fn verify_chain(&self, roots: &[Certificate]) -> Result<(), CryptoError> {
        let (leaf, rest) = self
            .certificates
            .split_first()
            .ok_or_else(|| CryptoError::Jws("missing x5c header".to_string()))?;
        verify_chain(leaf, rest, roots)
    }

    #[must_use]
    pub fn into_verified(self) -> VerifiedJws {
        VerifiedJws {
            header: self.header,
            payload: self.payload,
            certificates: self.certificates,
        }
    }
}

/// Parse a token and verify both its signature and certificate chain
///
/// # Errors
/// Any structural, signature or chain failure.
pub fn verify_compact_jws(token: &str, roots: &[Certificate]) -> Result<VerifiedJws, CryptoError> {
    let parsed = parse_compact_jws(token)?;
    parsed.verify_signature()?;
    parsed.verify_chain(roots)?;
    Ok(parsed.into_verified())
}

fn raw_ecdsa_to_der(raw: &[u8], width: usize) -> Result<Vec<u8>, CryptoError> {
    if raw.len() != width * 2 {
        return Err(CryptoError::Jws("ECDSA signature has the wrong length".to_string()));
    }
    let r = BigNum::from_slice(&raw[..width])?;
    let s = BigNum::from_slice(&raw[width..])?;
    Ok(EcdsaSig::from_private_components(r, s)?.to_der()?)
}
