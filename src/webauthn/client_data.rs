//! Client data JSON verification
//!
//! The browser-produced `clientDataJSON` binds a response to the issued
//! challenge, the ceremony type and the calling origin.

use serde::Deserialize;
use url::Url;

use super::errors::VerifyError;
use super::types::base64url;
use crate::crypto::constant_time_eq;

/// Client data type for registration
pub const TYPE_CREATE: &str = "webauthn.create";
/// Client data type for authentication
pub const TYPE_GET: &str = "webauthn.get";

/// Parsed `CollectedClientData`
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    pub challenge: String, // Base64URL as echoed by the client
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: bool,
    #[serde(rename = "topOrigin", default)]
    pub top_origin: Option<String>,
}

/// Origins accepted for a relying party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    allow_cross_origin: bool,
}

impl OriginPolicy {
    /// Build a policy from the relying party origin and any extra origins
    ///
    /// # Errors
    /// Returns `VerifyError::Configuration` if an origin is not a URL.
    pub fn new(
        rp_origin: &str,
        extra_origins: &[String],
        allow_cross_origin: bool,
    ) -> Result<Self, VerifyError> {
        let allowed = std::iter::once(rp_origin)
            .chain(extra_origins.iter().map(String::as_str))
            .map(|origin| {
                Url::parse(origin)
                    .map(|_| normalize_origin(origin))
                    .map_err(|e| VerifyError::Configuration(format!("invalid origin {origin}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            allowed,
            allow_cross_origin,
        })
    }

    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        let normalized = normalize_origin(origin);
        self.allowed.iter().any(|allowed| *allowed == normalized)
    }
}

/// Scheme, host and non-default port in canonical form
///
/// Values that are not tuple origins (such as Android `apk-key-hash`
/// origins) are compared verbatim.
#[must_use]
pub fn normalize_origin(origin: &str) -> String {
    Url::parse(origin)
        .ok()
        .map(|url| url.origin())
        .filter(url::Origin::is_tuple)
        .map_or_else(|| origin.to_string(), |o| o.ascii_serialization())
}

/// Parse and check client data for a ceremony
///
/// # Errors
/// `MalformedResponse` for unparsable JSON, `ClientDataTypeMismatch`,
/// `ChallengeMismatch` (including an undecodable challenge) or `OriginMismatch`.
pub fn verify_client_data(
    raw: &[u8],
    expected_type: &'static str,
    expected_challenge: &[u8],
    origins: &OriginPolicy,
) -> Result<CollectedClientData, VerifyError> {
    let client_data: CollectedClientData = serde_json::from_slice(raw)
        .map_err(|e| VerifyError::MalformedResponse(format!("client data JSON: {e}")))?;

    if client_data.ceremony_type != expected_type {
        return Err(VerifyError::ClientDataTypeMismatch {
            expected: expected_type,
            actual: client_data.ceremony_type,
        });
    }

    let Ok(challenge) = base64url::decode(&client_data.challenge) else {
        return Err(VerifyError::ChallengeMismatch);
    };
    if !constant_time_eq(&challenge, expected_challenge) {
        return Err(VerifyError::ChallengeMismatch);
    }

    if !origins.allows(&client_data.origin) {
        return Err(VerifyError::OriginMismatch(client_data.origin));
    }

    if client_data.cross_origin && !origins.allow_cross_origin {
        return Err(VerifyError::OriginMismatch(
            client_data
                .top_origin
                .unwrap_or_else(|| "cross-origin frame".to_string()),
        ));
    }

    Ok(client_data)
}
