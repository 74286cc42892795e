//! `WebAuthn` core types
//!
//! Options issued to the client, the responses it sends back, stored
//! credential records and verification results. Binary fields travel as
//! unpadded base64url in JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serde helpers for `Vec<u8>` fields encoded as base64url
pub mod base64url {
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Decode unpadded or padded base64url
    ///
    /// # Errors
    /// Returns the `base64` error for invalid input.
    pub fn decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
        URL_SAFE_NO_PAD
            .decode(input)
            .or_else(|_| URL_SAFE.decode(input))
    }

    #[must_use]
    pub fn encode(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// # Errors
    /// Never fails for in-memory serializers.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    /// # Errors
    /// Fails when the string is not base64url.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        /// # Errors
        /// Never fails for in-memory serializers.
        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => serializer.serialize_some(&super::encode(b)),
                None => serializer.serialize_none(),
            }
        }

        /// Missing, null and empty strings all read as `None`
        ///
        /// # Errors
        /// Fails when the string is not base64url.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) if !text.is_empty() => super::decode(&text)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

/// Credential type; `WebAuthn` defines only public-key credentials
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CredentialType {
    #[default]
    #[serde(rename = "public-key")]
    PublicKey,
}

/// Transport hint reported by the client
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
    #[serde(rename = "smart-card")]
    SmartCard,
}

/// Identifies one public-key credential
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CredentialDescriptor {
    #[serde(rename = "type", default)]
    pub credential_type: CredentialType,
    #[serde(with = "base64url")]
    pub id: Vec<u8>, // Opaque credential id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

impl CredentialDescriptor {
    #[must_use]
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            credential_type: CredentialType::PublicKey,
            id,
            transports: Vec::new(),
        }
    }
}

/// Registered user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    #[serde(with = "base64url")]
    pub id: Vec<u8>, // Opaque user handle
    pub name: String, // Principal name
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

/// `WebAuthn` relying party information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,   // Domain name (e.g., "example.com")
    pub name: String, // Display name
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type", default)]
    pub credential_type: CredentialType,
    pub alg: i64, // COSE algorithm identifier (-7 for ES256, -257 for RS256)
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(rename = "authenticatorAttachment", skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>, // "platform", "cross-platform"
    #[serde(rename = "residentKey", skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<String>, // "discouraged", "preferred", "required"
    #[serde(rename = "requireResidentKey", default)]
    pub require_resident_key: bool,
    #[serde(rename = "userVerification", default)]
    pub user_verification: UserVerificationRequirement,
}

/// Registration options sent to the client and kept for verification
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegistrationOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub rp: RelyingParty,
    pub user: User,
    #[serde(rename = "pubKeyCredParams")]
    pub public_key_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u32, // Milliseconds
    #[serde(rename = "excludeCredentials", default)]
    pub exclude_credentials: Vec<CredentialDescriptor>,
    #[serde(rename = "authenticatorSelection", default)]
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    #[serde(default)]
    pub attestation: AttestationConveyance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Authentication options sent to the client and kept for verification
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuthenticationOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub timeout: u32, // Milliseconds
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[serde(rename = "allowCredentials", default)]
    pub allow_credentials: Vec<CredentialDescriptor>,
    #[serde(rename = "userVerification", default)]
    pub user_verification: UserVerificationRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Registration response from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationResponse {
    pub id: String, // Base64URL credential id as reported by the browser
    #[serde(rename = "rawId", with = "base64url")]
    pub raw_id: Vec<u8>,
    pub response: AuthenticatorAttestationResponse,
    #[serde(rename = "type")]
    pub credential_type: String, // Always "public-key"
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Authenticator attestation response
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(rename = "attestationObject", with = "base64url")]
    pub attestation_object: Vec<u8>,
    #[serde(default)]
    pub transports: Vec<AuthenticatorTransport>,
}

/// Authentication response from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticationResponse {
    pub id: String,
    #[serde(rename = "rawId", with = "base64url")]
    pub raw_id: Vec<u8>,
    pub response: AuthenticatorAssertionResponse,
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Authenticator assertion response
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(rename = "authenticatorData", with = "base64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "base64url")]
    pub signature: Vec<u8>,
    #[serde(rename = "userHandle", default, with = "base64url::option")]
    pub user_handle: Option<Vec<u8>>,
}

/// Stored credential record
///
/// Created by a successful registration; only `signature_counter` (and the
/// backup state flag) change afterwards.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserCredential {
    pub descriptor: CredentialDescriptor,
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>, // COSE_Key, carries its algorithm
    #[serde(with = "base64url")]
    pub user_handle: Vec<u8>,
    pub signature_counter: u32,
    pub credential_type: String, // Attestation format, e.g. "packed"
    pub aaguid: Uuid,
    pub registration_date: DateTime<Utc>,
    #[serde(default)]
    pub backup_eligible: bool,
    #[serde(default)]
    pub backed_up: bool,
}

impl UserCredential {
    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.descriptor.id
    }
}

/// How the authenticator proved its provenance
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationType {
    None,
    #[serde(rename = "self")]
    Self_,
    Basic,
    AttCa,
    AnonCa,
}

/// Outcome of trust evaluation for a registration
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Chain verified against a metadata trust anchor
    Verified,
    /// Certificate attestation without metadata, accepted by policy
    Unverified,
    SelfAttested,
    None,
}

/// Successful registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub credential: UserCredential,
    pub attestation_type: AttestationType,
    pub trust_level: TrustLevel,
    pub authenticator_description: Option<String>,
}

/// Successful assertion; the caller persists `new_counter`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedAssertion {
    pub credential_id: Vec<u8>,
    pub user_handle: Vec<u8>,
    pub new_counter: u32,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backed_up: bool,
    pub authenticated_at: DateTime<Utc>,
}
