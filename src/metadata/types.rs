//! FIDO metadata BLOB structures and the trust entries derived from them

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MetadataError;
use crate::crypto::Certificate;

/// Certification status of an authenticator model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticatorStatus {
    NotFidoCertified,
    FidoCertified,
    UserVerificationBypass,
    AttestationKeyCompromise,
    UserKeyRemoteCompromise,
    UserKeyPhysicalCompromise,
    UpdateAvailable,
    Revoked,
    SelfAssertionSubmitted,
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
    #[serde(other)]
    Unknown,
}

impl AuthenticatorStatus {
    /// Statuses after which new registrations must be refused
    #[must_use]
    pub fn is_compromised(self) -> bool {
        matches!(
            self,
            AuthenticatorStatus::UserVerificationBypass
                | AuthenticatorStatus::AttestationKeyCompromise
                | AuthenticatorStatus::UserKeyRemoteCompromise
                | AuthenticatorStatus::UserKeyPhysicalCompromise
                | AuthenticatorStatus::Revoked
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: AuthenticatorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
}

/// The parts of a metadata statement trust evaluation uses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    pub description: String,
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>, // Standard base64 DER
}

/// One entry of the metadata BLOB payload; also the format of local metadata files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaguid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_statement: Option<MetadataStatement>,
    #[serde(default)]
    pub status_reports: Vec<StatusReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_last_status_change: Option<String>,
}

/// Payload of the signed metadata BLOB
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobPayload {
    #[serde(default)]
    pub legal_header: Option<String>,
    pub no: u64,
    pub next_update: String,
    #[serde(default)]
    pub entries: Vec<MetadataBlobEntry>,
}

/// Trust anchors and status for one authenticator model
#[derive(Debug, Clone)]
pub struct TrustEntry {
    pub aaguid: Uuid,
    pub description: String,
    pub root_certificates: Vec<Certificate>,
    pub statuses: Vec<AuthenticatorStatus>,
}

impl TrustEntry {
    #[must_use]
    pub fn new(aaguid: Uuid, description: &str, root_certificates: Vec<Certificate>) -> Self {
        Self {
            aaguid,
            description: description.to_string(),
            root_certificates,
            statuses: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: AuthenticatorStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Whether any status report marks the model revoked or compromised
    #[must_use]
    pub fn is_compromised(&self) -> bool {
        self.statuses.iter().any(|s| s.is_compromised())
    }

    /// Convert a BLOB entry, skipping entries not keyed by AAGUID
    ///
    /// # Errors
    /// Returns `InvalidEntry` if a root certificate cannot be decoded.
    pub fn from_blob_entry(entry: MetadataBlobEntry) -> Result<Option<Self>, MetadataError> {
        let (Some(aaguid), Some(statement)) = (entry.aaguid, entry.metadata_statement) else {
            return Ok(None);
        };

        let root_certificates = statement
            .attestation_root_certificates
            .iter()
            .map(|encoded| {
                let der = STANDARD.decode(encoded).map_err(|e| {
                    MetadataError::InvalidEntry(format!("{aaguid}: root certificate base64: {e}"))
                })?;
                Certificate::from_der(&der).map_err(|e| {
                    MetadataError::InvalidEntry(format!("{aaguid}: root certificate: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            aaguid,
            description: statement.description,
            root_certificates,
            statuses: entry.status_reports.iter().map(|r| r.status).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        let reports: Vec<StatusReport> = serde_json::from_str(
            r#"[
                {"status": "FIDO_CERTIFIED_L1plus", "effectiveDate": "2021-01-01"},
                {"status": "REVOKED"},
                {"status": "SOMETHING_NEW"}
            ]"#,
        )
        .unwrap();
        assert_eq!(reports[0].status, AuthenticatorStatus::FidoCertifiedL1Plus);
        assert!(reports[1].status.is_compromised());
        assert_eq!(reports[2].status, AuthenticatorStatus::Unknown);
    }

    #[test]
    fn test_entry_without_aaguid_is_skipped() {
        let entry: MetadataBlobEntry = serde_json::from_str(
            r#"{"metadataStatement": {"description": "U2F key"}, "statusReports": []}"#,
        )
        .unwrap();
        assert!(TrustEntry::from_blob_entry(entry).unwrap().is_none());
    }

    #[test]
    fn test_bad_root_certificate_is_rejected() {
        let entry: MetadataBlobEntry = serde_json::from_str(
            r#"{
                "aaguid": "2fc0579f-8113-47ea-b116-bb5a8db9202a",
                "metadataStatement": {
                    "description": "YubiKey 5 NFC",
                    "attestationRootCertificates": ["AAAA"]
                }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            TrustEntry::from_blob_entry(entry),
            Err(MetadataError::InvalidEntry(_))
        ));
    }

    #[test]
    fn test_compromised_entry() {
        let entry = TrustEntry::new(Uuid::nil(), "test", Vec::new());
        assert!(!entry.is_compromised());
        let entry = entry
            .with_status(AuthenticatorStatus::FidoCertifiedL1)
            .with_status(AuthenticatorStatus::AttestationKeyCompromise);
        assert!(entry.is_compromised());
    }
}
