//! Where trust entries come from
//!
//! A source is fetched as a whole on every refresh; the service swaps the
//! resulting set in atomically.

use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, warn};

use super::error::MetadataError;
use super::types::{MetadataBlobEntry, MetadataBlobPayload, TrustEntry};
use crate::crypto::{verify_compact_jws, Certificate};

/// Root certificate signing the FIDO Alliance metadata BLOB (GlobalSign Root CA - R3)
pub const FIDO_MDS_ROOT_CERTIFICATE: &str = r"-----BEGIN CERTIFICATE-----
MIIDXzCCAkegAwIBAgILBAAAAAABIVhTCKIwDQYJKoZIhvcNAQELBQAwTDEgMB4G
A1UECxMXR2xvYmFsU2lnbiBSb290IENBIC0gUjMxEzARBgNVBAoTCkdsb2JhbFNp
Z24xEzARBgNVBAMTCkdsb2JhbFNpZ24wHhcNMDkwMzE4MTAwMDAwWhcNMjkwMzE4
MTAwMDAwWjBMMSAwHgYDVQQLExdHbG9iYWxTaWduIFJvb3QgQ0EgLSBSMzETMBEG
A1UEChMKR2xvYmFsU2lnbjETMBEGA1UEAxMKR2xvYmFsU2lnbjCCASIwDQYJKoZI
hvcNAQEBBQADggEPADCCAQoCggEBAMwldpB5BngiFvXAg7aEyiie/QV2EcWtiHL8
RgJDx7KKnQRfJMsuS+FggkbhUqsMgUdwbN1k0ev1LKMPgj0MK66X17YUhhB5uzsT
gHeMCOFJ0mpiLx9e+pZo34knlTifBtc+ycsmWQ1z3rDI6SYOgxXG71uL0gRgykmm
KPZpO/bLyCiR5Z2KYVc3rHQU3HTgOu5yLy6c+9C7v/U9AOEGM+iCK65TpjoWc4zd
QQ4gOsC0p6Hpsk+QLjJg6VfLuQSSaGjlOCZgdbKfd/+RFO+uIEn8rUAVSNECMWEZ
XriX7613t2Saer9fwRPvm2L7DWzgVGkWqQPabumDk3F2xmmFghcCAwEAAaNCMEAw
DgYDVR0PAQH/BAQDAgEGMA8GA1UdEwEB/wQFMAMBAf8wHQYDVR0OBBYEFI/wS3+o
LkUkrk1Q+mOai97i3Ru8MA0GCSqGSIb3DQEBCwUAA4IBAQBLQNvAUKr+yAzv95ZU
RUm7lgAJQayzE4aGKAczymvmdLm6AC2upArT9fHxD4q/c2dKg8dEe3jgr25sbwMp
jjM5RcOO5LlXbKr8EpbsU8Yt5CRsuZRj+9xTaGdWPoO4zzUhw8lo/s7awlOqzJCK
6fBdRoyV3XpYKBovHd7NADdBj+1EbddTKJd+82cEHhXXipa0095MJ6RMG3NzdvQX
mcIfeg7jLQitChws/zyrVQ4PkX4268NXSb7hLi18YIvDQVETI53O9zJrlAGomecs
Mx86OyXShkDOOyyGeMlhLxS67ttVb9+E7gUJTb0o2HLO02JQZR7rkpeDMdmztcpH
WD9f
-----END CERTIFICATE-----
";

/// A provider of trust entries
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Short name for log messages
    fn name(&self) -> &str;

    /// Fetch the complete current set of entries
    ///
    /// # Errors
    /// Any failure to obtain or validate the metadata.
    async fn fetch(&self) -> Result<Vec<TrustEntry>, MetadataError>;
}

/// Entries supplied in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Vec<TrustEntry>,
}

impl StaticSource {
    #[must_use]
    pub fn new(entries: Vec<TrustEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl MetadataSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<TrustEntry>, MetadataError> {
        Ok(self.entries.clone())
    }
}

/// A JSON file holding a list of metadata BLOB entries
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetadataSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<Vec<TrustEntry>, MetadataError> {
        debug!("📂 Loading metadata from {}", self.path.display());
        let contents = tokio::fs::read(&self.path).await?;
        let entries: Vec<MetadataBlobEntry> = serde_json::from_slice(&contents)?;
        Ok(convert_entries(entries))
    }
}

/// The signed FIDO Metadata Service BLOB
#[derive(Debug, Clone)]
pub struct MdsBlobSource {
    url: String,
    roots: Vec<Certificate>,
    client: reqwest::Client,
}

impl MdsBlobSource {
    /// Create a source anchored at the given root certificates
    #[must_use]
    pub fn new(url: &str, roots: Vec<Certificate>) -> Self {
        Self {
            url: url.to_string(),
            roots,
            client: reqwest::Client::new(),
        }
    }

    /// Create a source anchored at the FIDO Alliance root
    ///
    /// # Errors
    /// Returns `Signature` if the embedded root cannot be parsed.
    pub fn with_fido_root(url: &str) -> Result<Self, MetadataError> {
        let root = Certificate::from_pem(FIDO_MDS_ROOT_CERTIFICATE.as_bytes())?;
        Ok(Self::new(url, vec![root]))
    }

    /// Verify a downloaded BLOB and extract its entries
    ///
    /// # Errors
    /// Signature or chain failures, or a malformed payload.
    pub fn parse_blob(&self, token: &str) -> Result<Vec<TrustEntry>, MetadataError> {
        let verified = verify_compact_jws(token, &self.roots)?;
        let payload: MetadataBlobPayload = serde_json::from_slice(&verified.payload)?;
        debug!(
            "📜 Metadata BLOB #{} with {} entries, next update {}",
            payload.no,
            payload.entries.len(),
            payload.next_update
        );
        Ok(convert_entries(payload.entries))
    }
}

#[async_trait]
impl MetadataSource for MdsBlobSource {
    fn name(&self) -> &str {
        "mds"
    }

    async fn fetch(&self) -> Result<Vec<TrustEntry>, MetadataError> {
        debug!("🌐 Fetching metadata BLOB from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(MetadataError::Fetch(format!(
                "metadata BLOB request failed with status: {}",
                response.status()
            )));
        }
        let token = response.text().await?;
        self.parse_blob(&token)
    }
}

/// Convert BLOB entries, dropping ones that cannot be used rather than the whole set
fn convert_entries(entries: Vec<MetadataBlobEntry>) -> Vec<TrustEntry> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match TrustEntry::from_blob_entry(entry) {
            Ok(Some(trust)) => out.push(trust),
            Ok(None) => {}
            Err(e) => warn!("⚠️ Skipping metadata entry: {e}"),
        }
    }
    out
}
