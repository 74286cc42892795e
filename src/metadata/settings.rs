use serde::{Deserialize, Serialize};

/// Metadata service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Download the FIDO Metadata Service BLOB
    pub enabled: bool,
    pub mds_url: String,
    /// PEM file replacing the built-in BLOB signing root
    pub mds_root_certificate: Option<String>,
    /// JSON list of metadata entries loaded alongside (or instead of) the BLOB
    pub local_metadata_path: Option<String>,
    pub refresh_interval_seconds: u64,
    /// Minimum delay before retrying after a failed refresh
    pub retry_backoff_seconds: u64,
    /// Entries older than this are no longer served while refreshes keep failing
    pub max_staleness_seconds: u64,
    pub fetch_timeout_seconds: u64,
    /// Upper bound on how long startup waits for the first load
    pub startup_wait_seconds: u64,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mds_url: "https://mds3.fidoalliance.org/".to_string(),
            mds_root_certificate: None,
            local_metadata_path: None,
            refresh_interval_seconds: 86_400,
            retry_backoff_seconds: 300,
            max_staleness_seconds: 604_800,
            fetch_timeout_seconds: 30,
            startup_wait_seconds: 10,
        }
    }
}
