//! Authenticator metadata and attestation trust anchors
//!
//! Trust entries are keyed by AAGUID and come from the FIDO Metadata Service
//! BLOB, local JSON files or memory.

mod error;
mod service;
mod settings;
mod source;
mod types;

pub use error::MetadataError;
pub use service::{EmptyTrustSource, MetadataService, TrustSource};
pub use settings::MetadataSettings;
pub use source::{FileSource, MdsBlobSource, MetadataSource, StaticSource, FIDO_MDS_ROOT_CERTIFICATE};
pub use types::{
    AuthenticatorStatus, MetadataBlobEntry, MetadataBlobPayload, MetadataStatement, StatusReport,
    TrustEntry,
};
