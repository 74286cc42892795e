//! `packed` attestation
//!
//! Either a full attestation (`x5c` present, signed by the attestation
//! certificate) or self attestation (signed by the credential key itself).

use openssl::nid::Nid;

use super::{
    check_aaguid_extension, invalid, verify_with_certificate, AttestationContext,
    AttestationOutcome,
};
use crate::crypto::Certificate;
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

const REQUIRED_OU: &str = "Authenticator Attestation";

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    let algorithm = context.algorithm()?;
    let signature = context.signature()?;
    let signed = context.signed_data();

    if context.statement.get_text("ecdaaKeyId").is_some() {
        return Err(invalid("ECDAA attestation is not supported"));
    }

    match context.certificates()? {
        Some(certificates) => {
            let leaf = &certificates[0];
            verify_with_certificate(leaf, algorithm, &signed, signature)?;
            check_leaf_requirements(leaf)?;
            check_aaguid_extension(leaf, context.credential)?;
            Ok(AttestationOutcome::new(AttestationType::Basic, certificates))
        }
        None => {
            let key = &context.credential.public_key;
            if key.algorithm() != algorithm {
                return Err(invalid("self attestation alg differs from the credential key"));
            }
            key.verify(&signed, signature)?;
            Ok(AttestationOutcome::new(AttestationType::Self_, Vec::new()))
        }
    }
}

fn check_leaf_requirements(leaf: &Certificate) -> Result<(), VerifyError> {
    if leaf.version() != 2 {
        return Err(invalid("attestation certificate must be X.509 v3"));
    }
    if leaf.subject_entry(Nid::ORGANIZATIONALUNITNAME).as_deref() != Some(REQUIRED_OU) {
        return Err(invalid("attestation certificate subject OU is not 'Authenticator Attestation'"));
    }
    for nid in [Nid::COUNTRYNAME, Nid::ORGANIZATIONNAME, Nid::COMMONNAME] {
        if leaf.subject_entry(nid).is_none() {
            return Err(invalid("attestation certificate subject is incomplete"));
        }
    }
    if leaf.is_ca()? {
        return Err(invalid("attestation certificate must not be a CA"));
    }
    Ok(())
}
