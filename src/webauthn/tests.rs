//! End-to-end verifier tests driven by a software authenticator

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::*;
use crate::metadata::{AuthenticatorStatus, EmptyTrustSource, TrustEntry, TrustSource};
use crate::testing::constants::{EVIL_ORIGIN, TEST_RP_ID, TEST_UPN};
use crate::testing::{Attestation, CertificateFactory, SoftAuthenticator, TestKey, DEFAULT_ORIGIN};

#[derive(Default)]
struct FixedTrust(HashMap<Uuid, Arc<TrustEntry>>);

impl FixedTrust {
    fn with(entry: TrustEntry) -> Self {
        let mut entries = HashMap::new();
        entries.insert(entry.aaguid, Arc::new(entry));
        Self(entries)
    }
}

#[async_trait]
impl TrustSource for FixedTrust {
    async fn get_metadata(&self, aaguid: Uuid) -> Option<Arc<TrustEntry>> {
        self.0.get(&aaguid).cloned()
    }
}

fn settings() -> WebAuthnSettings {
    WebAuthnSettings {
        rp_id: TEST_RP_ID.to_string(),
        rp_name: "Good Example".to_string(),
        rp_origin: DEFAULT_ORIGIN.to_string(),
        ..WebAuthnSettings::default()
    }
}

fn service() -> WebAuthnService {
    WebAuthnService::new(settings()).unwrap()
}

fn user() -> User {
    User {
        id: vec![0x42; 16],
        name: TEST_UPN.to_string(),
        display_name: "Alice".to_string(),
    }
}

async fn register_with(
    service: &WebAuthnService,
    authenticator: &SoftAuthenticator,
    attestation: Attestation<'_>,
    trust: &dyn TrustSource,
) -> Result<VerifiedCredential, VerifyError> {
    let options = service.start_registration(&user(), &[]).unwrap();
    let response = authenticator.register(&options, attestation);
    service
        .finish_registration(&response, &options, trust, |_| async { true })
        .await
}

async fn register(authenticator: &SoftAuthenticator) -> UserCredential {
    register_with(&service(), authenticator, Attestation::None, &EmptyTrustSource)
        .await
        .unwrap()
        .credential
}

fn authenticate(
    service: &WebAuthnService,
    authenticator: &mut SoftAuthenticator,
    stored: &UserCredential,
) -> Result<VerifiedAssertion, VerifyError> {
    let options = service.start_authentication(std::slice::from_ref(stored)).unwrap();
    let response = authenticator.authenticate(&options, Some(stored.user_handle.clone()));
    service.finish_authentication(&response, &options, stored, |_, _| true)
}

#[tokio::test]
async fn test_register_then_authenticate_then_replay() {
    let service = service();
    let mut authenticator = SoftAuthenticator::new(TestKey::es256());

    let verified = register_with(&service, &authenticator, Attestation::None, &EmptyTrustSource)
        .await
        .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::None);
    assert_eq!(verified.trust_level, TrustLevel::None);
    let mut stored = verified.credential;
    assert_eq!(stored.signature_counter, 0);
    assert_eq!(stored.id(), authenticator.credential_id());
    assert_eq!(stored.user_handle, user().id);
    assert_eq!(stored.credential_type, "none");
    assert_eq!(stored.descriptor.transports, vec![AuthenticatorTransport::Usb]);

    let options = service
        .start_authentication(std::slice::from_ref(&stored))
        .unwrap();
    let response = authenticator.authenticate(&options, Some(stored.user_handle.clone()));
    let assertion = service
        .finish_authentication(&response, &options, &stored, |_, _| true)
        .unwrap();
    assert_eq!(assertion.new_counter, 1);
    assert_eq!(assertion.credential_id, stored.id());
    assert!(assertion.user_verified);
    stored.signature_counter = assertion.new_counter;

    let replayed = service.finish_authentication(&response, &options, &stored, |_, _| true);
    assert_eq!(
        replayed.unwrap_err(),
        VerifyError::ReplayDetected {
            stored: 1,
            received: 1
        }
    );
}

#[tokio::test]
async fn test_foreign_origin_is_rejected() {
    let service = service();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let stored = register(&authenticator).await;

    let mut evil = authenticator.clone().with_origin(EVIL_ORIGIN);
    let result = authenticate(&service, &mut evil, &stored);
    assert!(matches!(result, Err(VerifyError::OriginMismatch(origin)) if origin == EVIL_ORIGIN));

    let registration = register_with(&service, &evil, Attestation::None, &EmptyTrustSource).await;
    assert!(matches!(registration, Err(VerifyError::OriginMismatch(_))));
}

#[tokio::test]
async fn test_challenge_off_by_one_byte() {
    let service = service();
    let mut authenticator = SoftAuthenticator::new(TestKey::es256());
    let stored = register(&authenticator).await;

    let mut options = service
        .start_authentication(std::slice::from_ref(&stored))
        .unwrap();
    let response = authenticator.authenticate(&options, None);
    options.challenge[0] ^= 0x01;
    let result = service.finish_authentication(&response, &options, &stored, |_, _| true);
    assert_eq!(result.unwrap_err(), VerifyError::ChallengeMismatch);
}

#[tokio::test]
async fn test_client_data_type_must_match_ceremony() {
    let service = service();
    let mut authenticator = SoftAuthenticator::new(TestKey::es256());
    let stored = register(&authenticator).await;

    let options = service
        .start_authentication(std::slice::from_ref(&stored))
        .unwrap();
    let mut response = authenticator.authenticate(&options, None);
    response.response.client_data_json =
        authenticator.client_data("webauthn.create", &options.challenge);
    assert!(matches!(
        service.finish_authentication(&response, &options, &stored, |_, _| true),
        Err(VerifyError::ClientDataTypeMismatch { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_credential_is_refused() {
    let service = service();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let options = service.start_registration(&user(), &[]).unwrap();
    let response = authenticator.register(&options, Attestation::None);

    let result = service
        .finish_registration(&response, &options, &EmptyTrustSource, |_| async { false })
        .await;
    assert_eq!(result.unwrap_err(), VerifyError::DuplicateCredential);
}

#[tokio::test]
async fn test_signature_from_another_key() {
    let service = service();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let stored = register(&authenticator).await;

    let mut impostor = SoftAuthenticator::new(TestKey::es256_from_scalar([0x33; 32]))
        .with_credential_id(authenticator.credential_id().to_vec());
    let result = authenticate(&service, &mut impostor, &stored);
    assert_eq!(result.unwrap_err(), VerifyError::InvalidSignature);
}

#[tokio::test]
async fn test_unknown_credential() {
    let service = service();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let stored = register(&authenticator).await;

    let mut other = SoftAuthenticator::new(TestKey::es256());
    let options = service
        .start_authentication(std::slice::from_ref(&stored))
        .unwrap();
    let response = other.authenticate(&options, None);
    let result = service.finish_authentication(&response, &options, &stored, |_, _| true);
    assert_eq!(result.unwrap_err(), VerifyError::UnknownCredential);
}

#[tokio::test]
async fn test_user_handle_must_own_credential() {
    let service = service();
    let mut authenticator = SoftAuthenticator::new(TestKey::es256());
    let stored = register(&authenticator).await;

    let options = service
        .start_authentication(std::slice::from_ref(&stored))
        .unwrap();
    let response = authenticator.authenticate(&options, Some(vec![0x99; 16]));
    let result = service.finish_authentication(&response, &options, &stored, |_, _| true);
    assert_eq!(result.unwrap_err(), VerifyError::UserHandleMismatch);

    let options = service
        .start_authentication(std::slice::from_ref(&stored))
        .unwrap();
    let response = authenticator.authenticate(&options, Some(stored.user_handle.clone()));
    let result = service.finish_authentication(&response, &options, &stored, |_, _| false);
    assert_eq!(result.unwrap_err(), VerifyError::UserHandleMismatch);
}

#[tokio::test]
async fn test_relying_party_id_mismatch() {
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let issuing = service();
    let options = issuing.start_registration(&user(), &[]).unwrap();
    let response = authenticator.register(&options, Attestation::None);

    let verifying = WebAuthnService::new(WebAuthnSettings {
        rp_id: "other.example".to_string(),
        ..settings()
    })
    .unwrap();
    let result = verifying
        .finish_registration(&response, &options, &EmptyTrustSource, |_| async { true })
        .await;
    assert_eq!(result.unwrap_err(), VerifyError::RelyingPartyMismatch);
}

#[tokio::test]
async fn test_user_verification_required() {
    let service = WebAuthnService::new(WebAuthnSettings {
        user_verification: UserVerificationRequirement::Required,
        ..settings()
    })
    .unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256()).without_user_verification();
    let result =
        register_with(&service, &authenticator, Attestation::None, &EmptyTrustSource).await;
    assert_eq!(result.unwrap_err(), VerifyError::UserVerificationRequired);
}

#[tokio::test]
async fn test_algorithm_not_offered() {
    let service = WebAuthnService::new(WebAuthnSettings {
        algorithms: vec![CoseAlgorithm::Es256.id()],
        ..settings()
    })
    .unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::ed25519());
    let result =
        register_with(&service, &authenticator, Attestation::None, &EmptyTrustSource).await;
    assert_eq!(result.unwrap_err(), VerifyError::UnsupportedAlgorithm(-8));
}

#[tokio::test]
async fn test_counterless_authenticator() {
    let service = service();
    let mut authenticator = SoftAuthenticator::new(TestKey::es256()).with_counter_step(0);
    let stored = register(&authenticator).await;

    for _ in 0..2 {
        let assertion = authenticate(&service, &mut authenticator, &stored).unwrap();
        assert_eq!(assertion.new_counter, 0);
    }
}

#[tokio::test]
async fn test_backup_flags_are_recorded() {
    let service = service();
    let mut authenticator = SoftAuthenticator::new(TestKey::es256()).backup_eligible();
    let stored = register(&authenticator).await;
    assert!(stored.backup_eligible);
    assert!(!stored.backed_up);

    let assertion = authenticate(&service, &mut authenticator, &stored).unwrap();
    assert!(assertion.backup_eligible);
}

#[tokio::test]
async fn test_every_credential_algorithm() {
    let service = WebAuthnService::new(WebAuthnSettings {
        algorithms: vec![-7, -8, -35, -36, -37, -257],
        ..settings()
    })
    .unwrap();

    for key in [
        TestKey::es256(),
        TestKey::es384(),
        TestKey::es512(),
        TestKey::ed25519(),
        TestKey::rs256(),
        TestKey::ps256(),
    ] {
        let algorithm = key.algorithm();
        let mut authenticator = SoftAuthenticator::new(key);
        let verified =
            register_with(&service, &authenticator, Attestation::PackedSelf, &EmptyTrustSource)
                .await
                .unwrap_or_else(|e| panic!("{algorithm:?} registration failed: {e}"));
        assert_eq!(verified.attestation_type, AttestationType::Self_);
        assert_eq!(verified.trust_level, TrustLevel::SelfAttested);

        let assertion = authenticate(&service, &mut authenticator, &verified.credential)
            .unwrap_or_else(|e| panic!("{algorithm:?} assertion failed: {e}"));
        assert_eq!(assertion.new_counter, 1);
    }
}

#[tokio::test]
async fn test_packed_full_attestation_chains_to_metadata() {
    let factory = CertificateFactory::new("Packed Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let trust = FixedTrust::with(TrustEntry::new(
        authenticator.aaguid(),
        "Test Security Key",
        vec![factory.root_certificate()],
    ));

    let verified = register_with(&service(), &authenticator, Attestation::Packed(&factory), &trust)
        .await
        .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::Basic);
    assert_eq!(verified.trust_level, TrustLevel::Verified);
    assert_eq!(
        verified.authenticator_description.as_deref(),
        Some("Test Security Key")
    );
    assert_eq!(verified.credential.credential_type, "packed");
    assert_eq!(verified.credential.aaguid, authenticator.aaguid());
}

#[tokio::test]
async fn test_fido_u2f_attestation() {
    let factory = CertificateFactory::new("U2F Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256()).with_aaguid(Uuid::nil());
    let trust = FixedTrust::with(TrustEntry::new(
        Uuid::nil(),
        "Legacy U2F",
        vec![factory.root_certificate()],
    ));

    let verified = register_with(&service(), &authenticator, Attestation::FidoU2f(&factory), &trust)
        .await
        .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::Basic);
    assert_eq!(verified.trust_level, TrustLevel::Verified);
    assert_eq!(verified.credential.credential_type, "fido-u2f");
}

#[tokio::test]
async fn test_android_key_attestation() {
    let factory = CertificateFactory::new("Android Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let trust = FixedTrust::with(TrustEntry::new(
        authenticator.aaguid(),
        "Android Keystore",
        vec![factory.root_certificate()],
    ));

    let verified =
        register_with(&service(), &authenticator, Attestation::AndroidKey(&factory), &trust)
            .await
            .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::Basic);
    assert_eq!(verified.trust_level, TrustLevel::Verified);
}

#[tokio::test]
async fn test_android_safetynet_attestation() {
    let factory = CertificateFactory::new("SafetyNet Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let trust = FixedTrust::with(TrustEntry::new(
        authenticator.aaguid(),
        "SafetyNet",
        vec![factory.root_certificate()],
    ));

    let verified = register_with(
        &service(),
        &authenticator,
        Attestation::AndroidSafetyNet(&factory),
        &trust,
    )
    .await
    .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::Basic);
    assert_eq!(verified.trust_level, TrustLevel::Verified);
    assert_eq!(verified.credential.credential_type, "android-safetynet");
}

#[tokio::test]
async fn test_tpm_attestation() {
    let factory = CertificateFactory::new("TPM Root").unwrap();
    for key in [TestKey::rs256(), TestKey::es256()] {
        let authenticator = SoftAuthenticator::new(key);
        let trust = FixedTrust::with(TrustEntry::new(
            authenticator.aaguid(),
            "Platform TPM",
            vec![factory.root_certificate()],
        ));

        let verified = register_with(&service(), &authenticator, Attestation::Tpm(&factory), &trust)
            .await
            .unwrap();
        assert_eq!(verified.attestation_type, AttestationType::AttCa);
        assert_eq!(verified.trust_level, TrustLevel::Verified);
    }
}

#[tokio::test]
async fn test_apple_attestation() {
    let factory = CertificateFactory::new("Apple Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());

    let verified = register_with(
        &service(),
        &authenticator,
        Attestation::Apple(&factory),
        &EmptyTrustSource,
    )
    .await
    .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::AnonCa);
    assert_eq!(verified.trust_level, TrustLevel::Unverified);
}

#[tokio::test]
async fn test_unknown_authenticator_policy_reject() {
    let factory = CertificateFactory::new("Packed Root").unwrap();
    let service = WebAuthnService::new(WebAuthnSettings {
        unknown_authenticator_policy: UnknownAuthenticatorPolicy::Reject,
        ..settings()
    })
    .unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());

    let result = register_with(
        &service,
        &authenticator,
        Attestation::Packed(&factory),
        &EmptyTrustSource,
    )
    .await;
    assert!(matches!(result, Err(VerifyError::TrustUnavailable(_))));

    // Self attestation does not consult metadata
    assert!(
        register_with(&service, &authenticator, Attestation::PackedSelf, &EmptyTrustSource)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_compromised_authenticator() {
    let factory = CertificateFactory::new("Packed Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let trust = FixedTrust::with(
        TrustEntry::new(
            authenticator.aaguid(),
            "Leaky Key",
            vec![factory.root_certificate()],
        )
        .with_status(AuthenticatorStatus::AttestationKeyCompromise),
    );

    let result =
        register_with(&service(), &authenticator, Attestation::Packed(&factory), &trust).await;
    assert!(matches!(result, Err(VerifyError::UntrustedAttestation(_))));
}

#[tokio::test]
async fn test_attestation_from_unlisted_root() {
    let factory = CertificateFactory::new("Packed Root").unwrap();
    let stranger = CertificateFactory::new("Some Other Root").unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let trust = FixedTrust::with(TrustEntry::new(
        authenticator.aaguid(),
        "Test Security Key",
        vec![stranger.root_certificate()],
    ));

    let result =
        register_with(&service(), &authenticator, Attestation::Packed(&factory), &trust).await;
    assert!(matches!(result, Err(VerifyError::UntrustedAttestation(_))));
}

#[tokio::test]
async fn test_trusted_attestation_required() {
    let service = WebAuthnService::new(WebAuthnSettings {
        require_trusted_attestation: true,
        ..settings()
    })
    .unwrap();
    let authenticator = SoftAuthenticator::new(TestKey::es256());

    for attestation in [Attestation::None, Attestation::PackedSelf] {
        let result = register_with(&service, &authenticator, attestation, &EmptyTrustSource).await;
        assert!(matches!(result, Err(VerifyError::UntrustedAttestation(_))));
    }
}

#[tokio::test]
async fn test_tampered_attestation_signature() {
    let service = service();
    let authenticator = SoftAuthenticator::new(TestKey::es256());
    let options = service.start_registration(&user(), &[]).unwrap();
    let mut response = authenticator.register(&options, Attestation::PackedSelf);

    // Swapping in another challenge's client data breaks the statement signature
    let mut forged_options = options.clone();
    forged_options.challenge[5] ^= 0xff;
    response.response.client_data_json =
        authenticator.client_data("webauthn.create", &forged_options.challenge);
    let result = service
        .finish_registration(&response, &forged_options, &EmptyTrustSource, |_| async { true })
        .await;
    assert!(matches!(
        result,
        Err(VerifyError::InvalidSignature | VerifyError::InvalidAttestation(_))
    ));
}
