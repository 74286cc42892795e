// Settings file precedence and environment overrides
use serial_test::serial;
use std::fs;
use webauthn_mfa::otp::OtpAlgorithm;
use webauthn_mfa::settings::{ProviderSettings, SettingsError, SECRETS_DIR_ENV};
use webauthn_mfa::webauthn::{UnknownAuthenticatorPolicy, UserVerificationRequirement};

fn clean_env_vars() {
    for var in [
        "WEBAUTHN_RP_ID",
        "WEBAUTHN_RP_NAME",
        "WEBAUTHN_RP_ORIGIN",
        "WEBAUTHN_TIMEOUT_SECONDS",
        "MDS_URL",
        "MDS_ENABLED",
        "TOTP_DIGITS",
        "TOTP_PERIOD_SECONDS",
        "CHALLENGE_EXPIRY_SECONDS",
        SECRETS_DIR_ENV,
    ] {
        std::env::remove_var(var);
    }
}

const BASE_SETTINGS: &str = r#"
[webauthn]
rp_id = "good.example"
rp_name = "Good Example"
rp_origin = "https://good.example"
user_verification = "required"
unknown_authenticator_policy = "reject"
algorithms = [-7, -8]

[metadata]
enabled = false
local_metadata_path = "/etc/mfa/metadata.json"

[otp]
digits = 8
algorithm = "SHA256"
issuer = "Good Example"

[challenges]
expiry_seconds = 120
"#;

#[test]
fn test_missing_files_give_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ProviderSettings::load_base_settings(dir.path(), None).unwrap();
    assert_eq!(settings.webauthn.rp_id, "localhost");
    assert_eq!(settings.otp.digits, 6);
    assert_eq!(settings.challenges.expiry_seconds, 300);
}

#[test]
fn test_base_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Settings.toml"), BASE_SETTINGS).unwrap();

    let settings = ProviderSettings::load_base_settings(dir.path(), None).unwrap();
    assert_eq!(settings.webauthn.rp_id, "good.example");
    assert_eq!(
        settings.webauthn.user_verification,
        UserVerificationRequirement::Required
    );
    assert_eq!(
        settings.webauthn.unknown_authenticator_policy,
        UnknownAuthenticatorPolicy::Reject
    );
    assert_eq!(settings.webauthn.algorithms, vec![-7, -8]);
    assert_eq!(
        settings.metadata.local_metadata_path.as_deref(),
        Some("/etc/mfa/metadata.json")
    );
    assert_eq!(settings.otp.digits, 8);
    assert_eq!(settings.otp.algorithm, OtpAlgorithm::Sha256);
    assert_eq!(settings.challenges.expiry_seconds, 120);
    // Fields absent from the file keep their defaults
    assert_eq!(settings.webauthn.challenge_size, 32);
    assert_eq!(settings.logging.level, "info");
    settings.validate().unwrap();
}

#[test]
fn test_secrets_dir_replaces_base_file() {
    let base = tempfile::tempdir().unwrap();
    let secrets = tempfile::tempdir().unwrap();
    fs::write(base.path().join("Settings.toml"), BASE_SETTINGS).unwrap();
    fs::write(
        secrets.path().join("Settings.toml"),
        "[webauthn]\nrp_id = \"secret.example\"\nrp_origin = \"https://secret.example\"\n",
    )
    .unwrap();

    let settings = ProviderSettings::load_base_settings(base.path(), Some(secrets.path())).unwrap();
    assert_eq!(settings.webauthn.rp_id, "secret.example");
    // The secrets file replaces the base file as a whole
    assert_eq!(settings.otp.digits, 6);
}

#[test]
fn test_secrets_dir_without_file_keeps_base() {
    let base = tempfile::tempdir().unwrap();
    let secrets = tempfile::tempdir().unwrap();
    fs::write(base.path().join("Settings.toml"), BASE_SETTINGS).unwrap();

    let settings = ProviderSettings::load_base_settings(base.path(), Some(secrets.path())).unwrap();
    assert_eq!(settings.webauthn.rp_id, "good.example");
}

#[test]
fn test_unparseable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Settings.toml"), "[webauthn\nrp_id = ").unwrap();
    assert!(matches!(
        ProviderSettings::load_base_settings(dir.path(), None),
        Err(SettingsError::Toml(_))
    ));
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clean_env_vars();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Settings.toml"), BASE_SETTINGS).unwrap();
    std::env::set_var("WEBAUTHN_RP_NAME", "Overridden");
    std::env::set_var("TOTP_DIGITS", "7");
    std::env::set_var("TOTP_PERIOD_SECONDS", "60");
    std::env::set_var("MDS_ENABLED", "true");
    std::env::set_var("MDS_URL", "https://mds.good.example/");

    let mut settings = ProviderSettings::load_base_settings(dir.path(), None).unwrap();
    ProviderSettings::apply_env_overrides(&mut settings);

    assert_eq!(settings.webauthn.rp_name, "Overridden");
    assert_eq!(settings.webauthn.rp_id, "good.example");
    assert_eq!(settings.otp.digits, 7);
    assert_eq!(settings.otp.period_seconds, 60);
    assert!(settings.metadata.enabled);
    assert_eq!(settings.metadata.mds_url, "https://mds.good.example/");

    clean_env_vars();
}

#[test]
#[serial]
fn test_env_can_make_settings_invalid() {
    clean_env_vars();
    std::env::set_var("WEBAUTHN_RP_ORIGIN", "http://good.example");

    let mut settings = ProviderSettings::default();
    ProviderSettings::apply_env_overrides(&mut settings);
    assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

    clean_env_vars();
}
