use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::metadata::MetadataSettings;
use crate::otp::OtpSettings;
use crate::passkey::ChallengeSettings;
use crate::webauthn::{CoseAlgorithm, WebAuthnSettings, MIN_CHALLENGE_SIZE};

/// Environment variable naming a directory with an overriding `Settings.toml`
pub const SECRETS_DIR_ENV: &str = "MFA_SECRETS_DIR";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse settings file: {0}")]
    Toml(#[from] basic_toml::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderSettings {
    pub webauthn: WebAuthnSettings,
    pub metadata: MetadataSettings,
    pub otp: OtpSettings,
    pub challenges: ChallengeSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ProviderSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file cannot be read or parsed
    /// - The resulting settings fail [`ProviderSettings::validate`]
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::load_base_settings(
            Path::new("."),
            std::env::var(SECRETS_DIR_ENV).ok().as_deref().map(Path::new),
        )?;
        Self::apply_env_overrides(&mut settings);
        Self::initialize_logging(&settings.logging);
        settings.validate()?;
        Ok(settings)
    }

    /// Initialise `env_logger`, using the configured level when `RUST_LOG` is unset
    ///
    /// A logger installed earlier (by a host or another test) is left in place.
    fn initialize_logging(logging: &LoggingSettings) {
        let env = env_logger::Env::default().default_filter_or(logging.level.clone());
        if let Err(err) = env_logger::Builder::from_env(env).try_init() {
            log::debug!("Logger already initialised: {err}");
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `secrets_dir` (if given and it exists)
    /// 3. Settings.toml in `base_dir` (if it exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed.
    pub fn load_base_settings(
        base_dir: &Path,
        secrets_dir: Option<&Path>,
    ) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = base_dir.join("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            log::info!("Loaded base settings from {}", default_config_path.display());
        }

        if let Some(secrets_dir) = secrets_dir {
            let secrets_path = secrets_dir.join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                log::info!("Overriding settings from {}", secrets_path.display());
            } else {
                log::info!(
                    "{SECRETS_DIR_ENV} set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one settings file; missing sections and fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_webauthn_env_overrides(&mut settings.webauthn);
        Self::apply_metadata_env_overrides(&mut settings.metadata);
        Self::apply_otp_env_overrides(&mut settings.otp);
        Self::apply_numeric_env_override(
            "CHALLENGE_EXPIRY_SECONDS",
            &mut settings.challenges.expiry_seconds,
        );
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_webauthn_env_overrides(webauthn: &mut WebAuthnSettings) {
        if let Ok(rp_id) = std::env::var("WEBAUTHN_RP_ID") {
            webauthn.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("WEBAUTHN_RP_NAME") {
            webauthn.rp_name = rp_name;
        }
        if let Ok(rp_origin) = std::env::var("WEBAUTHN_RP_ORIGIN") {
            webauthn.rp_origin = rp_origin;
        }
        Self::apply_numeric_env_override("WEBAUTHN_TIMEOUT_SECONDS", &mut webauthn.timeout_seconds);
    }

    fn apply_metadata_env_overrides(metadata: &mut MetadataSettings) {
        if let Ok(mds_url) = std::env::var("MDS_URL") {
            metadata.mds_url = mds_url;
        }
        if let Ok(enabled_str) = std::env::var("MDS_ENABLED") {
            if let Ok(enabled) = enabled_str.parse::<bool>() {
                metadata.enabled = enabled;
            }
        }
    }

    fn apply_otp_env_overrides(otp: &mut OtpSettings) {
        if let Ok(digits_str) = std::env::var("TOTP_DIGITS") {
            if let Ok(digits) = digits_str.parse::<u32>() {
                otp.digits = digits;
            }
        }
        Self::apply_numeric_env_override("TOTP_PERIOD_SECONDS", &mut otp.period_seconds);
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Reject settings the services cannot run with
    ///
    /// # Errors
    ///
    /// `Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.webauthn.rp_id.trim().is_empty() {
            return Err(SettingsError::Invalid("webauthn.rp_id must not be empty".into()));
        }
        for origin in std::iter::once(&self.webauthn.rp_origin).chain(&self.webauthn.allowed_origins) {
            if !Self::is_secure_origin(origin) {
                return Err(SettingsError::Invalid(format!(
                    "origin {origin} must use https (plain http is only allowed for localhost)"
                )));
            }
        }
        if self.webauthn.challenge_size < MIN_CHALLENGE_SIZE {
            return Err(SettingsError::Invalid(format!(
                "webauthn.challenge_size must be at least {MIN_CHALLENGE_SIZE} bytes"
            )));
        }
        if self.webauthn.algorithms.is_empty() {
            return Err(SettingsError::Invalid("webauthn.algorithms must not be empty".into()));
        }
        for &id in &self.webauthn.algorithms {
            match CoseAlgorithm::from_id(id) {
                Ok(CoseAlgorithm::Rs1) | Err(_) => {
                    return Err(SettingsError::Invalid(format!(
                        "webauthn.algorithms cannot offer algorithm {id}"
                    )));
                }
                Ok(_) => {}
            }
        }
        if !(6..=8).contains(&self.otp.digits) {
            return Err(SettingsError::Invalid(format!(
                "otp.digits must be between 6 and 8, not {}",
                self.otp.digits
            )));
        }
        if self.otp.period_seconds == 0 {
            return Err(SettingsError::Invalid("otp.period_seconds must not be zero".into()));
        }
        Ok(())
    }

    fn is_secure_origin(origin: &str) -> bool {
        match url::Url::parse(origin) {
            Ok(url) => match url.scheme() {
                "https" => true,
                "http" => url.host_str() == Some("localhost"),
                _ => false,
            },
            Err(_) => false,
        }
    }
}
