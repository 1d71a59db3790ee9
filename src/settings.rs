use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::webauthn::{AttestationFormat, UserVerificationPolicy, WebAuthnSettings};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub webauthn: WebAuthnSettings,
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

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - An environment override holds an unknown value
    /// - The resulting `WebAuthn` settings are invalid
    pub fn load() -> anyhow::Result<Self> {
        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings)?;

        Self::initialize_logging(&settings.logging);

        settings
            .webauthn
            .validate()
            .context("invalid webauthn settings")?;
        Ok(settings)
    }

    /// Initialize logging unless the embedding application already did
    fn initialize_logging(logging: &LoggingSettings) {
        if env_logger::Builder::new()
            .parse_filters(&logging.level)
            .try_init()
            .is_err()
        {
            log::debug!("Logger already initialized, keeping existing configuration");
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `VOUCHRS_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> anyhow::Result<Self> {
        // 1. Start with default settings
        let mut settings = Self::default();

        // 2. Try to load from Settings.toml in current directory (lower priority)
        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        // 3. VOUCHRS_SECRETS_DIR/Settings.toml overrides with higher priority
        if let Ok(secrets_dir) = std::env::var("VOUCHRS_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ VOUCHRS_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// these settings.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let toml_content = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        basic_toml::from_str(&toml_content)
            .with_context(|| format!("cannot parse {}", path.display()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(settings: &mut Self) -> anyhow::Result<()> {
        Self::apply_webauthn_env_overrides(&mut settings.webauthn)?;
        Self::apply_logging_env_overrides(&mut settings.logging);
        Ok(())
    }

    /// Apply environment overrides for `WebAuthn` settings
    fn apply_webauthn_env_overrides(webauthn: &mut WebAuthnSettings) -> anyhow::Result<()> {
        if let Ok(rp_id) = std::env::var("WEBAUTHN_RP_ID") {
            webauthn.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("WEBAUTHN_RP_NAME") {
            webauthn.rp_name = rp_name;
        }
        if let Ok(origins) = std::env::var("WEBAUTHN_ORIGINS") {
            webauthn.origins = split_list(&origins);
        }
        Self::apply_numeric_env_override("WEBAUTHN_TIMEOUT_SECONDS", &mut webauthn.timeout_seconds);
        if let Ok(policy) = std::env::var("WEBAUTHN_USER_VERIFICATION") {
            webauthn.user_verification = policy
                .parse::<UserVerificationPolicy>()
                .context("WEBAUTHN_USER_VERIFICATION")?;
        }
        if let Ok(formats) = std::env::var("WEBAUTHN_ALLOWED_FORMATS") {
            webauthn.allowed_formats = split_list(&formats)
                .iter()
                .map(|name| {
                    AttestationFormat::from_name(name).with_context(|| {
                        format!("WEBAUTHN_ALLOWED_FORMATS: unknown attestation format '{name}'")
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        if let Ok(require) = std::env::var("WEBAUTHN_REQUIRE_CTS_PROFILE_MATCH") {
            webauthn.require_cts_profile_match = require
                .parse::<bool>()
                .context("WEBAUTHN_REQUIRE_CTS_PROFILE_MATCH")?;
        }
        if let Ok(anchors) = std::env::var("WEBAUTHN_TRUST_ANCHORS") {
            webauthn.trust_anchors = split_list(&anchors).into_iter().map(PathBuf::from).collect();
        }
        Ok(())
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }
}

/// Split a comma-separated environment value, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
