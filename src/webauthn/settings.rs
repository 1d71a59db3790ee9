//! `WebAuthn` settings implementation
//!
//! This module defines the relying-party policy for `WebAuthn` ceremonies,
//! independent of how the surrounding application loads its configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::attestation::AttestationFormat;
use super::errors::{Result, WebAuthnError};

/// Shortest challenge accepted by [`WebAuthnSettings::validate`]
pub const MIN_CHALLENGE_LENGTH: usize = 16;
/// Longest challenge accepted by [`WebAuthnSettings::validate`]
pub const MAX_CHALLENGE_LENGTH: usize = 64;

const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// User verification requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationPolicy {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl UserVerificationPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }

    /// Whether assertions and attestations must carry the UV flag
    #[must_use]
    pub fn is_required(self) -> bool {
        self == Self::Required
    }
}

impl fmt::Display for UserVerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserVerificationPolicy {
    type Err = WebAuthnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(WebAuthnError::Configuration(format!(
                "unknown user verification policy '{other}'"
            ))),
        }
    }
}

/// `WebAuthn` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebAuthnSettings {
    /// Relying Party ID (usually the domain)
    pub rp_id: String,
    /// Relying Party name (displayed to user)
    pub rp_name: String,
    /// Origins allowed to run ceremonies (e.g., <https://example.com>)
    pub origins: Vec<String>,
    /// Accept `crossOrigin: true` client data
    pub allow_cross_origin: bool,
    /// Timeout in seconds for ceremonies, also the lifetime of ceremony state
    pub timeout_seconds: u64,
    /// Challenge length in bytes
    pub challenge_length: usize,
    /// User verification requirement
    pub user_verification: UserVerificationPolicy,
    /// Optional authenticator attachment ("platform", "cross-platform")
    pub authenticator_attachment: Option<String>,
    /// Resident key preference ("discouraged", "preferred", "required")
    pub resident_key: String,
    /// Attestation formats accepted at registration
    pub allowed_formats: Vec<AttestationFormat>,
    /// Reject SafetyNet attestations whose device failed the CTS profile check
    pub require_cts_profile_match: bool,
    /// Maximum age of a SafetyNet response
    pub safetynet_max_age_seconds: u64,
    /// PEM files with trusted attestation roots
    pub trust_anchors: Vec<PathBuf>,
    /// Transports advertised for credentials that recorded none
    pub allowed_transports: Vec<String>,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "VouchRS".to_string(),
            origins: vec!["https://localhost".to_string()],
            allow_cross_origin: false,
            timeout_seconds: 60,
            challenge_length: 32,
            user_verification: UserVerificationPolicy::Preferred,
            authenticator_attachment: None,
            resident_key: "preferred".to_string(),
            allowed_formats: AttestationFormat::ALL.to_vec(),
            require_cts_profile_match: true,
            safetynet_max_age_seconds: 60,
            trust_anchors: Vec::new(),
            allowed_transports: vec![
                "usb".to_string(),
                "nfc".to_string(),
                "ble".to_string(),
                "hybrid".to_string(),
                "internal".to_string(),
            ],
        }
    }
}

fn config_err(msg: String) -> WebAuthnError {
    WebAuthnError::Configuration(msg)
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]") || host.ends_with(".localhost")
}

impl WebAuthnSettings {
    /// Check the settings once, before any ceremony runs
    ///
    /// # Errors
    /// Returns `Configuration` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let rp_id = self.rp_id.trim();
        if rp_id.is_empty() {
            return Err(config_err("rp_id must not be empty".to_string()));
        }
        if rp_id.contains("://") || rp_id.contains('/') || rp_id.contains(':') {
            return Err(config_err(format!(
                "rp_id '{rp_id}' must be a bare domain without scheme, port or path"
            )));
        }
        if self.rp_name.trim().is_empty() {
            return Err(config_err("rp_name must not be empty".to_string()));
        }

        if self.origins.is_empty() {
            return Err(config_err("at least one origin is required".to_string()));
        }
        for origin in &self.origins {
            self.validate_origin(origin)?;
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(config_err(format!(
                "timeout_seconds must be between 1 and {MAX_TIMEOUT_SECONDS}"
            )));
        }
        if !(MIN_CHALLENGE_LENGTH..=MAX_CHALLENGE_LENGTH).contains(&self.challenge_length) {
            return Err(config_err(format!(
                "challenge_length must be between {MIN_CHALLENGE_LENGTH} and {MAX_CHALLENGE_LENGTH} bytes"
            )));
        }

        if let Some(attachment) = &self.authenticator_attachment {
            if !matches!(attachment.as_str(), "platform" | "cross-platform") {
                return Err(config_err(format!(
                    "unknown authenticator attachment '{attachment}'"
                )));
            }
        }
        if !matches!(
            self.resident_key.as_str(),
            "discouraged" | "preferred" | "required"
        ) {
            return Err(config_err(format!(
                "unknown resident key preference '{}'",
                self.resident_key
            )));
        }

        if self.allowed_formats.is_empty() {
            return Err(config_err(
                "at least one attestation format must be allowed".to_string(),
            ));
        }
        if self.safetynet_max_age_seconds == 0 {
            return Err(config_err(
                "safetynet_max_age_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Origins must be https (plain http only for loopback hosts) and within the RP ID
    fn validate_origin(&self, origin: &str) -> Result<()> {
        let parsed = url::Url::parse(origin)
            .map_err(|e| config_err(format!("invalid origin '{origin}': {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| config_err(format!("origin '{origin}' has no host")))?;

        match parsed.scheme() {
            "https" => {}
            "http" if is_loopback(host) => {}
            _ => {
                return Err(config_err(format!(
                    "origin '{origin}' must use https"
                )))
            }
        }

        let rp_id = self.rp_id.trim();
        if host != rp_id && !host.ends_with(&format!(".{rp_id}")) {
            return Err(config_err(format!(
                "origin '{origin}' is not within rp_id '{rp_id}'"
            )));
        }
        Ok(())
    }

    /// Ceremony timeout in milliseconds, as sent to the browser
    #[must_use]
    pub fn timeout_ms(&self) -> u32 {
        u32::try_from(self.timeout_seconds.saturating_mul(1000)).unwrap_or(u32::MAX)
    }

    /// Lifetime of stored ceremony state
    #[must_use]
    pub fn ceremony_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.timeout_seconds).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn safetynet_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.safetynet_max_age_seconds).unwrap_or(i64::MAX))
    }

    /// Whether `"none"` is the only accepted format
    #[must_use]
    pub fn accepts_only_none(&self) -> bool {
        self.allowed_formats
            .iter()
            .all(|format| *format == AttestationFormat::None)
    }
}
