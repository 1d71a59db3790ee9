// Centralized logging for ceremony events. Never log challenges or key material.
use log::{debug, info, warn};

use crate::webauthn::buffer::base64url_encode;
use crate::webauthn::{AttestationFormat, AttestationType, WebAuthnError};

pub struct LoggingHelper;

/// Short, non-secret prefix of an identifier for log lines
fn short_id(id: &[u8]) -> String {
    let mut encoded = base64url_encode(id);
    encoded.truncate(12);
    encoded
}

impl LoggingHelper {
    /// Log service construction
    pub fn log_service_ready(rp_id: &str, formats: &[AttestationFormat], trust_anchors: usize) {
        info!("🔧 WebAuthn relying party {rp_id} ready");
        info!(
            "🎯 Accepted attestation formats: {}",
            formats
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if trust_anchors == 0 {
            info!("⏭️  No attestation trust anchors configured, skipping root checks");
        } else {
            info!("✅ {trust_anchors} attestation trust anchor(s) loaded");
        }
    }

    /// Log the start of a registration ceremony
    pub fn log_registration_started(user_id: &[u8], excluded: usize) {
        info!(
            "🔄 Registration started for user {} ({excluded} excluded credential(s))",
            short_id(user_id)
        );
    }

    /// Log the start of an authentication ceremony
    pub fn log_authentication_started(allowed: usize) {
        info!("🔄 Authentication started ({allowed} allowed credential(s))");
    }

    /// Log a verified attestation statement
    pub fn log_attestation_verified(
        format: AttestationFormat,
        attestation_type: AttestationType,
        chain_len: usize,
    ) {
        debug!("🔍 {format} attestation verified: type={attestation_type:?}, chain={chain_len}");
    }

    /// Log a completed registration
    pub fn log_credential_registered(
        credential_id: &[u8],
        format: AttestationFormat,
        root_valid: bool,
    ) {
        info!(
            "✅ Credential {} registered ({format}, root {})",
            short_id(credential_id),
            if root_valid { "trusted" } else { "unchecked" }
        );
    }

    /// Log a completed authentication
    pub fn log_assertion_verified(credential_id: &[u8], sign_count: u32) {
        info!(
            "✅ Assertion verified for credential {} (signCount {sign_count})",
            short_id(credential_id)
        );
    }

    /// Log a counter that did not increase
    pub fn log_counter_regression(credential_id: &[u8], stored: u32, received: u32) {
        warn!(
            "⚠️  Signature counter for credential {} did not increase ({stored} -> {received}), possible cloned authenticator",
            short_id(credential_id)
        );
    }

    /// Log a rejected ceremony
    pub fn log_ceremony_rejected(ceremony: &str, error: &WebAuthnError) {
        warn!(
            "❌ {ceremony} rejected ({}): {}",
            error.category(),
            error.reason()
        );
    }
}
