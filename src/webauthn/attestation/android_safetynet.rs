//! `android-safetynet` attestation
//!
//! The statement's `response` is a compact JWS signed by Google's SafetyNet
//! service. The JWS header carries the signing chain in `x5c`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{
    attestation_err, invalid_signature, stmt_bytes, AttestationFormat,
    AttestationFormatValidator, AttestationResult, AttestationType, VerificationContext,
};
use crate::webauthn::buffer::base64url_decode;
use crate::webauthn::cbor::CborValue;
use crate::webauthn::certificate::Certificate;
use crate::webauthn::cose::CoseAlgorithm;
use crate::webauthn::crypto;
use crate::webauthn::der;
use crate::webauthn::errors::Result;
use openssl::nid::Nid;

const SAFETYNET_HOSTNAME: &str = "attest.android.com";

/// Allowed clock skew for responses timestamped in the future
const FUTURE_SKEW_MS: i64 = 60_000;

#[derive(Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AndroidSafetyNetValidator {
    max_age: Duration,
}

impl AndroidSafetyNetValidator {
    /// Validator accepting responses up to `max_age` old
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    fn check_timestamp(&self, timestamp_ms: i64, now: DateTime<Utc>) -> Result<()> {
        let now_ms = now.timestamp_millis();
        if timestamp_ms > now_ms + FUTURE_SKEW_MS {
            return Err(attestation_err("safetynet response is from the future"));
        }
        if now_ms - timestamp_ms > self.max_age.num_milliseconds() {
            return Err(attestation_err("safetynet response expired"));
        }
        Ok(())
    }
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T> {
    let bytes = base64url_decode(part)?;
    serde_json::from_slice(&bytes).map_err(|_| attestation_err("invalid safetynet response"))
}

impl AttestationFormatValidator for AndroidSafetyNetValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::AndroidSafetyNet
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        let ver = att_stmt
            .get_text("ver")
            .and_then(CborValue::as_text)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| attestation_err("missing ver"))?;
        let response = std::str::from_utf8(stmt_bytes(att_stmt, "response")?)
            .map_err(|_| attestation_err("invalid safetynet response"))?;
        log::debug!("Verifying SafetyNet response (ver {ver})");

        // 1. Split the compact JWS
        let parts: Vec<&str> = response.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
            return Err(attestation_err("invalid safetynet response"));
        };
        let header: JwsHeader = decode_part(header_b64)?;
        let payload: SafetyNetPayload = decode_part(payload_b64)?;
        let signature = base64url_decode(signature_b64)?;

        // 2. Certificate chain from the header
        if header.x5c.is_empty() {
            return Err(attestation_err("missing x5c"));
        }
        let chain = header
            .x5c
            .iter()
            .map(|cert| {
                STANDARD
                    .decode(cert)
                    .map_err(|_| attestation_err("invalid x5c"))
                    .and_then(|der| Certificate::from_der(&der))
            })
            .collect::<Result<Vec<_>>>()?;
        let leaf = &chain[0];
        if leaf.subject_entry(Nid::COMMONNAME).as_deref() != Some(SAFETYNET_HOSTNAME) {
            return Err(attestation_err("invalid safetynet certificate"));
        }

        // 3. JWS signature over "header.payload"
        let signing_input = format!("{header_b64}.{payload_b64}");
        let (alg, signature) = match header.alg.as_str() {
            "RS256" => (CoseAlgorithm::RS256, signature),
            "ES256" => (CoseAlgorithm::ES256, der::ecdsa_signature_from_raw(&signature)?),
            other => {
                return Err(attestation_err(&format!("unsupported JWS algorithm {other}")));
            }
        };
        let key = leaf.public_key();
        if !crypto::verify_signature(alg, key, signing_input.as_bytes(), &signature)? {
            return Err(invalid_signature());
        }

        // 4. Nonce binds the response to this registration
        let expected_nonce = STANDARD.encode(crypto::sha256(&ctx.signed_data()));
        if payload.nonce != expected_nonce {
            return Err(attestation_err("invalid nonce"));
        }

        // 5. Freshness
        self.check_timestamp(payload.timestamp_ms, ctx.now)?;

        let mut result = AttestationResult::new(ctx, AttestationFormat::AndroidSafetyNet);
        result.attestation_type = AttestationType::Basic;
        result.cts_profile_match = Some(payload.cts_profile_match);
        result.trust_path = chain;
        Ok(result)
    }
}
