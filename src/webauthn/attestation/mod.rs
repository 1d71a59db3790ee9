//! `WebAuthn` attestation processing
//!
//! This module handles the attestation verification for `WebAuthn`
//! registrations. An [`AttestationObject`] is decoded once, its `fmt` is
//! resolved against the [`AttestationRegistry`] built at startup, and the
//! matching [`AttestationFormatValidator`] checks the statement.

mod android_key;
mod android_safetynet;
mod apple;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::oid_registry::Oid;

pub use android_key::AndroidKeyValidator;
pub use android_safetynet::AndroidSafetyNetValidator;
pub use apple::AppleValidator;
pub use fido_u2f::FidoU2fValidator;
pub use none::NoneValidator;
pub use packed::PackedValidator;
pub use tpm::TpmValidator;

use super::authenticator_data::AuthenticatorData;
use super::cbor::{self, CborValue};
use super::certificate::{self, Certificate};
use super::cose::{CoseAlgorithm, CredentialPublicKey};
use super::errors::{Result, WebAuthnError};

/// id-fido-gen-ce-aaguid
const FIDO_GEN_CE_AAGUID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

/// The closed set of attestation statement formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationFormat {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "packed")]
    Packed,
    #[serde(rename = "tpm")]
    Tpm,
    #[serde(rename = "fido-u2f")]
    FidoU2f,
    #[serde(rename = "android-key")]
    AndroidKey,
    #[serde(rename = "android-safetynet")]
    AndroidSafetyNet,
    #[serde(rename = "apple")]
    Apple,
}

impl AttestationFormat {
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::Packed,
        Self::Tpm,
        Self::FidoU2f,
        Self::AndroidKey,
        Self::AndroidSafetyNet,
        Self::Apple,
    ];

    /// Resolve a `fmt` value by exact name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Packed => "packed",
            Self::Tpm => "tpm",
            Self::FidoU2f => "fido-u2f",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attestation type conveyed by a verified statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationType {
    None,
    #[serde(rename = "self")]
    SelfAttestation,
    Basic,
    AttCa,
    AnonCa,
}

/// Outcome of a successful format validation
#[derive(Debug, Clone)]
pub struct AttestationResult {
    pub format: AttestationFormat,
    pub attestation_type: AttestationType,
    /// Attestation certificate first, then its chain
    pub trust_path: Vec<Certificate>,
    pub aaguid: Option<[u8; 16]>,
    /// SafetyNet `ctsProfileMatch`, when the format reports one
    pub cts_profile_match: Option<bool>,
}

impl AttestationResult {
    fn new(ctx: &VerificationContext<'_>, format: AttestationFormat) -> Self {
        Self {
            format,
            attestation_type: AttestationType::None,
            trust_path: Vec::new(),
            aaguid: ctx.auth_data.aaguid().copied(),
            cts_profile_match: None,
        }
    }
}

/// Inputs every format validator checks the statement against
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    pub auth_data: &'a AuthenticatorData,
    pub client_data_hash: &'a [u8; 32],
    pub now: DateTime<Utc>,
}

impl VerificationContext<'_> {
    /// `authenticatorData || clientDataHash`
    #[must_use]
    pub fn signed_data(&self) -> Vec<u8> {
        [self.auth_data.raw(), self.client_data_hash.as_slice()].concat()
    }

    /// # Errors
    /// Returns `Attestation` if the authenticator data carries no credential.
    pub fn credential_public_key(&self) -> Result<&CredentialPublicKey> {
        self.auth_data
            .credential_public_key()
            .ok_or_else(|| attestation_err("missing attested credential data"))
    }
}

/// A validator for one attestation statement format
pub trait AttestationFormatValidator: Send + Sync {
    fn format(&self) -> AttestationFormat;

    /// Verify `att_stmt` against the authenticator data and client data hash
    ///
    /// # Errors
    /// Returns an error describing the first failed check.
    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult>;
}

/// Validators for the formats this relying party accepts
pub struct AttestationRegistry {
    validators: Vec<Box<dyn AttestationFormatValidator>>,
}

impl AttestationRegistry {
    /// Build the registry for the allowed formats
    #[must_use]
    pub fn new(allowed: &[AttestationFormat], safetynet_max_age: Duration) -> Self {
        let mut validators: Vec<Box<dyn AttestationFormatValidator>> = Vec::new();
        for format in AttestationFormat::ALL {
            if !allowed.contains(&format) {
                continue;
            }
            validators.push(match format {
                AttestationFormat::None => Box::new(NoneValidator),
                AttestationFormat::Packed => Box::new(PackedValidator),
                AttestationFormat::Tpm => Box::new(TpmValidator),
                AttestationFormat::FidoU2f => Box::new(FidoU2fValidator),
                AttestationFormat::AndroidKey => Box::new(AndroidKeyValidator),
                AttestationFormat::AndroidSafetyNet => {
                    Box::new(AndroidSafetyNetValidator::new(safetynet_max_age))
                }
                AttestationFormat::Apple => Box::new(AppleValidator),
            });
        }
        Self { validators }
    }

    /// Formats with a registered validator
    #[must_use]
    pub fn formats(&self) -> Vec<AttestationFormat> {
        self.validators.iter().map(|v| v.format()).collect()
    }

    /// Look up the validator for a `fmt` value
    ///
    /// # Errors
    /// Returns `Attestation("unsupported format")` for unknown or disallowed formats.
    pub fn get(&self, fmt: &str) -> Result<&dyn AttestationFormatValidator> {
        let format =
            AttestationFormat::from_name(fmt).ok_or_else(|| attestation_err("unsupported format"))?;
        self.validators
            .iter()
            .find(|v| v.format() == format)
            .map(|v| v.as_ref())
            .ok_or_else(|| attestation_err("unsupported format"))
    }
}

impl fmt::Debug for AttestationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

/// Trusted attestation root certificates
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    roots: Vec<Certificate>,
}

impl TrustAnchors {
    #[must_use]
    pub fn new(roots: Vec<Certificate>) -> Self {
        Self { roots }
    }

    /// Load every certificate from a list of PEM files
    ///
    /// # Errors
    /// Returns `Configuration` if a file cannot be read or holds no valid
    /// certificate.
    pub fn from_pem_files(paths: &[PathBuf]) -> Result<Self> {
        let mut roots = Vec::new();
        for path in paths {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                WebAuthnError::Configuration(format!(
                    "cannot read trust anchor {}: {e}",
                    path.display()
                ))
            })?;
            let certificates = Certificate::from_pem_bundle(&pem).map_err(|e| {
                WebAuthnError::Configuration(format!(
                    "invalid trust anchor {}: {}",
                    path.display(),
                    e.reason()
                ))
            })?;
            if certificates.is_empty() {
                return Err(WebAuthnError::Configuration(format!(
                    "no certificate in trust anchor {}",
                    path.display()
                )));
            }
            roots.extend(certificates);
        }
        Ok(Self { roots })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn roots(&self) -> &[Certificate] {
        &self.roots
    }
}

/// A decoded attestation object
#[derive(Debug, Clone)]
pub struct AttestationObject {
    fmt: String,
    att_stmt: CborValue,
    auth_data: AuthenticatorData,
}

impl AttestationObject {
    /// Decode the CBOR attestation object and its authenticator data
    ///
    /// # Errors
    /// Returns `Cbor` for undecodable bytes, `Attestation` if `fmt`,
    /// `attStmt` or `authData` are missing or mistyped, and authenticator
    /// data errors from [`AuthenticatorData::parse`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value = cbor::decode(bytes)?;
        if value.as_map().is_none() {
            return Err(attestation_err("invalid attestation object"));
        }
        let fmt = value
            .get_text("fmt")
            .and_then(CborValue::as_text)
            .ok_or_else(|| attestation_err("invalid attestation object"))?
            .to_string();
        let att_stmt = value
            .get_text("attStmt")
            .filter(|v| v.as_map().is_some())
            .cloned()
            .ok_or_else(|| attestation_err("invalid attestation object"))?;
        let auth_data = value
            .get_text("authData")
            .and_then(CborValue::as_bytes)
            .ok_or_else(|| attestation_err("invalid attestation object"))?;
        let auth_data = AuthenticatorData::parse(auth_data)?;

        Ok(Self {
            fmt,
            att_stmt,
            auth_data,
        })
    }

    #[must_use]
    pub fn fmt(&self) -> &str {
        &self.fmt
    }

    #[must_use]
    pub fn att_stmt(&self) -> &CborValue {
        &self.att_stmt
    }

    #[must_use]
    pub fn auth_data(&self) -> &AuthenticatorData {
        &self.auth_data
    }

    /// # Errors
    /// Returns `Attestation("invalid rpId hash")` on mismatch.
    pub fn validate_rp_id_hash(&self, expected: &[u8; 32]) -> Result<()> {
        if self.auth_data.rp_id_hash() == expected {
            Ok(())
        } else {
            Err(attestation_err("invalid rpId hash"))
        }
    }

    /// Run the validator registered for this object's `fmt`
    ///
    /// # Errors
    /// Returns `Attestation("unsupported format")` for unknown formats and
    /// `Attestation(..)` for every validator failure.
    pub fn validate_attestation(
        &self,
        registry: &AttestationRegistry,
        client_data_hash: &[u8; 32],
        now: DateTime<Utc>,
    ) -> Result<AttestationResult> {
        let validator = registry.get(&self.fmt)?;
        let ctx = VerificationContext {
            auth_data: &self.auth_data,
            client_data_hash,
            now,
        };
        validator.validate(&self.att_stmt, &ctx).map_err(|e| match e {
            WebAuthnError::Attestation(_) => e,
            other => WebAuthnError::Attestation(other.reason()),
        })
    }

    /// Check the statement's trust path against the configured roots
    ///
    /// Formats without a certificate chain cannot satisfy a trust anchor.
    ///
    /// # Errors
    /// Returns `Attestation("invalid root certificate")` on failure.
    pub fn validate_root_certificate(
        &self,
        result: &AttestationResult,
        anchors: &TrustAnchors,
        now: DateTime<Utc>,
    ) -> Result<()> {
        certificate::verify_chain(&result.trust_path, anchors.roots(), now)
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the format validators
// ---------------------------------------------------------------------------

pub(crate) fn attestation_err(reason: &str) -> WebAuthnError {
    WebAuthnError::Attestation(reason.to_string())
}

pub(crate) fn invalid_signature() -> WebAuthnError {
    attestation_err("invalid certificate signature")
}

/// The statement's `alg` member
pub(crate) fn stmt_alg(att_stmt: &CborValue) -> Result<CoseAlgorithm> {
    let id = att_stmt
        .get_text("alg")
        .and_then(CborValue::as_i64)
        .ok_or_else(|| attestation_err("missing alg"))?;
    CoseAlgorithm::require(id)
}

/// A byte-string member of the statement
pub(crate) fn stmt_bytes<'a>(att_stmt: &'a CborValue, key: &str) -> Result<&'a [u8]> {
    att_stmt
        .get_text(key)
        .and_then(CborValue::as_bytes)
        .ok_or_else(|| WebAuthnError::Attestation(format!("missing {key}")))
}

/// The statement's `x5c` chain, `None` when absent
pub(crate) fn stmt_x5c(att_stmt: &CborValue) -> Result<Option<Vec<Certificate>>> {
    let Some(x5c) = att_stmt.get_text("x5c") else {
        return Ok(None);
    };
    let items = x5c
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| attestation_err("invalid x5c"))?;
    items
        .iter()
        .map(|item| {
            item.as_bytes()
                .ok_or_else(|| attestation_err("invalid x5c"))
                .and_then(Certificate::from_der)
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// If the certificate carries the FIDO AAGUID extension it must match
pub(crate) fn check_aaguid_extension(cert: &Certificate, aaguid: Option<&[u8; 16]>) -> Result<()> {
    let Some(ext) = cert.extension(&FIDO_GEN_CE_AAGUID) else {
        return Ok(());
    };
    if ext.critical {
        return Err(attestation_err("aaguid extension must not be critical"));
    }
    let (rest, value) = der_parser::der::parse_der_octetstring(&ext.value)
        .map_err(|e| WebAuthnError::Der(format!("invalid aaguid extension: {e}")))?;
    let value = value
        .as_slice()
        .map_err(|e| WebAuthnError::Der(format!("invalid aaguid extension: {e}")))?;
    if !rest.is_empty() {
        return Err(WebAuthnError::Der("invalid aaguid extension".to_string()));
    }
    match aaguid {
        Some(expected) if value == expected.as_slice() => Ok(()),
        _ => Err(attestation_err("aaguid mismatch")),
    }
}
