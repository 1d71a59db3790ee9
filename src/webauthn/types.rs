//! `WebAuthn` core types
//!
//! This module defines the data structures exchanged with the browser and
//! with the credential and ceremony-state stores. Byte fields travel as
//! unpadded base64url.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attestation::{AttestationFormat, AttestationType};
use super::cose::CoseAlgorithm;

/// `#[serde(with = "base64url")]` for `Vec<u8>` fields
pub(crate) mod base64url {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::webauthn::buffer::{base64url_decode, base64url_encode};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64url_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64url_decode(&encoded).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "base64url_option")]` for `Option<Vec<u8>>` fields
pub(crate) mod base64url_option {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::webauthn::buffer::{base64url_decode, base64url_encode};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&base64url_encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) if !encoded.is_empty() => base64url_decode(&encoded)
                .map(Some)
                .map_err(de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// `WebAuthn` relying party information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,   // Domain name (e.g., "example.com")
    pub name: String, // Display name
}

/// `WebAuthn` user entity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserEntity {
    #[serde(with = "base64url")]
    pub id: Vec<u8>, // Opaque user handle
    pub name: String, // Username (e.g., email)
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub alg: i64, // COSE algorithm identifier
}

impl From<CoseAlgorithm> for PublicKeyCredentialParameters {
    fn from(alg: CoseAlgorithm) -> Self {
        Self {
            r#type: PUBLIC_KEY.to_string(),
            alg: alg.id(),
        }
    }
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(
        rename = "authenticatorAttachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_attachment: Option<String>, // "platform", "cross-platform"
    #[serde(rename = "residentKey")]
    pub resident_key: String, // "discouraged", "preferred", "required"
    #[serde(rename = "requireResidentKey")]
    pub require_resident_key: bool,
    #[serde(rename = "userVerification")]
    pub user_verification: String, // "required", "preferred", "discouraged"
}

/// Public key credential descriptor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

pub(crate) const PUBLIC_KEY: &str = "public-key";

/// Options for `navigator.credentials.create()`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreationOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub rp: RelyingParty,
    pub user: UserEntity,
    #[serde(rename = "pubKeyCredParams")]
    pub public_key_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u32, // Timeout in milliseconds
    #[serde(rename = "excludeCredentials")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub attestation: String, // "none", "direct"
    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelectionCriteria,
}

/// Options for `navigator.credentials.get()`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RequestOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub timeout: u32, // Timeout in milliseconds
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

/// Registration payload posted back by the browser
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationPayload {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(rename = "attestationObject", with = "base64url")]
    pub attestation_object: Vec<u8>,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Authentication payload posted back by the browser
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticationPayload {
    #[serde(rename = "credentialId", with = "base64url")]
    pub credential_id: Vec<u8>,
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(rename = "authenticatorData", with = "base64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "base64url")]
    pub signature: Vec<u8>,
    #[serde(
        rename = "userHandle",
        default,
        with = "base64url_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_handle: Option<Vec<u8>>,
}

/// A registered credential as handed to the credential store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    #[serde(with = "base64url")]
    pub user_id: Vec<u8>,
    /// DER `SubjectPublicKeyInfo`
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>,
    /// The key as the authenticator encoded it
    #[serde(with = "base64url")]
    pub cose_public_key: Vec<u8>,
    pub algorithm: i64,
    pub sign_count: u32,
    pub aaguid: Uuid,
    pub transports: Vec<String>,
    pub attestation_format: AttestationFormat,
    pub attestation_type: AttestationType,
    /// Attestation certificate first, PEM encoded
    pub certificate_chain: Vec<String>,
    /// The chain ended at a configured trust anchor
    pub root_valid: bool,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backed_up: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl Credential {
    /// Descriptor for `excludeCredentials` / `allowCredentials`
    #[must_use]
    pub fn descriptor(&self) -> PublicKeyCredentialDescriptor {
        PublicKeyCredentialDescriptor {
            r#type: PUBLIC_KEY.to_string(),
            id: self.credential_id.clone(),
            transports: self.transports.clone(),
        }
    }
}

/// Which ceremony a stored state belongs to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// State kept between `start_*` and `finish_*`, keyed by an opaque token
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CeremonyState {
    pub kind: CeremonyKind,
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    /// Owner of the credential being registered
    #[serde(default, with = "base64url_option")]
    pub user_id: Option<Vec<u8>>,
    pub user_verification_required: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CeremonyState {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a verified assertion
///
/// `sign_count` is the value the credential store should persist.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssertionResult {
    #[serde(with = "base64url")]
    pub user_id: Vec<u8>,
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
    pub user_verified: bool,
    pub backed_up: bool,
    pub authenticated_at: DateTime<Utc>,
}
