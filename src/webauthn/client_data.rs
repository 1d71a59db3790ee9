//! `clientDataJSON` parsing and validation

use serde::Deserialize;

use super::buffer::base64url_decode;
use super::crypto;
use super::errors::{Result, WebAuthnError};

/// Which ceremony produced the client data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyType {
    Create,
    Get,
}

impl CeremonyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

#[derive(Deserialize)]
struct RawClientData {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
    origin: String,
    #[serde(rename = "crossOrigin", default)]
    cross_origin: bool,
}

/// Parsed `clientDataJSON`
#[derive(Debug, Clone)]
pub struct ClientData {
    kind: String,
    challenge: Option<Vec<u8>>,
    origin: String,
    cross_origin: bool,
    raw: Vec<u8>,
    hash: [u8; 32],
}

fn client_err(reason: &str) -> WebAuthnError {
    WebAuthnError::Client(reason.to_string())
}

/// Normalize an origin so default ports and trailing slashes compare equal
///
/// Non-URL origins (for example Android `apk-key-hash` origins) are compared
/// as given.
#[must_use]
pub fn normalize_origin(origin: &str) -> String {
    match url::Url::parse(origin) {
        Ok(parsed) if parsed.origin().is_tuple() => parsed.origin().ascii_serialization(),
        _ => origin.trim_end_matches('/').to_string(),
    }
}

impl ClientData {
    /// Parse raw `clientDataJSON` bytes
    ///
    /// # Errors
    /// Returns `Client("invalid client data")` if the bytes are not a JSON
    /// object carrying `type`, `challenge` and `origin` strings.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let parsed: RawClientData =
            serde_json::from_slice(raw).map_err(|_| client_err("invalid client data"))?;
        Ok(Self {
            kind: parsed.kind,
            // An undecodable challenge can never match; report it when compared
            challenge: base64url_decode(&parsed.challenge).ok(),
            origin: parsed.origin,
            cross_origin: parsed.cross_origin,
            raw: raw.to_vec(),
            hash: crypto::sha256(raw),
        })
    }

    /// # Errors
    /// Returns `Client("invalid type")` on mismatch.
    pub fn validate_type(&self, expected: CeremonyType) -> Result<()> {
        if self.kind == expected.as_str() {
            Ok(())
        } else {
            Err(client_err("invalid type"))
        }
    }

    /// # Errors
    /// Returns `Client("invalid challenge")` unless the decoded challenge
    /// equals `expected` byte for byte.
    pub fn validate_challenge(&self, expected: &[u8]) -> Result<()> {
        match &self.challenge {
            Some(challenge) if challenge.as_slice() == expected => Ok(()),
            _ => Err(client_err("invalid challenge")),
        }
    }

    /// Exact scheme, host and port match against the allow-list
    ///
    /// # Errors
    /// Returns `Client("invalid origin")` if no allowed origin matches.
    pub fn validate_origin(&self, allowed: &[String]) -> Result<()> {
        let origin = normalize_origin(&self.origin);
        if allowed.iter().any(|a| normalize_origin(a) == origin) {
            Ok(())
        } else {
            Err(client_err("invalid origin"))
        }
    }

    /// # Errors
    /// Returns `Client("invalid origin")` for cross-origin requests unless allowed.
    pub fn validate_cross_origin(&self, allow_cross_origin: bool) -> Result<()> {
        if self.cross_origin && !allow_cross_origin {
            Err(client_err("invalid origin"))
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn is_cross_origin(&self) -> bool {
        self.cross_origin
    }

    /// The bytes as received from the browser
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// SHA-256 over the raw bytes (`clientDataHash`)
    #[must_use]
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }
}
