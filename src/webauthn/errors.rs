//! `WebAuthn` error types
//!
//! Every ceremony failure maps onto one variant of [`WebAuthnError`]. The
//! variants follow the layer that detected the problem so callers can tell a
//! malformed browser payload apart from an attestation trust failure.

use thiserror::Error;

/// `WebAuthn` errors that can occur during ceremony verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebAuthnError {
    /// `clientDataJSON` structure, type, challenge or origin errors
    #[error("Client data error: {0}")]
    Client(String),

    /// Authenticator data structure, flag, signature or counter errors
    #[error("Authenticator error: {0}")]
    Authenticator(String),

    /// Attestation statement, signature or trust-chain errors
    #[error("Attestation error: {0}")]
    Attestation(String),

    /// CBOR decoding error
    #[error("CBOR error: {0}")]
    Cbor(String),

    /// ASN.1 DER decoding error
    #[error("DER error: {0}")]
    Der(String),

    /// Key type, curve or algorithm that this core cannot verify
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required cryptographic primitive is missing from the runtime
    #[error("Requirement not met: {0}")]
    Requirement(String),

    /// A read ran past the end of a byte buffer
    #[error("Buffer underrun: requested {requested} bytes, {remaining} remaining")]
    BufferUnderrun { requested: usize, remaining: usize },

    /// Base64 or UTF-8 decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential or ceremony state store failure
    #[error("Store error: {0}")]
    Store(String),
}

impl WebAuthnError {
    /// The bare reason string, without the category prefix
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Client(msg)
            | Self::Authenticator(msg)
            | Self::Attestation(msg)
            | Self::Cbor(msg)
            | Self::Der(msg)
            | Self::UnsupportedAlgorithm(msg)
            | Self::Requirement(msg)
            | Self::Encoding(msg)
            | Self::Configuration(msg)
            | Self::Store(msg) => msg.clone(),
            Self::BufferUnderrun { .. } => "buffer underrun".to_string(),
        }
    }

    /// Short category name used in log lines
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Authenticator(_) => "authenticator",
            Self::Attestation(_) => "attestation",
            Self::Cbor(_) => "cbor",
            Self::Der(_) => "der",
            Self::UnsupportedAlgorithm(_) => "algorithm",
            Self::Requirement(_) => "requirement",
            Self::BufferUnderrun { .. } => "buffer",
            Self::Encoding(_) => "encoding",
            Self::Configuration(_) => "configuration",
            Self::Store(_) => "store",
        }
    }
}

/// Result alias used throughout the `WebAuthn` core
pub type Result<T> = std::result::Result<T, WebAuthnError>;
