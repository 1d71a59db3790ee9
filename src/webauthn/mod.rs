//! `WebAuthn` implementation
//!
//! This module provides the relying-party verification core independent of
//! any HTTP surface or session management. Parsers for the untrusted binary
//! encodings sit at the bottom, the attestation format validators above
//! them, and [`WebAuthnService`] runs the ceremonies on top.

pub mod attestation;
pub mod authenticator_data;
pub mod buffer;
pub mod cbor;
pub mod certificate;
pub mod client_data;
pub mod cose;
pub mod crypto;
pub mod der;
mod errors;
mod service;
mod settings;
pub mod store;
mod types;

// Re-exports for public use
pub use attestation::{
    AttestationFormat, AttestationObject, AttestationRegistry, AttestationResult,
    AttestationType, TrustAnchors,
};
pub use authenticator_data::AuthenticatorData;
pub use client_data::{CeremonyType, ClientData};
pub use cose::{CoseAlgorithm, CredentialPublicKey};
pub use errors::{Result, WebAuthnError};
pub use service::{generate_user_handle, WebAuthnService};
pub use settings::{UserVerificationPolicy, WebAuthnSettings};
pub use store::{CeremonyStateStore, CredentialStore, MemoryStore};
pub use types::*;
