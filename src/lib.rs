#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the vouchrs-webauthn crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod settings;
pub mod utils;
pub mod webauthn;

/// Re-export commonly used items
pub use settings::Settings;
pub use webauthn::{
    AssertionResult, AuthenticationPayload, CeremonyStateStore, CreationOptions, Credential,
    CredentialStore, MemoryStore, RegistrationPayload, RequestOptions, TrustAnchors,
    WebAuthnError, WebAuthnService, WebAuthnSettings,
};
