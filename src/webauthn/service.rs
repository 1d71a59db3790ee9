//! `WebAuthn` service implementation
//!
//! This module provides the relying-party orchestrator: it builds ceremony
//! options, keeps the challenge in the ceremony-state store, and runs the
//! registration and authentication verification sequences.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::attestation::{AttestationFormat, AttestationObject, AttestationRegistry, TrustAnchors};
use super::authenticator_data::AuthenticatorData;
use super::certificate::Certificate;
use super::client_data::{CeremonyType, ClientData};
use super::cose::CoseAlgorithm;
use super::crypto;
use super::errors::{Result, WebAuthnError};
use super::settings::WebAuthnSettings;
use super::store::{CeremonyStateStore, CredentialStore};
use super::types::{
    AssertionResult, AuthenticationPayload, AuthenticatorSelectionCriteria, CeremonyKind,
    CeremonyState, CreationOptions, Credential, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, RegistrationPayload, RelyingParty, RequestOptions, UserEntity,
};
use crate::utils::logging::LoggingHelper;

/// Algorithms offered in `pubKeyCredParams`, in preference order
const OFFERED_ALGORITHMS: [CoseAlgorithm; 3] =
    [CoseAlgorithm::EdDSA, CoseAlgorithm::ES256, CoseAlgorithm::RS256];

/// Generate a user handle using secure random data
///
/// # Returns
/// A 16-byte opaque handle for `user.id`
///
/// # Errors
/// Returns `Requirement` if the system random source fails.
pub fn generate_user_handle() -> Result<Vec<u8>> {
    crypto::generate_user_handle()
}

fn client_err(reason: &str) -> WebAuthnError {
    WebAuthnError::Client(reason.to_string())
}

fn authenticator_err(reason: &str) -> WebAuthnError {
    WebAuthnError::Authenticator(reason.to_string())
}

/// Core `WebAuthn` service
pub struct WebAuthnService {
    settings: WebAuthnSettings,
    rp_id_hash: [u8; 32],
    registry: AttestationRegistry,
    trust_anchors: TrustAnchors,
    credentials: Arc<dyn CredentialStore>,
    states: Arc<dyn CeremonyStateStore>,
}

impl WebAuthnService {
    /// Create a new `WebAuthnService`
    ///
    /// # Arguments
    /// * `settings` - Relying-party policy, validated here once
    /// * `credentials` - Where registered credentials live
    /// * `states` - Where in-flight ceremony state lives
    /// * `trust_anchors` - Attestation roots; empty skips root checks
    ///
    /// # Errors
    /// Returns `Requirement` if a cryptographic primitive is missing and
    /// `Configuration` if the settings are invalid.
    pub fn new(
        settings: WebAuthnSettings,
        credentials: Arc<dyn CredentialStore>,
        states: Arc<dyn CeremonyStateStore>,
        trust_anchors: TrustAnchors,
    ) -> Result<Self> {
        crypto::check_requirements()?;
        settings.validate()?;

        let registry =
            AttestationRegistry::new(&settings.allowed_formats, settings.safetynet_max_age());
        let rp_id_hash = crypto::sha256(settings.rp_id.as_bytes());
        LoggingHelper::log_service_ready(&settings.rp_id, &registry.formats(), trust_anchors.len());

        Ok(Self {
            settings,
            rp_id_hash,
            registry,
            trust_anchors,
            credentials,
            states,
        })
    }

    /// Create a service whose trust anchors are loaded from `settings.trust_anchors`
    ///
    /// # Errors
    /// As [`WebAuthnService::new`], plus `Configuration` if a trust anchor
    /// file cannot be loaded.
    pub fn from_settings(
        settings: WebAuthnSettings,
        credentials: Arc<dyn CredentialStore>,
        states: Arc<dyn CeremonyStateStore>,
    ) -> Result<Self> {
        let trust_anchors = TrustAnchors::from_pem_files(&settings.trust_anchors)?;
        Self::new(settings, credentials, states, trust_anchors)
    }

    #[must_use]
    pub fn settings(&self) -> &WebAuthnSettings {
        &self.settings
    }

    #[must_use]
    pub fn relying_party(&self) -> RelyingParty {
        RelyingParty {
            id: self.settings.rp_id.clone(),
            name: self.settings.rp_name.clone(),
        }
    }

    fn descriptor(&self, credential: &Credential) -> PublicKeyCredentialDescriptor {
        let mut descriptor = credential.descriptor();
        if descriptor.transports.is_empty() {
            descriptor
                .transports
                .clone_from(&self.settings.allowed_transports);
        }
        descriptor
    }

    /// Generate a challenge and store the ceremony state under a fresh token
    fn begin_ceremony(
        &self,
        kind: CeremonyKind,
        user_id: Option<Vec<u8>>,
    ) -> Result<(String, CeremonyState)> {
        let challenge = crypto::generate_challenge(self.settings.challenge_length)?;
        let now = Utc::now();
        let state = CeremonyState {
            kind,
            challenge,
            user_id,
            user_verification_required: self.settings.user_verification.is_required(),
            created_at: now,
            expires_at: now + self.settings.ceremony_ttl(),
        };
        let token = Uuid::new_v4().to_string();
        self.states.set_state(&token, state.clone())?;
        Ok((token, state))
    }

    /// Create registration options for a new credential
    ///
    /// # Arguments
    /// * `user` - The account the credential will belong to
    /// * `exclude_credentials` - Credentials the user already has
    ///
    /// # Returns
    /// The ceremony token to pass to [`WebAuthnService::finish_registration`]
    /// and the options for `navigator.credentials.create()`
    ///
    /// # Errors
    /// Returns `Requirement` if no challenge can be generated and `Store` if
    /// the ceremony state cannot be saved.
    pub fn start_registration(
        &self,
        user: UserEntity,
        exclude_credentials: &[Credential],
    ) -> Result<(String, CreationOptions)> {
        let (token, state) =
            self.begin_ceremony(CeremonyKind::Registration, Some(user.id.clone()))?;
        LoggingHelper::log_registration_started(&user.id, exclude_credentials.len());

        let attestation = if self.settings.accepts_only_none() {
            "none"
        } else {
            "direct"
        };

        let options = CreationOptions {
            challenge: state.challenge,
            rp: self.relying_party(),
            user,
            public_key_params: OFFERED_ALGORITHMS
                .into_iter()
                .map(PublicKeyCredentialParameters::from)
                .collect(),
            timeout: self.settings.timeout_ms(),
            exclude_credentials: exclude_credentials
                .iter()
                .map(|c| self.descriptor(c))
                .collect(),
            attestation: attestation.to_string(),
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.settings.authenticator_attachment.clone(),
                resident_key: self.settings.resident_key.clone(),
                require_resident_key: self.settings.resident_key == "required",
                user_verification: self.settings.user_verification.as_str().to_string(),
            },
        };

        Ok((token, options))
    }

    /// Create authentication options
    ///
    /// # Arguments
    /// * `allow_credentials` - Credentials to offer; empty for discoverable credentials
    ///
    /// # Errors
    /// Returns `Requirement` if no challenge can be generated and `Store` if
    /// the ceremony state cannot be saved.
    pub fn start_authentication(
        &self,
        allow_credentials: &[Credential],
    ) -> Result<(String, RequestOptions)> {
        let (token, state) = self.begin_ceremony(CeremonyKind::Authentication, None)?;
        LoggingHelper::log_authentication_started(allow_credentials.len());

        let options = RequestOptions {
            challenge: state.challenge,
            timeout: self.settings.timeout_ms(),
            rp_id: self.settings.rp_id.clone(),
            allow_credentials: allow_credentials
                .iter()
                .map(|c| self.descriptor(c))
                .collect(),
            user_verification: self.settings.user_verification.as_str().to_string(),
        };

        Ok((token, options))
    }

    /// Complete registration for a ceremony started with [`WebAuthnService::start_registration`]
    ///
    /// The ceremony state is consumed before verification, so a token can
    /// only be used once whatever the outcome.
    ///
    /// # Errors
    /// Returns `Client("invalid challenge")` for unknown or already used
    /// tokens, `Client("challenge expired")` for stale ones, and every error
    /// of [`WebAuthnService::process_create`].
    pub fn finish_registration(
        &self,
        token: &str,
        payload: &RegistrationPayload,
    ) -> Result<Credential> {
        let state = self.take_state(token, CeremonyKind::Registration, "registration")?;
        self.process_create(payload, &state)
    }

    /// Complete authentication for a ceremony started with
    /// [`WebAuthnService::start_authentication`]
    ///
    /// On success the credential store is asked to persist the new
    /// signature counter.
    ///
    /// # Errors
    /// Token errors as [`WebAuthnService::finish_registration`], every error
    /// of [`WebAuthnService::process_get`], and `Store` if the counter update fails.
    pub fn finish_authentication(
        &self,
        token: &str,
        payload: &AuthenticationPayload,
    ) -> Result<AssertionResult> {
        let state = self.take_state(token, CeremonyKind::Authentication, "authentication")?;
        let result = self.process_get(payload, &state)?;
        self.credentials
            .update_sign_count(&result.credential_id, result.sign_count)?;
        Ok(result)
    }

    fn take_state(&self, token: &str, kind: CeremonyKind, ceremony: &str) -> Result<CeremonyState> {
        let outcome = self
            .states
            .take_state(token)?
            .ok_or_else(|| client_err("invalid challenge"))
            .and_then(|state| {
                check_state(&state, kind, Utc::now())?;
                Ok(state)
            });
        outcome.inspect_err(|e| LoggingHelper::log_ceremony_rejected(ceremony, e))
    }

    /// Verify a registration against its ceremony state and persist the credential
    ///
    /// Runs, failing fast: client data checks, attestation object decoding,
    /// rpIdHash, the format validator, the SafetyNet CTS policy, trust
    /// anchors, then user presence and verification. The credential store is
    /// written once, after every check passed.
    ///
    /// # Errors
    /// Returns the `Client`, `Attestation`, `Authenticator`, `Cbor` or
    /// `UnsupportedAlgorithm` error of the first failed check, and `Store` if
    /// the credential cannot be saved.
    pub fn process_create(
        &self,
        payload: &RegistrationPayload,
        state: &CeremonyState,
    ) -> Result<Credential> {
        self.verify_create(payload, state, Utc::now())
            .inspect_err(|e| LoggingHelper::log_ceremony_rejected("registration", e))
    }

    fn verify_create(
        &self,
        payload: &RegistrationPayload,
        state: &CeremonyState,
        now: DateTime<Utc>,
    ) -> Result<Credential> {
        check_state(state, CeremonyKind::Registration, now)?;
        let user_id = state
            .user_id
            .clone()
            .ok_or_else(|| client_err("invalid challenge"))?;

        // 1. Client data
        let client_data = self.validate_client_data(
            &payload.client_data_json,
            CeremonyType::Create,
            &state.challenge,
        )?;

        // 2. Attestation object and authenticator data
        let attestation = AttestationObject::parse(&payload.attestation_object)?;
        let auth_data = attestation.auth_data();

        // 3. rpIdHash
        attestation.validate_rp_id_hash(&self.rp_id_hash)?;
        let attested = auth_data
            .attested_credential_data()
            .ok_or_else(|| authenticator_err("missing attested credential data"))?;

        // 4. Format validator
        let result = attestation.validate_attestation(&self.registry, client_data.hash(), now)?;
        LoggingHelper::log_attestation_verified(
            result.format,
            result.attestation_type,
            result.trust_path.len(),
        );

        // 5. SafetyNet device integrity
        if result.format == AttestationFormat::AndroidSafetyNet
            && self.settings.require_cts_profile_match
            && result.cts_profile_match != Some(true)
        {
            return Err(WebAuthnError::Attestation(
                "invalid ctsProfileMatch".to_string(),
            ));
        }

        // 6. Trust anchors
        let root_valid = if self.trust_anchors.is_empty() {
            false
        } else {
            attestation.validate_root_certificate(&result, &self.trust_anchors, now)?;
            true
        };

        // 7. User presence and verification
        check_user_flags(auth_data, state.user_verification_required)?;

        // 8. Persist
        if !self
            .credentials
            .get_credentials(&attested.credential_id, None)?
            .is_empty()
        {
            return Err(WebAuthnError::Attestation(
                "credential already registered".to_string(),
            ));
        }

        let certificate_chain = result
            .trust_path
            .iter()
            .map(Certificate::to_pem)
            .collect::<Result<Vec<_>>>()?;
        let public_key = &attested.credential_public_key;
        let credential = Credential {
            credential_id: attested.credential_id.clone(),
            user_id,
            public_key: public_key.spki().to_vec(),
            cose_public_key: public_key.cose().to_vec(),
            algorithm: public_key.algorithm().id(),
            sign_count: 0,
            aaguid: Uuid::from_bytes(attested.aaguid),
            transports: payload.transports.clone(),
            attestation_format: result.format,
            attestation_type: result.attestation_type,
            certificate_chain,
            root_valid,
            user_verified: auth_data.is_user_verified(),
            backup_eligible: auth_data.is_backup_eligible(),
            backed_up: auth_data.is_backed_up(),
            created_at: now,
            last_used: None,
        };
        self.credentials.set_credential(credential.clone())?;
        LoggingHelper::log_credential_registered(
            &credential.credential_id,
            credential.attestation_format,
            root_valid,
        );

        Ok(credential)
    }

    /// Verify an assertion against its ceremony state
    ///
    /// Performs no writes; the caller persists `sign_count` from the result
    /// (see [`WebAuthnService::finish_authentication`]).
    ///
    /// # Errors
    /// Returns `Client` errors for the client data, `Attestation("invalid
    /// rpId hash")`, and `Authenticator` errors for flags, unknown
    /// credentials, signatures and the signature counter.
    pub fn process_get(
        &self,
        payload: &AuthenticationPayload,
        state: &CeremonyState,
    ) -> Result<AssertionResult> {
        self.verify_get(payload, state, Utc::now())
            .inspect_err(|e| LoggingHelper::log_ceremony_rejected("authentication", e))
    }

    fn verify_get(
        &self,
        payload: &AuthenticationPayload,
        state: &CeremonyState,
        now: DateTime<Utc>,
    ) -> Result<AssertionResult> {
        check_state(state, CeremonyKind::Authentication, now)?;

        // 1. Client data
        let client_data = self.validate_client_data(
            &payload.client_data_json,
            CeremonyType::Get,
            &state.challenge,
        )?;

        // 2. Authenticator data
        let auth_data = AuthenticatorData::parse(&payload.authenticator_data)?;

        // 3. rpIdHash
        if auth_data.rp_id_hash() != &self.rp_id_hash {
            return Err(WebAuthnError::Attestation("invalid rpId hash".to_string()));
        }

        // 4. User presence and verification
        check_user_flags(&auth_data, state.user_verification_required)?;

        // 5. Candidate credentials
        let candidates = self
            .credentials
            .get_credentials(&payload.credential_id, payload.user_handle.as_deref())?;
        if candidates.is_empty() {
            return Err(authenticator_err("unknown credential"));
        }

        // 6. Signature over authenticatorData || clientDataHash
        let signed_data = [auth_data.raw(), client_data.hash().as_slice()].concat();
        let credential = candidates
            .iter()
            .find(|c| verifies(c, &signed_data, &payload.signature))
            .ok_or_else(|| authenticator_err("invalid signature"))?;

        // 7. Signature counter
        let received = auth_data.sign_count();
        if !counter_advances(credential.sign_count, received) {
            LoggingHelper::log_counter_regression(
                &credential.credential_id,
                credential.sign_count,
                received,
            );
            return Err(authenticator_err("invalid signature counter"));
        }

        LoggingHelper::log_assertion_verified(&credential.credential_id, received);
        Ok(AssertionResult {
            user_id: credential.user_id.clone(),
            credential_id: credential.credential_id.clone(),
            sign_count: received,
            user_verified: auth_data.is_user_verified(),
            backed_up: auth_data.is_backed_up(),
            authenticated_at: now,
        })
    }

    fn validate_client_data(
        &self,
        raw: &[u8],
        ceremony: CeremonyType,
        challenge: &[u8],
    ) -> Result<ClientData> {
        let client_data = ClientData::parse(raw)?;
        client_data.validate_type(ceremony)?;
        client_data.validate_challenge(challenge)?;
        client_data.validate_origin(&self.settings.origins)?;
        client_data.validate_cross_origin(self.settings.allow_cross_origin)?;
        Ok(client_data)
    }
}

impl std::fmt::Debug for WebAuthnService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAuthnService")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("trust_anchors", &self.trust_anchors.len())
            .finish_non_exhaustive()
    }
}

/// Ceremony state must be of the expected kind and unexpired
fn check_state(state: &CeremonyState, kind: CeremonyKind, now: DateTime<Utc>) -> Result<()> {
    if state.kind != kind {
        return Err(client_err("invalid challenge"));
    }
    if state.is_expired(now) {
        return Err(client_err("challenge expired"));
    }
    Ok(())
}

fn check_user_flags(auth_data: &AuthenticatorData, user_verification_required: bool) -> Result<()> {
    if !auth_data.is_user_present() {
        return Err(authenticator_err("user not present"));
    }
    if user_verification_required && !auth_data.is_user_verified() {
        return Err(authenticator_err("user not verified"));
    }
    Ok(())
}

fn verifies(credential: &Credential, signed_data: &[u8], signature: &[u8]) -> bool {
    let Some(alg) = CoseAlgorithm::from_id(credential.algorithm) else {
        return false;
    };
    matches!(
        crypto::verify_signature(alg, &credential.public_key, signed_data, signature),
        Ok(true)
    )
}

/// Authenticators without a counter report 0 forever; anything else must strictly increase
fn counter_advances(stored: u32, received: u32) -> bool {
    (stored == 0 && received == 0) || received > stored
}
