// Registration ceremony tests against a software authenticator
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ciborium::value::Value;
use common::{
    service, service_with, settings, user, Ca, KeyKind, SoftAuthenticator, Statement, UP, UV,
};
use vouchrs_webauthn::webauthn::{
    AttestationFormat, AttestationType, CeremonyStateStore, Credential, CredentialStore,
    MemoryStore, Result, TrustAnchors, WebAuthnError, WebAuthnService,
};

/// Records every credential written through it
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
    written: Mutex<Vec<Credential>>,
}

impl CredentialStore for RecordingStore {
    fn set_credential(&self, credential: Credential) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.written.lock().unwrap().push(credential.clone());
        self.inner.set_credential(credential)
    }

    fn get_credentials(
        &self,
        credential_id: &[u8],
        user_handle: Option<&[u8]>,
    ) -> Result<Vec<Credential>> {
        self.inner.get_credentials(credential_id, user_handle)
    }

    fn update_sign_count(&self, credential_id: &[u8], sign_count: u32) -> Result<()> {
        self.inner.update_sign_count(credential_id, sign_count)
    }
}

fn register(
    service: &WebAuthnService,
    authenticator: &SoftAuthenticator,
    statement: Statement,
) -> Result<Credential> {
    let (token, options) = service.start_registration(user(), &[]).unwrap();
    let attestation = authenticator.attest(statement, &options.challenge);
    service.finish_registration(&token, &attestation.payload())
}

/// Packed registration whose x5c also carries the authenticator's issuer
fn register_through_intermediate(
    service: &WebAuthnService,
    authenticator: &SoftAuthenticator,
) -> Result<Credential> {
    let (token, options) = service.start_registration(user(), &[]).unwrap();
    let mut attestation = authenticator.attest(Statement::Packed, &options.challenge);
    let intermediate = Value::Bytes(authenticator.ca.cert.to_der().unwrap());
    for (key, value) in &mut attestation.att_stmt {
        if let (Value::Text(key), Value::Array(chain)) = (key, value) {
            if *key == "x5c" {
                chain.push(intermediate.clone());
            }
        }
    }
    service.finish_registration(&token, &attestation.payload())
}

fn attestation_error(reason: &str) -> WebAuthnError {
    WebAuthnError::Attestation(reason.to_string())
}

#[test]
fn test_none_attestation_registers_once_with_zero_counter() {
    let recording = Arc::new(RecordingStore::default());
    let states = Arc::new(MemoryStore::new());
    let service =
        WebAuthnService::new(settings(), recording.clone(), states, TrustAnchors::default())
            .unwrap();

    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.sign_count = 7;
    let credential = register(&service, &authenticator, Statement::None).unwrap();

    assert_eq!(recording.writes.load(Ordering::SeqCst), 1);
    let written = recording.written.lock().unwrap();
    assert_eq!(written[0].sign_count, 0);
    assert_eq!(written[0].credential_id, authenticator.credential_id);

    assert_eq!(credential.attestation_format, AttestationFormat::None);
    assert_eq!(credential.attestation_type, AttestationType::None);
    assert_eq!(credential.user_id, user().id);
    assert_eq!(credential.algorithm, -7);
    assert_eq!(credential.aaguid.as_bytes(), &common::AAGUID);
    assert_eq!(credential.public_key, authenticator.key.spki());
    assert_eq!(credential.transports, vec!["usb".to_string()]);
    assert!(credential.certificate_chain.is_empty());
    assert!(!credential.root_valid);
    assert!(credential.user_verified);
}

#[test]
fn test_every_format_registers() {
    let cases = [
        (Statement::Packed, KeyKind::P256, AttestationType::Basic),
        (Statement::PackedSelf, KeyKind::Ed25519, AttestationType::SelfAttestation),
        (Statement::PackedSelf, KeyKind::Rsa, AttestationType::SelfAttestation),
        (Statement::FidoU2f, KeyKind::P256, AttestationType::Basic),
        (Statement::AndroidKey, KeyKind::P256, AttestationType::Basic),
        (
            Statement::AndroidSafetyNet {
                cts_profile_match: true,
            },
            KeyKind::P256,
            AttestationType::Basic,
        ),
        (Statement::Tpm, KeyKind::Rsa, AttestationType::AttCa),
        (Statement::Tpm, KeyKind::P256, AttestationType::AttCa),
        (Statement::Apple, KeyKind::P256, AttestationType::AnonCa),
    ];

    for (statement, kind, attestation_type) in cases {
        let (service, store) = service();
        let authenticator = SoftAuthenticator::new(kind);
        let credential = register(&service, &authenticator, statement)
            .unwrap_or_else(|e| panic!("{statement:?} with {kind:?} failed: {e}"));

        assert_eq!(credential.attestation_format.as_str(), statement.fmt());
        assert_eq!(credential.attestation_type, attestation_type, "{statement:?}");
        assert_eq!(credential.sign_count, 0);
        if attestation_type == AttestationType::SelfAttestation {
            assert!(credential.certificate_chain.is_empty());
        } else {
            assert!(!credential.certificate_chain.is_empty(), "{statement:?}");
        }
        assert_eq!(store.credential_count().unwrap(), 1);
    }
}

#[test]
fn test_corrupted_packed_signature_is_rejected() {
    let (service, store) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (token, options) = service.start_registration(user(), &[]).unwrap();

    let mut attestation = authenticator.attest(Statement::Packed, &options.challenge);
    let Some((_, Value::Bytes(sig))) = attestation
        .att_stmt
        .iter()
        .find(|(k, _)| *k == Value::Text("sig".to_string()))
        .cloned()
    else {
        panic!("packed statement has a signature");
    };
    let mut corrupted = sig;
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;
    attestation.set_stmt("sig", Value::Bytes(corrupted));

    let err = service
        .finish_registration(&token, &attestation.payload())
        .unwrap_err();
    assert_eq!(err, attestation_error("invalid certificate signature"));
    assert_eq!(store.credential_count().unwrap(), 0);
}

#[test]
fn test_authenticator_data_tampering_breaks_attestation() {
    let cases = [
        (Statement::Packed, KeyKind::P256, "invalid certificate signature"),
        (Statement::PackedSelf, KeyKind::P256, "invalid certificate signature"),
        (Statement::AndroidKey, KeyKind::P256, "invalid certificate signature"),
        (Statement::Tpm, KeyKind::Rsa, "invalid TPM extraData"),
        (Statement::Apple, KeyKind::P256, "invalid nonce"),
        (
            Statement::AndroidSafetyNet {
                cts_profile_match: true,
            },
            KeyKind::P256,
            "invalid nonce",
        ),
    ];

    for (statement, kind, reason) in cases {
        let (service, store) = service();
        let authenticator = SoftAuthenticator::new(kind);
        let (token, options) = service.start_registration(user(), &[]).unwrap();

        let mut attestation = authenticator.attest(statement, &options.challenge);
        // Low byte of the signature counter
        attestation.flip_auth_data_bit(36, 0);

        let err = service
            .finish_registration(&token, &attestation.payload())
            .unwrap_err();
        assert_eq!(err, attestation_error(reason), "{statement:?}");
        assert_eq!(store.credential_count().unwrap(), 0);
    }
}

#[test]
fn test_challenge_mismatch_is_rejected() {
    let (service, store) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (token, options) = service.start_registration(user(), &[]).unwrap();

    let mut other_challenge = options.challenge.clone();
    other_challenge[0] ^= 0xff;
    let attestation = authenticator.attest(Statement::Packed, &other_challenge);

    let err = service
        .finish_registration(&token, &attestation.payload())
        .unwrap_err();
    assert_eq!(err, WebAuthnError::Client("invalid challenge".to_string()));
    assert_eq!(store.credential_count().unwrap(), 0);
}

#[test]
fn test_origin_mismatch_is_rejected() {
    let (service, _) = service();
    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.origin = "https://evil.example.net".to_string();

    let err = register(&service, &authenticator, Statement::None).unwrap_err();
    assert_eq!(err, WebAuthnError::Client("invalid origin".to_string()));
}

#[test]
fn test_rp_id_mismatch_is_rejected() {
    let (service, _) = service();
    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.rp_id = "other.example".to_string();

    let err = register(&service, &authenticator, Statement::None).unwrap_err();
    assert_eq!(err, attestation_error("invalid rpId hash"));
}

#[test]
fn test_assertion_client_data_is_not_a_registration() {
    let (service, _) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (token, options) = service.start_registration(user(), &[]).unwrap();

    let mut attestation = authenticator.attest(Statement::None, &options.challenge);
    attestation.client_data_json = authenticator.client_data("webauthn.get", &options.challenge);

    let err = service
        .finish_registration(&token, &attestation.payload())
        .unwrap_err();
    assert_eq!(err, WebAuthnError::Client("invalid type".to_string()));
}

#[test]
fn test_safetynet_cts_profile_policy() {
    let statement = Statement::AndroidSafetyNet {
        cts_profile_match: false,
    };

    let (service, store) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let err = register(&service, &authenticator, statement).unwrap_err();
    assert_eq!(err, attestation_error("invalid ctsProfileMatch"));
    assert_eq!(store.credential_count().unwrap(), 0);

    let mut lenient = settings();
    lenient.require_cts_profile_match = false;
    let (service, store) = service_with(lenient, TrustAnchors::default());
    let credential = register(&service, &authenticator, statement).unwrap();
    assert_eq!(credential.attestation_format, AttestationFormat::AndroidSafetyNet);
    assert_eq!(store.credential_count().unwrap(), 1);
}

#[test]
fn test_user_presence_is_required() {
    let (service, _) = service();
    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.flags = UV;

    let err = register(&service, &authenticator, Statement::None).unwrap_err();
    assert_eq!(err, WebAuthnError::Authenticator("user not present".to_string()));
}

#[test]
fn test_user_verification_policy() {
    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.flags = UP;

    // Preferred accepts a user-present-only response
    let (service, _) = service();
    let credential = register(&service, &authenticator, Statement::None).unwrap();
    assert!(!credential.user_verified);

    let mut strict = settings();
    strict.user_verification = "required".parse().unwrap();
    let (service, store) = service_with(strict, TrustAnchors::default());
    let err = register(&service, &authenticator, Statement::None).unwrap_err();
    assert_eq!(err, WebAuthnError::Authenticator("user not verified".to_string()));
    assert_eq!(store.credential_count().unwrap(), 0);
}

#[test]
fn test_disallowed_format_is_rejected() {
    let mut restricted = settings();
    restricted.allowed_formats = vec![AttestationFormat::None, AttestationFormat::Packed];
    let (service, _) = service_with(restricted, TrustAnchors::default());

    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let err = register(&service, &authenticator, Statement::FidoU2f).unwrap_err();
    assert_eq!(err, attestation_error("unsupported format"));
}

#[test]
fn test_duplicate_credential_is_rejected() {
    let (service, store) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);

    register(&service, &authenticator, Statement::None).unwrap();
    let err = register(&service, &authenticator, Statement::None).unwrap_err();
    assert_eq!(err, attestation_error("credential already registered"));
    assert_eq!(store.credential_count().unwrap(), 1);
}

#[test]
fn test_missing_attested_credential_data_is_rejected() {
    let (service, _) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (token, options) = service.start_registration(user(), &[]).unwrap();

    let mut attestation = authenticator.attest(Statement::None, &options.challenge);
    attestation.auth_data = authenticator.auth_data(false);

    let err = service
        .finish_registration(&token, &attestation.payload())
        .unwrap_err();
    assert_eq!(
        err,
        WebAuthnError::Authenticator("missing attested credential data".to_string())
    );
}

#[test]
fn test_registration_token_is_single_use() {
    let (service, _) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (token, options) = service.start_registration(user(), &[]).unwrap();
    let payload = authenticator.attest(Statement::None, &options.challenge).payload();

    service.finish_registration(&token, &payload).unwrap();
    let err = service.finish_registration(&token, &payload).unwrap_err();
    assert_eq!(err, WebAuthnError::Client("invalid challenge".to_string()));
}

#[test]
fn test_expired_registration_state_is_rejected() {
    let (service, store) = service();
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (token, options) = service.start_registration(user(), &[]).unwrap();

    let mut state = store.get_state(&token).unwrap().unwrap();
    state.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    store.set_state(&token, state).unwrap();

    let payload = authenticator.attest(Statement::None, &options.challenge).payload();
    let err = service.finish_registration(&token, &payload).unwrap_err();
    assert_eq!(err, WebAuthnError::Client("challenge expired".to_string()));
    assert_eq!(store.credential_count().unwrap(), 0);
}

#[test]
fn test_trust_anchor_accepts_issuing_root() {
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (service, _) = service_with(settings(), authenticator.ca.anchors());

    for statement in [Statement::Packed, Statement::AndroidKey, Statement::Apple] {
        // Fresh credential, same trusted root
        let other = SoftAuthenticator {
            ca: Ca {
                key: authenticator.ca.key.clone(),
                cert: authenticator.ca.cert.clone(),
            },
            ..SoftAuthenticator::new(KeyKind::P256)
        };
        let credential = register(&service, &other, statement).unwrap();
        assert!(credential.root_valid, "{statement:?}");
        assert_eq!(credential.certificate_chain.len(), 1);
        assert!(credential.certificate_chain[0].starts_with("-----BEGIN CERTIFICATE-----"));
    }
}

#[test]
fn test_trust_anchor_rejects_foreign_root() {
    let foreign = Ca::new("Foreign Root");
    let (service, store) = service_with(settings(), foreign.anchors());

    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let err = register(&service, &authenticator, Statement::Packed).unwrap_err();
    assert_eq!(err, attestation_error("invalid root certificate"));
    assert_eq!(store.credential_count().unwrap(), 0);
}

#[test]
fn test_trust_anchor_accepts_intermediate_ca() {
    let root = Ca::new("Soft Attestation Root");
    let (service, _) = service_with(settings(), root.anchors());

    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.ca = root.intermediate("Soft Attestation Intermediate", true, (-1, 365));
    let credential = register_through_intermediate(&service, &authenticator).unwrap();
    assert!(credential.root_valid);
    assert_eq!(credential.certificate_chain.len(), 2);
}

#[test]
fn test_trust_anchor_rejects_bad_intermediates() {
    let root = Ca::new("Soft Attestation Root");
    let (service, store) = service_with(settings(), root.anchors());

    let not_a_ca = root.intermediate("Soft Attestation Leaf", false, (-1, 365));
    let expired = root.intermediate("Soft Attestation Intermediate", true, (-30, -1));
    for issuer in [not_a_ca, expired] {
        let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
        authenticator.ca = issuer;
        let err = register_through_intermediate(&service, &authenticator).unwrap_err();
        assert_eq!(err, attestation_error("invalid root certificate"));
    }
    assert_eq!(store.credential_count().unwrap(), 0);
}

#[test]
fn test_trust_anchors_reject_formats_without_chain() {
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let (service, _) = service_with(settings(), authenticator.ca.anchors());

    for statement in [Statement::None, Statement::PackedSelf] {
        let err = register(&service, &authenticator, statement).unwrap_err();
        assert_eq!(err, attestation_error("invalid root certificate"), "{statement:?}");
    }
}

#[test]
fn test_expired_root_is_rejected() {
    let mut authenticator = SoftAuthenticator::new(KeyKind::P256);
    authenticator.ca = Ca::with_validity("Expired Root", (-30, -1));
    let (service, _) = service_with(settings(), authenticator.ca.anchors());

    let err = register(&service, &authenticator, Statement::Packed).unwrap_err();
    assert_eq!(err, attestation_error("invalid root certificate"));
}

#[test]
fn test_trust_anchors_load_from_pem_files() {
    let authenticator = SoftAuthenticator::new(KeyKind::P256);
    let unrelated = Ca::new("Unrelated Root");

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("root.pem");
    let bundle_path = dir.path().join("bundle.pem");
    std::fs::write(&root_path, authenticator.ca.pem()).unwrap();
    std::fs::write(&bundle_path, unrelated.pem() + &Ca::new("Another").pem()).unwrap();

    let anchors = TrustAnchors::from_pem_files(&[root_path.clone(), bundle_path]).unwrap();
    assert_eq!(anchors.len(), 3);

    let mut with_files = settings();
    with_files.trust_anchors = vec![root_path];
    let store = Arc::new(MemoryStore::new());
    let service = WebAuthnService::from_settings(with_files, store.clone(), store).unwrap();
    let credential = register(&service, &authenticator, Statement::Packed).unwrap();
    assert!(credential.root_valid);
}

#[test]
fn test_missing_trust_anchor_file_is_a_configuration_error() {
    let mut with_files = settings();
    with_files.trust_anchors = vec!["/nonexistent/root.pem".into()];
    let store = Arc::new(MemoryStore::new());

    let err = WebAuthnService::from_settings(with_files, store.clone(), store).unwrap_err();
    assert_eq!(err.category(), "configuration");
}
