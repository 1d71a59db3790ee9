// Software authenticator shared by the integration tests.
//
// Mints credential keys, attestation certificates and statements for every
// attestation format with openssl, and encodes the CBOR structures with
// ciborium so the decoder under test never checks its own output.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ciborium::value::Value;
use openssl::asn1::{Asn1Integer, Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sha::sha256;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage};
use openssl::x509::{X509Builder, X509Extension, X509NameBuilder, X509};

use vouchrs_webauthn::webauthn::certificate::Certificate;
use vouchrs_webauthn::webauthn::{
    AuthenticationPayload, MemoryStore, RegistrationPayload, TrustAnchors, UserEntity,
    WebAuthnService, WebAuthnSettings,
};

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://example.com";
pub const AAGUID: [u8; 16] = [
    0x2f, 0xc0, 0x57, 0x9f, 0x81, 0x13, 0x47, 0xea, 0xb1, 0x16, 0xbb, 0x5a, 0x8d, 0xb9, 0x20, 0x2a,
];

pub const UP: u8 = 0x01;
pub const UV: u8 = 0x04;
pub const AT: u8 = 0x40;

const OID_FIDO_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";
const OID_ANDROID_KEY: &str = "1.3.6.1.4.1.11129.2.1.17";
const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";
const OID_TCG_KP_AIK: &str = "2.23.133.8.3";

static SERIAL: AtomicU32 = AtomicU32::new(1);

// ---------------------------------------------------------------------------
// Service wiring
// ---------------------------------------------------------------------------

pub fn settings() -> WebAuthnSettings {
    WebAuthnSettings {
        rp_id: RP_ID.to_string(),
        rp_name: "Example".to_string(),
        origins: vec![ORIGIN.to_string()],
        ..WebAuthnSettings::default()
    }
}

pub fn service_with(
    settings: WebAuthnSettings,
    trust_anchors: TrustAnchors,
) -> (WebAuthnService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service =
        WebAuthnService::new(settings, store.clone(), store.clone(), trust_anchors).unwrap();
    (service, store)
}

pub fn service() -> (WebAuthnService, Arc<MemoryStore>) {
    service_with(settings(), TrustAnchors::default())
}

pub fn user() -> UserEntity {
    UserEntity {
        id: b"user-0001".to_vec(),
        name: "alice@example.com".to_string(),
        display_name: "Alice".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

pub fn cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).unwrap();
    out
}

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// DER TLV with a pre-encoded tag
pub fn der(tag: &[u8], content: &[u8]) -> Vec<u8> {
    let len = content.len();
    let mut out = tag.to_vec();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.extend([0x81, len as u8]);
    } else {
        out.extend([0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

/// TPM2B: u16 length prefix
fn sized(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(data);
    out
}

pub fn b64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    P256,
    Ed25519,
    Rsa,
}

pub struct SoftKey {
    pub kind: KeyKind,
    pub pkey: PKey<Private>,
}

impl SoftKey {
    pub fn generate(kind: KeyKind) -> Self {
        let pkey = match kind {
            KeyKind::P256 => {
                let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
                PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
            }
            KeyKind::Ed25519 => PKey::generate_ed25519().unwrap(),
            KeyKind::Rsa => PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap(),
        };
        Self { kind, pkey }
    }

    pub fn alg(&self) -> i64 {
        match self.kind {
            KeyKind::P256 => -7,
            KeyKind::Ed25519 => -8,
            KeyKind::Rsa => -257,
        }
    }

    pub fn ec_coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        let ec = self.pkey.ec_key().unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        let mut x = BigNum::new().unwrap();
        let mut y = BigNum::new().unwrap();
        ec.public_key()
            .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)
            .unwrap();
        (x.to_vec_padded(32).unwrap(), y.to_vec_padded(32).unwrap())
    }

    pub fn rsa_components(&self) -> (Vec<u8>, Vec<u8>) {
        let rsa = self.pkey.rsa().unwrap();
        (rsa.n().to_vec(), rsa.e().to_vec())
    }

    pub fn cose(&self) -> Vec<u8> {
        let entries = match self.kind {
            KeyKind::P256 => {
                let (x, y) = self.ec_coordinates();
                vec![
                    (int(1), int(2)),
                    (int(3), int(-7)),
                    (int(-1), int(1)),
                    (int(-2), Value::Bytes(x)),
                    (int(-3), Value::Bytes(y)),
                ]
            }
            KeyKind::Ed25519 => vec![
                (int(1), int(1)),
                (int(3), int(-8)),
                (int(-1), int(6)),
                (int(-2), Value::Bytes(self.pkey.raw_public_key().unwrap())),
            ],
            KeyKind::Rsa => {
                let (n, e) = self.rsa_components();
                vec![
                    (int(1), int(3)),
                    (int(3), int(-257)),
                    (int(-1), Value::Bytes(n)),
                    (int(-2), Value::Bytes(e)),
                ]
            }
        };
        cbor(&Value::Map(entries))
    }

    pub fn spki(&self) -> Vec<u8> {
        self.pkey.public_key_to_der().unwrap()
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = match self.kind {
            KeyKind::Ed25519 => Signer::new_without_digest(&self.pkey).unwrap(),
            _ => Signer::new(MessageDigest::sha256(), &self.pkey).unwrap(),
        };
        signer.sign_oneshot_to_vec(data).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

pub struct CertSpec<'a> {
    pub subject: &'a [(&'a str, &'a str)],
    pub ca: bool,
    pub eku: Option<&'a str>,
    pub extensions: Vec<(&'a str, Vec<u8>)>,
    /// not-before / not-after, in days from now
    pub valid_days: (i64, i64),
}

impl<'a> CertSpec<'a> {
    pub fn leaf(subject: &'a [(&'a str, &'a str)]) -> Self {
        Self {
            subject,
            ca: false,
            eku: None,
            extensions: Vec::new(),
            valid_days: (-1, 365),
        }
    }
}

/// Issue a certificate for `key`, signed by `issuer` or self-signed
pub fn issue(
    spec: &CertSpec<'_>,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    for (field, value) in spec.subject {
        name.append_entry_by_text(field, value).unwrap();
    }
    let name = name.build();

    let now = chrono::Utc::now().timestamp();
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed)).unwrap();
    builder
        .set_serial_number(&Asn1Integer::from_bn(&serial).unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((cert, _)) => builder.set_issuer_name(cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder
        .set_not_before(&Asn1Time::from_unix(now + spec.valid_days.0 * 86_400).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(now + spec.valid_days.1 * 86_400).unwrap())
        .unwrap();
    builder.set_pubkey(key).unwrap();

    let mut constraints = BasicConstraints::new();
    if spec.ca {
        constraints.critical().ca();
    }
    builder.append_extension(constraints.build().unwrap()).unwrap();
    if let Some(eku) = spec.eku {
        builder
            .append_extension(ExtendedKeyUsage::new().other(eku).build().unwrap())
            .unwrap();
    }
    for (oid, value) in &spec.extensions {
        let object = Asn1Object::from_str(oid).unwrap();
        let contents = Asn1OctetString::new_from_bytes(value).unwrap();
        builder
            .append_extension(X509Extension::new_from_der(&object, false, &contents).unwrap())
            .unwrap();
    }

    let signing_key = issuer.map_or(key, |(_, k)| k);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// A certificate authority for attestation certificates
pub struct Ca {
    pub key: PKey<Private>,
    pub cert: X509,
}

impl Ca {
    pub fn new(common_name: &str) -> Self {
        Self::with_validity(common_name, (-1, 3650))
    }

    pub fn with_validity(common_name: &str, valid_days: (i64, i64)) -> Self {
        let key = SoftKey::generate(KeyKind::P256).pkey;
        let subject = [("C", "US"), ("O", "Soft Authenticators"), ("CN", common_name)];
        let spec = CertSpec {
            ca: true,
            valid_days,
            ..CertSpec::leaf(&subject)
        };
        let cert = issue(&spec, &key, None);
        Self { key, cert }
    }

    /// A second-level issuer signed by this one
    pub fn intermediate(&self, common_name: &str, ca: bool, valid_days: (i64, i64)) -> Self {
        let key = SoftKey::generate(KeyKind::P256).pkey;
        let subject = [("C", "US"), ("O", "Soft Authenticators"), ("CN", common_name)];
        let spec = CertSpec {
            ca,
            valid_days,
            ..CertSpec::leaf(&subject)
        };
        let cert = self.issue(&spec, &key);
        Self { key, cert }
    }

    pub fn issue(&self, spec: &CertSpec<'_>, key: &PKey<Private>) -> X509 {
        issue(spec, key, Some((&self.cert, &self.key)))
    }

    pub fn certificate(&self) -> Certificate {
        Certificate::from_der(&self.cert.to_der().unwrap()).unwrap()
    }

    pub fn pem(&self) -> String {
        String::from_utf8(self.cert.to_pem().unwrap()).unwrap()
    }

    pub fn anchors(&self) -> TrustAnchors {
        TrustAnchors::new(vec![self.certificate()])
    }
}

// ---------------------------------------------------------------------------
// Attestation statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    None,
    Packed,
    PackedSelf,
    FidoU2f,
    AndroidKey,
    AndroidSafetyNet { cts_profile_match: bool },
    Tpm,
    Apple,
}

impl Statement {
    pub fn fmt(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Packed | Self::PackedSelf => "packed",
            Self::FidoU2f => "fido-u2f",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet { .. } => "android-safetynet",
            Self::Tpm => "tpm",
            Self::Apple => "apple",
        }
    }
}

/// `KeyDescription` for the android-key attestation extension
pub fn key_description(challenge: &[u8], all_applications: bool) -> Vec<u8> {
    let integer = |v: u8| der(&[0x02], &[v]);
    let enumerated = der(&[0x0a], &[1]);
    let purpose = der(&[0xa1], &der(&[0x31], &integer(2)));
    let origin = der(&[0xbf, 0x85, 0x3e], &integer(0));
    let mut tee_enforced = [purpose, origin].concat();
    if all_applications {
        tee_enforced.extend(der(&[0xbf, 0x84, 0x58], &der(&[0x05], &[])));
    }
    der(
        &[0x30],
        &[
            integer(3),
            enumerated.clone(),
            integer(4),
            enumerated,
            der(&[0x04], challenge),
            der(&[0x04], &[]),
            der(&[0x30], &[]),
            der(&[0x30], &tee_enforced),
        ]
        .concat(),
    )
}

/// A registration response before it is wrapped into a payload
pub struct Attestation {
    pub client_data_json: Vec<u8>,
    pub auth_data: Vec<u8>,
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
}

impl Attestation {
    pub fn object(&self) -> Vec<u8> {
        cbor(&Value::Map(vec![
            (text("fmt"), text(&self.fmt)),
            (text("attStmt"), Value::Map(self.att_stmt.clone())),
            (text("authData"), Value::Bytes(self.auth_data.clone())),
        ]))
    }

    pub fn payload(&self) -> RegistrationPayload {
        RegistrationPayload {
            client_data_json: self.client_data_json.clone(),
            attestation_object: self.object(),
            transports: vec!["usb".to_string()],
        }
    }

    /// Flip one bit of the authenticator data after the statement was made
    pub fn flip_auth_data_bit(&mut self, index: usize, bit: u8) {
        self.auth_data[index] ^= 1 << bit;
    }

    /// Replace a statement member
    pub fn set_stmt(&mut self, key: &str, value: Value) {
        for (k, v) in &mut self.att_stmt {
            if *k == text(key) {
                *v = value;
                return;
            }
        }
        self.att_stmt.push((text(key), value));
    }
}

// ---------------------------------------------------------------------------
// The authenticator
// ---------------------------------------------------------------------------

pub struct SoftAuthenticator {
    pub key: SoftKey,
    pub credential_id: Vec<u8>,
    pub aaguid: [u8; 16],
    pub rp_id: String,
    pub origin: String,
    pub flags: u8,
    pub sign_count: u32,
    pub ca: Ca,
}

impl SoftAuthenticator {
    pub fn new(kind: KeyKind) -> Self {
        let key = SoftKey::generate(kind);
        let credential_id = sha256(&key.spki()).to_vec();
        Self {
            key,
            credential_id,
            aaguid: AAGUID,
            rp_id: RP_ID.to_string(),
            origin: ORIGIN.to_string(),
            flags: UP | UV,
            sign_count: 0,
            ca: Ca::new("Soft Attestation Root"),
        }
    }

    pub fn client_data(&self, kind: &str, challenge: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": kind,
            "challenge": b64url(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .unwrap()
    }

    pub fn rp_id_hash(&self) -> [u8; 32] {
        sha256(self.rp_id.as_bytes())
    }

    pub fn auth_data(&self, attested: bool) -> Vec<u8> {
        let mut out = self.rp_id_hash().to_vec();
        out.push(if attested { self.flags | AT } else { self.flags });
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if attested {
            out.extend_from_slice(&self.aaguid);
            out.extend(sized(&self.credential_id));
            out.extend(self.key.cose());
        }
        out
    }

    /// Build a registration response in the given format
    pub fn attest(&self, statement: Statement, challenge: &[u8]) -> Attestation {
        let client_data_json = self.client_data("webauthn.create", challenge);
        let auth_data = self.auth_data(true);
        let client_data_hash = sha256(&client_data_json);
        let signed = [auth_data.as_slice(), client_data_hash.as_slice()].concat();

        let att_stmt = match statement {
            Statement::None => Vec::new(),
            Statement::Packed => self.packed_statement(&signed),
            Statement::PackedSelf => vec![
                (text("alg"), int(self.key.alg())),
                (text("sig"), Value::Bytes(self.key.sign(&signed))),
            ],
            Statement::FidoU2f => self.fido_u2f_statement(&client_data_hash),
            Statement::AndroidKey => self.android_key_statement(&signed, &client_data_hash),
            Statement::AndroidSafetyNet { cts_profile_match } => {
                self.safetynet_statement(&signed, cts_profile_match)
            }
            Statement::Tpm => self.tpm_statement(&signed),
            Statement::Apple => self.apple_statement(&signed),
        };

        Attestation {
            client_data_json,
            auth_data,
            fmt: statement.fmt().to_string(),
            att_stmt,
        }
    }

    fn x5c(certs: &[&X509]) -> Value {
        Value::Array(
            certs
                .iter()
                .map(|c| Value::Bytes(c.to_der().unwrap()))
                .collect(),
        )
    }

    fn packed_statement(&self, signed: &[u8]) -> Vec<(Value, Value)> {
        let attestation_key = SoftKey::generate(KeyKind::P256);
        let subject = [
            ("C", "US"),
            ("O", "Soft Authenticators"),
            ("OU", "Authenticator Attestation"),
            ("CN", "Soft Packed Attestation"),
        ];
        let spec = CertSpec {
            extensions: vec![(OID_FIDO_AAGUID, der(&[0x04], &self.aaguid))],
            ..CertSpec::leaf(&subject)
        };
        let leaf = self.ca.issue(&spec, &attestation_key.pkey);
        vec![
            (text("alg"), int(-7)),
            (text("sig"), Value::Bytes(attestation_key.sign(signed))),
            (text("x5c"), Self::x5c(&[&leaf])),
        ]
    }

    fn fido_u2f_statement(&self, client_data_hash: &[u8]) -> Vec<(Value, Value)> {
        let attestation_key = SoftKey::generate(KeyKind::P256);
        let subject = [("CN", "Soft U2F Attestation")];
        let leaf = self.ca.issue(&CertSpec::leaf(&subject), &attestation_key.pkey);

        let (x, y) = self.key.ec_coordinates();
        let verification_data = [
            &[0x00][..],
            &self.rp_id_hash(),
            client_data_hash,
            &self.credential_id,
            &[0x04],
            &x,
            &y,
        ]
        .concat();
        vec![
            (text("sig"), Value::Bytes(attestation_key.sign(&verification_data))),
            (text("x5c"), Self::x5c(&[&leaf])),
        ]
    }

    fn android_key_statement(&self, signed: &[u8], client_data_hash: &[u8]) -> Vec<(Value, Value)> {
        let subject = [("CN", "Android Keystore Key")];
        let spec = CertSpec {
            extensions: vec![(OID_ANDROID_KEY, key_description(client_data_hash, false))],
            ..CertSpec::leaf(&subject)
        };
        let leaf = self.ca.issue(&spec, &self.key.pkey);
        vec![
            (text("alg"), int(self.key.alg())),
            (text("sig"), Value::Bytes(self.key.sign(signed))),
            (text("x5c"), Self::x5c(&[&leaf])),
        ]
    }

    fn safetynet_statement(&self, signed: &[u8], cts_profile_match: bool) -> Vec<(Value, Value)> {
        let signing_key = SoftKey::generate(KeyKind::Rsa);
        let subject = [("O", "Google LLC"), ("CN", "attest.android.com")];
        let leaf = self.ca.issue(&CertSpec::leaf(&subject), &signing_key.pkey);

        let header = serde_json::json!({
            "alg": "RS256",
            "x5c": [STANDARD.encode(leaf.to_der().unwrap())],
        });
        let payload = serde_json::json!({
            "nonce": STANDARD.encode(sha256(signed)),
            "timestampMs": chrono::Utc::now().timestamp_millis(),
            "apkPackageName": "com.google.android.gms",
            "ctsProfileMatch": cts_profile_match,
            "basicIntegrity": true,
        });
        let header = b64url(&serde_json::to_vec(&header).unwrap());
        let payload = b64url(&serde_json::to_vec(&payload).unwrap());
        let signature = signing_key.sign(format!("{header}.{payload}").as_bytes());
        let jws = format!("{header}.{payload}.{}", b64url(&signature));

        vec![
            (text("ver"), text("14366018")),
            (text("response"), Value::Bytes(jws.into_bytes())),
        ]
    }

    /// `TPMT_PUBLIC` for the credential key
    pub fn tpm_pub_area(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.key.kind {
            KeyKind::Rsa => {
                let (n, _) = self.key.rsa_components();
                out.extend(0x0001u16.to_be_bytes()); // TPM_ALG_RSA
                out.extend(0x000bu16.to_be_bytes()); // nameAlg SHA-256
                out.extend(0x0006_0472u32.to_be_bytes());
                out.extend(sized(&[]));
                out.extend(0x0010u16.to_be_bytes()); // symmetric NULL
                out.extend(0x0010u16.to_be_bytes()); // scheme NULL
                out.extend(2048u16.to_be_bytes());
                out.extend(0u32.to_be_bytes()); // default exponent
                out.extend(sized(&n));
            }
            KeyKind::P256 => {
                let (x, y) = self.key.ec_coordinates();
                out.extend(0x0023u16.to_be_bytes()); // TPM_ALG_ECC
                out.extend(0x000bu16.to_be_bytes());
                out.extend(0x0006_0472u32.to_be_bytes());
                out.extend(sized(&[]));
                out.extend(0x0010u16.to_be_bytes());
                out.extend(0x0010u16.to_be_bytes());
                out.extend(0x0003u16.to_be_bytes()); // NIST P-256
                out.extend(0x0010u16.to_be_bytes()); // kdf NULL
                out.extend(sized(&x));
                out.extend(sized(&y));
            }
            KeyKind::Ed25519 => panic!("TPM keys are RSA or ECC"),
        }
        out
    }

    fn tpm_statement(&self, signed: &[u8]) -> Vec<(Value, Value)> {
        let pub_area = self.tpm_pub_area();
        let mut attested_name = 0x000bu16.to_be_bytes().to_vec();
        attested_name.extend(sha256(&pub_area));

        let mut cert_info = Vec::new();
        cert_info.extend(0xff54_4347u32.to_be_bytes());
        cert_info.extend(0x8017u16.to_be_bytes());
        cert_info.extend(sized(&[0x00, 0x0b, 0xaa, 0xbb]));
        cert_info.extend(sized(&sha256(signed)));
        cert_info.extend([0u8; 17]);
        cert_info.extend(0x2019_0101u64.to_be_bytes());
        cert_info.extend(sized(&attested_name));
        cert_info.extend(sized(&[0x00, 0x0b, 0xcc, 0xdd]));

        let aik = SoftKey::generate(KeyKind::P256);
        let spec = CertSpec {
            eku: Some(OID_TCG_KP_AIK),
            extensions: vec![(OID_FIDO_AAGUID, der(&[0x04], &self.aaguid))],
            ..CertSpec::leaf(&[])
        };
        let aik_cert = self.ca.issue(&spec, &aik.pkey);

        vec![
            (text("ver"), text("2.0")),
            (text("alg"), int(-7)),
            (text("x5c"), Self::x5c(&[&aik_cert])),
            (text("sig"), Value::Bytes(aik.sign(&cert_info))),
            (text("certInfo"), Value::Bytes(cert_info)),
            (text("pubArea"), Value::Bytes(pub_area)),
        ]
    }

    fn apple_statement(&self, signed: &[u8]) -> Vec<(Value, Value)> {
        let nonce = sha256(signed);
        let extension = der(&[0x30], &der(&[0xa1], &der(&[0x04], &nonce)));
        let subject = [("O", "Apple Inc."), ("CN", "Soft Apple Credential")];
        let spec = CertSpec {
            extensions: vec![(OID_APPLE_NONCE, extension)],
            ..CertSpec::leaf(&subject)
        };
        let leaf = self.ca.issue(&spec, &self.key.pkey);
        vec![(text("x5c"), Self::x5c(&[&leaf]))]
    }

    /// Build an assertion over the current flags and counter
    pub fn assert(&self, challenge: &[u8]) -> AuthenticationPayload {
        let client_data_json = self.client_data("webauthn.get", challenge);
        let authenticator_data = self.auth_data(false);
        let signed = [
            authenticator_data.as_slice(),
            sha256(&client_data_json).as_slice(),
        ]
        .concat();
        AuthenticationPayload {
            credential_id: self.credential_id.clone(),
            client_data_json,
            authenticator_data,
            signature: self.key.sign(&signed),
            user_handle: None,
        }
    }
}
