//! X.509 certificates for attestation trust paths
//!
//! Certificates are held as `openssl` `X509` values. Extensions are read with
//! `x509_parser` so format validators can look inside them by OID. Chains are
//! verified by an openssl `X509Store` built from the trust anchors.

use chrono::{DateTime, Utc};
use der_parser::der::{parse_der_oid, parse_der_sequence_of};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::{X509VerifyFlags, X509VerifyParam};
use openssl::x509::{X509Ref, X509StoreContext, X509VerifyResult, X509};
use x509_parser::extensions::ParsedExtension;
use x509_parser::oid_registry::Oid;

use super::errors::{Result, WebAuthnError};

/// extendedKeyUsage
const EXTENDED_KEY_USAGE: Oid<'static> = der_parser::oid!(2.5.29 .37);

fn der_error(err: impl std::fmt::Display) -> WebAuthnError {
    WebAuthnError::Der(format!("invalid certificate: {err}"))
}

/// A certificate extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub oid: Oid<'static>,
    pub critical: bool,
    /// Content of the `extnValue` OCTET STRING
    pub value: Vec<u8>,
}

/// A decoded X.509 certificate
#[derive(Debug, Clone)]
pub struct Certificate {
    x509: X509,
    der: Vec<u8>,
    version: u8,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    public_key: Vec<u8>,
    extensions: Vec<Extension>,
    is_ca: bool,
    key_purposes: Vec<Oid<'static>>,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

/// Seconds since the epoch for an ASN.1 time
fn unix_time(epoch: &Asn1TimeRef, time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let diff = epoch.diff(time).map_err(der_error)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| WebAuthnError::Der("certificate time out of range".to_string()))
}

/// Every purpose listed in an extendedKeyUsage value
fn key_purposes(value: &[u8]) -> Result<Vec<Oid<'static>>> {
    let (_, purposes) = parse_der_sequence_of(parse_der_oid)(value).map_err(der_error)?;
    purposes
        .as_sequence()
        .map_err(der_error)?
        .iter()
        .map(|purpose| purpose.as_oid().map(Oid::to_owned).map_err(der_error))
        .collect()
}

impl Certificate {
    /// Decode a DER certificate
    ///
    /// # Errors
    /// Returns `Der` if the structure is not a well-formed X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let x509 = X509::from_der(der).map_err(der_error)?;
        let (rest, parsed) = x509_parser::parse_x509_certificate(der).map_err(der_error)?;
        if !rest.is_empty() {
            return Err(WebAuthnError::Der(
                "trailing data after certificate".to_string(),
            ));
        }

        let version = u8::try_from(x509.version() + 1)
            .ok()
            .filter(|v| (1..=3).contains(v))
            .ok_or_else(|| WebAuthnError::Der("invalid certificate version".to_string()))?;

        let epoch = Asn1Time::from_unix(0).map_err(der_error)?;
        let not_before = unix_time(&epoch, x509.not_before())?;
        let not_after = unix_time(&epoch, x509.not_after())?;

        let public_key = x509
            .public_key()
            .and_then(|key| key.public_key_to_der())
            .map_err(der_error)?;

        let mut is_ca = false;
        let mut purposes = Vec::new();
        let mut extensions = Vec::with_capacity(parsed.extensions().len());
        for extension in parsed.extensions() {
            if let ParsedExtension::BasicConstraints(constraints) = extension.parsed_extension() {
                is_ca = constraints.ca;
            }
            if extension.oid == EXTENDED_KEY_USAGE {
                purposes = key_purposes(extension.value)?;
            }
            extensions.push(Extension {
                oid: extension.oid.to_owned(),
                critical: extension.critical,
                value: extension.value.to_vec(),
            });
        }

        Ok(Self {
            x509,
            der: der.to_vec(),
            version,
            not_before,
            not_after,
            public_key,
            extensions,
            is_ca,
            key_purposes: purposes,
        })
    }

    /// Decode every `CERTIFICATE` block of a PEM bundle
    ///
    /// # Errors
    /// Returns `Der` for malformed blocks or a bundle without certificates.
    pub fn from_pem_bundle(pem: &str) -> Result<Vec<Self>> {
        let stack = X509::stack_from_pem(pem.as_bytes()).map_err(der_error)?;
        if stack.is_empty() {
            return Err(WebAuthnError::Der(
                "no certificates in PEM bundle".to_string(),
            ));
        }
        stack
            .iter()
            .map(|x509| Self::from_der(&x509.to_der().map_err(der_error)?))
            .collect()
    }

    /// # Errors
    /// Returns `Der` if openssl cannot encode the certificate.
    pub fn to_pem(&self) -> Result<String> {
        let pem = self.x509.to_pem().map_err(der_error)?;
        String::from_utf8(pem).map_err(der_error)
    }

    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub fn x509(&self) -> &X509Ref {
        &self.x509
    }

    /// X.509 version number (1, 2 or 3)
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Subject `SubjectPublicKeyInfo` in DER
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Named curve of an EC subject key
    #[must_use]
    pub fn ec_curve(&self) -> Option<Nid> {
        let key = self.x509.public_key().ok()?;
        let ec = key.ec_key().ok()?;
        ec.group().curve_name()
    }

    /// First subject entry with the given NID, as UTF-8
    #[must_use]
    pub fn subject_entry(&self, nid: Nid) -> Option<String> {
        let entry = self.x509.subject_name().entries_by_nid(nid).next()?;
        entry.data().as_utf8().ok().map(|s| s.to_string())
    }

    #[must_use]
    pub fn has_empty_subject(&self) -> bool {
        self.x509.subject_name().entries().next().is_none()
    }

    #[must_use]
    pub fn extension(&self, oid: &Oid<'static>) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.oid == *oid)
    }

    #[must_use]
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Whether basicConstraints marks this certificate as a CA
    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Key purposes listed in extendedKeyUsage, empty when absent
    #[must_use]
    pub fn key_purposes(&self) -> &[Oid<'static>] {
        &self.key_purposes
    }

    /// Whether `issuer` names and signed this certificate
    ///
    /// # Errors
    /// Returns `Der` if the issuer key cannot be loaded.
    pub fn is_issued_by(&self, issuer: &Certificate) -> Result<bool> {
        if issuer.x509.issued(&self.x509) != X509VerifyResult::OK {
            return Ok(false);
        }
        let key = issuer.x509.public_key().map_err(der_error)?;
        self.x509.verify(&key).map_err(der_error)
    }
}

fn verify_with_store(
    leaf: &Certificate,
    intermediates: &[Certificate],
    roots: &[Certificate],
    now: DateTime<Utc>,
) -> std::result::Result<bool, ErrorStack> {
    let mut untrusted = Stack::new()?;
    for cert in intermediates {
        untrusted.push(cert.x509.clone())?;
    }

    // Anchors need not be self-signed
    let mut param = X509VerifyParam::new()?;
    param.set_time(now.timestamp());
    param.set_flags(X509VerifyFlags::PARTIAL_CHAIN)?;

    let mut store = X509StoreBuilder::new()?;
    for root in roots {
        store.add_cert(root.x509.clone())?;
    }
    store.set_param(&param)?;
    let store = store.build();

    let mut context = X509StoreContext::new()?;
    context.init(&store, &leaf.x509, &untrusted, |ctx| {
        let verified = ctx.verify_cert()?;
        if !verified {
            log::debug!(
                "Attestation chain rejected at depth {}: {}",
                ctx.error_depth(),
                ctx.error()
            );
        }
        Ok(verified)
    })
}

/// Verify that `chain` (leaf first) ends at one of `roots` at time `now`
///
/// Every certificate above the leaf, anchors included, must be a CA.
///
/// # Errors
/// Returns `Attestation("invalid root certificate")` if any link fails, a
/// certificate is outside its validity period, or no root matches.
pub fn verify_chain(
    chain: &[Certificate],
    roots: &[Certificate],
    now: DateTime<Utc>,
) -> Result<()> {
    let invalid = || WebAuthnError::Attestation("invalid root certificate".to_string());

    let Some((leaf, intermediates)) = chain.split_first() else {
        return Err(invalid());
    };
    if roots.is_empty() {
        return Err(invalid());
    }

    match verify_with_store(leaf, intermediates, roots, now) {
        Ok(true) => Ok(()),
        Ok(false) => Err(invalid()),
        Err(e) => {
            log::debug!("Attestation chain verification failed: {e}");
            Err(invalid())
        }
    }
}
