//! ASN.1 DER encoding for verification keys and signatures
//!
//! The encoder builds the handful of structures verification needs: a
//! `SubjectPublicKeyInfo` for every COSE key type, and DER `ECDSA-Sig-Value`
//! signatures from the raw `r||s` form some attestation formats carry.
//! `SubjectPublicKeyInfo` values are read back with `x509_parser`.

use x509_parser::oid_registry::Oid;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo as X509SubjectPublicKeyInfo;

use super::errors::{Result, WebAuthnError};

pub mod oid {
    //! Object identifiers in dotted form

    pub const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
    pub const P256: &str = "1.2.840.10045.3.1.7";
    pub const P384: &str = "1.3.132.0.34";
    pub const P521: &str = "1.3.132.0.35";
    pub const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
    pub const ED25519: &str = "1.3.101.112";
}

/// Universal tag numbers
mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
}

/// Fixed `SubjectPublicKeyInfo` prefix for a raw 32-byte Ed25519 key
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

fn der_err(msg: &str) -> WebAuthnError {
    WebAuthnError::Der(msg.to_string())
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        // Fits in the short form
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// Encode a TLV with a single identifier octet
fn tlv(identifier: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(identifier);
    push_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

/// SEQUENCE over already-encoded elements
fn sequence(elements: &[&[u8]]) -> Vec<u8> {
    tlv(tag::SEQUENCE, &elements.concat())
}

/// INTEGER from unsigned big-endian magnitude bytes
///
/// Leading zero bytes are stripped and a zero byte is prepended when the
/// high bit is set so the value stays positive.
fn integer(magnitude: &[u8]) -> Vec<u8> {
    let skip = magnitude.iter().take_while(|b| **b == 0).count();
    let trimmed = &magnitude[skip..];
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.first().is_none_or(|b| b & 0x80 != 0) {
        content.push(0x00);
    }
    content.extend_from_slice(trimmed);
    tlv(tag::INTEGER, &content)
}

/// BIT STRING with zero unused bits
fn bit_string(bytes: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(bytes.len() + 1);
    content.push(0x00);
    content.extend_from_slice(bytes);
    tlv(tag::BIT_STRING, &content)
}

fn null() -> Vec<u8> {
    tlv(tag::NULL, &[])
}

/// OBJECT IDENTIFIER from dotted form
fn oid(dotted: &str) -> Result<Vec<u8>> {
    Ok(tlv(tag::OID, &encode_oid(dotted)?))
}

/// Content octets of an OBJECT IDENTIFIER
fn encode_oid(dotted: &str) -> Result<Vec<u8>> {
    let arcs = dotted
        .split('.')
        .map(str::parse::<u64>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| der_err("invalid object identifier"))?;
    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(der_err("invalid object identifier"));
    }

    let first = arcs[0]
        .checked_mul(40)
        .and_then(|v| v.checked_add(arcs[1]))
        .ok_or_else(|| der_err("invalid object identifier"))?;

    let mut out = Vec::new();
    for arc in std::iter::once(first).chain(arcs[2..].iter().copied()) {
        let mut groups = Vec::new();
        let mut n = arc;
        loop {
            groups.push((n & 0x7f) as u8);
            n >>= 7;
            if n == 0 {
                break;
            }
        }
        for (i, group) in groups.iter().rev().enumerate() {
            let more = if i + 1 < groups.len() { 0x80 } else { 0x00 };
            out.push(group | more);
        }
    }
    Ok(out)
}

/// `SubjectPublicKeyInfo` for an uncompressed EC point on a named curve
///
/// # Errors
/// Returns `Der` if the curve OID is invalid or the coordinates differ in length.
pub fn ec_spki(curve_oid: &str, x: &[u8], y: &[u8]) -> Result<Vec<u8>> {
    if x.is_empty() || x.len() != y.len() {
        return Err(der_err("invalid EC coordinates"));
    }
    let algorithm = sequence(&[&oid(oid::EC_PUBLIC_KEY)?, &oid(curve_oid)?]);
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    Ok(sequence(&[&algorithm, &bit_string(&point)]))
}

/// `SubjectPublicKeyInfo` for an RSA key
///
/// # Errors
/// Returns `Der` if the modulus or exponent is empty.
pub fn rsa_spki(n: &[u8], e: &[u8]) -> Result<Vec<u8>> {
    if n.iter().all(|b| *b == 0) || e.iter().all(|b| *b == 0) {
        return Err(der_err("invalid RSA key"));
    }
    let algorithm = sequence(&[&oid(oid::RSA_ENCRYPTION)?, &null()]);
    let key = sequence(&[&integer(n), &integer(e)]);
    Ok(sequence(&[&algorithm, &bit_string(&key)]))
}

/// `SubjectPublicKeyInfo` for a raw Ed25519 key
///
/// # Errors
/// Returns `Der` unless the key is exactly 32 bytes.
pub fn ed25519_spki(x: &[u8]) -> Result<Vec<u8>> {
    if x.len() != 32 {
        return Err(der_err("invalid Ed25519 key length"));
    }
    let mut out = Vec::with_capacity(ED25519_SPKI_PREFIX.len() + 32);
    out.extend_from_slice(&ED25519_SPKI_PREFIX);
    out.extend_from_slice(x);
    Ok(out)
}

/// Re-encode a raw `r||s` ECDSA signature as DER `ECDSA-Sig-Value`
///
/// # Errors
/// Returns `Der` if the input is empty or has odd length.
pub fn ecdsa_signature_from_raw(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(der_err("invalid raw ECDSA signature"));
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    Ok(sequence(&[&integer(r), &integer(s)]))
}

/// Wrap base64 DER in PEM armour
#[must_use]
pub fn to_pem(label: &str, der: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in body.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

/// Decoded `SubjectPublicKeyInfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPublicKeyInfo {
    /// Algorithm OID, e.g. `1.2.840.10045.2.1`
    pub algorithm: String,
    /// Named-curve OID for EC keys, `None` for NULL or absent parameters
    pub parameters: Option<String>,
    /// The subjectPublicKey BIT STRING payload
    pub key: Vec<u8>,
}

/// Decode a `SubjectPublicKeyInfo`
///
/// # Errors
/// Returns `Der` if the structure is malformed or followed by trailing data.
pub fn parse_spki(der: &[u8]) -> Result<SubjectPublicKeyInfo> {
    let (rest, spki) = X509SubjectPublicKeyInfo::from_der(der)
        .map_err(|e| WebAuthnError::Der(format!("invalid SubjectPublicKeyInfo: {e}")))?;
    if !rest.is_empty() {
        return Err(der_err("trailing data"));
    }
    let parameters = spki
        .algorithm
        .parameters
        .clone()
        .and_then(|param| Oid::try_from(param).ok())
        .map(|curve| curve.to_id_string());
    Ok(SubjectPublicKeyInfo {
        algorithm: spki.algorithm.algorithm.to_id_string(),
        parameters,
        key: spki.subject_public_key.data.to_vec(),
    })
}

/// Whether two DER `SubjectPublicKeyInfo` encodings describe the same key
///
/// NULL and absent algorithm parameters compare equal.
#[must_use]
pub fn spki_matches(a: &[u8], b: &[u8]) -> bool {
    match (parse_spki(a), parse_spki(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
