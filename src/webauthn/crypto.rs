//! `WebAuthn` cryptography operations
//!
//! This module provides the cryptographic operations needed for `WebAuthn`
//! such as signature verification and challenge generation. Keys always
//! arrive as DER `SubjectPublicKeyInfo`, whichever format they came from.

use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};
use ring::rand::SecureRandom;
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::cose::CoseAlgorithm;
use super::errors::{Result, WebAuthnError};

/// SHA-256 digest
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of two inputs
#[must_use]
pub fn sha256_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// SHA-1, only for legacy TPM name and qualifying-data hashes
#[must_use]
pub fn sha1(data: &[u8]) -> Vec<u8> {
    openssl::sha::sha1(data).to_vec()
}

#[must_use]
pub fn sha384(data: &[u8]) -> Vec<u8> {
    Sha384::digest(data).to_vec()
}

#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

/// Generate a random challenge of `len` bytes
///
/// # Errors
/// Returns `Requirement` if the system random source fails.
pub fn generate_challenge(len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    ring::rand::SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| WebAuthnError::Requirement("system random source unavailable".to_string()))?;
    Ok(bytes)
}

/// Generate a user handle
///
/// # Returns
/// A 16-byte random identifier suitable as `user.id`
///
/// # Errors
/// Returns `Requirement` if the system random source fails.
pub fn generate_user_handle() -> Result<Vec<u8>> {
    generate_challenge(16)
}

fn digest_for(alg: CoseAlgorithm) -> Option<MessageDigest> {
    match alg {
        CoseAlgorithm::ES256 | CoseAlgorithm::RS256 | CoseAlgorithm::PS256 => {
            Some(MessageDigest::sha256())
        }
        CoseAlgorithm::ES384 | CoseAlgorithm::RS384 => Some(MessageDigest::sha384()),
        CoseAlgorithm::ES512 | CoseAlgorithm::RS512 => Some(MessageDigest::sha512()),
        CoseAlgorithm::RS1 => Some(MessageDigest::sha1()),
        CoseAlgorithm::EdDSA => None,
    }
}

/// Verify `signature` over `data` with a DER `SubjectPublicKeyInfo`
///
/// # Returns
/// * `Ok(true)` - The signature verifies
/// * `Ok(false)` - The signature does not verify, is malformed, or the key
///   type does not fit the algorithm
///
/// # Errors
/// Returns `UnsupportedAlgorithm` if the key cannot be loaded.
pub fn verify_signature(
    alg: CoseAlgorithm,
    spki: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let pkey = PKey::public_key_from_der(spki)
        .map_err(|e| WebAuthnError::UnsupportedAlgorithm(format!("invalid public key: {e}")))?;

    let expected_id = match alg {
        CoseAlgorithm::ES256 | CoseAlgorithm::ES384 | CoseAlgorithm::ES512 => Id::EC,
        CoseAlgorithm::EdDSA => Id::ED25519,
        _ => Id::RSA,
    };
    if pkey.id() != expected_id {
        log::debug!("Public key type does not fit {alg:?}");
        return Ok(false);
    }

    let verified = match digest_for(alg) {
        None => Verifier::new_without_digest(&pkey)
            .and_then(|mut verifier| verifier.verify_oneshot(signature, data)),
        Some(digest) => Verifier::new(digest, &pkey).and_then(|mut verifier| {
            if alg == CoseAlgorithm::PS256 {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
                verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            } else if expected_id == Id::RSA {
                verifier.set_rsa_padding(Padding::PKCS1)?;
            }
            verifier.update(data)?;
            verifier.verify(signature)
        }),
    };

    // Malformed signatures surface as OpenSSL errors; they are simply invalid
    Ok(verified.unwrap_or(false))
}

/// Check that the OpenSSL build provides every primitive verification needs
///
/// # Errors
/// Returns `Requirement` naming the first missing primitive.
pub fn check_requirements() -> Result<()> {
    let missing = |what: &str| WebAuthnError::Requirement(format!("{what} is not available"));

    for nid in [Nid::SHA1, Nid::SHA256, Nid::SHA384, Nid::SHA512] {
        if MessageDigest::from_nid(nid).is_none() {
            return Err(missing(nid.short_name().unwrap_or("digest")));
        }
    }

    for nid in [Nid::X9_62_PRIME256V1, Nid::SECP384R1, Nid::SECP521R1] {
        openssl::ec::EcGroup::from_curve_name(nid).map_err(|_| missing("ECDSA"))?;
    }

    let n = BigNum::from_u32(0xffff_fffb).map_err(|_| missing("RSA"))?;
    let e = BigNum::from_u32(65537).map_err(|_| missing("RSA"))?;
    Rsa::from_public_components(n, e).map_err(|_| missing("RSA"))?;

    PKey::generate_ed25519().map_err(|_| missing("Ed25519"))?;

    // The random source must work before any challenge is issued
    generate_challenge(16)?;
    Ok(())
}
