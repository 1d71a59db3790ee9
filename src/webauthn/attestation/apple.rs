//! `apple` anonymous attestation
//!
//! Apple binds the ceremony through a nonce extension on the credential
//! certificate instead of a signature: `SEQUENCE { [1] EXPLICIT OCTET STRING }`
//! holding SHA-256(`authData || clientDataHash`).

use der_parser::error::{BerError, BerResult};
use x509_parser::oid_registry::Oid;

use super::{
    attestation_err, stmt_x5c, AttestationFormat, AttestationFormatValidator, AttestationResult,
    AttestationType, VerificationContext,
};
use crate::webauthn::cbor::CborValue;
use crate::webauthn::crypto;
use crate::webauthn::errors::Result;

/// Apple anonymous attestation nonce
const APPLE_NONCE: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);

#[derive(Debug, Clone, Copy, Default)]
pub struct AppleValidator;

fn parse_nonce(i: &[u8]) -> BerResult<'_, Vec<u8>> {
    use der_parser::der::*;
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        let (i, tagged_nonce) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
        let (class, _tag, nonce) = tagged_nonce.as_tagged()?;
        if class != Class::ContextSpecific {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        Ok((i, nonce.as_slice()?.to_vec()))
    })(i)
}

fn read_nonce(extension: &[u8]) -> Result<Vec<u8>> {
    parse_nonce(extension)
        .map(|(_, nonce)| nonce)
        .map_err(|_| attestation_err("invalid apple nonce extension"))
}

impl AttestationFormatValidator for AppleValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::Apple
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        let chain = stmt_x5c(att_stmt)?.ok_or_else(|| attestation_err("missing x5c"))?;
        let leaf = &chain[0];

        // 1. Nonce extension matches this ceremony
        let extension = leaf
            .extension(&APPLE_NONCE)
            .ok_or_else(|| attestation_err("missing apple nonce extension"))?;
        let nonce = read_nonce(&extension.value)?;
        if nonce != crypto::sha256(&ctx.signed_data()) {
            return Err(attestation_err("invalid nonce"));
        }

        // 2. The certified key is the credential key
        if !ctx.credential_public_key()?.matches_spki(leaf.public_key()) {
            return Err(attestation_err("credential key does not match attestation certificate"));
        }

        let mut result = AttestationResult::new(ctx, AttestationFormat::Apple);
        result.attestation_type = AttestationType::AnonCa;
        result.trust_path = chain;
        Ok(result)
    }
}
