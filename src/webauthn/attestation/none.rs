//! `none` attestation: the authenticator asserts no device identity

use super::{
    attestation_err, AttestationFormat, AttestationFormatValidator, AttestationResult,
    AttestationType, VerificationContext,
};
use crate::webauthn::cbor::CborValue;
use crate::webauthn::errors::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoneValidator;

impl AttestationFormatValidator for NoneValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::None
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        if !att_stmt.as_map().is_some_and(<[_]>::is_empty) {
            return Err(attestation_err("invalid none attestation statement"));
        }
        let mut result = AttestationResult::new(ctx, AttestationFormat::None);
        result.attestation_type = AttestationType::None;
        Ok(result)
    }
}
