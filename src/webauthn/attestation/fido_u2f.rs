//! `fido-u2f` attestation for legacy U2F authenticators
//!
//! The signature covers the U2F registration layout rather than
//! `authData || clientDataHash`:
//! `0x00 || rpIdHash || clientDataHash || credentialId || 0x04 || x || y`.

use super::{
    attestation_err, invalid_signature, stmt_bytes, stmt_x5c, AttestationFormat,
    AttestationFormatValidator, AttestationResult, AttestationType, VerificationContext,
};
use crate::webauthn::cbor::CborValue;
use crate::webauthn::cose::CoseAlgorithm;
use crate::webauthn::crypto;
use crate::webauthn::errors::Result;
use openssl::nid::Nid;

#[derive(Debug, Clone, Copy, Default)]
pub struct FidoU2fValidator;

impl AttestationFormatValidator for FidoU2fValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::FidoU2f
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        let sig = stmt_bytes(att_stmt, "sig")?;

        // 1. Exactly one attestation certificate holding a P-256 key
        let chain = stmt_x5c(att_stmt)?.ok_or_else(|| attestation_err("missing x5c"))?;
        if chain.len() != 1 {
            return Err(attestation_err("fido-u2f requires exactly one certificate"));
        }
        let cert = &chain[0];
        if cert.ec_curve() != Some(Nid::X9_62_PRIME256V1) {
            return Err(attestation_err("fido-u2f certificate key must be P-256"));
        }

        // 2. Rebuild the U2F registration data
        let credential_id = ctx
            .auth_data
            .credential_id()
            .ok_or_else(|| attestation_err("missing attested credential data"))?;
        let public_key = ctx
            .auth_data
            .u2f_public_key()
            .ok_or_else(|| attestation_err("fido-u2f credential key must be P-256"))?;

        let mut verification_data =
            Vec::with_capacity(1 + 32 + 32 + credential_id.len() + public_key.len());
        verification_data.push(0x00);
        verification_data.extend_from_slice(ctx.auth_data.rp_id_hash());
        verification_data.extend_from_slice(ctx.client_data_hash);
        verification_data.extend_from_slice(credential_id);
        verification_data.extend_from_slice(&public_key);

        // 3. Verify with the attestation certificate key
        let key = cert.public_key();
        if !crypto::verify_signature(CoseAlgorithm::ES256, key, &verification_data, sig)? {
            return Err(invalid_signature());
        }

        let mut result = AttestationResult::new(ctx, AttestationFormat::FidoU2f);
        result.attestation_type = AttestationType::Basic;
        result.trust_path = chain;
        Ok(result)
    }
}
