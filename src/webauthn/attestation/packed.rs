//! `packed` attestation
//!
//! Either full attestation with an `x5c` chain, or self attestation signed
//! by the credential key itself. ECDAA was removed from `WebAuthn` and is
//! rejected.

use super::{
    attestation_err, check_aaguid_extension, invalid_signature, stmt_alg, stmt_bytes, stmt_x5c,
    AttestationFormat, AttestationFormatValidator, AttestationResult, AttestationType,
    VerificationContext,
};
use crate::webauthn::cbor::CborValue;
use crate::webauthn::certificate::Certificate;
use crate::webauthn::crypto;
use crate::webauthn::errors::Result;
use openssl::nid::Nid;

const ATTESTATION_OU: &str = "Authenticator Attestation";

#[derive(Debug, Clone, Copy, Default)]
pub struct PackedValidator;

/// Requirements on a packed attestation certificate
fn check_certificate_requirements(cert: &Certificate) -> Result<()> {
    if cert.version() != 3 {
        return Err(attestation_err("attestation certificate must be version 3"));
    }
    if cert.subject_entry(Nid::ORGANIZATIONALUNITNAME).as_deref() != Some(ATTESTATION_OU) {
        return Err(attestation_err("invalid attestation certificate subject"));
    }
    if cert.is_ca() {
        return Err(attestation_err("attestation certificate must not be a CA"));
    }
    Ok(())
}

impl AttestationFormatValidator for PackedValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::Packed
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        let alg = stmt_alg(att_stmt)?;
        let sig = stmt_bytes(att_stmt, "sig")?;
        if att_stmt.get_text("ecdaaKeyId").is_some() {
            return Err(attestation_err("ecdaa attestation is not supported"));
        }

        let signed = ctx.signed_data();
        let credential_key = ctx.credential_public_key()?;
        let mut result = AttestationResult::new(ctx, AttestationFormat::Packed);

        match stmt_x5c(att_stmt)? {
            Some(chain) => {
                let leaf = &chain[0];
                if !crypto::verify_signature(alg, leaf.public_key(), &signed, sig)? {
                    return Err(invalid_signature());
                }
                check_certificate_requirements(leaf)?;
                check_aaguid_extension(leaf, ctx.auth_data.aaguid())?;
                result.attestation_type = AttestationType::Basic;
                result.trust_path = chain;
            }
            None => {
                // Self attestation: alg must be the credential key's own algorithm
                if alg != credential_key.algorithm() {
                    return Err(attestation_err("algorithm mismatch"));
                }
                if !credential_key.verify(&signed, sig)? {
                    return Err(invalid_signature());
                }
                result.attestation_type = AttestationType::SelfAttestation;
            }
        }

        Ok(result)
    }
}
