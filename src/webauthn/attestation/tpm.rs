//! `tpm` attestation
//!
//! `certInfo` is a `TPMS_ATTEST` structure signed by the attestation
//! identity key (AIK), and `pubArea` is the `TPMT_PUBLIC` area of the
//! credential key. All TPM integers are big-endian.

use super::{
    attestation_err, check_aaguid_extension, invalid_signature, stmt_alg, stmt_bytes, stmt_x5c,
    AttestationFormat, AttestationFormatValidator, AttestationResult, AttestationType,
    VerificationContext,
};
use crate::webauthn::buffer::ByteBuffer;
use crate::webauthn::cbor::CborValue;
use crate::webauthn::certificate::Certificate;
use crate::webauthn::cose::{CoseAlgorithm, CredentialPublicKey, EcCurve, KeyParams};
use crate::webauthn::crypto;
use crate::webauthn::errors::{Result, WebAuthnError};
use x509_parser::oid_registry::Oid;

/// tcg-kp-AIKCertificate
const TCG_KP_AIK_CERTIFICATE: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

/// `TPM_GENERATED_VALUE`
const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
/// `TPM_ST_ATTEST_CERTIFY`
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000b;
const TPM_ALG_SHA384: u16 = 0x000c;
const TPM_ALG_SHA512: u16 = 0x000d;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ALG_ECC: u16 = 0x0023;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

const RSA_DEFAULT_EXPONENT: u32 = 65_537;

#[derive(Debug, Clone, Copy, Default)]
pub struct TpmValidator;

/// Unique key material of a `TPMT_PUBLIC`
#[derive(Debug, Clone, PartialEq, Eq)]
enum TpmKey {
    Rsa { modulus: Vec<u8>, exponent: u32 },
    Ecc { curve: u16, x: Vec<u8>, y: Vec<u8> },
}

#[derive(Debug, Clone)]
struct PubArea {
    name_alg: u16,
    key: TpmKey,
}

#[derive(Debug, Clone)]
struct CertInfo<'a> {
    extra_data: &'a [u8],
    attested_name: &'a [u8],
}

fn tpm_err(msg: &str) -> WebAuthnError {
    attestation_err(msg)
}

fn truncated(_: WebAuthnError) -> WebAuthnError {
    tpm_err("truncated TPM structure")
}

/// Skip a scheme-like field: an algorithm id, followed by a hash alg unless NULL
fn skip_scheme(buf: &mut ByteBuffer<'_>) -> Result<()> {
    if buf.read_u16().map_err(truncated)? != TPM_ALG_NULL {
        buf.read_u16().map_err(truncated)?;
    }
    Ok(())
}

fn parse_pub_area(bytes: &[u8]) -> Result<PubArea> {
    let mut buf = ByteBuffer::new(bytes);
    let key_type = buf.read_u16().map_err(truncated)?;
    let name_alg = buf.read_u16().map_err(truncated)?;
    let _object_attributes = buf.read_u32().map_err(truncated)?;
    buf.read_sized_u16().map_err(truncated)?; // authPolicy

    let symmetric = buf.read_u16().map_err(truncated)?;
    if symmetric != TPM_ALG_NULL {
        return Err(tpm_err("unsupported TPM symmetric parameters"));
    }
    skip_scheme(&mut buf)?;

    let key = match key_type {
        TPM_ALG_RSA => {
            let _key_bits = buf.read_u16().map_err(truncated)?;
            let exponent = match buf.read_u32().map_err(truncated)? {
                0 => RSA_DEFAULT_EXPONENT,
                e => e,
            };
            let modulus = buf.read_sized_u16().map_err(truncated)?.to_vec();
            TpmKey::Rsa { modulus, exponent }
        }
        TPM_ALG_ECC => {
            let curve = buf.read_u16().map_err(truncated)?;
            skip_scheme(&mut buf)?; // kdf
            let x = buf.read_sized_u16().map_err(truncated)?.to_vec();
            let y = buf.read_sized_u16().map_err(truncated)?.to_vec();
            TpmKey::Ecc { curve, x, y }
        }
        other => {
            return Err(WebAuthnError::Attestation(format!(
                "unsupported TPM key type {other:#06x}"
            )))
        }
    };

    if !buf.is_empty() {
        return Err(tpm_err("trailing data in pubArea"));
    }
    Ok(PubArea { name_alg, key })
}

fn parse_cert_info(bytes: &[u8]) -> Result<CertInfo<'_>> {
    let mut buf = ByteBuffer::new(bytes);
    if buf.read_u32().map_err(truncated)? != TPM_GENERATED_VALUE {
        return Err(tpm_err("invalid TPM magic"));
    }
    if buf.read_u16().map_err(truncated)? != TPM_ST_ATTEST_CERTIFY {
        return Err(tpm_err("invalid TPM attestation type"));
    }
    buf.read_sized_u16().map_err(truncated)?; // qualifiedSigner
    let extra_data = buf.read_sized_u16().map_err(truncated)?;
    // clockInfo: clock(8) resetCount(4) restartCount(4) safe(1)
    buf.read_bytes(17).map_err(truncated)?;
    buf.read_u64().map_err(truncated)?; // firmwareVersion
    let attested_name = buf.read_sized_u16().map_err(truncated)?;
    buf.read_sized_u16().map_err(truncated)?; // qualifiedName
    if !buf.is_empty() {
        return Err(tpm_err("trailing data in certInfo"));
    }
    Ok(CertInfo {
        extra_data,
        attested_name,
    })
}

fn name_digest(name_alg: u16, data: &[u8]) -> Result<Vec<u8>> {
    match name_alg {
        TPM_ALG_SHA1 => Ok(crypto::sha1(data)),
        TPM_ALG_SHA256 => Ok(crypto::sha256(data).to_vec()),
        TPM_ALG_SHA384 => Ok(crypto::sha384(data)),
        TPM_ALG_SHA512 => Ok(crypto::sha512(data)),
        other => Err(WebAuthnError::Attestation(format!(
            "unsupported TPM name algorithm {other:#06x}"
        ))),
    }
}

/// Hash used for `extraData`, which follows the statement's `alg`
fn extra_data_digest(alg: CoseAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    match alg {
        CoseAlgorithm::RS1 => Ok(crypto::sha1(data)),
        CoseAlgorithm::RS256 | CoseAlgorithm::PS256 | CoseAlgorithm::ES256 => {
            Ok(crypto::sha256(data).to_vec())
        }
        CoseAlgorithm::RS384 | CoseAlgorithm::ES384 => Ok(crypto::sha384(data)),
        CoseAlgorithm::RS512 | CoseAlgorithm::ES512 => Ok(crypto::sha512(data)),
        CoseAlgorithm::EdDSA => Err(attestation_err("unsupported TPM signature algorithm")),
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    &bytes[skip..]
}

fn key_matches(key: &TpmKey, credential: &CredentialPublicKey) -> bool {
    match (key, credential.params()) {
        (TpmKey::Rsa { modulus, exponent }, KeyParams::Rsa { n, e }) => {
            strip_leading_zeros(modulus) == strip_leading_zeros(n)
                && strip_leading_zeros(&exponent.to_be_bytes()) == strip_leading_zeros(e)
        }
        (TpmKey::Ecc { curve, x, y }, KeyParams::Ec2 { curve: cose_curve, x: cx, y: cy }) => {
            let expected = match cose_curve {
                EcCurve::P256 => TPM_ECC_NIST_P256,
                EcCurve::P384 => TPM_ECC_NIST_P384,
                EcCurve::P521 => TPM_ECC_NIST_P521,
            };
            *curve == expected && x == cx && y == cy
        }
        _ => false,
    }
}

/// Requirements on the AIK certificate
fn check_aik_requirements(cert: &Certificate) -> Result<()> {
    if cert.version() != 3 {
        return Err(attestation_err("AIK certificate must be version 3"));
    }
    if !cert.has_empty_subject() {
        return Err(attestation_err("AIK certificate subject must be empty"));
    }
    if !cert.key_purposes().contains(&TCG_KP_AIK_CERTIFICATE) {
        return Err(attestation_err("AIK certificate is missing the tcg-kp-AIKCertificate usage"));
    }
    if cert.is_ca() {
        return Err(attestation_err("AIK certificate must not be a CA"));
    }
    Ok(())
}

impl AttestationFormatValidator for TpmValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::Tpm
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        if att_stmt.get_text("ver").and_then(CborValue::as_text) != Some("2.0") {
            return Err(attestation_err("unsupported TPM version"));
        }
        let alg = stmt_alg(att_stmt)?;
        let sig = stmt_bytes(att_stmt, "sig")?;
        let cert_info_bytes = stmt_bytes(att_stmt, "certInfo")?;
        let pub_area_bytes = stmt_bytes(att_stmt, "pubArea")?;
        let chain = stmt_x5c(att_stmt)?.ok_or_else(|| attestation_err("missing x5c"))?;
        let aik = &chain[0];

        // 1. pubArea describes the credential key
        let pub_area = parse_pub_area(pub_area_bytes)?;
        if !key_matches(&pub_area.key, ctx.credential_public_key()?) {
            return Err(attestation_err("pubArea does not match credential key"));
        }

        // 2. certInfo certifies this pubArea for this ceremony
        let cert_info = parse_cert_info(cert_info_bytes)?;
        if cert_info.extra_data != extra_data_digest(alg, &ctx.signed_data())?.as_slice() {
            return Err(attestation_err("invalid TPM extraData"));
        }
        let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
        expected_name.extend(name_digest(pub_area.name_alg, pub_area_bytes)?);
        if cert_info.attested_name != expected_name.as_slice() {
            return Err(attestation_err("invalid TPM attested name"));
        }

        // 3. The AIK signed certInfo
        if !crypto::verify_signature(alg, aik.public_key(), cert_info_bytes, sig)? {
            return Err(invalid_signature());
        }

        // 4. AIK certificate requirements
        check_aik_requirements(aik)?;
        check_aaguid_extension(aik, ctx.auth_data.aaguid())?;

        let mut result = AttestationResult::new(ctx, AttestationFormat::Tpm);
        result.attestation_type = AttestationType::AttCa;
        result.trust_path = chain;
        Ok(result)
    }
}
