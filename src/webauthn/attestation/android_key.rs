//! `android-key` attestation from the Android Keystore
//!
//! The attestation certificate carries a `KeyDescription` extension whose
//! challenge must equal the client data hash.

use der_parser::ber::BerObjectContent;
use der_parser::error::{BerError, BerResult};
use x509_parser::oid_registry::Oid;

use super::{
    attestation_err, invalid_signature, stmt_alg, stmt_bytes, stmt_x5c, AttestationFormat,
    AttestationFormatValidator, AttestationResult, AttestationType, VerificationContext,
};
use crate::webauthn::cbor::CborValue;
use crate::webauthn::crypto;
use crate::webauthn::errors::{Result, WebAuthnError};

/// Android key attestation `KeyDescription`
const ANDROID_KEY_ATTESTATION: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

const KM_PURPOSE_SIGN: u32 = 2;
const KM_ORIGIN_GENERATED: u32 = 0;

#[derive(Debug, Clone, Copy, Default)]
pub struct AndroidKeyValidator;

/// The AuthorizationList entries this validator looks at
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthorizationList {
    all_applications: bool,
    origin: Option<u32>,
    purposes: Vec<u32>,
}

/// `[1] EXPLICIT SET OF INTEGER`
fn parse_purposes(i: &[u8]) -> BerResult<'_, Vec<u32>> {
    use der_parser::der::*;
    parse_der_container(|i: &[u8], _| {
        let mut purposes = Vec::new();
        let mut i = i;
        while !i.is_empty() {
            let (rest, purpose) = parse_der_integer(i)?;
            purposes.push(purpose.as_u32()?);
            i = rest;
        }
        Ok((i, purposes))
    })(i)
}

impl AuthorizationList {
    fn parse(i: &[u8]) -> BerResult<'_, Self> {
        use der_parser::der::*;
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }

            let mut list = AuthorizationList::default();
            let mut i = i;
            while !i.is_empty() {
                let (rest, obj) = parse_der(i)?;
                i = rest;
                match obj.tag() {
                    Tag(600) => list.all_applications = true,
                    Tag(702) => {
                        if let BerObjectContent::Unknown(o) = obj.content {
                            let (_, origin) = parse_der_integer(o.data)?;
                            list.origin = Some(origin.as_u32()?);
                        }
                    }
                    Tag(1) => {
                        if let BerObjectContent::Unknown(o) = obj.content {
                            let (_, purposes) = parse_purposes(o.data)?;
                            list.purposes.extend(purposes);
                        }
                    }
                    _ => {}
                }
            }
            Ok((i, list))
        })(i)
    }
}

/// ```text
/// KeyDescription ::= SEQUENCE {
///     attestationVersion        INTEGER,
///     attestationSecurityLevel  ENUMERATED,
///     keymasterVersion          INTEGER,
///     keymasterSecurityLevel    ENUMERATED,
///     attestationChallenge      OCTET STRING,
///     uniqueId                  OCTET STRING,
///     softwareEnforced          AuthorizationList,
///     teeEnforced               AuthorizationList }
/// ```
#[derive(Debug)]
struct KeyDescription {
    attestation_challenge: Vec<u8>,
    software_enforced: AuthorizationList,
    tee_enforced: AuthorizationList,
}

impl KeyDescription {
    fn parse(i: &[u8]) -> BerResult<'_, Self> {
        use der_parser::der::*;
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, _) = parse_der_integer(i)?; // attestationVersion
            let (i, _) = parse_der_enum(i)?;
            let (i, _) = parse_der_integer(i)?; // keymasterVersion
            let (i, _) = parse_der_enum(i)?;
            let (i, challenge) = parse_der_octetstring(i)?;
            let attestation_challenge = challenge.as_slice()?.to_vec();
            let (i, _unique_id) = parse_der_octetstring(i)?;
            let (i, software_enforced) = AuthorizationList::parse(i)?;
            let (i, tee_enforced) = AuthorizationList::parse(i)?;

            Ok((
                i,
                KeyDescription {
                    attestation_challenge,
                    software_enforced,
                    tee_enforced,
                },
            ))
        })(i)
    }

    fn from_extension(value: &[u8]) -> Result<Self> {
        Self::parse(value)
            .map(|(_, description)| description)
            .map_err(|e| WebAuthnError::Der(format!("invalid key description: {e}")))
    }
}

impl AttestationFormatValidator for AndroidKeyValidator {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::AndroidKey
    }

    fn validate(
        &self,
        att_stmt: &CborValue,
        ctx: &VerificationContext<'_>,
    ) -> Result<AttestationResult> {
        let alg = stmt_alg(att_stmt)?;
        let sig = stmt_bytes(att_stmt, "sig")?;
        let chain = stmt_x5c(att_stmt)?.ok_or_else(|| attestation_err("missing x5c"))?;
        let leaf = &chain[0];

        // 1. Signature over authData || clientDataHash with the leaf key
        if !crypto::verify_signature(alg, leaf.public_key(), &ctx.signed_data(), sig)? {
            return Err(invalid_signature());
        }

        // 2. The attested key is the credential key
        if !ctx.credential_public_key()?.matches_spki(leaf.public_key()) {
            return Err(attestation_err("credential key does not match attestation certificate"));
        }

        // 3. The key description binds this ceremony
        let extension = leaf
            .extension(&ANDROID_KEY_ATTESTATION)
            .ok_or_else(|| attestation_err("missing android key attestation extension"))?;
        let description = KeyDescription::from_extension(&extension.value)?;
        if description.attestation_challenge != ctx.client_data_hash.as_slice() {
            return Err(attestation_err("invalid attestation challenge"));
        }

        // 4. Bound to this app, generated in the keystore, usable for signing
        let software = &description.software_enforced;
        let tee = &description.tee_enforced;
        if software.all_applications || tee.all_applications {
            return Err(attestation_err("key is bound to all applications"));
        }
        if tee.origin.or(software.origin) != Some(KM_ORIGIN_GENERATED) {
            return Err(attestation_err("key was not generated in the keystore"));
        }
        if !tee
            .purposes
            .iter()
            .chain(&software.purposes)
            .any(|purpose| *purpose == KM_PURPOSE_SIGN)
        {
            return Err(attestation_err("key purpose does not include signing"));
        }

        let mut result = AttestationResult::new(ctx, AttestationFormat::AndroidKey);
        result.attestation_type = AttestationType::Basic;
        result.trust_path = chain;
        Ok(result)
    }
}
