//! COSE credential public keys
//!
//! Converts the COSE_Key map found in attested credential data into a DER
//! `SubjectPublicKeyInfo` that the signature primitive can load directly.

use super::cbor::{self, CborValue};
use super::crypto;
use super::der::{self, oid};
use super::errors::{Result, WebAuthnError};

// COSE_Key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_N: i64 = -1;
const LABEL_E: i64 = -2;

/// COSE key type (`kty`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Okp,
    Ec2,
    Rsa,
}

impl KeyType {
    fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Okp),
            2 => Some(Self::Ec2),
            3 => Some(Self::Rsa),
            _ => None,
        }
    }
}

/// COSE signature algorithms accepted for credentials and attestation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
    EdDSA,
    RS256,
    RS384,
    RS512,
    PS256,
    /// RSASSA-PKCS1-v1_5 with SHA-1, only seen on TPM attestation
    RS1,
}

impl CoseAlgorithm {
    /// Resolve a COSE algorithm identifier
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::ES256),
            -35 => Some(Self::ES384),
            -36 => Some(Self::ES512),
            -8 => Some(Self::EdDSA),
            -257 => Some(Self::RS256),
            -258 => Some(Self::RS384),
            -259 => Some(Self::RS512),
            -37 => Some(Self::PS256),
            -65535 => Some(Self::RS1),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::ES384 => -35,
            Self::ES512 => -36,
            Self::EdDSA => -8,
            Self::RS256 => -257,
            Self::RS384 => -258,
            Self::RS512 => -259,
            Self::PS256 => -37,
            Self::RS1 => -65535,
        }
    }

    /// Resolve an identifier, failing with `UnsupportedAlgorithm`
    ///
    /// # Errors
    /// Returns `UnsupportedAlgorithm` for unknown identifiers.
    pub fn require(id: i64) -> Result<Self> {
        Self::from_id(id)
            .ok_or_else(|| WebAuthnError::UnsupportedAlgorithm(format!("unknown algorithm {id}")))
    }
}

/// Named curves for EC2 keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    #[must_use]
    pub fn from_cose(crv: i64) -> Option<Self> {
        match crv {
            1 => Some(Self::P256),
            2 => Some(Self::P384),
            3 => Some(Self::P521),
            _ => None,
        }
    }

    /// Coordinate length in bytes
    #[must_use]
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    #[must_use]
    pub fn oid(self) -> &'static str {
        match self {
            Self::P256 => oid::P256,
            Self::P384 => oid::P384,
            Self::P521 => oid::P521,
        }
    }
}

/// Key material, kept so other structures can be compared against it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParams {
    Ec2 { curve: EcCurve, x: Vec<u8>, y: Vec<u8> },
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Okp { x: Vec<u8> },
}

/// A credential public key ready for signature verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPublicKey {
    algorithm: CoseAlgorithm,
    params: KeyParams,
    spki: Vec<u8>,
    cose: Vec<u8>,
}

fn required_int(map: &CborValue, label: i64, name: &str) -> Result<i64> {
    map.get_int(label)
        .and_then(CborValue::as_i64)
        .ok_or_else(|| WebAuthnError::Cbor(format!("missing COSE {name}")))
}

fn required_bytes<'a>(map: &'a CborValue, label: i64, name: &str) -> Result<&'a [u8]> {
    map.get_int(label)
        .and_then(CborValue::as_bytes)
        .ok_or_else(|| WebAuthnError::Cbor(format!("missing COSE {name}")))
}

fn unsupported(msg: String) -> WebAuthnError {
    WebAuthnError::UnsupportedAlgorithm(msg)
}

impl CredentialPublicKey {
    /// Decode a standalone COSE_Key
    ///
    /// # Errors
    /// Returns `Cbor` for malformed CBOR or missing members and
    /// `UnsupportedAlgorithm` for key types, curves or algorithms this core
    /// cannot verify.
    pub fn from_cose(bytes: &[u8]) -> Result<Self> {
        let value = cbor::decode(bytes)?;
        Self::from_cbor(&value, bytes)
    }

    /// Build from an already decoded COSE_Key map and its encoding
    ///
    /// # Errors
    /// See [`CredentialPublicKey::from_cose`].
    pub fn from_cbor(value: &CborValue, encoded: &[u8]) -> Result<Self> {
        if value.as_map().is_none() {
            return Err(WebAuthnError::Cbor(format!(
                "COSE key must be a map, found {}",
                value.type_name()
            )));
        }

        let kty = required_int(value, LABEL_KTY, "kty")?;
        let alg = required_int(value, LABEL_ALG, "alg")?;
        let key_type = KeyType::from_id(kty)
            .ok_or_else(|| unsupported(format!("unsupported key type {kty}")))?;
        let algorithm = CoseAlgorithm::require(alg)?;

        let params = match key_type {
            KeyType::Ec2 => {
                if !matches!(
                    algorithm,
                    CoseAlgorithm::ES256 | CoseAlgorithm::ES384 | CoseAlgorithm::ES512
                ) {
                    return Err(unsupported(format!("algorithm {alg} is not valid for EC2")));
                }
                let crv = required_int(value, LABEL_CRV, "crv")?;
                let curve = EcCurve::from_cose(crv)
                    .ok_or_else(|| unsupported(format!("unsupported curve {crv}")))?;
                let x = required_bytes(value, LABEL_X, "x")?;
                let y = required_bytes(value, LABEL_Y, "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(unsupported("invalid EC coordinate length".to_string()));
                }
                KeyParams::Ec2 {
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                }
            }
            KeyType::Rsa => {
                if !matches!(
                    algorithm,
                    CoseAlgorithm::RS256
                        | CoseAlgorithm::RS384
                        | CoseAlgorithm::RS512
                        | CoseAlgorithm::PS256
                        | CoseAlgorithm::RS1
                ) {
                    return Err(unsupported(format!("algorithm {alg} is not valid for RSA")));
                }
                let n = required_bytes(value, LABEL_N, "n")?;
                let e = required_bytes(value, LABEL_E, "e")?;
                KeyParams::Rsa {
                    n: n.to_vec(),
                    e: e.to_vec(),
                }
            }
            KeyType::Okp => {
                if algorithm != CoseAlgorithm::EdDSA {
                    return Err(unsupported(format!("algorithm {alg} is not valid for OKP")));
                }
                let crv = required_int(value, LABEL_CRV, "crv")?;
                if crv != 6 {
                    return Err(unsupported(format!("unsupported curve {crv}")));
                }
                let x = required_bytes(value, LABEL_X, "x")?;
                if x.len() != 32 {
                    return Err(unsupported("invalid Ed25519 key length".to_string()));
                }
                KeyParams::Okp { x: x.to_vec() }
            }
        };

        let spki = match &params {
            KeyParams::Ec2 { curve, x, y } => der::ec_spki(curve.oid(), x, y),
            KeyParams::Rsa { n, e } => der::rsa_spki(n, e),
            KeyParams::Okp { x } => der::ed25519_spki(x),
        }
        .map_err(|e| unsupported(e.reason()))?;

        Ok(Self {
            algorithm,
            params,
            spki,
            cose: encoded.to_vec(),
        })
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self.params {
            KeyParams::Ec2 { .. } => KeyType::Ec2,
            KeyParams::Rsa { .. } => KeyType::Rsa,
            KeyParams::Okp { .. } => KeyType::Okp,
        }
    }

    #[must_use]
    pub fn params(&self) -> &KeyParams {
        &self.params
    }

    /// DER `SubjectPublicKeyInfo`
    #[must_use]
    pub fn spki(&self) -> &[u8] {
        &self.spki
    }

    /// The COSE_Key encoding as received
    #[must_use]
    pub fn cose(&self) -> &[u8] {
        &self.cose
    }

    /// Uncompressed `0x04||x||y` point of a P-256 key (FIDO U2F raw format)
    #[must_use]
    pub fn u2f_public_key(&self) -> Option<Vec<u8>> {
        match &self.params {
            KeyParams::Ec2 {
                curve: EcCurve::P256,
                x,
                y,
            } => {
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    /// Whether a certificate or other `SubjectPublicKeyInfo` holds this key
    #[must_use]
    pub fn matches_spki(&self, spki: &[u8]) -> bool {
        der::spki_matches(&self.spki, spki)
    }

    /// PEM encoding of the `SubjectPublicKeyInfo`
    #[must_use]
    pub fn to_pem(&self) -> String {
        der::to_pem("PUBLIC KEY", &self.spki)
    }

    /// Verify a signature made with this key under its own algorithm
    ///
    /// # Errors
    /// Returns `UnsupportedAlgorithm` if the key cannot be loaded.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool> {
        crypto::verify_signature(self.algorithm, &self.spki, data, signature)
    }
}
