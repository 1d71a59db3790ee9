//! Authenticator data parsing
//!
//! Layout: `rpIdHash(32) || flags(1) || signCount(4, BE)`, then attested
//! credential data when AT is set and a CBOR extensions map when ED is set.

use super::buffer::ByteBuffer;
use super::cbor::{self, CborValue};
use super::cose::CredentialPublicKey;
use super::errors::{Result, WebAuthnError};

/// Authenticator data flag bits
pub mod flags {
    /// User present
    pub const UP: u8 = 0x01;
    /// User verified
    pub const UV: u8 = 0x04;
    /// Backup eligible
    pub const BE: u8 = 0x08;
    /// Backed up
    pub const BS: u8 = 0x10;
    /// Attested credential data included
    pub const AT: u8 = 0x40;
    /// Extension data included
    pub const ED: u8 = 0x80;
}

const HEADER_LEN: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub credential_public_key: CredentialPublicKey,
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    raw: Vec<u8>,
    rp_id_hash: [u8; 32],
    flags: u8,
    sign_count: u32,
    attested_credential_data: Option<AttestedCredentialData>,
    extensions: Option<CborValue>,
}

fn truncated() -> WebAuthnError {
    WebAuthnError::Authenticator("truncated authenticator data".to_string())
}

fn inconsistent() -> WebAuthnError {
    WebAuthnError::Authenticator("inconsistent flags".to_string())
}

impl AuthenticatorData {
    /// Parse raw authenticator data
    ///
    /// # Errors
    /// Returns `Authenticator("truncated authenticator data")` for short
    /// input, `Authenticator("inconsistent flags")` when AT or ED is set with
    /// nothing following or BS is set without BE, and `Cbor`/`UnsupportedAlgorithm`
    /// for a bad credential public key.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(truncated());
        }
        let mut buf = ByteBuffer::new(raw);
        let rp_id_hash = buf.read_array::<32>().map_err(|_| truncated())?;
        let flag_bits = buf.read_u8().map_err(|_| truncated())?;
        let sign_count = buf.read_u32().map_err(|_| truncated())?;

        if flag_bits & flags::BS != 0 && flag_bits & flags::BE == 0 {
            return Err(inconsistent());
        }

        let attested_credential_data = if flag_bits & flags::AT == 0 {
            None
        } else {
            if buf.is_empty() {
                return Err(inconsistent());
            }
            let aaguid = buf.read_array::<16>().map_err(|_| truncated())?;
            let id_len = buf.read_u16().map_err(|_| truncated())?;
            let credential_id = buf
                .read_bytes(usize::from(id_len))
                .map_err(|_| truncated())?
                .to_vec();
            if buf.is_empty() {
                return Err(truncated());
            }
            let key_start = buf.position();
            let key_value = cbor::decode_from(&mut buf)?;
            let key_bytes = &raw[key_start..buf.position()];
            let credential_public_key = CredentialPublicKey::from_cbor(&key_value, key_bytes)?;
            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                credential_public_key,
            })
        };

        let extensions = if flag_bits & flags::ED == 0 {
            None
        } else {
            if buf.is_empty() {
                return Err(inconsistent());
            }
            let value = cbor::decode_from(&mut buf)?;
            if value.as_map().is_none() {
                return Err(WebAuthnError::Authenticator(
                    "extensions must be a map".to_string(),
                ));
            }
            Some(value)
        };

        if !buf.is_empty() {
            return Err(WebAuthnError::Authenticator(
                "trailing authenticator data".to_string(),
            ));
        }

        Ok(Self {
            raw: raw.to_vec(),
            rp_id_hash,
            flags: flag_bits,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    #[must_use]
    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    #[must_use]
    pub fn is_user_present(&self) -> bool {
        self.flags & flags::UP != 0
    }

    #[must_use]
    pub fn is_user_verified(&self) -> bool {
        self.flags & flags::UV != 0
    }

    #[must_use]
    pub fn is_backup_eligible(&self) -> bool {
        self.flags & flags::BE != 0
    }

    #[must_use]
    pub fn is_backed_up(&self) -> bool {
        self.flags & flags::BS != 0
    }

    #[must_use]
    pub fn attested_credential_data(&self) -> Option<&AttestedCredentialData> {
        self.attested_credential_data.as_ref()
    }

    #[must_use]
    pub fn aaguid(&self) -> Option<&[u8; 16]> {
        self.attested_credential_data.as_ref().map(|a| &a.aaguid)
    }

    #[must_use]
    pub fn credential_id(&self) -> Option<&[u8]> {
        self.attested_credential_data
            .as_ref()
            .map(|a| a.credential_id.as_slice())
    }

    #[must_use]
    pub fn credential_public_key(&self) -> Option<&CredentialPublicKey> {
        self.attested_credential_data
            .as_ref()
            .map(|a| &a.credential_public_key)
    }

    /// Raw `0x04||x||y` credential key for FIDO U2F verification data
    #[must_use]
    pub fn u2f_public_key(&self) -> Option<Vec<u8>> {
        self.credential_public_key()?.u2f_public_key()
    }

    #[must_use]
    pub fn extensions(&self) -> Option<&CborValue> {
        self.extensions.as_ref()
    }
}
