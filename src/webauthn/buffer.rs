//! Bounds-checked binary cursor and base64url codec
//!
//! Authenticator data, TPM structures and DER all arrive as raw bytes from an
//! untrusted client. [`ByteBuffer`] is the single place where offsets are
//! advanced, so every parser gets the same underrun behaviour.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::errors::{Result, WebAuthnError};

/// Read cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteBuffer<'a> {
    /// Create a cursor positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of unread bytes
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor reached the end
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Current offset from the start of the underlying slice
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unread tail, without advancing
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Bytes consumed so far
    #[must_use]
    pub fn consumed(&self) -> &'a [u8] {
        &self.data[..self.pos]
    }

    /// Read `len` raw bytes
    ///
    /// # Errors
    /// Returns `BufferUnderrun` if fewer than `len` bytes remain. The cursor
    /// does not move on failure.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(WebAuthnError::BufferUnderrun {
                requested: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a fixed-size array
    ///
    /// # Errors
    /// Returns `BufferUnderrun` if fewer than `N` bytes remain.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Look at the next byte without consuming it
    ///
    /// # Errors
    /// Returns `BufferUnderrun` at the end of the buffer.
    pub fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(WebAuthnError::BufferUnderrun {
                requested: 1,
                remaining: 0,
            })
    }

    /// Read one byte
    ///
    /// # Errors
    /// Returns `BufferUnderrun` at the end of the buffer.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a big-endian `u16`
    ///
    /// # Errors
    /// Returns `BufferUnderrun` if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian `u32`
    ///
    /// # Errors
    /// Returns `BufferUnderrun` if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian `u64`
    ///
    /// # Errors
    /// Returns `BufferUnderrun` if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a `u16` length prefix followed by that many bytes (TPM2B layout)
    ///
    /// # Errors
    /// Returns `BufferUnderrun` if the prefix or the body is truncated.
    pub fn read_sized_u16(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = usize::from(self.read_u16()?);
        self.read_bytes(len).inspect_err(|_| self.pos = start)
    }
}

/// Encode bytes as unpadded base64url
#[must_use]
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode base64url, tolerating trailing `=` padding
///
/// # Errors
/// Returns `Encoding` if the input contains characters outside the base64url
/// alphabet or has an impossible length.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|e| WebAuthnError::Encoding(format!("invalid base64url: {e}")))
}
