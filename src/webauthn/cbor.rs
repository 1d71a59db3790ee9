//! CBOR processing for `WebAuthn`
//!
//! Decodes the CBOR subset used by attestation objects, attestation
//! statements, COSE keys and authenticator extensions: major types 0-5 and 7.
//! Item headers come from `ciborium_ll`. Tags and indefinite-length items
//! never appear in conforming `WebAuthn` payloads and are rejected. The
//! decoder is total: any byte string yields either a value or a
//! `WebAuthnError::Cbor`.

use std::collections::HashSet;

use ciborium_ll::{simple, Decoder, Header};

use super::buffer::ByteBuffer;
use super::errors::{Result, WebAuthnError};

/// Maximum nesting of arrays and maps
const MAX_DEPTH: usize = 64;

/// A decoded CBOR data item
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    /// Major type 0
    Unsigned(u64),
    /// Major type 1; the value is `-1 - n`
    Negative(u64),
    /// Major type 2
    Bytes(Vec<u8>),
    /// Major type 3
    Text(String),
    /// Major type 4
    Array(Vec<CborValue>),
    /// Major type 5, in encoded order
    Map(Vec<(CborValue, CborValue)>),
    /// Simple values 20 and 21
    Bool(bool),
    /// Simple values 22 (null) and 23 (undefined)
    Null,
    /// Half, single and double precision floats
    Float(f64),
}

impl CborValue {
    /// Integer value of major types 0 and 1
    #[must_use]
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Unsigned(n) => Some(i128::from(*n)),
            Self::Negative(n) => Some(-1 - i128::from(*n)),
            _ => None,
        }
    }

    /// Integer value if it fits in an `i64`
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|v| i64::try_from(v).ok())
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[CborValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&[(CborValue, CborValue)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by key
    #[must_use]
    pub fn get(&self, key: &CborValue) -> Option<&CborValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up a map entry by text key (attestation statements)
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<&CborValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Look up a map entry by integer key (COSE keys)
    #[must_use]
    pub fn get_int(&self, key: i64) -> Option<&CborValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_integer() == Some(i128::from(key)))
            .map(|(_, v)| v)
    }

    /// Human readable type name for error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unsigned(_) => "unsigned",
            Self::Negative(_) => "negative",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::Float(_) => "float",
        }
    }
}

/// Decode exactly one CBOR item spanning all of `bytes`
///
/// # Errors
/// Returns `Cbor` for malformed, truncated or unsupported input, and for
/// trailing bytes after the item.
pub fn decode(bytes: &[u8]) -> Result<CborValue> {
    let mut buf = ByteBuffer::new(bytes);
    let value = decode_from(&mut buf)?;
    if !buf.is_empty() {
        return Err(WebAuthnError::Cbor("trailing bytes".to_string()));
    }
    Ok(value)
}

/// Decode one CBOR item from the cursor, leaving it after the item
///
/// # Errors
/// Returns `Cbor` for malformed, truncated or unsupported input. The cursor
/// does not move after an error.
pub fn decode_from(buf: &mut ByteBuffer<'_>) -> Result<CborValue> {
    let input = buf.rest();
    let mut reader = Reader {
        decoder: Decoder::from(input),
        len: input.len(),
    };
    let value = reader.item(0)?;
    let consumed = reader.decoder.offset();
    buf.read_bytes(consumed)?;
    Ok(value)
}

fn cbor_error(msg: impl Into<String>) -> WebAuthnError {
    WebAuthnError::Cbor(msg.into())
}

fn truncated() -> WebAuthnError {
    cbor_error("truncated input")
}

/// Map keys compared for duplicates
#[derive(PartialEq, Eq, Hash)]
enum MapKey {
    Unsigned(u64),
    Negative(u64),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Null,
}

impl MapKey {
    fn from_value(value: &CborValue) -> Result<Self> {
        Ok(match value {
            CborValue::Unsigned(n) => Self::Unsigned(*n),
            CborValue::Negative(n) => Self::Negative(*n),
            CborValue::Bytes(b) => Self::Bytes(b.clone()),
            CborValue::Text(t) => Self::Text(t.clone()),
            CborValue::Bool(b) => Self::Bool(*b),
            CborValue::Null => Self::Null,
            other => {
                return Err(cbor_error(format!(
                    "unsupported map key type {}",
                    other.type_name()
                )))
            }
        })
    }
}

struct Reader<'a> {
    decoder: Decoder<&'a [u8]>,
    len: usize,
}

impl Reader<'_> {
    fn remaining(&mut self) -> usize {
        self.len.saturating_sub(self.decoder.offset())
    }

    fn header(&mut self) -> Result<Header> {
        self.decoder.pull().map_err(|err| match err {
            ciborium_ll::Error::Io(_) => truncated(),
            ciborium_ll::Error::Syntax(offset) => {
                cbor_error(format!("malformed item at offset {offset}"))
            }
        })
    }

    /// Every item takes at least one byte, so no count may exceed the input
    fn checked_len(&mut self, len: Option<usize>) -> Result<usize> {
        let len = len.ok_or_else(|| cbor_error("unsupported indefinite length"))?;
        if len > self.remaining() {
            return Err(truncated());
        }
        Ok(len)
    }

    fn payload(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut scratch = [0u8; 1024];
        let mut segments = self.decoder.bytes(Some(len));
        while let Some(mut segment) = segments.pull().map_err(|_| truncated())? {
            while let Some(chunk) = segment.pull(&mut scratch).map_err(|_| truncated())? {
                out.extend_from_slice(chunk);
            }
        }
        if out.len() != len {
            return Err(truncated());
        }
        Ok(out)
    }

    fn item(&mut self, depth: usize) -> Result<CborValue> {
        if depth > MAX_DEPTH {
            return Err(cbor_error("nesting too deep"));
        }

        match self.header()? {
            Header::Positive(n) => Ok(CborValue::Unsigned(n)),
            Header::Negative(n) => Ok(CborValue::Negative(n)),
            Header::Bytes(len) => {
                let len = self.checked_len(len)?;
                Ok(CborValue::Bytes(self.payload(len)?))
            }
            Header::Text(len) => {
                let len = self.checked_len(len)?;
                let text = String::from_utf8(self.payload(len)?)
                    .map_err(|_| cbor_error("invalid utf-8 in text string"))?;
                Ok(CborValue::Text(text))
            }
            Header::Array(len) => {
                let count = self.checked_len(len)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.item(depth + 1)?);
                }
                Ok(CborValue::Array(items))
            }
            Header::Map(len) => {
                let count = self.checked_len(len)?;
                let mut seen = HashSet::with_capacity(count);
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.item(depth + 1)?;
                    if !seen.insert(MapKey::from_value(&key)?) {
                        return Err(cbor_error("duplicate map key"));
                    }
                    let value = self.item(depth + 1)?;
                    entries.push((key, value));
                }
                Ok(CborValue::Map(entries))
            }
            Header::Simple(simple::FALSE) => Ok(CborValue::Bool(false)),
            Header::Simple(simple::TRUE) => Ok(CborValue::Bool(true)),
            Header::Simple(simple::NULL | simple::UNDEFINED) => Ok(CborValue::Null),
            Header::Simple(other) => Err(cbor_error(format!("unsupported simple value {other}"))),
            Header::Float(f) => Ok(CborValue::Float(f)),
            Header::Tag(tag) => Err(cbor_error(format!("unsupported tag {tag}"))),
            Header::Break => Err(cbor_error("unexpected break")),
        }
    }
}
