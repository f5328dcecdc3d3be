//! Canonical CBOR encoding of persisted ledger state.
//!
//! Snapshots are hashed into a state root, so the same state must always
//! encode to the same bytes. Encoded values are checked for the RFC 8949
//! section 4.2 rules that `ciborium` does not enforce on its own:
//! no indefinite-length items and minimal-length arguments. Map key order
//! follows from every persisted map being a `BTreeMap`.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("CBOR encoding error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("non-canonical CBOR: {0}")]
    NonCanonical(&'static str),

    #[error("truncated CBOR item")]
    Truncated,

    #[error("unsupported format version {0}")]
    Version(u8),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Serialize a value to canonical CBOR bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    verify_canonical(&buf)?;
    Ok(buf)
}

/// Deserialize a value, rejecting non-canonical input.
pub fn from_canonical_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    verify_canonical(bytes)?;
    Ok(ciborium::from_reader(bytes)?)
}

/// Nesting limit for arrays, maps and tags, matching ciborium's default
/// recursion limit.
pub const MAX_DEPTH: usize = 256;

/// Walk one top-level item and require that it spans the whole input.
pub fn verify_canonical(bytes: &[u8]) -> Result<()> {
    let mut reader = bytes;
    verify_item(&mut reader, 0)?;
    if !reader.is_empty() {
        return Err(SerializationError::NonCanonical("trailing bytes"));
    }
    Ok(())
}

/// Split `len` bytes off the front of `reader`.
fn take<'a>(reader: &mut &'a [u8], len: u64) -> Result<&'a [u8]> {
    let len = usize::try_from(len).map_err(|_| SerializationError::Truncated)?;
    if len > reader.len() {
        return Err(SerializationError::Truncated);
    }
    let (head, rest) = reader.split_at(len);
    *reader = rest;
    Ok(head)
}

/// Read the argument encoded by `info`, enforcing the shortest form.
fn read_argument(reader: &mut &[u8], info: u8) -> Result<u64> {
    let width = match info {
        0..=23 => return Ok(u64::from(info)),
        24 => 1,
        25 => 2,
        26 => 4,
        27 => 8,
        31 => return Err(SerializationError::NonCanonical("indefinite-length item")),
        _ => return Err(SerializationError::NonCanonical("reserved additional info")),
    };
    let value = take(reader, width)?
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let min = match width {
        1 => 24,
        2 => 0x100,
        4 => 0x1_0000,
        _ => 0x1_0000_0000,
    };
    if value < min {
        return Err(SerializationError::NonCanonical("non-minimal argument"));
    }
    Ok(value)
}

fn verify_item(reader: &mut &[u8], depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(SerializationError::NonCanonical("nesting too deep"));
    }
    let head = take(reader, 1)?[0];
    let major = head >> 5;
    let info = head & 0x1F;

    if major == 7 {
        // Simple values and floats carry no nested items; floats are
        // fixed-width and skipped without a minimality check.
        let width = match info {
            24 => 1,
            25 => 2,
            26 => 4,
            27 => 8,
            31 => return Err(SerializationError::NonCanonical("unexpected break")),
            _ => 0,
        };
        return take(reader, width).map(drop);
    }

    let argument = read_argument(reader, info)?;
    match major {
        0 | 1 => Ok(()),
        2 | 3 => take(reader, argument).map(drop),
        4 => (0..argument).try_for_each(|_| verify_item(&mut *reader, depth + 1)),
        5 => (0..argument).try_for_each(|_| {
            verify_item(&mut *reader, depth + 1)?;
            verify_item(&mut *reader, depth + 1)
        }),
        _ => verify_item(&mut *reader, depth + 1),
    }
}
