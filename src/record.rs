//! Record Codec
//!
//! Frames a (key, value) pair as a self-describing byte record and derives
//! the hash bucket a key's records chain under.
//!
//! ## Record Format
//! ```text
//! ┌──────────────────┬───────────┬─────────────────┐
//! │ KeyLen: u16 (LE) │ Key bytes │ Value bytes ... │
//! └──────────────────┴───────────┴─────────────────┘
//! ```
//!
//! There is deliberately no value-length field: a record always fills its
//! block's declared payload, so the value's length is whatever remains
//! after the key prefix and key bytes. Block sizing and value length are
//! coupled by design.

use bytes::{Buf, BufMut};

use crate::error::{Result, SlabError};

/// Size of the key-length prefix.
pub const KEY_PREFIX_SIZE: usize = 2;

/// Encode a (key, value) pair into one record payload.
///
/// Fails with `KeyTooLarge` if the key cannot be framed at all. Whether
/// the record fits a particular backing file is the caller's check.
pub fn encode(key: &str, value: &[u8]) -> Result<Vec<u8>> {
    let key_bytes = key.as_bytes();
    if key_bytes.len() > u16::MAX as usize {
        return Err(SlabError::KeyTooLarge);
    }

    let mut buf = Vec::with_capacity(KEY_PREFIX_SIZE + key_bytes.len() + value.len());
    buf.put_u16_le(key_bytes.len() as u16);
    buf.put_slice(key_bytes);
    buf.put_slice(value);
    Ok(buf)
}

/// Read the key of a record without copying the value.
pub fn peek_key(record: &[u8]) -> Result<&str> {
    let (key, _) = split(record)?;
    Ok(key)
}

/// The value portion of a record: everything after the key.
pub fn value_bytes(record: &[u8]) -> Result<&[u8]> {
    let (_, value) = split(record)?;
    Ok(value)
}

/// Decode a record into owned (key, value) parts.
pub fn decode(record: &[u8]) -> Result<(String, Vec<u8>)> {
    let (key, value) = split(record)?;
    Ok((key.to_string(), value.to_vec()))
}

fn split(record: &[u8]) -> Result<(&str, &[u8])> {
    if record.len() < KEY_PREFIX_SIZE {
        return Err(SlabError::InvalidArgument(format!(
            "record too short for key prefix: {} bytes",
            record.len()
        )));
    }
    let mut prefix = &record[..KEY_PREFIX_SIZE];
    let key_len = prefix.get_u16_le() as usize;
    let rest = &record[KEY_PREFIX_SIZE..];
    if key_len > rest.len() {
        return Err(SlabError::InvalidArgument(format!(
            "record declares {} key bytes but holds {}",
            key_len,
            rest.len()
        )));
    }
    let key = std::str::from_utf8(&rest[..key_len])
        .map_err(|e| SlabError::InvalidArgument(format!("key is not valid UTF-8: {e}")))?;
    Ok((key, &rest[key_len..]))
}

/// Deterministic bucket hash of a key, folded into the signed 32-bit range.
///
/// Non-cryptographic; collisions are expected and handled by chaining.
pub fn bucket_of(key: &str) -> i32 {
    crc32fast::hash(key.as_bytes()) as i32
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let record = encode("name", b"alice").unwrap();
        assert_eq!(peek_key(&record).unwrap(), "name");
        assert_eq!(value_bytes(&record).unwrap(), b"alice");
        let (key, value) = decode(&record).unwrap();
        assert_eq!(key, "name");
        assert_eq!(value, b"alice");
    }

    #[test]
    fn empty_value() {
        let record = encode("k", b"").unwrap();
        assert_eq!(record.len(), KEY_PREFIX_SIZE + 1);
        assert_eq!(value_bytes(&record).unwrap(), b"");
    }

    #[test]
    fn empty_key() {
        let record = encode("", b"v").unwrap();
        assert_eq!(peek_key(&record).unwrap(), "");
        assert_eq!(value_bytes(&record).unwrap(), b"v");
    }

    #[test]
    fn truncated_record_rejected() {
        assert!(matches!(
            peek_key(&[7]),
            Err(SlabError::InvalidArgument(_))
        ));
        // Declares 300 key bytes, holds 2.
        let mut record = Vec::new();
        record.extend_from_slice(&300u16.to_le_bytes());
        record.extend_from_slice(b"ab");
        assert!(matches!(
            peek_key(&record),
            Err(SlabError::InvalidArgument(_))
        ));
    }

    #[test]
    fn bucket_is_deterministic() {
        assert_eq!(bucket_of("foo"), bucket_of("foo"));
        assert_ne!(bucket_of("foo"), bucket_of("Foo"));
    }
}
