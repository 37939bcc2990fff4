//! Metadata tables
//!
//! The free list and bucket index persisted after the data region of every
//! backing file. Layout:
//!
//! ```text
//! [FreeListLen: u16 LE]      byte length of the packed free list
//! [Free list]                offset pairs packed into 3 bytes each
//! [Chains]                   repeated [Bucket: i32 LE][Offset: u16 LE]
//! ```
//!
//! Free-list entries are stored as `offset + 1` in 12 bits so that a zero
//! half-entry can mark the absent second member of an odd-length list:
//! two offsets pack as `((a+1) << 12) | (b+1)` into 3 big-endian bytes.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut};

use crate::error::{Result, SlabError};

/// One bucket's collision chain: block offsets in write order.
pub(crate) type Chain = Vec<u16>;

/// In-memory image of a backing file's metadata region
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Tables {
    /// Offsets of free blocks, in release order
    pub free: Vec<u16>,
    /// Bucket index: bucket number to collision chain
    pub chains: BTreeMap<i32, Chain>,
}

/// Largest offset the 12-bit packed encoding can carry.
const MAX_PACKED_OFFSET: u16 = 4094;

impl Tables {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let free_bytes = encode_free_list(&self.free)?;

        let mut buf = Vec::with_capacity(2 + free_bytes.len() + self.chain_entries() * 6);
        buf.put_u16_le(free_bytes.len() as u16);
        buf.put_slice(&free_bytes);
        for (&bucket, chain) in &self.chains {
            for &offset in chain {
                buf.put_i32_le(bucket);
                buf.put_u16_le(offset);
            }
        }
        Ok(buf)
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(SlabError::CorruptTable(
                "metadata region shorter than its length prefix".to_string(),
            ));
        }
        let free_len = bytes.get_u16_le() as usize;
        if free_len > bytes.len() {
            return Err(SlabError::CorruptTable(format!(
                "free list declares {free_len} bytes but {} remain",
                bytes.len()
            )));
        }
        let free = decode_free_list(&bytes[..free_len])?;
        bytes.advance(free_len);

        if bytes.len() % 6 != 0 {
            return Err(SlabError::CorruptTable(format!(
                "chain table length {} is not a multiple of 6",
                bytes.len()
            )));
        }
        let mut chains: BTreeMap<i32, Chain> = BTreeMap::new();
        while bytes.has_remaining() {
            let bucket = bytes.get_i32_le();
            let offset = bytes.get_u16_le();
            chains.entry(bucket).or_default().push(offset);
        }
        Ok(Self { free, chains })
    }

    fn chain_entries(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }
}

fn encode_free_list(free: &[u16]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity((free.len() + 1) / 2 * 3);
    for pair in free.chunks(2) {
        let first = packed_value(pair[0])?;
        let second = match pair.get(1) {
            Some(&offset) => packed_value(offset)?,
            None => 0,
        };
        let word: u32 = (first << 12) | second;
        buf.put_u8((word >> 16) as u8);
        buf.put_u8((word >> 8) as u8);
        buf.put_u8(word as u8);
    }
    Ok(buf)
}

fn packed_value(offset: u16) -> Result<u32> {
    if offset > MAX_PACKED_OFFSET {
        return Err(SlabError::InvalidArgument(format!(
            "free offset {offset} exceeds {MAX_PACKED_OFFSET}"
        )));
    }
    Ok(offset as u32 + 1)
}

fn decode_free_list(bytes: &[u8]) -> Result<Vec<u16>> {
    if bytes.len() % 3 != 0 {
        return Err(SlabError::CorruptTable(format!(
            "free list length {} is not a multiple of 3",
            bytes.len()
        )));
    }
    let mut free = Vec::with_capacity(bytes.len() / 3 * 2);
    for triple in bytes.chunks_exact(3) {
        let word =
            ((triple[0] as u32) << 16) | ((triple[1] as u32) << 8) | triple[2] as u32;
        let first = word >> 12;
        let second = word & 0xFFF;
        if first == 0 {
            return Err(SlabError::CorruptTable(
                "free list entry with empty first member".to_string(),
            ));
        }
        free.push((first - 1) as u16);
        if second > 0 {
            free.push((second - 1) as u16);
        }
    }
    Ok(free)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(tables: &Tables) {
        let encoded = tables.encode().unwrap();
        assert_eq!(&Tables::decode(&encoded).unwrap(), tables);
    }

    #[test]
    fn empty_tables() {
        round_trip(&Tables::default());
    }

    #[test]
    fn free_list_even_and_odd_lengths() {
        round_trip(&Tables {
            free: vec![0, 4094],
            chains: BTreeMap::new(),
        });
        round_trip(&Tables {
            free: vec![12, 700, 3069],
            chains: BTreeMap::new(),
        });
    }

    #[test]
    fn chains_preserve_order_within_bucket() {
        let mut chains = BTreeMap::new();
        chains.insert(-42, vec![900, 14, 512]);
        chains.insert(7, vec![2]);
        round_trip(&Tables {
            free: vec![100],
            chains,
        });
    }

    #[test]
    fn offset_zero_survives_the_bias() {
        round_trip(&Tables {
            free: vec![0],
            chains: BTreeMap::new(),
        });
    }

    #[test]
    fn rejects_truncated_tables() {
        assert!(matches!(
            Tables::decode(&[1]),
            Err(SlabError::CorruptTable(_))
        ));
        // Declares 3 free-list bytes but holds none.
        assert!(matches!(
            Tables::decode(&[3, 0]),
            Err(SlabError::CorruptTable(_))
        ));
        // Misaligned chain table.
        assert!(matches!(
            Tables::decode(&[0, 0, 1, 2, 3]),
            Err(SlabError::CorruptTable(_))
        ));
    }

    #[test]
    fn rejects_oversized_free_offset() {
        let tables = Tables {
            free: vec![4095],
            chains: BTreeMap::new(),
        };
        assert!(matches!(
            tables.encode(),
            Err(SlabError::InvalidArgument(_))
        ));
    }
}
