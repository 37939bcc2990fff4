//! Boundary descriptor
//!
//! The 2-byte header prefixed to every block in the data region. Packs
//! three fields into a big-endian u16 with named bit widths:
//!
//! ```text
//! ┌───────────┬────────────────────────┬───────────┐
//! │ bit 15    │ bits 14..3             │ bits 2..0 │
//! │ occupied  │ capacity - 1 (12 bits) │ slack     │
//! └───────────┴────────────────────────┴───────────┘
//! ```

use crate::error::{Result, SlabError};

use super::{DESCRIPTOR_SIZE, MAX_BLOCK_CAPACITY, MAX_TRAILING_SLACK};

const CAPACITY_BITS: u32 = 12;
const SLACK_BITS: u32 = 3;
const OCCUPIED_BIT: u16 = 1 << (CAPACITY_BITS + SLACK_BITS);
const CAPACITY_MASK: u16 = ((1 << CAPACITY_BITS) - 1) << SLACK_BITS;
const SLACK_MASK: u16 = (1 << SLACK_BITS) - 1;

/// Decoded boundary descriptor of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Whether the block holds a record
    pub occupied: bool,
    /// Payload capacity in bytes, in `[1, 4096]`
    pub capacity: u16,
    /// Trailing slack bytes after the payload, in `[0, 7]`
    pub slack: u8,
}

impl Descriptor {
    pub fn occupied(capacity: usize, slack: usize) -> Result<Self> {
        Self::new(true, capacity, slack)
    }

    /// Free blocks never carry slack; a freed block absorbs its old slack
    /// into its capacity instead.
    pub fn free(capacity: usize) -> Result<Self> {
        Self::new(false, capacity, 0)
    }

    fn new(occupied: bool, capacity: usize, slack: usize) -> Result<Self> {
        if capacity < 1 || capacity > MAX_BLOCK_CAPACITY {
            return Err(SlabError::InvalidArgument(format!(
                "block capacity {capacity} outside [1, {MAX_BLOCK_CAPACITY}]"
            )));
        }
        if slack > MAX_TRAILING_SLACK {
            return Err(SlabError::InvalidArgument(format!(
                "trailing slack {slack} exceeds {MAX_TRAILING_SLACK}"
            )));
        }
        Ok(Self {
            occupied,
            capacity: capacity as u16,
            slack: slack as u8,
        })
    }

    /// Bytes the block spans on disk: descriptor + payload + slack.
    pub fn extent(&self) -> usize {
        DESCRIPTOR_SIZE + self.capacity as usize + self.slack as usize
    }

    pub fn encode(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut word: u16 = 0;
        if self.occupied {
            word |= OCCUPIED_BIT;
        }
        word |= (self.capacity - 1) << SLACK_BITS;
        word |= self.slack as u16 & SLACK_MASK;
        word.to_be_bytes()
    }

    /// Total: every 16-bit pattern maps to in-range fields.
    pub fn decode(bytes: [u8; DESCRIPTOR_SIZE]) -> Self {
        let word = u16::from_be_bytes(bytes);
        Self {
            occupied: word & OCCUPIED_BIT != 0,
            capacity: ((word & CAPACITY_MASK) >> SLACK_BITS) + 1,
            slack: (word & SLACK_MASK) as u8,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_fields() {
        for &(occupied, capacity, slack) in &[
            (true, 1, 0),
            (true, 4096, 7),
            (false, 3070, 0),
            (true, 2048, 3),
            (true, 17, 2),
        ] {
            let desc = Descriptor::new(occupied, capacity, slack).unwrap();
            let decoded = Descriptor::decode(desc.encode());
            assert_eq!(decoded, desc, "capacity={capacity} slack={slack}");
        }
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Descriptor::occupied(0, 0).is_err());
        assert!(Descriptor::occupied(4097, 0).is_err());
        assert!(Descriptor::occupied(10, 8).is_err());
    }

    #[test]
    fn extent_counts_descriptor() {
        let desc = Descriptor::occupied(10, 2).unwrap();
        assert_eq!(desc.extent(), 14);
    }
}
