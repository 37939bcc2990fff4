//! Single File Store
//!
//! Manages one fixed-capacity binary backing file: a best-fit free-space
//! allocator, a hash-bucket collision index, and a compaction routine.
//! Payloads are opaque byte blobs; the store never interprets record
//! contents except where the node layer asks it to.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Data region [0, L)                                           │
//! │   Block: [Descriptor: u16 BE][Payload][Slack 0..=7]          │
//! │   ... blocks tile the region contiguously ...                │
//! ├──────────────────────────────────────────────────────────────┤ offset L
//! │ Metadata tables                                              │
//! │   [FreeListLen: u16 LE]                                      │
//! │   [Free list: offset pairs packed as 12-bit (off+1) values]  │
//! │   [Chains: repeated [Bucket: i32 LE][Offset: u16 LE]]        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Descriptor bit layout (big-endian u16):
//! bit 15 = occupied flag, bits 14..3 = payload capacity minus one,
//! bits 2..0 = trailing slack count.

mod descriptor;
mod file;
mod tables;

pub use descriptor::Descriptor;
pub use file::FileStore;
pub(crate) use tables::Tables;

// =============================================================================
// Shared Constants
// =============================================================================

/// Boundary descriptor size in bytes
pub const DESCRIPTOR_SIZE: usize = 2;

/// Largest payload capacity a descriptor can express (12-bit field, +1 bias)
pub const MAX_BLOCK_CAPACITY: usize = 4096;

/// Largest trailing slack a descriptor can express (3-bit field).
/// Slack is unused space after a payload too small to host its own
/// descriptor, so it can never be independently allocated.
pub const MAX_TRAILING_SLACK: usize = 7;

/// Largest allowed backing file length. Free-list entries store
/// `offset + 1` in 12 bits, so offsets must stay below 4095.
pub const MAX_FILE_LENGTH: u16 = 4095;
