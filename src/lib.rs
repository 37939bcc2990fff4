//! # slabkv
//!
//! The local storage engine of a sharded key-value store:
//! - Fixed-capacity backing files with 2-byte block descriptors
//! - Best-fit free-space allocation with compact-and-retry
//! - Hash-bucket collision chaining within each file
//! - Value fragmentation across files, with a case-insensitive alias index
//! - Missing-file repair that keeps the index document consistent
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Network / Coordinator (external)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ write / read / delete / list / clear
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Node                                 │
//! │   key hashing · fragmentation · aliases · repair            │
//! └──────┬──────────────────────────────────────┬───────────────┘
//!        │                                      │
//!        ▼                                      ▼
//! ┌─────────────┐                      ┌─────────────────┐
//! │  FileStore  │  ... one per file    │  Index Document │
//! │ (allocator, │                      │ (capacities,    │
//! │  chains,    │                      │  fragments,     │
//! │  compaction)│                      │  aliases)       │
//! └─────────────┘                      └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod flock;
pub mod index;
pub mod node;
pub mod record;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{Result, SlabError};
pub use node::{ByteRange, Node, FULL_RANGE};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of slabkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
