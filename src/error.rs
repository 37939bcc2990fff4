//! Error types for slabkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using SlabError
pub type Result<T> = std::result::Result<T, SlabError>;

/// Unified error type for slabkv operations
#[derive(Debug, Error)]
pub enum SlabError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A backing file that should exist does not. The node layer catches
    /// this, runs repair, and resurfaces it as `KeyNotFound`.
    #[error("backing file not found: {0}")]
    FileNotFound(PathBuf),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    /// Best-fit allocation failed even after compaction.
    #[error("no space left in {0} for {1} bytes")]
    OutOfSpace(PathBuf, usize),

    /// Out-of-range chain index, bucket, payload size, or field value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The metadata region of a backing file could not be decoded.
    /// Fatal for that file; never retried.
    #[error("corrupt metadata tables: {0}")]
    CorruptTable(String),

    // -------------------------------------------------------------------------
    // Key-Value Errors
    // -------------------------------------------------------------------------
    #[error("key not found")]
    KeyNotFound,

    #[error("key does not fit a single storage file")]
    KeyTooLarge,

    /// Put of an existing key, or create of an existing path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("value is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    /// Another process holds the directory lock.
    #[error("storage directory is locked: {0}")]
    Locked(PathBuf),
}

impl From<bincode::Error> for SlabError {
    fn from(err: bincode::Error) -> Self {
        SlabError::Serialization(err.to_string())
    }
}
