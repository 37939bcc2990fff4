//! Configuration for slabkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, SlabError};
use crate::store::{DESCRIPTOR_SIZE, MAX_FILE_LENGTH};

/// Smallest usable backing file: room for one descriptor and a few bytes
/// of payload.
pub const MIN_FILE_LENGTH: u16 = 16;

/// Default backing file length in bytes (3 KiB).
pub const DEFAULT_FILE_LENGTH: u16 = 3 * 1024;

/// Configuration for a slabkv node
///
/// Directory layout:
///   {data_dir}/
///     ├── index.bin        (index document)
///     ├── LOCK             (exclusive-access lock file)
///     └── 0, 1, 2, ...     (backing files, named by file index)
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the index document and backing files
    pub data_dir: PathBuf,

    /// Total length of each backing file, fixed at creation.
    /// Must be in `[MIN_FILE_LENGTH, MAX_FILE_LENGTH]` so every block
    /// offset fits the 12-bit free-list encoding.
    pub file_length: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./slabkv_data"),
            file_length: DEFAULT_FILE_LENGTH,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Largest record payload one backing file can hold.
    pub fn max_record(&self) -> usize {
        self.file_length as usize - DESCRIPTOR_SIZE
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.file_length < MIN_FILE_LENGTH || self.file_length > MAX_FILE_LENGTH {
            return Err(SlabError::Config(format!(
                "file_length {} outside [{}, {}]",
                self.file_length, MIN_FILE_LENGTH, MAX_FILE_LENGTH
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the backing file length (in bytes)
    pub fn file_length(mut self, length: u16) -> Self {
        self.config.file_length = length;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
