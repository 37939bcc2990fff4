//! FileStore
//!
//! One instance bound to one backing file of fixed length. Owns the file's
//! free list and bucket index; persists both to the metadata region after
//! every mutation.
//!
//! ## Allocation
//! Writes use best fit: among free blocks that can hold the payload, the
//! one wasting the fewest bytes wins. A losing search triggers one full
//! compaction and a single retry before `OutOfSpace`.
//!
//! ## Capacity estimate
//! `size()` is an incrementally maintained free-byte count used by the
//! node layer to pick files. It is a heuristic, not ground truth; only
//! compaction resets it to an exact value.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SlabError};

use super::{Descriptor, Tables, DESCRIPTOR_SIZE};

pub struct FileStore {
    path: PathBuf,
    file: File,
    file_length: u16,
    /// Free-capacity estimate in bytes
    size: i64,
    tables: Tables,
}

impl FileStore {
    /// Create a new all-free backing file.
    ///
    /// The data region becomes a single free block spanning it, and empty
    /// metadata tables are written after offset `file_length`.
    pub fn create(path: &Path, file_length: u16) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    SlabError::AlreadyExists(path.display().to_string())
                }
                _ => SlabError::Io(e),
            })?;

        let capacity = file_length as usize - DESCRIPTOR_SIZE;
        let mut data = vec![0u8; file_length as usize];
        data[..DESCRIPTOR_SIZE].copy_from_slice(&Descriptor::free(capacity)?.encode());

        let mut store = Self {
            path: path.to_path_buf(),
            file,
            file_length,
            size: capacity as i64,
            tables: Tables {
                free: vec![0],
                chains: BTreeMap::new(),
            },
        };
        store.file.write_all(&data)?;
        store.persist_tables()?;
        Ok(store)
    }

    /// Open an existing backing file, loading its metadata tables.
    ///
    /// The capacity estimate is tracked by the caller across instances, so
    /// it is supplied rather than recomputed.
    pub fn open(path: &Path, file_length: u16, size_estimate: i64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SlabError::FileNotFound(path.to_path_buf()),
                _ => SlabError::Io(e),
            })?;

        file.seek(SeekFrom::Start(file_length as u64))?;
        let mut table_bytes = Vec::new();
        file.read_to_end(&mut table_bytes)?;
        let tables = Tables::decode(&table_bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_length,
            size: size_estimate,
            tables,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current free-capacity estimate.
    pub fn size(&self) -> i64 {
        self.size
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Payloads of every block in the bucket's collision chain, in chain
    /// order. A free block in a chain yields an empty blob instead of
    /// failing; `None` means the bucket is absent.
    pub fn read(&mut self, bucket: i32) -> Result<Option<Vec<Vec<u8>>>> {
        let chain = match self.tables.chains.get(&bucket) {
            Some(chain) => chain.clone(),
            None => return Ok(None),
        };

        let mut blobs = Vec::with_capacity(chain.len());
        for offset in chain {
            let desc = self.read_descriptor(offset)?;
            if desc.occupied {
                blobs.push(self.read_payload(offset, desc.capacity as usize)?);
            } else {
                blobs.push(Vec::new());
            }
        }
        Ok(Some(blobs))
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Append one block holding `payload` to the bucket's chain.
    pub fn write(&mut self, payload: &[u8], bucket: i32) -> Result<()> {
        let len = payload.len();
        let max_payload = self.file_length as usize - DESCRIPTOR_SIZE;
        if len < 1 || len > max_payload {
            return Err(SlabError::InvalidArgument(format!(
                "payload of {len} bytes outside [1, {max_payload}]"
            )));
        }

        let offset = match self.best_fit(len)? {
            Some(offset) => offset,
            None => {
                self.compact()?;
                self.best_fit(len)?
                    .ok_or_else(|| SlabError::OutOfSpace(self.path.clone(), len))?
            }
        };

        let desc = self.read_descriptor(offset)?;
        let leftover = desc.capacity as usize + desc.slack as usize - len;
        self.tables.free.retain(|&o| o != offset);

        let mut block = Vec::with_capacity(DESCRIPTOR_SIZE + len + DESCRIPTOR_SIZE);
        let slack = if leftover <= DESCRIPTOR_SIZE { leftover } else { 0 };
        block.extend_from_slice(&Descriptor::occupied(len, slack)?.encode());
        block.extend_from_slice(payload);

        let carved = leftover > DESCRIPTOR_SIZE;
        if carved {
            // The remainder is big enough to address on its own: give it a
            // descriptor and put it back on the free list.
            let carved_offset = offset + (DESCRIPTOR_SIZE + len) as u16;
            block.extend_from_slice(&Descriptor::free(leftover - DESCRIPTOR_SIZE)?.encode());
            self.tables.free.push(carved_offset);
        }

        self.tables.chains.entry(bucket).or_default().push(offset);

        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&block)?;
        self.persist_tables()?;

        self.size -= len as i64;
        if carved {
            self.size -= DESCRIPTOR_SIZE as i64;
        }
        Ok(())
    }

    /// Best-fit scan of the free list: minimum nonnegative
    /// `capacity + slack - len` wins.
    fn best_fit(&mut self, len: usize) -> Result<Option<u16>> {
        let candidates = self.tables.free.clone();
        let mut best: Option<(usize, u16)> = None;
        for offset in candidates {
            let desc = self.read_descriptor(offset)?;
            let available = desc.capacity as usize + desc.slack as usize;
            if available < len {
                continue;
            }
            let waste = available - len;
            if best.map_or(true, |(w, _)| waste < w) {
                best = Some((waste, offset));
            }
        }
        Ok(best.map(|(_, offset)| offset))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Mark the block at `chain_index` of the bucket's chain free.
    ///
    /// No physical merging with adjacent free blocks happens here; merging
    /// is compaction's job. Adjacency only grants the estimate a 2-byte
    /// bonus for the descriptor a future merge will reclaim.
    pub fn delete(&mut self, bucket: i32, chain_index: usize) -> Result<()> {
        let offset = match self.tables.chains.get(&bucket) {
            Some(chain) if chain_index < chain.len() => chain[chain_index],
            Some(chain) => {
                return Err(SlabError::InvalidArgument(format!(
                    "chain index {chain_index} out of range for bucket {bucket} (len {})",
                    chain.len()
                )))
            }
            None => {
                return Err(SlabError::InvalidArgument(format!(
                    "no such bucket: {bucket}"
                )))
            }
        };

        let desc = self.read_descriptor(offset)?;
        let freed = desc.capacity as usize + desc.slack as usize;

        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&Descriptor::free(freed)?.encode())?;

        self.tables.free.push(offset);
        if let Some(chain) = self.tables.chains.get_mut(&bucket) {
            chain.remove(chain_index);
            if chain.is_empty() {
                self.tables.chains.remove(&bucket);
            }
        }
        self.persist_tables()?;

        self.size += freed as i64;
        if self.has_free_neighbour(offset, freed)? {
            self.size += DESCRIPTOR_SIZE as i64;
            self.size = self.size.min((self.file_length as usize - DESCRIPTOR_SIZE) as i64);
        }
        Ok(())
    }

    /// Exact offset arithmetic: is another free block flush against this
    /// freshly freed one on either side?
    fn has_free_neighbour(&mut self, offset: u16, freed: usize) -> Result<bool> {
        let others = self.tables.free.clone();
        for other in others {
            if other == offset {
                continue;
            }
            let other_desc = self.read_descriptor(other)?;
            if other as usize + other_desc.extent() == offset as usize {
                return Ok(true);
            }
            if offset as usize + DESCRIPTOR_SIZE + freed == other as usize {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Full defragmentation: repack every chained block tightly from
    /// offset 0, rebuild the bucket index and free list around the new
    /// offsets, and rewrite the file. Leaves the capacity estimate exact.
    pub fn compact(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), "compacting backing file");

        let old_chains = self.tables.chains.clone();
        let mut data: Vec<u8> = Vec::with_capacity(self.file_length as usize);
        let mut new_chains: BTreeMap<i32, Vec<u16>> = BTreeMap::new();
        let mut last_descriptor: Option<(usize, Descriptor)> = None;

        for (bucket, chain) in old_chains {
            let mut new_chain = Vec::with_capacity(chain.len());
            for offset in chain {
                let desc = self.read_descriptor(offset)?;
                let payload = self.read_payload(offset, desc.capacity as usize)?;

                let new_offset = data.len() as u16;
                let new_desc = Descriptor {
                    occupied: desc.occupied,
                    capacity: desc.capacity,
                    slack: 0,
                };
                last_descriptor = Some((data.len(), new_desc));
                data.extend_from_slice(&new_desc.encode());
                data.extend_from_slice(&payload);
                new_chain.push(new_offset);
            }
            new_chains.insert(bucket, new_chain);
        }

        let remainder = self.file_length as usize - data.len();
        let mut free = Vec::new();
        if remainder > DESCRIPTOR_SIZE {
            // Everything after the last live block becomes one free block.
            free.push(data.len() as u16);
            data.extend_from_slice(&Descriptor::free(remainder - DESCRIPTOR_SIZE)?.encode());
            self.size = (remainder - DESCRIPTOR_SIZE) as i64;
        } else {
            // Too small to host a descriptor: absorb into the last block's
            // slack. The bytes drop out of the estimate until a later
            // compaction of a different shape reclaims them.
            if remainder > 0 {
                if let Some((pos, desc)) = last_descriptor {
                    let patched = Descriptor {
                        slack: remainder as u8,
                        ..desc
                    };
                    data[pos..pos + DESCRIPTOR_SIZE].copy_from_slice(&patched.encode());
                }
            }
            self.size = 0;
        }

        self.tables.chains = new_chains;
        self.tables.free = free;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&data)?;
        self.persist_tables()?;
        Ok(())
    }

    // =========================================================================
    // Internal I/O
    // =========================================================================

    fn read_descriptor(&mut self, offset: u16) -> Result<Descriptor> {
        if offset as usize + DESCRIPTOR_SIZE > self.file_length as usize {
            return Err(SlabError::InvalidArgument(format!(
                "block offset {offset} outside data region of {}",
                self.file_length
            )));
        }
        self.file.seek(SeekFrom::Start(offset as u64))?;
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        self.file.read_exact(&mut bytes)?;
        Ok(Descriptor::decode(bytes))
    }

    fn read_payload(&mut self, offset: u16, capacity: usize) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(offset as u64 + DESCRIPTOR_SIZE as u64))?;
        let mut payload = vec![0u8; capacity];
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn persist_tables(&mut self) -> Result<()> {
        let bytes = self.tables.encode()?;
        self.file.seek(SeekFrom::Start(self.file_length as u64))?;
        self.file.write_all(&bytes)?;
        self.file
            .set_len(self.file_length as u64 + bytes.len() as u64)?;
        Ok(())
    }
}
