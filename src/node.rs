//! Local Key-Value Node
//!
//! Presents one logical key-value interface over N backing files in a
//! storage directory.
//!
//! ## Responsibilities
//! - Hash keys to buckets and fragment oversized values across files
//! - Pick the backing file for each fragment by capacity estimate
//! - Maintain the case-folded alias index for case-insensitive lookup
//! - Self-heal when a backing file disappears from disk
//!
//! ## Concurrency Model
//! Single writer, single process. The `LOCK` file makes a second node over
//! the same directory fail fast; within the process, `&mut self` on every
//! mutating operation is the whole story. Nothing here suspends or retries
//! beyond the engine's documented compact-and-retry and repair paths.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, SlabError};
use crate::flock::DirLock;
use crate::index::{Document, DOCUMENT_NAME};
use crate::record;
use crate::store::FileStore;

/// Optional byte range applied to a reconstructed value, clamped to its
/// length: `(start, end)` with either side open.
pub type ByteRange = (Option<usize>, Option<usize>);

/// Read the whole value.
pub const FULL_RANGE: ByteRange = (None, None);

const LOCK_NAME: &str = "LOCK";

pub struct Node {
    config: Config,
    doc_path: PathBuf,
    doc: Document,
    _lock: DirLock,
}

impl Node {
    /// Open a storage directory, creating it if needed.
    ///
    /// Takes the directory lock (failing fast with `Locked` if another
    /// node holds it) and loads the index document. A directory whose
    /// document is gone is unrecoverable — backing files carry no logical
    /// key metadata — so it is reset to empty.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let lock = DirLock::acquire(config.data_dir.join(LOCK_NAME)).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                SlabError::Locked(config.data_dir.clone())
            } else {
                SlabError::Io(e)
            }
        })?;

        let doc_path = config.data_dir.join(DOCUMENT_NAME);
        let doc = if doc_path.is_file() {
            Document::load(&doc_path)?
        } else {
            remove_storage_files(&config)?;
            let doc = Document::default();
            doc.save(&doc_path)?;
            doc
        };

        info!(
            dir = %config.data_dir.display(),
            files = doc.capacities.len(),
            keys = doc.fragments.len(),
            "opened storage node"
        );

        Ok(Self {
            config,
            doc_path,
            doc,
            _lock: lock,
        })
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert a new key. Fails with `AlreadyExists` if the key is present;
    /// replacing goes through delete-then-put, never in-place overwrite.
    pub fn put(&mut self, key: &str, value: &str) -> Result<()> {
        if self.doc.fragments.contains_key(key) {
            return Err(SlabError::AlreadyExists(key.to_string()));
        }

        let max_record = self.config.max_record();
        let overhead = record::KEY_PREFIX_SIZE + key.len();
        if overhead > max_record || (overhead == max_record && !value.is_empty()) {
            return Err(SlabError::KeyTooLarge);
        }
        let available = max_record - overhead;

        // Split the value into fragments of `available` bytes plus one
        // trailing fragment, possibly empty. At least one fragment is
        // always written, even for an empty value.
        let value_bytes = value.as_bytes();
        let full = if available == 0 {
            0
        } else {
            value_bytes.len() / available
        };

        let mut written: Vec<usize> = Vec::with_capacity(full + 1);
        for i in 0..full {
            let fragment = &value_bytes[i * available..(i + 1) * available];
            let index = self.write_fragment(key, fragment, &written)?;
            written.push(index);
        }
        let tail = &value_bytes[full * available..];
        let index = self.write_fragment(key, tail, &written)?;
        written.push(index);

        self.doc.fragments.insert(key.to_string(), written);
        self.doc
            .aliases
            .entry(fold(key))
            .or_default()
            .push(key.to_string());
        self.save()
    }

    /// Insert or replace a key.
    pub fn write(&mut self, key: &str, value: &str) -> Result<()> {
        if self.doc.fragments.contains_key(key) {
            self.delete(key, true)?;
        }
        self.put(key, value)
    }

    /// Repeated `write`; no cross-key atomicity.
    pub fn write_many<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            self.write(key, value)?;
        }
        Ok(())
    }

    /// Write one fragment record, choosing or creating a backing file.
    ///
    /// Files already holding a fragment of this key are skipped so the
    /// read path's one-match-per-file scan can never drop a fragment.
    fn write_fragment(&mut self, key: &str, fragment: &[u8], written: &[usize]) -> Result<usize> {
        let payload = record::encode(key, fragment)?;
        if payload.len() > self.config.max_record() {
            return Err(SlabError::KeyTooLarge);
        }
        let bucket = record::bucket_of(key);

        let mut repaired = false;
        loop {
            let index = match self.select_file(payload.len(), written) {
                Some(index) => index,
                None => self.create_file()?,
            };
            match self.open_store(index) {
                Ok(mut store) => {
                    store.write(&payload, bucket)?;
                    self.doc.capacities[index] = store.size();
                    return Ok(index);
                }
                Err(SlabError::FileNotFound(_)) if !repaired => {
                    repaired = true;
                    self.repair()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best estimate fit: the file with the smallest nonnegative
    /// `capacity_estimate - record_len`, excluding files in `written`.
    fn select_file(&self, record_len: usize, written: &[usize]) -> Option<usize> {
        let mut best: Option<(i64, usize)> = None;
        for (index, &capacity) in self.doc.capacities.iter().enumerate() {
            if written.contains(&index) {
                continue;
            }
            let waste = capacity - record_len as i64;
            if waste < 0 {
                continue;
            }
            if best.map_or(true, |(w, _)| waste < w) {
                best = Some((waste, index));
            }
        }
        best.map(|(_, index)| index)
    }

    fn create_file(&mut self) -> Result<usize> {
        let index = self.doc.capacities.len();
        let path = self.file_path(index);
        if path.is_file() {
            // Stale orphan from a crash between file creation and the
            // document save that would have registered it.
            fs::remove_file(&path)?;
        }
        let store = FileStore::create(&path, self.config.file_length)?;
        self.doc.capacities.push(store.size());
        self.save()?;
        Ok(index)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Resolve a key to its value(s).
    ///
    /// Case-sensitive mode returns exactly one reconstructed value.
    /// Case-insensitive mode returns one value per original-case key under
    /// the fold, in alias-insertion (write) order.
    pub fn read(&mut self, key: &str, case_sensitive: bool, range: ByteRange) -> Result<Vec<String>> {
        if case_sensitive {
            return Ok(vec![self.read_one(key, range)?]);
        }

        let aliases = self
            .doc
            .aliases
            .get(&fold(key))
            .cloned()
            .ok_or(SlabError::KeyNotFound)?;
        let mut values = Vec::with_capacity(aliases.len());
        for alias in aliases {
            values.push(self.read_one(&alias, range)?);
        }
        Ok(values)
    }

    fn read_one(&mut self, key: &str, range: ByteRange) -> Result<String> {
        let fragments = self
            .doc
            .fragments
            .get(key)
            .cloned()
            .ok_or(SlabError::KeyNotFound)?;
        let bucket = record::bucket_of(key);

        let mut bytes = Vec::new();
        for index in fragments {
            let mut store = match self.open_store(index) {
                Ok(store) => store,
                Err(SlabError::FileNotFound(_)) => {
                    self.repair()?;
                    return Err(SlabError::KeyNotFound);
                }
                Err(e) => return Err(e),
            };
            let blobs = store.read(bucket)?.ok_or(SlabError::KeyNotFound)?;
            let record = blobs
                .iter()
                .find(|blob| {
                    !blob.is_empty()
                        && record::peek_key(blob.as_slice()).map_or(false, |k| k == key)
                })
                .ok_or(SlabError::KeyNotFound)?;
            bytes.extend_from_slice(record::value_bytes(record)?);
        }

        let (start, end) = clamp_range(range, bytes.len());
        Ok(String::from_utf8(bytes[start..end].to_vec())?)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a key (case-sensitive) or every key under its fold.
    pub fn delete(&mut self, key: &str, case_sensitive: bool) -> Result<()> {
        let folded = fold(key);
        if case_sensitive {
            self.delete_one(key)?;
            self.drop_alias(&folded, key);
            return self.save();
        }

        let keys = self
            .doc
            .aliases
            .get(&folded)
            .cloned()
            .ok_or(SlabError::KeyNotFound)?;
        for key in keys {
            self.delete_one(&key)?;
        }
        self.doc.aliases.remove(&folded);
        self.save()
    }

    /// Repeated `delete`.
    pub fn delete_many<'a, I>(&mut self, keys: I, case_sensitive: bool) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for key in keys {
            self.delete(key, case_sensitive)?;
        }
        Ok(())
    }

    fn delete_one(&mut self, key: &str) -> Result<()> {
        let fragments = self
            .doc
            .fragments
            .get(key)
            .cloned()
            .ok_or(SlabError::KeyNotFound)?;
        let bucket = record::bucket_of(key);

        for index in fragments {
            let mut store = match self.open_store(index) {
                Ok(store) => store,
                Err(SlabError::FileNotFound(_)) => {
                    self.repair()?;
                    return Err(SlabError::KeyNotFound);
                }
                Err(e) => return Err(e),
            };
            if let Some(position) = Self::find_record(&mut store, bucket, key)? {
                store.delete(bucket, position)?;
                self.doc.capacities[index] = store.size();
            }
        }

        self.doc.fragments.remove(key);
        Ok(())
    }

    /// Chain position of the record whose decoded key matches, if any.
    fn find_record(store: &mut FileStore, bucket: i32, key: &str) -> Result<Option<usize>> {
        let blobs = match store.read(bucket)? {
            Some(blobs) => blobs,
            None => return Ok(None),
        };
        Ok(blobs.iter().position(|blob| {
            !blob.is_empty() && record::peek_key(blob).map_or(false, |k| k == key)
        }))
    }

    fn drop_alias(&mut self, folded: &str, key: &str) {
        if let Some(list) = self.doc.aliases.get_mut(folded) {
            list.retain(|k| k != key);
            if list.is_empty() {
                self.doc.aliases.remove(folded);
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Membership check against the index document only; backing files are
    /// never touched.
    pub fn contains(&self, key: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            self.doc.fragments.contains_key(key)
        } else {
            self.doc.aliases.contains_key(&fold(key))
        }
    }

    /// Number of fragments a key's value is split across, if present.
    pub fn fragment_count(&self, key: &str) -> Option<usize> {
        self.doc.fragments.get(key).map(Vec::len)
    }

    /// Number of backing files currently allocated.
    pub fn file_count(&self) -> usize {
        self.doc.capacities.len()
    }

    /// All case-sensitive keys in document order.
    pub fn list(&mut self) -> Result<Vec<String>> {
        self.repair()?;
        Ok(self.doc.fragments.keys().cloned().collect())
    }

    pub fn len(&mut self) -> Result<usize> {
        self.repair()?;
        Ok(self.doc.fragments.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Discard every backing file and reset the index document to empty.
    pub fn clear(&mut self) -> Result<()> {
        remove_storage_files(&self.config)?;
        self.doc = Document::default();
        self.save()
    }

    /// Compact every backing file and refresh its capacity estimate.
    pub fn compact(&mut self) -> Result<()> {
        self.repair()?;
        for index in 0..self.doc.capacities.len() {
            let mut store = self.open_store(index)?;
            store.compact()?;
            self.doc.capacities[index] = store.size();
        }
        self.save()
    }

    /// Reconcile the index document with the files actually on disk.
    ///
    /// A key referencing a missing file loses all of its fragments, the
    /// surviving ones included: with part of the value gone, dropping the
    /// rest favors consistency over partial recovery. Missing indices are
    /// then recreated as fresh empty files so file numbers stay dense and
    /// positional.
    pub fn repair(&mut self) -> Result<()> {
        let missing: Vec<usize> = (0..self.doc.capacities.len())
            .filter(|&index| !self.file_path(index).is_file())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let doomed: Vec<String> = self
            .doc
            .fragments
            .iter()
            .filter(|(_, fragments)| fragments.iter().any(|index| missing.contains(index)))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            warn!(key = %key, "dropping key that references a missing backing file");
            let fragments = self.doc.fragments.get(key).cloned().unwrap_or_default();
            let bucket = record::bucket_of(key);

            for index in fragments {
                if missing.contains(&index) {
                    continue;
                }
                let mut store = match self.open_store(index) {
                    Ok(store) => store,
                    // Vanished since the scan; its keys get caught by the
                    // next repair pass.
                    Err(SlabError::FileNotFound(_)) => continue,
                    Err(e) => return Err(e),
                };
                if let Some(position) = Self::find_record(&mut store, bucket, key)? {
                    store.delete(bucket, position)?;
                    self.doc.capacities[index] = store.size();
                }
            }

            self.drop_alias(&fold(key), key);
            self.doc.fragments.remove(key);
        }

        for index in missing {
            let store = FileStore::create(&self.file_path(index), self.config.file_length)?;
            self.doc.capacities[index] = store.size();
        }
        self.save()
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn open_store(&self, index: usize) -> Result<FileStore> {
        FileStore::open(
            &self.file_path(index),
            self.config.file_length,
            self.doc.capacities[index],
        )
    }

    fn file_path(&self, index: usize) -> PathBuf {
        self.config.data_dir.join(index.to_string())
    }

    fn save(&self) -> Result<()> {
        self.doc.save(&self.doc_path)
    }
}

/// Case fold used by the alias index.
fn fold(key: &str) -> String {
    key.to_lowercase()
}

fn clamp_range(range: ByteRange, len: usize) -> (usize, usize) {
    let start = range.0.unwrap_or(0).min(len);
    let end = range.1.unwrap_or(len).min(len).max(start);
    (start, end)
}

/// Remove every file in the storage directory except the lock file.
fn remove_storage_files(config: &Config) -> Result<()> {
    for entry in fs::read_dir(&config.data_dir)? {
        let path = entry?.path();
        if path.file_name().map_or(false, |name| name == LOCK_NAME) {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
