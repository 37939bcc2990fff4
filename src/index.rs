//! Index Document
//!
//! The per-directory persisted metadata the node layer owns: capacity
//! estimates for every backing file, the key → fragment-file map, and the
//! case-folded alias map. Pure data; mutation is direct field access
//! followed by a full `save` (no partial persistence, no transaction log).
//!
//! A crash between a backing-file write and a document save is tolerated
//! only by the missing-file repair path, not by finer-grained recovery.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// On-disk name of the index document within a storage directory.
pub const DOCUMENT_NAME: &str = "index.bin";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Free-capacity estimate per backing file, indexed by file number.
    /// Heuristic only; refreshed from the store after every mutation.
    pub capacities: Vec<i64>,

    /// Key to the ordered file indices holding its value fragments.
    /// Concatenating the fragments in this order reconstructs the value.
    pub fragments: BTreeMap<String, Vec<usize>>,

    /// Case-folded key to the original-case keys sharing that fold, in
    /// insertion order. A key appears here iff it appears in `fragments`.
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Document {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_all_three_mappings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DOCUMENT_NAME);

        let mut doc = Document::default();
        doc.capacities = vec![3070, 12, -4];
        doc.fragments.insert("Key".to_string(), vec![0, 2]);
        doc.fragments.insert("other".to_string(), vec![1]);
        doc.aliases
            .insert("key".to_string(), vec!["Key".to_string()]);
        doc.aliases
            .insert("other".to_string(), vec!["other".to_string()]);

        doc.save(&path).unwrap();
        assert_eq!(Document::load(&path).unwrap(), doc);
    }

    #[test]
    fn missing_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Document::load(&dir.path().join(DOCUMENT_NAME)).is_err());
    }
}
