//! Tests for the single file store
//!
//! These tests verify:
//! - Backing file creation and reopen
//! - Best-fit allocation: carving vs slack absorption
//! - Collision chains and chain-order reads
//! - Delete, free-list reuse, and the adjacency estimate bonus
//! - Compaction repacking and exactness of the capacity estimate

use std::path::PathBuf;

use slabkv::store::FileStore;
use slabkv::SlabError;
use tempfile::TempDir;

const FILE_LENGTH: u16 = 3072;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("0");
    (temp_dir, path)
}

fn payload(byte: u8, len: usize) -> Vec<u8> {
    vec![byte; len]
}

// =============================================================================
// Create / Open
// =============================================================================

#[test]
fn test_create_starts_all_free() {
    let (_temp, path) = setup_temp_file();

    let store = FileStore::create(&path, FILE_LENGTH).unwrap();

    assert!(path.exists());
    assert_eq!(store.size(), FILE_LENGTH as i64 - 2);
}

#[test]
fn test_create_over_existing_path_fails() {
    let (_temp, path) = setup_temp_file();

    FileStore::create(&path, FILE_LENGTH).unwrap();
    assert!(matches!(
        FileStore::create(&path, FILE_LENGTH),
        Err(SlabError::AlreadyExists(_))
    ));
}

#[test]
fn test_open_missing_file_fails() {
    let (_temp, path) = setup_temp_file();

    assert!(matches!(
        FileStore::open(&path, FILE_LENGTH, 0),
        Err(SlabError::FileNotFound(_))
    ));
}

#[test]
fn test_tables_survive_reopen() {
    let (_temp, path) = setup_temp_file();

    let size = {
        let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
        store.write(&payload(b'a', 40), 7).unwrap();
        store.write(&payload(b'b', 25), -3).unwrap();
        store.size()
    };

    let mut store = FileStore::open(&path, FILE_LENGTH, size).unwrap();
    assert_eq!(store.size(), size);
    assert_eq!(store.read(7).unwrap().unwrap(), vec![payload(b'a', 40)]);
    assert_eq!(store.read(-3).unwrap().unwrap(), vec![payload(b'b', 25)]);
}

// =============================================================================
// Read / Write
// =============================================================================

#[test]
fn test_absent_bucket_reads_none() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    assert!(store.read(42).unwrap().is_none());
}

#[test]
fn test_collision_chain_preserves_write_order() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'x', 10), 5).unwrap();
    store.write(&payload(b'y', 20), 5).unwrap();
    store.write(&payload(b'z', 30), 5).unwrap();

    let blobs = store.read(5).unwrap().unwrap();
    assert_eq!(
        blobs,
        vec![payload(b'x', 10), payload(b'y', 20), payload(b'z', 30)]
    );
}

#[test]
fn test_write_carves_remainder_into_free_block() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'a', 100), 1).unwrap();

    // 100 payload bytes plus the carved block's 2-byte descriptor.
    assert_eq!(store.size(), 3070 - 102);
}

#[test]
fn test_write_absorbs_tiny_remainder_as_slack() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    // Leaves 2 bytes: too small for a descriptor, absorbed as slack.
    store.write(&payload(b'a', 3068), 1).unwrap();

    assert_eq!(store.size(), 2);
    // The slack is unreachable until the block is freed again.
    assert!(matches!(
        store.write(&payload(b'b', 1), 2),
        Err(SlabError::OutOfSpace(_, 1))
    ));
}

#[test]
fn test_write_rejects_empty_and_oversized_payloads() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    assert!(matches!(
        store.write(&[], 1),
        Err(SlabError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.write(&payload(b'a', 3071), 1),
        Err(SlabError::InvalidArgument(_))
    ));
}

#[test]
fn test_best_fit_prefers_tightest_hole() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    // Lay down three blocks, then free the first and third to leave two
    // holes of 100 and 40 bytes.
    store.write(&payload(b'a', 100), 1).unwrap();
    store.write(&payload(b'b', 500), 2).unwrap();
    store.write(&payload(b'c', 40), 3).unwrap();
    store.delete(1, 0).unwrap();
    store.delete(3, 0).unwrap();

    // 40 fits both holes; best fit picks the 40-byte one exactly.
    store.write(&payload(b'd', 40), 4).unwrap();
    let blobs = store.read(4).unwrap().unwrap();
    assert_eq!(blobs, vec![payload(b'd', 40)]);

    // The 100-byte hole is still whole: a 100-byte payload lands in it
    // without compaction (which would have moved bucket 2's block).
    store.write(&payload(b'e', 100), 5).unwrap();
    assert_eq!(store.read(2).unwrap().unwrap(), vec![payload(b'b', 500)]);
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn test_delete_removes_chain_entry_and_grows_estimate() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'a', 100), 1).unwrap();
    store.write(&payload(b'b', 50), 2).unwrap();
    assert_eq!(store.size(), 3070 - 102 - 52);

    store.delete(1, 0).unwrap();
    assert!(store.read(1).unwrap().is_none());
    // No free neighbour for the block at offset 0.
    assert_eq!(store.size(), 3070 - 102 - 52 + 100);

    store.delete(2, 0).unwrap();
    // The freed block borders the trailing free block: +2 bonus.
    assert_eq!(store.size(), 3070 - 102 - 52 + 100 + 50 + 2);
}

#[test]
fn test_delete_only_touches_one_chain_entry() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'x', 10), 5).unwrap();
    store.write(&payload(b'y', 20), 5).unwrap();

    store.delete(5, 0).unwrap();
    assert_eq!(store.read(5).unwrap().unwrap(), vec![payload(b'y', 20)]);
}

#[test]
fn test_delete_validates_bucket_and_index() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'a', 10), 1).unwrap();

    assert!(matches!(
        store.delete(99, 0),
        Err(SlabError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.delete(1, 1),
        Err(SlabError::InvalidArgument(_))
    ));
}

#[test]
fn test_freed_space_is_reused() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'a', 3068), 1).unwrap();
    store.delete(1, 0).unwrap();
    // The freed block reabsorbed its 2 slack bytes, so the estimate
    // overshoots the data region; it is a heuristic, not ground truth.
    assert_eq!(store.size(), 3072);

    store.write(&payload(b'b', 3070), 2).unwrap();
    assert_eq!(store.read(2).unwrap().unwrap(), vec![payload(b'b', 3070)]);
}

// =============================================================================
// Compaction
// =============================================================================

#[test]
fn test_compact_preserves_live_content() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'a', 100), 1).unwrap();
    store.write(&payload(b'b', 200), 2).unwrap();
    store.write(&payload(b'c', 300), 2).unwrap();
    store.write(&payload(b'd', 50), 3).unwrap();
    store.delete(1, 0).unwrap();
    store.delete(2, 1).unwrap();

    store.compact().unwrap();

    assert!(store.read(1).unwrap().is_none());
    assert_eq!(store.read(2).unwrap().unwrap(), vec![payload(b'b', 200)]);
    assert_eq!(store.read(3).unwrap().unwrap(), vec![payload(b'd', 50)]);
    // Live blocks: (2+200) + (2+50); everything else is one free block.
    assert_eq!(store.size(), 3070 - 202 - 52);
}

#[test]
fn test_compact_merges_fragmented_holes() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    // Fill the file with three blocks, then punch out the outer two.
    store.write(&payload(b'a', 1000), 1).unwrap();
    store.write(&payload(b'b', 1000), 2).unwrap();
    store.write(&payload(b'c', 1000), 3).unwrap();
    store.delete(1, 0).unwrap();
    store.delete(3, 0).unwrap();

    // 1500 bytes fit no single hole; write compacts and succeeds.
    store.write(&payload(b'd', 1500), 4).unwrap();
    assert_eq!(store.read(2).unwrap().unwrap(), vec![payload(b'b', 1000)]);
    assert_eq!(store.read(4).unwrap().unwrap(), vec![payload(b'd', 1500)]);
}

#[test]
fn test_compact_empty_file_resets_estimate() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, FILE_LENGTH).unwrap();
    store.write(&payload(b'a', 500), 1).unwrap();
    store.delete(1, 0).unwrap();

    store.compact().unwrap();
    assert_eq!(store.size(), 3070);
}

#[test]
fn test_out_of_space_after_compaction_retry() {
    let (_temp, path) = setup_temp_file();

    let mut store = FileStore::create(&path, 64).unwrap();
    store.write(&payload(b'a', 60), 1).unwrap();

    assert!(matches!(
        store.write(&payload(b'b', 30), 2),
        Err(SlabError::OutOfSpace(_, 30))
    ));
    // Existing content is untouched by the failed allocation.
    assert_eq!(store.read(1).unwrap().unwrap(), vec![payload(b'a', 60)]);
}
