use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::{BlockField, Store};

/// A loaded string/string store over a fresh temp file.
pub fn open_store(dir: &TempDir) -> (Store<String, String>, PathBuf) {
    let path = dir.path().join("data.kv");
    let store = Store::new();
    store.load(&path).unwrap();
    (store, path)
}

/// Walks the raw data file block by block, returning `(offset, header)`
/// pairs, and asserts the walk lands exactly on the end of the file.
pub fn block_walk(path: &Path) -> Vec<(u32, i16)> {
    let data = std::fs::read(path).unwrap();
    let mut blocks = Vec::new();
    let mut off = 0usize;
    while off < data.len() {
        let header = i16::from_le_bytes([data[off], data[off + 1]]);
        assert_ne!(header, 0, "zero header at offset {}", off);
        blocks.push((off as u32, header));
        off += header.unsigned_abs() as usize;
    }
    assert_eq!(off, data.len(), "header walk must end exactly at EOF");
    blocks
}

/// Asserts the store's in-memory view against the raw file: every used
/// block has exactly one index entry, every free block exactly one
/// free-list entry, and the recorded file size matches the file.
pub fn check_invariants<K, V>(store: &Store<K, V>, path: &Path)
where
    K: BlockField + Ord + Clone,
    V: BlockField,
{
    let blocks = block_walk(path);
    let used = blocks.iter().filter(|(_, h)| *h > 0).count();
    let free = blocks.iter().filter(|(_, h)| *h < 0).count();
    assert_eq!(used, store.len(), "used blocks vs index entries");
    assert_eq!(free, store.free_block_count(), "free blocks vs free list");
    assert_eq!(
        store.data_file_size(),
        std::fs::metadata(path).unwrap().len(),
        "recorded file size vs file length"
    );
}
