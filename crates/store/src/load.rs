//! Data-file load: a linear walk over block headers that rebuilds the key
//! index and the free-block list.
//!
//! The walk reads each block's header and key but skips the value bytes, so
//! opening a large store costs one pass over headers and keys only. A used
//! header indexes its key; a free header feeds the free list; the walk
//! advances by the header's absolute value until it reaches the recorded
//! file length.

use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::io;
use std::path::Path;
use tracing::{error, info};

use block::{Block, BlockField, BlockFile};
use freelist::FreeBlock;

use crate::{State, Store, StoreError, MAX_PATH_LEN};

impl<K: BlockField + Ord + Clone, V: BlockField> Store<K, V> {
    /// Loads the store from `path`, creating the file if it does not exist.
    ///
    /// Fails with [`StoreError::CantDoItNow`] when a file is already loaded.
    /// Any mid-walk failure (I/O error, duplicate key, zero header) leaves
    /// the store unloaded; the caller may retry `load` or give up.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] - open/create failed, the path is longer than
    ///   [`MAX_PATH_LEN`], or the file outgrows 32-bit offsets.
    /// - [`StoreError::NotUnique`] - two used blocks carry the same key
    ///   (corruption).
    /// - [`StoreError::DataChanged`] - a zero block header (corruption).
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let state = self.state().lock();
        Self::note(&state, Self::load_locked(&state, path.as_ref()))
    }

    fn load_locked(cell: &RefCell<State<K>>, path: &Path) -> Result<(), StoreError> {
        let mut state = cell.borrow_mut();
        if state.file.is_some() {
            return Err(StoreError::CantDoItNow);
        }
        if path.as_os_str().len() > MAX_PATH_LEN {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "data file path too long",
            )));
        }

        state.path = path.to_path_buf();
        state.index.clear();
        state.free.clear();

        let mut file = BlockFile::open(path, state.sync)?;
        let file_size = file.len()?;

        let mut offset: u64 = 0;
        while offset < file_size {
            let block_offset = u32::try_from(offset).map_err(|_| {
                error!(offset, "data file exceeds 32-bit offsets");
                StoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "data file too large",
                ))
            })?;

            match file.read_block::<K, V>(block_offset, true)? {
                Block::Used { len, key, .. } => {
                    match state.index.entry(key) {
                        Entry::Vacant(slot) => {
                            slot.insert(block_offset);
                        }
                        Entry::Occupied(_) => {
                            error!(block_offset, "duplicate key in data file");
                            return Err(StoreError::NotUnique);
                        }
                    }
                    offset += u64::from(len);
                }
                Block::Free { len } => {
                    state.free.push(FreeBlock {
                        offset: block_offset,
                        len,
                    });
                    offset += u64::from(len);
                }
            }
        }

        info!(
            path = %path.display(),
            entries = state.index.len(),
            free_blocks = state.free.len(),
            file_size,
            "data file loaded"
        );
        state.file = Some(file);
        state.file_size = file_size;
        Ok(())
    }
}
