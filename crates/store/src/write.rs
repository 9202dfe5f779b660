//! Write path: `insert`, `update`, `upsert`, `delete`, and `truncate`.
//!
//! All mutations flow through this module. Each one keeps the data file and
//! the in-memory index in lockstep: the index entry and the block write
//! either both land or both unwind, and when unwinding itself fails the
//! file handle is closed so the store fails fast instead of serving a
//! drifted view.
//!
//! Allocation policy: a new block takes the best-fitting free block whole
//! (free blocks are never split) or is appended at the end of the file.
//! Variable-length fields get a padding fraction of extra capacity so most
//! later updates can be satisfied in place.

use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::io;
use tracing::{debug, error, info, warn};

use block::{Block, BlockField, HEADER_LEN};
use freelist::FreeBlock;

use crate::{State, Store, StoreError};

/// Header value that marks a block of `len` total bytes free.
fn free_header(len: usize) -> i16 {
    -(len as i32) as i16
}

fn padded_len(encoded: usize, variable: bool, padding: f32) -> usize {
    if variable {
        (encoded as f32 * (1.0 + padding) + 0.5) as usize
    } else {
        encoded
    }
}

/// Exact encoded size of a (key, value) pair and the padded size a fresh
/// block for it would get. Fails with `BadAlloc` when the padded size cannot
/// be represented as a positive block header.
fn block_sizes<K: BlockField, V: BlockField>(
    key: &K,
    value: &V,
    padding: f32,
) -> Result<(usize, usize), StoreError> {
    let key_len = key.encoded_len();
    let value_len = value.encoded_len();
    let data_len = HEADER_LEN + key_len + value_len;
    let block_len = HEADER_LEN
        + padded_len(key_len, K::IS_VARIABLE_LEN, padding)
        + padded_len(value_len, V::IS_VARIABLE_LEN, padding);
    if block_len > i16::MAX as usize {
        return Err(StoreError::BadAlloc);
    }
    Ok((data_len, block_len))
}

/// Where a new block goes: `(offset, actual block length, free-list index)`.
///
/// A best-fit free block is taken at its full length; otherwise the block is
/// appended at the recorded end of the file.
fn pick_slot<K>(
    state: &State<K>,
    data_len: usize,
    block_len: usize,
) -> Result<(u32, usize, Option<usize>), StoreError> {
    if let Some(i) = state.free.best_fit(data_len) {
        let slot = state.free.get(i).ok_or(StoreError::OutOfRange)?;
        return Ok((slot.offset, slot.len as usize, Some(i)));
    }
    if state.file_size + block_len as u64 > u64::from(u32::MAX) {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::StorageFull,
            "data file full",
        )));
    }
    Ok((state.file_size as u32, block_len, None))
}

impl<K: BlockField + Ord + Clone, V: BlockField> Store<K, V> {
    /// Inserts a new key-value pair.
    ///
    /// The pair goes into a best-fitting free block or a fresh block at the
    /// end of the file; variable-length fields receive the store's padding
    /// fraction of spare capacity.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotUnique`] - the key is already present; nothing is
    ///   written.
    /// - [`StoreError::BadAlloc`] - the padded block would exceed the block
    ///   size limit.
    /// - [`StoreError::CantDoItNow`] - an iterator is active on this store.
    /// - [`StoreError::Io`] - no data file, or the write failed (the slot is
    ///   marked free again and the index entry removed).
    pub fn insert(&self, key: K, value: V) -> Result<(), StoreError> {
        let state = self.state().lock();
        Self::note(&state, Self::insert_locked(&state, key, value))
    }

    fn insert_locked(cell: &RefCell<State<K>>, key: K, value: V) -> Result<(), StoreError> {
        let mut state = cell.borrow_mut();
        let state = &mut *state;
        if state.file.is_none() {
            return Err(Self::not_loaded());
        }
        if state.iterating > 0 {
            return Err(StoreError::CantDoItNow);
        }

        let (data_len, block_len) = block_sizes(&key, &value, state.padding_fraction)?;
        let (offset, block_len, from_free) = pick_slot(state, data_len, block_len)?;

        // Index first: a duplicate key aborts before the file is touched.
        match state.index.entry(key.clone()) {
            Entry::Occupied(_) => return Err(StoreError::NotUnique),
            Entry::Vacant(slot) => {
                slot.insert(offset);
            }
        }

        let file = state.file.as_mut().ok_or_else(Self::not_loaded)?;
        if let Err(e) = file.write_block(offset, block_len as u16, &key, &value) {
            let mut rollback = file.write_header(offset, free_header(block_len));
            if rollback.is_ok() {
                rollback = file.flush();
            }
            if rollback.is_err() {
                error!(offset, "insert rollback failed, closing data file");
                state.file = None;
            } else {
                warn!(offset, "insert write failed, slot marked free again");
            }
            state.index.remove(&key);
            return Err(e.into());
        }

        match from_free {
            Some(i) => {
                state.free.remove(i)?;
            }
            None => {
                state.file_size += block_len as u64;
            }
        }
        file.flush()?;
        debug!(offset, block_len, reused = from_free.is_some(), "inserted");
        Ok(())
    }

    /// Replaces the value stored for `key`.
    ///
    /// When the new pair still fits the existing block, only the value bytes
    /// are rewritten and the block keeps its offset, header, and padding.
    /// Otherwise a new block is allocated exactly as `insert` would, the old
    /// block is marked free, and the index entry's offset is mutated in
    /// place: the key set and its order never change, which is what makes
    /// `update` legal during iteration.
    ///
    /// `offset` short-circuits the index lookup when the caller already
    /// holds the key's block offset (typically from [`Store::iter`]).
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - key absent from the index.
    /// - [`StoreError::DataChanged`] - the block at the resolved offset is
    ///   free or stores a different key.
    /// - [`StoreError::BadAlloc`] - the padded replacement block would
    ///   exceed the block size limit.
    /// - [`StoreError::Io`] - no data file, or a write failed. An in-place
    ///   write failure closes the file (the old value is half gone); a
    ///   reallocation failure marks the fresh slot free and leaves the old
    ///   block intact.
    pub fn update(&self, key: &K, value: &V, offset: Option<u32>) -> Result<(), StoreError> {
        let state = self.state().lock();
        Self::note(&state, Self::update_locked(&state, key, value, offset))
    }

    fn update_locked(
        cell: &RefCell<State<K>>,
        key: &K,
        value: &V,
        offset: Option<u32>,
    ) -> Result<(), StoreError> {
        let mut state = cell.borrow_mut();
        let state = &mut *state;
        if state.file.is_none() {
            return Err(Self::not_loaded());
        }

        let old_offset = match offset {
            Some(o) => o,
            None => *state.index.get(key).ok_or(StoreError::NotFound)?,
        };

        let file = state.file.as_mut().ok_or_else(Self::not_loaded)?;
        let old_len = match file.read_block::<K, V>(old_offset, true)? {
            Block::Used { len, key: stored, .. } if stored == *key => len,
            _ => return Err(StoreError::DataChanged),
        };

        let (data_len, block_len) = block_sizes(key, value, state.padding_fraction)?;

        if data_len <= old_len as usize {
            // In-place: rewrite the value bytes only, header and padding
            // stay untouched.
            let value_offset = old_offset + (HEADER_LEN + key.encoded_len()) as u32;
            let mut res = file.write_value(value_offset, value);
            if res.is_ok() {
                res = file.flush();
            }
            if let Err(e) = res {
                error!(
                    offset = old_offset,
                    "in-place update write failed, closing data file"
                );
                state.file = None;
                return Err(e.into());
            }
            debug!(offset = old_offset, "updated in place");
            return Ok(());
        }

        // Reallocate: the new pair has outgrown the block.
        let (new_offset, new_block_len, from_free) = pick_slot(state, data_len, block_len)?;
        let file = state.file.as_mut().ok_or_else(Self::not_loaded)?;
        if let Err(e) = file.write_block(new_offset, new_block_len as u16, key, value) {
            let mut rollback = file.write_header(new_offset, free_header(new_block_len));
            if rollback.is_ok() {
                rollback = file.flush();
            }
            if rollback.is_err() {
                error!(
                    offset = new_offset,
                    "update rollback failed, closing data file"
                );
                state.file = None;
            }
            return Err(e.into());
        }

        match from_free {
            Some(i) => {
                state.free.remove(i)?;
            }
            None => {
                state.file_size += new_block_len as u64;
            }
        }
        file.flush()?;

        // Mark the old block free. Past this point a failure leaves two
        // used blocks carrying the same key, which no rollback can mend.
        let file = state.file.as_mut().ok_or_else(Self::not_loaded)?;
        let mut res = file.write_header(old_offset, free_header(old_len as usize));
        if res.is_ok() {
            res = file.flush();
        }
        if let Err(e) = res {
            error!(
                offset = old_offset,
                "marking replaced block free failed, closing data file"
            );
            state.file = None;
            return Err(e.into());
        }

        state.free.push(FreeBlock {
            offset: old_offset,
            len: old_len,
        });
        if let Some(slot) = state.index.get_mut(key) {
            *slot = new_offset;
        }
        debug!(
            from = old_offset,
            to = new_offset,
            block_len = new_block_len,
            "updated with reallocation"
        );
        Ok(())
    }

    /// Read-modify-write update: loads the current value, applies `mutate`
    /// to it while the store's lock is held, and writes the result back.
    ///
    /// The whole sequence is atomic with respect to other callers, which
    /// makes it the right shape for counters and accumulators.
    pub fn update_with<F>(&self, key: &K, mutate: F, offset: Option<u32>) -> Result<(), StoreError>
    where
        F: FnOnce(&mut V),
    {
        let _guard = self.state().lock();
        let mut value = self.find_value(key, offset)?;
        mutate(&mut value);
        self.update(key, &value, offset)
    }

    /// Updates the value for `key`, or inserts the pair when the key is not
    /// present yet.
    pub fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        let _guard = self.state().lock();
        match self.update(&key, &value, None) {
            Err(StoreError::NotFound) => self.insert(key, value),
            other => other,
        }
    }

    /// Applies `mutate` to the stored value, or inserts `default` when the
    /// key is not present yet. The mutation-or-insert decision and the write
    /// happen under one lock hold.
    pub fn upsert_with<F>(&self, key: K, mutate: F, default: V) -> Result<(), StoreError>
    where
        F: FnOnce(&mut V),
    {
        let _guard = self.state().lock();
        match self.update_with(&key, mutate, None) {
            Err(StoreError::NotFound) => self.insert(key, default),
            other => other,
        }
    }

    /// Deletes the pair stored for `key`.
    ///
    /// The block stays in the file marked free and joins the free list for
    /// reuse; the file never shrinks.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - key absent from the index.
    /// - [`StoreError::DataChanged`] - the indexed block is already free.
    /// - [`StoreError::CantDoItNow`] - an iterator is active on this store.
    /// - [`StoreError::Io`] - no data file, or the header write failed (the
    ///   index entry is restored).
    pub fn delete(&self, key: &K) -> Result<(), StoreError> {
        let state = self.state().lock();
        Self::note(&state, Self::delete_locked(&state, key))
    }

    fn delete_locked(cell: &RefCell<State<K>>, key: &K) -> Result<(), StoreError> {
        let mut state = cell.borrow_mut();
        let state = &mut *state;
        if state.file.is_none() {
            return Err(Self::not_loaded());
        }
        if state.iterating > 0 {
            return Err(StoreError::CantDoItNow);
        }

        let offset = *state.index.get(key).ok_or(StoreError::NotFound)?;
        let file = state.file.as_mut().ok_or_else(Self::not_loaded)?;
        let header = file.read_header(offset)?;
        if header < 0 {
            return Err(StoreError::DataChanged);
        }

        state.index.remove(key);
        let mut res = file.write_header(offset, -header);
        if res.is_ok() {
            res = file.flush();
        }
        if let Err(e) = res {
            warn!(offset, "delete write failed, restoring index entry");
            state.index.insert(key.clone(), offset);
            return Err(e.into());
        }

        state.free.push(FreeBlock {
            offset,
            len: header as u16,
        });
        debug!(offset, len = header, "deleted");
        Ok(())
    }

    /// Removes every key-value pair and resets the data file to zero bytes.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CantDoItNow`] - an iterator is active on this store.
    /// - [`StoreError::Io`] - no path recorded yet, or recreating the file
    ///   failed (the store stays unloaded).
    pub fn truncate(&self) -> Result<(), StoreError> {
        let state = self.state().lock();
        Self::note(&state, Self::truncate_locked(&state))
    }

    fn truncate_locked(cell: &RefCell<State<K>>) -> Result<(), StoreError> {
        let mut state = cell.borrow_mut();
        if state.iterating > 0 {
            return Err(StoreError::CantDoItNow);
        }
        if state.path.as_os_str().is_empty() {
            return Err(Self::not_loaded());
        }

        state.file = None;
        let file = block::BlockFile::create(&state.path, state.sync)?;
        state.file = Some(file);
        state.file_size = 0;
        state.index.clear();
        state.free.clear();
        info!(path = %state.path.display(), "store truncated");
        Ok(())
    }
}
