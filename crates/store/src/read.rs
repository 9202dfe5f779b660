//! Read path: `find_block_offset`, `find_value`, `first`, `last`.
//!
//! Offsets come from the in-memory index and are cheap; values come from
//! the data file and cost a seek plus a block read. Iteration loops that
//! already hold a key's offset pass it as a hint to skip the index lookup.

use std::cell::RefCell;

use block::{Block, BlockField};

use crate::{State, Store, StoreError};

impl<K: BlockField + Ord + Clone, V: BlockField> Store<K, V> {
    /// Resolves a key to its block offset from the in-memory index. No disk
    /// access.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the key is absent.
    pub fn find_block_offset(&self, key: &K) -> Result<u32, StoreError> {
        let state = self.state().lock();
        let res = {
            let s = state.borrow();
            s.index.get(key).copied().ok_or(StoreError::NotFound)
        };
        Self::note(&state, res)
    }

    /// Reads the value stored for `key` from the data file.
    ///
    /// With `offset` of `None` the block offset is resolved through the
    /// index first; a caller already iterating can pass the yielded offset
    /// to skip that lookup. The block's header and stored key are verified
    /// against the index before the value is returned.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - key absent from the index.
    /// - [`StoreError::DataChanged`] - the block at the resolved offset is
    ///   free or keyed differently than the index claims.
    /// - [`StoreError::Io`] - no data file loaded, or the read failed.
    pub fn find_value(&self, key: &K, offset: Option<u32>) -> Result<V, StoreError> {
        let state = self.state().lock();
        Self::note(&state, Self::find_value_locked(&state, key, offset))
    }

    fn find_value_locked(
        cell: &RefCell<State<K>>,
        key: &K,
        offset: Option<u32>,
    ) -> Result<V, StoreError> {
        let mut state = cell.borrow_mut();
        let state = &mut *state;
        if state.file.is_none() {
            return Err(Self::not_loaded());
        }

        let block_offset = match offset {
            Some(o) => o,
            None => *state.index.get(key).ok_or(StoreError::NotFound)?,
        };

        let file = state.file.as_mut().ok_or_else(Self::not_loaded)?;
        match file.read_block::<K, V>(block_offset, false)? {
            Block::Used {
                key: stored,
                value: Some(value),
                ..
            } if stored == *key => Ok(value),
            _ => Err(StoreError::DataChanged),
        }
    }

    /// The smallest key and its block offset, or `None` on an empty store.
    pub fn first(&self) -> Option<(K, u32)> {
        let state = self.state().lock();
        let s = state.borrow();
        s.index.iter().next().map(|(k, &o)| (k.clone(), o))
    }

    /// The largest key and its block offset, or `None` on an empty store.
    pub fn last(&self) -> Option<(K, u32)> {
        let state = self.state().lock();
        let s = state.borrow();
        s.index.iter().next_back().map(|(k, &o)| (k.clone(), o))
    }
}
