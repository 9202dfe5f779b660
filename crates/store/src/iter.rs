//! Lock-holding iteration over key/offset pairs.
//!
//! [`Store::iter`] takes the store's recursive lock and keeps it until the
//! iterator is dropped, so a whole loop observes one consistent snapshot
//! against other threads. On the same thread the lock is re-entrant: the
//! loop body can call back into the store. An iteration counter lets
//! `insert`, `delete`, and `truncate` refuse while any iterator is alive;
//! `update` and the lookups stay available.
//!
//! Each step reads the next key from the live index rather than a snapshot,
//! so an `update` that relocates a block inside the loop is reflected in the
//! offsets yielded afterwards.

use parking_lot::ReentrantMutexGuard;
use std::cell::RefCell;
use std::ops::Bound;

use block::BlockField;

use crate::{State, Store};

/// Iterator over `(key, block offset)` pairs in ascending key order.
///
/// Values are deliberately not materialized: fetching one costs a disk
/// read, so the loop body decides per key whether to call
/// [`Store::find_value`] with the yielded offset as a hint.
pub struct Iter<'a, K> {
    guard: ReentrantMutexGuard<'a, RefCell<State<K>>>,
    /// Key yielded last; the next step resumes strictly after it.
    last: Option<K>,
}

impl<K: BlockField + Ord + Clone, V: BlockField> Store<K, V> {
    /// Starts a key-ordered iteration, holding the store's lock and gating
    /// schema-changing mutators until the returned iterator is dropped.
    pub fn iter(&self) -> Iter<'_, K> {
        let guard = self.state().lock();
        guard.borrow_mut().iterating += 1;
        Iter { guard, last: None }
    }
}

impl<K: Ord + Clone> Iterator for Iter<'_, K> {
    type Item = (K, u32);

    fn next(&mut self) -> Option<(K, u32)> {
        let state = self.guard.borrow();
        let next = match &self.last {
            None => state.index.iter().next(),
            Some(last) => state
                .index
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next(),
        };
        let (key, offset) = next.map(|(k, &o)| (k.clone(), o))?;
        drop(state);
        self.last = Some(key.clone());
        Some((key, offset))
    }
}

impl<K> Drop for Iter<'_, K> {
    fn drop(&mut self) {
        self.guard.borrow_mut().iterating -= 1;
    }
}
