//! # Store - EmberKV Storage Engine
//!
//! A single-file persistent key-value store for small, flash-backed
//! filesystems. Keys and values live in an on-disk data file made of
//! variable-length blocks; a complete in-memory index maps every key to its
//! block offset, so lookups cost one seek.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                    STORE                      │
//! │       (per-store recursive mutex)             │
//! │                                               │
//! │ write.rs → best-fit allocate → block write    │
//! │              |                                │
//! │              |  (delete / outgrown update)    │
//! │              v                                │
//! │        free-block list  ←  negative header    │
//! │                                               │
//! │ read.rs → index lookup → block read           │
//! │ load.rs → linear header walk rebuilds both    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module      | Purpose                                                  |
//! |-------------|----------------------------------------------------------|
//! | [`lib.rs`]  | `Store` struct, constructors, accessors, lock, `Debug`   |
//! | [`load`]    | data-file scan rebuilding index and free list at open    |
//! | [`write`]   | `insert`, `update`, `upsert`, `delete`, `truncate`       |
//! | [`read`]    | `find_block_offset`, `find_value`, `first`, `last`       |
//! | [`iter`]    | lock-holding key/offset iterator                         |
//! | [`error`]   | error taxonomy and the sticky error-flag accumulator     |
//!
//! ## Consistency
//!
//! The data file and the in-memory index must never drift. Every mutator
//! either completes, rolls back its partial effects, or (when the rollback
//! itself fails) closes the file handle so all later file operations fail
//! fast with [`StoreError::Io`] until a fresh store is loaded. There is no
//! journal: a torn write during a power cut can corrupt the file.
//!
//! ## Concurrency
//!
//! Each store owns one recursive mutex. Every public operation locks on
//! entry, so parallel callers are serialized per store, and composite
//! operations ([`Store::upsert`], [`Store::update_with`]) stay atomic by
//! re-entering the lock they already hold. The iterator returned by
//! [`Store::iter`] holds the lock for its whole lifetime and bumps a counter
//! that makes `insert`, `delete`, and `truncate` refuse with
//! [`StoreError::CantDoItNow`]; `update` stays legal because it preserves
//! the key set and its ordering.

mod error;
mod iter;
mod load;
mod read;
mod write;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;

use block::BlockFile;
use freelist::FreeList;

pub use block::{Block, BlockError, BlockField, HEADER_LEN, MAX_BLOCK_LEN};
pub use error::{ErrorFlags, StoreError};
pub use iter::Iter;

/// Fraction of extra capacity given to variable-length fields in newly
/// allocated blocks, so later in-place updates have room to grow.
pub const DEFAULT_PADDING_FRACTION: f32 = 0.20;

/// Maximum accepted length of the data-file path, in bytes.
pub const MAX_PATH_LEN: usize = 255;

/// Mutable engine state, shared behind the store's recursive mutex.
pub(crate) struct State<K> {
    /// Open data file; `None` before `load`, after a failed load, and after
    /// a catastrophic partial failure.
    pub(crate) file: Option<BlockFile>,
    /// Path recorded at `load`, reused by `truncate`.
    pub(crate) path: PathBuf,
    /// Recorded data-file length: the sum of all block lengths.
    pub(crate) file_size: u64,
    /// Key → block offset, complete at all times.
    pub(crate) index: BTreeMap<K, u32>,
    /// One entry per free block in the file.
    pub(crate) free: FreeList,
    /// Number of live lock-holding iterators; positive gates the
    /// schema-changing mutators.
    pub(crate) iterating: usize,
    /// Sticky accumulator of every error observed since the last clear.
    pub(crate) flags: ErrorFlags,
    pub(crate) padding_fraction: f32,
    pub(crate) sync: bool,
}

/// A persistent key-value store over a single block-allocated data file.
///
/// `K` and `V` are any [`BlockField`] types: fixed-width primitives,
/// fixed-size byte strings, or `String`. The store is `Sync`; share it
/// behind an `Arc` and call it from as many threads as needed.
///
/// # Example
///
/// ```rust,no_run
/// use store::Store;
///
/// let db: Store<String, String> = Store::new();
/// db.load("data.kv").unwrap();
/// db.insert("greeting".into(), "hello".into()).unwrap();
/// assert_eq!(db.find_value(&"greeting".to_string(), None).unwrap(), "hello");
/// ```
pub struct Store<K, V> {
    state: ReentrantMutex<RefCell<State<K>>>,
    _value: PhantomData<fn() -> V>,
}

/// RAII guard over the store's lock, so callers can batch several
/// operations into one atomic unit. Operations invoked while the guard is
/// alive re-enter the recursive mutex and run without interleaving.
pub struct StoreGuard<'a, K> {
    _guard: ReentrantMutexGuard<'a, RefCell<State<K>>>,
}

impl<K: BlockField + Ord + Clone, V: BlockField> Store<K, V> {
    /// Creates an empty, unloaded store with default options.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_PADDING_FRACTION, false)
    }

    /// Creates an empty, unloaded store.
    ///
    /// `padding_fraction` is the extra capacity granted to variable-length
    /// fields at allocation time; `sync` makes every flush reach stable
    /// storage before returning.
    pub fn with_options(padding_fraction: f32, sync: bool) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(State {
                file: None,
                path: PathBuf::new(),
                file_size: 0,
                index: BTreeMap::new(),
                free: FreeList::new(),
                iterating: 0,
                flags: ErrorFlags::default(),
                padding_fraction,
                sync,
            })),
            _value: PhantomData,
        }
    }

    /// Number of key-value pairs currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().borrow().index.len()
    }

    /// Returns `true` when the store holds no key-value pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once a data file has been successfully loaded and not
    /// closed by a catastrophic failure since.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.lock().borrow().file.is_some()
    }

    /// Length of the data file in bytes: the sum of all block lengths,
    /// used and free.
    #[must_use]
    pub fn data_file_size(&self) -> u64 {
        self.state.lock().borrow().file_size
    }

    /// Number of free blocks awaiting reuse.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.state.lock().borrow().free.len()
    }

    #[must_use]
    pub fn padding_fraction(&self) -> f32 {
        self.state.lock().borrow().padding_fraction
    }

    /// Changes the padding fraction for blocks allocated from now on.
    /// Existing blocks keep the capacity they were written with.
    pub fn set_padding_fraction(&self, padding_fraction: f32) {
        let state = self.state.lock();
        state.borrow_mut().padding_fraction = padding_fraction;
    }

    /// The errors observed since the last
    /// [`clear_error_flags`](Self::clear_error_flags), OR-ed together.
    #[must_use]
    pub fn error_flags(&self) -> ErrorFlags {
        self.state.lock().borrow().flags
    }

    pub fn clear_error_flags(&self) {
        let state = self.state.lock();
        state.borrow_mut().flags = ErrorFlags::default();
    }

    /// Takes the store's lock until the guard is dropped.
    ///
    /// Useful for batching: every operation called while the guard lives
    /// re-enters the recursive mutex, so the batch executes atomically with
    /// respect to other callers.
    pub fn lock(&self) -> StoreGuard<'_, K> {
        StoreGuard {
            _guard: self.state.lock(),
        }
    }

    /// Records a failed result in the sticky error flags before handing it
    /// back to the caller. Every public operation funnels through here.
    pub(crate) fn note<T>(
        cell: &RefCell<State<K>>,
        res: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if let Err(ref e) = res {
            cell.borrow_mut().flags.record(e);
        }
        res
    }

    pub(crate) fn state(&self) -> &ReentrantMutex<RefCell<State<K>>> {
        &self.state
    }

    /// The error every file operation returns once the store has no open
    /// data file.
    pub(crate) fn not_loaded() -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "no data file loaded",
        ))
    }
}

impl<K: BlockField + Ord + Clone, V: BlockField> Default for Store<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: BlockField + Ord + Clone, V: BlockField> std::fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let s = state.borrow();
        f.debug_struct("Store")
            .field("loaded", &s.file.is_some())
            .field("path", &s.path)
            .field("len", &s.index.len())
            .field("data_file_size", &s.file_size)
            .field("free_blocks", &s.free.len())
            .field("iterating", &s.iterating)
            .field("padding_fraction", &s.padding_fraction)
            .field("error_flags", &s.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests;
