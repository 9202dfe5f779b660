//! Error taxonomy and the sticky error-flag accumulator.
//!
//! Every public operation returns the error it observed **and** ORs a bit
//! for it into the store's [`ErrorFlags`]. The flags survive across calls
//! until [`clear_error_flags`](crate::Store::clear_error_flags), so a caller
//! that ignores individual results can still ask afterwards whether anything
//! went wrong in a whole batch.

use std::io;
use thiserror::Error;

use block::BlockError;
use freelist::FreeListError;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is absent from the index.
    #[error("key not found")]
    NotFound,

    /// The encoded pair plus padding would exceed the maximum block length.
    #[error("block size limit exceeded")]
    BadAlloc,

    /// An invalid index into a container.
    #[error("index out of range")]
    OutOfRange,

    /// The key is already present (insert only).
    #[error("key already present")]
    NotUnique,

    /// The on-disk header or stored key disagrees with the index: corruption
    /// or the residue of an earlier partial failure.
    #[error("on-disk block disagrees with the index")]
    DataChanged,

    /// Seek, read, write, open, or create failed, or no data file is loaded.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A schema-changing mutation was attempted while an iterator is live,
    /// or `load` was called on an already-loaded store.
    #[error("operation cannot be performed right now")]
    CantDoItNow,
}

impl StoreError {
    fn flag_bit(&self) -> u8 {
        match self {
            StoreError::NotFound => ErrorFlags::NOT_FOUND,
            StoreError::BadAlloc => ErrorFlags::BAD_ALLOC,
            StoreError::OutOfRange => ErrorFlags::OUT_OF_RANGE,
            StoreError::NotUnique => ErrorFlags::NOT_UNIQUE,
            StoreError::DataChanged => ErrorFlags::DATA_CHANGED,
            StoreError::Io(_) => ErrorFlags::IO_ERROR,
            StoreError::CantDoItNow => ErrorFlags::CANT_DO_IT_NOW,
        }
    }
}

impl From<BlockError> for StoreError {
    fn from(e: BlockError) -> Self {
        match e {
            BlockError::Io(e) => StoreError::Io(e),
            BlockError::Corrupt => StoreError::DataChanged,
        }
    }
}

impl From<FreeListError> for StoreError {
    fn from(_: FreeListError) -> Self {
        StoreError::OutOfRange
    }
}

/// Sticky bit set of every error kind a store has observed.
///
/// One bit per [`StoreError`] variant; bits only accumulate until the caller
/// clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    pub const NOT_FOUND: u8 = 1 << 0;
    pub const BAD_ALLOC: u8 = 1 << 1;
    pub const OUT_OF_RANGE: u8 = 1 << 2;
    pub const NOT_UNIQUE: u8 = 1 << 3;
    pub const DATA_CHANGED: u8 = 1 << 4;
    pub const IO_ERROR: u8 = 1 << 5;
    pub const CANT_DO_IT_NOW: u8 = 1 << 6;

    /// The raw accumulated bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// `true` when no error has been observed since the last clear.
    pub fn is_clear(self) -> bool {
        self.0 == 0
    }

    /// `true` when the given bit (one of the associated constants) is set.
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub(crate) fn record(&mut self, e: &StoreError) {
        self.0 |= e.flag_bit();
    }
}
