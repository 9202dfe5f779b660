//! # Block - on-disk block codec
//!
//! The data file of an EmberKV store is a concatenation of **blocks**. This
//! crate owns the byte-level layout of a single block and the file handle
//! used to read and write blocks at arbitrary offsets.
//!
//! ## Binary Block Format
//!
//! ```text
//! [header: i16 LE][key bytes][value bytes][padding ...]
//! ```
//!
//! The header is the total block length in bytes, **including** the header
//! itself. A positive header marks a used block; a negative header marks a
//! free block of the absolute length (its contents beyond the header are
//! meaningless). A zero header never occurs in a well-formed file and is
//! reported as corruption.
//!
//! Field encoding depends on the stored type (see [`BlockField`]):
//!
//! - fixed-width primitives and `[u8; N]`: raw little-endian bytes;
//! - `String`: UTF-8 bytes followed by a single zero terminator.
//!
//! A used block may be longer than its key + value need; the excess is
//! padding left for in-place growth and readers ignore it.
//!
//! ## Write Discipline
//!
//! Every block write is assembled into an in-memory scratch buffer first and
//! then handed to the file in a single `write_all` call, so the window in
//! which the file holds a half-written block is as narrow as the filesystem
//! allows. There is no journal: a torn write can still corrupt the file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use block::{Block, BlockFile};
//!
//! let mut f = BlockFile::open("data.kv", false).unwrap();
//! f.write_block(0, 16, &1u32, &"hello".to_string()).unwrap();
//! match f.read_block::<u32, String>(0, false).unwrap() {
//!     Block::Used { key, value, .. } => println!("{key} -> {value:?}"),
//!     Block::Free { len } => println!("free block of {len} bytes"),
//! }
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

mod field;
pub use field::BlockField;

/// Size of the block-size header in bytes.
pub const HEADER_LEN: usize = 2;

/// Maximum total length of a single block, header included.
pub const MAX_BLOCK_LEN: usize = 32 * 1024;

/// Errors that can occur while encoding, decoding, or transferring blocks.
#[derive(Debug, Error)]
pub enum BlockError {
    /// An underlying I/O error (seek, read, write, open).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A block that cannot be decoded: zero header, a length that does not
    /// cover the header, a string field without its zero terminator, or a
    /// header that cannot be represented on disk.
    #[error("corrupt block")]
    Corrupt,
}

/// One decoded block.
///
/// `Free` carries only the total length recovered from the negative header.
/// `Used` carries the decoded key and, unless the read skipped it, the
/// decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Block<K, V> {
    /// A free block of `len` total bytes.
    Free { len: u16 },
    /// A used block of `len` total bytes. `value` is `None` when the caller
    /// asked for the key only.
    Used { len: u16, key: K, value: Option<V> },
}

/// Read/write handle over a block data file.
///
/// Owns the `File` plus a reusable scratch buffer so that neither reads nor
/// writes allocate per call. All offsets are `u32` byte offsets from the
/// start of the file, matching the store's index representation.
pub struct BlockFile {
    file: File,
    sync: bool,
    /// Scratch buffer reused for block assembly and block decoding.
    buf: Vec<u8>,
}

impl BlockFile {
    /// Opens a data file for read/write access, creating it empty if it does
    /// not exist. Existing contents are preserved.
    ///
    /// When `sync` is `true`, every [`flush`](Self::flush) also calls
    /// `sync_data` so the blocks reach stable storage before the call
    /// returns.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, BlockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Opens a data file for read/write access, truncating any existing
    /// contents to zero length.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, BlockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Returns the current file length in bytes.
    pub fn len(&self) -> Result<u64, BlockError> {
        Ok(self.file.metadata()?.len())
    }

    /// Returns `true` if the file currently holds no blocks.
    pub fn is_empty(&self) -> Result<bool, BlockError> {
        Ok(self.len()? == 0)
    }

    /// Reads the raw block-size header at `offset`.
    ///
    /// A zero header is reported as [`BlockError::Corrupt`]; callers never
    /// have to re-check.
    pub fn read_header(&mut self, offset: u32) -> Result<i16, BlockError> {
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        let header = self.file.read_i16::<LittleEndian>()?;
        if header == 0 {
            return Err(BlockError::Corrupt);
        }
        Ok(header)
    }

    /// Reads and decodes the block at `offset`.
    ///
    /// A negative header returns [`Block::Free`] immediately without touching
    /// the rest of the block. For a used block the remaining `len - 2` bytes
    /// are read in one call and the key (and value, unless `skip_value`) are
    /// decoded from the in-memory copy.
    pub fn read_block<K: BlockField, V: BlockField>(
        &mut self,
        offset: u32,
        skip_value: bool,
    ) -> Result<Block<K, V>, BlockError> {
        let header = self.read_header(offset)?;
        if header < 0 {
            return Ok(Block::Free {
                len: header.unsigned_abs(),
            });
        }

        let len = header as u16;
        if (len as usize) <= HEADER_LEN {
            return Err(BlockError::Corrupt);
        }

        self.buf.clear();
        self.buf.resize(len as usize - HEADER_LEN, 0);
        self.file.read_exact(&mut self.buf)?;

        let mut cursor = &self.buf[..];
        let key = K::decode_from(&mut cursor)?;
        let value = if skip_value {
            None
        } else {
            Some(V::decode_from(&mut cursor)?)
        };

        Ok(Block::Used { len, key, value })
    }

    /// Assembles and writes a full used block at `offset` in a single call.
    ///
    /// The block is laid out as header, key, value, then zero padding up to
    /// `block_len` bytes. `block_len` must be large enough to hold all three;
    /// the store guarantees this by construction.
    pub fn write_block<K: BlockField, V: BlockField>(
        &mut self,
        offset: u32,
        block_len: u16,
        key: &K,
        value: &V,
    ) -> Result<(), BlockError> {
        let header = i16::try_from(block_len).map_err(|_| BlockError::Corrupt)?;

        self.buf.clear();
        self.buf.write_i16::<LittleEndian>(header)?;
        key.encode_into(&mut self.buf);
        value.encode_into(&mut self.buf);
        debug_assert!(self.buf.len() <= block_len as usize);
        self.buf.resize(block_len as usize, 0);

        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.write_all(&self.buf)?;
        Ok(())
    }

    /// Overwrites only the value bytes of an existing used block.
    ///
    /// `offset` must point at the first value byte (block offset + header +
    /// encoded key length). The block header and any trailing padding are
    /// left untouched. The write is a single call.
    pub fn write_value<V: BlockField>(
        &mut self,
        offset: u32,
        value: &V,
    ) -> Result<(), BlockError> {
        self.buf.clear();
        value.encode_into(&mut self.buf);
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.write_all(&self.buf)?;
        Ok(())
    }

    /// Overwrites the block-size header at `offset`.
    ///
    /// Used to mark a block free (negative header) and to roll back a failed
    /// block write.
    pub fn write_header(&mut self, offset: u32, header: i16) -> Result<(), BlockError> {
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.write_i16::<LittleEndian>(header)?;
        Ok(())
    }

    /// Flushes buffered data, following with `sync_data` when the file was
    /// opened in sync mode.
    pub fn flush(&mut self) -> Result<(), BlockError> {
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
