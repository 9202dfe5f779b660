//! Per-type field encoding.
//!
//! A block stores one key and one value back to back. How many bytes each
//! occupies, and how those bytes are produced and consumed, depends only on
//! the field's type, so the capability lives in a trait the store is generic
//! over. The allocation padding policy keys off [`BlockField::IS_VARIABLE_LEN`]:
//! only variable-length fields get breathing room for in-place growth.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::BlockError;

/// A type that can be stored as the key or value field of a block.
///
/// Fixed-width implementors encode as raw little-endian bytes of their
/// natural width. Variable-length implementors define their own framing;
/// `String` uses a trailing zero byte.
pub trait BlockField: Sized {
    /// `true` when the encoded width depends on the value.
    const IS_VARIABLE_LEN: bool;

    /// Number of bytes [`encode_into`](Self::encode_into) will append.
    fn encoded_len(&self) -> usize;

    /// Appends the encoded bytes to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>);

    /// Decodes one field from the front of `buf`, advancing it past the
    /// consumed bytes.
    fn decode_from(buf: &mut &[u8]) -> Result<Self, BlockError>;
}

macro_rules! fixed_width_field {
    ($t:ty, $read:ident) => {
        impl BlockField for $t {
            const IS_VARIABLE_LEN: bool = false;

            fn encoded_len(&self) -> usize {
                std::mem::size_of::<$t>()
            }

            fn encode_into(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            fn decode_from(buf: &mut &[u8]) -> Result<Self, BlockError> {
                Ok(buf.$read::<LittleEndian>()?)
            }
        }
    };
}

fixed_width_field!(u16, read_u16);
fixed_width_field!(u32, read_u32);
fixed_width_field!(u64, read_u64);
fixed_width_field!(i16, read_i16);
fixed_width_field!(i32, read_i32);
fixed_width_field!(i64, read_i64);
fixed_width_field!(f32, read_f32);
fixed_width_field!(f64, read_f64);

impl BlockField for u8 {
    const IS_VARIABLE_LEN: bool = false;

    fn encoded_len(&self) -> usize {
        1
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }

    fn decode_from(buf: &mut &[u8]) -> Result<Self, BlockError> {
        Ok(buf.read_u8()?)
    }
}

impl BlockField for i8 {
    const IS_VARIABLE_LEN: bool = false;

    fn encoded_len(&self) -> usize {
        1
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(*self as u8);
    }

    fn decode_from(buf: &mut &[u8]) -> Result<Self, BlockError> {
        Ok(buf.read_i8()?)
    }
}

/// Fixed-size byte strings: raw bytes of exactly `N` width, no framing.
impl<const N: usize> BlockField for [u8; N] {
    const IS_VARIABLE_LEN: bool = false;

    fn encoded_len(&self) -> usize {
        N
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode_from(buf: &mut &[u8]) -> Result<Self, BlockError> {
        let mut out = [0u8; N];
        buf.read_exact(&mut out)?;
        Ok(out)
    }
}

/// Variable-length strings: UTF-8 bytes plus one zero terminator.
///
/// Decoding scans for the terminator inside the block body; a body that ends
/// before the terminator is reported as corruption, as is a stored string
/// that is not valid UTF-8.
impl BlockField for String {
    const IS_VARIABLE_LEN: bool = true;

    fn encoded_len(&self) -> usize {
        self.len() + 1
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
        buf.push(0);
    }

    fn decode_from(buf: &mut &[u8]) -> Result<Self, BlockError> {
        let end = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(BlockError::Corrupt)?;
        let s = std::str::from_utf8(&buf[..end])
            .map_err(|_| BlockError::Corrupt)?
            .to_owned();
        *buf = &buf[end + 1..];
        Ok(s)
    }
}
