//! Canonical RLP (recursive-length prefix) decoding.
//!
//! Only the decoding side is implemented: block and receipt parsing never
//! re-encodes. The decoder is strict about canonical form — non-minimal
//! integer encodings, wrapped single bytes and short long-form payloads are
//! all rejected, and the cursor is left on the byte where the error was
//! detected so failures are deterministic.

#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]

use alloy_primitives::U256;

/// The RLP prefix of the empty string, also the lowest first byte of any
/// multi-byte string.
pub const EMPTY_STRING_CODE: u8 = 0x80;

/// The RLP prefix of the empty list.
pub const EMPTY_LIST_CODE: u8 = 0xC0;

/// Decoded length prefix of an RLP item.
///
/// After [`decode_header`] returns, the cursor points at the first byte of
/// the payload and `payload_length` bytes of body are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// True if the item is a list, false if it is a string.
    pub list: bool,
    /// Length in bytes of the payload following the prefix.
    pub payload_length: usize,
}

/// Errors produced while decoding RLP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// An integer body is wider than the requested integer type.
    #[error("overflow")]
    Overflow,
    /// A big-endian integer has a high zero byte.
    #[error("leading zero(s)")]
    LeadingZero,
    /// The input ends before the declared payload.
    #[error("input too short")]
    InputTooShort,
    /// A single byte below 0x80 was wrapped as a length-1 string.
    #[error("non-canonical single byte")]
    NonCanonicalSingleByte,
    /// A long-form header declares a payload shorter than 56 bytes.
    #[error("non-canonical size")]
    NonCanonicalSize,
    /// A list header was found where a string was required.
    #[error("unexpected list")]
    UnexpectedList,
    /// A string header was found where a list was required.
    #[error("unexpected string")]
    UnexpectedString,
}

/// Reads a big-endian unsigned integer of at most 8 bytes.
///
/// An empty slice decodes to zero. Unless `allow_leading_zeros` is set, a
/// high zero byte is rejected as non-canonical.
pub fn read_uint64(be: &[u8], allow_leading_zeros: bool) -> Result<u64, DecodeError> {
    const MAX_BYTES: usize = 8;

    if be.len() > MAX_BYTES {
        return Err(DecodeError::Overflow)
    }
    if be.is_empty() {
        return Ok(0)
    }
    if be[0] == 0 && !allow_leading_zeros {
        return Err(DecodeError::LeadingZero)
    }

    let mut buf = [0u8; MAX_BYTES];
    buf[MAX_BYTES - be.len()..].copy_from_slice(be);
    Ok(u64::from_be_bytes(buf))
}

/// Reads a big-endian unsigned integer of at most 32 bytes.
pub fn read_uint256(be: &[u8], allow_leading_zeros: bool) -> Result<U256, DecodeError> {
    const MAX_BYTES: usize = 32;

    if be.len() > MAX_BYTES {
        return Err(DecodeError::Overflow)
    }
    if be.is_empty() {
        return Ok(U256::ZERO)
    }
    if be[0] == 0 && !allow_leading_zeros {
        return Err(DecodeError::LeadingZero)
    }

    Ok(U256::from_be_slice(be))
}

/// Consumes the length prefix at the front of `from` and returns the header.
///
/// Single-byte strings (first byte below 0x80) are reported with a payload
/// length of 1 and the cursor is *not* advanced: the byte itself is the
/// payload and the caller reads it as body.
pub fn decode_header(from: &mut &[u8]) -> Result<Header, DecodeError> {
    let mut h = Header::default();
    let b = *from.first().ok_or(DecodeError::InputTooShort)?;

    if b < EMPTY_STRING_CODE {
        h.payload_length = 1;
    } else if b < 0xB8 {
        *from = &from[1..];
        h.payload_length = (b - EMPTY_STRING_CODE) as usize;
        if h.payload_length == 1 {
            let payload = *from.first().ok_or(DecodeError::InputTooShort)?;
            if payload < EMPTY_STRING_CODE {
                return Err(DecodeError::NonCanonicalSingleByte)
            }
        }
    } else if b < EMPTY_LIST_CODE {
        *from = &from[1..];
        h.payload_length = decode_long_length(from, b - 0xB7)?;
    } else if b < 0xF8 {
        *from = &from[1..];
        h.list = true;
        h.payload_length = (b - EMPTY_LIST_CODE) as usize;
    } else {
        *from = &from[1..];
        h.list = true;
        h.payload_length = decode_long_length(from, b - 0xF7)?;
    }

    if from.len() < h.payload_length {
        return Err(DecodeError::InputTooShort)
    }

    Ok(h)
}

/// Reads the `len_of_len`-byte length of a long-form string or list.
fn decode_long_length(from: &mut &[u8], len_of_len: u8) -> Result<usize, DecodeError> {
    let len_of_len = len_of_len as usize;
    if from.len() < len_of_len {
        return Err(DecodeError::InputTooShort)
    }
    let len = read_uint64(&from[..len_of_len], false)?;
    *from = &from[len_of_len..];
    if len < 56 {
        return Err(DecodeError::NonCanonicalSize)
    }
    Ok(len as usize)
}

/// A type decodable from an RLP string.
pub trait Decodable: Sized {
    /// Decodes the item at the front of `from`, advancing the cursor past it.
    fn decode(from: &mut &[u8]) -> Result<Self, DecodeError>;
}

impl Decodable for Vec<u8> {
    fn decode(from: &mut &[u8]) -> Result<Self, DecodeError> {
        let h = decode_header(from)?;
        if h.list {
            return Err(DecodeError::UnexpectedList)
        }
        let out = from[..h.payload_length].to_vec();
        *from = &from[h.payload_length..];
        Ok(out)
    }
}

impl Decodable for u64 {
    fn decode(from: &mut &[u8]) -> Result<Self, DecodeError> {
        let h = decode_header(from)?;
        if h.list {
            return Err(DecodeError::UnexpectedList)
        }
        let out = read_uint64(&from[..h.payload_length], false)?;
        *from = &from[h.payload_length..];
        Ok(out)
    }
}

impl Decodable for U256 {
    fn decode(from: &mut &[u8]) -> Result<Self, DecodeError> {
        let h = decode_header(from)?;
        if h.list {
            return Err(DecodeError::UnexpectedList)
        }
        let out = read_uint256(&from[..h.payload_length], false)?;
        *from = &from[h.payload_length..];
        Ok(out)
    }
}

/// Decodes a list of homogeneous items.
pub fn decode_vector<T: Decodable>(from: &mut &[u8]) -> Result<Vec<T>, DecodeError> {
    let h = decode_header(from)?;
    if !h.list {
        return Err(DecodeError::UnexpectedString)
    }
    let mut payload = &from[..h.payload_length];
    let mut out = Vec::new();
    while !payload.is_empty() {
        out.push(T::decode(&mut payload)?);
    }
    *from = &from[h.payload_length..];
    Ok(out)
}
