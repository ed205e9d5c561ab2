//! Prefix integer and string literal coding per RFC 7541 Section 5.
//!
//! An integer is stored in the low N bits of a byte that it shares with
//! instruction flags. Values that do not fit in `2^N - 1` set all prefix
//! bits and continue in base-128 groups, least significant first, with the
//! high bit marking continuation. RFC 9204 requires support for values up
//! to 62 bits.

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::huffman;

/// Maximum integer value that can be encoded (2^62 - 1).
pub const MAX_INTEGER: u64 = (1u64 << 62) - 1;

#[inline]
fn prefix_max(prefix_bits: u8) -> u64 {
    (1u64 << prefix_bits) - 1
}

/// Encode an integer with an N-bit prefix.
///
/// `prefix_mask` carries the bits of the first byte that lie outside the
/// prefix (instruction pattern and flags).
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use quicd_qpack_encoder::prefix_int::encode_int_with_prefix;
///
/// let mut buf = BytesMut::new();
/// encode_int_with_prefix(&mut buf, 10, 5, 0b001_00000);
/// assert_eq!(&buf[..], &[0b001_01010]);
/// ```
#[inline]
pub fn encode_int_with_prefix<B: BufMut>(buf: &mut B, value: u64, prefix_bits: u8, prefix_mask: u8) {
    debug_assert!((1..=8).contains(&prefix_bits));
    debug_assert!(value <= MAX_INTEGER);

    let max_first_byte = prefix_max(prefix_bits);

    // Fast path: fits in first byte (most common case)
    if value < max_first_byte {
        buf.put_u8(prefix_mask | value as u8);
        return;
    }

    buf.put_u8(prefix_mask | max_first_byte as u8);
    let mut remaining = value - max_first_byte;

    while remaining >= 128 {
        buf.put_u8(0x80 | (remaining & 0x7F) as u8);
        remaining >>= 7;
    }

    buf.put_u8(remaining as u8);
}

/// Encode an integer with zero prefix mask (all bits available).
#[inline]
pub fn encode_int<B: BufMut>(buf: &mut B, value: u64, prefix_bits: u8) {
    encode_int_with_prefix(buf, value, prefix_bits, 0)
}

/// Encode a string literal: `H | Length (N+) | Data`.
///
/// The Huffman flag sits directly above the length prefix. When `huffman`
/// is set the string is Huffman coded only if that is strictly shorter.
pub fn encode_string<B: BufMut>(
    buf: &mut B,
    data: &[u8],
    prefix_bits: u8,
    prefix_mask: u8,
    huffman: bool,
) {
    debug_assert!((1..=7).contains(&prefix_bits));

    if huffman {
        let huffman_size = huffman::encoded_size(data);
        if huffman_size < data.len() {
            let h_bit = 1u8 << prefix_bits;
            encode_int_with_prefix(buf, huffman_size as u64, prefix_bits, prefix_mask | h_bit);
            let mut encoded = Vec::with_capacity(huffman_size);
            huffman::encode(data, &mut encoded);
            buf.put_slice(&encoded);
            return;
        }
    }

    encode_int_with_prefix(buf, data.len() as u64, prefix_bits, prefix_mask);
    buf.put_slice(data);
}

/// Decode a prefix integer from a byte slice.
///
/// Returns `(value, bytes_consumed)`. A truncated integer yields
/// [`Error::Incomplete`] so that stream readers can wait for more data.
pub fn decode_int(data: &[u8], prefix_bits: u8) -> Result<(u64, usize)> {
    if !(1..=8).contains(&prefix_bits) {
        return Err(Error::IntegerError("prefix_bits must be 1-8".into()));
    }

    let first = *data.first().ok_or(Error::Incomplete(1))?;
    let mask = prefix_max(prefix_bits);
    let mut value = u64::from(first) & mask;

    if value < mask {
        return Ok((value, 1));
    }

    let mut pos = 1;
    let mut shift = 0u32;

    loop {
        let byte = *data.get(pos).ok_or(Error::Incomplete(1))?;
        pos += 1;

        let chunk = u64::from(byte & 0x7F);
        if shift > 56 || (chunk << shift) >> shift != chunk {
            return Err(Error::IntegerError("integer overflow".into()));
        }

        value = value
            .checked_add(chunk << shift)
            .ok_or_else(|| Error::IntegerError("integer overflow".into()))?;

        if value > MAX_INTEGER {
            return Err(Error::IntegerError("value exceeds maximum (2^62 - 1)".into()));
        }

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
    }

    Ok((value, pos))
}
