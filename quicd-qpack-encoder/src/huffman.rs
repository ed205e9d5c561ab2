//! Huffman encoding for QPACK string literals.
//!
//! Implements the static Huffman code defined in RFC 7541 Appendix B, which
//! QPACK reuses without modification. Only the encoding direction lives
//! here; whether a given string is Huffman coded at all is decided by the
//! [`FieldPolicy`](crate::policy::FieldPolicy).

/// Huffman code entry: right-aligned code bits and code length in bits.
struct HuffmanEntry {
    code: u32,
    len: u8,
}

// Symbols 0-255 plus EOS (256)
static ENCODE_TABLE: [HuffmanEntry; 257] = include!("huffman_table.inc");

/// Encodes data using Huffman coding.
///
/// Appends the encoded bytes to `output`, padding the final byte with the
/// most significant bits of EOS (all ones). Returns the number of bytes
/// written.
pub fn encode(data: &[u8], output: &mut Vec<u8>) -> usize {
    let initial_len = output.len();
    let mut acc: u64 = 0;
    let mut bits: u8 = 0;

    for &byte in data {
        let entry = &ENCODE_TABLE[byte as usize];
        acc = (acc << entry.len) | u64::from(entry.code);
        bits += entry.len;

        while bits >= 8 {
            bits -= 8;
            output.push((acc >> bits) as u8);
        }
        acc &= (1u64 << bits) - 1;
    }

    if bits > 0 {
        acc <<= 8 - bits;
        acc |= (1u64 << (8 - bits)) - 1;
        output.push(acc as u8);
    }

    output.len() - initial_len
}

/// Returns the encoded size for the given data.
pub fn encoded_size(data: &[u8]) -> usize {
    let bits: usize = data
        .iter()
        .map(|&byte| ENCODE_TABLE[byte as usize].len as usize)
        .sum();
    (bits + 7) / 8
}
