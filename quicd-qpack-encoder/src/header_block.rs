//! Encoded field section: prefix and field line representations
//! (RFC 9204 Section 4.5).
//!
//! ```text
//! [Encoded Insert Count (8+)][S | Delta Base (7+)][field line]*
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::field::ENTRY_OVERHEAD;
use crate::prefix_int::{encode_int, encode_int_with_prefix, encode_string};

/// Encodes the Required Insert Count for the section prefix (RFC 9204
/// Section 4.5.1.1).
///
/// `max_table_capacity` is the decoder's SETTINGS_QPACK_MAX_TABLE_CAPACITY.
pub fn encode_insert_count(required_insert_count: u64, max_table_capacity: usize) -> u64 {
    if required_insert_count == 0 {
        return 0;
    }

    let max_entries = (max_table_capacity / ENTRY_OVERHEAD) as u64;
    debug_assert!(max_entries > 0, "dynamic references with a zero-capacity table");
    (required_insert_count % (2 * max_entries.max(1))) + 1
}

/// Field section prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPrefix {
    pub required_insert_count: u64,
    pub base: u64,
}

impl EncodedPrefix {
    /// Sign bit: set when Base is below the Required Insert Count.
    pub fn sign(&self) -> bool {
        self.base < self.required_insert_count
    }

    pub fn delta_base(&self) -> u64 {
        if self.sign() {
            self.required_insert_count - self.base - 1
        } else {
            self.base - self.required_insert_count
        }
    }

    pub fn encode<B: BufMut>(&self, max_table_capacity: usize, buf: &mut B) {
        let encoded_insert_count =
            encode_insert_count(self.required_insert_count, max_table_capacity);
        encode_int(buf, encoded_insert_count, 8);

        let sign = if self.sign() { 0x80 } else { 0x00 };
        encode_int_with_prefix(buf, self.delta_base(), 7, sign);
    }
}

/// One field line representation, with dynamic entries held by absolute
/// index until the section Base is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLine {
    /// Indexed Field Line, static table.
    IndexedStatic { index: u64 },

    /// Indexed Field Line (or post-base), dynamic table.
    IndexedDynamic { absolute_index: u64 },

    /// Literal Field Line With Name Reference, static table.
    LiteralStaticName {
        name_index: u64,
        value: Bytes,
        never_indexed: bool,
        huffman: bool,
    },

    /// Literal Field Line With (post-base) Name Reference, dynamic table.
    LiteralDynamicName {
        absolute_index: u64,
        value: Bytes,
        never_indexed: bool,
        huffman: bool,
    },

    /// Literal Field Line With Literal Name.
    LiteralName {
        name: Bytes,
        value: Bytes,
        never_indexed: bool,
        huffman: bool,
    },
}

impl FieldLine {
    /// Insert count the decoder needs before it can decode this line.
    pub fn required_insert_count(&self) -> u64 {
        match self {
            FieldLine::IndexedDynamic { absolute_index }
            | FieldLine::LiteralDynamicName { absolute_index, .. } => absolute_index + 1,
            _ => 0,
        }
    }

    /// Serializes the line relative to `base`.
    pub fn encode(&self, base: u64, buf: &mut BytesMut) {
        match self {
            FieldLine::IndexedStatic { index } => {
                // 1 | T=1 | Index (6+)
                encode_int_with_prefix(buf, *index, 6, 0xC0);
            }

            FieldLine::IndexedDynamic { absolute_index } => {
                if *absolute_index < base {
                    // 1 | T=0 | Relative Index (6+)
                    encode_int_with_prefix(buf, base - 1 - absolute_index, 6, 0x80);
                } else {
                    // 0001 | Post-Base Index (4+)
                    encode_int_with_prefix(buf, absolute_index - base, 4, 0x10);
                }
            }

            FieldLine::LiteralStaticName {
                name_index,
                value,
                never_indexed,
                huffman,
            } => {
                // 01 | N | T=1 | Name Index (4+)
                let n = if *never_indexed { 0x20 } else { 0x00 };
                encode_int_with_prefix(buf, *name_index, 4, 0x50 | n);
                encode_string(buf, value, 7, 0x00, *huffman);
            }

            FieldLine::LiteralDynamicName {
                absolute_index,
                value,
                never_indexed,
                huffman,
            } => {
                if *absolute_index < base {
                    // 01 | N | T=0 | Relative Index (4+)
                    let n = if *never_indexed { 0x20 } else { 0x00 };
                    encode_int_with_prefix(buf, base - 1 - absolute_index, 4, 0x40 | n);
                } else {
                    // 0000 | N | Post-Base Name Index (3+)
                    let n = if *never_indexed { 0x08 } else { 0x00 };
                    encode_int_with_prefix(buf, absolute_index - base, 3, n);
                }
                encode_string(buf, value, 7, 0x00, *huffman);
            }

            FieldLine::LiteralName {
                name,
                value,
                never_indexed,
                huffman,
            } => {
                // 001 | N | H | Name Length (3+)
                let n = if *never_indexed { 0x10 } else { 0x00 };
                encode_string(buf, name, 3, 0x20 | n, *huffman);
                encode_string(buf, value, 7, 0x00, *huffman);
            }
        }
    }
}
