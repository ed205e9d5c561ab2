//! Per-field indexing and Huffman policy.
//!
//! Sensitive values stay out of the dynamic table, which lives as long as
//! the connection and is shared by all of its streams. A stricter subset
//! is also excluded from Huffman coding.

use crate::field::HeaderField;

/// Decides how a single field may be encoded.
pub trait FieldPolicy: Send + Sync {
    /// Whether the field may be inserted into the dynamic table.
    fn should_index(&self, field: &HeaderField) -> bool;

    /// Whether the field line must carry the never-indexed (N) bit, which
    /// forbids intermediaries from indexing it when re-encoding.
    fn never_index(&self, field: &HeaderField) -> bool;

    /// Whether name and value strings of the field may be Huffman coded.
    fn should_huffman_encode(&self, field: &HeaderField) -> bool;
}

/// Fields never added to the dynamic table.
pub const DO_NOT_INDEX: &[&str] = &[
    "authorization",
    "content-md5",
    "content-range",
    "etag",
    "if-modified-since",
    "if-unmodified-since",
    "if-none-match",
    "if-range",
    "if-match",
    "location",
    "range",
    "retry-after",
    "last-modified",
    "set-cookie",
    "set-cookie2",
];

/// Fields sent with the never-indexed bit.
pub const NEVER_INDEX: &[&str] = &["authorization", "set-cookie", "set-cookie2"];

/// Fields whose strings are never Huffman coded.
pub const DO_NOT_HUFFMAN: &[&str] = &[
    "authorization",
    "content-md5",
    "proxy-authenticate",
    "proxy-authorization",
];

#[inline]
fn listed(list: &[&str], name: &[u8]) -> bool {
    list.iter().any(|entry| entry.as_bytes().eq_ignore_ascii_case(name))
}

/// Policy built from [`DO_NOT_INDEX`], [`NEVER_INDEX`] and [`DO_NOT_HUFFMAN`].
#[derive(Debug, Clone, Copy)]
pub struct DefaultFieldPolicy {
    huffman: bool,
}

impl DefaultFieldPolicy {
    /// `huffman` switches Huffman coding on or off for every field.
    pub fn new(huffman: bool) -> Self {
        Self { huffman }
    }
}

impl Default for DefaultFieldPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FieldPolicy for DefaultFieldPolicy {
    fn should_index(&self, field: &HeaderField) -> bool {
        !listed(DO_NOT_INDEX, &field.name)
    }

    fn never_index(&self, field: &HeaderField) -> bool {
        listed(NEVER_INDEX, &field.name)
    }

    fn should_huffman_encode(&self, field: &HeaderField) -> bool {
        self.huffman && !listed(DO_NOT_HUFFMAN, &field.name)
    }
}
