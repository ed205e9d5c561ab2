//! Header field representation.

use bytes::Bytes;
use std::fmt;

/// Per-entry overhead added to name and value length (RFC 9204 Section 3.2.1).
pub const ENTRY_OVERHEAD: usize = 32;

/// An HTTP header or trailer field (name-value pair).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

impl HeaderField {
    /// Creates a new header field.
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Size this field occupies as a dynamic table entry.
    #[inline]
    pub fn size(&self) -> usize {
        entry_size(&self.name, &self.value)
    }
}

/// Dynamic table size of a name/value pair: `name_len + value_len + 32`.
#[inline]
pub fn entry_size(name: &[u8], value: &[u8]) -> usize {
    name.len() + value.len() + ENTRY_OVERHEAD
}

impl fmt::Debug for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HeaderField({:?}: {:?})",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

impl From<(&'static str, &'static str)> for HeaderField {
    fn from((name, value): (&'static str, &'static str)) -> Self {
        Self::new(name, value)
    }
}

impl From<(Bytes, Bytes)> for HeaderField {
    fn from((name, value): (Bytes, Bytes)) -> Self {
        Self { name, value }
    }
}
