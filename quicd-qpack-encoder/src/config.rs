//! Encoder configuration.
//!
//! `max_table_capacity` and `max_blocked_streams` mirror the peer decoder's
//! SETTINGS_QPACK_MAX_TABLE_CAPACITY and SETTINGS_QPACK_BLOCKED_STREAMS;
//! the encoder must never exceed either.

use serde::{Deserialize, Serialize};

/// Upper bound accepted for `draining_percent`.
const MAX_DRAINING_PERCENT: usize = 100;

/// Configuration for a QPACK [`Encoder`](crate::Encoder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Largest dynamic table capacity the decoder accepts (default: 4 KB).
    ///
    /// RFC 9204 Section 3.2.3: also used to encode the Required Insert
    /// Count of every field section.
    pub max_table_capacity: usize,

    /// Number of streams the decoder allows to be blocked (default: 100).
    ///
    /// RFC 9204 Section 2.1.2. Zero forbids any reference to an entry the
    /// decoder has not acknowledged.
    pub max_blocked_streams: usize,

    /// Share of the table kept free by draining the oldest entries
    /// (default: 25).
    pub draining_percent: usize,

    /// Reject field names that are empty or start with a control or space
    /// character (default: true).
    pub validate_field_names: bool,

    /// Huffman code strings when that makes them shorter (default: true).
    pub huffman: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_table_capacity: 4096, // 4 KB
            max_blocked_streams: 100,
            draining_percent: 25,
            validate_field_names: true,
            huffman: true,
        }
    }
}

impl EncoderConfig {
    /// Configuration that never uses the dynamic table.
    ///
    /// Field sections only ever reference the static table, so they never
    /// block and need no acknowledgment to release state.
    pub fn static_only() -> Self {
        Self {
            max_table_capacity: 0,
            max_blocked_streams: 0,
            ..Default::default()
        }
    }

    /// Configuration for peers advertising large tables.
    pub fn high_throughput() -> Self {
        Self {
            max_table_capacity: 16384, // 16 KB
            max_blocked_streams: 500,
            draining_percent: 10,
            ..Default::default()
        }
    }

    /// Validate configuration values are within reasonable bounds.
    ///
    /// Returns every problem found rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.draining_percent > MAX_DRAINING_PERCENT {
            errors.push(format!(
                "draining_percent ({}) must be between 0 and {}",
                self.draining_percent, MAX_DRAINING_PERCENT
            ));
        }

        if self.max_table_capacity > 0 && self.max_table_capacity < crate::field::ENTRY_OVERHEAD
        {
            errors.push(format!(
                "max_table_capacity ({}) cannot hold a single entry; use 0 to disable the \
                 dynamic table",
                self.max_table_capacity
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
