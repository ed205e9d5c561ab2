//! Error types for QPACK encoder operations.
//!
//! Every protocol error surfaced here is fatal to the connection: encoder
//! and decoder state can no longer be assumed to agree, and retrying the
//! failed call cannot repair that. Error codes map to the HTTP/3 codes
//! from RFC 9114 Section 8.1 and RFC 9204 Section 6.

use thiserror::Error;

/// Result type for QPACK encoder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding or while processing decoder feedback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A field name is empty or starts with a control character.
    ///
    /// Raised before anything is emitted for the field section.
    #[error("stream {stream_id}: invalid field name {name:?}")]
    InvalidFieldName { stream_id: u64, name: String },

    /// Section Acknowledgment or Stream Cancellation for a stream that has
    /// no outstanding field sections.
    #[error("no outstanding field sections for stream {stream_id}")]
    UnknownStream { stream_id: u64 },

    /// Insert Count Increment would raise the Known Received Count past the
    /// number of entries actually inserted.
    #[error("insert count increment {increment} overruns insert count {insert_count} (known {known})")]
    InsertCountOverrun {
        known: u64,
        increment: u64,
        insert_count: u64,
    },

    /// Insert Count Increment carrying zero (RFC 9204 Section 4.4.3).
    #[error("insert count increment of zero")]
    ZeroIncrement,

    /// Malformed data on the decoder stream.
    ///
    /// Maps to HTTP/3 error code `QPACK_DECODER_STREAM_ERROR` (0x0202).
    #[error("decoder stream error: {0}")]
    DecoderStreamError(String),

    /// Integer encoding/decoding error.
    #[error("integer encoding error: {0}")]
    IntegerError(String),

    /// Incomplete data - need more bytes.
    #[error("incomplete data: need {0} more bytes")]
    Incomplete(usize),

    /// Requested capacity is larger than the peer allows.
    #[error("capacity {capacity} exceeds maximum {maximum}")]
    CapacityExceedsMaximum { capacity: usize, maximum: usize },

    /// Rejected encoder configuration.
    #[error("invalid encoder configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}

/// HTTP/3 `H3_MESSAGE_ERROR`.
pub const H3_MESSAGE_ERROR: u64 = 0x010e;
/// HTTP/3 `H3_INTERNAL_ERROR`.
pub const H3_INTERNAL_ERROR: u64 = 0x0102;
/// QPACK `QPACK_DECODER_STREAM_ERROR`.
pub const QPACK_DECODER_STREAM_ERROR: u64 = 0x0202;

impl Error {
    /// Returns the HTTP/3 error code for this error.
    pub fn error_code(&self) -> u64 {
        match self {
            Error::InvalidFieldName { .. } => H3_MESSAGE_ERROR,
            Error::UnknownStream { .. }
            | Error::InsertCountOverrun { .. }
            | Error::ZeroIncrement
            | Error::DecoderStreamError(_)
            | Error::IntegerError(_)
            | Error::Incomplete(_) => QPACK_DECODER_STREAM_ERROR,
            Error::CapacityExceedsMaximum { .. } | Error::InvalidConfig(_) => H3_INTERNAL_ERROR,
        }
    }

    /// Returns the stream the error relates to, if any.
    pub fn stream_id(&self) -> Option<u64> {
        match self {
            Error::InvalidFieldName { stream_id, .. } | Error::UnknownStream { stream_id } => {
                Some(*stream_id)
            }
            _ => None,
        }
    }

    /// Returns true if the caller must tear down the connection.
    ///
    /// Only local misuse (bad configuration or capacity) and a short read
    /// are survivable.
    pub fn is_connection_error(&self) -> bool {
        !matches!(
            self,
            Error::Incomplete(_) | Error::CapacityExceedsMaximum { .. } | Error::InvalidConfig(_)
        )
    }
}
