//! QPACK: Header Compression for HTTP/3 (RFC 9204), encoder side.
//!
//! This crate provides the stateful half of QPACK that a sender runs: it
//! turns header lists into encoded field sections while keeping a dynamic
//! table in step with the peer decoder.
//!
//! # Features
//!
//! - **Reference-counted dynamic table**: entries referenced by
//!   unacknowledged field sections are never evicted, and capacity
//!   reductions wait until they are safe.
//! - **Blocked stream budget**: references to entries the decoder has not
//!   confirmed are bounded by SETTINGS_QPACK_BLOCKED_STREAMS.
//! - **Decoder feedback**: Section Acknowledgment, Stream Cancellation and
//!   Insert Count Increment, either as calls or as raw decoder stream bytes.
//! - **Field policy**: sensitive headers stay out of the dynamic table and
//!   carry the never-indexed bit.
//!
//! # Example
//!
//! ```rust
//! use quicd_qpack_encoder::{Encoder, EncoderInstruction, HeaderField};
//!
//! let mut encoder = Encoder::new(Vec::<EncoderInstruction>::new(), 100);
//! encoder.set_capacity(4096).unwrap();
//!
//! let headers = vec![
//!     HeaderField::new(":method", "GET"),
//!     HeaderField::new(":path", "/"),
//!     HeaderField::new("x-request-id", "42"),
//! ];
//! let section = encoder.encode(0, &headers).unwrap();
//! assert!(!section.is_empty());
//!
//! // SetCapacity plus one insertion for x-request-id
//! assert_eq!(encoder.handler().len(), 2);
//!
//! // Feed back what the decoder sent on its stream
//! let consumed = encoder.process_decoder_stream(&[0x01]).unwrap();
//! assert_eq!(consumed, 1);
//! assert_eq!(encoder.known_insert_count(), 1);
//! ```

pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod field;
pub mod header_block;
pub mod huffman;
pub mod instructions;
pub mod policy;
pub mod prefix_int;
pub mod static_table;
pub mod stream_info;
pub mod table;

// Re-export main types
pub use config::EncoderConfig;
pub use context::{EntryRef, LookupContext};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use field::HeaderField;
pub use header_block::{encode_insert_count, EncodedPrefix, FieldLine};
pub use instructions::{DecoderInstruction, EncoderInstruction, FnHandler, InstructionHandler};
pub use policy::{DefaultFieldPolicy, FieldPolicy};
pub use stream_info::{SectionInfo, StreamInfo};
pub use table::{DynamicTable, Entry};

// Re-export utilities for benchmarking and testing
pub use huffman::{encode as huffman_encode, encoded_size};
pub use prefix_int::{decode_int, encode_int};
