//! QPACK encoder and decoder stream instructions per RFC 9204 Section 4.3
//! and 4.4.
//!
//! Encoder stream instructions (sent by this crate):
//! - Set Dynamic Table Capacity
//! - Insert With Name Reference
//! - Insert With Literal Name
//! - Duplicate
//!
//! Decoder stream instructions (received by this crate):
//! - Section Acknowledgment
//! - Stream Cancellation
//! - Insert Count Increment

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::prefix_int::{decode_int, encode_int_with_prefix, encode_string};

/// Encoder stream instruction.
///
/// Dynamic indices are relative: `0` is the most recently inserted entry at
/// the time the instruction is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInstruction {
    /// Set Dynamic Table Capacity.
    /// Pattern: 001xxxxx (capacity with 5-bit prefix)
    SetCapacity { capacity: u64 },

    /// Insert With Name Reference.
    /// Pattern: 1Txxxxxx (T=1 static, name index with 6-bit prefix)
    InsertWithNameRef {
        is_static: bool,
        name_index: u64,
        huffman: bool,
        value: Bytes,
    },

    /// Insert With Literal Name.
    /// Pattern: 01Hxxxxx (H=Huffman flag, name length with 5-bit prefix)
    InsertWithLiteralName {
        name_huffman: bool,
        name: Bytes,
        value_huffman: bool,
        value: Bytes,
    },

    /// Duplicate existing dynamic table entry.
    /// Pattern: 000xxxxx (relative index with 5-bit prefix)
    Duplicate { index: u64 },
}

impl EncoderInstruction {
    /// Serializes the instruction onto an encoder stream buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            EncoderInstruction::SetCapacity { capacity } => {
                encode_int_with_prefix(buf, *capacity, 5, 0x20);
            }

            EncoderInstruction::InsertWithNameRef {
                is_static,
                name_index,
                huffman,
                value,
            } => {
                let prefix = if *is_static { 0xC0 } else { 0x80 };
                encode_int_with_prefix(buf, *name_index, 6, prefix);
                encode_string(buf, value, 7, 0x00, *huffman);
            }

            EncoderInstruction::InsertWithLiteralName {
                name_huffman,
                name,
                value_huffman,
                value,
            } => {
                encode_string(buf, name, 5, 0x40, *name_huffman);
                encode_string(buf, value, 7, 0x00, *value_huffman);
            }

            EncoderInstruction::Duplicate { index } => {
                encode_int_with_prefix(buf, *index, 5, 0x00);
            }
        }
    }

    /// Serializes the instruction into its own buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Decoder stream instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderInstruction {
    /// Section Acknowledgment.
    /// Pattern: 1xxxxxxx (stream ID with 7-bit prefix)
    SectionAck { stream_id: u64 },

    /// Stream Cancellation.
    /// Pattern: 01xxxxxx (stream ID with 6-bit prefix)
    StreamCancel { stream_id: u64 },

    /// Insert Count Increment.
    /// Pattern: 00xxxxxx (increment with 6-bit prefix)
    InsertCountIncrement { increment: u64 },
}

impl DecoderInstruction {
    /// Serializes the instruction.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            DecoderInstruction::SectionAck { stream_id } => {
                encode_int_with_prefix(buf, *stream_id, 7, 0x80);
            }
            DecoderInstruction::StreamCancel { stream_id } => {
                encode_int_with_prefix(buf, *stream_id, 6, 0x40);
            }
            DecoderInstruction::InsertCountIncrement { increment } => {
                encode_int_with_prefix(buf, *increment, 6, 0x00);
            }
        }
    }

    /// Parses one instruction from the front of `data`.
    ///
    /// Returns `(instruction, bytes_consumed)`, or [`Error::Incomplete`] if
    /// `data` ends inside the instruction.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let first = *data.first().ok_or(Error::Incomplete(1))?;

        if first & 0x80 != 0 {
            let (stream_id, consumed) = decode_int(data, 7)?;
            Ok((DecoderInstruction::SectionAck { stream_id }, consumed))
        } else if first & 0x40 != 0 {
            let (stream_id, consumed) = decode_int(data, 6)?;
            Ok((DecoderInstruction::StreamCancel { stream_id }, consumed))
        } else {
            let (increment, consumed) = decode_int(data, 6)?;
            Ok((DecoderInstruction::InsertCountIncrement { increment }, consumed))
        }
    }
}

/// Receives encoder stream instructions as the encoder emits them.
///
/// Called synchronously from inside [`Encoder`](crate::Encoder) methods, so
/// implementations should only buffer or forward.
pub trait InstructionHandler {
    fn on_instruction(&mut self, instruction: EncoderInstruction);
}

/// Adapts a closure into an [`InstructionHandler`].
pub struct FnHandler<F>(pub F);

impl<F> InstructionHandler for FnHandler<F>
where
    F: FnMut(EncoderInstruction),
{
    fn on_instruction(&mut self, instruction: EncoderInstruction) {
        (self.0)(instruction)
    }
}

impl<H: InstructionHandler + ?Sized> InstructionHandler for &mut H {
    fn on_instruction(&mut self, instruction: EncoderInstruction) {
        (**self).on_instruction(instruction)
    }
}

impl<H: InstructionHandler + ?Sized> InstructionHandler for Box<H> {
    fn on_instruction(&mut self, instruction: EncoderInstruction) {
        (**self).on_instruction(instruction)
    }
}

impl InstructionHandler for Vec<EncoderInstruction> {
    fn on_instruction(&mut self, instruction: EncoderInstruction) {
        self.push(instruction);
    }
}

/// Appends the serialized instruction, ready to write to the encoder stream.
impl InstructionHandler for BytesMut {
    fn on_instruction(&mut self, instruction: EncoderInstruction) {
        instruction.encode(self);
    }
}
