//! QPACK Encoder implementation per RFC 9204.
//!
//! The encoder owns the dynamic table and decides, field by field, how to
//! represent each header:
//! 1. exact match that can be referenced: indexed field line
//! 2. exact match stuck in the draining zone: Duplicate it, then index the copy
//! 3. name match that can be referenced: literal with name reference, and
//!    insert the full field for next time
//! 4. otherwise: literal with literal name, and insert the field
//!
//! Encoder stream instructions go to an [`InstructionHandler`] as they are
//! produced. Decoder stream feedback (Section Acknowledgment, Stream
//! Cancellation, Insert Count Increment) comes back either through the
//! dedicated methods or as raw bytes via
//! [`process_decoder_stream`](Encoder::process_decoder_stream).
//!
//! The encoder is not internally synchronized. All calls for one
//! connection must be serialized by the caller.

use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::config::EncoderConfig;
use crate::context::{EntryRef, LookupContext};
use crate::error::{Error, Result};
use crate::field::HeaderField;
use crate::header_block::{EncodedPrefix, FieldLine};
use crate::instructions::{DecoderInstruction, EncoderInstruction, InstructionHandler};
use crate::policy::{DefaultFieldPolicy, FieldPolicy};
use crate::stream_info::{SectionInfo, StreamInfo};
use crate::table::DynamicTable;

/// QPACK Encoder state.
pub struct Encoder<H: InstructionHandler> {
    /// Dynamic table, mirrored by the peer decoder.
    table: DynamicTable,

    /// Receives encoder stream instructions.
    handler: H,

    config: EncoderConfig,

    policy: Box<dyn FieldPolicy>,

    /// Insert count the decoder has confirmed. Never decreases.
    known_insert_count: u64,

    /// Outstanding sections holding a unit of the blocked-stream budget.
    blocked_streams: usize,

    /// Streams with unacknowledged field sections.
    streams: HashMap<u64, StreamInfo>,

    validate: bool,
}

impl<H: InstructionHandler> Encoder<H> {
    /// Create a new encoder with default settings.
    ///
    /// The dynamic table starts with zero capacity; call
    /// [`set_capacity`](Self::set_capacity) to enable it.
    pub fn new(handler: H, max_blocked_streams: usize) -> Self {
        let config = EncoderConfig {
            max_blocked_streams,
            ..Default::default()
        };
        Self::build(handler, config)
    }

    /// Create an encoder from a validated configuration.
    pub fn with_config(handler: H, config: EncoderConfig) -> Result<Self> {
        if let Err(errors) = config.validate() {
            warn!(?errors, "rejecting encoder configuration");
            return Err(Error::InvalidConfig(errors));
        }
        Ok(Self::build(handler, config))
    }

    fn build(handler: H, config: EncoderConfig) -> Self {
        Self {
            table: DynamicTable::new(config.draining_percent),
            handler,
            policy: Box::new(DefaultFieldPolicy::new(config.huffman)),
            known_insert_count: 0,
            blocked_streams: 0,
            streams: HashMap::new(),
            validate: config.validate_field_names,
            config,
        }
    }

    /// Replace the indexing and Huffman policy.
    pub fn with_policy(mut self, policy: impl FieldPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Get immutable reference to dynamic table (for testing/inspection).
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Insert count the decoder is known to have processed.
    pub fn known_insert_count(&self) -> u64 {
        self.known_insert_count
    }

    /// Number of outstanding sections that may block the decoder.
    pub fn blocked_streams(&self) -> usize {
        self.blocked_streams
    }

    /// Number of unacknowledged field sections on a stream.
    pub fn outstanding_sections(&self, stream_id: u64) -> usize {
        self.streams.get(&stream_id).map_or(0, StreamInfo::len)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Enable or disable field name validation in [`encode`](Self::encode).
    pub fn set_validate_encoding(&mut self, validate: bool) {
        self.validate = validate;
    }

    pub fn is_validate_encoding(&self) -> bool {
        self.validate
    }

    /// Set dynamic table capacity.
    ///
    /// Growth takes effect at once. A reduction that would evict entries
    /// still referenced by unacknowledged sections is deferred, and the
    /// Set Dynamic Table Capacity instruction is sent once it applies.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity > self.config.max_table_capacity {
            warn!(
                capacity,
                maximum = self.config.max_table_capacity,
                "capacity exceeds peer maximum"
            );
            return Err(Error::CapacityExceedsMaximum {
                capacity,
                maximum: self.config.max_table_capacity,
            });
        }

        let previous = self.table.capacity();
        if self.table.set_capacity(capacity) {
            if self.table.capacity() != previous {
                self.emit(EncoderInstruction::SetCapacity {
                    capacity: capacity as u64,
                });
            }
        } else {
            debug!(
                capacity,
                used_space = self.table.used_space(),
                "capacity reduction deferred"
            );
        }
        Ok(())
    }

    /// Encode a field section for a stream.
    ///
    /// Field names are validated before anything is emitted, so a failed
    /// call leaves encoder state untouched. Encoder stream instructions
    /// produced along the way are delivered to the handler before this
    /// returns; they must reach the peer no later than the section itself.
    ///
    /// The prefix wraps the Required Insert Count using the peer's maximum
    /// table capacity ([`EncoderConfig::max_table_capacity`]), not the
    /// current capacity.
    pub fn encode(&mut self, stream_id: u64, fields: &[HeaderField]) -> Result<Bytes> {
        if self.validate {
            for field in fields {
                validate_field_name(stream_id, field)?;
            }
        }

        let mut section = SectionInfo::new();
        let mut lines = Vec::with_capacity(fields.len());
        for field in fields {
            self.evict_draining();
            lines.push(self.encode_field(stream_id, field, &mut section));
        }

        let required_insert_count = lines
            .iter()
            .map(FieldLine::required_insert_count)
            .max()
            .unwrap_or(0);
        debug_assert_eq!(required_insert_count, section.required_insert_count());

        let prefix = EncodedPrefix {
            required_insert_count,
            base: self.table.insert_count(),
        };

        let mut buf = BytesMut::new();
        prefix.encode(self.config.max_table_capacity, &mut buf);
        for line in &lines {
            line.encode(prefix.base, &mut buf);
        }

        trace!(
            stream_id,
            required_insert_count = prefix.required_insert_count,
            base = prefix.base,
            blocked = section.is_blocked(),
            len = buf.len(),
            "encoded field section"
        );

        self.streams.entry(stream_id).or_default().add(section);

        Ok(buf.freeze())
    }

    fn encode_field(
        &mut self,
        stream_id: u64,
        field: &HeaderField,
        section: &mut SectionInfo,
    ) -> FieldLine {
        let indexable = self.policy.should_index(field);
        let never_indexed = self.policy.never_index(field);
        let huffman = self.policy.should_huffman_encode(field);
        let fits = field.size() <= self.table.get_space();

        let context = LookupContext::new(&self.table);
        let exact = context.get(&field.name, &field.value);
        let name = context.get_name(&field.name);
        let exact_dynamic = matches!(exact, Some(EntryRef::Dynamic(_)));

        if let Some(entry) = exact {
            if self.reference_entry(entry, section) {
                trace!(stream_id, ?entry, "indexed field line");
                return match entry {
                    EntryRef::Static(index) => FieldLine::IndexedStatic {
                        index: index as u64,
                    },
                    EntryRef::Dynamic(absolute_index) => {
                        FieldLine::IndexedDynamic { absolute_index }
                    }
                };
            }

            if let EntryRef::Dynamic(index) = entry {
                if !self.table.can_reference(index) && indexable && fits {
                    let relative = self.table.insert_count() - 1 - index;
                    self.emit(EncoderInstruction::Duplicate { index: relative });
                    let absolute_index = self.table.add(field.clone());
                    debug!(from = index, to = absolute_index, "duplicated draining entry");

                    if self.reference_entry(EntryRef::Dynamic(absolute_index), section) {
                        return FieldLine::IndexedDynamic { absolute_index };
                    }
                    return literal_name(field, never_indexed, huffman);
                }
            }
        }

        if let Some(entry) = name {
            if self.reference_entry(entry, section) {
                trace!(stream_id, ?entry, "literal with name reference");
                let value = field.value.clone();
                let (line, instruction) = match entry {
                    EntryRef::Static(index) => (
                        FieldLine::LiteralStaticName {
                            name_index: index as u64,
                            value: value.clone(),
                            never_indexed,
                            huffman,
                        },
                        EncoderInstruction::InsertWithNameRef {
                            is_static: true,
                            name_index: index as u64,
                            huffman,
                            value,
                        },
                    ),
                    EntryRef::Dynamic(absolute_index) => (
                        FieldLine::LiteralDynamicName {
                            absolute_index,
                            value: value.clone(),
                            never_indexed,
                            huffman,
                        },
                        EncoderInstruction::InsertWithNameRef {
                            is_static: false,
                            name_index: self.table.insert_count() - 1 - absolute_index,
                            huffman,
                            value,
                        },
                    ),
                };

                if indexable && fits && !exact_dynamic {
                    self.emit(instruction);
                    self.table.add(field.clone());
                }
                return line;
            }
        }

        trace!(stream_id, indexable, fits, "literal with literal name");
        if indexable && fits && !exact_dynamic {
            self.emit(EncoderInstruction::InsertWithLiteralName {
                name_huffman: huffman,
                name: field.name.clone(),
                value_huffman: huffman,
                value: field.value.clone(),
            });
            self.table.add(field.clone());
        }
        literal_name(field, never_indexed, huffman)
    }

    /// Tries to make `section` depend on `entry`.
    ///
    /// Static entries always succeed. A dynamic entry must be outside the
    /// draining zone, and if the decoder has not yet acknowledged it the
    /// section has to be blocked, which needs either an already blocked
    /// section or spare blocked-stream budget.
    fn reference_entry(&mut self, entry: EntryRef, section: &mut SectionInfo) -> bool {
        let index = match entry {
            EntryRef::Static(_) => return true,
            EntryRef::Dynamic(index) => index,
        };

        if !self.table.can_reference(index) {
            return false;
        }

        if self.known_insert_count <= index && !section.is_blocked() {
            if self.blocked_streams >= self.config.max_blocked_streams {
                trace!(index, blocked_streams = self.blocked_streams, "blocked stream budget exhausted");
                return false;
            }
            self.blocked_streams += 1;
            section.block();
        }

        self.table.reference(index);
        section.reference(index);
        true
    }

    /// Insert a field into the dynamic table outside of any field section.
    ///
    /// Returns false without emitting anything when the policy forbids
    /// indexing the field or it does not fit in the free space.
    pub fn insert(&mut self, field: HeaderField) -> bool {
        self.evict_draining();

        if !self.policy.should_index(&field) || field.size() > self.table.get_space() {
            trace!(?field, space = self.table.get_space(), "insert declined");
            return false;
        }

        let huffman = self.policy.should_huffman_encode(&field);
        let insert_count = self.table.insert_count();
        let context = LookupContext::new(&self.table);

        let instruction = if let Some(index) = self.table.find_exact(&field.name, &field.value) {
            EncoderInstruction::Duplicate {
                index: insert_count - 1 - index,
            }
        } else {
            match context.get_name(&field.name) {
                Some(EntryRef::Static(index)) => EncoderInstruction::InsertWithNameRef {
                    is_static: true,
                    name_index: index as u64,
                    huffman,
                    value: field.value.clone(),
                },
                Some(EntryRef::Dynamic(index)) => EncoderInstruction::InsertWithNameRef {
                    is_static: false,
                    name_index: insert_count - 1 - index,
                    huffman,
                    value: field.value.clone(),
                },
                None => EncoderInstruction::InsertWithLiteralName {
                    name_huffman: huffman,
                    name: field.name.clone(),
                    value_huffman: huffman,
                    value: field.value.clone(),
                },
            }
        };

        self.emit(instruction);
        self.table.add(field);
        true
    }

    /// Insert Count Increment from the decoder stream.
    pub fn insert_count_increment(&mut self, increment: u64) -> Result<()> {
        if increment == 0 {
            warn!("insert count increment of zero");
            return Err(Error::ZeroIncrement);
        }

        let insert_count = self.table.insert_count();
        match self.known_insert_count.checked_add(increment) {
            Some(known) if known <= insert_count => {
                self.known_insert_count = known;
            }
            _ => {
                warn!(
                    known = self.known_insert_count,
                    increment, insert_count, "insert count increment overrun"
                );
                return Err(Error::InsertCountOverrun {
                    known: self.known_insert_count,
                    increment,
                    insert_count,
                });
            }
        }

        trace!(known_insert_count = self.known_insert_count, "insert count increment");
        self.unblock_acknowledged();
        Ok(())
    }

    /// Section Acknowledgment from the decoder stream.
    ///
    /// Retires the oldest outstanding section on the stream that references
    /// the dynamic table. The decoder never acknowledges static-only
    /// sections, so any queued ahead of it are retired too.
    pub fn section_acknowledgement(&mut self, stream_id: u64) -> Result<()> {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            warn!(stream_id, "section acknowledgment for unknown stream");
            return Err(Error::UnknownStream { stream_id });
        };
        let Some(section) = stream.acknowledge() else {
            warn!(stream_id, "section acknowledgment without dynamic section");
            return Err(Error::UnknownStream { stream_id });
        };
        if stream.is_empty() {
            self.streams.remove(&stream_id);
        }

        self.known_insert_count = self
            .known_insert_count
            .max(section.required_insert_count());
        trace!(
            stream_id,
            required_insert_count = section.required_insert_count(),
            known_insert_count = self.known_insert_count,
            "section acknowledged"
        );

        self.retire(section);
        self.unblock_acknowledged();
        self.evict_draining();
        Ok(())
    }

    /// Stream Cancellation from the decoder stream.
    ///
    /// Drops every outstanding section on the stream, returning their
    /// blocked-stream budget and entry references.
    pub fn stream_cancellation(&mut self, stream_id: u64) -> Result<()> {
        let Some(stream) = self.streams.remove(&stream_id) else {
            warn!(stream_id, "stream cancellation for unknown stream");
            return Err(Error::UnknownStream { stream_id });
        };

        debug!(stream_id, sections = stream.len(), "stream cancelled");
        for section in stream.into_sections() {
            self.retire(section);
        }
        self.evict_draining();
        Ok(())
    }

    /// Process raw decoder stream bytes.
    ///
    /// Returns the number of bytes consumed. A trailing partial instruction
    /// is left unconsumed; pass it again once more data arrives.
    pub fn process_decoder_stream(&mut self, data: &[u8]) -> Result<usize> {
        let mut offset = 0;

        while offset < data.len() {
            let (instruction, consumed) = match DecoderInstruction::decode(&data[offset..]) {
                Ok(decoded) => decoded,
                Err(Error::Incomplete(_)) => break,
                Err(e) => {
                    warn!(error = %e, "malformed decoder stream");
                    return Err(Error::DecoderStreamError(e.to_string()));
                }
            };
            offset += consumed;

            match instruction {
                DecoderInstruction::SectionAck { stream_id } => {
                    self.section_acknowledgement(stream_id)?
                }
                DecoderInstruction::StreamCancel { stream_id } => {
                    self.stream_cancellation(stream_id)?
                }
                DecoderInstruction::InsertCountIncrement { increment } => {
                    self.insert_count_increment(increment)?
                }
            }
        }

        Ok(offset)
    }

    /// Returns a finished section's budget unit and entry references.
    fn retire(&mut self, mut section: SectionInfo) {
        if section.unblock() {
            self.blocked_streams -= 1;
        }
        for &index in section.references() {
            self.table.release(index);
        }
    }

    /// Unblocks sections whose dependencies the decoder now has.
    fn unblock_acknowledged(&mut self) {
        let known = self.known_insert_count;
        for stream in self.streams.values_mut() {
            for section in stream.sections_mut() {
                if section.required_insert_count() <= known && section.unblock() {
                    self.blocked_streams -= 1;
                }
            }
        }
    }

    /// Evicts unreferenced draining entries and sends any capacity change
    /// that became possible.
    fn evict_draining(&mut self) {
        if let Some(capacity) = self.table.evict() {
            debug!(capacity, "deferred capacity change applied");
            self.emit(EncoderInstruction::SetCapacity {
                capacity: capacity as u64,
            });
        }
    }

    fn emit(&mut self, instruction: EncoderInstruction) {
        trace!(?instruction, "encoder stream instruction");
        self.handler.on_instruction(instruction);
    }
}

fn literal_name(field: &HeaderField, never_indexed: bool, huffman: bool) -> FieldLine {
    FieldLine::LiteralName {
        name: field.name.clone(),
        value: field.value.clone(),
        never_indexed,
        huffman,
    }
}

/// Field names must be non-empty and must not start with a control
/// character or space.
fn validate_field_name(stream_id: u64, field: &HeaderField) -> Result<()> {
    match field.name.first() {
        Some(&first) if first > 0x20 => Ok(()),
        _ => {
            let name = String::from_utf8_lossy(&field.name).into_owned();
            warn!(stream_id, name = %name, "invalid field name");
            Err(Error::InvalidFieldName { stream_id, name })
        }
    }
}
