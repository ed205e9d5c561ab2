//! Test-only peer decoder.
//!
//! Mirrors the decoder's dynamic table from encoder stream instructions
//! and decodes field sections against it. Huffman coded strings are not
//! supported, so encoders under test must have Huffman disabled.

#![allow(dead_code)]

use bytes::Bytes;
use std::collections::VecDeque;

use quicd_qpack_encoder::static_table::STATIC_TABLE;
use quicd_qpack_encoder::{decode_int, EncoderInstruction, HeaderField};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct MirrorDecoder {
    entries: VecDeque<HeaderField>,
    capacity: usize,
    used_space: usize,
    insert_count: u64,
    max_table_capacity: usize,
}

impl MirrorDecoder {
    pub fn new(max_table_capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: 0,
            used_space: 0,
            insert_count: 0,
            max_table_capacity,
        }
    }

    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used_space(&self) -> usize {
        self.used_space
    }

    pub fn get(&self, absolute_index: u64) -> Option<&HeaderField> {
        let first = self.insert_count - self.entries.len() as u64;
        let position = absolute_index.checked_sub(first)?;
        self.entries.get(position as usize)
    }

    fn relative(&self, relative_index: u64) -> HeaderField {
        let absolute = self.insert_count - 1 - relative_index;
        self.get(absolute)
            .cloned()
            .unwrap_or_else(|| panic!("instruction references evicted entry {}", absolute))
    }

    fn evict_to(&mut self, limit: usize) {
        while self.used_space > limit {
            let entry = self.entries.pop_front().expect("table accounting");
            self.used_space -= entry.size();
        }
    }

    pub fn apply(&mut self, instruction: &EncoderInstruction) {
        let field = match instruction {
            EncoderInstruction::SetCapacity { capacity } => {
                let capacity = *capacity as usize;
                assert!(capacity <= self.max_table_capacity);
                self.evict_to(capacity);
                self.capacity = capacity;
                return;
            }
            EncoderInstruction::InsertWithNameRef {
                is_static,
                name_index,
                value,
                ..
            } => {
                let name = if *is_static {
                    Bytes::from_static(STATIC_TABLE[*name_index as usize].name)
                } else {
                    self.relative(*name_index).name
                };
                HeaderField::new(name, value.clone())
            }
            EncoderInstruction::InsertWithLiteralName { name, value, .. } => {
                HeaderField::new(name.clone(), value.clone())
            }
            EncoderInstruction::Duplicate { index } => self.relative(*index),
        };

        let size = field.size();
        assert!(size <= self.capacity, "entry larger than capacity");
        self.evict_to(self.capacity - size);
        self.used_space += size;
        self.insert_count += 1;
        self.entries.push_back(field);
    }

    pub fn apply_all(&mut self, instructions: &[EncoderInstruction]) {
        for instruction in instructions {
            self.apply(instruction);
        }
    }

    /// Decodes a field section, returning its fields and Required Insert
    /// Count.
    pub fn decode(&self, data: &[u8]) -> (Vec<HeaderField>, u64) {
        let (encoded_insert_count, mut pos) = decode_int(data, 8).unwrap();
        let required_insert_count = self.required_insert_count(encoded_insert_count);
        assert!(required_insert_count <= self.insert_count, "section would block");

        let sign = data[pos] & 0x80 != 0;
        let (delta_base, n) = decode_int(&data[pos..], 7).unwrap();
        pos += n;
        let base = if sign {
            required_insert_count - delta_base - 1
        } else {
            required_insert_count + delta_base
        };

        let mut fields = Vec::new();
        let mut max_reference = 0;
        while pos < data.len() {
            let first = data[pos];
            let field = if first & 0x80 != 0 {
                let (index, n) = decode_int(&data[pos..], 6).unwrap();
                pos += n;
                if first & 0x40 != 0 {
                    static_field(index)
                } else {
                    let absolute = base - 1 - index;
                    max_reference = max_reference.max(absolute + 1);
                    self.dynamic_field(absolute)
                }
            } else if first & 0x40 != 0 {
                let (index, n) = decode_int(&data[pos..], 4).unwrap();
                pos += n;
                let name = if first & 0x10 != 0 {
                    static_field(index).name
                } else {
                    let absolute = base - 1 - index;
                    max_reference = max_reference.max(absolute + 1);
                    self.dynamic_field(absolute).name
                };
                let (value, n) = decode_string(&data[pos..], 7);
                pos += n;
                HeaderField::new(name, value)
            } else if first & 0x20 != 0 {
                let (name, n) = decode_string(&data[pos..], 3);
                pos += n;
                let (value, n) = decode_string(&data[pos..], 7);
                pos += n;
                HeaderField::new(name, value)
            } else if first & 0x10 != 0 {
                let (index, n) = decode_int(&data[pos..], 4).unwrap();
                pos += n;
                let absolute = base + index;
                max_reference = max_reference.max(absolute + 1);
                self.dynamic_field(absolute)
            } else {
                let (index, n) = decode_int(&data[pos..], 3).unwrap();
                pos += n;
                let absolute = base + index;
                max_reference = max_reference.max(absolute + 1);
                let name = self.dynamic_field(absolute).name;
                let (value, n) = decode_string(&data[pos..], 7);
                pos += n;
                HeaderField::new(name, value)
            };
            fields.push(field);
        }

        assert_eq!(max_reference, required_insert_count, "Required Insert Count mismatch");
        (fields, required_insert_count)
    }

    /// RFC 9204 Section 4.5.1.1.
    fn required_insert_count(&self, encoded: u64) -> u64 {
        if encoded == 0 {
            return 0;
        }
        let max_entries = (self.max_table_capacity / 32) as u64;
        let full_range = 2 * max_entries;
        assert!(encoded <= full_range);
        let max_value = self.insert_count + max_entries;
        let max_wrapped = (max_value / full_range) * full_range;
        let mut required = max_wrapped + encoded - 1;
        if required > max_value {
            required -= full_range;
        }
        required
    }

    fn dynamic_field(&self, absolute: u64) -> HeaderField {
        self.get(absolute)
            .cloned()
            .unwrap_or_else(|| panic!("field line references evicted entry {}", absolute))
    }
}

fn static_field(index: u64) -> HeaderField {
    let entry = &STATIC_TABLE[index as usize];
    HeaderField::new(Bytes::from_static(entry.name), Bytes::from_static(entry.value))
}

fn decode_string(data: &[u8], prefix_bits: u8) -> (Bytes, usize) {
    assert_eq!(data[0] & (1 << prefix_bits), 0, "Huffman string in test section");
    let (len, n) = decode_int(data, prefix_bits).unwrap();
    let end = n + len as usize;
    (Bytes::copy_from_slice(&data[n..end]), end)
}
