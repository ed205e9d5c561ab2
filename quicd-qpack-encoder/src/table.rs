//! Encoder-side dynamic table.
//!
//! Entries live in a FIFO addressed by absolute index: the entry with
//! absolute index `i` sits at position `i - first_index`. Section records
//! only hold absolute indices; the table owns the entries and consults
//! their reference counts before evicting anything.
//!
//! The oldest entries, those that would have to go to keep
//! `draining_percent` of the capacity free, form the draining zone. They
//! stay in the table but are no longer referenced by new field lines, so
//! their reference counts fall to zero and they can be evicted.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::field::{entry_size, HeaderField};

/// One inserted name/value pair.
#[derive(Debug, Clone)]
pub struct Entry {
    name: Bytes,
    value: Bytes,
    index: u64,
    reference_count: usize,
}

impl Entry {
    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Absolute index, assigned at insertion and never reused.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> usize {
        entry_size(&self.name, &self.value)
    }

    /// Number of unacknowledged field sections referencing this entry.
    pub fn reference_count(&self) -> usize {
        self.reference_count
    }
}

/// The dynamic table.
#[derive(Debug)]
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    /// Capacity the peer has been told about.
    capacity: usize,
    /// Reduced capacity waiting for referenced entries to drain.
    pending_capacity: Option<usize>,
    used_space: usize,
    insert_count: u64,
    draining_percent: usize,
    // Newest absolute index per name and value, and per name
    by_field: HashMap<Bytes, HashMap<Bytes, u64>>,
    by_name: HashMap<Bytes, u64>,
}

impl DynamicTable {
    /// Creates an empty table with zero capacity.
    pub fn new(draining_percent: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: 0,
            pending_capacity: None,
            used_space: 0,
            insert_count: 0,
            draining_percent: draining_percent.min(100),
            by_field: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Number of entries ever inserted; also the next absolute index.
    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    /// Capacity currently in effect on both sides of the connection.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reduced capacity still waiting for referenced entries to be released.
    pub fn pending_capacity(&self) -> Option<usize> {
        self.pending_capacity
    }

    /// Capacity new insertions are budgeted against.
    pub fn target_capacity(&self) -> usize {
        self.pending_capacity.unwrap_or(self.capacity)
    }

    /// Sum of the sizes of all entries still in the table.
    pub fn used_space(&self) -> usize {
        self.used_space
    }

    /// Free space available without evicting anything.
    pub fn get_space(&self) -> usize {
        self.target_capacity().saturating_sub(self.used_space)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute index of the oldest entry still present.
    pub fn first_index(&self) -> u64 {
        self.insert_count - self.entries.len() as u64
    }

    /// Entry with the given absolute index, unless evicted.
    pub fn get(&self, index: u64) -> Option<&Entry> {
        let position = index.checked_sub(self.first_index())?;
        self.entries.get(usize::try_from(position).ok()?)
    }

    fn get_mut(&mut self, index: u64) -> Option<&mut Entry> {
        let position = index.checked_sub(self.first_index())?;
        self.entries.get_mut(usize::try_from(position).ok()?)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.get(index).is_some()
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Newest entry matching both name and value.
    pub fn find_exact(&self, name: &[u8], value: &[u8]) -> Option<u64> {
        self.by_field.get(name)?.get(value).copied()
    }

    /// Newest entry with the given name.
    pub fn find_name(&self, name: &[u8]) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    /// Smallest absolute index outside the draining zone.
    pub fn draining_index(&self) -> u64 {
        let target = self.target_capacity();
        let threshold = (target * self.draining_percent / 100) as i64;
        let mut reclaimable = target as i64 - self.used_space as i64;
        let mut index = self.first_index();

        for entry in &self.entries {
            if reclaimable >= threshold {
                break;
            }
            reclaimable += entry.size() as i64;
            index += 1;
        }

        index
    }

    /// Whether a new field line may reference the entry.
    ///
    /// False once the entry is evicted or has entered the draining zone.
    pub fn can_reference(&self, index: u64) -> bool {
        self.contains(index) && index >= self.draining_index()
    }

    /// Appends a field, returning its absolute index.
    ///
    /// Oldest unreferenced entries are evicted while the field does not
    /// fit. Callers check [`get_space`](Self::get_space) first; running out
    /// of evictable space here is a bug in the caller.
    pub fn add(&mut self, field: HeaderField) -> u64 {
        let size = field.size();

        while self.used_space + size > self.target_capacity() {
            if !self.evict_oldest() {
                break;
            }
        }
        debug_assert!(
            self.used_space + size <= self.target_capacity(),
            "insufficient evictable space for entry of size {}",
            size
        );

        let index = self.insert_count;
        self.insert_count += 1;
        self.used_space += size;

        self.by_field
            .entry(field.name.clone())
            .or_default()
            .insert(field.value.clone(), index);
        self.by_name.insert(field.name.clone(), index);
        self.entries.push_back(Entry {
            name: field.name,
            value: field.value,
            index,
            reference_count: 0,
        });

        debug!(index, size, used_space = self.used_space, "dynamic table insert");
        index
    }

    /// Requests a new capacity.
    ///
    /// Unreferenced entries are evicted until the table fits. Returns true
    /// when the capacity took effect; otherwise it stays pending until
    /// [`evict`](Self::evict) can apply it.
    pub fn set_capacity(&mut self, capacity: usize) -> bool {
        self.pending_capacity = Some(capacity);
        self.apply_pending_capacity()
    }

    /// Evicts unreferenced entries from the draining zone, then retries a
    /// pending capacity change.
    ///
    /// Returns the new capacity if a deferred change took effect.
    pub fn evict(&mut self) -> Option<usize> {
        let draining_index = self.draining_index();
        while self.first_index() < draining_index {
            if !self.evict_oldest() {
                break;
            }
        }

        if self.pending_capacity.is_some() && self.apply_pending_capacity() {
            Some(self.capacity)
        } else {
            None
        }
    }

    fn apply_pending_capacity(&mut self) -> bool {
        let Some(target) = self.pending_capacity else {
            return false;
        };

        while self.used_space > target {
            if !self.evict_oldest() {
                break;
            }
        }

        if self.used_space > target {
            debug!(
                target,
                used_space = self.used_space,
                "capacity change deferred until references are released"
            );
            return false;
        }

        debug!(from = self.capacity, to = target, "dynamic table capacity change");
        self.capacity = target;
        self.pending_capacity = None;
        true
    }

    fn evict_oldest(&mut self) -> bool {
        match self.entries.front() {
            Some(entry) if entry.reference_count == 0 => {}
            _ => return false,
        }
        let Some(entry) = self.entries.pop_front() else {
            return false;
        };

        self.used_space -= entry.size();

        if let Some(values) = self.by_field.get_mut(&entry.name) {
            if values.get(&entry.value) == Some(&entry.index) {
                values.remove(&entry.value);
            }
            if values.is_empty() {
                self.by_field.remove(&entry.name);
            }
        }
        if self.by_name.get(&entry.name) == Some(&entry.index) {
            self.by_name.remove(&entry.name);
        }

        debug!(index = entry.index, used_space = self.used_space, "dynamic table eviction");
        true
    }

    /// Records one more section depending on the entry.
    pub fn reference(&mut self, index: u64) {
        if let Some(entry) = self.get_mut(index) {
            entry.reference_count += 1;
        } else {
            debug_assert!(false, "reference to evicted entry {}", index);
        }
    }

    /// Drops a dependency recorded by [`reference`](Self::reference).
    pub fn release(&mut self, index: u64) {
        match self.get_mut(index) {
            Some(entry) if entry.reference_count > 0 => entry.reference_count -= 1,
            _ => debug_assert!(false, "release of unreferenced entry {}", index),
        }
    }
}
