//! Lookup across the static and dynamic tables.
//!
//! Static matches always win. Among dynamic entries the newest match is
//! returned, being the furthest from eviction.

use crate::static_table;
use crate::table::DynamicTable;

/// A matching entry in one of the two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRef {
    /// Index into the static table.
    Static(usize),
    /// Absolute index into the dynamic table.
    Dynamic(u64),
}

impl EntryRef {
    pub fn is_static(&self) -> bool {
        matches!(self, EntryRef::Static(_))
    }
}

/// Read-only view used to make encoding decisions.
#[derive(Clone, Copy)]
pub struct LookupContext<'a> {
    table: &'a DynamicTable,
}

impl<'a> LookupContext<'a> {
    pub fn new(table: &'a DynamicTable) -> Self {
        Self { table }
    }

    /// Best entry matching both name and value.
    pub fn get(&self, name: &[u8], value: &[u8]) -> Option<EntryRef> {
        static_table::find_exact(name, value)
            .map(EntryRef::Static)
            .or_else(|| self.table.find_exact(name, value).map(EntryRef::Dynamic))
    }

    /// Best entry matching the name alone.
    pub fn get_name(&self, name: &[u8]) -> Option<EntryRef> {
        static_table::find_name(name)
            .map(EntryRef::Static)
            .or_else(|| self.table.find_name(name).map(EntryRef::Dynamic))
    }
}
