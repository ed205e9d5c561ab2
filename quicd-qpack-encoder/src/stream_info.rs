//! Outstanding field sections per stream.
//!
//! Sections on one stream are acknowledged strictly in the order they were
//! sent, so each stream keeps a FIFO. Every encoded section is queued, but
//! the decoder only acknowledges sections with a non-zero Required Insert
//! Count (RFC 9204 Section 4.4.1). Static-only sections ahead of an
//! acknowledged one are dropped along with it.

use std::collections::VecDeque;

/// One encoded field section awaiting Section Acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionInfo {
    required_insert_count: u64,
    blocked: bool,
    /// Absolute indices of dynamic entries this section depends on.
    references: Vec<u64>,
}

impl SectionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum insert count the decoder needs to decode this section.
    pub fn required_insert_count(&self) -> u64 {
        self.required_insert_count
    }

    /// Whether this section holds one unit of the blocked-stream budget.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn block(&mut self) {
        self.blocked = true;
    }

    /// Gives the blocked-stream unit back. Returns true if one was held.
    pub fn unblock(&mut self) -> bool {
        std::mem::replace(&mut self.blocked, false)
    }

    /// Records a dependency on the dynamic entry with `index`.
    pub fn reference(&mut self, index: u64) {
        self.required_insert_count = self.required_insert_count.max(index + 1);
        self.references.push(index);
    }

    pub fn references(&self) -> &[u64] {
        &self.references
    }
}

/// Per-stream queue of outstanding sections, oldest first.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    sections: VecDeque<SectionInfo>,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, section: SectionInfo) {
        self.sections.push_back(section);
    }

    /// Removes the oldest section that references the dynamic table, and
    /// every static-only section queued before it.
    ///
    /// Returns `None` and leaves the queue untouched when no such section
    /// is outstanding.
    pub fn acknowledge(&mut self) -> Option<SectionInfo> {
        let position = self
            .sections
            .iter()
            .position(|section| section.required_insert_count() > 0)?;
        self.sections.drain(..position);
        self.sections.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub(crate) fn sections_mut(&mut self) -> impl Iterator<Item = &mut SectionInfo> {
        self.sections.iter_mut()
    }

    /// Consumes the record, yielding all outstanding sections.
    pub fn into_sections(self) -> impl Iterator<Item = SectionInfo> {
        self.sections.into_iter()
    }
}
