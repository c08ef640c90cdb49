//! Side list of records that are not rendered as inline highlighters.
//!
//! File-level annotations (banners) and records carrying a gutter icon are kept here per editor
//! session, keyed by the pass that produced them.

use crate::highlight_record::HighlightRecord;
use crate::pass::PassId;
use crate::text_range::TextRange;
use std::sync::Arc;

/// One side-list entry.
#[derive(Debug, Clone)]
pub struct FileLevelEntry {
    /// Producing pass.
    pub group: PassId,
    /// The record.
    pub record: Arc<HighlightRecord>,
}

/// File-level annotations and gutter records of one document.
#[derive(Debug, Default)]
pub struct FileLevelAnnotations {
    entries: Vec<FileLevelEntry>,
}

impl FileLevelAnnotations {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in insertion order.
    pub fn entries(&self) -> &[FileLevelEntry] {
        &self.entries
    }

    /// Records of one group.
    pub fn records_of(&self, group: PassId) -> Vec<Arc<HighlightRecord>> {
        self.entries
            .iter()
            .filter(|e| e.group == group)
            .map(|e| Arc::clone(&e.record))
            .collect()
    }

    /// Add a record unless an equal one is already listed for the group.
    ///
    /// Returns `true` if the record was added.
    pub fn add(&mut self, group: PassId, record: Arc<HighlightRecord>) -> bool {
        if self
            .entries
            .iter()
            .any(|e| e.group == group && e.record.equals_by_value(&record))
        {
            return false;
        }
        self.entries.push(FileLevelEntry { group, record });
        true
    }

    /// Remove every entry of `group`.
    pub fn remove_group(&mut self, group: PassId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.group != group);
        before - self.entries.len()
    }

    /// Remove the gutter records of `group` lying within `range`. File-level annotations are
    /// only replaced by whole-file runs.
    pub fn remove_gutter_records_in(&mut self, group: PassId, range: TextRange) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| {
            e.group != group
                || e.record.is_file_level_annotation()
                || !range.contains_range(e.record.range())
        });
        before - self.entries.len()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
