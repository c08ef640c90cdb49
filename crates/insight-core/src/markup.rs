//! Live range highlighters of one document.
//!
//! The [`MarkupModel`] is owned by the single writer. It keeps its highlighters sorted by start
//! offset together with a prefix maximum of end offsets, so overlap queries can stop scanning
//! early instead of degrading to a full scan on large files.
//!
//! Other threads only ever read [`RangeHighlighter`]s through `Arc`s handed out by the model.

use crate::document::{DocumentEvent, DocumentId};
use crate::highlight_record::{GutterMark, HighlightRecord, TextAttributes};
use crate::pass::PassId;
use crate::severity::{Severity, SeverityRegistrar};
use crate::text_range::{TextRange, shift_for_replace};
use parking_lot::Mutex;
use std::sync::Arc;

/// Visual z-order of a highlighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HighlighterLayer(pub i32);

impl HighlighterLayer {
    /// Plain syntax coloring.
    pub const SYNTAX: Self = Self(1000);
    /// Informational highlights above syntax coloring.
    pub const ADDITIONAL_SYNTAX: Self = Self(2000);
    /// Warnings and weak warnings.
    pub const WARNING: Self = Self(3000);
    /// Errors.
    pub const ERROR: Self = Self(4000);

    /// Layer a record of `severity` is rendered on.
    pub fn for_severity(registrar: &SeverityRegistrar, severity: &Severity) -> Self {
        if registrar.is_at_least(severity, &Severity::ERROR) {
            Self::ERROR
        } else if registrar.is_at_least(severity, &Severity::WEAK_WARNING) {
            Self::WARNING
        } else {
            Self::ADDITIONAL_SYNTAX
        }
    }
}

/// Identifier of a highlighter, unique within its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HighlighterId(pub u64);

/// Rendering state of a highlighter, always changed as one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlighterAttributes {
    /// Attributes key of the record's type.
    pub attributes_key: String,
    /// Explicit attributes.
    pub forced: Option<TextAttributes>,
    /// Gutter icon.
    pub gutter: Option<GutterMark>,
    /// Rendered after the end of line.
    pub after_end_of_line: bool,
}

impl HighlighterAttributes {
    /// Attributes materializing `record`.
    pub fn of(record: &HighlightRecord) -> Self {
        Self {
            attributes_key: record.attributes_key().to_string(),
            forced: record.forced_attributes().copied(),
            gutter: record.gutter().cloned(),
            after_end_of_line: record.is_after_end_of_line(),
        }
    }
}

#[derive(Debug)]
struct HighlighterState {
    range: TextRange,
    valid: bool,
    stale: bool,
    attributes: HighlighterAttributes,
    record: Option<Arc<HighlightRecord>>,
    group: Option<PassId>,
}

/// A live highlighter in a document's markup.
#[derive(Debug)]
pub struct RangeHighlighter {
    id: HighlighterId,
    document: DocumentId,
    layer: HighlighterLayer,
    state: Mutex<HighlighterState>,
}

impl RangeHighlighter {
    /// Highlighter id.
    pub fn id(&self) -> HighlighterId {
        self.id
    }

    /// Owning document.
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Layer.
    pub fn layer(&self) -> HighlighterLayer {
        self.layer
    }

    /// Current range.
    pub fn range(&self) -> TextRange {
        self.state.lock().range
    }

    /// `false` once removed from its model.
    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Whether the typing fast path marked the highlighter as probably outdated.
    pub fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    /// Current rendering attributes.
    pub fn attributes(&self) -> HighlighterAttributes {
        self.state.lock().attributes.clone()
    }

    /// The record shown by this highlighter (its tooltip object).
    pub fn record(&self) -> Option<Arc<HighlightRecord>> {
        self.state.lock().record.clone()
    }

    /// Pass that owns the highlighter.
    pub fn group(&self) -> Option<PassId> {
        self.state.lock().group
    }
}

#[derive(Debug, Clone)]
struct Entry {
    range: TextRange,
    highlighter: Arc<RangeHighlighter>,
}

/// The set of live highlighters of one document.
#[derive(Debug)]
pub struct MarkupModel {
    document: DocumentId,
    entries: Vec<Entry>,
    /// `prefix_max_end[i] = max(entries[0..=i].range.end)`
    prefix_max_end: Vec<usize>,
    next_id: u64,
    modification_count: u64,
    attribute_changes: u64,
}

impl MarkupModel {
    /// Create an empty model.
    pub fn new(document: DocumentId) -> Self {
        Self {
            document,
            entries: Vec::new(),
            prefix_max_end: Vec::new(),
            next_id: 1,
            modification_count: 0,
            attribute_changes: 0,
        }
    }

    /// Number of highlighters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no highlighters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Incremented by every add, removal and attribute batch that changed something.
    pub fn modification_count(&self) -> u64 {
        self.modification_count
    }

    /// Number of attribute batches that changed a highlighter.
    pub fn attribute_change_count(&self) -> u64 {
        self.attribute_changes
    }

    /// All highlighters, sorted by start offset.
    pub fn all_highlighters(&self) -> Vec<Arc<RangeHighlighter>> {
        self.entries.iter().map(|e| Arc::clone(&e.highlighter)).collect()
    }

    /// Returns `true` if `highlighter` belongs to this model.
    pub fn contains(&self, highlighter: &Arc<RangeHighlighter>) -> bool {
        self.position_of(highlighter).is_some()
    }

    /// Add a highlighter.
    pub fn add_range_highlighter(
        &mut self,
        range: TextRange,
        layer: HighlighterLayer,
        group: Option<PassId>,
    ) -> Arc<RangeHighlighter> {
        let highlighter = Arc::new(RangeHighlighter {
            id: HighlighterId(self.next_id),
            document: self.document,
            layer,
            state: Mutex::new(HighlighterState {
                range,
                valid: true,
                stale: false,
                attributes: HighlighterAttributes::default(),
                record: None,
                group,
            }),
        });
        self.next_id += 1;
        self.insert_entry(Entry {
            range,
            highlighter: Arc::clone(&highlighter),
        });
        self.modification_count += 1;
        highlighter
    }

    /// Remove and invalidate a highlighter.
    pub fn remove_highlighter(&mut self, highlighter: &Arc<RangeHighlighter>) -> bool {
        let Some(pos) = self.position_of(highlighter) else {
            return false;
        };
        let entry = self.entries.remove(pos);
        self.prefix_max_end.remove(pos);
        self.rebuild_prefix_max_end_from(pos);
        let mut state = entry.highlighter.state.lock();
        state.valid = false;
        state.record = None;
        self.modification_count += 1;
        true
    }

    /// Move a highlighter to a new range.
    pub fn set_range(&mut self, highlighter: &Arc<RangeHighlighter>, range: TextRange) {
        let Some(pos) = self.position_of(highlighter) else {
            return;
        };
        if self.entries[pos].range == range {
            return;
        }
        let mut entry = self.entries.remove(pos);
        self.prefix_max_end.remove(pos);
        self.rebuild_prefix_max_end_from(pos);
        entry.range = range;
        entry.highlighter.state.lock().range = range;
        self.insert_entry(entry);
        self.modification_count += 1;
    }

    /// Apply an attribute batch. Returns `true` (and counts one change) only if something
    /// actually changed.
    pub fn change_attributes(
        &mut self,
        highlighter: &Arc<RangeHighlighter>,
        attributes: HighlighterAttributes,
        record: Option<Arc<HighlightRecord>>,
        group: Option<PassId>,
    ) -> bool {
        let mut state = highlighter.state.lock();
        let same_record = match (&state.record, &record) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if state.attributes == attributes && same_record && state.group == group && !state.stale {
            return false;
        }
        state.attributes = attributes;
        state.record = record;
        state.group = group;
        state.stale = false;
        drop(state);
        self.attribute_changes += 1;
        self.modification_count += 1;
        true
    }

    /// Flag a highlighter as probably outdated.
    pub fn mark_stale(&mut self, highlighter: &Arc<RangeHighlighter>) {
        highlighter.state.lock().stale = true;
    }

    /// Highlighters whose range intersects `range` (touching boundaries included).
    pub fn overlapping(&self, range: TextRange) -> Vec<Arc<RangeHighlighter>> {
        self.scan(range, |r| r.intersects(range))
    }

    /// Highlighters whose range lies within `range`.
    pub fn contained_in(&self, range: TextRange) -> Vec<Arc<RangeHighlighter>> {
        self.scan(range, |r| range.contains_range(r))
    }

    /// Highlighters whose range contains `offset` (end inclusive).
    pub fn at_offset(&self, offset: usize) -> Vec<Arc<RangeHighlighter>> {
        self.scan(TextRange::empty(offset), |r| r.contains_inclusive(offset))
    }

    /// Shift/grow/shrink every highlighter for an applied edit. Highlighters whose whole text
    /// was replaced are removed.
    pub fn apply_edit(&mut self, event: &DocumentEvent) {
        debug_assert_eq!(event.document, self.document);
        let (old_len, new_len) = (event.old_len(), event.new_len());
        let mut removed = Vec::new();
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            match shift_for_replace(entry.range, event.offset, old_len, new_len, false, false) {
                Some(range) => {
                    entry.range = range;
                    entry.highlighter.state.lock().range = range;
                }
                None => removed.push(idx),
            }
        }
        for idx in removed.into_iter().rev() {
            let entry = self.entries.remove(idx);
            let mut state = entry.highlighter.state.lock();
            state.valid = false;
            state.record = None;
            self.modification_count += 1;
        }
        self.entries.sort_by_key(|e| e.range.start());
        self.prefix_max_end.resize(self.entries.len(), 0);
        self.rebuild_prefix_max_end_from(0);
    }

    /// Remove every highlighter.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            let mut state = entry.highlighter.state.lock();
            state.valid = false;
            state.record = None;
        }
        self.prefix_max_end.clear();
        self.modification_count += 1;
    }

    fn position_of(&self, highlighter: &Arc<RangeHighlighter>) -> Option<usize> {
        let start = highlighter.range().start();
        let first = self.entries.partition_point(|e| e.range.start() < start);
        self.entries[first..]
            .iter()
            .take_while(|e| e.range.start() == start)
            .position(|e| Arc::ptr_eq(&e.highlighter, highlighter))
            .map(|p| p + first)
    }

    fn insert_entry(&mut self, entry: Entry) {
        let pos = self
            .entries
            .partition_point(|e| e.range.start() <= entry.range.start());
        self.entries.insert(pos, entry);
        self.prefix_max_end.insert(pos, 0);
        self.rebuild_prefix_max_end_from(pos);
    }

    fn rebuild_prefix_max_end_from(&mut self, start_idx: usize) {
        let mut max_end = if start_idx == 0 {
            0
        } else {
            self.prefix_max_end[start_idx - 1]
        };
        for (idx, entry) in self.entries.iter().enumerate().skip(start_idx) {
            max_end = max_end.max(entry.range.end());
            self.prefix_max_end[idx] = max_end;
        }
    }

    fn scan(
        &self,
        window: TextRange,
        keep: impl Fn(TextRange) -> bool,
    ) -> Vec<Arc<RangeHighlighter>> {
        // Entries starting after the window cannot match.
        let end = self
            .entries
            .partition_point(|e| e.range.start() <= window.end());
        // Walk back until no earlier entry can reach the window.
        let mut start = self
            .entries
            .partition_point(|e| e.range.start() < window.start())
            .min(end);
        while start > 0 && self.prefix_max_end[start - 1] >= window.start() {
            start -= 1;
        }
        self.entries[start..end]
            .iter()
            .filter(|e| keep(e.range))
            .map(|e| Arc::clone(&e.highlighter))
            .collect()
    }
}
