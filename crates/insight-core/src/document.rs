//! Live documents, immutable snapshots and self-adjusting range markers.
//!
//! A [`Document`] is only ever mutated by the single writer (the daemon's owner). Analysis
//! workers never see the live document: they receive a [`DocumentSnapshot`], which shares the
//! rope structurally and is cheap to clone.
//!
//! [`RangeMarker`]s are registered with the document that created them and are adjusted on
//! every replacement, so a dirty scope or quick-fix range keeps pointing at the same text while
//! the user types.

use crate::text_range::{TextRange, shift_for_replace};
use parking_lot::Mutex;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Stable identifier of an open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Errors produced when editing or slicing a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The offset lies past the end of the document.
    #[error("offset {offset} is out of bounds (document length {len})")]
    OutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Document length in bytes.
        len: usize,
    },
    /// The offset splits a UTF-8 sequence.
    #[error("offset {0} is not on a char boundary")]
    NotCharBoundary(usize),
}

/// A single applied replacement, in byte offsets of the document *before* the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    /// Changed document.
    pub document: DocumentId,
    /// Start byte offset of the replacement.
    pub offset: usize,
    /// Exact replaced text.
    pub old_text: String,
    /// Exact inserted text.
    pub new_text: String,
    /// Modification stamp after the change.
    pub stamp: u64,
}

impl DocumentEvent {
    /// Length of the replaced text in bytes.
    pub fn old_len(&self) -> usize {
        self.old_text.len()
    }

    /// Length of the inserted text in bytes.
    pub fn new_len(&self) -> usize {
        self.new_text.len()
    }

    /// Range of the inserted text in the document *after* the change.
    pub fn new_range(&self) -> TextRange {
        TextRange::at(self.offset, self.new_len())
    }
}

#[derive(Debug)]
struct MarkerState {
    range: TextRange,
    valid: bool,
}

#[derive(Debug)]
struct MarkerCell {
    document: DocumentId,
    greedy_left: bool,
    greedy_right: bool,
    state: Mutex<MarkerState>,
}

/// A range that follows the text it was created on across edits.
///
/// Cloning a marker yields another handle to the same underlying range.
#[derive(Debug, Clone)]
pub struct RangeMarker {
    cell: Arc<MarkerCell>,
}

impl RangeMarker {
    /// Document this marker belongs to.
    pub fn document(&self) -> DocumentId {
        self.cell.document
    }

    /// Current range (the last known range if the marker was invalidated).
    pub fn range(&self) -> TextRange {
        self.cell.state.lock().range
    }

    /// Current range, or `None` if the marked text was replaced entirely.
    pub fn valid_range(&self) -> Option<TextRange> {
        let state = self.cell.state.lock();
        state.valid.then_some(state.range)
    }

    /// Returns `false` once an edit replaced the whole marked text, or after [`Self::dispose`].
    pub fn is_valid(&self) -> bool {
        self.cell.state.lock().valid
    }

    /// Invalidate the marker; it stops following edits.
    pub fn dispose(&self) {
        self.cell.state.lock().valid = false;
    }

    /// Returns `true` if both handles refer to the same marker.
    pub fn ptr_eq(&self, other: &RangeMarker) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    fn apply(&self, offset: usize, old_len: usize, new_len: usize) {
        let mut state = self.cell.state.lock();
        if !state.valid {
            return;
        }
        match shift_for_replace(
            state.range,
            offset,
            old_len,
            new_len,
            self.cell.greedy_left,
            self.cell.greedy_right,
        ) {
            Some(range) => state.range = range,
            None => state.valid = false,
        }
    }
}

/// A mutable text document backed by a rope.
pub struct Document {
    id: DocumentId,
    text: Rope,
    stamp: u64,
    markers: Mutex<Vec<Weak<MarkerCell>>>,
}

impl Document {
    /// Create a document with the given initial text.
    pub fn new(id: DocumentId, text: &str) -> Self {
        Self {
            id,
            text: Rope::from_str(text),
            stamp: 0,
            markers: Mutex::new(Vec::new()),
        }
    }

    /// Document id.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.text.len_bytes()
    }

    /// Returns `true` if the document has no text.
    pub fn is_empty(&self) -> bool {
        self.text.len_bytes() == 0
    }

    /// Modification stamp, incremented by every replacement.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Full text.
    pub fn text(&self) -> String {
        self.text.to_string()
    }

    /// Immutable snapshot for analysis workers.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.id,
            text: self.text.clone(),
            stamp: self.stamp,
        }
    }

    /// Number of live (not yet dropped) markers registered with this document.
    pub fn live_marker_count(&self) -> usize {
        self.markers
            .lock()
            .iter()
            .filter(|m| m.strong_count() > 0)
            .count()
    }

    /// Create a non-greedy marker over `range`.
    pub fn create_range_marker(&self, range: TextRange) -> RangeMarker {
        self.create_marker(range, false, false)
    }

    /// Create a marker that also absorbs insertions at both of its boundaries.
    pub fn create_greedy_range_marker(&self, range: TextRange) -> RangeMarker {
        self.create_marker(range, true, true)
    }

    fn create_marker(&self, range: TextRange, greedy_left: bool, greedy_right: bool) -> RangeMarker {
        let range = range.clamp_to(self.len());
        let cell = Arc::new(MarkerCell {
            document: self.id,
            greedy_left,
            greedy_right,
            state: Mutex::new(MarkerState { range, valid: true }),
        });
        let mut markers = self.markers.lock();
        markers.retain(|m| m.strong_count() > 0);
        markers.push(Arc::downgrade(&cell));
        RangeMarker { cell }
    }

    /// Replace the text in `range` with `text`, adjusting all registered markers.
    pub fn replace(&mut self, range: TextRange, text: &str) -> Result<DocumentEvent, DocumentError> {
        self.check_range(range)?;

        let char_start = self.text.byte_to_char(range.start());
        let char_end = self.text.byte_to_char(range.end());
        let old_text = self.text.slice(char_start..char_end).to_string();

        self.text.remove(char_start..char_end);
        self.text.insert(char_start, text);
        self.stamp += 1;

        let event = DocumentEvent {
            document: self.id,
            offset: range.start(),
            old_text,
            new_text: text.to_string(),
            stamp: self.stamp,
        };

        let mut markers = self.markers.lock();
        markers.retain(|weak| match weak.upgrade() {
            Some(cell) => {
                RangeMarker { cell }.apply(event.offset, event.old_len(), event.new_len());
                true
            }
            None => false,
        });

        Ok(event)
    }

    /// Insert `text` at `offset`.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<DocumentEvent, DocumentError> {
        self.replace(TextRange::empty(offset), text)
    }

    /// Delete the text in `range`.
    pub fn delete(&mut self, range: TextRange) -> Result<DocumentEvent, DocumentError> {
        self.replace(range, "")
    }

    /// Byte range of the full lines touched by `range`, including the trailing line breaks.
    pub fn line_range_covering(&self, range: TextRange) -> TextRange {
        line_range_covering(&self.text, range)
    }

    /// Check that both ends of `range` are char boundaries within the document.
    pub fn check_range(&self, range: TextRange) -> Result<(), DocumentError> {
        check_offset(&self.text, range.start())?;
        check_offset(&self.text, range.end())
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("stamp", &self.stamp)
            .finish()
    }
}

fn check_offset(text: &Rope, offset: usize) -> Result<(), DocumentError> {
    let len = text.len_bytes();
    if offset > len {
        return Err(DocumentError::OutOfBounds { offset, len });
    }
    if text.char_to_byte(text.byte_to_char(offset)) != offset {
        return Err(DocumentError::NotCharBoundary(offset));
    }
    Ok(())
}

fn line_range_covering(text: &Rope, range: TextRange) -> TextRange {
    let len = text.len_bytes();
    let range = range.clamp_to(len);
    let first_line = text.byte_to_line(range.start());
    let last_line = text.byte_to_line(range.end());
    let start = text.line_to_byte(first_line);
    let end = if last_line + 1 < text.len_lines() {
        text.line_to_byte(last_line + 1)
    } else {
        len
    };
    TextRange::new(start, end)
}

/// An immutable view of a document at a given modification stamp.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    id: DocumentId,
    text: Rope,
    stamp: u64,
}

impl DocumentSnapshot {
    /// Create a detached snapshot (mostly useful for tests and tools).
    pub fn from_text(id: DocumentId, text: &str) -> Self {
        Self {
            id,
            text: Rope::from_str(text),
            stamp: 0,
        }
    }

    /// Document id.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Modification stamp the snapshot was taken at.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.text.len_bytes()
    }

    /// Returns `true` if the snapshot has no text.
    pub fn is_empty(&self) -> bool {
        self.text.len_bytes() == 0
    }

    /// Underlying rope.
    pub fn rope(&self) -> &Rope {
        &self.text
    }

    /// Full text.
    pub fn text(&self) -> String {
        self.text.to_string()
    }

    /// Text covered by `range` (clamped to the snapshot, rounded to char boundaries).
    pub fn text_in(&self, range: TextRange) -> String {
        let range = range.clamp_to(self.len());
        let start = self.text.byte_to_char(range.start());
        let end = self.text.byte_to_char(range.end());
        self.text.slice(start..end).to_string()
    }

    /// Byte range of the full lines touched by `range`.
    pub fn line_range_covering(&self, range: TextRange) -> TextRange {
        line_range_covering(&self.text, range)
    }

    /// Iterate `(line_start_offset, line_text)` for every line touched by `range`.
    ///
    /// Line texts do not include their line break.
    pub fn lines_in(&self, range: TextRange) -> impl Iterator<Item = (usize, String)> + '_ {
        let range = range.clamp_to(self.len());
        let first = self.text.byte_to_line(range.start());
        let last = self.text.byte_to_line(range.end());
        (first..=last.min(self.text.len_lines().saturating_sub(1))).map(move |line| {
            let start = self.text.line_to_byte(line);
            let mut text = self.text.line(line).to_string();
            while text.ends_with('\n') || text.ends_with('\r') {
                text.pop();
            }
            (start, text)
        })
    }
}
