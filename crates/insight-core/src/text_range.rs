//! Half-open offset intervals.
//!
//! Every range handled by the daemon (dirty scopes, element spans, highlight ranges, quick-fix
//! ranges) is a [`TextRange`] expressed in **byte offsets** into the document text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An immutable `[start, end)` byte-offset interval.
///
/// Invariant: `start <= end`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextRange {
    start: usize,
    end: usize,
}

impl TextRange {
    /// The empty range at offset zero.
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    /// Create a range from `start` to `end`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "invalid range: start {start} > end {end}");
        Self { start, end }
    }

    /// Create a range, returning `None` when `start > end`.
    pub fn try_new(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Create a range covering `[0, len)`.
    pub fn whole(len: usize) -> Self {
        Self { start: 0, end: len }
    }

    /// Create a range starting at `start` with the given length.
    pub fn at(start: usize, len: usize) -> Self {
        Self {
            start,
            end: start.saturating_add(len),
        }
    }

    /// Create an empty range at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Start offset (inclusive).
    pub fn start(&self) -> usize {
        self.start
    }

    /// End offset (exclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` for zero-length ranges.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `offset` lies in `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Returns `true` if `offset` lies in `[start, end]`.
    pub fn contains_inclusive(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Returns `true` if `other` lies entirely within `self`.
    pub fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns `true` if both ranges share at least one offset, or touch at a boundary.
    pub fn intersects(&self, other: TextRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns `true` if both ranges share at least one offset.
    pub fn intersects_strict(&self, other: TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest range covering both ranges.
    pub fn union(&self, other: TextRange) -> TextRange {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Overlapping part of both ranges, or `None` when they do not touch.
    pub fn intersection(&self, other: TextRange) -> Option<TextRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(Self { start, end })
    }

    /// Structural equality with `other`.
    pub fn equals_to_range(&self, other: TextRange) -> bool {
        *self == other
    }

    /// Clamp both ends into `[0, len]`.
    pub fn clamp_to(&self, len: usize) -> TextRange {
        let end = self.end.min(len);
        Self {
            start: self.start.min(end),
            end,
        }
    }
}

impl fmt::Debug for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.start, self.end)
    }
}

impl From<std::ops::Range<usize>> for TextRange {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Adjust a range for a text replacement of `old_len` bytes at `offset` by `new_len` bytes.
///
/// - edits entirely after the range leave it unchanged;
/// - edits entirely before the range shift it;
/// - edits inside the range grow/shrink its end;
/// - edits straddling a boundary extend the range over the replacement text;
/// - replacing the whole (non-empty) range returns `None` (the range became invalid).
///
/// `greedy_left` / `greedy_right` control whether pure insertions exactly at the start/end
/// boundary are absorbed into the range.
pub(crate) fn shift_for_replace(
    range: TextRange,
    offset: usize,
    old_len: usize,
    new_len: usize,
    greedy_left: bool,
    greedy_right: bool,
) -> Option<TextRange> {
    let old_end = offset + old_len;
    let (start, end) = (range.start, range.end);

    if old_len == 0 {
        // Pure insertion.
        if offset < start || (offset == start && !greedy_left && start != end) {
            return Some(TextRange::new(start + new_len, end + new_len));
        }
        if offset == start && start == end && !greedy_left && !greedy_right {
            return Some(TextRange::new(start + new_len, end + new_len));
        }
        if offset > end || (offset == end && !greedy_right) {
            return Some(range);
        }
        return Some(TextRange::new(start, end + new_len));
    }

    if old_end <= start {
        return Some(TextRange::new(
            start - old_len + new_len,
            end - old_len + new_len,
        ));
    }
    if offset >= end {
        return Some(range);
    }
    if offset <= start && old_end >= end {
        if start < end {
            return None;
        }
        return Some(TextRange::empty(offset + new_len));
    }
    if offset >= start && old_end <= end {
        return Some(TextRange::new(start, end - old_len + new_len));
    }
    if offset < start {
        // Straddles the start boundary.
        return Some(TextRange::new(offset, end - old_len + new_len));
    }
    // Straddles the end boundary.
    Some(TextRange::new(start, offset + new_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_intersection() {
        let a = TextRange::new(10, 20);
        let b = TextRange::new(15, 30);
        assert_eq!(a.union(b), TextRange::new(10, 30));
        assert_eq!(a.intersection(b), Some(TextRange::new(15, 20)));
        assert_eq!(a.intersection(TextRange::new(25, 30)), None);
        assert_eq!(a.intersection(TextRange::new(20, 30)), Some(TextRange::empty(20)));
    }

    #[test]
    fn test_containment() {
        let a = TextRange::new(10, 20);
        assert!(a.contains(10));
        assert!(!a.contains(20));
        assert!(a.contains_inclusive(20));
        assert!(a.contains_range(TextRange::new(12, 20)));
        assert!(!a.contains_range(TextRange::new(9, 12)));
        assert!(a.contains_range(TextRange::empty(20)));
    }

    #[test]
    #[should_panic]
    fn test_inverted_range_panics() {
        let _ = TextRange::new(5, 4);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(TextRange::new(5, 50).clamp_to(30), TextRange::new(5, 30));
        assert_eq!(TextRange::new(40, 50).clamp_to(30), TextRange::new(30, 30));
    }

    #[test]
    fn test_shift_insert_before_and_after() {
        let r = TextRange::new(10, 20);
        assert_eq!(
            shift_for_replace(r, 5, 0, 3, false, false),
            Some(TextRange::new(13, 23))
        );
        assert_eq!(shift_for_replace(r, 25, 0, 3, false, false), Some(r));
        assert_eq!(shift_for_replace(r, 20, 0, 3, false, false), Some(r));
        assert_eq!(
            shift_for_replace(r, 20, 0, 3, false, true),
            Some(TextRange::new(10, 23))
        );
        assert_eq!(
            shift_for_replace(r, 10, 0, 3, false, false),
            Some(TextRange::new(13, 23))
        );
        assert_eq!(
            shift_for_replace(r, 10, 0, 3, true, false),
            Some(TextRange::new(10, 23))
        );
    }

    #[test]
    fn test_shift_delete_cases() {
        let r = TextRange::new(10, 20);
        // Deletion before.
        assert_eq!(
            shift_for_replace(r, 0, 5, 0, false, false),
            Some(TextRange::new(5, 15))
        );
        // Deletion inside.
        assert_eq!(
            shift_for_replace(r, 12, 3, 0, false, false),
            Some(TextRange::new(10, 17))
        );
        // Deletion covering everything.
        assert_eq!(shift_for_replace(r, 5, 20, 0, false, false), None);
        // Straddling the start.
        assert_eq!(
            shift_for_replace(r, 8, 4, 1, false, false),
            Some(TextRange::new(8, 17))
        );
        // Straddling the end.
        assert_eq!(
            shift_for_replace(r, 18, 5, 2, false, false),
            Some(TextRange::new(10, 20))
        );
    }
}
