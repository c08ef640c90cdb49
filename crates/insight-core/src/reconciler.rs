//! Reconciles freshly computed records with the live highlighters of a document.
//!
//! [`HighlighterReconciler::set_highlights_in_range`] makes the highlighters a pass owns inside
//! a range match a new record list while touching as few highlighters as possible. Highlighters
//! whose record did not change keep their identity, so host UI state attached to them (an open
//! tooltip, a hover) survives re-analysis.

use crate::document::{Document, DocumentEvent, RangeMarker};
use crate::file_level::FileLevelAnnotations;
use crate::highlight_record::{HighlightRecord, RecordBinding};
use crate::markup::{HighlighterAttributes, HighlighterLayer, MarkupModel, RangeHighlighter};
use crate::pass::PassId;
use crate::severity::{Severity, SeverityRegistrar};
use crate::text_range::TextRange;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::sync::Arc;

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Newly allocated highlighters.
    pub created: usize,
    /// Pooled highlighters that were reused.
    pub reused: usize,
    /// Pooled highlighters disposed at the end.
    pub disposed: usize,
    /// Records dropped because a more severe record covers them.
    pub suppressed: usize,
    /// Records routed to the file-level side list.
    pub file_level: usize,
}

impl ReconcileStats {
    /// Returns `true` if no highlighter was created or disposed.
    pub fn is_stable(&self) -> bool {
        self.created == 0 && self.disposed == 0
    }
}

impl std::ops::AddAssign for ReconcileStats {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.reused += rhs.reused;
        self.disposed += rhs.disposed;
        self.suppressed += rhs.suppressed;
        self.file_level += rhs.file_level;
    }
}

/// Applies record lists to one document's markup. Must only be used by the single writer.
pub struct HighlighterReconciler<'a> {
    document: &'a Document,
    markup: &'a mut MarkupModel,
    file_level: &'a mut FileLevelAnnotations,
    severities: &'a SeverityRegistrar,
}

impl<'a> HighlighterReconciler<'a> {
    /// Create a reconciler over a document's markup and side list.
    pub fn new(
        document: &'a Document,
        markup: &'a mut MarkupModel,
        file_level: &'a mut FileLevelAnnotations,
        severities: &'a SeverityRegistrar,
    ) -> Self {
        Self {
            document,
            markup,
            file_level,
            severities,
        }
    }

    /// Make the highlighters of `group` within `range` match `records` exactly.
    ///
    /// Records lying outside `range` are ignored. Highlighters of other groups, and those of
    /// `group` outside `range`, are not touched.
    pub fn set_highlights_in_range(
        &mut self,
        records: &[Arc<HighlightRecord>],
        range: TextRange,
        group: PassId,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mut pool: Vec<Arc<RangeHighlighter>> = self
            .markup
            .contained_in(range)
            .into_iter()
            .filter(|h| h.group() == Some(group))
            .collect();

        let candidates = self.sorted_candidates(records, range);
        let covered = self.coverage(&candidates);

        if range == TextRange::whole(self.document.len()) {
            self.file_level.remove_group(group);
        } else {
            self.file_level.remove_gutter_records_in(group, range);
        }

        let mut markers: HashMap<TextRange, RangeMarker> = HashMap::new();
        for (record, covered) in candidates.iter().zip(covered) {
            if record.is_side_list_only() {
                if self.file_level.add(group, Arc::clone(record)) {
                    stats.file_level += 1;
                }
                continue;
            }
            if covered {
                stats.suppressed += 1;
                continue;
            }

            let layer = HighlighterLayer::for_severity(self.severities, record.severity());
            let highlighter = match self.take_from_pool(&mut pool, record, layer, group) {
                Some(highlighter) => {
                    stats.reused += 1;
                    self.markup.set_range(&highlighter, record.range());
                    highlighter
                }
                None => {
                    stats.created += 1;
                    self.markup
                        .add_range_highlighter(record.range(), layer, Some(group))
                }
            };
            let record = self.bind(record, &highlighter, &mut markers);
            self.markup.change_attributes(
                &highlighter,
                HighlighterAttributes::of(&record),
                Some(record),
                Some(group),
            );
        }

        // Only now that every surviving record has its highlighter.
        for highlighter in pool {
            self.markup.remove_highlighter(&highlighter);
            stats.disposed += 1;
        }

        tracing::debug!(
            document = self.document.id().get(),
            ?group,
            %range,
            created = stats.created,
            reused = stats.reused,
            disposed = stats.disposed,
            suppressed = stats.suppressed,
            file_level = stats.file_level,
            "highlighters reconciled"
        );
        stats
    }

    /// Show the `records` of `group` within `range` that no live highlighter shows yet.
    ///
    /// Nothing is disposed or changed: this is for early results of a pass that is still
    /// running, and elements visited later may still claim any highlighter of the group. The
    /// final [`set_highlights_in_range`](Self::set_highlights_in_range) of a successful run
    /// reuses what was added here and disposes what went stale. New highlighters are appended
    /// to `created` so a run that does not complete can take them back. Side-list records wait
    /// for the final reconciliation.
    pub fn publish_highlights_in_range(
        &mut self,
        records: &[Arc<HighlightRecord>],
        range: TextRange,
        group: PassId,
        created: &mut Vec<Arc<RangeHighlighter>>,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let live: Vec<Arc<RangeHighlighter>> = self
            .markup
            .contained_in(range)
            .into_iter()
            .filter(|h| h.group() == Some(group))
            .collect();

        let candidates = self.sorted_candidates(records, range);
        let covered = self.coverage(&candidates);

        let mut markers: HashMap<TextRange, RangeMarker> = HashMap::new();
        for (record, covered) in candidates.iter().zip(covered) {
            if record.is_side_list_only() {
                continue;
            }
            if covered {
                stats.suppressed += 1;
                continue;
            }

            let layer = HighlighterLayer::for_severity(self.severities, record.severity());
            let shown = record
                .highlighter()
                .is_some_and(|bound| self.markup.contains(&bound))
                || live
                    .iter()
                    .any(|h| h.layer() == layer && h.range() == record.range());
            if shown {
                stats.reused += 1;
                continue;
            }

            let highlighter = self
                .markup
                .add_range_highlighter(record.range(), layer, Some(group));
            let record = self.bind(record, &highlighter, &mut markers);
            self.markup.change_attributes(
                &highlighter,
                HighlighterAttributes::of(&record),
                Some(record),
                Some(group),
            );
            stats.created += 1;
            created.push(highlighter);
        }

        tracing::debug!(
            document = self.document.id().get(),
            ?group,
            %range,
            created = stats.created,
            shown = stats.reused,
            suppressed = stats.suppressed,
            "early highlighters published"
        );
        stats
    }

    /// Records within `range`, sorted by (start, end, severity descending, type, gutter,
    /// attributes, description) with identical entries collapsed.
    fn sorted_candidates(
        &self,
        records: &[Arc<HighlightRecord>],
        range: TextRange,
    ) -> Vec<Arc<HighlightRecord>> {
        let len = self.document.len();
        let mut candidates: Vec<(usize, &Arc<HighlightRecord>)> = records
            .iter()
            .filter(|r| range.contains_range(r.range()) && r.end() <= len)
            .map(|r| (self.severities.rank(r.severity()), r))
            .collect();
        if candidates.len() != records.len() {
            tracing::trace!(
                dropped = records.len() - candidates.len(),
                "records outside the reconciled range ignored"
            );
        }

        candidates.sort_by(|(rank_a, a), (rank_b, b)| {
            a.start()
                .cmp(&b.start())
                .then(a.end().cmp(&b.end()))
                .then(rank_b.cmp(rank_a))
                .then_with(|| compare_details(a, b))
        });
        candidates.dedup_by(|(rank_a, a), (rank_b, b)| {
            rank_a == rank_b
                && a.range() == b.range()
                && compare_details(a, b) == Ordering::Equal
        });
        candidates.into_iter().map(|(_, r)| Arc::clone(r)).collect()
    }

    /// For each candidate, whether an enclosing record at least as severe hides it.
    ///
    /// Only inline records above INFORMATION can be hidden, and only by inline records. Between
    /// records with the same range and severity, the first one wins.
    fn coverage(&self, candidates: &[Arc<HighlightRecord>]) -> Vec<bool> {
        let ranks: Vec<usize> = candidates
            .iter()
            .map(|r| self.severities.rank(r.severity()))
            .collect();
        let info_rank = self.severities.rank(&Severity::INFORMATION);

        // Containers must be seen before what they contain.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by_key(|&i| {
            (
                candidates[i].start(),
                Reverse(candidates[i].end()),
                Reverse(ranks[i]),
                i,
            )
        });

        let mut covered = vec![false; candidates.len()];
        // (end, rank) of kept inline records that may still contain later ones.
        let mut open: Vec<(usize, usize)> = Vec::new();
        for i in order {
            let record = &candidates[i];
            if record.is_side_list_only() {
                continue;
            }
            open.retain(|(end, _)| *end >= record.start());
            let hideable = ranks[i] > info_rank;
            if hideable
                && open
                    .iter()
                    .any(|(end, rank)| *end >= record.end() && *rank >= ranks[i])
            {
                covered[i] = true;
                continue;
            }
            open.push((record.end(), ranks[i]));
        }
        covered
    }

    fn take_from_pool(
        &self,
        pool: &mut Vec<Arc<RangeHighlighter>>,
        record: &HighlightRecord,
        layer: HighlighterLayer,
        group: PassId,
    ) -> Option<Arc<RangeHighlighter>> {
        if let Some(bound) = record.highlighter() {
            if let Some(pos) = pool.iter().position(|h| Arc::ptr_eq(h, &bound)) {
                return Some(pool.remove(pos));
            }
            if bound.is_valid() && bound.group() == Some(group) && self.markup.contains(&bound) {
                return Some(bound);
            }
        }
        let range = record.range();
        if let Some(pos) = pool
            .iter()
            .position(|h| h.layer() == layer && h.range() == range)
        {
            return Some(pool.remove(pos));
        }
        pool.iter()
            .position(|h| h.layer() == layer && h.range().intersects_strict(range))
            .map(|pos| pool.remove(pos))
    }

    fn bind(
        &self,
        record: &Arc<HighlightRecord>,
        highlighter: &Arc<RangeHighlighter>,
        markers: &mut HashMap<TextRange, RangeMarker>,
    ) -> Arc<HighlightRecord> {
        if record
            .highlighter()
            .is_some_and(|bound| Arc::ptr_eq(&bound, highlighter))
        {
            return Arc::clone(record);
        }
        let record = if record.is_bound() {
            Arc::new(record.unbound_copy())
        } else {
            Arc::clone(record)
        };

        let document = self.document;
        let mut marker_for = |range: TextRange| {
            markers
                .entry(range)
                .or_insert_with(|| document.create_range_marker(range))
                .clone()
        };
        let fix_marker = (record.fix_range() != record.range()).then(|| marker_for(record.fix_range()));
        let quick_fix_markers = record
            .quick_fixes()
            .iter()
            .map(|fix| fix.fix_range.map(&mut marker_for))
            .collect();

        let binding = RecordBinding {
            highlighter: Arc::downgrade(highlighter),
            fix_marker,
            quick_fix_markers,
        };
        if record.bind(binding).is_err() {
            tracing::warn!(?record, "record bound concurrently");
        }
        record
    }
}

fn compare_details(a: &HighlightRecord, b: &HighlightRecord) -> Ordering {
    a.highlight_type()
        .id()
        .cmp(b.highlight_type().id())
        .then_with(|| a.gutter().cmp(&b.gutter()))
        .then_with(|| a.forced_attributes().cmp(&b.forced_attributes()))
        .then_with(|| a.description().cmp(&b.description()))
}

/// Cheap invalidation on every edit, before the next pass runs.
///
/// Highlighters near the edit whose record needs an update on typing are removed outright when
/// they show a wrong reference, and marked stale otherwise. Returns the number of highlighters
/// touched. Must run after the markup was adjusted for `event`.
pub fn update_highlighters_by_typing(markup: &mut MarkupModel, event: &DocumentEvent) -> usize {
    let start = event.offset.saturating_sub(1);
    let window = TextRange::at(start, event.old_len().max(event.new_len()));
    let mut touched = 0;
    for highlighter in markup.overlapping(window) {
        let Some(record) = highlighter.record() else {
            continue;
        };
        if !record.needs_update_on_typing() {
            continue;
        }
        touched += 1;
        if record.highlight_type().is_wrong_reference() {
            markup.remove_highlighter(&highlighter);
        } else {
            markup.mark_stale(&highlighter);
        }
    }
    if touched > 0 {
        tracing::trace!(touched, offset = event.offset, "highlighters invalidated by typing");
    }
    touched
}

/// The most severe record whose highlighter covers `offset` (end inclusive).
///
/// With `include_fix_range`, a record also matches when `offset` lies in its fix range. Records
/// less severe than `min_severity` are ignored. Ties go to the record starting first.
pub fn find_highlight_by_offset(
    markup: &MarkupModel,
    severities: &SeverityRegistrar,
    offset: usize,
    include_fix_range: bool,
    min_severity: Option<&Severity>,
) -> Option<Arc<HighlightRecord>> {
    let candidates = if include_fix_range {
        markup.all_highlighters()
    } else {
        markup.at_offset(offset)
    };

    let mut best: Option<Arc<HighlightRecord>> = None;
    for highlighter in candidates {
        let Some(record) = highlighter.record() else {
            continue;
        };
        let hit = highlighter.range().contains_inclusive(offset)
            || (include_fix_range && fix_range_of(&record).contains_inclusive(offset));
        if !hit {
            continue;
        }
        if min_severity.is_some_and(|min| !severities.is_at_least(record.severity(), min)) {
            continue;
        }
        let better = best
            .as_ref()
            .is_none_or(|b| severities.compare(record.severity(), b.severity()) == Ordering::Greater);
        if better {
            best = Some(record);
        }
    }
    best
}

fn fix_range_of(record: &HighlightRecord) -> TextRange {
    record
        .binding()
        .and_then(|b| b.fix_marker.as_ref())
        .and_then(|m| m.valid_range())
        .unwrap_or_else(|| record.fix_range())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use crate::highlight_record::{GutterMark, HighlightType, QuickFix};

    struct Fixture {
        document: Document,
        markup: MarkupModel,
        file_level: FileLevelAnnotations,
        severities: SeverityRegistrar,
    }

    impl Fixture {
        fn new(len: usize) -> Self {
            Self {
                document: Document::new(DocumentId(1), &" ".repeat(len)),
                markup: MarkupModel::new(DocumentId(1)),
                file_level: FileLevelAnnotations::new(),
                severities: SeverityRegistrar::new(),
            }
        }

        fn reconcile(
            &mut self,
            records: &[Arc<HighlightRecord>],
            range: TextRange,
            group: PassId,
        ) -> ReconcileStats {
            HighlighterReconciler::new(
                &self.document,
                &mut self.markup,
                &mut self.file_level,
                &self.severities,
            )
            .set_highlights_in_range(records, range, group)
        }

        fn publish(
            &mut self,
            records: &[Arc<HighlightRecord>],
            range: TextRange,
            created: &mut Vec<Arc<RangeHighlighter>>,
        ) -> ReconcileStats {
            HighlighterReconciler::new(
                &self.document,
                &mut self.markup,
                &mut self.file_level,
                &self.severities,
            )
            .publish_highlights_in_range(records, range, PassId::UPDATE_ALL, created)
        }
    }

    fn record(ty: HighlightType, start: usize, end: usize) -> Arc<HighlightRecord> {
        HighlightRecord::builder(ty)
            .range_at(start, end)
            .unwrap()
            .create()
            .unwrap()
    }

    #[test]
    fn test_publish_keeps_highlighters_it_did_not_match() {
        let mut fx = Fixture::new(100);
        fx.reconcile(
            &[
                record(HighlightType::WARNING, 2, 4),
                record(HighlightType::INFORMATION, 6, 8),
            ],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        let before = fx.markup.all_highlighters();
        let modifications = fx.markup.modification_count();

        // Only the information record was produced so far; the warning may still come.
        let mut created = Vec::new();
        let stats = fx.publish(
            &[record(HighlightType::INFORMATION, 6, 8)],
            TextRange::new(0, 10),
            &mut created,
        );
        assert_eq!(stats.created, 0);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.disposed, 0);
        assert!(created.is_empty());
        assert_eq!(fx.markup.modification_count(), modifications);
        let after = fx.markup.all_highlighters();
        assert_eq!(after.len(), 2);
        assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));
    }

    #[test]
    fn test_published_highlighter_is_reused_by_final_reconcile() {
        let mut fx = Fixture::new(100);
        let old = record(HighlightType::WARNING, 20, 30);
        fx.reconcile(&[old], TextRange::new(0, 100), PassId::UPDATE_ALL);
        let kept = fx.markup.all_highlighters()[0].clone();

        let early = record(HighlightType::ERROR, 2, 4);
        let mut created = Vec::new();
        let stats = fx.publish(&[early.clone()], TextRange::new(0, 10), &mut created);
        assert_eq!(stats.created, 1);
        assert_eq!(created.len(), 1);
        assert!(Arc::ptr_eq(&early.highlighter().unwrap(), &created[0]));

        let stats = fx.reconcile(
            &[early, record(HighlightType::WARNING, 20, 30)],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        assert!(stats.is_stable());
        let all = fx.markup.all_highlighters();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|h| Arc::ptr_eq(h, &created[0])));
        assert!(all.iter().any(|h| Arc::ptr_eq(h, &kept)));
    }

    #[test]
    fn test_warning_inside_error_is_suppressed() {
        let mut fx = Fixture::new(100);
        let stats = fx.reconcile(
            &[
                record(HighlightType::ERROR, 10, 20),
                record(HighlightType::WARNING, 12, 15),
            ],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        assert_eq!(stats.created, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(fx.markup.all_highlighters()[0].range(), TextRange::new(10, 20));
    }

    #[test]
    fn test_partially_covered_warning_survives() {
        let mut fx = Fixture::new(100);
        let stats = fx.reconcile(
            &[
                record(HighlightType::ERROR, 10, 20),
                record(HighlightType::WARNING, 5, 25),
            ],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        assert_eq!(stats.created, 2);
        assert_eq!(stats.suppressed, 0);
    }

    #[test]
    fn test_information_is_never_suppressed() {
        let mut fx = Fixture::new(100);
        let stats = fx.reconcile(
            &[
                record(HighlightType::ERROR, 10, 20),
                record(HighlightType::SYMBOL, 12, 15),
            ],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        assert_eq!(stats.created, 2);
    }

    #[test]
    fn test_identical_records_collapse() {
        let mut fx = Fixture::new(100);
        let stats = fx.reconcile(
            &[
                record(HighlightType::WARNING, 1, 2),
                record(HighlightType::WARNING, 1, 2),
            ],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        assert_eq!(stats.created, 1);
        assert_eq!(stats.suppressed, 0);
    }

    #[test]
    fn test_second_reconcile_is_a_no_op() {
        let mut fx = Fixture::new(100);
        let records = vec![
            record(HighlightType::ERROR, 10, 20),
            record(HighlightType::WARNING, 30, 40),
        ];
        fx.reconcile(&records, TextRange::new(0, 100), PassId::UPDATE_ALL);
        let before = fx.markup.all_highlighters();
        let modifications = fx.markup.modification_count();

        let stats = fx.reconcile(&records, TextRange::new(0, 100), PassId::UPDATE_ALL);
        assert!(stats.is_stable());
        assert_eq!(stats.reused, 2);
        assert_eq!(fx.markup.modification_count(), modifications);
        let after = fx.markup.all_highlighters();
        assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));
    }

    #[test]
    fn test_new_records_reuse_highlighters_with_same_range() {
        let mut fx = Fixture::new(100);
        fx.reconcile(
            &[record(HighlightType::WARNING, 30, 40)],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        let old = fx.markup.all_highlighters()[0].clone();
        let fresh = record(HighlightType::WARNING, 30, 40);
        let stats = fx.reconcile(&[fresh.clone()], TextRange::new(0, 100), PassId::UPDATE_ALL);
        assert_eq!(stats.reused, 1);
        assert!(Arc::ptr_eq(&fresh.highlighter().unwrap(), &old));
        assert!(Arc::ptr_eq(&old.record().unwrap(), &fresh));
    }

    #[test]
    fn test_other_groups_and_ranges_untouched() {
        let mut fx = Fixture::new(100);
        fx.reconcile(
            &[record(HighlightType::WARNING, 10, 20), record(HighlightType::WARNING, 45, 50)],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        fx.reconcile(
            &[record(HighlightType::WARNING, 42, 44)],
            TextRange::new(0, 100),
            PassId::LOCAL_INSPECTIONS,
        );
        let outside = fx.markup.at_offset(15)[0].clone();

        let stats = fx.reconcile(&[], TextRange::new(40, 60), PassId::UPDATE_ALL);
        assert_eq!(stats.disposed, 1);
        assert!(outside.is_valid());
        assert_eq!(fx.markup.len(), 2);
    }

    #[test]
    fn test_side_list_routing() {
        let mut fx = Fixture::new(100);
        let banner = HighlightRecord::builder(HighlightType::WARNING)
            .range_at(0, 100)
            .unwrap()
            .file_level_annotation()
            .create()
            .unwrap();
        let gutter = HighlightRecord::builder(HighlightType::INFORMATION)
            .range_at(5, 6)
            .unwrap()
            .gutter(GutterMark {
                icon: "run".to_string(),
                tooltip: None,
            })
            .unwrap()
            .create()
            .unwrap();
        let stats = fx.reconcile(&[banner, gutter], TextRange::new(0, 100), PassId::UPDATE_ALL);
        assert_eq!(stats.file_level, 2);
        assert!(fx.markup.is_empty());

        // A whole-file run replaces the group's side list.
        fx.reconcile(&[], TextRange::new(0, 100), PassId::UPDATE_ALL);
        assert!(fx.file_level.is_empty());
    }

    #[test]
    fn test_fix_markers_are_shared() {
        let mut fx = Fixture::new(100);
        let make = |start| {
            HighlightRecord::builder(HighlightType::WARNING)
                .range_at(start, start + 2)
                .unwrap()
                .fix_range(TextRange::new(0, 50))
                .unwrap()
                .quick_fix(QuickFix::new("fix", "fix.all").with_range(TextRange::new(0, 50)))
                .create()
                .unwrap()
        };
        let (a, b) = (make(10), make(20));
        fx.reconcile(&[a.clone(), b.clone()], TextRange::new(0, 100), PassId::UPDATE_ALL);
        let marker_a = a.binding().unwrap().fix_marker.clone().unwrap();
        let marker_b = b.binding().unwrap().fix_marker.clone().unwrap();
        assert!(marker_a.ptr_eq(&marker_b));
        assert!(
            a.binding().unwrap().quick_fix_markers[0]
                .as_ref()
                .unwrap()
                .ptr_eq(&marker_a)
        );
    }

    #[test]
    fn test_find_highlight_by_offset_prefers_severity() {
        let mut fx = Fixture::new(100);
        let warning = HighlightRecord::builder(HighlightType::WARNING)
            .range_at(5, 30)
            .unwrap()
            .fix_range(TextRange::new(0, 40))
            .unwrap()
            .create()
            .unwrap();
        fx.reconcile(
            &[warning, record(HighlightType::ERROR, 10, 12)],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        let found = find_highlight_by_offset(&fx.markup, &fx.severities, 11, false, None).unwrap();
        assert_eq!(found.severity(), &Severity::ERROR);
        let found = find_highlight_by_offset(&fx.markup, &fx.severities, 20, false, None).unwrap();
        assert_eq!(found.severity(), &Severity::WARNING);
        assert!(find_highlight_by_offset(&fx.markup, &fx.severities, 35, false, None).is_none());
        assert!(find_highlight_by_offset(&fx.markup, &fx.severities, 35, true, None).is_some());
        assert!(
            find_highlight_by_offset(&fx.markup, &fx.severities, 20, false, Some(&Severity::ERROR))
                .is_none()
        );
    }

    #[test]
    fn test_typing_fast_path() {
        let mut fx = Fixture::new(100);
        let unresolved = HighlightRecord::builder(HighlightType::WRONG_REFERENCE)
            .range_at(10, 15)
            .unwrap()
            .create()
            .unwrap();
        fx.reconcile(
            &[
                unresolved,
                record(HighlightType::WARNING, 11, 20),
                record(HighlightType::WARNING, 60, 70),
            ],
            TextRange::new(0, 100),
            PassId::UPDATE_ALL,
        );
        let event = fx.document.insert(12, "x").unwrap();
        fx.markup.apply_edit(&event);
        assert_eq!(update_highlighters_by_typing(&mut fx.markup, &event), 2);
        assert_eq!(fx.markup.len(), 2);
        let near = fx.markup.at_offset(18)[0].clone();
        assert!(near.is_stale());
        assert!(!fx.markup.at_offset(65)[0].is_stale());
    }
}
