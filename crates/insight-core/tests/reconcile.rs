use insight_core::{
    Document, DocumentId, FileLevelAnnotations, HighlightRecord, HighlightType,
    HighlighterReconciler, MarkupModel, PassId, ReconcileStats, SeverityRegistrar, TextRange,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

const LEN: usize = 100;

struct Editor {
    document: Document,
    markup: MarkupModel,
    file_level: FileLevelAnnotations,
    severities: SeverityRegistrar,
}

impl Editor {
    fn new() -> Self {
        let id = DocumentId(1);
        Self {
            document: Document::new(id, &"x".repeat(LEN)),
            markup: MarkupModel::new(id),
            file_level: FileLevelAnnotations::new(),
            severities: SeverityRegistrar::new(),
        }
    }

    fn reconcile(&mut self, records: &[Arc<HighlightRecord>], range: TextRange) -> ReconcileStats {
        HighlighterReconciler::new(
            &self.document,
            &mut self.markup,
            &mut self.file_level,
            &self.severities,
        )
        .set_highlights_in_range(records, range, PassId::UPDATE_ALL)
    }

    fn ranges(&self) -> Vec<TextRange> {
        self.markup
            .all_highlighters()
            .iter()
            .map(|h| h.range())
            .collect()
    }
}

fn record(ty: HighlightType, start: usize, end: usize) -> Arc<HighlightRecord> {
    HighlightRecord::builder(ty)
        .range_at(start, end)
        .unwrap()
        .create()
        .unwrap()
}

fn records() -> impl Strategy<Value = Vec<(u8, usize, usize)>> {
    prop::collection::vec((0u8..3, 0..LEN, 1..20usize), 0..24)
}

fn materialize(spec: &[(u8, usize, usize)]) -> Vec<Arc<HighlightRecord>> {
    spec.iter()
        .map(|(kind, start, width)| {
            let ty = match kind {
                0 => HighlightType::ERROR,
                1 => HighlightType::WARNING,
                _ => HighlightType::INFORMATION,
            };
            record(ty, *start, (*start + *width).min(LEN))
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_second_reconcile_changes_nothing(spec in records()) {
        let mut editor = Editor::new();
        let records = materialize(&spec);
        editor.reconcile(&records, TextRange::whole(LEN));
        let before = editor.markup.all_highlighters();
        let modifications = editor.markup.modification_count();
        let attribute_changes = editor.markup.attribute_change_count();

        let stats = editor.reconcile(&records, TextRange::whole(LEN));
        prop_assert!(stats.is_stable(), "{:?}", stats);
        prop_assert_eq!(editor.markup.modification_count(), modifications);
        prop_assert_eq!(editor.markup.attribute_change_count(), attribute_changes);
        let after = editor.markup.all_highlighters();
        prop_assert_eq!(before.len(), after.len());
        prop_assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));
    }
}

#[test]
fn test_warning_fully_inside_error_is_hidden() {
    let mut editor = Editor::new();
    let stats = editor.reconcile(
        &[
            record(HighlightType::ERROR, 10, 20),
            record(HighlightType::WARNING, 12, 15),
        ],
        TextRange::whole(LEN),
    );
    assert_eq!(stats.suppressed, 1);
    assert_eq!(editor.ranges(), vec![TextRange::new(10, 20)]);

    let mut editor = Editor::new();
    let stats = editor.reconcile(
        &[
            record(HighlightType::ERROR, 10, 20),
            record(HighlightType::WARNING, 5, 25),
        ],
        TextRange::whole(LEN),
    );
    assert_eq!(stats.suppressed, 0);
    assert_eq!(
        editor.ranges(),
        vec![TextRange::new(5, 25), TextRange::new(10, 20)]
    );
}

#[test]
fn test_coincident_error_hides_warning() {
    let mut editor = Editor::new();
    editor.reconcile(
        &[
            record(HighlightType::WARNING, 10, 15),
            record(HighlightType::ERROR, 10, 15),
        ],
        TextRange::whole(LEN),
    );
    let highlighters = editor.markup.all_highlighters();
    assert_eq!(highlighters.len(), 1);
    let shown = highlighters[0].record().unwrap();
    assert_eq!(shown.highlight_type(), &HighlightType::ERROR);
}

#[test]
fn test_partial_reconcile_keeps_outside_identity() {
    let mut editor = Editor::new();
    editor.reconcile(
        &[
            record(HighlightType::WARNING, 5, 10),
            record(HighlightType::WARNING, 45, 50),
            record(HighlightType::WARNING, 70, 80),
        ],
        TextRange::whole(LEN),
    );
    let before = editor.markup.all_highlighters();

    let stats = editor.reconcile(&[], TextRange::new(40, 60));
    assert_eq!(stats.disposed, 1);
    let after = editor.markup.all_highlighters();
    assert_eq!(after.len(), 2);
    assert!(Arc::ptr_eq(&after[0], &before[0]));
    assert!(Arc::ptr_eq(&after[1], &before[2]));
}
