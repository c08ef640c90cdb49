use insight_core::{
    DirtyScope, DirtyScopeMap, Document, DocumentId, PassId, PassRegistrar, PassRegistration,
    TextRange, VisitorRegistry,
};
use proptest::prelude::*;
use std::sync::Arc;

fn map() -> DirtyScopeMap {
    let registrar = Arc::new(PassRegistrar::new());
    registrar.register(PassRegistration::new(
        PassId::UPDATE_ALL,
        "general",
        Arc::new(VisitorRegistry::new()),
    ));
    registrar.register(PassRegistration::new(
        PassId::LOCAL_INSPECTIONS,
        "inspections",
        Arc::new(VisitorRegistry::new()),
    ));
    DirtyScopeMap::new(registrar)
}

fn settled(map: &DirtyScopeMap, document: &Document) {
    for pass in [PassId::UPDATE_ALL, PassId::LOCAL_INSPECTIONS, PassId::WOLF] {
        map.mark_file_up_to_date(document.id(), pass);
    }
}

fn marks(len: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..len, 1..=len), 1..8).prop_map(move |pairs| {
        pairs
            .into_iter()
            .map(|(start, width)| (start, (start + width).min(len)))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_dirty_scope_is_union_of_marks(
        (len, ranges) in (1usize..200).prop_flat_map(|len| (Just(len), marks(len)))
    ) {
        let map = map();
        let document = Document::new(DocumentId(1), &"x".repeat(len));
        settled(&map, &document);

        let mut expected: Option<TextRange> = None;
        for (start, end) in &ranges {
            let range = TextRange::new(*start, *end);
            map.mark_file_scope_dirty(&document, range, len);
            expected = Some(expected.map_or(range, |e| e.union(range)));
        }
        let expected = expected.unwrap();

        for pass in [PassId::UPDATE_ALL, PassId::LOCAL_INSPECTIONS] {
            prop_assert_eq!(map.get_file_dirty_scope(&document, pass), Some(expected));
        }
        let status = map.status(document.id()).unwrap();
        let whole = matches!(status.scope(PassId::UPDATE_ALL), Some(DirtyScope::WholeFile));
        prop_assert_eq!(whole, expected == TextRange::whole(len));
    }
}

#[test]
fn test_marking_whole_range_collapses_to_whole_file() {
    let map = map();
    let document = Document::new(DocumentId(1), "0123456789");
    settled(&map, &document);

    map.mark_file_scope_dirty(&document, TextRange::new(0, 4), 10);
    assert!(matches!(
        map.status(document.id()).unwrap().scope(PassId::UPDATE_ALL),
        Some(DirtyScope::Range(_))
    ));
    map.mark_file_scope_dirty(&document, TextRange::new(0, 10), 10);
    assert!(matches!(
        map.status(document.id()).unwrap().scope(PassId::UPDATE_ALL),
        Some(DirtyScope::WholeFile)
    ));
    // Whole-file scopes never narrow again.
    map.mark_file_scope_dirty(&document, TextRange::new(2, 3), 10);
    assert_eq!(
        map.get_file_dirty_scope(&document, PassId::UPDATE_ALL),
        Some(TextRange::new(0, 10))
    );
}

#[test]
fn test_mark_up_to_date_twice_is_idempotent() {
    let map = map();
    let document = Document::new(DocumentId(1), "abc");
    assert_eq!(
        map.get_file_dirty_scope(&document, PassId::UPDATE_ALL),
        Some(TextRange::new(0, 3))
    );

    map.mark_file_up_to_date(document.id(), PassId::UPDATE_ALL);
    let once = map.status(document.id()).unwrap();
    assert_eq!(map.get_file_dirty_scope(&document, PassId::UPDATE_ALL), None);

    map.mark_file_up_to_date(document.id(), PassId::UPDATE_ALL);
    assert_eq!(map.get_file_dirty_scope(&document, PassId::UPDATE_ALL), None);
    let twice = map.status(document.id()).unwrap();
    assert_eq!(
        once.scope(PassId::LOCAL_INSPECTIONS).is_some(),
        twice.scope(PassId::LOCAL_INSPECTIONS).is_some()
    );
    assert_eq!(once.is_wolf_pass_finished(), twice.is_wolf_pass_finished());
}

#[test]
fn test_dirty_scope_follows_later_edits() {
    let map = map();
    let mut document = Document::new(DocumentId(1), "line one\nline two\nline three\n");
    settled(&map, &document);

    map.mark_file_scope_dirty(&document, TextRange::new(9, 18), document.len());
    document.insert(0, ">> ").unwrap();
    assert_eq!(
        map.get_file_dirty_scope(&document, PassId::UPDATE_ALL),
        Some(TextRange::new(12, 21))
    );
}

#[test]
fn test_defensive_mark_escalates_unless_resolved() {
    let map = map();
    let document = Document::new(DocumentId(1), "abcdef");
    settled(&map, &document);

    map.mark_file_scope_dirty_defensively(document.id());
    map.mark_file_scope_dirty(&document, TextRange::new(1, 2), 6);
    assert_eq!(
        map.get_file_dirty_scope(&document, PassId::UPDATE_ALL),
        Some(TextRange::new(1, 2))
    );

    settled(&map, &document);
    map.mark_file_scope_dirty_defensively(document.id());
    assert!(!map.all_dirty_scopes_are_null(document.id()));
    assert_eq!(
        map.get_file_dirty_scope(&document, PassId::LOCAL_INSPECTIONS),
        Some(TextRange::new(0, 6))
    );
}

#[test]
fn test_settled_requires_every_pass() {
    let map = map();
    let document = Document::new(DocumentId(1), "abc");
    map.mark_file_up_to_date(document.id(), PassId::UPDATE_ALL);
    map.mark_file_up_to_date(document.id(), PassId::LOCAL_INSPECTIONS);
    assert!(!map.all_dirty_scopes_are_null(document.id()));
    map.mark_file_up_to_date(document.id(), PassId::WOLF);
    assert!(map.all_dirty_scopes_are_null(document.id()));

    map.mark_all_files_dirty("test");
    assert!(!map.all_dirty_scopes_are_null(document.id()));
}

#[test]
#[should_panic(expected = "forbidden")]
fn test_dirt_while_forbidden_panics() {
    let map = map();
    let document = Document::new(DocumentId(1), "abc");
    settled(&map, &document);
    map.set_dirt_allowed(false);
    map.mark_file_scope_dirty(&document, TextRange::new(0, 1), 3);
}
