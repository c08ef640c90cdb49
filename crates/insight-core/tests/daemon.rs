use crossbeam_channel::{Receiver, Sender};
use insight_core::{
    AnalysisError, DaemonConfig, DaemonError, DocumentError, DocumentId, Element, HighlightDaemon,
    HighlightRecord, HighlightSink, HighlightType, HighlightVisitor, PassId, PassRegistration,
    PlainTextSyntaxProvider, ProblemCollector, RangeHighlighter, TextRange, VisitError,
    VisitorRegistration, VisitorRegistry,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Flags every word spelled "bad" as an error.
struct BadWords;

impl HighlightVisitor for BadWords {
    fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError> {
        if element.kind() == "WORD" && element.text() == "bad" {
            sink.add(
                HighlightRecord::builder(HighlightType::ERROR)
                    .range(element.range())?
                    .description("bad word")?
                    .build()?,
            );
        }
        Ok(())
    }
}

fn registry<V, F>(name: &str, factory: F) -> Arc<VisitorRegistry>
where
    V: HighlightVisitor + 'static,
    F: Fn() -> V + Send + Sync + 'static,
{
    let visitors = Arc::new(VisitorRegistry::new());
    visitors.register(VisitorRegistration::new(name, factory));
    visitors
}

fn daemon_with(config: DaemonConfig) -> HighlightDaemon {
    HighlightDaemon::builder(Arc::new(PlainTextSyntaxProvider))
        .with_config(config)
        .build()
        .unwrap()
}

fn bad_words_daemon() -> HighlightDaemon {
    let daemon = daemon_with(DaemonConfig::default());
    daemon.register_pass(
        PassRegistration::new(PassId::UPDATE_ALL, "general", registry("bad", || BadWords))
            .with_problem_reporting(true),
    );
    daemon
}

#[test]
fn test_coincident_error_and_warning_leave_one_highlighter() {
    struct Both;
    impl HighlightVisitor for Both {
        fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError> {
            if element.is_root() {
                for ty in [HighlightType::ERROR, HighlightType::WARNING] {
                    sink.add(HighlightRecord::builder(ty).range_at(10, 15)?.build()?);
                }
            }
            Ok(())
        }
    }

    let mut daemon = daemon_with(DaemonConfig::default());
    daemon.register_pass(PassRegistration::new(
        PassId::UPDATE_ALL,
        "general",
        registry("both", || Both),
    ));
    let doc = daemon.open_document(&"x".repeat(100), "text", None).document;
    daemon
        .mark_file_scope_dirty(doc, TextRange::new(0, 100))
        .unwrap();
    assert_eq!(
        daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap(),
        Some(TextRange::new(0, 100))
    );

    daemon.run_passes(doc, &[], false).unwrap();
    let highlighters = daemon.session(doc).unwrap().markup().all_highlighters();
    assert_eq!(highlighters.len(), 1);
    assert_eq!(highlighters[0].range(), TextRange::new(10, 15));
    assert_eq!(
        highlighters[0].record().unwrap().highlight_type(),
        &HighlightType::ERROR
    );
    assert_eq!(daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap(), None);
}

#[test]
fn test_partial_run_keeps_highlighters_outside_dirty_range() {
    let mut daemon = bad_words_daemon();
    let doc = daemon
        .open_document(&"abcde bad\n".repeat(10), "text", None)
        .document;
    daemon.run_passes(doc, &[], false).unwrap();
    let before = daemon.session(doc).unwrap().markup().all_highlighters();
    assert_eq!(before.len(), 10);

    daemon
        .mark_file_scope_dirty(doc, TextRange::new(40, 60))
        .unwrap();
    assert_eq!(
        daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap(),
        Some(TextRange::new(40, 60))
    );
    daemon.run_passes(doc, &[], false).unwrap();

    let after = daemon.session(doc).unwrap().markup().all_highlighters();
    assert_eq!(after.len(), 10);
    let dirty = TextRange::new(40, 60);
    for old in before.iter().filter(|h| !dirty.intersects(h.range())) {
        assert!(after.iter().any(|h| Arc::ptr_eq(h, old)), "{:?} replaced", old.range());
    }
}

/// Blocks on its first element until the test lets it go.
struct Gated {
    started: Sender<()>,
    go: Receiver<()>,
    waited: bool,
}

impl HighlightVisitor for Gated {
    fn visit(&mut self, _element: Element<'_>, _sink: &mut HighlightSink) -> Result<(), VisitError> {
        if !self.waited {
            self.waited = true;
            let _ = self.started.send(());
            let _ = self.go.recv();
        }
        Ok(())
    }
}

#[test]
fn test_cancel_mid_collection_leaves_state_untouched() {
    let mut daemon = bad_words_daemon();
    let doc = daemon.open_document("ok bad\nbad ok\n", "text", None).document;
    daemon.run_passes(doc, &[], false).unwrap();
    let before = daemon.session(doc).unwrap().markup().all_highlighters();
    let modifications = daemon.session(doc).unwrap().markup().modification_count();

    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (go_tx, go_rx) = crossbeam_channel::bounded(1);
    daemon.register_pass(PassRegistration::new(
        PassId::LOCAL_INSPECTIONS,
        "gated",
        registry("gated", move || Gated {
            started: started_tx.clone(),
            go: go_rx.clone(),
            waited: false,
        }),
    ));
    daemon.mark_file_scope_dirty(doc, TextRange::new(0, 7)).unwrap();
    let dirty_before = daemon.dirty_scope(doc, PassId::LOCAL_INSPECTIONS).unwrap();
    assert!(dirty_before.is_some());

    let handle = daemon.handle();
    let canceler = thread::spawn(move || {
        started_rx.recv().unwrap();
        assert!(handle.cancel(doc));
        go_tx.send(()).unwrap();
    });
    let result = daemon.run_passes(doc, &[PassId::UPDATE_ALL], false);
    canceler.join().unwrap();

    assert_eq!(result, Err(AnalysisError::Canceled));
    assert_eq!(
        daemon.dirty_scope(doc, PassId::LOCAL_INSPECTIONS).unwrap(),
        dirty_before
    );
    let session = daemon.session(doc).unwrap();
    assert_eq!(session.markup().modification_count(), modifications);
    let after = session.markup().all_highlighters();
    assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));
    assert!(!daemon.handle().is_running(doc));
}

#[test]
fn test_external_tools_wait_for_a_clean_file() {
    let runs = Arc::new(AtomicUsize::new(0));
    struct Counting(Arc<AtomicUsize>);
    impl HighlightVisitor for Counting {
        fn visit(&mut self, element: Element<'_>, _sink: &mut HighlightSink) -> Result<(), VisitError> {
            if element.is_root() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    let problems = Arc::new(ProblemCollector::new());
    let mut daemon = HighlightDaemon::builder(Arc::new(PlainTextSyntaxProvider))
        .with_problem_sink(problems.clone())
        .build()
        .unwrap();
    daemon.register_pass(
        PassRegistration::new(PassId::UPDATE_ALL, "general", registry("bad", || BadWords))
            .with_problem_reporting(true),
    );
    let counter = Arc::clone(&runs);
    daemon.register_pass(
        PassRegistration::new(
            PassId::EXTERNAL_TOOLS,
            "external",
            registry("count", move || Counting(Arc::clone(&counter))),
        )
        .with_skip_when_errors(true),
    );

    let doc = daemon.open_document("ok bad\nfine", "text", None).document;
    daemon.run_passes(doc, &[], false).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(daemon.dirty_scopes().was_error_found(doc));
    assert!(!daemon.is_settled(doc));
    let messages: Vec<_> = problems.problems(doc).into_iter().map(|p| p.message).collect();
    assert_eq!(messages, vec!["bad word".to_string()]);

    daemon.apply_edit(doc, TextRange::new(3, 6), "good").unwrap();
    daemon.run_passes(doc, &[], false).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!daemon.dirty_scopes().was_error_found(doc));
    assert!(problems.problems(doc).is_empty());
    assert!(daemon.is_settled(doc));
}

#[test]
fn test_inconsistent_results_restart_then_give_up() {
    struct Flaky(Arc<AtomicUsize>);
    impl HighlightVisitor for Flaky {
        fn visit(&mut self, _element: Element<'_>, _sink: &mut HighlightSink) -> Result<(), VisitError> {
            Ok(())
        }

        fn finish(&mut self) -> bool {
            self.0.fetch_sub(1, Ordering::SeqCst) == 0
        }
    }

    let config = DaemonConfig {
        restart_jitter_ms: 0,
        max_inconsistency_restarts: 3,
        ..DaemonConfig::default()
    };

    let failures = Arc::new(AtomicUsize::new(2));
    let mut daemon = daemon_with(config.clone());
    let counter = Arc::clone(&failures);
    daemon.register_pass(PassRegistration::new(
        PassId::UPDATE_ALL,
        "flaky",
        registry("flaky", move || Flaky(Arc::clone(&counter))),
    ));
    let doc = daemon.open_document("text", "text", None).document;
    assert!(daemon.run_passes(doc, &[], false).is_ok());
    assert_eq!(daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap(), None);

    let failures = Arc::new(AtomicUsize::new(usize::MAX));
    let mut daemon = daemon_with(config);
    let counter = Arc::clone(&failures);
    daemon.register_pass(PassRegistration::new(
        PassId::UPDATE_ALL,
        "flaky",
        registry("flaky", move || Flaky(Arc::clone(&counter))),
    ));
    let doc = daemon.open_document("text", "text", None).document;
    assert_eq!(
        daemon.run_passes(doc, &[], false),
        Err(AnalysisError::Canceled)
    );
    assert_eq!(usize::MAX - failures.load(Ordering::SeqCst), 4);
    assert!(daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap().is_some());
}

#[test]
fn test_todo_scan_and_dumb_mode() {
    let mut daemon = daemon_with(DaemonConfig::default());
    daemon.register_pass(
        PassRegistration::new(PassId::UPDATE_ALL, "general", Arc::new(VisitorRegistry::new()))
            .with_todo_scan(true),
    );
    let doc = daemon
        .open_document("fn main() {} // TODO: later\n", "rust", None)
        .document;

    daemon.set_dumb_mode(true);
    assert!(daemon.run_passes(doc, &[], false).unwrap().is_empty());

    daemon.set_dumb_mode(false);
    let records = daemon.run_passes(doc, &[], false).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].range(), TextRange::new(16, 27));
    assert_eq!(records[0].highlight_type(), &HighlightType::TODO);
    assert_eq!(records[0].description(), Some("TODO: later"));
}

#[test]
fn test_handle_marks_defensively_from_another_thread() {
    let mut daemon = bad_words_daemon();
    let doc = daemon.open_document("one\ntwo\n", "text", None).document;
    daemon.run_passes(doc, &[], false).unwrap();
    assert!(daemon.is_settled(doc));

    let handle = daemon.handle();
    thread::spawn(move || handle.before_document_change(doc))
        .join()
        .unwrap();
    assert!(!daemon.is_settled(doc));
    assert_eq!(
        daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap(),
        Some(TextRange::new(0, 8))
    );
}

#[test]
fn test_find_highlight_by_offset_through_daemon() {
    let mut daemon = bad_words_daemon();
    let doc = daemon.open_document("ok bad", "text", None).document;
    daemon.run_passes(doc, &[], false).unwrap();

    let found = daemon.find_highlight_by_offset(doc, 6, false, None).unwrap();
    assert_eq!(found.range(), TextRange::new(3, 6));
    assert!(daemon.find_highlight_by_offset(doc, 1, false, None).is_none());
}

#[test]
fn test_rejected_edit_leaves_analysis_untouched() {
    let mut daemon = bad_words_daemon();
    let doc = daemon.open_document("ok bad 👋\n", "text", None).document;
    daemon.run_passes(doc, &[], false).unwrap();
    assert!(daemon.is_settled(doc));

    assert_eq!(
        daemon.apply_edit(doc, TextRange::new(7, 9), "x").unwrap_err(),
        DaemonError::Edit(DocumentError::NotCharBoundary(9))
    );
    assert_eq!(
        daemon.apply_edit(doc, TextRange::new(0, 99), "x").unwrap_err(),
        DaemonError::Edit(DocumentError::OutOfBounds { offset: 99, len: 12 })
    );

    assert!(daemon.is_settled(doc));
    assert_eq!(daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap(), None);
    assert_eq!(daemon.session(doc).unwrap().document().stamp(), 0);
}

const STEADY: usize = 0;
const CANCEL_ON_LINE: usize = 1;
const RETYPE_FIRST_WORD: usize = 2;

/// On "ab cd efghij\n" with the view on `0..5`: the words are visited in the viewport stage,
/// the first line (which reports `2..4`) only afterwards.
struct Staged(Arc<AtomicUsize>);

impl HighlightVisitor for Staged {
    fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError> {
        let stage = self.0.load(Ordering::SeqCst);
        match (element.kind(), element.text().as_str()) {
            ("WORD", "ab") => {
                let ty = if stage == RETYPE_FIRST_WORD {
                    HighlightType::WEAK_WARNING
                } else {
                    HighlightType::INFORMATION
                };
                sink.add(HighlightRecord::builder(ty).range(element.range())?.build()?);
            }
            ("WORD", "cd") if stage == CANCEL_ON_LINE => {
                sink.add(
                    HighlightRecord::builder(HighlightType::ERROR)
                        .range(element.range())?
                        .build()?,
                );
            }
            ("LINE", _) if element.range().start() == 0 => {
                sink.add(
                    HighlightRecord::builder(HighlightType::WARNING)
                        .range_at(2, 4)?
                        .build()?,
                );
                if stage == CANCEL_ON_LINE {
                    return Err(VisitError::Canceled);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn staged_daemon(stage: &Arc<AtomicUsize>) -> (HighlightDaemon, DocumentId) {
    let mut daemon = daemon_with(DaemonConfig::default());
    let stage = Arc::clone(stage);
    daemon.register_pass(PassRegistration::new(
        PassId::UPDATE_ALL,
        "staged",
        registry("staged", move || Staged(Arc::clone(&stage))),
    ));
    let opened = daemon.open_document("ab cd efghij\n", "text", None);
    daemon
        .set_visible_range(opened.view, TextRange::new(0, 5))
        .unwrap();
    daemon.run_passes(opened.document, &[], false).unwrap();
    (daemon, opened.document)
}

fn highlighters(daemon: &HighlightDaemon, doc: DocumentId) -> Vec<Arc<RangeHighlighter>> {
    daemon.session(doc).unwrap().markup().all_highlighters()
}

fn ranges(highlighters: &[Arc<RangeHighlighter>]) -> Vec<TextRange> {
    highlighters.iter().map(|h| h.range()).collect()
}

#[test]
fn test_cancel_after_viewport_stage_keeps_previous_highlighters() {
    let stage = Arc::new(AtomicUsize::new(STEADY));
    let (mut daemon, doc) = staged_daemon(&stage);
    let before = highlighters(&daemon, doc);
    assert_eq!(
        ranges(&before),
        vec![TextRange::new(0, 2), TextRange::new(2, 4)]
    );

    stage.store(CANCEL_ON_LINE, Ordering::SeqCst);
    daemon.mark_all_files_dirty("inspection profile changed");
    assert_eq!(
        daemon.run_passes(doc, &[], false),
        Err(AnalysisError::Canceled)
    );

    // The error shown early for "cd" is taken back with the rest of the run.
    let after = highlighters(&daemon, doc);
    assert_eq!(ranges(&after), ranges(&before));
    assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));
    assert!(after.iter().all(|h| h.is_valid()));
    assert!(daemon.dirty_scope(doc, PassId::UPDATE_ALL).unwrap().is_some());

    stage.store(STEADY, Ordering::SeqCst);
    daemon.run_passes(doc, &[], false).unwrap();
    let settled = highlighters(&daemon, doc);
    assert!(before.iter().zip(&settled).all(|(a, b)| Arc::ptr_eq(a, b)));
    assert!(daemon.is_settled(doc));
}

#[test]
fn test_identical_rerun_with_viewport_keeps_identity() {
    let stage = Arc::new(AtomicUsize::new(STEADY));
    let (mut daemon, doc) = staged_daemon(&stage);
    let before = highlighters(&daemon, doc);
    let modifications = daemon.session(doc).unwrap().markup().modification_count();

    daemon.mark_all_files_dirty("inspection profile changed");
    daemon.run_passes(doc, &[], false).unwrap();

    let after = highlighters(&daemon, doc);
    assert_eq!(after.len(), 2);
    assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));
    // At most a record refresh per highlighter, never a dispose and re-create.
    let changes = daemon.session(doc).unwrap().markup().modification_count() - modifications;
    assert!(changes <= before.len() as u64, "{changes} modifications");
}

#[test]
fn test_outside_record_in_viewport_survives_viewport_stage() {
    let stage = Arc::new(AtomicUsize::new(STEADY));
    let (mut daemon, doc) = staged_daemon(&stage);
    let before = highlighters(&daemon, doc);
    let (information, warning) = (&before[0], &before[1]);
    assert_eq!(warning.range(), TextRange::new(2, 4));

    stage.store(RETYPE_FIRST_WORD, Ordering::SeqCst);
    daemon.mark_all_files_dirty("inspection profile changed");
    daemon.run_passes(doc, &[], false).unwrap();

    let after = highlighters(&daemon, doc);
    assert_eq!(
        ranges(&after),
        vec![TextRange::new(0, 2), TextRange::new(2, 4)]
    );
    assert!(Arc::ptr_eq(&after[1], warning));
    assert_eq!(
        after[0].record().unwrap().highlight_type(),
        &HighlightType::WEAK_WARNING
    );
    assert!(!information.is_valid());
    assert!(daemon.is_settled(doc));
}
