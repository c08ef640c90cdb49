//! The highlighting daemon: open documents, edits, and pass scheduling.
//!
//! [`HighlightDaemon`] owns every open [`Document`] together with its live [`MarkupModel`] and
//! file-level side list. The thread owning the daemon is the single writer: it applies edits and
//! reconciles highlighters. [`HighlightDaemon::run_passes`] spawns one scoped worker per dirty
//! pass; workers only read snapshots and stream records back over a bounded channel.
//!
//! Other threads interact through a [`DaemonHandle`], which can cancel in-flight passes, mark
//! documents defensively dirty before an edit, and take the model write lock.

use crate::config::{ConfigError, DaemonConfig};
use crate::dirty_scope::DirtyScopeMap;
use crate::divider::Divider;
use crate::document::{Document, DocumentEvent, DocumentId};
use crate::error::{AnalysisError, DaemonError};
use crate::file_level::FileLevelAnnotations;
use crate::general_pass::{GeneralHighlightingPass, PassContext, PassMessage};
use crate::highlight_record::HighlightRecord;
use crate::markup::{MarkupModel, RangeHighlighter};
use crate::pass::{PassId, PassRegistrar, PassRegistration};
use crate::problems::{ProblemCollector, ProblemSink};
use crate::progress::{InterruptPolicy, ProgressToken};
use crate::reconciler::{
    HighlighterReconciler, ReconcileStats, find_highlight_by_offset, update_highlighters_by_typing,
};
use crate::severity::{Severity, SeverityRegistrar};
use crate::syntax::{FileView, SyntaxProvider};
use crate::text_range::TextRange;
use crate::visitor::VisitorRegistry;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Capacity of the transfer queue, in messages.
const TRANSFER_QUEUE_CAPACITY: usize = 16;

/// Opaque identifier of an editor view onto an open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(u64);

impl ViewId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Result of opening a document (a document always starts with one view).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDocumentResult {
    /// The created document id.
    pub document: DocumentId,
    /// The initial view.
    pub view: ViewId,
}

/// An open document with its highlighting state.
#[derive(Debug)]
pub struct EditorSession {
    document: Document,
    language: String,
    uri: Option<String>,
    markup: MarkupModel,
    file_level: FileLevelAnnotations,
    views: BTreeMap<ViewId, TextRange>,
}

impl EditorSession {
    /// The live document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Base language id.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Host-provided URI.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Live highlighters.
    pub fn markup(&self) -> &MarkupModel {
        &self.markup
    }

    /// File-level annotations and gutter records.
    pub fn file_level(&self) -> &FileLevelAnnotations {
        &self.file_level
    }

    /// Views and their visible ranges.
    pub fn views(&self) -> impl Iterator<Item = (ViewId, TextRange)> + '_ {
        self.views.iter().map(|(id, range)| (*id, *range))
    }

    /// Union of the non-empty visible ranges, clamped to the document. Empty when nothing is
    /// visible.
    pub fn priority_range(&self) -> TextRange {
        self.views
            .values()
            .filter(|range| !range.is_empty())
            .map(|range| range.clamp_to(self.document.len()))
            .reduce(|a, b| a.union(b))
            .unwrap_or(TextRange::EMPTY)
    }

    /// Every materialized record (inline and side list), ordered by range.
    pub fn highlights(&self) -> Vec<Arc<HighlightRecord>> {
        let mut records: Vec<Arc<HighlightRecord>> = self
            .markup
            .all_highlighters()
            .iter()
            .filter_map(|h| h.record())
            .chain(self.file_level.entries().iter().map(|e| Arc::clone(&e.record)))
            .collect();
        records.sort_by_key(|r| (r.start(), r.end()));
        records
    }
}

struct Shared {
    dirty_scopes: DirtyScopeMap,
    in_flight: Mutex<HashMap<DocumentId, Vec<ProgressToken>>>,
    model_lock: Arc<RwLock<()>>,
    policy: InterruptPolicy,
}

impl Shared {
    fn cancel(&self, document: DocumentId) -> bool {
        let tokens = self.in_flight.lock().get(&document).cloned().unwrap_or_default();
        for token in &tokens {
            token.cancel();
        }
        !tokens.is_empty()
    }

    fn cancel_all(&self) -> usize {
        let tokens: Vec<ProgressToken> = self.in_flight.lock().values().flatten().cloned().collect();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    fn before_change(&self, document: DocumentId) {
        self.dirty_scopes.mark_file_scope_dirty_defensively(document);
        if self.cancel(document) {
            tracing::debug!(document = document.get(), "in-flight passes canceled by edit");
        }
    }

    fn restart(&self, reason: &str) {
        self.cancel_all();
        self.dirty_scopes.mark_all_files_dirty(reason);
    }

    fn register_tokens(&self, document: DocumentId, tokens: &[ProgressToken]) {
        self.in_flight
            .lock()
            .entry(document)
            .or_default()
            .extend(tokens.iter().cloned());
    }

    fn unregister_tokens(&self, document: DocumentId, tokens: &[ProgressToken]) {
        let mut in_flight = self.in_flight.lock();
        if let Some(running) = in_flight.get_mut(&document) {
            running.retain(|t| !tokens.iter().any(|done| done.ptr_eq(t)));
            if running.is_empty() {
                in_flight.remove(&document);
            }
        }
    }
}

/// Cloneable, thread-safe handle to a daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    shared: Arc<Shared>,
}

impl DaemonHandle {
    /// Cancel the in-flight passes of `document`. Returns `true` if any was running.
    ///
    /// # Panics
    ///
    /// Panics while interrupts are forbidden.
    pub fn cancel(&self, document: DocumentId) -> bool {
        self.shared.cancel(document)
    }

    /// Cancel every in-flight pass. Returns the number of canceled passes.
    pub fn cancel_all(&self) -> usize {
        self.shared.cancel_all()
    }

    /// Announce that `document` is about to change: mark it defensively dirty and cancel its
    /// in-flight passes.
    pub fn before_document_change(&self, document: DocumentId) {
        self.shared.before_change(document);
    }

    /// Returns `true` while a pass of `document` is running.
    pub fn is_running(&self, document: DocumentId) -> bool {
        self.shared.in_flight.lock().contains_key(&document)
    }

    /// Cancel every in-flight pass and take the model write lock.
    ///
    /// While the guard is alive, new passes fail fast with [`AnalysisError::WritePending`].
    pub fn lock_for_write(&self) -> RwLockWriteGuard<'_, ()> {
        self.shared.cancel_all();
        self.shared.model_lock.write()
    }

    /// Dirty-scope state of all documents.
    pub fn dirty_scopes(&self) -> &DirtyScopeMap {
        &self.shared.dirty_scopes
    }

    /// Policy governing cancellation of the daemon's passes.
    pub fn interrupt_policy(&self) -> &InterruptPolicy {
        &self.shared.policy
    }
}

impl std::fmt::Debug for DaemonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonHandle")
            .field("dirty_scopes", &self.shared.dirty_scopes)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HighlightDaemon`].
pub struct DaemonBuilder {
    provider: Arc<dyn SyntaxProvider>,
    config: DaemonConfig,
    severities: Option<Arc<SeverityRegistrar>>,
    passes: Option<Arc<PassRegistrar>>,
    problems: Option<Arc<dyn ProblemSink>>,
    divider: Divider,
}

impl DaemonBuilder {
    /// Start building a daemon reading trees from `provider`.
    pub fn new(provider: Arc<dyn SyntaxProvider>) -> Self {
        Self {
            provider,
            config: DaemonConfig::default(),
            severities: None,
            passes: None,
            problems: None,
            divider: Divider::new(),
        }
    }

    /// Use `config` instead of the defaults.
    pub fn with_config(mut self, config: DaemonConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a severity registrar.
    pub fn with_severities(mut self, severities: Arc<SeverityRegistrar>) -> Self {
        self.severities = Some(severities);
        self
    }

    /// Share a pass registrar.
    pub fn with_passes(mut self, passes: Arc<PassRegistrar>) -> Self {
        self.passes = Some(passes);
        self
    }

    /// Report problems to `sink` instead of an internal [`ProblemCollector`].
    pub fn with_problem_sink(mut self, sink: Arc<dyn ProblemSink>) -> Self {
        self.problems = Some(sink);
        self
    }

    /// Use `divider` (and its element filters).
    pub fn with_divider(mut self, divider: Divider) -> Self {
        self.divider = divider;
        self
    }

    /// Validate the config and build the daemon.
    pub fn build(self) -> Result<HighlightDaemon, ConfigError> {
        let severities = self
            .severities
            .unwrap_or_else(|| Arc::new(SeverityRegistrar::new()));
        let passes = self.passes.unwrap_or_else(|| Arc::new(PassRegistrar::new()));
        let mut context = PassContext::from_config(&self.config, Arc::clone(&severities))?
            .with_divider(self.divider);
        let shared = Arc::new(Shared {
            dirty_scopes: DirtyScopeMap::new(Arc::clone(&passes)),
            in_flight: Mutex::new(HashMap::new()),
            model_lock: Arc::clone(&context.model_lock),
            policy: InterruptPolicy::new(),
        });
        context.model_lock = Arc::clone(&shared.model_lock);

        let weak = Arc::downgrade(&shared);
        severities.subscribe(move |change| {
            if let Some(shared) = weak.upgrade() {
                shared.restart(&format!("severities changed: {change:?}"));
            }
        });
        for registration in passes.runnable() {
            if let Some(visitors) = &registration.visitors {
                subscribe_visitors(&shared, visitors);
            }
        }

        Ok(HighlightDaemon {
            shared,
            sessions: BTreeMap::new(),
            views: BTreeMap::new(),
            next_document_id: 1,
            next_view_id: 1,
            passes,
            severities,
            provider: self.provider,
            problems: self
                .problems
                .unwrap_or_else(|| Arc::new(ProblemCollector::new())),
            context,
            config: self.config,
            dumb_mode: false,
        })
    }
}

fn subscribe_visitors(shared: &Arc<Shared>, visitors: &VisitorRegistry) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    visitors.subscribe(move |change| {
        if let Some(shared) = weak.upgrade() {
            shared.restart(&format!("visitors changed: {change:?}"));
        }
    });
}

/// Incremental highlighting daemon.
pub struct HighlightDaemon {
    shared: Arc<Shared>,
    sessions: BTreeMap<DocumentId, EditorSession>,
    views: BTreeMap<ViewId, DocumentId>,
    next_document_id: u64,
    next_view_id: u64,
    passes: Arc<PassRegistrar>,
    severities: Arc<SeverityRegistrar>,
    provider: Arc<dyn SyntaxProvider>,
    problems: Arc<dyn ProblemSink>,
    context: PassContext,
    config: DaemonConfig,
    dumb_mode: bool,
}

impl HighlightDaemon {
    /// Start building a daemon reading trees from `provider`.
    pub fn builder(provider: Arc<dyn SyntaxProvider>) -> DaemonBuilder {
        DaemonBuilder::new(provider)
    }

    /// A thread-safe handle.
    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Pass registrar.
    pub fn passes(&self) -> &Arc<PassRegistrar> {
        &self.passes
    }

    /// Severity registrar.
    pub fn severities(&self) -> &Arc<SeverityRegistrar> {
        &self.severities
    }

    /// Dirty-scope state of all documents.
    pub fn dirty_scopes(&self) -> &DirtyScopeMap {
        &self.shared.dirty_scopes
    }

    /// Policy governing cancellation of the daemon's passes.
    pub fn interrupt_policy(&self) -> &InterruptPolicy {
        &self.shared.policy
    }

    /// Register a pass kind. Its visitor registry is watched for changes.
    ///
    /// # Panics
    ///
    /// Panics if the pass id is already registered.
    pub fn register_pass(&self, registration: PassRegistration) {
        if let Some(visitors) = &registration.visitors {
            subscribe_visitors(&self.shared, visitors);
        }
        self.passes.register(registration);
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no document is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open a document with base language `language`. It starts with one view showing nothing.
    pub fn open_document(
        &mut self,
        text: &str,
        language: impl Into<String>,
        uri: Option<String>,
    ) -> OpenDocumentResult {
        let document = DocumentId(self.next_document_id);
        self.next_document_id += 1;
        let view = ViewId(self.next_view_id);
        self.next_view_id += 1;

        let mut views = BTreeMap::new();
        views.insert(view, TextRange::EMPTY);
        self.sessions.insert(
            document,
            EditorSession {
                document: Document::new(document, text),
                language: language.into(),
                uri,
                markup: MarkupModel::new(document),
                file_level: FileLevelAnnotations::new(),
                views,
            },
        );
        self.views.insert(view, document);
        tracing::debug!(document = document.get(), "document opened");
        OpenDocumentResult { document, view }
    }

    /// Close a document, its views, and drop every cached state about it.
    pub fn close_document(&mut self, document: DocumentId) -> Result<(), DaemonError> {
        let session = self
            .sessions
            .remove(&document)
            .ok_or(DaemonError::UnknownDocument(document))?;
        for view in session.views.keys() {
            self.views.remove(view);
        }
        self.shared.cancel(document);
        self.shared.in_flight.lock().remove(&document);
        self.shared.dirty_scopes.evict(document);
        self.provider.document_closed(document);
        self.problems.clear(document);
        tracing::debug!(document = document.get(), "document closed");
        Ok(())
    }

    /// Session of an open document.
    pub fn session(&self, document: DocumentId) -> Option<&EditorSession> {
        self.sessions.get(&document)
    }

    /// Open another view onto `document`.
    pub fn create_view(
        &mut self,
        document: DocumentId,
        visible: TextRange,
    ) -> Result<ViewId, DaemonError> {
        let session = self
            .sessions
            .get_mut(&document)
            .ok_or(DaemonError::UnknownDocument(document))?;
        let view = ViewId(self.next_view_id);
        self.next_view_id += 1;
        session.views.insert(view, visible);
        self.views.insert(view, document);
        Ok(view)
    }

    /// Close a view. The document stays open. Returns `false` for unknown views.
    pub fn close_view(&mut self, view: ViewId) -> bool {
        let Some(document) = self.views.remove(&view) else {
            return false;
        };
        if let Some(session) = self.sessions.get_mut(&document) {
            session.views.remove(&view);
        }
        true
    }

    /// Document shown by `view`.
    pub fn document_for_view(&self, view: ViewId) -> Option<DocumentId> {
        self.views.get(&view).copied()
    }

    /// Set the visible range of `view`. It becomes part of the priority range of later passes.
    pub fn set_visible_range(&mut self, view: ViewId, range: TextRange) -> Result<(), DaemonError> {
        let document = self
            .document_for_view(view)
            .ok_or(DaemonError::UnknownView(view))?;
        let session = self
            .sessions
            .get_mut(&document)
            .ok_or(DaemonError::UnknownDocument(document))?;
        session.views.insert(view, range);
        Ok(())
    }

    /// Hide or show hints for the document's URI. Returns `true` if the setting changed.
    pub fn set_hints_disabled(&mut self, document: DocumentId, disabled: bool) -> bool {
        let Some(uri) = self.sessions.get(&document).and_then(|s| s.uri.clone()) else {
            return false;
        };
        self.config.set_hints_disabled(uri, disabled)
    }

    /// Whether hints are hidden for the document.
    pub fn are_hints_disabled(&self, document: DocumentId) -> bool {
        self.sessions
            .get(&document)
            .and_then(|s| s.uri.as_deref())
            .is_some_and(|uri| self.config.are_hints_disabled(uri))
    }

    /// Enter or leave dumb mode. Leaving it makes every document dirty, since visitors that
    /// are not dumb-aware have not run.
    pub fn set_dumb_mode(&mut self, dumb: bool) {
        if self.dumb_mode && !dumb {
            self.shared.restart("dumb mode finished");
        }
        self.dumb_mode = dumb;
    }

    /// Whether dumb mode is on.
    pub fn is_dumb_mode(&self) -> bool {
        self.dumb_mode
    }

    /// Replace `range` of `document` with `text`.
    ///
    /// A range that does not fit the document is rejected before anything else happens.
    /// Otherwise the document is marked defensively dirty and its in-flight passes are canceled
    /// before the change; afterwards highlighters are shifted, the typing fast path runs, and the
    /// changed lines become dirty for every pass.
    pub fn apply_edit(
        &mut self,
        document: DocumentId,
        range: TextRange,
        text: &str,
    ) -> Result<DocumentEvent, DaemonError> {
        let session = self
            .sessions
            .get_mut(&document)
            .ok_or(DaemonError::UnknownDocument(document))?;
        session.document.check_range(range)?;
        self.shared.before_change(document);
        let event = {
            let _write = self.shared.model_lock.write();
            session.document.replace(range, text)?
        };

        session.markup.apply_edit(&event);
        update_highlighters_by_typing(&mut session.markup, &event);
        let changed = session.document.line_range_covering(event.new_range());
        self.shared.dirty_scopes.mark_file_scope_dirty(
            &session.document,
            changed,
            session.document.len(),
        );
        self.provider.document_changed(&event);
        Ok(event)
    }

    /// Current dirty scope of `pass` for `document`, `None` when up to date.
    ///
    /// # Panics
    ///
    /// Panics if `pass` is not registered.
    pub fn dirty_scope(
        &self,
        document: DocumentId,
        pass: PassId,
    ) -> Result<Option<TextRange>, DaemonError> {
        let session = self
            .sessions
            .get(&document)
            .ok_or(DaemonError::UnknownDocument(document))?;
        Ok(self
            .shared
            .dirty_scopes
            .get_file_dirty_scope(&session.document, pass))
    }

    /// Mark `range` of `document` dirty for every pass.
    pub fn mark_file_scope_dirty(
        &self,
        document: DocumentId,
        range: TextRange,
    ) -> Result<(), DaemonError> {
        let session = self
            .sessions
            .get(&document)
            .ok_or(DaemonError::UnknownDocument(document))?;
        self.shared.dirty_scopes.mark_file_scope_dirty(
            &session.document,
            range,
            session.document.len(),
        );
        Ok(())
    }

    /// Cancel everything and make every document whole-file dirty.
    ///
    /// # Panics
    ///
    /// Panics if dirt is currently forbidden.
    pub fn mark_all_files_dirty(&self, reason: &str) {
        self.shared.restart(reason);
    }

    /// Returns `true` once every pass of `document` is up to date and problems were reported.
    pub fn is_settled(&self, document: DocumentId) -> bool {
        self.shared.dirty_scopes.all_dirty_scopes_are_null(document)
    }

    /// The most severe record at `offset` of `document`.
    pub fn find_highlight_by_offset(
        &self,
        document: DocumentId,
        offset: usize,
        include_fix_range: bool,
        min_severity: Option<&Severity>,
    ) -> Option<Arc<HighlightRecord>> {
        let session = self.sessions.get(&document)?;
        find_highlight_by_offset(
            &session.markup,
            &self.severities,
            offset,
            include_fix_range,
            min_severity,
        )
    }

    /// Run every dirty pass of `document` (except `passes_to_ignore`) to completion and return
    /// the materialized records.
    ///
    /// Inconsistent results restart the cycle after a random delay of up to
    /// `restart_jitter_ms`, at most `max_inconsistency_restarts` times; after that the run
    /// reports [`AnalysisError::Canceled`]. A canceled run leaves the dirty scopes of the
    /// canceled passes untouched.
    ///
    /// # Panics
    ///
    /// Panics if `can_change_document` is `false` and the document changed during the run.
    pub fn run_passes(
        &mut self,
        document: DocumentId,
        passes_to_ignore: &[PassId],
        can_change_document: bool,
    ) -> Result<Vec<Arc<HighlightRecord>>, AnalysisError> {
        let stamp = self
            .sessions
            .get(&document)
            .ok_or(AnalysisError::UnknownDocument(document))?
            .document
            .stamp();

        let mut restarts = 0;
        loop {
            match self.run_cycle(document, passes_to_ignore) {
                Ok(()) => break,
                Err(AnalysisError::Inconsistent(reason)) => {
                    if restarts >= self.config.max_inconsistency_restarts {
                        tracing::warn!(
                            document = document.get(),
                            restarts,
                            %reason,
                            "giving up after repeated inconsistent results"
                        );
                        return Err(AnalysisError::Canceled);
                    }
                    restarts += 1;
                    let delay = rand::thread_rng().gen_range(0..=self.config.restart_jitter_ms);
                    tracing::debug!(
                        document = document.get(),
                        restarts,
                        delay_ms = delay,
                        %reason,
                        "inconsistent results, restarting"
                    );
                    thread::sleep(Duration::from_millis(delay));
                }
                Err(err) => return Err(err),
            }
        }

        let session = self
            .sessions
            .get(&document)
            .ok_or(AnalysisError::UnknownDocument(document))?;
        assert!(
            can_change_document || session.document.stamp() == stamp,
            "document {document:?} changed during highlighting"
        );
        Ok(session.highlights())
    }

    fn run_cycle(
        &mut self,
        document: DocumentId,
        passes_to_ignore: &[PassId],
    ) -> Result<(), AnalysisError> {
        let (gated, first): (Vec<_>, Vec<_>) = self
            .passes
            .runnable()
            .into_iter()
            .filter(|r| !passes_to_ignore.contains(&r.id))
            .partition(|r| r.skip_when_errors);

        self.run_wave(document, &first)?;
        if !gated.is_empty() {
            if self.config.skip_external_tools_on_error
                && self.shared.dirty_scopes.was_error_found(document)
            {
                tracing::debug!(
                    document = document.get(),
                    skipped = gated.len(),
                    "errors found, skipping passes gated on a clean file"
                );
            } else {
                self.run_wave(document, &gated)?;
            }
        }

        let session = self
            .sessions
            .get(&document)
            .ok_or(AnalysisError::UnknownDocument(document))?;
        let dirty_scopes = &self.shared.dirty_scopes;
        let reported = self
            .passes
            .runnable()
            .iter()
            .filter(|r| r.report_problems)
            .all(|r| dirty_scopes.get_file_dirty_scope(&session.document, r.id).is_none());
        if reported {
            dirty_scopes.mark_file_up_to_date(document, PassId::WOLF);
        }
        Ok(())
    }

    fn run_wave(
        &mut self,
        document: DocumentId,
        registrations: &[Arc<PassRegistration>],
    ) -> Result<(), AnalysisError> {
        let session = self
            .sessions
            .get_mut(&document)
            .ok_or(AnalysisError::UnknownDocument(document))?;
        let snapshot = session.document.snapshot();
        let priority = session.priority_range();

        let mut passes = Vec::new();
        let mut tokens = Vec::new();
        for registration in registrations {
            let Some(restrict) = self
                .shared
                .dirty_scopes
                .get_file_dirty_scope(&session.document, registration.id)
            else {
                tracing::trace!(pass = %registration.name, "up to date");
                continue;
            };
            let token = ProgressToken::with_policy(&self.shared.policy);
            passes.push(GeneralHighlightingPass::new(
                Arc::clone(registration),
                snapshot.clone(),
                session.language.clone(),
                restrict,
                priority,
                token.clone(),
            ));
            tokens.push(token);
        }
        if passes.is_empty() {
            return Ok(());
        }

        let view = {
            let Some(_read) = self.shared.model_lock.try_read() else {
                return Err(AnalysisError::WritePending);
            };
            self.provider.file_view(&snapshot, &session.language)?
        };

        let mut context = self.context.clone();
        context.dumb_mode = self.dumb_mode;
        self.shared.register_tokens(document, &tokens);
        let mut writer = Writer {
            session,
            dirty_scopes: &self.shared.dirty_scopes,
            problems: self.problems.as_ref(),
            severities: &self.severities,
            policy: &self.shared.policy,
            tokens: &tokens,
            pending: HashMap::new(),
            published: HashMap::new(),
            stats: ReconcileStats::default(),
            outcome: Ok(()),
        };
        drive(&mut writer, passes, &view, &context);
        let Writer { stats, outcome, .. } = writer;
        self.shared.unregister_tokens(document, &tokens);

        tracing::debug!(
            document = document.get(),
            created = stats.created,
            reused = stats.reused,
            disposed = stats.disposed,
            suppressed = stats.suppressed,
            ok = outcome.is_ok(),
            "highlighting wave finished"
        );
        outcome
    }
}

impl std::fmt::Debug for HighlightDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightDaemon")
            .field("documents", &self.sessions.keys().collect::<Vec<_>>())
            .field("passes", &self.passes)
            .field("dumb_mode", &self.dumb_mode)
            .finish_non_exhaustive()
    }
}

/// Spawn one collector per pass and let `writer` consume their messages on this thread.
fn drive(
    writer: &mut Writer<'_>,
    passes: Vec<GeneralHighlightingPass>,
    view: &FileView,
    context: &PassContext,
) {
    let (tx, rx) = crossbeam_channel::bounded(TRANSFER_QUEUE_CAPACITY);
    thread::scope(|scope| {
        for mut pass in passes {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = pass.collect_information(view, context, &tx);
                // The receiver outlives every worker of the scope.
                let _ = tx.send(PassMessage::Finished {
                    pass: Box::new(pass),
                    result,
                });
            });
        }
        drop(tx);
        for message in rx.iter() {
            writer.handle(message);
        }
    });
}

/// Single-writer side of a wave.
struct Writer<'a> {
    session: &'a mut EditorSession,
    dirty_scopes: &'a DirtyScopeMap,
    problems: &'a dyn ProblemSink,
    severities: &'a SeverityRegistrar,
    policy: &'a InterruptPolicy,
    tokens: &'a [ProgressToken],
    pending: HashMap<PassId, Vec<Arc<HighlightRecord>>>,
    /// Highlighters added for the priority range of passes that did not finish yet.
    published: HashMap<PassId, Vec<Arc<RangeHighlighter>>>,
    stats: ReconcileStats,
    outcome: Result<(), AnalysisError>,
}

impl Writer<'_> {
    fn handle(&mut self, message: PassMessage) {
        match message {
            PassMessage::Records { pass, records } => {
                if self.outcome.is_ok() {
                    self.pending.entry(pass).or_default().extend(records);
                }
            }
            PassMessage::InsideProduced { pass, range } => {
                if self.outcome.is_ok() {
                    self.publish(pass, range);
                }
            }
            PassMessage::Finished { mut pass, result } => {
                let records = self.pending.remove(&pass.id()).unwrap_or_default();
                let published = self.published.remove(&pass.id()).unwrap_or_default();
                match result {
                    Ok(()) if self.outcome.is_ok() => {
                        self.reconcile(&records, pass.restrict(), pass.id());
                        pass.apply_information(self.dirty_scopes, self.problems, &self.session.markup);
                    }
                    Ok(()) => {
                        tracing::trace!(pass = ?pass.id(), "results discarded");
                        self.retract(published);
                    }
                    Err(err) => {
                        self.retract(published);
                        if matches!(err, AnalysisError::Inconsistent(_)) && !self.policy.is_forbidden()
                        {
                            for token in self.tokens {
                                token.cancel();
                            }
                        }
                        if self.outcome.is_ok() {
                            self.outcome = Err(err);
                        }
                    }
                }
            }
        }
    }

    fn reconcile(&mut self, records: &[Arc<HighlightRecord>], range: TextRange, group: PassId) {
        let session = &mut *self.session;
        let stats = HighlighterReconciler::new(
            &session.document,
            &mut session.markup,
            &mut session.file_level,
            self.severities,
        )
        .set_highlights_in_range(records, range, group);
        self.stats += stats;
    }

    /// Show what `pass` produced for `range` so far, leaving every existing highlighter alone.
    fn publish(&mut self, pass: PassId, range: TextRange) {
        let records = self.pending.get(&pass).map(Vec::as_slice).unwrap_or_default();
        let session = &mut *self.session;
        let created = self.published.entry(pass).or_default();
        let stats = HighlighterReconciler::new(
            &session.document,
            &mut session.markup,
            &mut session.file_level,
            self.severities,
        )
        .publish_highlights_in_range(records, range, pass, created);
        self.stats += stats;
    }

    /// Dispose the early highlighters of a pass whose results are not applied.
    fn retract(&mut self, published: Vec<Arc<RangeHighlighter>>) {
        let mut retracted = 0;
        for highlighter in &published {
            if self.session.markup.remove_highlighter(highlighter) {
                retracted += 1;
            }
        }
        if retracted > 0 {
            tracing::trace!(retracted, "early highlighters taken back");
            self.stats.disposed += retracted;
        }
    }
}
