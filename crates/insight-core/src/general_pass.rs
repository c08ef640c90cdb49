//! The general highlighting pass.
//!
//! One [`GeneralHighlightingPass`] re-analyzes the dirty scope of one document for one pass id.
//! Collection runs on a worker thread against an immutable [`DocumentSnapshot`] and never touches
//! the live document: records travel to the single writer as [`PassMessage`]s over a bounded
//! channel, in batches of at most [`PassContext::transfer_batch_size`].
//!
//! Elements inside the priority range are visited first and announced with
//! [`PassMessage::InsideProduced`] before the rest of the file is visited, so the visible part of
//! the editor is updated independently of the size of the file.
//!
//! ```text
//! Created ──collect──▶ Collecting ──ok──▶ Applying ──apply──▶ Finished
//!                          │
//!                          └──canceled / failed──▶ Canceled
//! ```

use crate::config::{ConfigError, DaemonConfig};
use crate::divider::{DividedElements, Divider};
use crate::document::DocumentSnapshot;
use crate::dirty_scope::DirtyScopeMap;
use crate::error::{AnalysisError, VisitError};
use crate::highlight_record::HighlightRecord;
use crate::markup::{HighlighterLayer, MarkupModel};
use crate::pass::{PassId, PassRegistration};
use crate::problems::{Problem, ProblemSink, ReportMode};
use crate::progress::{ChunkedProgress, ProgressToken};
use crate::severity::{Severity, SeverityRegistrar};
use crate::syntax::{Element, FileView, NodeId, SyntaxTree};
use crate::text_range::TextRange;
use crate::todo::{TodoScan, TodoScanner};
use crate::visitor::{FileContext, HighlightSink, VisitorInstance, VisitorRegistry};
use crossbeam_channel::Sender;
use insight_core_lang::LanguageRegistry;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Bytes of text per unit of the initial progress estimate.
const INITIAL_BYTES_PER_UNIT: usize = 64;

/// Lifecycle state of a pass invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Constructed, nothing collected yet.
    Created,
    /// Visitors are running.
    Collecting,
    /// Collection succeeded; waiting for the writer to apply.
    Applying,
    /// Applied; the pass is up to date.
    Finished,
    /// Collection was canceled or failed. Nothing is applied.
    Canceled,
}

/// Message from a collecting pass to the single writer.
#[derive(Debug)]
pub enum PassMessage {
    /// A batch of records, in production order.
    Records {
        /// Producing pass.
        pass: PassId,
        /// Records.
        records: Vec<Arc<HighlightRecord>>,
    },
    /// Every record inside the priority range was sent. `range` is the part of the priority
    /// range that was re-analyzed.
    InsideProduced {
        /// Producing pass.
        pass: PassId,
        /// Re-analyzed part of the priority range.
        range: TextRange,
    },
    /// Collection ended. The writer applies the pass only if `result` is `Ok`.
    Finished {
        /// The pass, handed back to the writer.
        pass: Box<GeneralHighlightingPass>,
        /// Outcome of the collection.
        result: Result<(), AnalysisError>,
    },
}

/// Shared, read-only collaborators of a pass.
#[derive(Clone)]
pub struct PassContext {
    /// Severity order.
    pub severities: Arc<SeverityRegistrar>,
    /// Language settings.
    pub languages: Arc<LanguageRegistry>,
    /// Element divider.
    pub divider: Divider,
    /// TODO scanner.
    pub todo: Arc<TodoScanner>,
    /// Read side of the syntax model. Collection fails fast when a writer holds or awaits it.
    pub model_lock: Arc<RwLock<()>>,
    /// Maximum records per [`PassMessage::Records`].
    pub transfer_batch_size: usize,
    /// Progress chunk size in percent of the element count.
    pub progress_chunk_percent: u8,
    /// Skip the parents of elements that produced an ERROR record.
    pub suppress_parents_on_error: bool,
    /// Indexes are unavailable: only dumb-aware visitors run and TODO scanning is skipped.
    pub dumb_mode: bool,
}

impl PassContext {
    /// Context for `config`.
    pub fn from_config(
        config: &DaemonConfig,
        severities: Arc<SeverityRegistrar>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            severities,
            languages: Arc::new(config.language_registry()),
            divider: Divider::new(),
            todo: Arc::new(TodoScanner::new(&config.todo_patterns)?),
            model_lock: Arc::new(RwLock::new(())),
            transfer_batch_size: config.transfer_batch_size,
            progress_chunk_percent: config.progress_chunk_percent,
            suppress_parents_on_error: config.suppress_parents_on_error,
            dumb_mode: false,
        })
    }

    /// Replace the divider.
    pub fn with_divider(mut self, divider: Divider) -> Self {
        self.divider = divider;
        self
    }
}

impl std::fmt::Debug for PassContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassContext")
            .field("divider", &self.divider)
            .field("transfer_batch_size", &self.transfer_batch_size)
            .field("progress_chunk_percent", &self.progress_chunk_percent)
            .field("suppress_parents_on_error", &self.suppress_parents_on_error)
            .field("dumb_mode", &self.dumb_mode)
            .finish_non_exhaustive()
    }
}

/// One invocation of a registered pass over one document.
#[derive(Debug)]
pub struct GeneralHighlightingPass {
    registration: Arc<PassRegistration>,
    visitors: Arc<VisitorRegistry>,
    snapshot: DocumentSnapshot,
    language: String,
    restrict: TextRange,
    priority: TextRange,
    token: ProgressToken,
    state: PassState,
    problems: Vec<Problem>,
    failed_visitors: Vec<String>,
    produced: usize,
}

impl GeneralHighlightingPass {
    /// Create a pass re-analyzing `restrict` of `snapshot`, whose base language is `language`.
    ///
    /// Sets an initial progress estimate proportional to the document length.
    ///
    /// # Panics
    ///
    /// Panics if `registration` is a synthetic pass.
    pub fn new(
        registration: Arc<PassRegistration>,
        snapshot: DocumentSnapshot,
        language: impl Into<String>,
        restrict: TextRange,
        priority: TextRange,
        token: ProgressToken,
    ) -> Self {
        let Some(visitors) = registration.visitors.clone() else {
            panic!("synthetic pass {:?} cannot be scheduled", registration.id);
        };
        let len = snapshot.len();
        token.set_limit((len / INITIAL_BYTES_PER_UNIT).max(1));
        Self {
            registration,
            visitors,
            restrict: restrict.clamp_to(len),
            priority: priority.clamp_to(len),
            snapshot,
            language: language.into(),
            token,
            state: PassState::Created,
            problems: Vec::new(),
            failed_visitors: Vec::new(),
            produced: 0,
        }
    }

    /// Pass id.
    pub fn id(&self) -> PassId {
        self.registration.id
    }

    /// Registration this pass was created from.
    pub fn registration(&self) -> &Arc<PassRegistration> {
        &self.registration
    }

    /// Current state.
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Re-analyzed range.
    pub fn restrict(&self) -> TextRange {
        self.restrict
    }

    /// Priority (visible) range.
    pub fn priority(&self) -> TextRange {
        self.priority
    }

    /// Returns `true` if the pass re-analyzes the whole document.
    pub fn is_whole_file(&self) -> bool {
        self.restrict == TextRange::whole(self.snapshot.len())
    }

    /// Snapshot being analyzed.
    pub fn snapshot(&self) -> &DocumentSnapshot {
        &self.snapshot
    }

    /// Cancellation token.
    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Number of records sent to the writer.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Problems found within the re-analyzed range.
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Names of the visitors that failed at least once.
    pub fn failed_visitors(&self) -> &[String] {
        &self.failed_visitors
    }

    /// Run every visitor over the divided elements of `view`, sending results through `tx`.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn collect_information(
        &mut self,
        view: &FileView,
        ctx: &PassContext,
        tx: &Sender<PassMessage>,
    ) -> Result<(), AnalysisError> {
        assert_eq!(
            self.state,
            PassState::Created,
            "pass {:?} collected twice",
            self.id()
        );
        self.state = PassState::Collecting;
        tracing::trace!(
            pass = %self.registration.name,
            document = self.snapshot.id().get(),
            restrict = %self.restrict,
            priority = %self.priority,
            "collecting"
        );
        let result = self.collect(view, ctx, tx);
        self.state = match &result {
            Ok(()) => PassState::Applying,
            Err(err) => {
                tracing::trace!(pass = %self.registration.name, %err, "collection stopped");
                PassState::Canceled
            }
        };
        result
    }

    /// Apply a successful collection. Must run on the writer after the pass's records were
    /// reconciled into `markup`.
    ///
    /// Marks the pass up to date, refreshes the document's error flag from `markup`, and
    /// reports problems when the pass is registered to do so.
    ///
    /// # Panics
    ///
    /// Panics unless the collection succeeded and the pass was not applied yet.
    pub fn apply_information(
        &mut self,
        dirty_scopes: &DirtyScopeMap,
        problems: &dyn ProblemSink,
        markup: &MarkupModel,
    ) {
        assert_eq!(
            self.state,
            PassState::Applying,
            "pass {:?} applied without a successful collection",
            self.id()
        );
        let document = self.snapshot.id();
        dirty_scopes.mark_file_up_to_date(document, self.id());
        if self.registration.report_problems {
            let error_found = markup
                .all_highlighters()
                .iter()
                .any(|h| h.layer() == HighlighterLayer::ERROR);
            dirty_scopes.set_error_found(document, error_found);
            let mode = if self.is_whole_file() {
                ReportMode::ReplaceAll
            } else {
                ReportMode::Merge {
                    range: self.restrict,
                }
            };
            problems.report(document, std::mem::take(&mut self.problems), mode);
        }
        self.state = PassState::Finished;
        tracing::trace!(pass = %self.registration.name, produced = self.produced, "applied");
    }

    fn collect(
        &mut self,
        view: &FileView,
        ctx: &PassContext,
        tx: &Sender<PassMessage>,
    ) -> Result<(), AnalysisError> {
        let Some(_read) = ctx.model_lock.try_read() else {
            return Err(AnalysisError::WritePending);
        };
        self.token.check_canceled()?;

        if let Some(base) = view.roots.first() {
            let tree_len = base.tree.text_range(base.tree.root()).end();
            if tree_len != self.snapshot.len() {
                return Err(AnalysisError::Inconsistent(format!(
                    "{} tree covers {tree_len} bytes, document has {}",
                    base.language,
                    self.snapshot.len()
                )));
            }
        }

        let divided = ctx.divider.divide(
            view,
            self.restrict,
            self.priority,
            !self.is_whole_file(),
            |root| ctx.languages.is_enabled(&root.language),
        );
        let total = divided.iter().map(DividedElements::len).sum();
        self.token.set_limit(total);

        let todo = self.scan_todo(ctx)?;

        let token = self.token.clone();
        let snapshot = self.snapshot.clone();
        let mut collector = Collector {
            pass: self.id(),
            restrict: self.restrict,
            snapshot: &snapshot,
            severities: &ctx.severities,
            publisher: Publisher::new(self.id(), tx, ctx.transfer_batch_size),
            progress: ChunkedProgress::new(&token, total, ctx.progress_chunk_percent),
            by_range: HashMap::new(),
            failed: Vec::new(),
            problems: Vec::new(),
        };

        let mut runs = Vec::with_capacity(divided.len());
        for elements in divided {
            let root = &view.roots[elements.root_index];
            let file = FileContext {
                snapshot: &snapshot,
                language: &root.language,
                restrict: self.restrict,
                priority: self.priority,
                dumb_mode: ctx.dumb_mode,
            };
            let mut visitors = self.visitors.instantiate(&file);
            for instance in &mut visitors {
                instance.visitor.begin(&file);
            }
            let suppress = ctx.suppress_parents_on_error
                && !ctx.languages.highlight_parents_on_error(&root.language);
            runs.push(RootRun {
                tree: root.tree.as_ref(),
                elements,
                visitors,
                skip_parents: suppress.then(HashSet::new),
            });
        }

        for run in &mut runs {
            collector.visit_all(
                run.tree,
                &run.elements.inside,
                &mut run.visitors,
                &mut run.skip_parents,
            )?;
        }
        for record in todo.inside {
            collector.publish_unchecked(record)?;
        }
        token.check_canceled()?;
        if let Some(range) = self
            .priority
            .intersection(self.restrict)
            .filter(|r| !r.is_empty())
        {
            collector.publisher.inside_produced(range)?;
        }

        for run in &mut runs {
            collector.visit_all(
                run.tree,
                &run.elements.outside,
                &mut run.visitors,
                &mut run.skip_parents,
            )?;
        }
        for record in todo.outside {
            collector.publish_unchecked(record)?;
        }

        for run in &mut runs {
            for instance in &mut run.visitors {
                if !instance.visitor.finish() {
                    return Err(AnalysisError::Inconsistent(format!(
                        "visitor '{}' reported inconsistent results",
                        instance.registration.name
                    )));
                }
            }
        }
        token.check_canceled()?;
        collector.publisher.flush()?;
        collector.progress.flush();

        self.produced = collector.publisher.sent;
        self.problems = collector.problems;
        self.failed_visitors = collector.failed;
        Ok(())
    }

    fn scan_todo(&self, ctx: &PassContext) -> Result<TodoScan, AnalysisError> {
        if !self.registration.scan_todo || ctx.dumb_mode {
            return Ok(TodoScan::default());
        }
        let Some(comments) = ctx.languages.comments(&self.language) else {
            return Ok(TodoScan::default());
        };
        Ok(ctx
            .todo
            .scan(&self.snapshot, comments, self.restrict, self.priority)?)
    }
}

struct RootRun<'v> {
    tree: &'v dyn SyntaxTree,
    elements: DividedElements,
    visitors: Vec<VisitorInstance>,
    skip_parents: Option<HashSet<NodeId>>,
}

/// Batches records into [`PassMessage::Records`].
struct Publisher<'a> {
    pass: PassId,
    tx: &'a Sender<PassMessage>,
    batch: Vec<Arc<HighlightRecord>>,
    batch_size: usize,
    sent: usize,
}

impl<'a> Publisher<'a> {
    fn new(pass: PassId, tx: &'a Sender<PassMessage>, batch_size: usize) -> Self {
        Self {
            pass,
            tx,
            batch: Vec::new(),
            batch_size: batch_size.max(1),
            sent: 0,
        }
    }

    fn push(&mut self, record: Arc<HighlightRecord>) -> Result<(), AnalysisError> {
        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AnalysisError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.batch);
        self.sent += records.len();
        self.send(PassMessage::Records {
            pass: self.pass,
            records,
        })
    }

    fn inside_produced(&mut self, range: TextRange) -> Result<(), AnalysisError> {
        self.flush()?;
        self.send(PassMessage::InsideProduced {
            pass: self.pass,
            range,
        })
    }

    // The writer only hangs up after giving up on the run.
    fn send(&self, message: PassMessage) -> Result<(), AnalysisError> {
        self.tx.send(message).map_err(|_| AnalysisError::Canceled)
    }
}

/// Per-invocation visiting state.
struct Collector<'a> {
    pass: PassId,
    restrict: TextRange,
    snapshot: &'a DocumentSnapshot,
    severities: &'a SeverityRegistrar,
    publisher: Publisher<'a>,
    progress: ChunkedProgress<'a>,
    by_range: HashMap<TextRange, Vec<Arc<HighlightRecord>>>,
    failed: Vec<String>,
    problems: Vec<Problem>,
}

impl Collector<'_> {
    /// Visit `elements` (children first) with every visitor.
    fn visit_all(
        &mut self,
        tree: &dyn SyntaxTree,
        elements: &[NodeId],
        visitors: &mut [VisitorInstance],
        skip_parents: &mut Option<HashSet<NodeId>>,
    ) -> Result<(), AnalysisError> {
        for &node in elements {
            self.progress.tick()?;
            if let Some(skip) = skip_parents.as_mut()
                && skip.contains(&node)
            {
                if let Some(parent) = tree.parent(node) {
                    skip.insert(parent);
                }
                continue;
            }

            let element = Element::new(tree, self.snapshot, node);
            let mut sink = HighlightSink::new(self.pass);
            for instance in visitors.iter_mut() {
                self.visit_one(instance, element, &mut sink)?;
            }

            let records: Vec<HighlightRecord> = sink.drain().collect();
            let mut has_error = false;
            for record in records {
                has_error |= self.severities.is_at_least(record.severity(), &Severity::ERROR);
                self.publish(record, element.range())?;
            }
            if has_error
                && let (Some(skip), Some(parent)) = (skip_parents.as_mut(), tree.parent(node))
            {
                skip.insert(parent);
            }
        }
        Ok(())
    }

    fn visit_one(
        &mut self,
        instance: &mut VisitorInstance,
        element: Element<'_>,
        sink: &mut HighlightSink,
    ) -> Result<(), AnalysisError> {
        let before = sink.len();
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| instance.visitor.visit(element, sink)));
        let message = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(VisitError::Canceled)) => return Err(AnalysisError::Canceled),
            Ok(Err(VisitError::Failed(message))) => message,
            Err(payload) => panic_message(payload.as_ref()),
        };
        sink.truncate(before);

        let name = &instance.registration.name;
        if !self.failed.contains(name) {
            tracing::warn!(
                pass = ?self.pass,
                visitor = %name,
                element = %element.range(),
                %message,
                "highlight visitor failed; skipping its results for this element"
            );
            self.failed.push(name.clone());
        }
        Ok(())
    }

    /// Publish a visitor record, merging it into an identical record already produced for
    /// the same range by a nested element.
    fn publish(
        &mut self,
        record: HighlightRecord,
        element_range: TextRange,
    ) -> Result<(), AnalysisError> {
        if record.is_bijective() || record.range() == element_range {
            let duplicate = self
                .by_range
                .get(&record.range())
                .is_some_and(|known| known.iter().any(|r| r.same_highlight(&record)));
            if duplicate {
                return Ok(());
            }
        }
        let record = Arc::new(record);
        if self.severities.is_at_least(record.severity(), &Severity::ERROR)
            && self.restrict.contains_range(record.range())
        {
            self.problems.push(Problem::from_record(self.pass, &record));
        }
        self.by_range
            .entry(record.range())
            .or_default()
            .push(Arc::clone(&record));
        self.publisher.push(record)
    }

    fn publish_unchecked(&mut self, record: HighlightRecord) -> Result<(), AnalysisError> {
        self.publisher.push(Arc::new(record.in_group(self.pass)))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "visitor panicked".to_string()
    }
}
