//! Per-document, per-pass dirty-region tracking.
//!
//! Every open document has a [`FileStatus`] that records, for each registered pass kind, which
//! part of the file still has to be re-analyzed:
//!
//! - `None`: the pass is up to date;
//! - [`DirtyScope::WholeFile`]: everything must be redone;
//! - [`DirtyScope::Range`]: only the text under a [`RangeMarker`] is dirty. The marker follows
//!   later edits, so the scope stays correct while the user keeps typing.
//!
//! A document without a status is implicitly dirty everywhere. All statuses of one map share a
//! single lock; critical sections are proportional to the number of registered passes.

use crate::document::{Document, DocumentId, RangeMarker};
use crate::pass::{PassId, PassRegistrar};
use crate::text_range::TextRange;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Dirty region of one pass.
#[derive(Debug, Clone)]
pub enum DirtyScope {
    /// Everything is dirty. Never narrowed by later marks.
    WholeFile,
    /// Only the marked text is dirty.
    Range(RangeMarker),
}

impl DirtyScope {
    fn resolve(&self, len: usize) -> TextRange {
        match self {
            DirtyScope::WholeFile => TextRange::whole(len),
            // A marker that lost track of its text is treated as whole-file dirty.
            DirtyScope::Range(marker) => marker
                .valid_range()
                .map(|r| r.clamp_to(len))
                .unwrap_or_else(|| TextRange::whole(len)),
        }
    }
}

/// Dirty state of one document.
#[derive(Debug, Clone, Default)]
pub struct FileStatus {
    dirty_scopes: HashMap<PassId, Option<DirtyScope>>,
    defensively_marked: bool,
    wolf_pass_finished: bool,
    error_found: bool,
}

impl FileStatus {
    fn new(passes: &[PassId]) -> Self {
        Self {
            dirty_scopes: passes
                .iter()
                .map(|id| (*id, Some(DirtyScope::WholeFile)))
                .collect(),
            defensively_marked: false,
            wolf_pass_finished: false,
            error_found: false,
        }
    }

    /// Whether the document was marked dirty before the extent of a change was known.
    pub fn is_defensively_marked(&self) -> bool {
        self.defensively_marked
    }

    /// Whether the problem-reporting pass completed.
    pub fn is_wolf_pass_finished(&self) -> bool {
        self.wolf_pass_finished
    }

    /// Sticky "last full run found an error" flag.
    pub fn is_error_found(&self) -> bool {
        self.error_found
    }

    /// Raw scope of one pass. Passes registered after the status was created are whole-file
    /// dirty.
    pub fn scope(&self, pass: PassId) -> Option<DirtyScope> {
        self.dirty_scopes
            .get(&pass)
            .cloned()
            .unwrap_or(Some(DirtyScope::WholeFile))
    }

    fn mark_all_whole_file(&mut self) {
        for scope in self.dirty_scopes.values_mut() {
            *scope = Some(DirtyScope::WholeFile);
        }
    }
}

struct Inner {
    statuses: HashMap<DocumentId, FileStatus>,
    allow_dirt: bool,
}

/// Dirty-scope tracking for all open documents.
pub struct DirtyScopeMap {
    registrar: Arc<PassRegistrar>,
    inner: Mutex<Inner>,
}

impl DirtyScopeMap {
    /// Create a map tracking the passes of `registrar`.
    pub fn new(registrar: Arc<PassRegistrar>) -> Self {
        Self {
            registrar,
            inner: Mutex::new(Inner {
                statuses: HashMap::new(),
                allow_dirt: true,
            }),
        }
    }

    /// Pass registrar this map validates ids against.
    pub fn registrar(&self) -> &Arc<PassRegistrar> {
        &self.registrar
    }

    /// Allow or forbid creating new dirt.
    ///
    /// Tests that assert "highlighting is settled" forbid dirt so that any accidental
    /// invalidation fails fast.
    pub fn set_dirt_allowed(&self, allowed: bool) {
        self.inner.lock().allow_dirt = allowed;
    }

    /// Returns `true` unless dirt is currently forbidden.
    pub fn is_dirt_allowed(&self) -> bool {
        self.inner.lock().allow_dirt
    }

    /// Forget every per-document state; all documents become whole-file dirty.
    ///
    /// # Panics
    ///
    /// Panics if dirt is currently forbidden.
    pub fn mark_all_files_dirty(&self, reason: &str) {
        let mut inner = self.inner.lock();
        assert!(
            inner.allow_dirt,
            "mark_all_files_dirty while modifications are forbidden: {reason}"
        );
        tracing::debug!(reason, "marking all files dirty");
        inner.statuses.clear();
    }

    /// Union `scope` into every pass's dirty scope of `document`.
    ///
    /// `file_length` is the current document length; unions reaching past it are clamped. A
    /// union covering `[0, file_length)` collapses to [`DirtyScope::WholeFile`]. Documents without
    /// a status are already dirty everywhere, so this is a no-op for them.
    ///
    /// # Panics
    ///
    /// Panics if dirt is currently forbidden.
    pub fn mark_file_scope_dirty(&self, document: &Document, scope: TextRange, file_length: usize) {
        let mut inner = self.inner.lock();
        assert!(
            inner.allow_dirt,
            "mark_file_scope_dirty while modifications are forbidden"
        );
        let Some(status) = inner.statuses.get_mut(&document.id()) else {
            return;
        };
        status.defensively_marked = false;
        let scope = scope.clamp_to(file_length);
        for id in self.registrar.tracked_ids() {
            let old = status.scope(id);
            let combined = combine_scopes(old, scope, file_length, document);
            status.dirty_scopes.insert(id, Some(combined));
        }
        // Every tracked scope is non-null now, so the problem report is stale too.
        status.wolf_pass_finished = false;
    }

    /// Mark `document` as possibly dirty before the extent of a change is known.
    ///
    /// The next [`Self::get_file_dirty_scope`] escalates to whole-file dirty unless a precise
    /// [`Self::mark_file_scope_dirty`] arrives first.
    pub fn mark_file_scope_dirty_defensively(&self, document: DocumentId) {
        if let Some(status) = self.inner.lock().statuses.get_mut(&document) {
            status.defensively_marked = true;
        }
    }

    /// Mark one pass as up to date for `document`.
    ///
    /// # Panics
    ///
    /// Panics if `pass` is not registered.
    pub fn mark_file_up_to_date(&self, document: DocumentId, pass: PassId) {
        self.assert_registered(pass);
        let tracked = self.registrar.tracked_ids();
        let mut inner = self.inner.lock();
        let status = inner
            .statuses
            .entry(document)
            .or_insert_with(|| FileStatus::new(&tracked));
        status.defensively_marked = false;
        if pass == PassId::WOLF {
            status.wolf_pass_finished = true;
        }
        status.dirty_scopes.insert(pass, None);
    }

    /// Current dirty scope of `pass`, or `None` when the pass is up to date.
    ///
    /// # Panics
    ///
    /// Panics if `pass` is not registered.
    pub fn get_file_dirty_scope(&self, document: &Document, pass: PassId) -> Option<TextRange> {
        self.assert_registered(pass);
        let len = document.len();
        let mut inner = self.inner.lock();
        let Some(status) = inner.statuses.get_mut(&document.id()) else {
            return Some(TextRange::whole(len));
        };
        if status.defensively_marked {
            status.mark_all_whole_file();
            status.defensively_marked = false;
        }
        status.scope(pass).map(|scope| scope.resolve(len))
    }

    /// `true` only if the document is settled: not defensively marked, the problem report is
    /// current, and every tracked pass is up to date.
    pub fn all_dirty_scopes_are_null(&self, document: DocumentId) -> bool {
        let tracked = self.registrar.tracked_ids();
        let inner = self.inner.lock();
        let Some(status) = inner.statuses.get(&document) else {
            return false;
        };
        !status.defensively_marked
            && status.wolf_pass_finished
            && tracked.iter().all(|id| status.scope(*id).is_none())
    }

    /// Record whether the last full run found an error.
    pub fn set_error_found(&self, document: DocumentId, error_found: bool) {
        let tracked = self.registrar.tracked_ids();
        let mut inner = self.inner.lock();
        inner
            .statuses
            .entry(document)
            .or_insert_with(|| FileStatus::new(&tracked))
            .error_found = error_found;
    }

    /// Sticky "last full run found an error" flag.
    pub fn was_error_found(&self, document: DocumentId) -> bool {
        self.inner
            .lock()
            .statuses
            .get(&document)
            .is_some_and(|s| s.error_found)
    }

    /// Copy of the status of `document`, if one exists.
    pub fn status(&self, document: DocumentId) -> Option<FileStatus> {
        self.inner.lock().statuses.get(&document).cloned()
    }

    /// Drop the state of a closed document.
    pub fn evict(&self, document: DocumentId) {
        if self.inner.lock().statuses.remove(&document).is_some() {
            tracing::trace!(document = document.get(), "dirty scope evicted");
        }
    }

    fn assert_registered(&self, pass: PassId) {
        assert!(
            self.registrar.is_tracked(pass),
            "pass {pass:?} is not registered for dirty-scope tracking"
        );
    }
}

impl std::fmt::Debug for DirtyScopeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DirtyScopeMap")
            .field("documents", &inner.statuses.len())
            .field("allow_dirt", &inner.allow_dirt)
            .finish()
    }
}

fn combine_scopes(
    old: Option<DirtyScope>,
    scope: TextRange,
    file_length: usize,
    document: &Document,
) -> DirtyScope {
    let whole = TextRange::whole(file_length);
    let marker = match old {
        None => {
            if scope == whole {
                return DirtyScope::WholeFile;
            }
            return DirtyScope::Range(document.create_greedy_range_marker(scope));
        }
        Some(DirtyScope::WholeFile) => return DirtyScope::WholeFile,
        Some(DirtyScope::Range(marker)) => marker,
    };

    let old_range = marker.range();
    let union = scope.union(old_range).clamp_to(file_length);
    if union == whole {
        return DirtyScope::WholeFile;
    }
    if marker.is_valid() && union == old_range {
        return DirtyScope::Range(marker);
    }
    DirtyScope::Range(document.create_greedy_range_marker(union))
}
