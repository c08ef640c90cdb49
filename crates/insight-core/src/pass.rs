//! Pass identities and the registry of highlighting pass kinds.
//!
//! A *pass* is one kind of analysis over a document (syntax/annotation pass, local inspections,
//! external tools, ...). Each pass kind that tracks a dirty scope gets its own entry in every
//! document's [`FileStatus`](crate::dirty_scope::FileStatus). The set of pass kinds is open:
//! hosts register additional kinds at runtime.

use crate::visitor::VisitorRegistry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a highlighting pass kind.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PassId(pub u32);

impl PassId {
    /// The general (syntax + annotator) pass.
    pub const UPDATE_ALL: Self = Self(1);
    /// Local inspections.
    pub const LOCAL_INSPECTIONS: Self = Self(2);
    /// Expensive external tools, skipped while the file has errors.
    pub const EXTERNAL_TOOLS: Self = Self(3);
    /// Synthetic "problems reported" pass. Never runs visitors.
    pub const WOLF: Self = Self(4);

    /// Create a custom pass id.
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Debug for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PassId::UPDATE_ALL => f.write_str("UPDATE_ALL"),
            PassId::LOCAL_INSPECTIONS => f.write_str("LOCAL_INSPECTIONS"),
            PassId::EXTERNAL_TOOLS => f.write_str("EXTERNAL_TOOLS"),
            PassId::WOLF => f.write_str("WOLF"),
            PassId(id) => write!(f, "PassId({id})"),
        }
    }
}

/// Description of one registered pass kind.
#[derive(Debug, Clone)]
pub struct PassRegistration {
    /// Pass id.
    pub id: PassId,
    /// Human readable name, used in logs.
    pub name: String,
    /// Whether the pass has a dirty-scope entry in every [`FileStatus`](crate::dirty_scope::FileStatus).
    pub tracks_dirty_scope: bool,
    /// Visitors run by the pass. `None` for synthetic passes.
    pub visitors: Option<Arc<VisitorRegistry>>,
    /// Whether the pass scans TODO comments.
    pub scan_todo: bool,
    /// Whether the pass reports ERROR records to the problem sink.
    pub report_problems: bool,
    /// Whether the pass is skipped when the previous run found errors in the file.
    pub skip_when_errors: bool,
}

impl PassRegistration {
    /// Create a dirty-scope tracking pass running `visitors`.
    pub fn new(id: PassId, name: impl Into<String>, visitors: Arc<VisitorRegistry>) -> Self {
        Self {
            id,
            name: name.into(),
            tracks_dirty_scope: true,
            visitors: Some(visitors),
            scan_todo: false,
            report_problems: false,
            skip_when_errors: false,
        }
    }

    fn synthetic(id: PassId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            tracks_dirty_scope: true,
            visitors: None,
            scan_todo: false,
            report_problems: false,
            skip_when_errors: false,
        }
    }

    /// Enable/disable the TODO scan.
    pub fn with_todo_scan(mut self, enabled: bool) -> Self {
        self.scan_todo = enabled;
        self
    }

    /// Enable/disable problem reporting.
    pub fn with_problem_reporting(mut self, enabled: bool) -> Self {
        self.report_problems = enabled;
        self
    }

    /// Skip the pass while the file is known to contain errors.
    pub fn with_skip_when_errors(mut self, enabled: bool) -> Self {
        self.skip_when_errors = enabled;
        self
    }

    /// Whether the pass is tracked but never scheduled.
    pub fn is_synthetic(&self) -> bool {
        self.visitors.is_none()
    }
}

/// Registry of pass kinds.
///
/// A fresh registrar knows the synthetic [`PassId::WOLF`] pass only.
#[derive(Debug)]
pub struct PassRegistrar {
    passes: RwLock<Vec<Arc<PassRegistration>>>,
}

impl PassRegistrar {
    /// Create a registrar with the synthetic WOLF pass.
    pub fn new() -> Self {
        Self {
            passes: RwLock::new(vec![Arc::new(PassRegistration::synthetic(
                PassId::WOLF,
                "wolf",
            ))]),
        }
    }

    /// Register a pass kind.
    ///
    /// # Panics
    ///
    /// Panics if a pass with the same id is already registered.
    pub fn register(&self, registration: PassRegistration) {
        let mut passes = self.passes.write();
        assert!(
            passes.iter().all(|p| p.id != registration.id),
            "pass {:?} registered twice",
            registration.id
        );
        tracing::debug!(pass = ?registration.id, name = %registration.name, "pass registered");
        passes.push(Arc::new(registration));
    }

    /// Returns `true` if `id` is a registered, dirty-scope tracking pass.
    pub fn is_tracked(&self, id: PassId) -> bool {
        self.passes
            .read()
            .iter()
            .any(|p| p.id == id && p.tracks_dirty_scope)
    }

    /// Ids of every dirty-scope tracking pass.
    pub fn tracked_ids(&self) -> Vec<PassId> {
        self.passes
            .read()
            .iter()
            .filter(|p| p.tracks_dirty_scope)
            .map(|p| p.id)
            .collect()
    }

    /// Look up a registration.
    pub fn get(&self, id: PassId) -> Option<Arc<PassRegistration>> {
        self.passes.read().iter().find(|p| p.id == id).cloned()
    }

    /// Passes that run visitors, in registration order.
    pub fn runnable(&self) -> Vec<Arc<PassRegistration>> {
        self.passes
            .read()
            .iter()
            .filter(|p| !p.is_synthetic())
            .cloned()
            .collect()
    }
}

impl Default for PassRegistrar {
    fn default() -> Self {
        Self::new()
    }
}
