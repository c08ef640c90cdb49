//! Highlight visitors and their registry.
//!
//! A [`HighlightVisitor`] inspects one element at a time and reports [`HighlightRecord`]s into a
//! [`HighlightSink`]. Visitors are stateful, so every pass invocation gets fresh instances from
//! the registered factories; nothing leaks between concurrent passes.

use crate::document::DocumentSnapshot;
use crate::error::{BuildError, VisitError};
use crate::highlight_record::HighlightRecord;
use crate::pass::PassId;
use crate::severity::Severity;
use crate::syntax::Element;
use crate::text_range::TextRange;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

impl From<BuildError> for VisitError {
    fn from(err: BuildError) -> Self {
        VisitError::Failed(err.to_string())
    }
}

/// File-wide information handed to visitors before the first element.
#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    /// Snapshot being analyzed.
    pub snapshot: &'a DocumentSnapshot,
    /// Language of the root currently visited.
    pub language: &'a str,
    /// Range being re-analyzed.
    pub restrict: TextRange,
    /// Visible part of the file.
    pub priority: TextRange,
    /// Whether indexes are unavailable.
    pub dumb_mode: bool,
}

/// Collects the records produced for one element.
#[derive(Debug)]
pub struct HighlightSink {
    pass: PassId,
    records: Vec<HighlightRecord>,
}

impl HighlightSink {
    /// Create a sink attributing records to `pass`.
    pub fn new(pass: PassId) -> Self {
        Self {
            pass,
            records: Vec::new(),
        }
    }

    /// Pass the records are attributed to.
    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// Report a record. Records without a group are attributed to the current pass.
    pub fn add(&mut self, record: HighlightRecord) {
        self.records.push(record.in_group(self.pass));
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns `true` if a pending record has `severity`.
    pub fn has_severity(&self, severity: &Severity) -> bool {
        self.records.iter().any(|r| r.severity() == severity)
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, HighlightRecord> {
        self.records.drain(..)
    }
}

/// A stateful element visitor.
pub trait HighlightVisitor: Send {
    /// Whether the visitor applies to the file at all.
    fn suitable_for_file(&self, _ctx: &FileContext<'_>) -> bool {
        true
    }

    /// Called once before the first element of a root.
    fn begin(&mut self, _ctx: &FileContext<'_>) {}

    /// Analyze one element.
    fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError>;

    /// Called after the last element. Returning `false` reports inconsistent results.
    fn finish(&mut self) -> bool {
        true
    }
}

/// Creates a fresh visitor instance.
pub type VisitorFactory = Arc<dyn Fn() -> Box<dyn HighlightVisitor> + Send + Sync>;

/// A registered visitor kind.
#[derive(Clone)]
pub struct VisitorRegistration {
    /// Unique name.
    pub name: String,
    /// Run order (ascending).
    pub order: i32,
    /// Whether the visitor may run while indexes are unavailable.
    pub dumb_aware: bool,
    factory: VisitorFactory,
}

impl VisitorRegistration {
    /// Register a visitor kind created by `factory`.
    pub fn new<V, F>(name: impl Into<String>, factory: F) -> Self
    where
        V: HighlightVisitor + 'static,
        F: Fn() -> V + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order: 0,
            dumb_aware: false,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn HighlightVisitor>),
        }
    }

    /// Set the run order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Allow the visitor to run in dumb mode.
    pub fn dumb_aware(mut self, dumb_aware: bool) -> Self {
        self.dumb_aware = dumb_aware;
        self
    }

    /// Create a new instance.
    pub fn instantiate(&self) -> Box<dyn HighlightVisitor> {
        (self.factory)()
    }
}

impl std::fmt::Debug for VisitorRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorRegistration")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("dumb_aware", &self.dumb_aware)
            .finish()
    }
}

/// Event broadcast by [`VisitorRegistry`] on changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitorRegistryChange {
    /// A visitor kind was added.
    Registered(String),
    /// A visitor kind was removed.
    Unregistered(String),
}

/// Visitor registry change callback.
pub type VisitorRegistryListener = Box<dyn FnMut(&VisitorRegistryChange) + Send>;

/// A fresh visitor together with the registration it came from.
pub struct VisitorInstance {
    /// Registration.
    pub registration: Arc<VisitorRegistration>,
    /// Instance.
    pub visitor: Box<dyn HighlightVisitor>,
}

/// Ordered registry of visitor kinds.
#[derive(Default)]
pub struct VisitorRegistry {
    registrations: RwLock<Vec<Arc<VisitorRegistration>>>,
    listeners: Mutex<Vec<VisitorRegistryListener>>,
}

impl VisitorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to registry changes.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(&VisitorRegistryChange) + Send + 'static,
    {
        self.listeners.lock().push(Box::new(callback));
    }

    /// Add a visitor kind, replacing one with the same name.
    pub fn register(&self, registration: VisitorRegistration) {
        let name = registration.name.clone();
        {
            let mut registrations = self.registrations.write();
            registrations.retain(|r| r.name != name);
            registrations.push(Arc::new(registration));
            registrations.sort_by_key(|r| r.order);
        }
        self.notify(VisitorRegistryChange::Registered(name));
    }

    /// Remove a visitor kind.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut registrations = self.registrations.write();
            let before = registrations.len();
            registrations.retain(|r| r.name != name);
            before != registrations.len()
        };
        if removed {
            self.notify(VisitorRegistryChange::Unregistered(name.to_string()));
        }
        removed
    }

    /// Registered kinds, in run order.
    pub fn registrations(&self) -> Vec<Arc<VisitorRegistration>> {
        self.registrations.read().clone()
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Fresh instances of every kind applicable to `ctx`, in run order.
    pub fn instantiate(&self, ctx: &FileContext<'_>) -> Vec<VisitorInstance> {
        self.registrations()
            .into_iter()
            .filter(|r| !ctx.dumb_mode || r.dumb_aware)
            .map(|registration| VisitorInstance {
                visitor: registration.instantiate(),
                registration,
            })
            .filter(|instance| instance.visitor.suitable_for_file(ctx))
            .collect()
    }

    fn notify(&self, change: VisitorRegistryChange) {
        tracing::debug!(?change, "visitor registry changed");
        for listener in self.listeners.lock().iter_mut() {
            listener(&change);
        }
    }
}

impl std::fmt::Debug for VisitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorRegistry")
            .field("registrations", &*self.registrations.read())
            .finish_non_exhaustive()
    }
}
