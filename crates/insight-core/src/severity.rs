//! Highlight severities and their runtime-extensible total order.
//!
//! The daemon never compares severities by hand: every comparison goes through a
//! [`SeverityRegistrar`], which owns the ordering, caches ranks, and broadcasts a
//! [`SeverityChange`] to subscribers whenever the ordering changes.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A named severity with a default numeric weight.
///
/// Two severities are equal when their names are equal. The weight is only used to place
/// severities the registrar does not know about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Severity {
    name: Cow<'static, str>,
    weight: i32,
}

impl Severity {
    /// Errors (red underline, block "problem free" state).
    pub const ERROR: Self = Self::builtin("ERROR", 400);
    /// Warnings.
    pub const WARNING: Self = Self::builtin("WARNING", 300);
    /// Weak warnings (usually rendered as a faint underline).
    pub const WEAK_WARNING: Self = Self::builtin("WEAK_WARNING", 200);
    /// Informational highlights such as syntax coloring and TODO markers.
    pub const INFORMATION: Self = Self::builtin("INFORMATION", 10);

    const fn builtin(name: &'static str, weight: i32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            weight,
        }
    }

    /// Create a custom severity.
    pub fn new(name: impl Into<String>, weight: i32) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            weight,
        }
    }

    /// Severity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default weight.
    pub fn weight(&self) -> i32 {
        self.weight
    }
}

impl PartialEq for Severity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Severity {}

impl std::hash::Hash for Severity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Event broadcast by [`SeverityRegistrar`] when the ordering changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeverityChange {
    /// A severity was registered.
    Registered(String),
    /// A severity was removed.
    Unregistered(String),
}

/// Severity change callback.
pub type SeverityListener = Box<dyn FnMut(&SeverityChange) + Send>;

/// Owns the total order over severities.
///
/// The order is kept as a list sorted from the least to the most severe entry. Ranks derived
/// from that list are cached until the next change.
pub struct SeverityRegistrar {
    ordered: RwLock<Vec<Severity>>,
    ranks: RwLock<Option<HashMap<String, usize>>>,
    listeners: Mutex<Vec<SeverityListener>>,
}

impl SeverityRegistrar {
    /// Create a registrar knowing the built-in severities.
    pub fn new() -> Self {
        Self {
            ordered: RwLock::new(vec![
                Severity::INFORMATION,
                Severity::WEAK_WARNING,
                Severity::WARNING,
                Severity::ERROR,
            ]),
            ranks: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to ordering changes.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(&SeverityChange) + Send + 'static,
    {
        self.listeners.lock().push(Box::new(callback));
    }

    /// Register `severity`, placing it by weight among the known severities.
    ///
    /// Re-registering a known name moves it to its new position.
    pub fn register(&self, severity: Severity) {
        {
            let mut ordered = self.ordered.write();
            ordered.retain(|s| s != &severity);
            let pos = ordered
                .iter()
                .position(|s| s.weight > severity.weight)
                .unwrap_or(ordered.len());
            ordered.insert(pos, severity.clone());
        }
        self.changed(SeverityChange::Registered(severity.name().to_string()));
    }

    /// Register `severity` immediately above `below` in the order.
    ///
    /// Falls back to [`Self::register`] when `below` is unknown.
    pub fn register_above(&self, severity: Severity, below: &Severity) {
        {
            let mut ordered = self.ordered.write();
            ordered.retain(|s| s != &severity);
            let Some(pos) = ordered.iter().position(|s| s == below) else {
                drop(ordered);
                self.register(severity);
                return;
            };
            ordered.insert(pos + 1, severity.clone());
        }
        self.changed(SeverityChange::Registered(severity.name().to_string()));
    }

    /// Remove a custom severity. Built-in severities stay registered.
    pub fn unregister(&self, severity: &Severity) -> bool {
        if [
            Severity::ERROR,
            Severity::WARNING,
            Severity::WEAK_WARNING,
            Severity::INFORMATION,
        ]
        .contains(severity)
        {
            return false;
        }
        let removed = {
            let mut ordered = self.ordered.write();
            let before = ordered.len();
            ordered.retain(|s| s != severity);
            before != ordered.len()
        };
        if removed {
            self.changed(SeverityChange::Unregistered(severity.name().to_string()));
        }
        removed
    }

    /// All registered severities, least severe first.
    pub fn all(&self) -> Vec<Severity> {
        self.ordered.read().clone()
    }

    /// Position of `severity` in the total order.
    ///
    /// Unknown severities are placed by weight, between registered neighbours.
    pub fn rank(&self, severity: &Severity) -> usize {
        if let Some(rank) = self
            .ranks
            .read()
            .as_ref()
            .and_then(|ranks| ranks.get(severity.name()).copied())
        {
            return rank;
        }

        let mut cache = self.ranks.write();
        let ranks = cache.get_or_insert_with(|| {
            self.ordered
                .read()
                .iter()
                .enumerate()
                // Leave a gap between neighbours for unknown severities.
                .map(|(idx, s)| (s.name().to_string(), idx * 2 + 1))
                .collect()
        });
        if let Some(rank) = ranks.get(severity.name()) {
            return *rank;
        }
        let ordered = self.ordered.read();
        ordered
            .iter()
            .position(|s| s.weight > severity.weight)
            .map(|idx| idx * 2)
            .unwrap_or(ordered.len() * 2)
    }

    /// Compare two severities.
    pub fn compare(&self, a: &Severity, b: &Severity) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.rank(a)
            .cmp(&self.rank(b))
            .then_with(|| a.weight.cmp(&b.weight))
    }

    /// Returns `true` if `severity` is at least as severe as `threshold`.
    pub fn is_at_least(&self, severity: &Severity, threshold: &Severity) -> bool {
        self.compare(severity, threshold) != Ordering::Less
    }

    /// The more severe of two severities.
    pub fn max<'a>(&self, a: &'a Severity, b: &'a Severity) -> &'a Severity {
        if self.compare(a, b) == Ordering::Less { b } else { a }
    }

    fn changed(&self, change: SeverityChange) {
        *self.ranks.write() = None;
        tracing::debug!(?change, "severities changed");
        for listener in self.listeners.lock().iter_mut() {
            listener(&change);
        }
    }
}

impl Default for SeverityRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SeverityRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeverityRegistrar")
            .field("ordered", &*self.ordered.read())
            .finish_non_exhaustive()
    }
}
