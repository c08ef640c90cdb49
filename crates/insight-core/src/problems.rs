//! Problem reporting.
//!
//! Passes that report problems hand their ERROR records to a [`ProblemSink`] after a successful
//! apply. Whole-file runs replace everything known about the file; partial runs only replace the
//! problems inside the re-analyzed range.

use crate::document::DocumentId;
use crate::highlight_record::HighlightRecord;
use crate::pass::PassId;
use crate::severity::Severity;
use crate::text_range::TextRange;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Pass that found the problem.
    pub pass: PassId,
    /// Location.
    pub range: TextRange,
    /// Severity.
    pub severity: Severity,
    /// Message shown in problem views.
    pub message: String,
}

impl Problem {
    /// Problem describing `record`.
    pub fn from_record(pass: PassId, record: &HighlightRecord) -> Self {
        Self {
            pass,
            range: record.range(),
            severity: record.severity().clone(),
            message: record
                .description()
                .unwrap_or_else(|| record.highlight_type().id())
                .to_string(),
        }
    }
}

/// How a report combines with previously reported problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Forget every problem of the file first.
    ReplaceAll,
    /// Replace only problems within `range`.
    Merge {
        /// Re-analyzed range.
        range: TextRange,
    },
}

/// Receiver of problem reports.
pub trait ProblemSink: Send + Sync {
    /// Report the problems found in `document`.
    fn report(&self, document: DocumentId, problems: Vec<Problem>, mode: ReportMode);

    /// The document was closed.
    fn clear(&self, _document: DocumentId) {}
}

/// In-memory [`ProblemSink`].
#[derive(Debug, Default)]
pub struct ProblemCollector {
    problems: Mutex<HashMap<DocumentId, Vec<Problem>>>,
    reports: Mutex<Vec<(DocumentId, ReportMode)>>,
}

impl ProblemCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current problems of `document`, ordered by start offset.
    pub fn problems(&self, document: DocumentId) -> Vec<Problem> {
        self.problems
            .lock()
            .get(&document)
            .cloned()
            .unwrap_or_default()
    }

    /// Every report received so far, oldest first.
    pub fn reports(&self) -> Vec<(DocumentId, ReportMode)> {
        self.reports.lock().clone()
    }
}

impl ProblemSink for ProblemCollector {
    fn report(&self, document: DocumentId, problems: Vec<Problem>, mode: ReportMode) {
        self.reports.lock().push((document, mode));
        let mut all = self.problems.lock();
        let current = all.entry(document).or_default();
        match mode {
            ReportMode::ReplaceAll => current.clear(),
            ReportMode::Merge { range } => current.retain(|p| !range.contains_range(p.range)),
        }
        current.extend(problems);
        current.sort_by_key(|p| (p.range.start(), p.range.end()));
    }

    fn clear(&self, document: DocumentId) {
        self.problems.lock().remove(&document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(start: usize, end: usize, message: &str) -> Problem {
        Problem {
            pass: PassId::UPDATE_ALL,
            range: TextRange::new(start, end),
            severity: Severity::ERROR,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_merge_replaces_only_inside_range() {
        let collector = ProblemCollector::new();
        let doc = DocumentId(7);
        collector.report(
            doc,
            vec![problem(0, 2, "a"), problem(40, 45, "b")],
            ReportMode::ReplaceAll,
        );
        collector.report(
            doc,
            vec![problem(41, 42, "c")],
            ReportMode::Merge {
                range: TextRange::new(30, 50),
            },
        );
        let messages: Vec<_> = collector
            .problems(doc)
            .into_iter()
            .map(|p| p.message)
            .collect();
        assert_eq!(messages, vec!["a", "c"]);

        collector.report(doc, Vec::new(), ReportMode::ReplaceAll);
        assert!(collector.problems(doc).is_empty());
        assert_eq!(collector.reports().len(), 3);
    }
}
