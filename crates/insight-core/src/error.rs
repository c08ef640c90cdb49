use crate::daemon::ViewId;
use crate::document::{DocumentError, DocumentId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced by [`HighlightRecordBuilder`](crate::HighlightRecordBuilder).
pub enum BuildError {
    #[error("field '{0}' was already set")]
    /// A single-valued field was set twice.
    FieldAlreadySet(&'static str),

    #[error("invalid range: start {start} > end {end}")]
    /// `start > end`.
    InvalidRange {
        /// Requested start offset.
        start: usize,
        /// Requested end offset.
        end: usize,
    },

    #[error("missing required field: {0}")]
    /// A required field was never set.
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors surfaced by the analysis pipeline.
///
/// [`AnalysisError::Canceled`] is not a failure: it means a newer edit superseded the run and a
/// fresh pass will pick up the remaining dirty scope.
pub enum AnalysisError {
    #[error("analysis canceled")]
    /// The pass was canceled cooperatively.
    Canceled,

    #[error("a write is pending on the syntax model")]
    /// Read access to the syntax model was refused because a writer is waiting.
    WritePending,

    #[error("inconsistent highlighting results: {0}")]
    /// A visitor contract violation was detected after collection.
    Inconsistent(String),

    #[error("unknown document {0:?}")]
    /// The document is not open in the daemon.
    UnknownDocument(DocumentId),

    #[error("syntax provider failed: {0}")]
    /// The syntax provider could not produce a tree.
    Syntax(String),
}

impl AnalysisError {
    /// Returns `true` if the condition is retryable by simply scheduling another run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Canceled | AnalysisError::WritePending | AnalysisError::Inconsistent(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors returned by a [`HighlightVisitor`](crate::HighlightVisitor) for a single element.
pub enum VisitError {
    #[error("visit canceled")]
    /// Cancellation was observed inside the visitor.
    Canceled,

    #[error("visitor failed: {0}")]
    /// The visitor could not analyze the element.
    Failed(String),
}

impl From<VisitError> for AnalysisError {
    fn from(err: VisitError) -> Self {
        match err {
            VisitError::Canceled => AnalysisError::Canceled,
            VisitError::Failed(msg) => AnalysisError::Inconsistent(msg),
        }
    }
}

impl From<BuildError> for AnalysisError {
    fn from(err: BuildError) -> Self {
        AnalysisError::Inconsistent(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors returned by the daemon's document management.
pub enum DaemonError {
    #[error("unknown document {0:?}")]
    /// The document is not open in the daemon.
    UnknownDocument(DocumentId),

    #[error("unknown view {0:?}")]
    /// The view is not open in the daemon.
    UnknownView(ViewId),

    #[error(transparent)]
    /// The edit was rejected by the document.
    Edit(#[from] DocumentError),
}
