#![warn(missing_docs)]
//! Insight Core - Headless Incremental Highlighting Daemon
//!
//! # Overview
//!
//! `insight-core` keeps the highlighting of open documents up to date while they are edited. It
//! does not parse or render anything itself: a host plugs in a [`SyntaxProvider`] producing
//! element trees and registers [`HighlightVisitor`]s that turn elements into
//! [`HighlightRecord`]s. The daemon decides what to re-analyze, runs passes on worker threads,
//! and reconciles the results into a [`MarkupModel`] of long-lived [`RangeHighlighter`]s.
//!
//! # Core Features
//!
//! - **Dirty Scopes**: per document and per pass, only edited lines are re-analyzed
//! - **Viewport First**: elements inside the visible range are visited and published first
//! - **Stable Highlighters**: reconciliation reuses highlighters whose records did not change
//! - **Typing Fast Path**: highlighters invalidated by a keystroke disappear before any pass runs
//! - **Cooperative Cancellation**: every pass runs with a [`ProgressToken`]
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  HighlightDaemon / DaemonHandle             │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Writer: HighlighterReconciler, MarkupModel │  ← Single writer
//! ├─────────────────────────────────────────────┤
//! │  GeneralHighlightingPass (worker threads)   │  ← Collection
//! ├─────────────────────────────────────────────┤
//! │  Divider + HighlightVisitor registry        │  ← Element order
//! ├─────────────────────────────────────────────┤
//! │  DirtyScopeMap                              │  ← What to redo
//! ├─────────────────────────────────────────────┤
//! │  Document (rope) + SyntaxProvider           │  ← Text and trees
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use insight_core::{
//!     Element, HighlightDaemon, HighlightRecord, HighlightSink, HighlightType, HighlightVisitor,
//!     PassId, PassRegistration, PlainTextSyntaxProvider, TextRange, VisitError,
//!     VisitorRegistration, VisitorRegistry,
//! };
//! use std::sync::Arc;
//!
//! struct Shouting;
//!
//! impl HighlightVisitor for Shouting {
//!     fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError> {
//!         let text = element.text();
//!         if element.kind() == "WORD" && text.chars().all(|c| c.is_ascii_uppercase()) {
//!             sink.add(
//!                 HighlightRecord::builder(HighlightType::WARNING)
//!                     .range(element.range())?
//!                     .description("no shouting")?
//!                     .build()?,
//!             );
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut daemon = HighlightDaemon::builder(Arc::new(PlainTextSyntaxProvider))
//!     .build()
//!     .unwrap();
//! let visitors = Arc::new(VisitorRegistry::new());
//! visitors.register(VisitorRegistration::new("shouting", || Shouting));
//! daemon.register_pass(PassRegistration::new(PassId::UPDATE_ALL, "general", visitors));
//!
//! let opened = daemon.open_document("hello WORLD", "text", None);
//! let records = daemon.run_passes(opened.document, &[], false).unwrap();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].range(), TextRange::new(6, 11));
//!
//! // Editing only dirties the changed line.
//! daemon.apply_edit(opened.document, TextRange::new(0, 5), "HI").unwrap();
//! let records = daemon.run_passes(opened.document, &[], false).unwrap();
//! assert_eq!(records.len(), 2);
//! ```
//!
//! # Module Description
//!
//! - [`text_range`] - Half-open byte ranges
//! - [`document`] - Rope-backed documents, snapshots and range markers
//! - [`dirty_scope`] - Per-document, per-pass dirty scopes
//! - [`divider`] - Inside/outside element partition
//! - [`highlight_record`] - Immutable highlight records and their builder
//! - [`general_pass`] - The visitor-driven highlighting pass
//! - [`reconciler`] - Highlighter reconciliation and the typing fast path
//! - [`daemon`] - Document sessions and pass scheduling
//!
//! # Threading
//!
//! The thread owning the [`HighlightDaemon`] is the only writer of documents and markup.
//! Passes read immutable [`DocumentSnapshot`]s and hand records over a bounded channel. Other
//! threads cancel work through a [`DaemonHandle`].

pub mod config;
pub mod daemon;
pub mod dirty_scope;
pub mod divider;
pub mod document;
pub mod error;
pub mod file_level;
pub mod general_pass;
pub mod highlight_record;
pub mod markup;
pub mod pass;
pub mod problems;
pub mod progress;
pub mod reconciler;
pub mod severity;
pub mod syntax;
pub mod text_range;
pub mod todo;
pub mod visitor;

pub use config::{ConfigError, DaemonConfig};
pub use daemon::{
    DaemonBuilder, DaemonHandle, EditorSession, HighlightDaemon, OpenDocumentResult, ViewId,
};
pub use dirty_scope::{DirtyScope, DirtyScopeMap, FileStatus};
pub use divider::{DividedElements, Divider, ElementFilter};
pub use document::{
    Document, DocumentError, DocumentEvent, DocumentId, DocumentSnapshot, RangeMarker,
};
pub use error::{AnalysisError, BuildError, DaemonError, VisitError};
pub use file_level::{FileLevelAnnotations, FileLevelEntry};
pub use general_pass::{GeneralHighlightingPass, PassContext, PassMessage, PassState};
pub use highlight_record::{
    GutterMark, HighlightFlags, HighlightRecord, HighlightRecordBuilder, HighlightType, QuickFix,
    RecordBinding, TextAttributes,
};
pub use insight_core_lang::{CommentConfig, LanguageConfig, LanguageRegistry};
pub use markup::{
    HighlighterAttributes, HighlighterId, HighlighterLayer, MarkupModel, RangeHighlighter,
};
pub use pass::{PassId, PassRegistrar, PassRegistration};
pub use problems::{Problem, ProblemCollector, ProblemSink, ReportMode};
pub use progress::{ChunkedProgress, InterruptGuard, InterruptPolicy, ProgressToken};
pub use reconciler::{
    HighlighterReconciler, ReconcileStats, find_highlight_by_offset, update_highlighters_by_typing,
};
pub use severity::{Severity, SeverityChange, SeverityListener, SeverityRegistrar};
pub use syntax::{
    ArenaTree, Element, FileView, NodeId, PlainTextSyntaxProvider, SyntaxProvider, SyntaxRoot,
    SyntaxTree, SyntaxTreeBuilder,
};
pub use text_range::TextRange;
pub use todo::{TodoScan, TodoScanner};
pub use visitor::{
    FileContext, HighlightSink, HighlightVisitor, VisitorFactory, VisitorInstance,
    VisitorRegistration, VisitorRegistry, VisitorRegistryChange, VisitorRegistryListener,
};
