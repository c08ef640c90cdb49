#![warn(missing_docs)]
//! `insight-core-treesitter` - Tree-sitter integration for `insight-core`.
//!
//! This crate provides a [`insight_core::SyntaxProvider`] backed by Tree-sitter grammars:
//!
//! - one cached parse tree per open document, updated incrementally from the daemon's edit
//!   notifications (with a full re-parse fallback when the notifications do not line up)
//! - conversion of Tree-sitter trees into `insight-core`'s arena trees, flagging error and
//!   missing nodes
//! - [`SyntaxErrorVisitor`], which turns those flagged nodes into error highlights
//!
//! Languages without a registered grammar fall back to the plain-text tree.

mod error_visitor;
mod provider;
mod tree;

pub use error_visitor::SyntaxErrorVisitor;
pub use provider::{TreeSitterError, TreeSitterSyntaxProvider, TreeSitterUpdateMode};
pub use tree::build_syntax_tree;
