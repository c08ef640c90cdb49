use crate::tree::build_syntax_tree;
use insight_core::{
    AnalysisError, ArenaTree, DocumentEvent, DocumentId, DocumentSnapshot, FileView,
    PlainTextSyntaxProvider, SyntaxProvider,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tree_sitter::{InputEdit, Language, Parser, Point, Tree};

/// Errors produced by [`TreeSitterSyntaxProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeSitterError {
    #[error("tree-sitter language error: {0}")]
    /// Setting the Tree-sitter language failed.
    Language(String),

    #[error("tree-sitter delta mismatch")]
    /// An edit notification did not match the cached text.
    DeltaMismatch,

    #[error("tree-sitter produced no tree")]
    /// The parser gave up without producing a tree.
    NoTree,
}

impl From<TreeSitterError> for AnalysisError {
    fn from(err: TreeSitterError) -> Self {
        AnalysisError::Syntax(err.to_string())
    }
}

/// How the provider obtained the tree for the last [`SyntaxProvider::file_view`] call on a
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSitterUpdateMode {
    /// First parse for this document.
    Initial,
    /// Updated by applying edit notifications and re-parsing incrementally.
    Incremental,
    /// Fell back to re-parsing the snapshot text from scratch.
    FullReparse,
    /// No work was performed (the cached tree already matched the snapshot).
    Skipped,
}

struct ParsedDocument {
    language: String,
    stamp: u64,
    text: String,
    tree: Tree,
    arena: Option<Arc<ArenaTree>>,
    last_mode: TreeSitterUpdateMode,
}

impl ParsedDocument {
    /// Replay one edit onto the cached text and tree.
    fn apply(&mut self, event: &DocumentEvent) -> Result<(), TreeSitterError> {
        if event.stamp != self.stamp + 1 {
            return Err(TreeSitterError::DeltaMismatch);
        }
        let start_byte = event.offset;
        let old_end_byte = start_byte.saturating_add(event.old_len());
        let new_end_byte = start_byte.saturating_add(event.new_len());
        if self.text.get(start_byte..old_end_byte) != Some(event.old_text.as_str()) {
            return Err(TreeSitterError::DeltaMismatch);
        }

        let start_position = point_at(&self.text, start_byte);
        self.tree.edit(&InputEdit {
            start_byte,
            old_end_byte,
            new_end_byte,
            start_position,
            old_end_position: advance_point(start_position, &event.old_text),
            new_end_position: advance_point(start_position, &event.new_text),
        });
        self.text
            .replace_range(start_byte..old_end_byte, &event.new_text);
        self.stamp = event.stamp;
        self.arena = None;
        Ok(())
    }

    /// Bring the tree up to date with the cached text, re-using the edited old tree.
    fn reparse(&mut self, grammar: &Language) -> Result<Arc<ArenaTree>, TreeSitterError> {
        if let Some(arena) = &self.arena {
            self.last_mode = TreeSitterUpdateMode::Skipped;
            return Ok(Arc::clone(arena));
        }
        let tree = parser_for(grammar)?
            .parse(&self.text, Some(&self.tree))
            .ok_or(TreeSitterError::NoTree)?;
        let arena = Arc::new(build_syntax_tree(&tree, self.text.len()));
        self.tree = tree;
        self.arena = Some(Arc::clone(&arena));
        self.last_mode = TreeSitterUpdateMode::Incremental;
        Ok(arena)
    }
}

/// A [`SyntaxProvider`] backed by Tree-sitter grammars.
///
/// The provider keeps the last parse of every document. Edit notifications are replayed onto
/// that parse so the next [`SyntaxProvider::file_view`] call only re-parses incrementally; when
/// a notification does not line up (missed edit, foreign text) the next call re-parses from the
/// snapshot instead.
pub struct TreeSitterSyntaxProvider {
    languages: HashMap<String, Language>,
    cache: Mutex<HashMap<DocumentId, ParsedDocument>>,
}

impl TreeSitterSyntaxProvider {
    /// Create a provider without grammars. Every language falls back to plain text.
    pub fn new() -> Self {
        Self {
            languages: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register the grammar used for the language id `name`.
    pub fn with_language(
        mut self,
        name: impl Into<String>,
        language: Language,
    ) -> Result<Self, TreeSitterError> {
        // Fail early on ABI mismatches instead of on the first parse.
        parser_for(&language)?;
        self.languages.insert(name.into(), language);
        Ok(self)
    }

    /// Whether a grammar is registered for `name`.
    pub fn supports(&self, name: &str) -> bool {
        self.languages.contains_key(name)
    }

    /// How the tree of `document` was last obtained, `None` if nothing is cached.
    pub fn last_update_mode(&self, document: DocumentId) -> Option<TreeSitterUpdateMode> {
        self.cache.lock().get(&document).map(|p| p.last_mode)
    }

    /// Number of documents with a cached parse.
    pub fn cached_documents(&self) -> usize {
        self.cache.lock().len()
    }

    fn parse(
        &self,
        snapshot: &DocumentSnapshot,
        language: &str,
        grammar: &Language,
    ) -> Result<Arc<ArenaTree>, TreeSitterError> {
        let mut cache = self.cache.lock();
        let id = snapshot.id();
        if let Some(parsed) = cache
            .get_mut(&id)
            .filter(|p| p.language == language && p.stamp == snapshot.stamp())
        {
            return parsed.reparse(grammar);
        }

        let text = snapshot.text();
        let tree = parser_for(grammar)?
            .parse(&text, None)
            .ok_or(TreeSitterError::NoTree)?;
        let arena = Arc::new(build_syntax_tree(&tree, text.len()));
        let mode = match cache.get(&id) {
            // A worker holding an older snapshot: keep the newer cached parse.
            Some(p) if p.stamp > snapshot.stamp() => return Ok(arena),
            Some(_) => TreeSitterUpdateMode::FullReparse,
            None => TreeSitterUpdateMode::Initial,
        };
        tracing::debug!(document = id.get(), ?mode, "tree-sitter parse");
        cache.insert(
            id,
            ParsedDocument {
                language: language.to_string(),
                stamp: snapshot.stamp(),
                text,
                tree,
                arena: Some(Arc::clone(&arena)),
                last_mode: mode,
            },
        );
        Ok(arena)
    }
}

impl Default for TreeSitterSyntaxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TreeSitterSyntaxProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<_> = self.languages.keys().collect();
        languages.sort();
        f.debug_struct("TreeSitterSyntaxProvider")
            .field("languages", &languages)
            .field("cached_documents", &self.cached_documents())
            .finish()
    }
}

impl SyntaxProvider for TreeSitterSyntaxProvider {
    fn file_view(
        &self,
        snapshot: &DocumentSnapshot,
        language: &str,
    ) -> Result<FileView, AnalysisError> {
        let Some(grammar) = self.languages.get(language) else {
            return PlainTextSyntaxProvider.file_view(snapshot, language);
        };
        let arena = self.parse(snapshot, language, grammar)?;
        Ok(FileView::single(language, arena))
    }

    fn document_changed(&self, event: &DocumentEvent) {
        let mut cache = self.cache.lock();
        let Some(parsed) = cache.get_mut(&event.document) else {
            return;
        };
        if let Err(err) = parsed.apply(event) {
            // The stale entry is replaced by a full parse on the next request.
            tracing::debug!(
                document = event.document.get(),
                stamp = event.stamp,
                %err,
                "edit not replayed onto cached tree"
            );
        }
    }

    fn document_closed(&self, document: DocumentId) {
        self.cache.lock().remove(&document);
    }
}

fn parser_for(language: &Language) -> Result<Parser, TreeSitterError> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| TreeSitterError::Language(e.to_string()))?;
    Ok(parser)
}

fn point_at(text: &str, byte: usize) -> Point {
    let before = &text.as_bytes()[..byte];
    let row = before.iter().filter(|b| **b == b'\n').count();
    let column = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(byte, |newline| byte - newline - 1);
    Point { row, column }
}

fn advance_point(mut point: Point, text: &str) -> Point {
    let mut parts = text.split('\n');
    let Some(first) = parts.next() else {
        return point;
    };

    point.column = point.column.saturating_add(first.len());
    for part in parts {
        point.row = point.row.saturating_add(1);
        point.column = part.len();
    }

    point
}
