//! Syntax tree seam.
//!
//! The daemon does not own a parser. It consumes trees through the [`SyntaxTree`] trait
//! (first-child / next-sibling / parent navigation plus byte ranges) and obtains them from a
//! [`SyntaxProvider`], one tree per language embedded in the file.
//!
//! [`ArenaTree`] is a compact owned implementation that providers can flatten their native
//! trees into; [`PlainTextSyntaxProvider`] builds one for plain text (file → lines → words).

use crate::document::{DocumentEvent, DocumentId, DocumentSnapshot};
use crate::error::AnalysisError;
use crate::text_range::TextRange;
use std::sync::Arc;

/// Index of a node inside a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Read-only navigation over a syntax tree.
pub trait SyntaxTree: Send + Sync {
    /// Root node (the file element).
    fn root(&self) -> NodeId;
    /// First child of `node`.
    fn first_child(&self, node: NodeId) -> Option<NodeId>;
    /// Next sibling of `node`.
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    /// Parent of `node`; `None` for the root.
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    /// Byte range of `node`.
    fn text_range(&self, node: NodeId) -> TextRange;
    /// Node kind name.
    fn kind(&self, node: NodeId) -> &str;

    /// Whether the node represents a parse error.
    fn is_error(&self, _node: NodeId) -> bool {
        false
    }
}

impl dyn SyntaxTree + '_ {
    /// Iterate the direct children of `node`.
    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.first_child(node), move |n| self.next_sibling(*n))
    }

    /// Iterate the strict ancestors of `node`, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |n| self.parent(*n))
    }
}

/// A node handle bound to its tree and the snapshot the tree was built from.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    tree: &'a dyn SyntaxTree,
    snapshot: &'a DocumentSnapshot,
    id: NodeId,
}

impl<'a> Element<'a> {
    /// Bind a node.
    pub fn new(tree: &'a dyn SyntaxTree, snapshot: &'a DocumentSnapshot, id: NodeId) -> Self {
        Self { tree, snapshot, id }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Byte range.
    pub fn range(&self) -> TextRange {
        self.tree.text_range(self.id)
    }

    /// Kind name.
    pub fn kind(&self) -> &'a str {
        self.tree.kind(self.id)
    }

    /// Whether this is an error node.
    pub fn is_error(&self) -> bool {
        self.tree.is_error(self.id)
    }

    /// Whether this is the root of its tree.
    pub fn is_root(&self) -> bool {
        self.tree.parent(self.id).is_none()
    }

    /// Text covered by the element.
    pub fn text(&self) -> String {
        self.snapshot.text_in(self.range())
    }

    /// Parent element.
    pub fn parent(&self) -> Option<Element<'a>> {
        self.tree.parent(self.id).map(|id| self.with_id(id))
    }

    /// Direct children.
    pub fn children(&self) -> impl Iterator<Item = Element<'a>> + 'a {
        let this = *self;
        self.tree.children(self.id).map(move |id| this.with_id(id))
    }

    /// The tree this element belongs to.
    pub fn tree(&self) -> &'a dyn SyntaxTree {
        self.tree
    }

    /// The snapshot the tree was built from.
    pub fn snapshot(&self) -> &'a DocumentSnapshot {
        self.snapshot
    }

    fn with_id(&self, id: NodeId) -> Element<'a> {
        Element { id, ..*self }
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:?}", self.kind(), self.range())
    }
}

#[derive(Debug, Clone)]
struct ArenaNode {
    kind: Arc<str>,
    range: TextRange,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    error: bool,
}

/// An owned syntax tree stored in a flat arena.
#[derive(Debug, Clone)]
pub struct ArenaTree {
    nodes: Vec<ArenaNode>,
}

impl ArenaTree {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids, in creation (pre-)order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }
}

impl SyntaxTree for ArenaTree {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].first_child
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].next_sibling
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    fn text_range(&self, node: NodeId) -> TextRange {
        self.nodes[node.index()].range
    }

    fn kind(&self, node: NodeId) -> &str {
        &self.nodes[node.index()].kind
    }

    fn is_error(&self, node: NodeId) -> bool {
        self.nodes[node.index()].error
    }
}

/// Incrementally builds an [`ArenaTree`] in pre-order.
///
/// ```
/// use insight_core::{SyntaxTreeBuilder, TextRange};
///
/// let mut builder = SyntaxTreeBuilder::new();
/// builder.start_node("FILE", 0);
/// builder.token("WORD", TextRange::new(0, 5));
/// builder.finish_node(5);
/// let tree = builder.finish();
/// assert_eq!(tree.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SyntaxTreeBuilder {
    nodes: Vec<ArenaNode>,
    open: Vec<(NodeId, usize)>,
}

impl SyntaxTreeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a composite node starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics when opening a second root.
    pub fn start_node(&mut self, kind: &str, start: usize) -> NodeId {
        let id = self.push(kind, TextRange::empty(start), false);
        self.open.push((id, start));
        id
    }

    /// Close the innermost open node at `end`.
    ///
    /// # Panics
    ///
    /// Panics if no node is open.
    pub fn finish_node(&mut self, end: usize) {
        let Some((id, start)) = self.open.pop() else {
            panic!("finish_node without start_node");
        };
        self.nodes[id.index()].range = TextRange::new(start, end.max(start));
    }

    /// Add a leaf node.
    pub fn token(&mut self, kind: &str, range: TextRange) -> NodeId {
        self.push(kind, range, false)
    }

    /// Add a leaf error node.
    pub fn error_token(&mut self, kind: &str, range: TextRange) -> NodeId {
        self.push(kind, range, true)
    }

    /// Flag the innermost open node as an error node.
    pub fn mark_error(&mut self) {
        if let Some((id, _)) = self.open.last() {
            self.nodes[id.index()].error = true;
        }
    }

    /// Finish building.
    ///
    /// # Panics
    ///
    /// Panics if nodes are still open or nothing was added.
    pub fn finish(self) -> ArenaTree {
        assert!(self.open.is_empty(), "unbalanced syntax tree builder");
        assert!(!self.nodes.is_empty(), "empty syntax tree");
        ArenaTree { nodes: self.nodes }
    }

    fn push(&mut self, kind: &str, range: TextRange, error: bool) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let parent = self.open.last().map(|(p, _)| *p);
        assert!(
            parent.is_some() || self.nodes.is_empty(),
            "syntax tree can only have one root"
        );
        self.nodes.push(ArenaNode {
            kind: Arc::from(kind),
            range,
            parent,
            first_child: None,
            last_child: None,
            next_sibling: None,
            error,
        });
        if let Some(parent) = parent {
            match self.nodes[parent.index()].last_child {
                Some(prev) => self.nodes[prev.index()].next_sibling = Some(id),
                None => self.nodes[parent.index()].first_child = Some(id),
            }
            self.nodes[parent.index()].last_child = Some(id);
        }
        id
    }
}

/// The tree of one language inside a file.
#[derive(Clone)]
pub struct SyntaxRoot {
    /// Language id.
    pub language: String,
    /// Tree.
    pub tree: Arc<dyn SyntaxTree>,
}

impl std::fmt::Debug for SyntaxRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxRoot")
            .field("language", &self.language)
            .field("range", &self.tree.text_range(self.tree.root()))
            .finish()
    }
}

/// All language trees of a file. The first root is the file's base language.
#[derive(Debug, Clone, Default)]
pub struct FileView {
    /// Language roots.
    pub roots: Vec<SyntaxRoot>,
}

impl FileView {
    /// A view with a single language.
    pub fn single(language: impl Into<String>, tree: Arc<dyn SyntaxTree>) -> Self {
        Self {
            roots: vec![SyntaxRoot {
                language: language.into(),
                tree,
            }],
        }
    }

    /// Add an embedded language root.
    pub fn with_root(mut self, language: impl Into<String>, tree: Arc<dyn SyntaxTree>) -> Self {
        self.roots.push(SyntaxRoot {
            language: language.into(),
            tree,
        });
        self
    }
}

/// Supplies syntax trees for document snapshots.
pub trait SyntaxProvider: Send + Sync {
    /// Build (or fetch) the trees of `snapshot`, whose base language is `language`.
    fn file_view(&self, snapshot: &DocumentSnapshot, language: &str)
    -> Result<FileView, AnalysisError>;

    /// Notification of an applied edit, delivered on the writer thread.
    fn document_changed(&self, _event: &DocumentEvent) {}

    /// The document was closed; drop any cached state.
    fn document_closed(&self, _document: DocumentId) {}
}

impl<F> SyntaxProvider for F
where
    F: Fn(&DocumentSnapshot, &str) -> Result<FileView, AnalysisError> + Send + Sync,
{
    fn file_view(
        &self,
        snapshot: &DocumentSnapshot,
        language: &str,
    ) -> Result<FileView, AnalysisError> {
        self(snapshot, language)
    }
}

/// Builds `FILE → LINE → WORD` trees for plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextSyntaxProvider;

impl PlainTextSyntaxProvider {
    /// Build the plain-text tree of `text`.
    pub fn build(text: &str) -> ArenaTree {
        let mut builder = SyntaxTreeBuilder::new();
        builder.start_node("FILE", 0);
        let mut line_start = 0;
        for line in text.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            builder.start_node("LINE", line_start);
            let mut word_start = None;
            for (idx, ch) in content.char_indices() {
                if !ch.is_whitespace() {
                    word_start.get_or_insert(idx);
                } else if let Some(start) = word_start.take() {
                    builder.token("WORD", TextRange::new(line_start + start, line_start + idx));
                }
            }
            if let Some(start) = word_start {
                builder.token(
                    "WORD",
                    TextRange::new(line_start + start, line_start + content.len()),
                );
            }
            builder.finish_node(line_start + content.len());
            line_start += line.len();
        }
        builder.finish_node(text.len());
        builder.finish()
    }
}

impl SyntaxProvider for PlainTextSyntaxProvider {
    fn file_view(
        &self,
        snapshot: &DocumentSnapshot,
        language: &str,
    ) -> Result<FileView, AnalysisError> {
        Ok(FileView::single(
            language,
            Arc::new(Self::build(&snapshot.text())),
        ))
    }
}
