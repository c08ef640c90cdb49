//! Splits the elements of a file into "inside the priority range" and "outside".
//!
//! Traversal is depth-first and every element is recorded only after all of its children, so
//! in both output lists a parent always follows its descendants. Consumers rely on that order
//! to process elements bottom-up.

use crate::syntax::{FileView, NodeId, SyntaxRoot, SyntaxTree};
use crate::text_range::TextRange;
use std::collections::HashSet;
use std::sync::Arc;

/// Veto on descending into a node's children. Returning `false` skips the subtree below the node
/// (the node itself is still recorded).
pub type ElementFilter = Arc<dyn Fn(&dyn SyntaxTree, NodeId) -> bool + Send + Sync>;

/// Result of dividing one language root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DividedElements {
    /// Index of the root in the [`FileView`].
    pub root_index: usize,
    /// Elements fully inside the priority range, children first.
    pub inside: Vec<NodeId>,
    /// Ranges of `inside`, parallel to it.
    pub inside_ranges: Vec<TextRange>,
    /// Every other recorded element, children first.
    pub outside: Vec<NodeId>,
    /// Ranges of `outside`, parallel to it.
    pub outside_ranges: Vec<TextRange>,
}

impl DividedElements {
    /// Total number of recorded elements.
    pub fn len(&self) -> usize {
        self.inside.len() + self.outside.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.inside.is_empty() && self.outside.is_empty()
    }
}

/// Divides element trees. Holds the registered element filters.
#[derive(Clone, Default)]
pub struct Divider {
    filters: Vec<ElementFilter>,
}

impl Divider {
    /// Create a divider without filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descend filter.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&dyn SyntaxTree, NodeId) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Divide every root of `view` accepted by `root_filter`.
    pub fn divide<R>(
        &self,
        view: &FileView,
        restrict: TextRange,
        priority: TextRange,
        include_parents: bool,
        root_filter: R,
    ) -> Vec<DividedElements>
    where
        R: Fn(&SyntaxRoot) -> bool,
    {
        view.roots
            .iter()
            .enumerate()
            .filter(|(_, root)| root_filter(root))
            .map(|(index, root)| {
                let mut divided =
                    self.divide_tree(root.tree.as_ref(), restrict, priority, include_parents);
                divided.root_index = index;
                divided
            })
            .collect()
    }

    /// Divide a single tree.
    ///
    /// An element is recorded when its range lies within `restrict` (boundaries included). It
    /// goes to `inside` iff its range is also contained in `priority`. The root is always
    /// recorded in `outside`. With `include_parents`, the ancestors of the restricted region
    /// (excluding the root) are appended to `outside`.
    pub fn divide_tree(
        &self,
        tree: &dyn SyntaxTree,
        restrict: TextRange,
        priority: TextRange,
        include_parents: bool,
    ) -> DividedElements {
        let mut out = DividedElements::default();
        let root = tree.root();
        let (start, end) = (restrict.start(), restrict.end());

        // (node, children already pushed)
        let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
        let mut children = Vec::new();
        while let Some((node, expanded)) = stack.pop() {
            let range = tree.text_range(node);
            if !expanded {
                if range.end() < start || range.start() > end {
                    continue;
                }
                stack.push((node, true));
                if self.may_descend(tree, node) {
                    children.clear();
                    children.extend(tree.children(node));
                    stack.extend(children.iter().rev().map(|c| (*c, false)));
                }
                continue;
            }

            if !restrict.contains_range(range) {
                continue;
            }
            if node != root && priority.contains_range(range) {
                out.inside.push(node);
                out.inside_ranges.push(range);
            } else {
                out.outside.push(node);
                out.outside_ranges.push(range);
            }
        }

        if include_parents {
            let recorded: HashSet<NodeId> = out.outside.iter().copied().collect();
            let mut parent = Some(common_parent(tree, restrict));
            while let Some(node) = parent {
                if node == root {
                    break;
                }
                if !recorded.contains(&node) && !out.inside.contains(&node) {
                    out.outside.push(node);
                    out.outside_ranges.push(tree.text_range(node));
                }
                parent = tree.parent(node);
            }
        }
        out
    }

    fn may_descend(&self, tree: &dyn SyntaxTree, node: NodeId) -> bool {
        self.filters.iter().all(|filter| filter(tree, node))
    }
}

impl std::fmt::Debug for Divider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Divider")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Deepest node whose range contains `range`.
fn common_parent(tree: &dyn SyntaxTree, range: TextRange) -> NodeId {
    let mut node = tree.root();
    'descend: loop {
        for child in tree.children(node) {
            if tree.text_range(child).contains_range(range) {
                node = child;
                continue 'descend;
            }
        }
        return node;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{ArenaTree, PlainTextSyntaxProvider, SyntaxTreeBuilder};

    fn ranges(tree: &ArenaTree, ids: &[NodeId]) -> Vec<(String, TextRange)> {
        ids.iter()
            .map(|id| (tree.kind(*id).to_string(), tree.text_range(*id)))
            .collect()
    }

    // "aa bb\ncc dd\nee"
    fn sample() -> ArenaTree {
        PlainTextSyntaxProvider::build("aa bb\ncc dd\nee")
    }

    #[test]
    fn test_whole_file_children_first() {
        let tree = sample();
        let divider = Divider::new();
        let divided = divider.divide_tree(&tree, TextRange::new(0, 14), TextRange::new(6, 11), false);

        assert_eq!(
            ranges(&tree, &divided.inside),
            vec![
                ("WORD".to_string(), TextRange::new(6, 8)),
                ("WORD".to_string(), TextRange::new(9, 11)),
                ("LINE".to_string(), TextRange::new(6, 11)),
            ]
        );
        let outside = ranges(&tree, &divided.outside);
        assert_eq!(outside.len(), 6);
        assert_eq!(outside[2], ("LINE".to_string(), TextRange::new(0, 5)));
        assert_eq!(outside.last().unwrap().0, "FILE");
        assert_eq!(divided.inside_ranges[2], TextRange::new(6, 11));
    }

    #[test]
    fn test_root_is_forced_outside() {
        let tree = sample();
        let divided =
            Divider::new().divide_tree(&tree, TextRange::new(0, 14), TextRange::new(0, 14), false);
        assert_eq!(divided.outside, vec![tree.root()]);
        assert_eq!(divided.inside.len(), 8);
    }

    #[test]
    fn test_partial_restrict_with_parents() {
        let tree = sample();
        let divided =
            Divider::new().divide_tree(&tree, TextRange::new(7, 11), TextRange::new(0, 0), true);
        // Only the second word is fully inside the restrict range; its line is appended as a
        // parent, the file root is not.
        assert_eq!(
            ranges(&tree, &divided.outside),
            vec![
                ("WORD".to_string(), TextRange::new(9, 11)),
                ("LINE".to_string(), TextRange::new(6, 11)),
            ]
        );
        assert!(divided.inside.is_empty());
    }

    #[test]
    fn test_filter_skips_children_but_records_node() {
        let tree = sample();
        let divider = Divider::new().with_filter(|tree, node| tree.kind(node) != "LINE");
        let divided =
            divider.divide_tree(&tree, TextRange::new(0, 14), TextRange::new(0, 0), false);
        assert_eq!(
            ranges(&tree, &divided.outside)
                .into_iter()
                .map(|(kind, _)| kind)
                .collect::<Vec<_>>(),
            vec!["LINE", "LINE", "LINE", "FILE"]
        );
    }

    #[test]
    fn test_root_filter_selects_languages() {
        let base = Arc::new(sample());
        let mut builder = SyntaxTreeBuilder::new();
        builder.start_node("INJECTED", 6);
        builder.finish_node(11);
        let injected = Arc::new(builder.finish());
        let view = FileView::single("text", base).with_root("sql", injected);

        let divided = Divider::new().divide(
            &view,
            TextRange::new(0, 14),
            TextRange::new(0, 14),
            false,
            |root| root.language != "text",
        );
        assert_eq!(divided.len(), 1);
        assert_eq!(divided[0].root_index, 1);
        assert_eq!(divided[0].len(), 1);
    }
}
