use insight_core::{ArenaTree, SyntaxTreeBuilder, TextRange};
use tree_sitter::Tree;

/// Flatten a Tree-sitter tree into an [`ArenaTree`].
///
/// Every node is kept, anonymous ones included. `ERROR` nodes and zero-width `MISSING` nodes
/// are flagged as error nodes. The root is widened to `0..len` so it always covers the whole
/// document, even when the grammar skips leading or trailing trivia.
pub fn build_syntax_tree(tree: &Tree, len: usize) -> ArenaTree {
    let mut builder = SyntaxTreeBuilder::new();
    let mut cursor = tree.walk();

    let root = cursor.node();
    builder.start_node(root.kind(), 0);
    if root.is_error() {
        builder.mark_error();
    }
    if !cursor.goto_first_child() {
        builder.finish_node(len);
        return builder.finish();
    }

    let mut depth = 1usize;
    loop {
        let node = cursor.node();
        let range = TextRange::new(node.start_byte(), node.end_byte());
        if node.child_count() > 0 && cursor.goto_first_child() {
            builder.start_node(node.kind(), range.start());
            if node.is_error() {
                builder.mark_error();
            }
            depth += 1;
            continue;
        }

        if node.is_error() || node.is_missing() {
            builder.error_token(node.kind(), range);
        } else {
            builder.token(node.kind(), range);
        }

        // Climb until a sibling is found, closing every finished composite on the way.
        while !cursor.goto_next_sibling() {
            let climbed = cursor.goto_parent();
            depth -= 1;
            if !climbed || depth == 0 {
                builder.finish_node(len);
                return builder.finish();
            }
            builder.finish_node(cursor.node().end_byte());
        }
    }
}
