//! Nested tree rendering of a taxonomy view.

use super::{TaxonomyNode, TaxonomyView, ViewRow};

/// Resolves the flat row arena into root nodes with nested children.
///
/// Roots and siblings come out in insertion order. The walk keeps its own
/// stack, so the depth of the forest is bounded by memory only.
pub fn build_tree(view: &TaxonomyView) -> Vec<TaxonomyNode> {
    let mut roots: Vec<&ViewRow> = view.rows.values().filter(|r| r.parent.is_none()).collect();
    roots.sort_by_key(|row| row.ordinal);

    roots
        .into_iter()
        .filter_map(|row| build_subtree(view, row))
        .collect()
}

/// A node under construction and the index of its next unvisited child.
struct Frame<'v> {
    row: &'v ViewRow,
    node: TaxonomyNode,
    next_child: usize,
}

impl<'v> Frame<'v> {
    fn new(row: &'v ViewRow) -> Self {
        Self {
            row,
            node: leaf(row),
            next_child: 0,
        }
    }
}

/// Post-order walk: a node is attached to its parent once all of its
/// children have been attached to it.
fn build_subtree<'v>(view: &'v TaxonomyView, root: &'v ViewRow) -> Option<TaxonomyNode> {
    let mut stack = vec![Frame::new(root)];

    while let Some(mut frame) = stack.pop() {
        let row = frame.row;
        if let Some(child_id) = row.children.get(frame.next_child) {
            frame.next_child += 1;
            stack.push(frame);
            if let Some(child) = view.row(child_id) {
                stack.push(Frame::new(child));
            }
            continue;
        }

        match stack.last_mut() {
            Some(parent) => parent.node.children.push(frame.node),
            None => return Some(frame.node),
        }
    }
    None
}

fn leaf(row: &ViewRow) -> TaxonomyNode {
    TaxonomyNode {
        row_id: row.row_id.clone(),
        value: row.value.clone(),
        description: row.description.clone(),
        aliases: row.aliases.clone(),
        keywords: row.keywords.clone(),
        dimension_src_hints: row.dimension_src_hints.clone(),
        children: Vec::new(),
    }
}
