use crate::middle::tree::{NodeId, Tree};

/// Visits `root` and its descendants parent first. `visit` returns whether to
/// descend into the node's children.
pub fn walk_pre_order(
    tree: &Tree,
    root: NodeId,
    visit: &mut impl FnMut(&Tree, NodeId) -> bool,
) {
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if visit(tree, node) {
            stack.extend(tree.children(node).iter().rev());
        }
    }
}

/// Collects `root` and its descendants children first. Children of nodes
/// for which `descend` is false are skipped, the node itself is not.
pub fn post_order(
    tree: &Tree,
    root: NodeId,
    descend: impl Fn(&Tree, NodeId) -> bool,
) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded || !descend(tree, node) {
            order.push(node);
            continue;
        }

        stack.push((node, true));
        stack.extend(tree.children(node).iter().rev().map(|c| (*c, false)));
    }

    order
}

/// Descends everywhere except into function literals other than `root`
pub fn outside_nested_functions(root: NodeId) -> impl Fn(&Tree, NodeId) -> bool {
    move |tree, node| node == root || !tree.is_fun(node)
}
