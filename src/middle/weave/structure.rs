//! Flow surgery shared by the weaver and cleanup

use tracing::trace;

use crate::middle::tree::{
    BlockFlow, NodeId, Tree,
    control_flow::{ChildRef, ControlFlow, Jump, JumpKind, JumpSpecifier, Labeled, StmtBlock},
    name::JumpLabel,
    value::Builtin,
    visit,
};

/// Gives a linear block a structured flow that runs its children in order.
/// A label on the block becomes a [`Labeled`] around the statements.
pub fn structure_block(tree: &mut Tree, block: NodeId) {
    let label = match tree.block_flow(block) {
        Some(BlockFlow::Linear { label }) => *label,
        _ => return,
    };

    let stmts = StmtBlock::sequential(tree.children(block).len());
    let flow = match label {
        Some(break_label) => StmtBlock::new(vec![ControlFlow::Labeled(Labeled {
            break_label,
            continue_label: None,
            stmts,
        })]),
        None => stmts,
    };

    tree.set_flow(block, BlockFlow::Structured(flow));
}

/// Makes detached `prefixes` run first in `block`, in order
pub fn prefix_block_with(tree: &mut Tree, block: NodeId, prefixes: Vec<NodeId>) {
    if prefixes.is_empty() {
        return;
    }

    if tree.is_linear_block(block) {
        for (offset, prefix) in prefixes.into_iter().enumerate() {
            tree.insert_child(block, offset, prefix);
        }
        return;
    }

    let stmts = prefixes
        .into_iter()
        .map(|prefix| ControlFlow::Stmt(ChildRef::new(tree.push_child(block, prefix))))
        .collect::<Vec<_>>();

    if let Some(flow) = tree.structured_flow_mut(block) {
        flow.stmts.splice(0..0, stmts);
    }
}

/// Turns `bubble()` statements inside an or-clause into breaks out of the
/// nearest one
pub fn evaporate_bubbles(tree: &mut Tree, root: NodeId) {
    let Some(mut flow) = tree.structured_flow(root).cloned() else {
        return;
    };

    chase_bubbles(tree, root, &mut flow, None);
    tree.set_flow(root, BlockFlow::Structured(flow));
}

fn chase_bubbles(
    tree: &Tree,
    root: NodeId,
    block: &mut StmtBlock,
    or_clause_label: Option<JumpLabel>,
) {
    for stmt in &mut block.stmts {
        match stmt {
            ControlFlow::Stmt(child) => {
                let child = *child;
                let bubbles = tree
                    .children(root)
                    .get(child.index)
                    .is_some_and(|node| tree.is_call_to(*node, Builtin::Bubble));

                if let (true, Some(label)) = (bubbles, or_clause_label) {
                    trace!(child = child.index, label = %label, "bubble evaporated");
                    *stmt = ControlFlow::Jump(Jump {
                        kind: JumpKind::Break,
                        target: JumpSpecifier::Named(label),
                    });
                }
            }
            ControlFlow::OrElse(or_else) => {
                let label = or_else.or_clause.break_label;
                chase_bubbles(tree, root, &mut or_else.or_clause.stmts, Some(label));
                chase_bubbles(tree, root, &mut or_else.else_clause, or_clause_label);
            }
            other => {
                for clause in other.clauses_mut() {
                    chase_bubbles(tree, root, clause, or_clause_label);
                }
            }
        }
    }
}

/// Replaces children of structured blocks that their flow never refers to
/// with `void`
pub fn trim_loose_threads(tree: &mut Tree, root: NodeId) {
    let mut blocks = Vec::new();
    visit::walk_pre_order(tree, root, &mut |tree, node| {
        if tree.structured_flow(node).is_some() {
            blocks.push(node);
        }
        true
    });

    for block in blocks {
        let referenced = tree
            .structured_flow(block)
            .map(|flow| flow.refs())
            .unwrap_or_default();

        for index in 0..tree.children(block).len() {
            let child = tree.child(block, index);
            if referenced.contains(&ChildRef::new(index)) || tree.is_void_value(child) {
                continue;
            }

            trace!(block = ?block, index, "trimmed loose thread");
            tree.free(child);
        }
    }
}

/// Adds `new` right after `Stmt(after)` in the flow of `block`
pub fn insert_after_stmt(
    tree: &mut Tree,
    block: NodeId,
    after: ChildRef,
    new: ControlFlow,
) -> bool {
    let Some((stmts, index)) = tree
        .structured_flow_mut(block)
        .and_then(|flow| flow.find_stmt_mut(after))
    else {
        return false;
    };

    stmts.stmts.insert(index + 1, new);
    true
}

/// Adds `new` right before `Stmt(before)` in the flow of `block`
pub fn insert_before_stmt(
    tree: &mut Tree,
    block: NodeId,
    before: ChildRef,
    new: Vec<ControlFlow>,
) -> bool {
    let Some((stmts, index)) = tree
        .structured_flow_mut(block)
        .and_then(|flow| flow.find_stmt_mut(before))
    else {
        return false;
    };

    stmts.stmts.splice(index..index, new);
    true
}
