//! Collapses linear blocks like `{ void; void; x }` down to `x`. Hoisted
//! declarations and expanded macros leave `void`s like these behind, and
//! weaving them would only cost temporaries.

use tracing::trace;

use crate::{
    diagnostics::DiagnosticSink,
    middle::{
        tree::{BlockFlow, Edge, NodeId, NodeKind, Tree, control_flow::ControlFlow, value::Builtin},
        weave::{Weaver, under_same_root},
    },
};

impl<S: DiagnosticSink> Weaver<'_, S> {
    /// Simplifies the blocks under `container`, but never `container` itself
    pub(super) fn simplify_blocks(&mut self, container: NodeId) {
        for index in 0..self.tree.children(container).len() {
            if !under_same_root(self.tree, container, index) {
                continue;
            }

            let node = self.tree.child(container, index);
            self.simplify_blocks(node);

            let Some(BlockFlow::Linear { label }) = self.tree.block_flow(node) else {
                continue;
            };
            let label = *label;

            for statement in (0..self.tree.children(node).len()).rev() {
                let child = self.tree.child(node, statement);
                let noop = self.tree.value(child).is_some() || is_noop(self.tree, child);

                if noop && !may_be_result(self.tree, node, statement) {
                    self.tree.remove_child(node, statement);
                }
            }

            if label.is_none() && self.tree.children(node).len() == 1 {
                let only = self.tree.remove_child(node, 0);
                self.tree.replace(Edge::new(container, index), only);
                trace!(block = ?node, "single statement block collapsed");
            }
        }
    }
}

/// Whether the `index`th child of a linear block may be its result. The
/// last child is, unless something jumps out first. Any other child only is
/// when the one after it may jump out.
fn may_be_result(tree: &Tree, block: NodeId, index: usize) -> bool {
    match tree.children(block).get(index + 1) {
        None => true,
        Some(next) => may_jump_out(tree, *next),
    }
}

/// Whether evaluating `node` may transfer control somewhere other than to
/// whatever follows it
pub(crate) fn may_jump_out(tree: &Tree, node: NodeId) -> bool {
    if tree.is_call_to(node, Builtin::Bubble) {
        return true;
    }

    let children_may = || tree.children(node).iter().any(|c| may_jump_out(tree, *c));

    match tree.kind(node) {
        NodeKind::Block(BlockFlow::Structured(flow)) => flow.may_jump_out() || children_may(),
        NodeKind::Block(BlockFlow::Linear { .. })
        | NodeKind::Call
        | NodeKind::Decl
        | NodeKind::Esc => {
            children_may()
        }
        // Jumps do not cross function boundaries
        NodeKind::Fun => false,
        NodeKind::LeftName(_)
        | NodeKind::RightName(_)
        | NodeKind::Value(_)
        | NodeKind::Stay => false,
    }
}

/// `void`, or a block made up only of those
fn is_noop(tree: &Tree, node: NodeId) -> bool {
    if tree.is_void_value(node) {
        return true;
    }

    match tree.block_flow(node) {
        Some(BlockFlow::Linear { .. }) => tree.children(node).iter().all(|c| is_noop(tree, *c)),
        Some(BlockFlow::Structured(flow)) => flow.stmts.iter().all(|s| is_noop_flow(tree, node, s)),
        None => false,
    }
}

fn is_noop_flow(tree: &Tree, block: NodeId, flow: &ControlFlow) -> bool {
    match flow {
        ControlFlow::Stmt(child) => tree
            .children(block)
            .get(child.index)
            .is_some_and(|c| is_noop(tree, *c)),
        ControlFlow::StmtBlock(stmts) => stmts.stmts.iter().all(|s| is_noop_flow(tree, block, s)),
        ControlFlow::Labeled(labeled) => labeled
            .stmts
            .stmts
            .iter()
            .all(|s| is_noop_flow(tree, block, s)),
        ControlFlow::If(_)
        | ControlFlow::Loop(_)
        | ControlFlow::Jump(_)
        | ControlFlow::OrElse(_) => {
            false
        }
    }
}
