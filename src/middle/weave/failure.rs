//! Makes failure checks explicit.
//!
//! `hs(fail, op)` records in `fail` whether `op` failed. After this step it
//! sits in a block that goes on to check the flag:
//!
//! ```text
//! { hs(fail, op); if (fail) { bubble(); } }
//! ```

use tracing::trace;

use crate::{
    diagnostics::DiagnosticSink,
    middle::{
        tree::{
            BlockFlow, Edge, NodeId, NodeKind, Tree,
            control_flow::{ChildRef, ControlFlow, If, JumpKind, StmtBlock},
            name::Name,
            value::Builtin,
        },
        weave::{Weaver, under_same_root},
    },
};

impl<S: DiagnosticSink> Weaver<'_, S> {
    /// Walks post-order, without entering nested function bodies
    pub(super) fn check_failure_conditions(&mut self, node: NodeId) {
        for index in 0..self.tree.children(node).len() {
            if under_same_root(self.tree, node, index) {
                let child = self.tree.child(node, index);
                self.check_failure_conditions(child);
            }
        }

        // `x = bubble()` never assigns anything
        if let Some((_, value)) = self.tree.assignment_parts(node) {
            if let (true, Some(edge)) = (
                self.tree.is_call_to(value, Builtin::Bubble),
                self.tree.edge_of(node),
            ) {
                trace!(node = ?node, "assignment of bubble() collapsed");
                self.tree.free(value);
                self.tree.replace(edge, value);
            }
            return;
        }

        if !self.tree.is_call_to(node, Builtin::HandlerScope) {
            return;
        }

        let Some(flag) = self
            .tree
            .children(node)
            .get(1)
            .and_then(|flag| self.tree.left_name(*flag))
        else {
            return;
        };

        if !(self.options.failure_condition_needs_checking)(self.tree, node) {
            return;
        }

        let Some(edge) = self.tree.edge_of(node) else {
            return;
        };

        if self.is_already_checked(node, flag) {
            return;
        }

        self.expand_check(edge, node, flag);
    }

    fn expand_check(&mut self, edge: Edge, call: NodeId, flag: Name) {
        let tree = &mut *self.tree;
        let span = tree.span(call);
        let right = span.right_edge();

        tree.free(call);
        let flag_read = tree.add_right_name(right, flag);
        let bubble = tree.add_builtin_call(right, Builtin::Bubble, Vec::new());

        let flow = StmtBlock::new(vec![
            ControlFlow::Stmt(ChildRef::new(0)),
            ControlFlow::If(If {
                condition: ChildRef::new(1),
                then_clause: StmtBlock::new(vec![ControlFlow::Stmt(ChildRef::new(2))]),
                else_clause: StmtBlock::default(),
            }),
        ]);

        let ty = tree.ty(call).cloned();
        let block = tree.add_typed(
            span,
            NodeKind::Block(BlockFlow::Structured(flow)),
            ty,
            vec![call, flag_read, bubble],
        );
        tree.replace(edge, block);

        trace!(call = ?call, flag = %flag, "failure check expanded");
    }

    /// Whether the statement computing `call` is already followed by a check
    /// of `flag`, as it is in woven output
    fn is_already_checked(&self, call: NodeId, flag: Name) -> bool {
        let tree = &*self.tree;
        let mut stmt = call;

        while let Some(parent) = tree.parent(stmt) {
            match tree.assignment_parts(parent) {
                Some((_, value)) if value == stmt => stmt = parent,
                _ => break,
            }
        }

        let Some(edge) = tree.edge_of(stmt) else {
            return false;
        };

        tree.structured_flow(edge.parent).is_some_and(|flow| {
            followed_by_check(tree, edge.parent, flow, ChildRef::new(edge.index), flag)
        })
    }
}

fn followed_by_check(
    tree: &Tree,
    block: NodeId,
    stmts: &StmtBlock,
    target: ChildRef,
    flag: Name,
) -> bool {
    let child = |r: ChildRef| tree.children(block).get(r.index).copied();

    if let Some(index) = stmts
        .stmts
        .iter()
        .position(|s| *s == ControlFlow::Stmt(target))
    {
        let Some(ControlFlow::If(check)) = stmts.stmts.get(index + 1) else {
            return false;
        };

        let tests_flag = child(check.condition).and_then(|c| tree.right_name(c)) == Some(flag);
        let bubbles = match check.then_clause.stmts.as_slice() {
            [ControlFlow::Stmt(r)] => {
                child(*r).is_some_and(|c| tree.is_call_to(c, Builtin::Bubble))
            }
            [ControlFlow::Jump(jump)] => jump.kind == JumpKind::Break,
            _ => false,
        };

        return tests_flag && bubbles && check.else_clause.is_empty();
    }

    stmts.stmts.iter().any(|stmt| {
        stmt.clauses()
            .into_iter()
            .any(|clause| followed_by_check(tree, block, clause, target, flag))
    })
}
