//! Rootward pulling. A block nested in an expression leaves its result
//! behind, as a constant or a temporary, and its statements move into the
//! closest enclosing block, right before whatever used the result.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, DiagnosticValue, MessageTemplate},
    frontend::Span,
    middle::{
        flow::{MaximalPaths, PathOptions},
        tree::{
            BlockFlow, Edge, NodeId, NodeKind, Tree,
            control_flow::{
                CheckPosition, ChildRef, ControlFlow, If, Jump, JumpKind, JumpSpecifier, Labeled,
                StmtBlock,
            },
            name::Name,
            value::{Builtin, Value},
            visit,
        },
        ty::Type,
        weave::{
            Weaver, is_left_hand_side,
            structure::{insert_after_stmt, insert_before_stmt, prefix_block_with, structure_block},
            under_same_root,
        },
    },
};

/// What a pulled block leaves behind in place of itself
#[derive(Debug, Clone, PartialEq)]
enum BlockResult {
    /// Every way out of the block assigns this temporary last
    Name(Name),
    /// Every way out of the block ends with this value, as the statements
    /// `ends`
    Known { value: Value, ends: Vec<ChildRef> },
}

impl<S: DiagnosticSink> Weaver<'_, S> {
    /// Walks post-order, without entering nested function bodies
    pub(super) fn pull_rootwards(&mut self, node: NodeId) {
        let mut index = 0;

        // Pulling may add children to `node` or splice new ones in front of
        // the next one, so re-find the next child after each step
        while index < self.tree.children(node).len() {
            let next = self.tree.children(node).get(index + 1).copied();

            if under_same_root(self.tree, node, index) {
                let child = self.tree.child(node, index);
                self.pull_rootwards(child);
            }

            index = match next {
                Some(next) if self.tree.children(node).get(index + 1) == Some(&next) => index + 1,
                Some(next) => self
                    .tree
                    .children(node)
                    .iter()
                    .position(|c| *c == next)
                    .unwrap_or(index + 1),
                None => index + 1,
            };
        }

        if !self.tree.is_block(node) {
            return;
        }

        structure_block(self.tree, node);

        if !self.can_move_rootwards(node) {
            return;
        }

        let Some(edge) = self.tree.edge_of(node) else {
            return;
        };

        let result = if self.result_may_be_used(node) {
            self.store_block_result(node)
        } else {
            None
        };

        let span = self.tree.span(node);
        let replacement = match result {
            Some(BlockResult::Name(name)) => {
                let read = self.tree.add_right_name(span, name);
                self.tree.node_mut(read).ty = self.tree.ty(node).cloned();
                read
            }
            Some(BlockResult::Known { value, ends }) => {
                // The value lives on in place of the block
                if let Some(flow) = self.tree.structured_flow_mut(node) {
                    flow.remove_stmts(&ends);
                }
                self.tree.add_value(span, value)
            }
            None => self.tree.add_void(span),
        };

        debug!(block = ?node, parent = ?edge.parent, index = edge.index, "pulling block");

        self.tree.replace(edge, replacement);
        self.pull_before_index(node, edge.parent, edge.index);
    }

    fn can_move_rootwards(&self, block: NodeId) -> bool {
        if block == self.root {
            return false;
        }

        let Some(edge) = self.tree.edge_of(block) else {
            return false;
        };

        // A function body stays in its function, and we cannot store a name
        // being assigned in a temporary
        under_same_root(self.tree, edge.parent, edge.index)
            && !is_left_hand_side(self.tree, edge.parent, edge.index)
    }

    /// Only the last child of a linear block is its result
    fn result_may_be_used(&self, block: NodeId) -> bool {
        let Some(edge) = self.tree.edge_of(block) else {
            return true;
        };

        !self.tree.is_linear_block(edge.parent)
            || edge.index + 1 == self.tree.children(edge.parent).len()
    }

    fn pull_before_index(&mut self, pulled: NodeId, parent: NodeId, index: usize) {
        match self.tree.kind(parent) {
            NodeKind::Block(_) => self.stitch(parent, pulled, index),
            // Calls run after their arguments, declarations after their
            // metadata and functions after their formals' defaults
            NodeKind::Call | NodeKind::Decl | NodeKind::Fun => {
                self.swap_before_and_keep_sneaking(parent, pulled, index)
            }
            NodeKind::Esc
            | NodeKind::LeftName(_)
            | NodeKind::RightName(_)
            | NodeKind::Value(_)
            | NodeKind::Stay => {
                trace!(parent = ?parent, "block left where pulling cannot continue");
            }
        }
    }

    /// The pulled block now runs before `parent`. Siblings to the left of
    /// the block ran before it, so they are captured in temporaries first.
    fn swap_before_and_keep_sneaking(&mut self, parent: NodeId, pulled: NodeId, index: usize) {
        let written = names_written(self.tree, pulled);
        let mut prefix = Vec::new();

        for sibling_index in 0..index {
            if !should_extract(self.tree, parent, sibling_index, &written) {
                continue;
            }

            let sibling = self.tree.child(parent, sibling_index);

            // Only the metadata of a declaration is evaluated
            if matches!(self.tree.kind(sibling), NodeKind::Decl) {
                let values = (2..self.tree.children(sibling).len()).step_by(2);

                for value_index in values {
                    if should_extract(self.tree, sibling, value_index, &written) {
                        prefix.push(self.capture(Edge::new(sibling, value_index)));
                    }
                }

                continue;
            }

            prefix.push(self.capture(Edge::new(parent, sibling_index)));
        }

        prefix_block_with(self.tree, pulled, prefix);

        // `parent` is not a block so it is not the root
        if let Some(edge) = self.tree.edge_of(parent) {
            self.pull_before_index(pulled, edge.parent, edge.index);
        }
    }

    /// Replaces the value at `edge` with a read of a fresh temporary,
    /// returning the assignment that initializes it
    fn capture(&mut self, edge: Edge) -> NodeId {
        let value = self.tree.child_at(edge);
        let span = self.tree.span(value);
        let alias = self.allocate(span, "t");

        let read = self.tree.add_right_name(span, alias);
        self.tree.node_mut(read).ty = self.tree.ty(value).cloned();
        self.tree.replace(edge, read);

        self.tree.add_assignment(span, alias, value)
    }

    /// Works out the block's result from the statements it can end with
    fn store_block_result(&mut self, block: NodeId) -> Option<BlockResult> {
        structure_block(self.tree, block);

        let (ends, missing) = terminal_expressions(self.tree, block);
        let end_node = |tree: &Tree, end: &ChildRef| tree.children(block).get(end.index).copied();

        if !missing {
            let known = same_for_all(&ends, |end| {
                end_node(self.tree, end).and_then(|n| self.tree.value(n).cloned())
            });
            if let Some(value) = known {
                return Some(BlockResult::Known { value, ends });
            }

            let existing = same_for_all(&ends, |end| {
                end_node(self.tree, end)
                    .and_then(|n| self.tree.assignment_parts(n))
                    .map(|(name, _)| name)
            });
            if let Some(name) = existing.filter(Name::is_temporary) {
                return Some(BlockResult::Name(name));
            }
        }

        let first = ends.first()?;
        let span = end_node(self.tree, first).map_or(self.tree.span(block), |n| self.tree.span(n));
        let result = self.allocate(span, "t");

        for end in &ends {
            self.assign_end(block, *end, result);
        }

        if missing {
            let void = self.tree.add_void(span.left_edge());
            let initial = self.tree.add_assignment(span.left_edge(), result, void);
            prefix_block_with(self.tree, block, vec![initial]);
        }

        trace!(block = ?block, result = %result, ends = ends.len(), missing, "stored block result");

        Some(BlockResult::Name(result))
    }

    /// Rewrites the terminal statement `end` of `block` to assign `result`
    fn assign_end(&mut self, block: NodeId, end: ChildRef, result: Name) {
        let tree = &mut *self.tree;
        let Some(node) = tree.children(block).get(end.index).copied() else {
            return;
        };
        let span = tree.span(node);

        // Statements that produce no value are followed by the one they
        // leave behind. An assignment produces the name it assigns.
        let produced = match tree.kind(node) {
            NodeKind::Block(_) | NodeKind::Decl | NodeKind::Stay => {
                Some(tree.add_void(span.right_edge()))
            }
            _ => tree.assignment_parts(node).map(|(name, value)| {
                let read = tree.add_right_name(span.right_edge(), name);
                tree.node_mut(read).ty = tree.ty(value).cloned();
                read
            }),
        };

        let end = match produced {
            Some(produced) => {
                let index = tree.push_child(block, produced);
                let produced = ChildRef::new(index);
                insert_after_stmt(tree, block, end, ControlFlow::Stmt(produced));
                produced
            }
            None => end,
        };

        let value = tree.child(block, end.index);
        tree.free(value);
        let assignment = tree.add_assignment(span, result, value);
        let assigned = ChildRef::new(tree.push_child(block, assignment));

        if let Some(flow) = tree.structured_flow_mut(block) {
            flow.map_refs(&mut |r| if r == end { assigned } else { r });
        }
    }

    /// Splices the statements of `pulled` into `outer` right before the
    /// flow element referring to the child at `index`
    fn stitch(&mut self, outer: NodeId, pulled: NodeId, index: usize) {
        structure_block(self.tree, outer);

        let target = ChildRef::new(index);
        let (mut statements, mut conditions) = (0, 0);

        if let Some(flow) = self.tree.structured_flow(outer) {
            flow.for_each_ref(&mut |r, is_condition| match (r == target, is_condition) {
                (true, true) => conditions += 1,
                (true, false) => statements += 1,
                _ => {}
            });
        }

        debug!(outer = ?outer, pulled = ?pulled, index, statements, conditions, "stitching");

        if statements > 1 || conditions > 1 || (statements > 0 && conditions > 0) {
            self.report_malformed(outer, target, statements > 0);
        }

        if statements > 0 {
            let remapped = self.remap(pulled, outer);
            insert_before_stmt(self.tree, outer, target, remapped);
        } else if conditions > 0 {
            self.stitch_before_condition(outer, pulled, target);
        } else {
            // Nothing reaches the result, so nothing reaches the statements
            trace!(pulled = ?pulled, "unreachable block dropped");
        }
    }

    fn stitch_before_condition(&mut self, outer: NodeId, pulled: NodeId, target: ChildRef) {
        let remapped = self.remap(pulled, outer);

        let Some(mut flow) = self.tree.structured_flow(outer).cloned() else {
            return;
        };
        let Some((stmts, position)) = flow.find_condition_mut(target) else {
            return;
        };

        if matches!(stmts.stmts[position], ControlFlow::If(_)) {
            stmts.stmts.splice(position..position, remapped);
            self.tree.set_flow(outer, BlockFlow::Structured(flow));
            return;
        }

        match &mut stmts.stmts[position] {
            ControlFlow::Loop(lp) => {
                // `while (c) { body }` -> `while (true) { prefix; if (!c) break; body }`
                invert_condition(self.tree, Edge::new(outer, target.index));

                let span = self.tree.span(self.tree.child(outer, target.index));
                let always = self.tree.add_value(span.left_edge(), Value::Bool(true));
                lp.condition = ChildRef::new(self.tree.push_child(outer, always));

                let guard = ControlFlow::If(If {
                    condition: target,
                    then_clause: StmtBlock::new(vec![ControlFlow::Jump(Jump {
                        kind: JumpKind::Break,
                        target: JumpSpecifier::Default,
                    })]),
                    else_clause: StmtBlock::default(),
                });

                match lp.check_position {
                    CheckPosition::Left => {
                        let before_body = remapped.into_iter().chain([guard]);
                        lp.body.stmts.splice(0..0, before_body);
                    }
                    CheckPosition::Right => {
                        // A `continue` in the old body has to land before
                        // the prefix rather than at the condition
                        let break_label = self.names.temporary("continue");
                        let body = std::mem::take(&mut lp.body);

                        let wrapped = ControlFlow::Labeled(Labeled {
                            break_label,
                            continue_label: Some(lp.label.unwrap_or(break_label)),
                            stmts: body,
                        });

                        lp.body = StmtBlock::new(
                            std::iter::once(wrapped)
                                .chain(remapped)
                                .chain([guard])
                                .collect(),
                        );
                    }
                }
            }
            _ => return,
        }

        self.tree.set_flow(outer, BlockFlow::Structured(flow));
    }

    /// Moves the children `pulled` refers to into `outer`, returning the
    /// flow of `pulled` rewritten to refer to them there
    fn remap(&mut self, pulled: NodeId, outer: NodeId) -> Vec<ControlFlow> {
        let mut flow = self
            .tree
            .structured_flow(pulled)
            .cloned()
            .unwrap_or_else(|| StmtBlock::sequential(self.tree.children(pulled).len()));

        let mut moved = HashMap::new();

        for child in flow.refs() {
            if moved.contains_key(&child) {
                continue;
            }

            let Some(node) = self.tree.children(pulled).get(child.index).copied() else {
                continue;
            };

            self.tree.free(node);
            let index = self.tree.push_child(outer, node);
            moved.insert(child, ChildRef::new(index));
        }

        flow.map_refs(&mut |r| moved.get(&r).copied().unwrap_or(r));
        flow.stmts
    }

    /// Replaces the child `target` refers to with an error, and gives every
    /// reference but one, a statement if `keep_statement`, an error of its own
    fn report_malformed(&mut self, outer: NodeId, target: ChildRef, keep_statement: bool) {
        let child = self.tree.child(outer, target.index);
        let span = self.tree.span(child);
        let ty = self.tree.ty(child).cloned();

        let diagnostic = Diagnostic::error(
            MessageTemplate::MalformedFlow,
            span,
            vec![DiagnosticValue::Span(span)],
        );
        let message = diagnostic.message(None);

        let error = error_node(self.tree, span, &message, ty.clone());
        self.tree.replace(Edge::new(outer, target.index), error);

        if let Some(mut flow) = self.tree.structured_flow(outer).cloned() {
            let tree = &mut *self.tree;
            let mut kept = false;

            flow.map_refs_by_role(&mut |r, is_condition| {
                if r != target {
                    return r;
                }
                if !kept && is_condition != keep_statement {
                    kept = true;
                    return r;
                }

                let extra = error_node(tree, span, &message, ty.clone());
                ChildRef::new(tree.push_child(outer, extra))
            });

            tree.set_flow(outer, BlockFlow::Structured(flow));
        }

        self.sink.report(diagnostic);
    }
}

fn error_node(tree: &mut Tree, span: Span, message: &str, ty: Option<Type>) -> NodeId {
    let message = tree.add_value(span, Value::Str(message.to_owned()));
    let error = tree.add_builtin_call(span, Builtin::Error, vec![message]);
    tree.node_mut(error).ty = ty;
    error
}

/// The children `block` may end with, as in the last statement evaluated
/// before control leaves it normally, and whether some way out runs no
/// statement at all
fn terminal_expressions(tree: &Tree, block: NodeId) -> (Vec<ChildRef>, bool) {
    let options = PathOptions {
        assume_failure_can_happen: true,
        ..PathOptions::default()
    };
    let paths = MaximalPaths::build(tree, block, options);

    let Some(exit) = paths.exit else {
        return (Vec::new(), false);
    };

    let mut ends = Vec::new();
    let mut missing = false;
    let mut visited = BTreeSet::from([exit]);
    let mut queue = vec![exit];

    while let Some(index) = queue.pop() {
        let path = &paths[index];

        if let Some(last) = path.elements.iter().rev().find(|e| !e.is_condition) {
            if !ends.contains(&last.child) {
                ends.push(last.child);
            }
            continue;
        }

        if index == paths.entry() {
            missing = true;
        }

        for preceder in &path.preceders {
            if visited.insert(preceder.path) {
                queue.push(preceder.path);
            }
        }
    }

    ends.sort();
    (ends, missing)
}

/// `Some(x)` when `f` gives the same `Some(x)` for every item
fn same_for_all<T, U: PartialEq>(items: &[T], f: impl Fn(&T) -> Option<U>) -> Option<U> {
    let mut mapped = items.iter().map(f);
    let first = mapped.next()??;

    for other in mapped {
        if other.as_ref() != Some(&first) {
            return None;
        }
    }

    Some(first)
}

/// Names assigned anywhere under `node`
fn names_written(tree: &Tree, node: NodeId) -> BTreeSet<Name> {
    let mut written = BTreeSet::new();

    visit::walk_pre_order(tree, node, &mut |tree, n| {
        if let Some(name) = tree.left_name(n) {
            written.insert(name);
        }
        true
    });

    written
}

/// Whether the `index`th child of `parent` has to be evaluated into a
/// temporary before a block pulled out of a later sibling runs
fn should_extract(tree: &Tree, parent: NodeId, index: usize, written: &BTreeSet<Name>) -> bool {
    let child = tree.child(parent, index);

    if is_left_hand_side(tree, parent, index) {
        return false;
    }

    match tree.kind(child) {
        NodeKind::Stay | NodeKind::Value(_) | NodeKind::Fun | NodeKind::LeftName(_) => false,
        // Reading a name the pulled block does not assign gives the same
        // value before and after it
        NodeKind::RightName(name) => written.contains(name),
        NodeKind::Call => !matches!(
            tree.callee_builtin(child),
            Some(Builtin::GetStatic | Builtin::Bind)
        ),
        NodeKind::Block(_) | NodeKind::Decl | NodeKind::Esc => true,
    }
}

/// `c` becomes `!c`, and `!c` becomes `c`
fn invert_condition(tree: &mut Tree, edge: Edge) {
    let condition = tree.child_at(edge);

    if tree.is_call_to(condition, Builtin::Not) && tree.children(condition).len() == 2 {
        let operand = tree.child(condition, 1);
        tree.free(operand);
        tree.replace(edge, operand);
        return;
    }

    let span = tree.span(condition);
    tree.free(condition);
    let not = tree.add_builtin_call(span, Builtin::Not, vec![condition]);
    tree.node_mut(not).ty = Some(Type::BOOL);
    tree.replace(edge, not);
}
