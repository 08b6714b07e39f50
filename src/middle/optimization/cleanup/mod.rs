//! Removes the temporaries weaving leaves behind where that does not change
//! what the program does.
//!
//! Each round summarizes the reads and writes of one body and tries the
//! strategies below in order. The first strategy with anything to do wins.
//! Its batch of edits is applied before the next round, because applying it
//! leaves the summary stale. The body is done when a round finds nothing.
//!
//! 1. split assignments of void-typed names into `e; x = void`
//! 2. drop reads at statement position
//! 3. collapse pairs of names connected by copies
//! 4. drop writes nothing reads
//! 5. collapse single copies of a temporary into a non-temporary
//! 6. inline temporaries at their only read when nothing in between cares
//! 7. inline `getStatic` reads
//! 8. drop declarations of names that are never used
//! 9. mark names `var` that rewriting left with more than one live write
//! 10. report reassignments of names that are not `var`

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, info_span};

use crate::{
    diagnostics::DiagnosticSink,
    error::{InternalError, InternalErrorKind, internal_error},
    frontend::Span,
    middle::{
        analysis::ReadsAndWrites,
        tree::{
            Edge, NodeId, NodeKind, Tree,
            control_flow::{ChildRef, ControlFlow},
            name::Name,
            value::{Builtin, MetadataKey, Value},
            visit,
        },
        ty::Type,
        weave::structure::{insert_before_stmt, structure_block},
    },
};

mod collapse;
mod sweep;

#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    /// Rounds per body before giving up with an internal error
    pub max_iterations: usize,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
enum Strategy {
    SimplifyVoidAssignments,
    EliminateNoopReads,
    CollapseWritesToSingleName,
    EliminateWritesUpstreamOfNothing,
    CollapseWritesLiveOnlyForAnAssignment,
    InlineAdjacentSingleReadWritePairs,
    InlineStaticReads,
    EliminateUnusedDeclarations,
    FixupVarAtEnd,
    FlagProblems,
}

/// What goes into a slot being replaced
#[derive(Debug, Clone)]
enum Replacement {
    Void,
    LeftName(Name),
    RightName(Name),
    /// Moves an existing subtree into the slot
    Replant(NodeId),
}

#[derive(Debug, Clone)]
enum Action {
    Replace { edge: Edge, with: Replacement },
    /// `x = e` becomes `e; x = void`. Refers to the assignment's statement.
    SplitAssignment { element: ChildRef },
    AddMetadata { decl: NodeId, key: MetadataKey },
}

#[derive(Debug, Clone)]
struct Edit {
    /// The code affected, for the edit log
    span: Span,
    description: String,
    action: Action,
}

impl Edit {
    fn replace(span: Span, description: String, edge: Edge, with: Replacement) -> Self {
        Self {
            span,
            description,
            action: Action::Replace { edge, with },
        }
    }

    fn kind(&self) -> &'static str {
        match self.action {
            Action::Replace { .. } => "replace",
            Action::SplitAssignment { .. } => "split",
            Action::AddMetadata { .. } => "metadata",
        }
    }
}

/// Cleans the module root and every function body under it
pub fn cleanup(
    tree: &mut Tree,
    options: &CleanupOptions,
    sink: &mut impl DiagnosticSink,
) -> Result<(), InternalError> {
    let root = tree.root();
    if !tree.is_block(root) {
        return Err(internal_error!(InternalErrorKind::NotABlock { node: root }));
    }

    let declared_types = declared_types(tree, root);

    for body in tree.bodies_innermost_first(root) {
        if !tree.is_block(body) {
            continue;
        }

        let cleaner = Cleaner {
            tree: &mut *tree,
            sink: &mut *sink,
            body,
            declared_types: &declared_types,
            may_need_var: BTreeSet::new(),
        };
        cleaner.run(options)?;
    }

    Ok(())
}

/// The declared type of each name declared exactly once under `root`
fn declared_types(tree: &Tree, root: NodeId) -> BTreeMap<Name, Option<Type>> {
    let mut types = BTreeMap::new();

    visit::walk_pre_order(tree, root, &mut |tree, node| {
        if let Some(parts) = tree.decl_parts(node) {
            let ty = tree
                .decl_type(node)
                .or_else(|| tree.ty(parts.name_node))
                .cloned();

            types
                .entry(parts.name)
                .and_modify(|seen: &mut Option<Type>| *seen = None)
                .or_insert(ty);
        }
        true
    });

    types
}

/// Names cleanup must keep. Beyond the body's inputs and output, these are
/// names visible outside the module, names the user wrote, and temporaries
/// declared with metadata that means something to later passes.
fn required_names(tree: &Tree, summary: &ReadsAndWrites) -> BTreeSet<Name> {
    let mut required = summary
        .input_names
        .iter()
        .copied()
        .chain(summary.output_name)
        .collect::<BTreeSet<_>>();

    for name in &summary.local_names {
        let is_required = match name {
            Name::Exported(_) | Name::Builtin(_) | Name::Source(_) => true,
            Name::Temporary { .. } => summary.declarations_of(*name).iter().any(|decl| {
                tree.decl_parts(*decl).is_some_and(|parts| {
                    parts
                        .metadata
                        .iter()
                        .any(|(key, _)| !key.is_insignificant())
                })
            }),
        };

        if is_required {
            required.insert(*name);
        }
    }

    required
}

struct Cleaner<'a, S> {
    tree: &'a mut Tree,
    sink: &'a mut S,
    body: NodeId,
    declared_types: &'a BTreeMap<Name, Option<Type>>,
    /// Names a rename may have given more than one live write. Checked once
    /// nothing else is left to do.
    may_need_var: BTreeSet<Name>,
}

impl<S: DiagnosticSink> Cleaner<'_, S> {
    fn run(mut self, options: &CleanupOptions) -> Result<(), InternalError> {
        let span = info_span!("cleanup.root", body = ?self.body);
        let _enter = span.enter();

        for iteration in 0..options.max_iterations {
            structure_block(self.tree, self.body);

            let summary = ReadsAndWrites::for_body(self.tree, self.body);
            let required = required_names(self.tree, &summary);

            let Some((strategy, edits)) = self.find_edits(&summary, &required) else {
                debug!(iterations = iteration, "cleanup settled");
                return Ok(());
            };

            self.log_batch(iteration, strategy, &summary, &edits);
            self.apply(edits);
        }

        Err(internal_error!(InternalErrorKind::CleanupDidNotConverge {
            iterations: options.max_iterations,
        }))
    }

    fn find_edits(
        &mut self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Option<(Strategy, Vec<Edit>)> {
        for strategy in Strategy::iter() {
            let edits = match strategy {
                Strategy::SimplifyVoidAssignments => self.simplify_void_assignments(summary),
                Strategy::EliminateNoopReads => self.eliminate_noop_reads(summary, required),
                Strategy::CollapseWritesToSingleName => {
                    self.collapse_writes_to_single_name(summary, required)
                }
                Strategy::EliminateWritesUpstreamOfNothing => {
                    self.eliminate_writes_upstream_of_nothing(summary, required)
                }
                Strategy::CollapseWritesLiveOnlyForAnAssignment => {
                    self.collapse_writes_live_only_for_an_assignment(summary, required)
                }
                Strategy::InlineAdjacentSingleReadWritePairs => {
                    self.inline_adjacent_single_read_write_pairs(summary, required)
                }
                Strategy::InlineStaticReads => self.inline_static_reads(summary, required),
                Strategy::EliminateUnusedDeclarations => {
                    self.eliminate_unused_declarations(summary, required)
                }
                Strategy::FixupVarAtEnd => {
                    let names = std::mem::take(&mut self.may_need_var);
                    self.fixup_var_at_end(names, summary)
                }
                Strategy::FlagProblems => self.flag_problems(summary),
            };

            if !edits.is_empty() {
                return Some((strategy, edits));
            }
        }

        None
    }

    fn apply(&mut self, edits: Vec<Edit>) {
        for edit in edits {
            match edit.action {
                Action::Replace { edge, with } => {
                    let old = self.tree.child_at(edge);
                    let span = self.tree.span(old);
                    let ty = self.tree.ty(old).cloned();

                    let replacement = match with {
                        Replacement::Void => self.tree.add_void(span),
                        Replacement::LeftName(name) => {
                            let name = self.tree.add_left_name(span, name);
                            self.tree.node_mut(name).ty = ty;
                            name
                        }
                        Replacement::RightName(name) => {
                            let name = self.tree.add_right_name(span, name);
                            self.tree.node_mut(name).ty = ty;
                            name
                        }
                        Replacement::Replant(node) => self.tree.free(node),
                    };

                    self.tree.replace(edge, replacement);
                }
                Action::SplitAssignment { element } => {
                    let assignment = self.tree.child(self.body, element.index);
                    let right = Edge::new(assignment, 2);

                    let void = self.tree.add_void(self.tree.span(self.tree.child_at(right)));
                    let effect = self.tree.replace(right, void);
                    let index = self.tree.push_child(self.body, effect);

                    insert_before_stmt(
                        self.tree,
                        self.body,
                        element,
                        vec![ControlFlow::Stmt(ChildRef::new(index))],
                    );
                }
                Action::AddMetadata { decl, key } => {
                    self.tree.add_metadata(decl, key, Value::Void);
                }
            }
        }
    }

    fn log_batch(
        &self,
        iteration: usize,
        strategy: Strategy,
        summary: &ReadsAndWrites,
        edits: &[Edit],
    ) {
        debug!(
            iteration,
            strategy = %strategy,
            edits = edits.len(),
            names = summary.local_names.len(),
            "applying cleanup batch"
        );

        let width = edits.iter().map(|e| e.description.len()).max().unwrap_or(0);
        let table = edits
            .iter()
            .map(|edit| {
                format!(
                    "  {:<8} {:<width$}  @{}..{}",
                    edit.kind(),
                    edit.description,
                    edit.span.start,
                    edit.span.end
                )
            })
            .join("\n");

        debug!("cleanup edits\n{table}");
    }

    /* Shared helpers */

    /// The body child an element refers to
    fn element_node(&self, element: ChildRef) -> Option<NodeId> {
        self.tree.children(self.body).get(element.index).copied()
    }

    fn element_edge(&self, element: ChildRef) -> Edge {
        Edge::new(self.body, element.index)
    }

    fn is_noop_element(&self, element: ChildRef) -> bool {
        self.element_node(element)
            .is_some_and(|node| self.tree.is_void_value(node))
    }

    /// The value assigned by the simple assignment at `element`
    fn assigned_at(&self, element: ChildRef) -> Option<NodeId> {
        let (_, assigned) = self.tree.assignment_parts(self.element_node(element)?)?;
        Some(assigned)
    }

    fn sole_declaration(&self, summary: &ReadsAndWrites, name: Name) -> Option<NodeId> {
        summary.declarations_of(name).iter().copied().exactly_one().ok()
    }

    fn is_stable_name(&self, summary: &ReadsAndWrites, name: Name) -> bool {
        if !name.is_internal() {
            return true;
        }

        // Assigned once, so reordering cannot change what a read sees
        self.sole_declaration(summary, name)
            .and_then(|decl| self.tree.decl_parts(decl))
            .is_some_and(|parts| parts.has(MetadataKey::Ssa))
    }

    /// Whether evaluating `node` later than it is now evaluated changes
    /// nothing, so a value computed before it may move after it
    fn may_reorder_over(&self, summary: &ReadsAndWrites, node: NodeId) -> bool {
        let tree = &*self.tree;

        match tree.kind(node) {
            NodeKind::Fun | NodeKind::Value(_) | NodeKind::Stay | NodeKind::Decl => true,
            NodeKind::Esc => false,
            NodeKind::Block(_) => tree
                .children(node)
                .iter()
                .all(|c| self.may_reorder_over(summary, *c)),
            NodeKind::LeftName(name) | NodeKind::RightName(name) => {
                self.is_stable_name(summary, *name)
            }
            NodeKind::Call => match tree.callee_builtin(node) {
                Some(Builtin::GetStatic) => true,
                Some(Builtin::Bind) => tree
                    .children(node)
                    .get(1)
                    .is_some_and(|subject| self.may_reorder_over(summary, *subject)),
                _ => false,
            },
        }
    }
}
