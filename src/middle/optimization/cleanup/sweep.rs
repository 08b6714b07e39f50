//! Strategies that work one name at a time without renaming anything

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::trace;

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, DiagnosticValue, MessageTemplate},
    middle::{
        analysis::reads_and_writes::{ReadId, ReadKind, ReadsAndWrites, WriteKind},
        flow::Element,
        optimization::cleanup::{
            Action, Cleaner, Edit, Replacement, collapse::still_has_write_that_needs_var,
        },
        tree::{
            Edge, NodeId,
            name::Name,
            value::{Builtin, MetadataKey},
        },
        ty::Type,
    },
};

impl<S: DiagnosticSink> Cleaner<'_, S> {
    /// `x = f()` where `x` is void becomes `f(); x = void`, so that a
    /// non-void `f()` is not hidden behind the assignment
    pub(super) fn simplify_void_assignments(&self, summary: &ReadsAndWrites) -> Vec<Edit> {
        let mut edits = Vec::new();

        for (name, writes) in summary.all_writes() {
            let void_like = self
                .declared_types
                .get(&name)
                .and_then(Option::as_ref)
                .is_some_and(Type::is_void_like);

            if !void_like {
                continue;
            }

            for write in writes {
                let write = summary.write(*write);
                if write.kind != WriteKind::SimpleAssignment {
                    continue;
                }

                let Some(element) = write.element else {
                    continue;
                };
                let Some(assigned) = self.assigned_at(element.child) else {
                    continue;
                };

                // A non-void value is a type error that must stay visible
                let not_void = self.tree.ty(assigned).is_some_and(|ty| !ty.is_void_like());
                if not_void || self.tree.is_void_value(assigned) {
                    continue;
                }

                edits.push(Edit {
                    span: self.tree.span(assigned),
                    description: format!("split void assignment of {name}"),
                    action: Action::SplitAssignment {
                        element: element.child,
                    },
                });
            }
        }

        edits
    }

    /// A read standing alone as a statement does nothing
    pub(super) fn eliminate_noop_reads(
        &self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut edits = Vec::new();

        for name in &summary.local_names {
            // Reads of required names stay so tooling has something to point at
            if required.contains(name) {
                continue;
            }

            for read in summary.reads_of(*name) {
                let read = summary.read(*read);

                let (Some(node), Some(element)) = (read.node, read.element) else {
                    continue;
                };

                if read.kind != ReadKind::Read || element.is_condition {
                    continue;
                }

                if self.element_node(element.child) == Some(node) {
                    edits.push(Edit::replace(
                        self.tree.span(node),
                        format!("read {name} -> no-op"),
                        self.element_edge(element.child),
                        Replacement::Void,
                    ));
                }
            }
        }

        edits
    }

    /// Dead stores. `x = f()` whose value nobody reads becomes `f()`.
    pub(super) fn eliminate_writes_upstream_of_nothing(
        &self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut edits = Vec::new();

        'names: for name in &summary.local_names {
            if required.contains(name) {
                continue;
            }

            let decls = summary
                .declarations_of(*name)
                .iter()
                .filter_map(|decl| self.tree.decl_parts(*decl))
                .collect::<Vec<_>>();

            if decls.iter().any(|parts| parts.has(MetadataKey::TypePlaceholder)) {
                continue;
            }

            let is_var = decls.iter().all(|parts| parts.is_var());
            let mut dead = Vec::new();

            for write_id in summary.writes_of(*name) {
                let write = summary.write(*write_id);
                if write.kind != WriteKind::SimpleAssignment {
                    continue;
                }

                let Some(element) = write.element else {
                    continue;
                };

                // Dropping one of two writes to a `let` would make broken
                // code look fine
                if !is_var && !summary.writes_live(*name, element.child).is_empty() {
                    trace!(name = %name, "reassigned without var, keeping its writes");
                    continue 'names;
                }

                let unread = summary
                    .downstream(*write_id)
                    .is_none_or(|reads| reads.is_empty());
                if !unread {
                    continue;
                }

                let Some(assigned) = self.assigned_at(element.child) else {
                    continue;
                };

                // Named functions translate better
                if self.tree.is_fun(assigned) {
                    continue;
                }

                dead.push((element, assigned));
            }

            for (element, assigned) in dead {
                let pure = self.tree.value(assigned).is_some() || self.tree.is_name(assigned);
                let with = if pure {
                    Replacement::Void
                } else {
                    Replacement::Replant(assigned)
                };

                edits.push(Edit::replace(
                    self.tree.span(assigned),
                    format!("simplify dead store of {name}"),
                    self.element_edge(element.child),
                    with,
                ));
            }
        }

        edits
    }

    /// `t = f(); g(t)` becomes `g(f())` when `t` is read once and nothing
    /// evaluated between the two could tell the difference
    pub(super) fn inline_adjacent_single_read_write_pairs(
        &self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut edits = Vec::new();

        for name in &summary.local_names {
            if required.contains(name) || !name.is_temporary() {
                continue;
            }

            for read_id in summary.reads_of(*name) {
                let Some((write_element, assigned)) = self.sole_simple_write(summary, *read_id)
                else {
                    continue;
                };

                if self.tree.is_fun(assigned)
                    || self
                        .tree
                        .callee_builtin(assigned)
                        .is_some_and(Builtin::must_remain_at_statement_level)
                {
                    continue;
                }

                let read = summary.read(*read_id);
                let (Some(read_node), Some(read_element)) = (read.node, read.element) else {
                    continue;
                };

                if self.tree.right_name(read_node) != Some(*name)
                    || read_element.path != write_element.path
                    || self.next_element(summary, write_element) != Some(read_element)
                {
                    continue;
                }

                if !self.may_move_to(summary, read_node, read_element) {
                    continue;
                }

                let Some(read_edge) = self.tree.edge_of(read_node) else {
                    continue;
                };

                edits.push(Edit::replace(
                    self.tree.span(assigned),
                    format!("inlined assignment of {name} -> no-op"),
                    self.element_edge(write_element.child),
                    Replacement::Void,
                ));
                edits.push(Edit::replace(
                    self.tree.span(read_node),
                    format!("inline value assigned to {name} at sole read"),
                    read_edge,
                    Replacement::Replant(assigned),
                ));
            }
        }

        edits
    }

    /// `t = getStatic(T, .x); ... f(t)` becomes `f(getStatic(T, .x))`.
    /// Static reads are constant so they may move anywhere.
    pub(super) fn inline_static_reads(
        &self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut edits = Vec::new();

        for name in &summary.local_names {
            if required.contains(name) || !name.is_temporary() {
                continue;
            }

            for read_id in summary.reads_of(*name) {
                let Some(read_node) = summary.read(*read_id).node else {
                    continue;
                };
                let Some(read_edge) = self.tree.edge_of(read_node) else {
                    continue;
                };

                let Some((write_element, assigned)) = self.sole_simple_write(summary, *read_id)
                else {
                    continue;
                };

                if !self.tree.is_call_to(assigned, Builtin::GetStatic)
                    || self.tree.right_name(read_node) != Some(*name)
                {
                    continue;
                }

                edits.push(Edit::replace(
                    self.tree.span(assigned),
                    format!("{name} = getStatic -> no-op"),
                    self.element_edge(write_element.child),
                    Replacement::Void,
                ));
                edits.push(Edit::replace(
                    self.tree.span(read_node),
                    format!("{name} -> getStatic(...)"),
                    read_edge,
                    Replacement::Replant(assigned),
                ));
            }
        }

        edits
    }

    pub(super) fn eliminate_unused_declarations(
        &self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut edits = Vec::new();

        for name in &summary.local_names {
            if required.contains(name)
                || !summary.reads_of(*name).is_empty()
                || !summary.writes_of(*name).is_empty()
            {
                continue;
            }

            for decl in summary.declarations_of(*name) {
                let Some(edge) = self.tree.edge_of(*decl) else {
                    continue;
                };

                edits.push(Edit::replace(
                    self.tree.span(*decl),
                    format!("let {name} -> no-op"),
                    edge,
                    Replacement::Void,
                ));
            }
        }

        edits
    }

    pub(super) fn fixup_var_at_end(
        &self,
        names: BTreeSet<Name>,
        summary: &ReadsAndWrites,
    ) -> Vec<Edit> {
        names
            .into_iter()
            .filter(|name| still_has_write_that_needs_var(summary, *name))
            .filter_map(|name| {
                let decl = self.sole_declaration(summary, name)?;

                Some(Edit {
                    span: self.tree.span(decl),
                    description: format!("make {name} var"),
                    action: Action::AddMetadata {
                        decl,
                        key: MetadataKey::Var,
                    },
                })
            })
            .collect()
    }

    /// Reports writes to a name not declared `var` while an earlier write
    /// is still live, then marks the declaration `var` so later passes and
    /// later rounds do not trip over it again
    pub(super) fn flag_problems(&mut self, summary: &ReadsAndWrites) -> Vec<Edit> {
        let mut edits = Vec::new();

        for (name, writes) in summary.all_writes() {
            let non_var = summary.declarations_of(name).iter().copied().find(|decl| {
                self.tree
                    .decl_parts(*decl)
                    .is_some_and(|parts| !parts.is_var())
            });

            let Some(decl) = non_var else {
                continue;
            };

            for write in writes {
                let Some(element) = summary.write(*write).element else {
                    continue;
                };

                let live = summary.writes_live(name, element.child);
                let preceding = live.first().and_then(|preceding| {
                    let preceding = summary.write(*preceding);
                    match (preceding.element, preceding.node) {
                        (Some(element), _) => self.element_node(element.child),
                        (None, node) => node,
                    }
                });

                let Some(preceding) = preceding else {
                    continue;
                };

                // The output name is assigned once per exit, not reassigned
                if summary.output_name != Some(name) {
                    let at = self
                        .element_node(element.child)
                        .map_or(self.tree.span(decl), |node| self.tree.span(node));

                    self.sink.report(Diagnostic::error(
                        MessageTemplate::IllegalReassignment,
                        at,
                        vec![
                            DiagnosticValue::Name(name),
                            DiagnosticValue::Span(self.tree.span(preceding)),
                            DiagnosticValue::Span(self.tree.span(decl)),
                        ],
                    ));
                }

                edits.push(Edit {
                    span: self.tree.span(decl),
                    description: format!("make problem declaration of {name} var"),
                    action: Action::AddMetadata {
                        decl,
                        key: MetadataKey::Var,
                    },
                });
            }
        }

        edits
    }

    /* Helpers */

    /// The only write `read` can see, when that is a simple assignment
    /// whose value nothing else reads
    fn sole_simple_write(
        &self,
        summary: &ReadsAndWrites,
        read: ReadId,
    ) -> Option<(Element, NodeId)> {
        let write_id = *summary.upstream(read)?.iter().exactly_one().ok()?;
        let write = summary.write(write_id);

        if write.kind != WriteKind::SimpleAssignment {
            return None;
        }

        let only_reader = summary.downstream(write_id)?.iter().exactly_one().ok()?;
        if *only_reader != read {
            return None;
        }

        let element = write.element?;
        Some((element, self.assigned_at(element.child)?))
    }

    /// The element evaluated right after `element`, skipping `void`s
    fn next_element(&self, summary: &ReadsAndWrites, element: Element) -> Option<Element> {
        let path = &summary.paths[element.path];
        let mut position = path.elements.iter().position(|e| *e == element)?;

        while position + 1 < path.elements.len()
            && self.is_noop_element(path.elements[position + 1].child)
        {
            position += 1;
        }

        match path.elements.get(position + 1) {
            Some(next) => Some(*next),
            None => path.followers.first().and_then(|f| f.condition),
        }
    }

    /// Whether a value computed just before `element` could instead be
    /// computed where `read` is. Everything evaluated before `read` within
    /// the element has to be indifferent to the move.
    fn may_move_to(&self, summary: &ReadsAndWrites, read: NodeId, element: Element) -> bool {
        let container = self.element_node(element.child);
        let mut node = read;

        while Some(node) != container {
            let Some(Edge { parent, index }) = self.tree.edge_of(node) else {
                return false;
            };

            let preceding = &self.tree.children(parent)[..index];
            if !preceding.iter().all(|s| self.may_reorder_over(summary, *s)) {
                return false;
            }

            node = parent;
        }

        true
    }
}
