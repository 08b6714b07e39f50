//! Strategies that merge two names into one.
//!
//! Both look for a name `x` whose value is copied into `y`:
//!
//! ```text
//! x = f();
//! ...
//! y = x;
//! g(y)
//! ```
//!
//! and either rename `x` to `y` or `y` to `x`, turning the copy into a no-op.
//! Renaming may leave the surviving name with more than one live write, in
//! which case its declaration has to become `var`.

use std::collections::BTreeSet;

use hashbrown::HashSet;
use once_cell::unsync::Lazy;
use tracing::trace;

use crate::{
    diagnostics::DiagnosticSink,
    middle::{
        analysis::reads_and_writes::{ReadId, ReadKind, ReadsAndWrites, WriteId, WriteKind},
        optimization::cleanup::{Cleaner, Edit, Replacement},
        tree::{DeclParts, Edge, NodeId, name::Name, value::MetadataKey},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rename {
    /// Writes and reads of `x` become writes and reads of `y`
    XToY,
    /// Reads of `y` become reads of `x`
    YToX,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NeedsVar {
    Ok,
    YNeedsVar,
    /// `y` would need to be `var` but its declaration cannot change
    Impossible,
}

impl<S: DiagnosticSink> Cleaner<'_, S> {
    /// Collapses `x` and `y` when every write of `y` copies `x` and every
    /// read of `x` feeds such a copy
    pub(super) fn collapse_writes_to_single_name(
        &mut self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut pairs = Vec::new();

        for y in &summary.local_names {
            let writes_of_y = summary.writes_of(*y);
            let Some(x) = writes_of_y.first().and_then(|w| assigned_name(summary, *w)) else {
                continue;
            };

            if x == *y || !summary.local_names.contains(&x) {
                continue;
            }

            if names_a_function(summary, x) || names_a_function(summary, *y) {
                continue;
            }

            let reads_of_x = summary.reads_of(x);
            let all_copies = writes_of_y.iter().all(|w| {
                summary.write(*w).kind == WriteKind::SimpleAssignment
                    && assigned_name(summary, *w) == Some(x)
            });

            if reads_of_x.is_empty() || reads_of_x.len() < writes_of_y.len() || !all_copies {
                continue;
            }

            let rename = self.rename_strategy_for(
                summary,
                required,
                x,
                *y,
                || self.copies_cover_reads_of_y(summary, x, *y),
                || {
                    // Reads of `y` must still see the value `x` had at the
                    // copy, not a later write of `x`
                    self.copies_cover_reads_of_y(summary, x, *y)
                        && summary.reads_of(x).iter().all(|read| {
                            summary
                                .read(*read)
                                .element
                                .is_none_or(|e| summary.writes_live(*y, e.child).is_empty())
                        })
                },
            );

            if let Some(rename) = rename {
                pairs.push((x, *y, rename));
            }
        }

        let mut edits = Vec::new();
        // A chain `t#0 -> t#1 -> t#2` gets one link per round so that edits
        // never overlap
        let mut touched = HashSet::new();

        for (x, y, rename) in pairs {
            if touched.contains(&x) || touched.contains(&y) {
                continue;
            }

            trace!(x = %x, y = %y, rename = ?rename, "collapsing names");

            match rename {
                Rename::XToY => {
                    let writes_of_x = summary.writes_of(x);

                    match self.does_y_need_var(summary, x, y, writes_of_x, |_| true) {
                        NeedsVar::Ok => {}
                        NeedsVar::YNeedsVar => {
                            self.may_need_var.insert(y);
                        }
                        NeedsVar::Impossible => continue,
                    }

                    for write in writes_of_x {
                        let Some(node) = summary.write(*write).node else {
                            continue;
                        };

                        edits.push(Edit::replace(
                            self.tree.span(node),
                            format!("rename written {x} to {y}"),
                            Edge::new(node, 1),
                            Replacement::LeftName(y),
                        ));
                    }

                    for read in summary.reads_of(x) {
                        let Some((node, edge)) = self.renamable_read(summary, *read, x) else {
                            continue;
                        };

                        // Reads feeding `y = x` go away with the copy
                        let copies_into_y = edge.index == 2
                            && self
                                .tree
                                .assignment_parts(edge.parent)
                                .is_some_and(|(left, _)| left == y);
                        if copies_into_y {
                            continue;
                        }

                        edits.push(Edit::replace(
                            self.tree.span(node),
                            format!("rename read {x} to {y}"),
                            edge,
                            Replacement::RightName(y),
                        ));
                    }
                }
                Rename::YToX => {
                    for read in summary.reads_of(y) {
                        let Some((node, edge)) = self.renamable_read(summary, *read, y) else {
                            continue;
                        };

                        edits.push(Edit::replace(
                            self.tree.span(node),
                            format!("rename read {y} to {x}"),
                            edge,
                            Replacement::RightName(x),
                        ));
                    }
                }
            }

            for write in summary.writes_of(y) {
                let Some(element) = summary.write(*write).element else {
                    continue;
                };
                let span = self
                    .element_node(element.child)
                    .map(|node| self.tree.span(node))
                    .unwrap_or_default();

                edits.push(Edit::replace(
                    span,
                    format!("{y} = ... -> no-op"),
                    self.element_edge(element.child),
                    Replacement::Void,
                ));
            }

            touched.insert(x);
            touched.insert(y);
        }

        edits
    }

    /// Like [`Self::collapse_writes_to_single_name`] but one write at a time:
    /// `t = f(); ...; y = t` becomes `y = f(); ...;` when that copy is the
    /// only read of the write
    pub(super) fn collapse_writes_live_only_for_an_assignment(
        &mut self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
    ) -> Vec<Edit> {
        let mut edits = Vec::new();
        let mut touched = HashSet::new();

        for x in &summary.local_names {
            if !x.is_temporary() || names_a_function(summary, *x) {
                continue;
            }

            for write_id in summary.writes_of(*x) {
                let write = summary.write(*write_id);
                let Some(write_node) = write.node else {
                    continue;
                };
                if write.kind != WriteKind::SimpleAssignment {
                    continue;
                }

                let Some(read_of_x) = summary
                    .downstream(*write_id)
                    .filter(|reads| reads.len() == 1)
                    .and_then(|reads| reads.first().copied())
                else {
                    continue;
                };

                let Some((copy, y)) = self.simple_assigned_for_read(summary, read_of_x) else {
                    continue;
                };

                // Renaming temporaries into temporaries could undo itself
                // next round
                if y.is_temporary() || touched.contains(&copy) {
                    continue;
                }

                let rename = self.rename_strategy_for(
                    summary,
                    required,
                    *x,
                    y,
                    || !self.y_read_while_write_live(summary, *x, y, *write_id, read_of_x),
                    || false,
                );

                if rename != Some(Rename::XToY) {
                    continue;
                }

                let eliminated = |w: WriteId| summary.write(w).node == Some(copy);
                match self.does_y_need_var(summary, *x, y, &[*write_id], eliminated) {
                    NeedsVar::Ok => {}
                    NeedsVar::YNeedsVar => {
                        self.may_need_var.insert(y);
                    }
                    NeedsVar::Impossible => continue,
                }

                let Some(copy_edge) = self.tree.edge_of(copy) else {
                    continue;
                };

                edits.push(Edit::replace(
                    self.tree.span(write_node),
                    format!("rename written {x} to {y}"),
                    Edge::new(write_node, 1),
                    Replacement::LeftName(y),
                ));
                edits.push(Edit::replace(
                    self.tree.span(copy),
                    format!("{y} = ... -> no-op"),
                    copy_edge,
                    Replacement::Void,
                ));

                touched.insert(copy);
            }
        }

        edits
    }

    /// Picks which of the two names survives. The extra checks run lazily
    /// and at most once.
    fn rename_strategy_for(
        &self,
        summary: &ReadsAndWrites,
        required: &BTreeSet<Name>,
        x: Name,
        y: Name,
        can_rename_x_to_y_extra: impl FnOnce() -> bool,
        can_rename_y_to_x_extra: impl FnOnce() -> bool,
    ) -> Option<Rename> {
        let can_rename_x_to_y = Lazy::new(|| {
            summary
                .writes_of(x)
                .iter()
                .all(|w| summary.write(*w).kind.is_assignment())
                && !summary.declared_after_assignment(&*self.tree, y, x)
                && can_rename_x_to_y_extra()
        });
        let can_rename_y_to_x = Lazy::new(can_rename_y_to_x_extra);

        let y_writes_are_simple = summary
            .writes_of(y)
            .iter()
            .all(|w| summary.write(*w).kind == WriteKind::SimpleAssignment);

        let x_required = required.contains(&x);
        let y_required = required.contains(&y);

        if !y_writes_are_simple || (x_required && y_required) {
            return None;
        }

        if x_required {
            return (*can_rename_y_to_x).then_some(Rename::YToX);
        }

        if y_required {
            return (*can_rename_x_to_y).then_some(Rename::XToY);
        }

        match (x.is_temporary(), y.is_temporary()) {
            (true, false) if *can_rename_x_to_y => Some(Rename::XToY),
            (false, true) if *can_rename_y_to_x => Some(Rename::YToX),
            _ if *can_rename_y_to_x => Some(Rename::YToX),
            _ if *can_rename_x_to_y => Some(Rename::XToY),
            _ => None,
        }
    }

    /// For every statement reading `y`, the writes of `x` live there are
    /// exactly those live at the copies `y = x` that reach it
    fn copies_cover_reads_of_y(&self, summary: &ReadsAndWrites, x: Name, y: Name) -> bool {
        let elements = summary
            .reads_of(y)
            .iter()
            .filter_map(|read| summary.read(*read).element)
            .map(|element| element.child)
            .collect::<BTreeSet<_>>();

        elements.into_iter().all(|at| {
            let through_copies = summary
                .writes_live(y, at)
                .into_iter()
                .filter(|w| assigned_name(summary, *w) == Some(x))
                .filter_map(|w| summary.write(w).element)
                .flat_map(|copy| summary.writes_live(x, copy.child))
                .collect::<BTreeSet<_>>();

            let at_read = summary.writes_live(x, at).into_iter().collect::<BTreeSet<_>>();

            through_copies == at_read
        })
    }

    /// Whether some read of `y` sees `y` while `write` of `x` is still live,
    /// so hoisting `y`'s assignment to `write` would change what it reads
    fn y_read_while_write_live(
        &self,
        summary: &ReadsAndWrites,
        x: Name,
        y: Name,
        write: WriteId,
        read_of_x: ReadId,
    ) -> bool {
        let Some(copy_element) = summary.read(read_of_x).element else {
            return false;
        };

        if !summary.writes_live(x, copy_element.child).contains(&write) {
            return false;
        }

        summary.reads_of(y).iter().any(|read| {
            summary
                .read(*read)
                .element
                .is_some_and(|e| summary.writes_live(x, e.child).contains(&write))
        })
    }

    /// The node and edge of a read that can be replaced with another name.
    /// Reified reads, like a function mentioning its own name, stay.
    fn renamable_read(
        &self,
        summary: &ReadsAndWrites,
        read: ReadId,
        name: Name,
    ) -> Option<(NodeId, Edge)> {
        let read = summary.read(read);
        let node = read.node?;

        if read.kind != ReadKind::Read || self.tree.right_name(node) != Some(name) {
            return None;
        }

        Some((node, self.tree.edge_of(node)?))
    }

    /// `y = x` at statement level, when `read` is that `x`
    fn simple_assigned_for_read(
        &self,
        summary: &ReadsAndWrites,
        read: ReadId,
    ) -> Option<(NodeId, Name)> {
        let read = summary.read(read);
        if read.kind != ReadKind::Read {
            return None;
        }

        let node = read.node?;
        let Edge { parent, index } = self.tree.edge_of(node)?;
        let (left, assigned) = self.tree.assignment_parts(parent)?;

        // Not nested in some bigger expression like `hs(...)`
        let at_statement_level = self.element_node(read.element?.child) == Some(parent);

        (index == 2 && assigned == node && at_statement_level).then_some((parent, left))
    }

    fn does_y_need_var(
        &self,
        summary: &ReadsAndWrites,
        x: Name,
        y: Name,
        writes_of_x: &[WriteId],
        eliminated_y: impl Fn(WriteId) -> bool,
    ) -> NeedsVar {
        let parts = |name: Name| {
            self.sole_declaration(summary, name)
                .and_then(|decl| self.tree.decl_parts(decl))
        };

        let (Some(x_parts), Some(y_parts)) = (parts(x), parts(y)) else {
            return NeedsVar::Ok;
        };

        if !x_parts.is_var()
            || y_parts.is_var()
            || !would_need_var_after_rename(summary, x, y, writes_of_x, &eliminated_y)
        {
            return NeedsVar::Ok;
        }

        if can_make_var(&y_parts, summary) {
            NeedsVar::YNeedsVar
        } else {
            NeedsVar::Impossible
        }
    }
}

/// Whether `name` is the canonical name of a function assigned to it. The
/// function refers to itself by that name, so it has to stay.
fn names_a_function(summary: &ReadsAndWrites, name: Name) -> bool {
    summary
        .writes_of(name)
        .iter()
        .filter_map(|w| summary.write(*w).element)
        .any(|element| {
            summary
                .nested_functions_at(element.child)
                .iter()
                .any(|fun| summary.canonical_name(*fun) == Some(name))
        })
}

fn assigned_name(summary: &ReadsAndWrites, write: WriteId) -> Option<Name> {
    summary
        .write(write)
        .assigned
        .map(|read| summary.read(read).name)
}

/// Whether, once `writes_of_x` write `y`, one write of `y` can be live at
/// another
fn would_need_var_after_rename(
    summary: &ReadsAndWrites,
    x: Name,
    y: Name,
    writes_of_x: &[WriteId],
    eliminated_y: &impl Fn(WriteId) -> bool,
) -> bool {
    let conflicts_at = |write: WriteId| {
        let Some(element) = summary.write(write).element else {
            return false;
        };

        summary
            .writes_live(y, element.child)
            .into_iter()
            .any(|w| !eliminated_y(w))
            || summary
                .writes_live(x, element.child)
                .iter()
                .any(|w| writes_of_x.contains(w))
    };

    writes_of_x.iter().any(|w| conflicts_at(*w))
        || summary
            .writes_of(y)
            .iter()
            .filter(|w| !eliminated_y(**w))
            .any(|w| conflicts_at(*w))
}

/// Only local, internal names outside the body's signature that do not
/// come from a type definition
fn can_make_var(parts: &DeclParts, summary: &ReadsAndWrites) -> bool {
    let name = parts.name;

    name.is_internal()
        && summary.local_names.contains(&name)
        && !summary.input_names.contains(&name)
        && summary.output_name != Some(name)
        && !parts.has(MetadataKey::FromType)
        && !parts.has(MetadataKey::TypeDecl)
}

pub(super) fn still_has_write_that_needs_var(summary: &ReadsAndWrites, name: Name) -> bool {
    summary.writes_of(name).iter().any(|w| {
        summary
            .write(*w)
            .element
            .is_some_and(|e| !summary.writes_live(name, e.child).is_empty())
    })
}
