//! Finds reads of names along paths where the name may not have been
//! assigned yet.
//!
//! Coverage is tracked per path as, for each name in scope, the set of paths
//! along which it may still be uninitialized. A name without an entry is not
//! in scope at all.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;
use tracing::{debug, info_span, trace};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, DiagnosticValue, MessageTemplate},
    frontend::Span,
    middle::{
        analysis::reads_and_writes::{ReadsAndWrites, written_name},
        flow::{Direction, Element, PathIndex},
        tree::{
            NodeId, NodeKind, Tree,
            name::Name,
            value::{Builtin, MetadataKey, Value},
            visit,
        },
    },
};

type Coverage = BTreeMap<Name, BTreeSet<PathIndex>>;

/// What to do about one bad read
#[derive(Debug)]
enum Fix {
    /// A bookkeeping read the compiler made up. Nobody needs to hear about it.
    Drop { read: NodeId },
    Report {
        read: Option<NodeId>,
        span: Span,
        name: Name,
        uncovered: Vec<Span>,
    },
}

/// Checks every body under `root`, nested functions first
pub fn check_use_before_init(tree: &mut Tree, root: NodeId, sink: &mut impl DiagnosticSink) {
    let mut checker = Checker {
        free_names: HashMap::new(),
    };

    for body in tree.bodies_innermost_first(root) {
        checker.check_body(tree, body, sink);
    }
}

struct Checker {
    /// Names a function reads but does not declare, by function node
    free_names: HashMap<NodeId, BTreeSet<Name>>,
}

impl Checker {
    fn check_body(&mut self, tree: &mut Tree, body: NodeId, sink: &mut impl DiagnosticSink) {
        let span = info_span!("use_before_init.body", body = ?body);
        let _enter = span.enter();

        let summary = ReadsAndWrites::for_body(tree, body);
        let (fixes, free) = self.find_problems(tree, &summary);

        debug!(problems = fixes.len(), free = ?free, "checked body");

        if let Some(fun) = tree.parent(body).filter(|fun| tree.is_fun(*fun)) {
            self.free_names.insert(fun, free);
        }

        for fix in fixes {
            apply_fix(tree, fix, sink);
        }
    }

    fn find_problems(&self, tree: &Tree, summary: &ReadsAndWrites) -> (Vec<Fix>, BTreeSet<Name>) {
        let paths = &summary.paths;
        let body = summary.body;

        let type_names = summary
            .declarations
            .iter()
            .filter(|(_, decls)| {
                decls.iter().any(|decl| {
                    tree.decl_parts(*decl)
                        .is_some_and(|parts| parts.has(MetadataKey::TypeDecl))
                })
            })
            .map(|(name, _)| *name)
            .collect::<BTreeSet<_>>();

        let in_scope = |name: &Name| {
            summary.declarations.contains_key(name) || summary.input_names.contains(name)
        };

        let mut coverage_at_end: HashMap<PathIndex, Coverage> = HashMap::new();
        coverage_at_end.insert(
            PathIndex::BEFORE_ENTRY,
            summary
                .input_names
                .iter()
                .map(|name| (*name, BTreeSet::new()))
                .collect(),
        );

        let mut fixes = Vec::new();
        let mut free = BTreeSet::new();

        for index in paths.ordered_path_indices(Direction::Back) {
            let path = &paths[index];

            let mut incoming = path
                .preceders
                .iter()
                .filter(|p| p.direction == Direction::Forward)
                .map(|p| p.path)
                .filter(|p| coverage_at_end.contains_key(p))
                .collect::<Vec<_>>();

            if index == paths.entry() {
                incoming.push(PathIndex::BEFORE_ENTRY);
            }

            // Nothing reachable leads here
            if incoming.is_empty() {
                continue;
            }

            let mut coverage = merge(&incoming, &coverage_at_end);

            for element in path.evaluation_order() {
                let Some(root) = tree.children(body).get(element.child.index).copied() else {
                    continue;
                };

                let mut check = |name: Name, read: Option<NodeId>, span, coverage: &Coverage| {
                    if name.is_builtin() || name.is_exported() || type_names.contains(&name) {
                        return;
                    }

                    if !in_scope(&name) {
                        free.insert(name);
                        return;
                    }

                    let missing = match coverage.get(&name) {
                        Some(missing) if missing.is_empty() => return,
                        Some(missing) => missing.clone(),
                        None => BTreeSet::new(),
                    };

                    trace!(name = %name, missing = ?missing, "uninitialized read");
                    fixes.push(fix_for(tree, summary, element, root, name, read, span, &missing));
                };

                let order = visit::post_order(tree, root, |tree, node| !tree.is_fun(node));
                for node in order {
                    match tree.kind(node) {
                        NodeKind::RightName(name) => {
                            check(*name, Some(node), tree.span(node), &coverage);
                        }
                        NodeKind::Fun => {
                            let assigned_here = tree
                                .parent(node)
                                .and_then(|parent| tree.assignment_parts(parent))
                                .map(|(name, _)| name);

                            let names = self.free_names.get(&node).cloned().unwrap_or_default();
                            for name in names {
                                if Some(name) != assigned_here {
                                    check(name, None, tree.span(node), &coverage);
                                }
                            }
                        }
                        NodeKind::Decl => {
                            if let Some(parts) = tree.decl_parts(node) {
                                coverage.insert(parts.name, BTreeSet::from([index]));
                            }
                        }
                        NodeKind::Call => {
                            if let Some((name, _)) = written_name(tree, node) {
                                if let Some(missing) = coverage.get_mut(&name) {
                                    missing.clear();
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }

            coverage_at_end.insert(index, coverage);
        }

        (fixes, free)
    }
}

/// Names on only some incoming routes are missing along the others
fn merge(incoming: &[PathIndex], coverage_at_end: &HashMap<PathIndex, Coverage>) -> Coverage {
    let mut merged = Coverage::new();

    let names = incoming
        .iter()
        .filter_map(|p| coverage_at_end.get(p))
        .flat_map(|c| c.keys().copied())
        .collect::<BTreeSet<_>>();

    for name in names {
        let mut missing = BTreeSet::new();

        for preceder in incoming {
            match coverage_at_end.get(preceder).and_then(|c| c.get(&name)) {
                Some(set) => missing.extend(set.iter().copied()),
                None => {
                    missing.insert(*preceder);
                }
            }
        }

        merged.insert(name, missing);
    }

    merged
}

#[allow(clippy::too_many_arguments)]
fn fix_for(
    tree: &Tree,
    summary: &ReadsAndWrites,
    element: Element,
    root: NodeId,
    name: Name,
    read: Option<NodeId>,
    span: Span,
    missing: &BTreeSet<PathIndex>,
) -> Fix {
    match read {
        Some(read) if name.is_temporary() && read == root && !element.is_condition => {
            Fix::Drop { read }
        }
        _ => Fix::Report {
            read,
            span,
            name,
            uncovered: missing
                .iter()
                .filter_map(|p| summary.paths.diagnostic_position(*p, tree, summary.body))
                .collect(),
        },
    }
}

fn apply_fix(tree: &mut Tree, fix: Fix, sink: &mut impl DiagnosticSink) {
    match fix {
        Fix::Drop { read } => {
            if let Some(edge) = tree.edge_of(read) {
                let void = tree.add_void(tree.span(read));
                tree.replace(edge, void);
            }
        }
        Fix::Report {
            read,
            span,
            name,
            uncovered,
        } => {
            let diagnostic = Diagnostic::error(
                MessageTemplate::UseBeforeInitialization,
                span,
                vec![DiagnosticValue::Name(name), DiagnosticValue::Spans(uncovered)],
            );

            if let Some(edge) = read.and_then(|read| tree.edge_of(read)) {
                let ty = tree.ty(tree.child_at(edge)).cloned();
                let message = tree.add_value(span, Value::Str(diagnostic.message(None)));
                let error = tree.add_builtin_call(span, Builtin::Error, vec![message]);
                tree.node_mut(error).ty = ty;
                tree.replace(edge, error);
            }

            sink.report(diagnostic);
        }
    }
}
