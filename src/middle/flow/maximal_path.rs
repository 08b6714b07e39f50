//! Maximal paths are the straight-line runs of a block's control flow. Each
//! path is a list of elements, references to the block's children, that
//! always run one after another. Paths link to their preceders and followers,
//! and a follower may be guarded by the condition the path ends with.
//!
//! Paths are built once from a flow and never edited in place: a pass that
//! changes the flow builds new paths.

use std::{collections::BTreeSet, fmt::Write as _};

use hashbrown::HashSet;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    frontend::Span,
    index::{Index, IndexVec, simple_index},
    middle::tree::{
        NodeId, Tree,
        control_flow::{
            CheckPosition, ChildRef, ControlFlow, If, Jump, JumpDestination, JumpKind, Labeled,
            Loop, OrElse, StmtBlock,
        },
        value::Builtin,
    },
};

simple_index! {
    /// Identifies a path within its [`MaximalPaths`]
    pub struct PathIndex;
}

impl PathIndex {
    pub const ENTRY: Self = Self(0);

    /// Stands for everything that happens before the body starts, like
    /// binding parameters
    pub const BEFORE_ENTRY: Self = Self(u32::MAX);
}

impl core::fmt::Display for PathIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::BEFORE_ENTRY {
            f.write_str("p<before>")
        } else {
            write!(f, "p{}", self.0)
        }
    }
}

/// One reference to a block child on a path. Elements are equal when they
/// refer to the same child.
#[derive(Debug, Clone, Copy)]
pub struct Element {
    pub path: PathIndex,
    pub child: ChildRef,
    /// Whether the child is evaluated as a branch or loop condition
    pub is_condition: bool,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.child == other.child
    }
}

impl Eq for Element {}

impl std::hash::Hash for Element {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.child.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    /// A loop's jump back to its start
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Preceder {
    pub path: PathIndex,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Follower {
    pub path: PathIndex,
    pub direction: Direction,
    /// Control moves to the follower only when this condition holds
    pub condition: Option<Element>,
}

#[derive(Debug, Clone, Default)]
pub struct MaximalPath {
    pub elements: Vec<Element>,
    pub preceders: Vec<Preceder>,
    pub followers: Vec<Follower>,
    /// The path was cut after a yielding call
    pub ends_at_yield: bool,
}

impl MaximalPath {
    /// Conditions guarding the followers, each once, in order
    pub fn conditions(&self) -> Vec<Element> {
        self.followers
            .iter()
            .filter_map(|f| f.condition)
            .unique()
            .collect()
    }

    /// The elements followed by the conditions, in evaluation order
    pub fn evaluation_order(&self) -> Vec<Element> {
        let mut order = self.elements.clone();
        order.extend(self.conditions());
        order
    }

    fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PathOptions {
    /// Any statement of an or-clause may fail, so the else-clause is
    /// reachable even when nothing in the or-clause visibly bubbles
    pub assume_failure_can_happen: bool,
    /// End a path after each `yield` or `await` so code after a suspension
    /// point starts a fresh path
    pub yielding_calls_end_paths: bool,
    /// Treat `true`/`false` conditions as known and skip the dead branch
    pub fold_constant_conditions: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            assume_failure_can_happen: false,
            yielding_calls_end_paths: false,
            fold_constant_conditions: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaximalPaths {
    pub paths: IndexVec<PathIndex, MaximalPath>,
    /// Where control leaves the block normally, if it can
    pub exit: Option<PathIndex>,
    /// Where control leaves the block by bubbling failure, if it can
    pub fail_exit: Option<PathIndex>,
}

impl core::ops::Index<PathIndex> for MaximalPaths {
    type Output = MaximalPath;

    fn index(&self, index: PathIndex) -> &Self::Output {
        &self.paths[index]
    }
}

impl MaximalPaths {
    /// Builds the paths of `block`. Linear blocks run their children in order.
    pub fn build(tree: &Tree, block: NodeId, options: PathOptions) -> Self {
        let flow = tree.effective_flow(block);

        let mut builder = PathBuilder {
            tree,
            block,
            options,
            paths: IndexVec::new(),
            scopes: Vec::new(),
            fail_over: vec![Vec::new()],
            escaping: Vec::new(),
        };

        let entry = builder.new_path();
        let mut at_exit = builder.build_stmt_block(&flow, vec![entry]);
        at_exit.append(&mut builder.escaping);

        let exit = (!at_exit.is_empty()).then(|| builder.maybe_join_all(at_exit));

        let failures = builder.fail_over.pop().unwrap_or_default();
        let fail_exit = (!failures.is_empty()).then(|| builder.maybe_join_all(failures));

        let mut paths = Self {
            paths: builder.paths,
            exit,
            fail_exit,
        };

        paths.eliminate_empty_transitions(options);

        debug!(
            block = ?block,
            paths = paths.paths.len(),
            exit = ?paths.exit,
            fail_exit = ?paths.fail_exit,
            "built maximal paths"
        );
        trace!("\n{paths}");

        paths
    }

    pub fn entry(&self) -> PathIndex {
        PathIndex::ENTRY
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn indices(&self) -> impl DoubleEndedIterator<Item = PathIndex> + use<> {
        self.paths.indices()
    }

    /// Every element, conditions included, in path order
    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.paths.iter().flat_map(|p| p.evaluation_order())
    }

    /// Merges paths joined by a plain forward edge where nothing else enters
    /// the second path, and bypasses empty paths with a single plain exit.
    /// The entry stays at index zero.
    pub fn eliminate_empty_transitions(&mut self, options: PathOptions) {
        let mut removed = HashSet::new();

        while let Some(transition) = self.find_empty_transition(&removed, options) {
            match transition {
                Transition::Merge { into, from } => self.merge(into, from),
                Transition::Bypass { empty, to } => self.bypass(empty, to),
            }

            removed.insert(transition.removed());
        }

        if !removed.is_empty() {
            self.compact(&removed);
        }
    }

    fn find_empty_transition(
        &self,
        removed: &HashSet<PathIndex>,
        options: PathOptions,
    ) -> Option<Transition> {
        for (index, path) in self.paths.enumerate() {
            if removed.contains(&index) {
                continue;
            }

            let [follower] = path.followers.as_slice() else {
                continue;
            };

            if follower.direction != Direction::Forward
                || follower.condition.is_some()
                || follower.path == index
            {
                continue;
            }

            let next = &self.paths[follower.path];
            let sole_preceder = next.preceders.as_slice()
                == [Preceder {
                    path: index,
                    direction: Direction::Forward,
                }];

            if sole_preceder
                && follower.path != PathIndex::ENTRY
                && !(options.yielding_calls_end_paths && path.ends_at_yield)
            {
                return Some(Transition::Merge {
                    into: index,
                    from: follower.path,
                });
            }

            if path.is_empty()
                && index != PathIndex::ENTRY
                && Some(index) != self.exit
                && Some(index) != self.fail_exit
            {
                return Some(Transition::Bypass {
                    empty: index,
                    to: follower.path,
                });
            }
        }

        None
    }

    /// Appends `from` to `into`
    fn merge(&mut self, into: PathIndex, from: PathIndex) {
        let absorbed = std::mem::take(&mut self.paths[from]);

        let target = &mut self.paths[into];
        target.elements.extend(absorbed.elements);
        target.followers = absorbed.followers;
        target.ends_at_yield = absorbed.ends_at_yield;

        self.rename_path(from, into);
    }

    /// Sends everything entering `empty` straight to `to`
    fn bypass(&mut self, empty: PathIndex, to: PathIndex) {
        let bypassed = std::mem::take(&mut self.paths[empty]);

        let target = &mut self.paths[to];
        target.preceders.retain(|p| p.path != empty);
        target.preceders.extend(bypassed.preceders);

        for path in self.paths.iter_mut() {
            for follower in &mut path.followers {
                if follower.path == empty {
                    follower.path = to;
                }
            }
        }
    }

    fn rename_path(&mut self, old: PathIndex, new: PathIndex) {
        if self.exit == Some(old) {
            self.exit = Some(new);
        }
        if self.fail_exit == Some(old) {
            self.fail_exit = Some(new);
        }

        for path in self.paths.iter_mut() {
            for element in &mut path.elements {
                if element.path == old {
                    element.path = new;
                }
            }

            for preceder in &mut path.preceders {
                if preceder.path == old {
                    preceder.path = new;
                }
            }

            for follower in &mut path.followers {
                if follower.path == old {
                    follower.path = new;
                }
                if let Some(condition) = &mut follower.condition {
                    if condition.path == old {
                        condition.path = new;
                    }
                }
            }
        }
    }

    /// Drops removed paths and renumbers the rest, keeping their order
    fn compact(&mut self, removed: &HashSet<PathIndex>) {
        let mut renumbered = vec![None; self.paths.len()];
        let mut next = 0;

        for index in self.paths.indices() {
            if !removed.contains(&index) {
                renumbered[index.index()] = Some(PathIndex::new(next));
                next += 1;
            }
        }

        let map = |index: PathIndex| {
            renumbered
                .get(index.index())
                .copied()
                .flatten()
                .unwrap_or(index)
        };

        let old = std::mem::take(&mut self.paths);
        for (index, mut path) in old.raw.into_iter().enumerate() {
            if renumbered[index].is_none() {
                continue;
            }

            for element in &mut path.elements {
                element.path = map(element.path);
            }
            for preceder in &mut path.preceders {
                preceder.path = map(preceder.path);
            }
            for follower in &mut path.followers {
                follower.path = map(follower.path);
                if let Some(condition) = &mut follower.condition {
                    condition.path = map(condition.path);
                }
            }

            self.paths.push(path);
        }

        self.exit = self.exit.map(map);
        self.fail_exit = self.fail_exit.map(map);
    }

    /// Path indices ordered as if back edges did not exist. With
    /// [`Direction::Back`] every path comes after its preceders, with
    /// [`Direction::Forward`] after its followers.
    pub fn ordered_path_indices(&self, direction: Direction) -> Vec<PathIndex> {
        let mut waiting_on = self
            .paths
            .iter()
            .map(|p| {
                p.preceders
                    .iter()
                    .filter(|p| p.direction == Direction::Forward)
                    .count()
            })
            .collect::<Vec<_>>();

        let mut ready = self
            .paths
            .indices()
            .filter(|i| waiting_on[i.index()] == 0)
            .collect::<BTreeSet<_>>();
        let mut order = Vec::with_capacity(self.paths.len());

        while let Some(index) = ready.pop_first() {
            order.push(index);

            for follower in &self.paths[index].followers {
                if follower.direction != Direction::Forward {
                    continue;
                }

                let count = &mut waiting_on[follower.path.index()];
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert(follower.path);
                }
            }
        }

        // Forward cycles only come from malformed flows. Keep their paths
        // rather than dropping them.
        if order.len() < self.paths.len() {
            let placed = order.iter().copied().collect::<HashSet<_>>();
            order.extend(self.paths.indices().filter(|i| !placed.contains(i)));
        }

        if direction == Direction::Forward {
            order.reverse();
        }

        order
    }

    /// A span to blame for something that happened along `path`. Elements
    /// that are likely compiler noise, like temporary declarations and
    /// `void`s, are only used when there is nothing better.
    pub fn diagnostic_position(&self, path: PathIndex, tree: &Tree, block: NodeId) -> Option<Span> {
        let elements = self.paths.get(path)?.evaluation_order();

        let classified = elements
            .iter()
            .filter_map(|e| tree.children(block).get(e.child.index).copied())
            .map(|node| (suspicion(tree, node), tree.span(node)))
            .collect::<Vec<_>>();

        let least = classified.iter().map(|(s, _)| *s).min()?;

        classified
            .into_iter()
            .filter(|(s, _)| *s == least)
            .map(|(_, span)| span)
            .reduce(Span::to)
    }

    /// A Mermaid flowchart of the paths. `describe` renders one element.
    pub fn to_mermaid(&self, describe: impl Fn(Element) -> String) -> String {
        let mut out = String::from("flowchart TD\n");

        for (index, path) in self.paths.enumerate() {
            let mut label = format!("{index}{}", self.flags(index));
            let described = path.elements.iter().map(|e| describe(*e)).join("; ");

            if !described.is_empty() {
                label.push_str(": ");
                label.push_str(&described);
            }

            let _ = writeln!(out, "    {index}[\"{}\"]", escape_mermaid(&label));
        }

        for (index, path) in self.paths.enumerate() {
            for follower in &path.followers {
                let arrow = match follower.direction {
                    Direction::Forward => "-->",
                    Direction::Back => "-.->",
                };

                match follower.condition {
                    Some(condition) => {
                        let _ = writeln!(
                            out,
                            "    {index} {arrow}|\"{}\"| {}",
                            escape_mermaid(&describe(condition)),
                            follower.path
                        );
                    }
                    None => {
                        let _ = writeln!(out, "    {index} {arrow} {}", follower.path);
                    }
                }
            }
        }

        out
    }

    fn flags(&self, index: PathIndex) -> String {
        let mut flags = String::new();

        if index == PathIndex::ENTRY {
            flags.push_str(" entry");
        }
        if self.exit == Some(index) {
            flags.push_str(" exit");
        }
        if self.fail_exit == Some(index) {
            flags.push_str(" fail");
        }

        flags
    }
}

/// One path per line: flags, elements as child indices (`?` marks a folded
/// condition), then followers with their guards
impl core::fmt::Display for MaximalPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, path) in self.paths.enumerate() {
            write!(f, "{index}{}:", self.flags(index))?;

            for element in &path.elements {
                let marker = if element.is_condition { "?" } else { "" };
                write!(f, " {marker}#{}", element.child.index)?;
            }

            if !path.followers.is_empty() {
                let followers = path
                    .followers
                    .iter()
                    .map(|follower| {
                        let mut text = follower.path.to_string();
                        if let Some(condition) = follower.condition {
                            text.push_str(&format!(" if #{}", condition.child.index));
                        }
                        if follower.direction == Direction::Back {
                            text.push_str(" (back)");
                        }
                        text
                    })
                    .join(", ");

                write!(f, " -> {followers}")?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Merge { into: PathIndex, from: PathIndex },
    Bypass { empty: PathIndex, to: PathIndex },
}

impl Transition {
    fn removed(self) -> PathIndex {
        match self {
            Transition::Merge { from, .. } => from,
            Transition::Bypass { empty, .. } => empty,
        }
    }
}

/// How likely an element is to be compiler noise, least likely first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Suspicion {
    Plausible,
    PossibleNonsense,
    ProbableNonsense,
}

fn suspicion(tree: &Tree, node: NodeId) -> Suspicion {
    if tree.is_void_value(node) {
        return Suspicion::PossibleNonsense;
    }

    if tree
        .decl_parts(node)
        .is_some_and(|parts| parts.name.is_temporary())
    {
        return Suspicion::ProbableNonsense;
    }

    Suspicion::Plausible
}

fn escape_mermaid(text: &str) -> String {
    text.replace('"', "#quot;")
        .replace('<', "#lt;")
        .replace('>', "#gt;")
}

/// A construct jumps can land on, with the paths that jumped to it so far
struct Scope<'flow> {
    destination: &'flow dyn JumpDestination,
    breaks: Vec<PathIndex>,
    continues: Vec<PathIndex>,
}

impl<'flow> Scope<'flow> {
    fn new(destination: &'flow dyn JumpDestination) -> Self {
        Self {
            destination,
            breaks: Vec::new(),
            continues: Vec::new(),
        }
    }
}

struct PathBuilder<'a> {
    tree: &'a Tree,
    block: NodeId,
    options: PathOptions,
    paths: IndexVec<PathIndex, MaximalPath>,
    scopes: Vec<Scope<'a>>,
    /// Paths that bubbled, innermost or-clause last
    fail_over: Vec<Vec<PathIndex>>,
    /// Paths that jumped to a destination outside the block
    escaping: Vec<PathIndex>,
}

impl<'a> PathBuilder<'a> {
    fn new_path(&mut self) -> PathIndex {
        self.paths.push(MaximalPath::default())
    }

    fn link(
        &mut self,
        from: PathIndex,
        to: PathIndex,
        direction: Direction,
        condition: Option<Element>,
    ) {
        self.paths[from].followers.push(Follower {
            path: to,
            direction,
            condition,
        });
        self.paths[to].preceders.push(Preceder {
            path: from,
            direction,
        });
    }

    /// A fresh path entered from each of `preceders`
    fn join_all(&mut self, preceders: &[PathIndex]) -> PathIndex {
        let joined = self.new_path();

        for preceder in preceders.iter().unique() {
            self.link(*preceder, joined, Direction::Forward, None);
        }

        joined
    }

    /// Like [`Self::join_all`] but continues the sole preceder when nothing
    /// else follows it yet
    fn maybe_join_all(&mut self, preceders: Vec<PathIndex>) -> PathIndex {
        match preceders.as_slice() {
            [sole] if self.paths[*sole].followers.is_empty() => *sole,
            _ => self.join_all(&preceders),
        }
    }

    fn child_node(&self, child: ChildRef) -> Option<NodeId> {
        self.tree.children(self.block).get(child.index).copied()
    }

    fn constant_condition(&self, child: ChildRef) -> Option<bool> {
        if !self.options.fold_constant_conditions {
            return None;
        }

        self.tree.value(self.child_node(child)?)?.as_bool()
    }

    fn yields(&self, node: NodeId) -> bool {
        let node = self
            .tree
            .assignment_parts(node)
            .map(|(_, value)| value)
            .unwrap_or(node);

        matches!(
            self.tree.callee_builtin(node),
            Some(Builtin::Yield) | Some(Builtin::Await)
        )
    }

    fn build_stmt_block(
        &mut self,
        block: &'a StmtBlock,
        preceders: Vec<PathIndex>,
    ) -> Vec<PathIndex> {
        block
            .stmts
            .iter()
            .fold(preceders, |preceders, stmt| self.build_flow(stmt, preceders))
    }

    /// Adds the paths for `flow`, returning the paths control leaves it from
    fn build_flow(&mut self, flow: &'a ControlFlow, preceders: Vec<PathIndex>) -> Vec<PathIndex> {
        match flow {
            ControlFlow::Stmt(child) => self.build_stmt(*child, preceders),
            ControlFlow::StmtBlock(block) => self.build_stmt_block(block, preceders),
            ControlFlow::If(conditional) => self.build_if(conditional, preceders),
            ControlFlow::Loop(lp) => self.build_loop(lp, preceders),
            ControlFlow::Labeled(labeled) => self.build_labeled(labeled, preceders),
            ControlFlow::Jump(jump) => {
                self.build_jump(jump, preceders);
                Vec::new()
            }
            ControlFlow::OrElse(or_else) => self.build_or_else(or_else, preceders),
        }
    }

    fn build_stmt(&mut self, child: ChildRef, preceders: Vec<PathIndex>) -> Vec<PathIndex> {
        let path = self.maybe_join_all(preceders);
        self.paths[path].elements.push(Element {
            path,
            child,
            is_condition: false,
        });

        let Some(node) = self.child_node(child) else {
            return vec![path];
        };

        if self.tree.is_call_to(node, Builtin::Bubble) {
            if let Some(failures) = self.fail_over.last_mut() {
                failures.push(path);
            }
            return Vec::new();
        }

        if self.options.yielding_calls_end_paths && self.yields(node) {
            self.paths[path].ends_at_yield = true;

            let next = self.new_path();
            self.link(path, next, Direction::Forward, None);
            return vec![next];
        }

        vec![path]
    }

    fn build_if(&mut self, conditional: &'a If, preceders: Vec<PathIndex>) -> Vec<PathIndex> {
        let path = self.maybe_join_all(preceders);
        let condition = Element {
            path,
            child: conditional.condition,
            is_condition: true,
        };

        if let Some(value) = self.constant_condition(conditional.condition) {
            self.paths[path].elements.push(condition);

            let (taken, dead) = if value {
                (&conditional.then_clause, &conditional.else_clause)
            } else {
                (&conditional.else_clause, &conditional.then_clause)
            };

            // Dead code still gets paths so every child has an element
            self.build_stmt_block(dead, Vec::new());
            return self.build_stmt_block(taken, vec![path]);
        }

        let into_then = self.new_path();
        self.link(path, into_then, Direction::Forward, Some(condition));
        let into_else = self.new_path();
        self.link(path, into_else, Direction::Forward, None);

        let mut ends = self.build_stmt_block(&conditional.then_clause, vec![into_then]);
        ends.extend(self.build_stmt_block(&conditional.else_clause, vec![into_else]));
        ends
    }

    fn build_loop(&mut self, lp: &'a Loop, preceders: Vec<PathIndex>) -> Vec<PathIndex> {
        let loop_start = self.join_all(&preceders);
        let constant = self.constant_condition(lp.condition);
        let condition = |path| Element {
            path,
            child: lp.condition,
            is_condition: true,
        };

        let mut after_loop = Vec::new();

        let body_start = match lp.check_position {
            CheckPosition::Left if constant == Some(false) => {
                self.paths[loop_start].elements.push(condition(loop_start));
                after_loop.push(loop_start);
                self.new_path()
            }
            CheckPosition::Left => {
                let after_condition = self.new_path();
                self.link(
                    loop_start,
                    after_condition,
                    Direction::Forward,
                    Some(condition(loop_start)),
                );
                if constant.is_none() {
                    after_loop.push(loop_start);
                }
                after_condition
            }
            CheckPosition::Right => loop_start,
        };

        self.scopes.push(Scope::new(lp));
        let mut body_ends = self.build_stmt_block(&lp.body, vec![body_start]);
        let scope = self.pop_scope();
        after_loop.extend(scope.breaks);
        body_ends.extend(scope.continues);

        let before_increment = self.maybe_join_all(body_ends);

        self.scopes.push(Scope::new(lp));
        let mut increment_ends = self.build_stmt_block(&lp.increment, vec![before_increment]);
        let scope = self.pop_scope();
        after_loop.extend(scope.breaks);
        increment_ends.extend(scope.continues);

        let before_continue = self.maybe_join_all(increment_ends);

        match lp.check_position {
            CheckPosition::Left => {
                self.link(before_continue, loop_start, Direction::Back, None);
            }
            CheckPosition::Right if constant == Some(false) => {
                self.paths[before_continue]
                    .elements
                    .push(condition(before_continue));
                after_loop.push(before_continue);
            }
            CheckPosition::Right => {
                let continue_path = self.new_path();
                self.link(
                    before_continue,
                    continue_path,
                    Direction::Forward,
                    Some(condition(before_continue)),
                );
                self.link(continue_path, loop_start, Direction::Back, None);

                if constant.is_none() {
                    after_loop.push(before_continue);
                }
            }
        }

        after_loop
    }

    fn build_labeled(&mut self, labeled: &'a Labeled, preceders: Vec<PathIndex>) -> Vec<PathIndex> {
        self.scopes.push(Scope::new(labeled));
        let mut ends = self.build_stmt_block(&labeled.stmts, preceders);
        let scope = self.pop_scope();

        ends.extend(scope.breaks);
        ends.extend(scope.continues);
        ends
    }

    fn build_jump(&mut self, jump: &Jump, preceders: Vec<PathIndex>) {
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.destination.matches(jump));

        match (scope, jump.kind) {
            (Some(scope), JumpKind::Break) => scope.breaks.extend(preceders),
            (Some(scope), JumpKind::Continue) => scope.continues.extend(preceders),
            (None, _) => self.escaping.extend(preceders),
        }
    }

    fn build_or_else(&mut self, or_else: &'a OrElse, preceders: Vec<PathIndex>) -> Vec<PathIndex> {
        let before_then = self.maybe_join_all(preceders);

        let or_start = if self.options.assume_failure_can_happen {
            let start = self.new_path();
            self.link(before_then, start, Direction::Forward, None);
            start
        } else {
            before_then
        };

        self.fail_over.push(Vec::new());
        self.scopes.push(Scope::new(&or_else.or_clause));
        let mut ends = self.build_stmt_block(&or_else.or_clause.stmts, vec![or_start]);
        let scope = self.pop_scope();
        let mut start_of_else = self.fail_over.pop().unwrap_or_default();

        start_of_else.extend(scope.breaks);
        ends.extend(scope.continues);

        if start_of_else.is_empty() && self.options.assume_failure_can_happen {
            start_of_else.push(before_then);
        }

        if start_of_else.is_empty() {
            self.build_stmt_block(&or_else.else_clause, Vec::new());
            return ends;
        }

        let else_start = self.join_all(&start_of_else);
        ends.extend(self.build_stmt_block(&or_else.else_clause, vec![else_start]));
        ends
    }

    fn pop_scope(&mut self) -> Scope<'a> {
        self.scopes.pop().unwrap_or_else(|| {
            unreachable!("scopes are pushed and popped in pairs")
        })
    }
}
