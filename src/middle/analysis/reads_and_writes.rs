//! Where each name of one body is declared, read and written, tied to the
//! maximal path elements that contain those occurrences.
//!
//! The summary is built from scratch for a tree and is never updated. After
//! changing the tree, build a new one.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::{
    index::{IndexVec, simple_index},
    middle::{
        flow::{Direction, Element, MaximalPaths, PathIndex, PathOptions},
        tree::{
            NodeId, NodeKind, Tree,
            control_flow::ChildRef,
            name::Name,
            value::{Builtin, MetadataKey, Value},
            visit,
        },
        ty::Type,
    },
};

simple_index! {
    pub struct ReadId;
}

simple_index! {
    pub struct WriteId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadKind {
    Read,
    /// The name is used as a value without being evaluated, like a type
    /// mentioned in a declaration or a function referring to its own name
    ReifiedRead,
}

#[derive(Debug, Clone)]
pub struct Read {
    pub name: Name,
    pub kind: ReadKind,
    /// `None` for the implicit read of the output name when the body exits
    pub node: Option<NodeId>,
    pub element: Option<Element>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// `x = e` as a whole statement
    SimpleAssignment,
    /// `x = e` inside some bigger expression
    NestedAssignment,
    /// Anything else, like the failure flag of `hs` or binding a parameter
    Other,
}

impl WriteKind {
    pub fn is_assignment(self) -> bool {
        matches!(self, Self::SimpleAssignment | Self::NestedAssignment)
    }
}

#[derive(Debug, Clone)]
pub struct Write {
    pub name: Name,
    pub kind: WriteKind,
    /// The writing call. `None` for the implicit writes of inputs.
    pub node: Option<NodeId>,
    /// When the assigned value is just a name, the read of it
    pub assigned: Option<ReadId>,
    pub element: Option<Element>,
}

/// The names a body receives and returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySignature {
    pub inputs: Vec<Name>,
    pub output: Option<Name>,
}

impl BodySignature {
    /// Parameters and return name when `body` is a function body, nothing
    /// otherwise
    pub fn of(tree: &Tree, body: NodeId) -> Self {
        let Some(fun) = tree.parent(body) else {
            return Self::default();
        };

        let Some(parts) = tree.fun_parts(fun).filter(|parts| parts.body == body) else {
            return Self::default();
        };

        Self {
            inputs: parts
                .formals
                .iter()
                .filter_map(|formal| tree.decl_parts(*formal))
                .map(|decl| decl.name)
                .collect(),
            output: parts
                .return_decl
                .and_then(|decl| tree.decl_parts(decl))
                .map(|decl| decl.name),
        }
    }
}

type LiveWrites = BTreeMap<Name, BTreeSet<WriteId>>;

#[derive(Debug, Clone)]
pub struct ReadsAndWrites {
    pub body: NodeId,
    pub paths: MaximalPaths,
    pub input_names: Vec<Name>,
    pub output_name: Option<Name>,
    /// Names declared in the body that no nested function mentions
    pub local_names: BTreeSet<Name>,
    /// Every declaration outside nested functions, by declared name
    pub declarations: BTreeMap<Name, Vec<NodeId>>,
    read_table: IndexVec<ReadId, Read>,
    write_table: IndexVec<WriteId, Write>,
    reads: BTreeMap<Name, Vec<ReadId>>,
    writes: BTreeMap<Name, Vec<WriteId>>,
    read_by_node: HashMap<NodeId, ReadId>,
    reads_by_element: HashMap<ChildRef, Vec<ReadId>>,
    writes_by_element: HashMap<ChildRef, Vec<WriteId>>,
    decls_by_element: HashMap<ChildRef, Vec<NodeId>>,
    elements: HashMap<ChildRef, Element>,
    nested_functions: HashMap<ChildRef, Vec<NodeId>>,
    canonical_names: HashMap<NodeId, Name>,
    input_writes: HashMap<Name, WriteId>,
    return_read: Option<ReadId>,
    upstream: HashMap<ReadId, BTreeSet<WriteId>>,
    downstream: HashMap<WriteId, BTreeSet<ReadId>>,
}

impl ReadsAndWrites {
    /// Summarizes `body`, taking its inputs and output from the enclosing
    /// function if there is one
    pub fn for_body(tree: &Tree, body: NodeId) -> Self {
        let signature = BodySignature::of(tree, body);
        Self::build(tree, body, &signature.inputs, signature.output)
    }

    pub fn build(
        tree: &Tree,
        body: NodeId,
        input_names: &[Name],
        output_name: Option<Name>,
    ) -> Self {
        let options = PathOptions {
            assume_failure_can_happen: true,
            ..PathOptions::default()
        };

        let mut summary = Self {
            body,
            paths: MaximalPaths::build(tree, body, options),
            input_names: input_names.to_vec(),
            output_name,
            local_names: BTreeSet::new(),
            declarations: BTreeMap::new(),
            read_table: IndexVec::new(),
            write_table: IndexVec::new(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            read_by_node: HashMap::new(),
            reads_by_element: HashMap::new(),
            writes_by_element: HashMap::new(),
            decls_by_element: HashMap::new(),
            elements: HashMap::new(),
            nested_functions: HashMap::new(),
            canonical_names: HashMap::new(),
            input_writes: HashMap::new(),
            return_read: None,
            upstream: HashMap::new(),
            downstream: HashMap::new(),
        };

        for name in input_names {
            let write = summary.add_write(Write {
                name: *name,
                kind: WriteKind::Other,
                node: None,
                assigned: None,
                element: None,
            });
            summary.input_writes.insert(*name, write);
        }

        let elements = summary.paths.elements().collect::<Vec<_>>();
        for element in elements {
            summary.elements.insert(element.child, element);

            if let Some(node) = tree.children(body).get(element.child.index).copied() {
                summary.collect_element(tree, element, node);
            }
        }

        if let Some(output) = output_name {
            let read = summary.add_read(Read {
                name: output,
                kind: ReadKind::Read,
                node: None,
                element: None,
            });
            summary.return_read = Some(read);
        }

        summary.find_canonical_names(tree);
        summary.find_local_names(tree);
        summary.compute_liveness();

        debug!(
            body = ?body,
            names = summary.local_names.len(),
            reads = summary.read_table.len(),
            writes = summary.write_table.len(),
            "summarized reads and writes"
        );

        summary
    }

    fn add_read(&mut self, read: Read) -> ReadId {
        let name = read.name;
        let node = read.node;
        let element = read.element;
        let id = self.read_table.push(read);

        self.reads.entry(name).or_default().push(id);
        if let Some(node) = node {
            self.read_by_node.insert(node, id);
        }
        if let Some(element) = element {
            self.reads_by_element.entry(element.child).or_default().push(id);
        }

        id
    }

    fn add_write(&mut self, write: Write) -> WriteId {
        let name = write.name;
        let element = write.element;
        let id = self.write_table.push(write);

        self.writes.entry(name).or_default().push(id);
        if let Some(element) = element {
            self.writes_by_element.entry(element.child).or_default().push(id);
        }

        id
    }

    /// Records the occurrences inside one element. Nested function bodies are
    /// not entered.
    fn collect_element(&mut self, tree: &Tree, element: Element, root: NodeId) {
        if tree.decl_parts(root).is_some() {
            self.decls_by_element.entry(element.child).or_default().push(root);
        }

        // Writes wait for the reads of their assigned values
        let mut pending_writes = Vec::new();

        visit::walk_pre_order(tree, root, &mut |tree, node| {
            match tree.kind(node) {
                NodeKind::RightName(name) => {
                    self.add_read(Read {
                        name: *name,
                        kind: ReadKind::Read,
                        node: Some(node),
                        element: Some(element),
                    });
                }
                NodeKind::Value(Value::Type(Type::Named(name))) => {
                    self.add_read(Read {
                        name: *name,
                        kind: ReadKind::ReifiedRead,
                        node: Some(node),
                        element: Some(element),
                    });
                }
                NodeKind::Decl => {
                    if let Some(parts) = tree.decl_parts(node) {
                        self.declarations.entry(parts.name).or_default().push(node);
                    }
                }
                NodeKind::Fun => {
                    self.nested_functions.entry(element.child).or_default().push(node);
                    return false;
                }
                NodeKind::Call => {
                    if let Some(write) = written_name(tree, node) {
                        pending_writes.push((node, write));
                    }
                }
                _ => {}
            }

            true
        });

        for (node, (name, builtin)) in pending_writes {
            let kind = match builtin {
                Builtin::SetLocal if node == root => WriteKind::SimpleAssignment,
                Builtin::SetLocal => WriteKind::NestedAssignment,
                _ => WriteKind::Other,
            };

            let assigned = match builtin {
                Builtin::SetLocal => tree
                    .children(node)
                    .get(2)
                    .and_then(|value| self.read_by_node.get(value))
                    .copied(),
                _ => None,
            };

            self.add_write(Write {
                name,
                kind,
                node: Some(node),
                assigned,
                element: Some(element),
            });
        }
    }

    /// A function assigned to a name declared `@ssa` goes by that name
    fn find_canonical_names(&mut self, tree: &Tree) {
        let functions = self
            .nested_functions
            .iter()
            .flat_map(|(child, funs)| funs.iter().map(move |f| (*child, *f)))
            .collect::<Vec<_>>();

        for (child, fun) in functions {
            let Some(parent) = tree.parent(fun) else {
                continue;
            };

            let Some((name, value)) = tree.assignment_parts(parent) else {
                continue;
            };

            let single_ssa_decl = match self.declarations.get(&name).map(Vec::as_slice) {
                Some([decl]) => tree
                    .decl_parts(*decl)
                    .is_some_and(|parts| parts.has(MetadataKey::Ssa)),
                _ => false,
            };

            if value != fun || !single_ssa_decl {
                continue;
            }

            self.canonical_names.insert(fun, name);
            let element = self.elements.get(&child).copied();
            self.add_read(Read {
                name,
                kind: ReadKind::ReifiedRead,
                node: Some(fun),
                element,
            });
        }
    }

    fn find_local_names(&mut self, tree: &Tree) {
        let mut mentioned_in_functions = HashSet::new();

        for fun in self.nested_functions.values().flatten() {
            visit::walk_pre_order(tree, *fun, &mut |tree, node| {
                match tree.kind(node) {
                    NodeKind::LeftName(name) | NodeKind::RightName(name) => {
                        mentioned_in_functions.insert(*name);
                    }
                    NodeKind::Value(Value::Type(Type::Named(name))) => {
                        mentioned_in_functions.insert(*name);
                    }
                    _ => {}
                }
                true
            });
        }

        self.local_names = self
            .declarations
            .keys()
            .filter(|name| !mentioned_in_functions.contains(*name))
            .copied()
            .collect();
    }

    /* Liveness */

    /// Applies one element's effect to the live writes: its reads see the
    /// writes live before it, then declarations reset and writes replace
    fn transfer(
        &self,
        live: &mut LiveWrites,
        element: Element,
        mut on_read: impl FnMut(ReadId, &LiveWrites),
    ) {
        for read in self.reads_at(element.child) {
            on_read(*read, live);
        }

        for decl in self.decls_at(element.child) {
            if let Some(name) = self.declared_name(*decl) {
                live.remove(&name);
            }
        }

        // Inner writes complete before outer ones
        for write in self.writes_at(element.child).iter().rev() {
            let name = self.write_table[*write].name;
            live.insert(name, BTreeSet::from([*write]));
        }
    }

    fn declared_name(&self, decl: NodeId) -> Option<Name> {
        self.declarations
            .iter()
            .find(|(_, decls)| decls.contains(&decl))
            .map(|(name, _)| *name)
    }

    fn compute_liveness(&mut self) {
        let used = self.names_used_in_or_after();
        let before_entry = self
            .input_writes
            .iter()
            .map(|(name, write)| (*name, BTreeSet::from([*write])))
            .collect::<LiveWrites>();

        let order = self.paths.ordered_path_indices(Direction::Back);
        let mut at_start: HashMap<PathIndex, LiveWrites> = HashMap::new();
        let mut at_end: HashMap<PathIndex, LiveWrites> = HashMap::new();

        let mut changed = true;
        while changed {
            changed = false;

            for index in &order {
                let path = &self.paths[*index];
                let mut live = LiveWrites::new();

                let mut merge = |from: &LiveWrites| {
                    for (name, writes) in from {
                        if used.get(index).is_some_and(|u| u.contains(name)) {
                            live.entry(*name).or_default().extend(writes.iter().copied());
                        }
                    }
                };

                if *index == self.paths.entry() {
                    merge(&before_entry);
                }
                for preceder in &path.preceders {
                    if let Some(end) = at_end.get(&preceder.path) {
                        merge(end);
                    }
                }

                if at_start.get(index) == Some(&live) && at_end.contains_key(index) {
                    continue;
                }

                at_start.insert(*index, live.clone());
                for element in path.evaluation_order() {
                    self.transfer(&mut live, element, |_, _| {});
                }

                if at_end.get(index) != Some(&live) {
                    at_end.insert(*index, live);
                    changed = true;
                }
            }
        }

        let mut upstream = HashMap::new();
        for index in self.paths.indices() {
            let mut live = at_start.get(&index).cloned().unwrap_or_default();

            for element in self.paths[index].evaluation_order() {
                self.transfer(&mut live, element, |read, live| {
                    let name = self.read_table[read].name;
                    upstream.insert(read, live.get(&name).cloned().unwrap_or_default());
                });
            }
        }

        if let (Some(read), Some(exit)) = (self.return_read, self.paths.exit) {
            let name = self.read_table[read].name;
            let live = at_end
                .get(&exit)
                .and_then(|live| live.get(&name))
                .cloned()
                .unwrap_or_default();
            upstream.insert(read, live);
        }

        let mut downstream: HashMap<WriteId, BTreeSet<ReadId>> = HashMap::new();
        for (read, writes) in &upstream {
            for write in writes {
                downstream.entry(*write).or_default().insert(*read);
            }
        }

        trace!(upstream = ?upstream, "computed liveness");

        self.upstream = upstream;
        self.downstream = downstream;
    }

    /// For each path, the names read in it or in anything that can follow it
    fn names_used_in_or_after(&self) -> HashMap<PathIndex, HashSet<Name>> {
        let mut used: HashMap<PathIndex, HashSet<Name>> = HashMap::new();
        let order = self.paths.ordered_path_indices(Direction::Forward);

        let mut changed = true;
        while changed {
            changed = false;

            for index in &order {
                let path = &self.paths[*index];
                let mut names = used.get(index).cloned().unwrap_or_default();
                let before = names.len();

                for element in path.evaluation_order() {
                    for read in self.reads_at(element.child) {
                        names.insert(self.read_table[*read].name);
                    }
                }

                for follower in &path.followers {
                    if let Some(after) = used.get(&follower.path) {
                        names.extend(after.iter().copied());
                    }
                }

                if Some(*index) == self.paths.exit {
                    names.extend(self.output_name);
                }

                if names.len() != before || !used.contains_key(index) {
                    used.insert(*index, names);
                    changed = true;
                }
            }
        }

        used
    }

    /* Queries */

    pub fn read(&self, id: ReadId) -> &Read {
        &self.read_table[id]
    }

    pub fn write(&self, id: WriteId) -> &Write {
        &self.write_table[id]
    }

    pub fn reads_of(&self, name: Name) -> &[ReadId] {
        self.reads.get(&name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn writes_of(&self, name: Name) -> &[WriteId] {
        self.writes.get(&name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn declarations_of(&self, name: Name) -> &[NodeId] {
        self.declarations
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every written name with its writes, in name order
    pub fn all_writes(&self) -> impl Iterator<Item = (Name, &[WriteId])> {
        self.writes.iter().map(|(name, writes)| (*name, writes.as_slice()))
    }

    pub fn reads_at(&self, child: ChildRef) -> &[ReadId] {
        self.reads_by_element
            .get(&child)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn writes_at(&self, child: ChildRef) -> &[WriteId] {
        self.writes_by_element
            .get(&child)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Declarations that are themselves the element
    pub fn decls_at(&self, child: ChildRef) -> &[NodeId] {
        self.decls_by_element
            .get(&child)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn element(&self, child: ChildRef) -> Option<Element> {
        self.elements.get(&child).copied()
    }

    pub fn nested_functions_at(&self, child: ChildRef) -> &[NodeId] {
        self.nested_functions
            .get(&child)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn canonical_name(&self, fun: NodeId) -> Option<Name> {
        self.canonical_names.get(&fun).copied()
    }

    pub fn input_write(&self, name: Name) -> Option<WriteId> {
        self.input_writes.get(&name).copied()
    }

    pub fn return_read(&self) -> Option<ReadId> {
        self.return_read
    }

    /// The writes whose values `read` may see
    pub fn upstream(&self, read: ReadId) -> Option<&BTreeSet<WriteId>> {
        self.upstream.get(&read)
    }

    /// The reads that may see the value `write` stores
    pub fn downstream(&self, write: WriteId) -> Option<&BTreeSet<ReadId>> {
        self.downstream.get(&write)
    }

    /// The writes of `name` that may be current when `at` starts running.
    ///
    /// Walks backwards from `at`, stopping along each route at the name's
    /// declaration or at the nearest element writing it. When `at` is inside a
    /// loop, its own writes from the previous iteration count. The write
    /// binding an input name is always included.
    pub fn writes_live(&self, name: Name, at: ChildRef) -> Vec<WriteId> {
        let mut live = Vec::new();

        if let Some(start) = self.elements.get(&at) {
            let mut queue = VecDeque::from([(start.path, true)]);
            let mut visited = HashSet::new();

            while let Some((index, from_start)) = queue.pop_front() {
                let order = self.paths[index].evaluation_order();
                let mut items = order.iter().rev();

                if from_start {
                    for element in items.by_ref() {
                        if element.child == at {
                            break;
                        }
                    }
                }

                let mut stopped = false;

                for element in items {
                    let reached_start = !from_start && element.child == at;

                    if !reached_start && self.declares(element.child, name) {
                        stopped = true;
                        break;
                    }

                    let writes = self
                        .writes_at(element.child)
                        .iter()
                        .filter(|w| self.write_table[**w].name == name)
                        .copied()
                        .collect::<Vec<_>>();

                    if !writes.is_empty() || reached_start {
                        for write in writes {
                            if !live.contains(&write) {
                                live.push(write);
                            }
                        }
                        stopped = true;
                        break;
                    }
                }

                if stopped {
                    continue;
                }

                for preceder in &self.paths[index].preceders {
                    if visited.insert(preceder.path) {
                        queue.push_back((preceder.path, false));
                    }
                }
            }
        }

        if let Some(input) = self.input_writes.get(&name) {
            if !live.contains(input) {
                live.push(*input);
            }
        }

        live
    }

    fn declares(&self, child: ChildRef, name: Name) -> bool {
        self.decls_at(child)
            .iter()
            .any(|decl| self.declarations_of(name).contains(decl))
    }

    /// Whether `declared` is declared at a point where a write of `assigned`
    /// is already live. Renaming `assigned`'s writes to `declared` would then
    /// write `declared` before its declaration.
    pub fn declared_after_assignment(&self, tree: &Tree, declared: Name, assigned: Name) -> bool {
        let decls = self.declarations_of(declared);

        let [decl] = decls else {
            return !decls.is_empty();
        };

        let Some(edge) = tree.edge_of(*decl) else {
            return false;
        };

        if edge.parent != self.body {
            return false;
        }

        let live = self.writes_live(assigned, ChildRef::new(edge.index));
        live.iter()
            .any(|write| self.write_table[*write].element.is_some())
    }
}

/// The name a call writes and the builtin writing it, for `x = e` and
/// `hs(x, e)`
pub fn written_name(tree: &Tree, call: NodeId) -> Option<(Name, Builtin)> {
    let builtin = tree.callee_builtin(call)?;

    if !builtin.assigns_argument_one() {
        return None;
    }

    let target = tree.children(call).get(1)?;
    Some((tree.left_name(*target)?, builtin))
}
