//! The tree the middle tier rewrites. Nodes live in an arena and refer to each
//! other by [`NodeId`]. Every node except the root hangs off exactly one
//! parent slot, so moving a subtree is two steps:
//!
//! 1. [`Tree::free`] detaches it, leaving a `void` placeholder in the old slot
//! 2. [`Tree::replace`], [`Tree::insert_child`] or [`Tree::push_child`]
//!    replants it
//!
//! Detached nodes stay in the arena until the tree is dropped.

use std::{borrow::Cow, collections::BTreeSet};

use self::{
    control_flow::{ChildRef, StmtBlock},
    name::{JumpLabel, Name},
    value::{Builtin, MetadataKey, Value},
};
use crate::{
    frontend::Span,
    index::{IndexVec, simple_index},
    middle::ty::Type,
};

pub mod control_flow;
pub mod name;
pub mod pseudo_code;
pub mod value;
pub mod visit;

simple_index! {
    /// Identifies a node in a [`Tree`]
    pub struct NodeId;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Block(BlockFlow),
    /// Children are the callee followed by the arguments
    Call,
    /// Children are the declared [`NodeKind::LeftName`] followed by metadata
    /// key/value pairs
    Decl,
    /// Children are formal parameter declarations, an optional return
    /// declaration, and the body
    Fun,
    /// A name being assigned
    LeftName(Name),
    /// A name being read
    RightName(Name),
    Value(Value),
    /// Subtrees passed through to the backend as written
    Esc,
    /// Opaque token threaded through without inspection
    Stay,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockFlow {
    /// Children run in order. The last one is the result.
    Linear { label: Option<JumpLabel> },
    /// Children run as the flow dictates
    Structured(StmtBlock),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub span: Span,
    pub kind: NodeKind,
    pub ty: Option<Type>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// A parent's child slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub parent: NodeId,
    pub index: usize,
}

impl Edge {
    pub fn new(parent: NodeId, index: usize) -> Self {
        Self { parent, index }
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: IndexVec<NodeId, Node>,
    root: NodeId,
}

/// The parts of a [`NodeKind::Decl`]
#[derive(Debug, Clone)]
pub struct DeclParts {
    pub name: Name,
    pub name_node: NodeId,
    /// Key and value node of each metadata entry, in order
    pub metadata: Vec<(MetadataKey, NodeId)>,
}

impl DeclParts {
    pub fn has(&self, key: MetadataKey) -> bool {
        self.metadata.iter().any(|(k, _)| *k == key)
    }

    pub fn is_var(&self) -> bool {
        self.has(MetadataKey::Var)
    }
}

/// The parts of a [`NodeKind::Fun`]
#[derive(Debug, Clone)]
pub struct FunParts {
    pub formals: Vec<NodeId>,
    pub return_decl: Option<NodeId>,
    pub body: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree whose root is an empty linear block
    pub fn new() -> Self {
        let mut nodes = IndexVec::new();
        let root = nodes.push(Node {
            span: Span::EMPTY,
            kind: NodeKind::Block(BlockFlow::Linear { label: None }),
            ty: None,
            children: Vec::new(),
            parent: None,
        });

        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Makes a detached node the root
    pub fn set_root(&mut self, root: NodeId) {
        debug_assert!(self.is_free(root));
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Mutable access to kind, span and type. Structure only changes through
    /// the edge operations.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn ty(&self, id: NodeId) -> Option<&Type> {
        self.nodes[id].ty.as_ref()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.nodes[id].children[index]
    }

    pub fn child_at(&self, edge: Edge) -> NodeId {
        self.child(edge.parent, edge.index)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_free(&self, id: NodeId) -> bool {
        self.nodes[id].parent.is_none() && id != self.root
    }

    /// The slot holding `id`, or `None` for the root and detached nodes
    pub fn edge_of(&self, id: NodeId) -> Option<Edge> {
        let parent = self.nodes[id].parent?;
        let index = self.nodes[parent].children.iter().position(|c| *c == id)?;

        Some(Edge::new(parent, index))
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);

        while let Some(node) = current {
            if node == ancestor {
                return true;
            }

            current = self.parent(node);
        }

        false
    }

    /* Construction */

    /// Adds a node adopting `children`, which must all be detached
    pub fn add(&mut self, span: Span, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let id = self.nodes.next_index();

        for child in &children {
            debug_assert!(self.is_free(*child), "{child:?} already has a parent");
            self.nodes[*child].parent = Some(id);
        }

        self.nodes.push(Node {
            span,
            kind,
            ty: None,
            children,
            parent: None,
        })
    }

    pub fn add_typed(
        &mut self,
        span: Span,
        kind: NodeKind,
        ty: Option<Type>,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = self.add(span, kind, children);
        self.nodes[id].ty = ty;
        id
    }

    pub fn add_value(&mut self, span: Span, value: Value) -> NodeId {
        let ty = value.ty();
        self.add_typed(span, NodeKind::Value(value), Some(ty), Vec::new())
    }

    pub fn add_void(&mut self, span: Span) -> NodeId {
        self.add_value(span, Value::Void)
    }

    pub fn add_right_name(&mut self, span: Span, name: Name) -> NodeId {
        self.add(span, NodeKind::RightName(name), Vec::new())
    }

    pub fn add_left_name(&mut self, span: Span, name: Name) -> NodeId {
        self.add(span, NodeKind::LeftName(name), Vec::new())
    }

    /// `callee(args...)` where the callee is a builtin
    pub fn add_builtin_call(&mut self, span: Span, builtin: Builtin, args: Vec<NodeId>) -> NodeId {
        let callee = self.add_value(span, Value::Fn(builtin));
        let children = std::iter::once(callee).chain(args).collect();

        self.add(span, NodeKind::Call, children)
    }

    /// `name = value`
    pub fn add_assignment(&mut self, span: Span, name: Name, value: NodeId) -> NodeId {
        let left = self.add_left_name(span, name);
        self.add_builtin_call(span, Builtin::SetLocal, vec![left, value])
    }

    pub fn add_decl(
        &mut self,
        span: Span,
        name: Name,
        metadata: Vec<(MetadataKey, Value)>,
    ) -> NodeId {
        let mut children = vec![self.add_left_name(span, name)];

        for (key, value) in metadata {
            children.push(self.add_value(span, Value::Key(key)));
            children.push(self.add_value(span, value));
        }

        self.add(span, NodeKind::Decl, children)
    }

    pub fn add_linear_block(&mut self, span: Span, children: Vec<NodeId>) -> NodeId {
        self.add(
            span,
            NodeKind::Block(BlockFlow::Linear { label: None }),
            children,
        )
    }

    /* Edge operations */

    /// Puts `replacement` in the slot, returning the now detached previous
    /// occupant
    pub fn replace(&mut self, edge: Edge, replacement: NodeId) -> NodeId {
        debug_assert!(self.is_free(replacement), "{replacement:?} already has a parent");

        let previous = std::mem::replace(
            &mut self.nodes[edge.parent].children[edge.index],
            replacement,
        );

        self.nodes[previous].parent = None;
        self.nodes[replacement].parent = Some(edge.parent);

        previous
    }

    /// Detaches `id`, leaving a `void` in its slot
    pub fn free(&mut self, id: NodeId) -> NodeId {
        if let Some(edge) = self.edge_of(id) {
            let placeholder = self.add_void(self.span(id));
            self.replace(edge, placeholder);
        }

        id
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(self.is_free(child), "{child:?} already has a parent");

        self.nodes[parent].children.insert(index, child);
        self.nodes[child].parent = Some(parent);
    }

    /// Appends `child`, returning its index
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) -> usize {
        let index = self.nodes[parent].children.len();
        self.insert_child(parent, index, child);
        index
    }

    /// Removes the child at `index`, shifting later siblings left. Only valid
    /// where no flow refers to children by index.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        let child = self.nodes[parent].children.remove(index);
        self.nodes[child].parent = None;
        child
    }

    /// Swaps the whole child list
    pub fn replace_children(&mut self, parent: NodeId, children: Vec<NodeId>) -> Vec<NodeId> {
        let previous = std::mem::take(&mut self.nodes[parent].children);

        for child in &previous {
            self.nodes[*child].parent = None;
        }

        for child in &children {
            debug_assert!(self.is_free(*child), "{child:?} already has a parent");
            self.nodes[*child].parent = Some(parent);
        }

        self.nodes[parent].children = children;
        previous
    }

    /// Copies the subtree at `id`. The copy is detached.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let children = self.children(id).to_vec();
        let copies = children.into_iter().map(|c| self.deep_copy(c)).collect();
        let Node { span, kind, ty, .. } = self.nodes[id].clone();

        self.add_typed(span, kind, ty, copies)
    }

    /* Queries */

    pub fn value(&self, id: NodeId) -> Option<&Value> {
        match self.kind(id) {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn right_name(&self, id: NodeId) -> Option<Name> {
        match self.kind(id) {
            NodeKind::RightName(name) => Some(*name),
            _ => None,
        }
    }

    pub fn left_name(&self, id: NodeId) -> Option<Name> {
        match self.kind(id) {
            NodeKind::LeftName(name) => Some(*name),
            _ => None,
        }
    }

    pub fn is_name(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::LeftName(_) | NodeKind::RightName(_))
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Block(_))
    }

    pub fn is_fun(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Fun)
    }

    pub fn is_void_value(&self, id: NodeId) -> bool {
        self.value(id).is_some_and(Value::is_void)
    }

    /// The builtin a call invokes, if any
    pub fn callee_builtin(&self, id: NodeId) -> Option<Builtin> {
        if !matches!(self.kind(id), NodeKind::Call) {
            return None;
        }

        match self.value(*self.children(id).first()?) {
            Some(Value::Fn(builtin)) => Some(*builtin),
            _ => None,
        }
    }

    pub fn is_call_to(&self, id: NodeId, builtin: Builtin) -> bool {
        self.callee_builtin(id) == Some(builtin)
    }

    /// For `name = value`, the assigned name and the value node
    pub fn assignment_parts(&self, id: NodeId) -> Option<(Name, NodeId)> {
        if !self.is_call_to(id, Builtin::SetLocal) || self.children(id).len() != 3 {
            return None;
        }

        Some((self.left_name(self.child(id, 1))?, self.child(id, 2)))
    }

    pub fn block_flow(&self, id: NodeId) -> Option<&BlockFlow> {
        match self.kind(id) {
            NodeKind::Block(flow) => Some(flow),
            _ => None,
        }
    }

    pub fn is_linear_block(&self, id: NodeId) -> bool {
        matches!(self.block_flow(id), Some(BlockFlow::Linear { .. }))
    }

    pub fn structured_flow(&self, id: NodeId) -> Option<&StmtBlock> {
        match self.block_flow(id) {
            Some(BlockFlow::Structured(flow)) => Some(flow),
            _ => None,
        }
    }

    /// The flow of a block, with linear blocks seen as running their
    /// children in order
    pub fn effective_flow(&self, id: NodeId) -> Cow<'_, StmtBlock> {
        match self.block_flow(id) {
            Some(BlockFlow::Structured(flow)) => Cow::Borrowed(flow),
            _ => Cow::Owned(StmtBlock::sequential(self.children(id).len())),
        }
    }

    pub fn structured_flow_mut(&mut self, id: NodeId) -> Option<&mut StmtBlock> {
        match &mut self.nodes[id].kind {
            NodeKind::Block(BlockFlow::Structured(flow)) => Some(flow),
            _ => None,
        }
    }

    pub fn set_flow(&mut self, id: NodeId, flow: BlockFlow) {
        debug_assert!(self.is_block(id));
        self.nodes[id].kind = NodeKind::Block(flow);
    }

    pub fn decl_parts(&self, id: NodeId) -> Option<DeclParts> {
        if !matches!(self.kind(id), NodeKind::Decl) {
            return None;
        }

        let children = self.children(id);
        let name_node = *children.first()?;
        let name = self.left_name(name_node)?;

        let metadata = children[1..]
            .chunks(2)
            .filter_map(|pair| match (self.value(pair[0]), pair.get(1)) {
                (Some(Value::Key(key)), Some(value)) => Some((*key, *value)),
                _ => None,
            })
            .collect();

        Some(DeclParts {
            name,
            name_node,
            metadata,
        })
    }

    /// Adds `key: value` to a declaration unless the key is already there
    pub fn add_metadata(&mut self, decl: NodeId, key: MetadataKey, value: Value) {
        if self.decl_parts(decl).is_some_and(|parts| parts.has(key)) {
            return;
        }

        let span = self.span(decl);
        let key_node = self.add_value(span, Value::Key(key));
        let value_node = self.add_value(span, value);

        self.push_child(decl, key_node);
        self.push_child(decl, value_node);
    }

    /// The declared type of a declaration
    pub fn decl_type(&self, decl: NodeId) -> Option<&Type> {
        let parts = self.decl_parts(decl)?;
        let (_, value) = parts
            .metadata
            .iter()
            .find(|(key, _)| *key == MetadataKey::Type)?;

        match self.value(*value) {
            Some(Value::Type(ty)) => Some(ty),
            _ => None,
        }
    }

    pub fn fun_parts(&self, id: NodeId) -> Option<FunParts> {
        if !self.is_fun(id) {
            return None;
        }

        let (body, declarations) = self.children(id).split_last()?;
        let mut formals = declarations.to_vec();

        let return_decl = formals
            .last()
            .copied()
            .filter(|decl| {
                self.decl_parts(*decl)
                    .is_some_and(|parts| parts.has(MetadataKey::Return))
            });

        if return_decl.is_some() {
            formals.pop();
        }

        Some(FunParts {
            formals,
            return_decl,
            body: *body,
        })
    }

    /// Function bodies nested anywhere under `id` plus `id` itself when it is
    /// a block, innermost first
    pub fn bodies_innermost_first(&self, id: NodeId) -> Vec<NodeId> {
        let mut bodies = Vec::new();

        visit::walk_pre_order(self, id, &mut |tree, node| {
            if node == id && tree.is_block(node) {
                bodies.push(node);
            } else if let Some(parts) = tree.fun_parts(node) {
                bodies.push(parts.body);
            }
            true
        });

        bodies.reverse();
        bodies
    }

    /// Compares the subtree at `a` with the subtree at `b` in `other`
    pub fn structurally_equal(&self, a: NodeId, other: &Tree, b: NodeId) -> bool {
        let left = self.node(a);
        let right = other.node(b);

        left.kind == right.kind
            && left.ty == right.ty
            && left.children.len() == right.children.len()
            && left
                .children
                .iter()
                .zip(&right.children)
                .all(|(x, y)| self.structurally_equal(*x, other, *y))
    }
}

/// A violation of the rule that a structured flow references each of its
/// block's children exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowSoundnessProblem {
    Duplicate { block: NodeId, child: ChildRef },
    Orphan { block: NodeId, child: ChildRef },
    OutOfBounds { block: NodeId, child: ChildRef },
}

/// Checks every structured block under `root`, including nested functions
pub fn check_flow_soundness(tree: &Tree, root: NodeId) -> Vec<FlowSoundnessProblem> {
    let mut problems = Vec::new();

    visit::walk_pre_order(tree, root, &mut |tree, node| {
        let Some(flow) = tree.structured_flow(node) else {
            return true;
        };

        let child_count = tree.children(node).len();
        let mut seen = BTreeSet::new();

        for child in flow.refs() {
            if child.index >= child_count {
                problems.push(FlowSoundnessProblem::OutOfBounds { block: node, child });
            } else if !seen.insert(child) {
                problems.push(FlowSoundnessProblem::Duplicate { block: node, child });
            }
        }

        for index in 0..child_count {
            let child = ChildRef::new(index);
            if !seen.contains(&child) && !tree.is_void_value(tree.child(node, index)) {
                problems.push(FlowSoundnessProblem::Orphan { block: node, child });
            }
        }

        true
    });

    problems
}
