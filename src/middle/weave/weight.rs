//! Wraps statement-like expressions in blocks so that pulling moves them to
//! statement position. Some backends treat assignments as statements only,
//! others cannot nest `yield` or define a function without naming it.

use tracing::trace;

use crate::{
    diagnostics::DiagnosticSink,
    frontend::Span,
    middle::{
        tree::{Edge, NodeId, NodeKind, name::Name, value::Builtin, visit},
        ty::Type,
        weave::Weaver,
    },
};

/// How a heavy expression gets wrapped
#[derive(Debug, Clone, Copy)]
enum Heavy {
    /// `fn ...` -> `{ let fn#; fn# = fn ...; fn# }`
    UnnamedFunction,
    /// `yield()` -> `{ yield(); void }`
    Yield,
    /// `hs(fail, left = right)` -> `{ t = right; hs(fail, left = t); t }`
    AssigningHandlerScope,
    /// `await(p)` -> `{ t = await(p) }`
    Await,
    /// `left = right` -> `{ t = right; left = t; t }`
    Assignment { right_index: usize },
    /// `f()` -> `{ f(); void }`
    VoidCall,
}

impl<S: DiagnosticSink> Weaver<'_, S> {
    pub(super) fn add_weight(&mut self) {
        let mut heavies = Vec::new();

        visit::walk_pre_order(self.tree, self.root, &mut |tree, node| {
            let descend = !tree.is_fun(node);

            let Some(edge) = tree.edge_of(node) else {
                return descend;
            };

            if tree.is_block(edge.parent) {
                return descend;
            }

            if let Some(heavy) = self.classify(edge, node) {
                heavies.push((node, heavy));
            }

            descend
        });

        // Deepest first so that wrapping a node never strands one inside it
        for (node, heavy) in heavies.into_iter().rev() {
            let Some(edge) = self.tree.edge_of(node) else {
                continue;
            };

            trace!(node = ?node, heavy = ?heavy, "weighted");
            self.wrap(edge, node, heavy);
        }
    }

    fn classify(&self, edge: Edge, node: NodeId) -> Option<Heavy> {
        let tree = &*self.tree;
        let pull_specials = self.options.pull_specials_rootward;

        if tree.is_fun(node) {
            let initializes = tree.is_call_to(edge.parent, Builtin::SetLocal) && edge.index == 2;
            return (self.options.name_all_functions && !initializes)
                .then_some(Heavy::UnnamedFunction);
        }

        if !matches!(tree.kind(node), NodeKind::Call) {
            return None;
        }

        match tree.callee_builtin(node) {
            Some(Builtin::Yield) => Some(Heavy::Yield),
            Some(Builtin::HandlerScope) => {
                let handled = tree.children(node).get(2).copied()?;
                let assigns_name = tree.assignment_parts(handled).is_some();
                (pull_specials && assigns_name).then_some(Heavy::AssigningHandlerScope)
            }
            Some(Builtin::Await) => {
                let already_sinking = tree.is_call_to(edge.parent, Builtin::HandlerScope)
                    || (edge.index == 2 && tree.assignment_parts(edge.parent).is_some());
                (pull_specials && !already_sinking).then_some(Heavy::Await)
            }
            Some(builtin @ (Builtin::SetLocal | Builtin::SetProperty)) => {
                let right_index = builtin.assigned_value_index()?;
                let under_hs = tree.is_call_to(edge.parent, Builtin::HandlerScope);
                let has_right = right_index < tree.children(node).len();
                (pull_specials && !under_hs && has_right)
                    .then_some(Heavy::Assignment { right_index })
            }
            _ => tree
                .ty(node)
                .is_some_and(Type::is_void_like)
                .then_some(Heavy::VoidCall),
        }
    }

    fn wrap(&mut self, edge: Edge, node: NodeId, heavy: Heavy) {
        let span = self.tree.span(node);
        let ty = self.tree.ty(node).cloned();

        let children = match heavy {
            Heavy::UnnamedFunction => {
                // Declared right here rather than at the root
                let name = self.names.temporary("fn");
                let decl = self.tree.add_decl(span.left_edge(), name, Vec::new());
                self.tree.free(node);
                let assignment = self.tree.add_assignment(span, name, node);
                let read = self.read(span.right_edge(), name, ty.clone());
                vec![decl, assignment, read]
            }
            Heavy::Yield | Heavy::VoidCall => {
                self.tree.free(node);
                let void = self.tree.add_void(span.right_edge());
                vec![node, void]
            }
            Heavy::AssigningHandlerScope => {
                let handled = self.tree.child(node, 2);
                let (captured, capture) = self.capture_right(Edge::new(handled, 2));
                self.tree.free(node);
                let read = self.read(span.right_edge(), captured, None);
                capture.into_iter().chain([node, read]).collect()
            }
            Heavy::Await => {
                let t = self.allocate(span.left_edge(), "t");
                self.tree.free(node);
                vec![self.tree.add_assignment(span, t, node)]
            }
            Heavy::Assignment { right_index } => {
                let assigned_temporary = self
                    .tree
                    .assignment_parts(node)
                    .map(|(name, _)| name)
                    .filter(Name::is_temporary);

                match assigned_temporary {
                    Some(t) => {
                        self.tree.free(node);
                        let read = self.read(span.right_edge(), t, ty.clone());
                        vec![node, read]
                    }
                    None => {
                        let (captured, capture) = self.capture_right(Edge::new(node, right_index));
                        self.tree.free(node);
                        let read = self.read(span.right_edge(), captured, ty.clone());
                        capture.into_iter().chain([node, read]).collect()
                    }
                }
            }
        };

        let block = self.tree.add_linear_block(span, children);
        self.tree.node_mut(block).ty = match heavy {
            Heavy::Yield | Heavy::VoidCall => Some(Type::VOID),
            _ => ty,
        };
        self.tree.replace(edge, block);
    }

    /// Moves the value at `right` into a fresh temporary, leaving a read of
    /// it behind. A temporary read is reused as it is.
    fn capture_right(&mut self, right: Edge) -> (Name, Option<NodeId>) {
        let value = self.tree.child_at(right);

        if let Some(name) = self.tree.right_name(value).filter(Name::is_temporary) {
            return (name, None);
        }

        let span = self.tree.span(value);
        let ty = self.tree.ty(value).cloned();
        let t = self.allocate(span, "t");
        let read = self.read(span, t, ty);
        self.tree.replace(right, read);

        (t, Some(self.tree.add_assignment(span.left_edge(), t, value)))
    }

    fn read(&mut self, span: Span, name: Name, ty: Option<Type>) -> NodeId {
        let read = self.tree.add_right_name(span, name);
        self.tree.node_mut(read).ty = ty;
        read
    }
}
