//! Weaving turns expression trees into statement trees.
//!
//! Blocks, assignments, `yield`s and other constructs that most backends only
//! accept as statements may sit anywhere inside an expression before this
//! pass. Afterwards every function body and the module root is a structured
//! block whose flow refers to its statements directly, with temporaries
//! carrying values between them in the original evaluation order.
//!
//! Each body goes through these steps in order:
//!
//! 1. failure checks: `hs(fail, op)` gains an explicit `if (fail) bubble()`
//! 2. block simplification: `{ void; void; x }` becomes `x`
//! 3. weighting: statement-like expressions are wrapped in blocks
//! 4. rootward pulling: nested blocks are spliced into the enclosing body
//! 5. the temporaries allocated along the way are declared up front
//! 6. `bubble()` inside an or-clause becomes a break out of it
//!
//! Nested function bodies are woven before the bodies containing them.

use tracing::{debug, info_span};

use crate::{
    diagnostics::DiagnosticSink,
    error::{InternalError, InternalErrorKind, internal_error},
    frontend::Span,
    middle::tree::{
        NodeId, Tree,
        name::{Name, NameMaker},
        value::{MetadataKey, Value},
    },
};

mod failure;
mod pull;
mod simplify;
pub mod structure;
mod weight;

pub use self::structure::{prefix_block_with, structure_block, trim_loose_threads};

/// Knobs for [`weave`]
#[derive(Debug, Clone, Copy)]
pub struct WeaverOptions {
    /// Give every function literal not already assigned to a name a
    /// temporary name of its own
    pub name_all_functions: bool,
    /// Move assignments, `setp`, `await` and assigning `hs` calls to statement
    /// position
    pub pull_specials_rootward: bool,
    /// Given an `hs` call, whether its failure flag still has to be checked
    /// at run time
    pub failure_condition_needs_checking: fn(&Tree, NodeId) -> bool,
}

impl Default for WeaverOptions {
    fn default() -> Self {
        Self {
            name_all_functions: false,
            pull_specials_rootward: true,
            failure_condition_needs_checking: |_, _| true,
        }
    }
}

/// Weaves the module root and every function body under it
pub fn weave(
    tree: &mut Tree,
    names: &mut NameMaker,
    options: &WeaverOptions,
    sink: &mut impl DiagnosticSink,
) -> Result<(), InternalError> {
    let root = tree.root();
    if !tree.is_block(root) {
        return Err(internal_error!(InternalErrorKind::NotABlock { node: root }));
    }

    // Deepest bodies first, so outer bodies only ever see finished functions
    for body in tree.bodies_innermost_first(root) {
        if !tree.is_block(body) {
            continue;
        }

        Weaver::new(tree, names, sink, options, body).weave();
    }

    trim_loose_threads(tree, root);

    Ok(())
}

/// Whether the `index`th child of `parent` is woven along with `parent`.
/// Function bodies are woven on their own.
fn under_same_root(tree: &Tree, parent: NodeId, index: usize) -> bool {
    !(tree.is_fun(parent) && index + 1 == tree.children(parent).len())
}

/// Whether the `index`th child of `parent` is the name a call assigns
fn is_left_hand_side(tree: &Tree, parent: NodeId, index: usize) -> bool {
    index == 1
        && tree
            .callee_builtin(parent)
            .is_some_and(|builtin| builtin.assigns_argument_one())
}

struct Weaver<'a, S> {
    tree: &'a mut Tree,
    names: &'a mut NameMaker,
    sink: &'a mut S,
    options: &'a WeaverOptions,
    root: NodeId,
    /// Declared at the top of the root once weaving is done
    temporaries: Vec<(Name, Span)>,
}

impl<'a, S: DiagnosticSink> Weaver<'a, S> {
    fn new(
        tree: &'a mut Tree,
        names: &'a mut NameMaker,
        sink: &'a mut S,
        options: &'a WeaverOptions,
        root: NodeId,
    ) -> Self {
        Self {
            tree,
            names,
            sink,
            options,
            root,
            temporaries: Vec::new(),
        }
    }

    fn weave(mut self) {
        let span = info_span!("weave.root", root = ?self.root);
        let _enter = span.enter();

        self.check_failure_conditions(self.root);
        debug!("failure conditions checked");

        self.simplify_blocks(self.root);
        debug!("blocks simplified");

        self.add_weight();
        debug!("statement-like expressions weighted");

        self.pull_rootwards(self.root);
        debug!(temporaries = self.temporaries.len(), "pulled rootwards");

        self.declare_temporaries();
        structure::evaporate_bubbles(self.tree, self.root);
    }

    fn allocate(&mut self, span: Span, hint: &str) -> Name {
        let name = self.names.temporary(hint);
        self.temporaries.push((name, span));
        name
    }

    /// Temporaries live at the root but may be assigned in loops, so they
    /// start out `var`. Cleanup drops the mark again where it can.
    fn declare_temporaries(&mut self) {
        let decls = std::mem::take(&mut self.temporaries)
            .into_iter()
            .map(|(name, span)| {
                self.tree
                    .add_decl(span, name, vec![(MetadataKey::Var, Value::Void)])
            })
            .collect();

        prefix_block_with(self.tree, self.root, decls);
    }
}
