//! Structured control flow. A structured block's flow is a tree of these
//! whose leaves point at the block's own children by index.

use crate::middle::tree::name::JumpLabel;

/// A reference from a structured flow to a child of the block that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildRef {
    pub index: usize,
}

impl ChildRef {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFlow {
    /// Evaluate one child for effect
    Stmt(ChildRef),
    StmtBlock(StmtBlock),
    If(If),
    Loop(Loop),
    Labeled(Labeled),
    Jump(Jump),
    OrElse(OrElse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StmtBlock {
    pub stmts: Vec<ControlFlow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct If {
    pub condition: ChildRef,
    pub then_clause: StmtBlock,
    pub else_clause: StmtBlock,
}

/// Where a loop checks its condition relative to its body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPosition {
    /// `while (c) { ... }`
    Left,
    /// `do { ... } while (c)`
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub label: Option<JumpLabel>,
    pub check_position: CheckPosition,
    pub condition: ChildRef,
    pub body: StmtBlock,
    /// Runs after the body and after any `continue`
    pub increment: StmtBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labeled {
    pub break_label: JumpLabel,
    /// When present, `continue` to this label also exits the block
    pub continue_label: Option<JumpLabel>,
    pub stmts: StmtBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpSpecifier {
    Default,
    Named(JumpLabel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Jump {
    pub kind: JumpKind,
    pub target: JumpSpecifier,
}

/// Runs the or-clause. Failure inside it, or a `break` to its label, skips
/// the rest of the clause and runs the else-clause instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrElse {
    pub or_clause: Labeled,
    pub else_clause: StmtBlock,
}

/// Something a [`Jump`] can land on
pub trait JumpDestination {
    fn break_label(&self) -> Option<JumpLabel>;

    fn continue_label(&self) -> Option<JumpLabel>;

    fn is_default_break_target(&self) -> bool;

    fn is_default_continue_target(&self) -> bool;

    fn matches(&self, jump: &Jump) -> bool {
        match (jump.kind, jump.target) {
            (JumpKind::Break, JumpSpecifier::Default) => self.is_default_break_target(),
            (JumpKind::Continue, JumpSpecifier::Default) => self.is_default_continue_target(),
            (JumpKind::Break, JumpSpecifier::Named(label)) => self.break_label() == Some(label),
            (JumpKind::Continue, JumpSpecifier::Named(label)) => {
                self.continue_label() == Some(label)
            }
        }
    }
}

impl JumpDestination for Loop {
    fn break_label(&self) -> Option<JumpLabel> {
        self.label
    }

    fn continue_label(&self) -> Option<JumpLabel> {
        self.label
    }

    fn is_default_break_target(&self) -> bool {
        true
    }

    fn is_default_continue_target(&self) -> bool {
        true
    }
}

impl JumpDestination for Labeled {
    fn break_label(&self) -> Option<JumpLabel> {
        Some(self.break_label)
    }

    fn continue_label(&self) -> Option<JumpLabel> {
        self.continue_label
    }

    fn is_default_break_target(&self) -> bool {
        false
    }

    fn is_default_continue_target(&self) -> bool {
        self.continue_label.is_some()
    }
}

impl StmtBlock {
    pub fn new(stmts: Vec<ControlFlow>) -> Self {
        Self { stmts }
    }

    /// `Stmt(0); Stmt(1); ...` for a block of `count` children
    pub fn sequential(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| ControlFlow::Stmt(ChildRef::new(i)))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Every child reference in evaluation order of first appearance,
    /// statements and conditions alike
    pub fn refs(&self) -> Vec<ChildRef> {
        let mut refs = Vec::new();
        self.for_each_ref(&mut |r, _| refs.push(r));
        refs
    }

    /// Calls `f` with each reference and whether it is a condition
    pub fn for_each_ref(&self, f: &mut impl FnMut(ChildRef, bool)) {
        for stmt in &self.stmts {
            stmt.for_each_ref(f);
        }
    }

    pub fn map_refs(&mut self, f: &mut impl FnMut(ChildRef) -> ChildRef) {
        self.map_refs_by_role(&mut |r, _| f(r));
    }

    /// Like [`Self::map_refs`], also telling `f` whether the reference is a
    /// condition
    pub fn map_refs_by_role(&mut self, f: &mut impl FnMut(ChildRef, bool) -> ChildRef) {
        for stmt in &mut self.stmts {
            stmt.map_refs_by_role(f);
        }
    }

    /// Drops `Stmt(child)` for each of `children`, wherever it is nested
    pub fn remove_stmts(&mut self, children: &[ChildRef]) {
        self.stmts
            .retain(|stmt| !matches!(stmt, ControlFlow::Stmt(r) if children.contains(r)));

        for stmt in &mut self.stmts {
            for clause in stmt.clauses_mut() {
                clause.remove_stmts(children);
            }
        }
    }

    /// The statement list holding `Stmt(child)`, and its position there
    pub fn find_stmt_mut(&mut self, child: ChildRef) -> Option<(&mut StmtBlock, usize)> {
        let target = ControlFlow::Stmt(child);

        if let Some(index) = self.stmts.iter().position(|s| *s == target) {
            return Some((self, index));
        }

        for stmt in &mut self.stmts {
            for clause in stmt.clauses_mut() {
                if let Some(found) = clause.find_stmt_mut(child) {
                    return Some(found);
                }
            }
        }

        None
    }

    /// The statement list holding the `if` or loop whose condition is
    /// `child`, and its position there
    pub fn find_condition_mut(&mut self, child: ChildRef) -> Option<(&mut StmtBlock, usize)> {
        if let Some(index) = self
            .stmts
            .iter()
            .position(|s| s.condition() == Some(child))
        {
            return Some((self, index));
        }

        for stmt in &mut self.stmts {
            for clause in stmt.clauses_mut() {
                if let Some(found) = clause.find_condition_mut(child) {
                    return Some(found);
                }
            }
        }

        None
    }

    /// Whether some jump in this block lands outside of it
    pub fn may_jump_out(&self) -> bool {
        let mut destinations = Vec::new();
        self.has_escaping_jump(&mut destinations)
    }

    fn has_escaping_jump<'a>(&'a self, destinations: &mut Vec<&'a dyn JumpDestination>) -> bool {
        self.stmts
            .iter()
            .any(|stmt| stmt.has_escaping_jump(destinations))
    }
}

impl ControlFlow {
    /// The condition of an `if` or a loop
    pub fn condition(&self) -> Option<ChildRef> {
        match self {
            ControlFlow::If(conditional) => Some(conditional.condition),
            ControlFlow::Loop(lp) => Some(lp.condition),
            _ => None,
        }
    }

    /// Statement blocks nested directly in this node
    pub fn clauses(&self) -> Vec<&StmtBlock> {
        match self {
            ControlFlow::Stmt(_) | ControlFlow::Jump(_) => Vec::new(),
            ControlFlow::StmtBlock(block) => vec![block],
            ControlFlow::If(conditional) => {
                vec![&conditional.then_clause, &conditional.else_clause]
            }
            ControlFlow::Loop(lp) => vec![&lp.body, &lp.increment],
            ControlFlow::Labeled(labeled) => vec![&labeled.stmts],
            ControlFlow::OrElse(or_else) => vec![&or_else.or_clause.stmts, &or_else.else_clause],
        }
    }

    pub fn clauses_mut(&mut self) -> Vec<&mut StmtBlock> {
        match self {
            ControlFlow::Stmt(_) | ControlFlow::Jump(_) => Vec::new(),
            ControlFlow::StmtBlock(block) => vec![block],
            ControlFlow::If(conditional) => {
                vec![&mut conditional.then_clause, &mut conditional.else_clause]
            }
            ControlFlow::Loop(lp) => vec![&mut lp.body, &mut lp.increment],
            ControlFlow::Labeled(labeled) => vec![&mut labeled.stmts],
            ControlFlow::OrElse(or_else) => {
                vec![&mut or_else.or_clause.stmts, &mut or_else.else_clause]
            }
        }
    }

    pub fn for_each_ref(&self, f: &mut impl FnMut(ChildRef, bool)) {
        match self {
            ControlFlow::Stmt(r) => f(*r, false),
            ControlFlow::StmtBlock(block) => block.for_each_ref(f),
            ControlFlow::If(conditional) => {
                f(conditional.condition, true);
                conditional.then_clause.for_each_ref(f);
                conditional.else_clause.for_each_ref(f);
            }
            ControlFlow::Loop(lp) => match lp.check_position {
                CheckPosition::Left => {
                    f(lp.condition, true);
                    lp.body.for_each_ref(f);
                    lp.increment.for_each_ref(f);
                }
                CheckPosition::Right => {
                    lp.body.for_each_ref(f);
                    lp.increment.for_each_ref(f);
                    f(lp.condition, true);
                }
            },
            ControlFlow::Labeled(labeled) => labeled.stmts.for_each_ref(f),
            ControlFlow::Jump(_) => {}
            ControlFlow::OrElse(or_else) => {
                or_else.or_clause.stmts.for_each_ref(f);
                or_else.else_clause.for_each_ref(f);
            }
        }
    }

    pub fn map_refs(&mut self, f: &mut impl FnMut(ChildRef) -> ChildRef) {
        self.map_refs_by_role(&mut |r, _| f(r));
    }

    pub fn map_refs_by_role(&mut self, f: &mut impl FnMut(ChildRef, bool) -> ChildRef) {
        match self {
            ControlFlow::Stmt(r) => *r = f(*r, false),
            ControlFlow::StmtBlock(block) => block.map_refs_by_role(f),
            ControlFlow::If(conditional) => {
                conditional.condition = f(conditional.condition, true);
                conditional.then_clause.map_refs_by_role(f);
                conditional.else_clause.map_refs_by_role(f);
            }
            ControlFlow::Loop(lp) => {
                lp.condition = f(lp.condition, true);
                lp.body.map_refs_by_role(f);
                lp.increment.map_refs_by_role(f);
            }
            ControlFlow::Labeled(labeled) => labeled.stmts.map_refs_by_role(f),
            ControlFlow::Jump(_) => {}
            ControlFlow::OrElse(or_else) => {
                or_else.or_clause.stmts.map_refs_by_role(f);
                or_else.else_clause.map_refs_by_role(f);
            }
        }
    }

    fn has_escaping_jump<'a>(&'a self, destinations: &mut Vec<&'a dyn JumpDestination>) -> bool {
        match self {
            ControlFlow::Stmt(_) => false,
            ControlFlow::StmtBlock(block) => block.has_escaping_jump(destinations),
            ControlFlow::If(conditional) => {
                conditional.then_clause.has_escaping_jump(destinations)
                    || conditional.else_clause.has_escaping_jump(destinations)
            }
            ControlFlow::Loop(lp) => {
                destinations.push(lp);
                let escapes = lp.body.has_escaping_jump(destinations)
                    || lp.increment.has_escaping_jump(destinations);
                destinations.pop();
                escapes
            }
            ControlFlow::Labeled(labeled) => {
                destinations.push(labeled);
                let escapes = labeled.stmts.has_escaping_jump(destinations);
                destinations.pop();
                escapes
            }
            ControlFlow::Jump(jump) => !destinations.iter().any(|d| d.matches(jump)),
            ControlFlow::OrElse(or_else) => {
                destinations.push(&or_else.or_clause);
                let escapes = or_else.or_clause.stmts.has_escaping_jump(destinations);
                destinations.pop();
                escapes || or_else.else_clause.has_escaping_jump(destinations)
            }
        }
    }
}
