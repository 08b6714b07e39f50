//! Runs trees, so tests can check that a pass did not change what a program
//! does.
//!
//! Only the builtins the passes care about have meaning here. Any other call
//! is an effect: it is appended to the run's effect log with its evaluated
//! arguments, and returns its position in the log. Comparing logs and final
//! variable values before and after a pass shows whether evaluation order
//! and data flow survived.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use itertools::Itertools;
use thiserror::Error;

use crate::middle::tree::{
    BlockFlow, NodeId, NodeKind, Tree,
    control_flow::{
        CheckPosition, ControlFlow, Jump, JumpDestination, JumpKind, JumpSpecifier, Loop, StmtBlock,
    },
    name::Name,
    value::{Builtin, Value},
};

/// Loop iterations a run may take before giving up
const FUEL: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Val {
    Void,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Functions, types and anything else that is only passed around
    Opaque,
}

impl core::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Void => f.write_str("void"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Int(i) => write!(f, "{i}"),
            Val::Str(s) => write!(f, "{s:?}"),
            Val::Opaque => f.write_str("<opaque>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error("ran out of fuel")]
    OutOfFuel,
    #[error("jump {0:?} has no destination")]
    StrayJump(Jump),
}

/// What running a tree did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub effects: Vec<String>,
    /// Final values of the names the user wrote
    pub variables: BTreeMap<String, Val>,
    /// The root bubbled
    pub failed: bool,
}

enum Escape {
    Jump(Jump),
    Bubble,
    Error(InterpError),
}

impl From<InterpError> for Escape {
    fn from(error: InterpError) -> Self {
        Escape::Error(error)
    }
}

/// Runs the tree's root
pub fn run(tree: &Tree) -> Result<Run, InterpError> {
    let mut interp = Interp {
        tree,
        env: HashMap::new(),
        effects: Vec::new(),
        fuel: FUEL,
    };

    let failed = match interp.eval(tree.root()) {
        Ok(_) => false,
        Err(Escape::Bubble) => true,
        Err(Escape::Jump(jump)) => return Err(InterpError::StrayJump(jump)),
        Err(Escape::Error(error)) => return Err(error),
    };

    let variables = interp
        .env
        .iter()
        .filter(|(name, _)| matches!(name, Name::Source(_)))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();

    Ok(Run {
        effects: interp.effects,
        variables,
        failed,
    })
}

struct Interp<'tree> {
    tree: &'tree Tree,
    env: HashMap<Name, Val>,
    effects: Vec<String>,
    fuel: usize,
}

impl Interp<'_> {
    fn eval(&mut self, id: NodeId) -> Result<Val, Escape> {
        let tree = self.tree;

        match tree.kind(id) {
            NodeKind::Block(BlockFlow::Linear { label }) => {
                let mut last = Val::Void;

                for child in tree.children(id) {
                    match self.eval(*child) {
                        Ok(value) => last = value,
                        Err(Escape::Jump(Jump {
                            kind: JumpKind::Break,
                            target: JumpSpecifier::Named(target),
                        })) if Some(target) == *label => return Ok(Val::Void),
                        Err(escape) => return Err(escape),
                    }
                }

                Ok(last)
            }
            NodeKind::Block(BlockFlow::Structured(flow)) => {
                let mut last = Val::Void;
                self.exec_block(id, flow, &mut last)?;
                Ok(last)
            }
            NodeKind::Call => self.call(id),
            NodeKind::RightName(name) => Ok(self.read(*name)),
            NodeKind::Value(value) => Ok(match value {
                Value::Void => Val::Void,
                Value::Bool(b) => Val::Bool(*b),
                Value::Int(i) => Val::Int(*i),
                Value::Str(s) => Val::Str(s.clone()),
                _ => Val::Opaque,
            }),
            NodeKind::Esc => {
                for child in tree.children(id) {
                    self.eval(*child)?;
                }
                Ok(Val::Void)
            }
            NodeKind::Fun => Ok(Val::Opaque),
            NodeKind::Decl | NodeKind::LeftName(_) | NodeKind::Stay => Ok(Val::Void),
        }
    }

    fn read(&self, name: Name) -> Val {
        match name {
            Name::Builtin(_) | Name::Exported(_) => Val::Opaque,
            _ => self.env.get(&name).cloned().unwrap_or(Val::Void),
        }
    }

    fn call(&mut self, id: NodeId) -> Result<Val, Escape> {
        let tree = self.tree;
        let children = tree.children(id);

        match tree.callee_builtin(id) {
            Some(Builtin::SetLocal) => {
                let value = self.eval(children[2])?;
                if let Some(name) = tree.left_name(children[1]) {
                    self.env.insert(name, value.clone());
                }
                Ok(value)
            }
            Some(Builtin::HandlerScope) => {
                let (failed, value) = match self.eval(children[2]) {
                    Ok(value) => (false, value),
                    Err(Escape::Bubble) => (true, Val::Void),
                    Err(escape) => return Err(escape),
                };

                if let Some(flag) = tree.left_name(children[1]) {
                    self.env.insert(flag, Val::Bool(failed));
                }
                Ok(value)
            }
            Some(Builtin::Bubble | Builtin::Error) => Err(Escape::Bubble),
            Some(builtin @ (Builtin::Not | Builtin::Add | Builtin::Sub | Builtin::Mul
                | Builtin::Lt | Builtin::Le | Builtin::Gt | Builtin::Ge | Builtin::Eq
                | Builtin::Ne)) => {
                let args = self.args(&children[1..])?;
                Ok(operate(builtin, &args))
            }
            Some(builtin) => {
                let args = self.args(&children[1..])?;
                Ok(self.effect(builtin.to_string(), &args))
            }
            None => {
                let callee = match tree.right_name(children[0]) {
                    Some(name) => name.to_string(),
                    None => {
                        self.eval(children[0])?;
                        "?".to_owned()
                    }
                };

                let args = self.args(&children[1..])?;
                Ok(self.effect(callee, &args))
            }
        }
    }

    fn args(&mut self, args: &[NodeId]) -> Result<Vec<Val>, Escape> {
        args.iter().map(|arg| self.eval(*arg)).collect()
    }

    fn effect(&mut self, callee: String, args: &[Val]) -> Val {
        let index = self.effects.len() as i64;
        self.effects.push(format!("{callee}({})", args.iter().join(", ")));
        Val::Int(index)
    }

    fn condition(&mut self, block: NodeId, index: usize) -> Result<bool, Escape> {
        let value = self.eval(self.tree.child(block, index))?;

        Ok(match value {
            Val::Bool(b) => b,
            Val::Int(i) => i != 0,
            _ => false,
        })
    }

    fn exec_block(
        &mut self,
        block: NodeId,
        stmts: &StmtBlock,
        last: &mut Val,
    ) -> Result<(), Escape> {
        for stmt in &stmts.stmts {
            self.exec(block, stmt, last)?;
        }
        Ok(())
    }

    fn exec(&mut self, block: NodeId, flow: &ControlFlow, last: &mut Val) -> Result<(), Escape> {
        match flow {
            ControlFlow::Stmt(child) => {
                *last = self.eval(self.tree.child(block, child.index))?;
                Ok(())
            }
            ControlFlow::StmtBlock(stmts) => self.exec_block(block, stmts, last),
            ControlFlow::If(conditional) => {
                if self.condition(block, conditional.condition.index)? {
                    self.exec_block(block, &conditional.then_clause, last)
                } else {
                    self.exec_block(block, &conditional.else_clause, last)
                }
            }
            ControlFlow::Loop(lp) => self.exec_loop(block, lp, last),
            ControlFlow::Labeled(labeled) => match self.exec_block(block, &labeled.stmts, last) {
                Err(Escape::Jump(jump)) if labeled.matches(&jump) => Ok(()),
                other => other,
            },
            ControlFlow::Jump(jump) => Err(Escape::Jump(*jump)),
            ControlFlow::OrElse(or_else) => {
                match self.exec_block(block, &or_else.or_clause.stmts, last) {
                    Err(Escape::Bubble) => self.exec_block(block, &or_else.else_clause, last),
                    Err(Escape::Jump(jump)) if or_else.or_clause.matches(&jump) => {
                        self.exec_block(block, &or_else.else_clause, last)
                    }
                    other => other,
                }
            }
        }
    }

    fn exec_loop(&mut self, block: NodeId, lp: &Loop, last: &mut Val) -> Result<(), Escape> {
        let check_first = lp.check_position == CheckPosition::Left;

        loop {
            self.fuel = self.fuel.checked_sub(1).ok_or(InterpError::OutOfFuel)?;

            if check_first && !self.condition(block, lp.condition.index)? {
                return Ok(());
            }

            match self.exec_block(block, &lp.body, last) {
                Ok(()) => {}
                Err(Escape::Jump(jump)) if lp.matches(&jump) => {
                    if jump.kind == JumpKind::Break {
                        return Ok(());
                    }
                }
                Err(escape) => return Err(escape),
            }

            self.exec_block(block, &lp.increment, last)?;

            if !check_first && !self.condition(block, lp.condition.index)? {
                return Ok(());
            }
        }
    }
}

fn operate(builtin: Builtin, args: &[Val]) -> Val {
    let int = |index: usize| match args.get(index) {
        Some(Val::Int(i)) => *i,
        Some(Val::Bool(b)) => i64::from(*b),
        _ => 0,
    };

    match builtin {
        Builtin::Not => Val::Bool(!matches!(args.first(), Some(Val::Bool(true)))),
        Builtin::Add => Val::Int(int(0).wrapping_add(int(1))),
        Builtin::Sub => Val::Int(int(0).wrapping_sub(int(1))),
        Builtin::Mul => Val::Int(int(0).wrapping_mul(int(1))),
        Builtin::Lt => Val::Bool(int(0) < int(1)),
        Builtin::Le => Val::Bool(int(0) <= int(1)),
        Builtin::Gt => Val::Bool(int(0) > int(1)),
        Builtin::Ge => Val::Bool(int(0) >= int(1)),
        Builtin::Eq => Val::Bool(args.first() == args.get(1)),
        Builtin::Ne => Val::Bool(args.first() != args.get(1)),
        _ => Val::Void,
    }
}
