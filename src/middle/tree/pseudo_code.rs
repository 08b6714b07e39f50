//! Renders trees in the pseudo-code notation that
//! [`crate::frontend::reader`] reads back.

use colored::Colorize;
use itertools::Itertools;

use crate::middle::tree::{
    BlockFlow, NodeId, NodeKind, Tree,
    control_flow::{CheckPosition, ControlFlow, JumpKind, JumpSpecifier, StmtBlock},
    name::Name,
    value::{Builtin, MetadataKey, Value},
};

const INDENT: &str = "    ";

/// Renders the body of the tree's root without surrounding braces
pub fn render_tree(tree: &Tree) -> String {
    let mut printer = Printer::new(tree);
    let root = tree.root();

    match tree.block_flow(root) {
        Some(BlockFlow::Linear { label: None }) | Some(BlockFlow::Structured(_)) => {
            printer.block_contents(root);
        }
        _ => {
            let text = printer.expression(root);
            printer.line(&text);
        }
    }

    printer.out
}

/// Renders one node as an expression
pub fn render_node(tree: &Tree, id: NodeId) -> String {
    Printer::new(tree).expression(id)
}

pub fn pretty_print_tree(tree: &Tree) {
    print!("{}", render_tree(tree));
}

struct Printer<'tree> {
    tree: &'tree Tree,
    out: String,
    indent: usize,
}

impl<'tree> Printer<'tree> {
    fn new(tree: &'tree Tree) -> Self {
        Self {
            tree,
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }

        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Renders `id` on its own, as an expression. Multi-line constructs are
    /// rendered with a nested printer so indentation stays relative.
    fn expression(&self, id: NodeId) -> String {
        let tree = self.tree;

        match tree.kind(id) {
            NodeKind::Block(flow) => {
                let label = match flow {
                    BlockFlow::Linear { label: Some(label) } => {
                        format!("{}{} ", label_text(*label), ":".white())
                    }
                    _ => String::new(),
                };

                if tree.children(id).is_empty()
                    && !matches!(flow, BlockFlow::Structured(f) if !f.is_empty())
                {
                    return format!("{label}{}", "{}".white());
                }

                let mut nested = Printer {
                    tree,
                    out: String::new(),
                    indent: self.indent + 1,
                };
                nested.block_contents(id);

                format!(
                    "{label}{}\n{}{}{}",
                    "{".white(),
                    nested.out,
                    INDENT.repeat(self.indent),
                    "}".white()
                )
            }
            NodeKind::Call => self.call(id),
            NodeKind::Decl => self.declaration(id, true),
            NodeKind::Fun => self.function(id),
            NodeKind::LeftName(name) | NodeKind::RightName(name) => name_text(*name),
            NodeKind::Value(value) => value_text(value),
            NodeKind::Esc => format!(
                "{}{}{}{}",
                "esc".magenta(),
                "(".white(),
                tree.children(id)
                    .iter()
                    .map(|c| self.expression(*c))
                    .join(", "),
                ")".white()
            ),
            NodeKind::Stay => format!("{}", "stay".magenta()),
        }
    }

    fn operand(&self, id: NodeId) -> String {
        let needs_parens = self
            .tree
            .callee_builtin(id)
            .is_some_and(|b| b.is_binary_operator() || b == Builtin::SetLocal);

        if needs_parens {
            format!("{}{}{}", "(".white(), self.expression(id), ")".white())
        } else {
            self.expression(id)
        }
    }

    fn call(&self, id: NodeId) -> String {
        let tree = self.tree;
        let Some((&callee, args)) = tree.children(id).split_first() else {
            return format!("{}", "<malformed call>".bright_red());
        };

        match tree.callee_builtin(id) {
            Some(Builtin::SetLocal) if args.len() == 2 => format!(
                "{} {} {}",
                self.expression(args[0]),
                "=".white(),
                self.expression(args[1])
            ),
            Some(Builtin::Not) if args.len() == 1 => {
                format!("{}{}", "!".white(), self.operand(args[0]))
            }
            Some(builtin) if builtin.is_binary_operator() && args.len() == 2 => format!(
                "{} {} {}",
                self.operand(args[0]),
                builtin.to_string().white(),
                self.operand(args[1])
            ),
            Some(builtin) => format!(
                "{}{}{}{}",
                builtin.to_string().cyan(),
                "(".white(),
                args.iter().map(|a| self.expression(*a)).join(", "),
                ")".white()
            ),
            None => {
                let callee_text = if matches!(tree.kind(callee), NodeKind::Call | NodeKind::Fun) {
                    format!("{}{}{}", "(".white(), self.expression(callee), ")".white())
                } else {
                    self.expression(callee)
                };

                format!(
                    "{callee_text}{}{}{}",
                    "(".white(),
                    args.iter().map(|a| self.expression(*a)).join(", "),
                    ")".white()
                )
            }
        }
    }

    /// `@ssa let x: Int`, or just `@ssa x: Int` for formals
    fn declaration(&self, id: NodeId, with_keyword: bool) -> String {
        let Some(parts) = self.tree.decl_parts(id) else {
            return format!("{}", "<malformed decl>".bright_red());
        };

        let mut text = String::new();

        for (key, value) in &parts.metadata {
            if matches!(key, MetadataKey::Var | MetadataKey::Type | MetadataKey::Return) {
                continue;
            }

            let key_text: &'static str = key.into();
            text.push_str(&format!("{}", format!("@{key_text}").yellow()));

            if !self.tree.is_void_value(*value) {
                text.push_str(&format!(
                    "{}{}{}",
                    "(".white(),
                    self.expression(*value),
                    ")".white()
                ));
            }

            text.push(' ');
        }

        if with_keyword {
            let keyword = if parts.is_var() { "var" } else { "let" };
            text.push_str(&format!("{} ", keyword.magenta()));
        } else if parts.is_var() {
            text.push_str(&format!("{} ", "var".magenta()));
        }

        text.push_str(&name_text(parts.name));

        if let Some(ty) = self.tree.decl_type(id) {
            text.push_str(&format!("{} {}", ":".white(), ty.to_string().green()));
        }

        text
    }

    fn function(&self, id: NodeId) -> String {
        let Some(parts) = self.tree.fun_parts(id) else {
            return format!("{}", "<malformed fn>".bright_red());
        };

        let formals = parts
            .formals
            .iter()
            .map(|f| self.declaration(*f, false))
            .join(", ");

        let output = parts
            .return_decl
            .map(|decl| format!(" {} {}", "->".white(), self.declaration(decl, false)))
            .unwrap_or_default();

        format!(
            "{} {}{formals}{}{output} {}",
            "fn".magenta(),
            "(".white(),
            ")".white(),
            self.expression(parts.body)
        )
    }

    fn block_contents(&mut self, id: NodeId) {
        match self.tree.block_flow(id) {
            Some(BlockFlow::Structured(flow)) => {
                let flow = flow.clone();
                self.stmt_block(id, &flow);
            }
            _ => {
                for child in self.tree.children(id).to_vec() {
                    self.statement(child);
                }
            }
        }
    }

    fn statement(&mut self, id: NodeId) {
        let text = self.expression(id);

        if self.tree.is_block(id) {
            self.line(&text);
        } else {
            self.line(&format!("{text}{}", ";".white()));
        }
    }

    fn child_of(&self, block: NodeId, index: usize) -> Option<NodeId> {
        self.tree.children(block).get(index).copied()
    }

    fn condition(&self, block: NodeId, index: usize) -> String {
        match self.child_of(block, index) {
            Some(child) => self.expression(child),
            None => format!("{}", format!("<missing #{index}>").bright_red()),
        }
    }

    fn stmt_block(&mut self, block: NodeId, stmts: &StmtBlock) {
        for stmt in &stmts.stmts {
            self.flow(block, stmt);
        }
    }

    fn nested(&mut self, block: NodeId, stmts: &StmtBlock) {
        self.indent += 1;
        self.stmt_block(block, stmts);
        self.indent -= 1;
    }

    fn flow(&mut self, block: NodeId, flow: &ControlFlow) {
        match flow {
            ControlFlow::Stmt(child) => match self.child_of(block, child.index) {
                Some(child) => self.statement(child),
                None => {
                    let text = format!("<missing #{}>", child.index);
                    self.line(&format!("{}", text.bright_red()));
                }
            },
            ControlFlow::StmtBlock(stmts) => self.stmt_block(block, stmts),
            ControlFlow::If(conditional) => {
                let condition = self.condition(block, conditional.condition.index);
                self.line(&format!(
                    "{} {}{condition}{} {}",
                    "if".magenta(),
                    "(".white(),
                    ")".white(),
                    "{".white()
                ));
                self.nested(block, &conditional.then_clause);

                if conditional.else_clause.is_empty() {
                    self.line(&format!("{}", "}".white()));
                } else {
                    self.line(&format!("{} {} {}", "}".white(), "else".magenta(), "{".white()));
                    self.nested(block, &conditional.else_clause);
                    self.line(&format!("{}", "}".white()));
                }
            }
            ControlFlow::Loop(lp) => {
                let label = lp
                    .label
                    .map(|l| format!("{}{} ", label_text(l), ":".white()))
                    .unwrap_or_default();
                let condition = self.condition(block, lp.condition.index);

                match lp.check_position {
                    CheckPosition::Left => {
                        self.line(&format!(
                            "{label}{} {}{condition}{} {}",
                            "while".magenta(),
                            "(".white(),
                            ")".white(),
                            "{".white()
                        ));
                        self.nested(block, &lp.body);
                        self.increment(block, &lp.increment);
                        self.line(&format!("{}", "}".white()));
                    }
                    CheckPosition::Right => {
                        self.line(&format!("{label}{} {}", "do".magenta(), "{".white()));
                        self.nested(block, &lp.body);
                        self.increment(block, &lp.increment);
                        self.line(&format!(
                            "{} {} {}{condition}{}{}",
                            "}".white(),
                            "while".magenta(),
                            "(".white(),
                            ")".white(),
                            ";".white()
                        ));
                    }
                }
            }
            ControlFlow::Labeled(labeled) => {
                let continue_label = labeled
                    .continue_label
                    .map(|l| format!("{}{}", "/".white(), label_text(l)))
                    .unwrap_or_default();

                self.line(&format!(
                    "{}{continue_label}{} {}",
                    label_text(labeled.break_label),
                    ":".white(),
                    "{".white()
                ));
                self.nested(block, &labeled.stmts);
                self.line(&format!("{}", "}".white()));
            }
            ControlFlow::Jump(jump) => {
                let keyword = match jump.kind {
                    JumpKind::Break => "break",
                    JumpKind::Continue => "continue",
                };

                match jump.target {
                    JumpSpecifier::Default => {
                        self.line(&format!("{}{}", keyword.magenta(), ";".white()))
                    }
                    JumpSpecifier::Named(label) => self.line(&format!(
                        "{} {}{}",
                        keyword.magenta(),
                        label_text(label),
                        ";".white()
                    )),
                }
            }
            ControlFlow::OrElse(or_else) => {
                self.line(&format!(
                    "{}{} {}",
                    label_text(or_else.or_clause.break_label),
                    ":".white(),
                    "{".white()
                ));
                self.nested(block, &or_else.or_clause.stmts);
                self.line(&format!("{} {} {}", "}".white(), "orelse".magenta(), "{".white()));
                self.nested(block, &or_else.else_clause);
                self.line(&format!("{}", "}".white()));
            }
        }
    }

    /// The increment part of a loop, rendered inside the loop's braces
    fn increment(&mut self, block: NodeId, increment: &StmtBlock) {
        if increment.is_empty() {
            return;
        }

        self.indent += 1;
        self.line(&format!("{} {}", "next".magenta(), "{".white()));
        self.nested(block, increment);
        self.line(&format!("{}", "}".white()));
        self.indent -= 1;
    }
}

fn name_text(name: Name) -> String {
    match name {
        Name::Temporary { .. } => name.to_string().cyan().to_string(),
        Name::Builtin(_) | Name::Exported(_) => name.to_string().bright_blue().to_string(),
        Name::Source(_) => name.to_string().blue().to_string(),
    }
}

fn label_text(label: Name) -> String {
    label.to_string().bright_red().to_string()
}

fn value_text(value: &Value) -> String {
    let text = match value {
        Value::Void => return "void".magenta().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Str(s) => format!("{s:?}"),
        Value::Fn(builtin) => return format!("%{builtin}").cyan().to_string(),
        Value::Key(key) => format!("@{key}"),
        Value::Type(ty) => format!("<{ty}>"),
        Value::Symbol(symbol) => format!(".{symbol}"),
    };

    text.purple().to_string()
}
