//! Reads the pseudo-code notation printed by
//! [`crate::middle::tree::pseudo_code`] back into a [`Tree`].
//!
//! Blocks that contain any control flow statement (`if`, loops, labeled
//! blocks, jumps) become structured blocks, everything else is linear. A
//! declaration with an initializer at statement level, `let x = e;`, is split
//! into `let x;` followed by `x = e;`.

use std::str::FromStr;

use thiserror::Error;

use crate::{
    frontend::{
        SourceFile,
        intern::InternedSymbol,
        lexer::{Keyword, Lexer, Span, Token, TokenKind},
    },
    middle::{
        tree::{
            BlockFlow, NodeId, NodeKind, Tree,
            control_flow::{
                CheckPosition, ChildRef, ControlFlow, If, Jump, JumpKind, JumpSpecifier, Labeled,
                Loop, OrElse, StmtBlock,
            },
            name::{Name, NameMaker},
            value::{Builtin, MetadataKey, Value},
        },
        ty::{PrimitiveKind, Type},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("unexpected character `{character}`")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("expected {expected} but found `{found}`")]
    Unexpected {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("expected {expected} but reached end of input")]
    UnexpectedEof { expected: String },
    #[error("only names can be assigned")]
    InvalidAssignmentTarget { span: Span },
    #[error("integer literal `{text}` is out of range")]
    IntegerOutOfRange { text: String, span: Span },
    #[error("unknown metadata key `{key}`")]
    UnknownMetadataKey { key: String, span: Span },
    #[error("declarations with initializers are only allowed as statements")]
    NestedInitializer { span: Span },
}

impl ReadError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ReadError::UnexpectedCharacter { span, .. }
            | ReadError::UnterminatedString { span }
            | ReadError::Unexpected { span, .. }
            | ReadError::InvalidAssignmentTarget { span }
            | ReadError::IntegerOutOfRange { span, .. }
            | ReadError::UnknownMetadataKey { span, .. }
            | ReadError::NestedInitializer { span } => Some(*span),
            ReadError::UnexpectedEof { .. } => None,
        }
    }
}

/// Reads a whole source file. The file's statements become the root block.
pub fn read_tree(source: &SourceFile) -> Result<(Tree, NameMaker), ReadError> {
    let mut reader = Reader {
        lexer: Lexer::new(source),
        tree: Tree::new(),
        names: NameMaker::new(),
    };

    let mut builder = BlockBuilder::default();
    let mut flow = StmtBlock::default();

    while reader.lexer.peek()?.is_some() {
        reader.read_statement(&mut builder, &mut flow)?;
    }

    let root = reader.finish_block(
        Span::new(0, source.contents.len()),
        builder,
        flow,
    );
    reader.tree.set_root(root);

    Ok((reader.tree, reader.names))
}

/// Reads source text held in memory
pub fn read_str(contents: &str) -> Result<(Tree, NameMaker), ReadError> {
    read_tree(&SourceFile::from_memory(contents))
}

struct Reader<'source> {
    lexer: Lexer<'source>,
    tree: Tree,
    names: NameMaker,
}

/// Children collected for a block under construction
#[derive(Default)]
struct BlockBuilder {
    children: Vec<NodeId>,
    structured: bool,
}

impl BlockBuilder {
    fn add(&mut self, child: NodeId) -> ChildRef {
        self.children.push(child);
        ChildRef::new(self.children.len() - 1)
    }
}

impl<'source> Reader<'source> {
    /* Token helpers */

    fn expect_peek(&mut self, expecting: &str) -> Result<Token, ReadError> {
        self.lexer.peek()?.ok_or_else(|| ReadError::UnexpectedEof {
            expected: expecting.to_owned(),
        })
    }

    fn peek_is(&mut self, kind: TokenKind) -> Result<bool, ReadError> {
        Ok(self.lexer.peek()?.is_some_and(|t| t.kind == kind))
    }

    fn peek_nth_is(&mut self, n: usize, kind: TokenKind) -> Result<bool, ReadError> {
        Ok(self.lexer.peek_nth(n)?.is_some_and(|t| t.kind == kind))
    }

    fn expect_next(&mut self, expecting: &str) -> Result<Token, ReadError> {
        self.lexer.next()?.ok_or_else(|| ReadError::UnexpectedEof {
            expected: expecting.to_owned(),
        })
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> Result<Token, ReadError> {
        let token = self.expect_next(&format!("{kind:?}"))?;

        if token.kind != kind {
            return Err(self.unexpected(&format!("{kind:?}"), &token));
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ReadError> {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn eat(&mut self, kind: TokenKind) -> Result<Option<Token>, ReadError> {
        if self.peek_is(kind)? {
            return self.lexer.next();
        }

        Ok(None)
    }

    fn unexpected(&self, expected: &str, token: &Token) -> ReadError {
        ReadError::Unexpected {
            expected: expected.to_owned(),
            found: self.text(token).to_owned(),
            span: token.span,
        }
    }

    fn text(&self, token: &Token) -> &'source str {
        self.lexer.source().value_of_span(token.span)
    }

    fn previous_end(&self) -> usize {
        self.lexer.position()
    }

    /* Names and types */

    fn name_from_token(&mut self, token: &Token) -> Result<Name, ReadError> {
        let text = self.text(token);

        match token.kind {
            TokenKind::Identifier => Ok(Name::source(text)),
            TokenKind::TemporaryIdentifier => {
                let (hint, uid) = text.split_once('#').unwrap_or((text, "0"));
                let uid = uid.parse().map_err(|_| ReadError::IntegerOutOfRange {
                    text: uid.to_owned(),
                    span: token.span,
                })?;

                let name = Name::Temporary {
                    hint: InternedSymbol::new(hint),
                    uid,
                };
                self.names.reserve(name);

                Ok(name)
            }
            _ => Err(self.unexpected("name", token)),
        }
    }

    fn read_name(&mut self) -> Result<Name, ReadError> {
        let token = self.expect_next("name")?;
        self.name_from_token(&token)
    }

    fn read_type(&mut self) -> Result<Type, ReadError> {
        let token = self.expect_next("type")?;

        if token.kind == TokenKind::Identifier {
            if let Ok(primitive) = PrimitiveKind::from_str(self.text(&token)) {
                return Ok(Type::Primitive(primitive));
            }
        }

        Ok(Type::Named(self.name_from_token(&token)?))
    }

    fn read_label(&mut self) -> Result<Name, ReadError> {
        self.read_name()
    }

    /// Whether the upcoming tokens are `label:` or `label/label:`
    fn at_label(&mut self) -> Result<bool, ReadError> {
        let Some(first) = self.lexer.peek()? else {
            return Ok(false);
        };

        if !first.kind.is_name() {
            return Ok(false);
        }

        Ok(self.peek_nth_is(1, TokenKind::Colon)? || self.peek_nth_is(1, TokenKind::Slash)?)
    }

    /* Blocks and statements */

    fn finish_block(&mut self, span: Span, builder: BlockBuilder, flow: StmtBlock) -> NodeId {
        let kind = if builder.structured {
            NodeKind::Block(BlockFlow::Structured(flow))
        } else {
            NodeKind::Block(BlockFlow::Linear { label: None })
        };

        self.tree.add(span, kind, builder.children)
    }

    /// `{ statement* }` where the statements belong to the block under
    /// construction
    fn read_braced_statements(
        &mut self,
        builder: &mut BlockBuilder,
        flow: &mut StmtBlock,
    ) -> Result<Span, ReadError> {
        let open = self.expect_next_to_be(TokenKind::OpenBrace)?;

        while !self.peek_is(TokenKind::CloseBrace)? {
            self.read_statement(builder, flow)?;
        }

        let close = self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(open.span.to(close.span))
    }

    fn read_statement(
        &mut self,
        builder: &mut BlockBuilder,
        flow: &mut StmtBlock,
    ) -> Result<(), ReadError> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::Semicolon => {
                self.lexer.next()?;
                return Ok(());
            }
            TokenKind::Keyword(Keyword::If)
            | TokenKind::Keyword(Keyword::While)
            | TokenKind::Keyword(Keyword::Do)
            | TokenKind::Keyword(Keyword::Break)
            | TokenKind::Keyword(Keyword::Continue) => {
                let stmt = self.read_control_flow(builder, None)?;
                builder.structured = true;
                flow.stmts.push(stmt);
                return Ok(());
            }
            TokenKind::Keyword(Keyword::Let)
            | TokenKind::Keyword(Keyword::Var)
            | TokenKind::At => {
                return self.read_declaration_statement(builder, flow);
            }
            _ => {}
        }

        if self.at_label()? {
            let stmt = self.read_labeled(builder)?;
            builder.structured = true;
            flow.stmts.push(stmt);
            return Ok(());
        }

        let expression = self.read_expression()?;
        let child = builder.add(expression);
        flow.stmts.push(ControlFlow::Stmt(child));

        // Semicolons are optional before a closing brace and after blocks
        if self.eat(TokenKind::Semicolon)?.is_none()
            && !self.peek_is(TokenKind::CloseBrace)?
            && self.lexer.peek()?.is_some()
            && !self.tree.is_block(expression)
        {
            let token = self.expect_peek("semicolon")?;
            return Err(self.unexpected("semicolon", &token));
        }

        Ok(())
    }

    fn read_declaration_statement(
        &mut self,
        builder: &mut BlockBuilder,
        flow: &mut StmtBlock,
    ) -> Result<(), ReadError> {
        let (decl, name) = self.read_declaration(true)?;
        let child = builder.add(decl);
        flow.stmts.push(ControlFlow::Stmt(child));

        if self.eat(TokenKind::Equals)?.is_some() {
            let value = self.read_expression()?;
            let span = self.tree.span(decl).to(self.tree.span(value));
            let assignment = self.tree.add_assignment(span, name, value);

            let child = builder.add(assignment);
            flow.stmts.push(ControlFlow::Stmt(child));
        }

        if self.eat(TokenKind::Semicolon)?.is_none() && !self.peek_is(TokenKind::CloseBrace)? {
            let token = self.expect_peek("semicolon")?;
            return Err(self.unexpected("semicolon", &token));
        }

        Ok(())
    }

    /// `@key(value)* (let | var) name (: Type)?`. Formals and return
    /// declarations leave out the keyword.
    fn read_declaration(&mut self, keyword_required: bool) -> Result<(NodeId, Name), ReadError> {
        let start = self.expect_peek("declaration")?.span;
        let mut metadata = Vec::new();

        while self.eat(TokenKind::At)?.is_some() {
            let token = self.expect_next("metadata key")?;
            let key = MetadataKey::from_str(self.text(&token)).map_err(|_| {
                ReadError::UnknownMetadataKey {
                    key: self.text(&token).to_owned(),
                    span: token.span,
                }
            })?;

            let value = if self.eat(TokenKind::OpenParen)?.is_some() {
                let value = self.read_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;
                Some(value)
            } else {
                None
            };

            metadata.push((key, value));
        }

        if self.eat(TokenKind::Keyword(Keyword::Var))?.is_some() {
            metadata.push((MetadataKey::Var, None));
        } else if self.eat(TokenKind::Keyword(Keyword::Let))?.is_none() && keyword_required {
            let token = self.expect_peek("let or var")?;
            return Err(self.unexpected("let or var", &token));
        }

        let name = self.read_name()?;
        let span = start.to(Span::new(start.start, self.previous_end()));

        if self.eat(TokenKind::Colon)?.is_some() {
            let ty = self.read_type()?;
            metadata.push((MetadataKey::Type, Some(self.tree.add_value(span, Value::Type(ty)))));
        }

        let name_node = self.tree.add_left_name(span, name);
        let mut children = vec![name_node];

        for (key, value) in metadata {
            children.push(self.tree.add_value(span, Value::Key(key)));
            let value = value.unwrap_or_else(|| self.tree.add_void(span));
            children.push(value);
        }

        let span = start.to(Span::new(start.start, self.previous_end()));
        Ok((self.tree.add(span, NodeKind::Decl, children), name))
    }

    fn read_control_flow(
        &mut self,
        builder: &mut BlockBuilder,
        label: Option<Name>,
    ) -> Result<ControlFlow, ReadError> {
        let token = self.expect_next("control flow")?;

        match token.kind {
            TokenKind::Keyword(Keyword::If) => self.read_if(builder),
            TokenKind::Keyword(Keyword::While) => {
                self.expect_next_to_be(TokenKind::OpenParen)?;
                let condition = self.read_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;
                let condition = builder.add(condition);

                let (body, increment) = self.read_loop_body(builder)?;

                Ok(ControlFlow::Loop(Loop {
                    label,
                    check_position: CheckPosition::Left,
                    condition,
                    body,
                    increment,
                }))
            }
            TokenKind::Keyword(Keyword::Do) => {
                let (body, increment) = self.read_loop_body(builder)?;

                self.expect_keyword(Keyword::While)?;
                self.expect_next_to_be(TokenKind::OpenParen)?;
                let condition = self.read_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;
                self.eat(TokenKind::Semicolon)?;

                Ok(ControlFlow::Loop(Loop {
                    label,
                    check_position: CheckPosition::Right,
                    condition: builder.add(condition),
                    body,
                    increment,
                }))
            }
            TokenKind::Keyword(Keyword::Break) | TokenKind::Keyword(Keyword::Continue) => {
                let kind = if token.kind == TokenKind::Keyword(Keyword::Break) {
                    JumpKind::Break
                } else {
                    JumpKind::Continue
                };

                let target = if self.expect_peek("label or semicolon")?.kind.is_name() {
                    JumpSpecifier::Named(self.read_label()?)
                } else {
                    JumpSpecifier::Default
                };

                if self.eat(TokenKind::Semicolon)?.is_none()
                    && !self.peek_is(TokenKind::CloseBrace)?
                {
                    let token = self.expect_peek("semicolon")?;
                    return Err(self.unexpected("semicolon", &token));
                }

                Ok(ControlFlow::Jump(Jump { kind, target }))
            }
            _ => Err(self.unexpected("if, while, do, break or continue", &token)),
        }
    }

    /// "if" "(" expression ")" BLOCK ( "else" ( if | BLOCK ) )?
    fn read_if(&mut self, builder: &mut BlockBuilder) -> Result<ControlFlow, ReadError> {
        self.expect_next_to_be(TokenKind::OpenParen)?;
        let condition = self.read_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen)?;
        let condition = builder.add(condition);

        let mut then_clause = StmtBlock::default();
        self.read_braced_statements(builder, &mut then_clause)?;

        let mut else_clause = StmtBlock::default();

        if self.eat(TokenKind::Keyword(Keyword::Else))?.is_some() {
            if self.peek_is(TokenKind::Keyword(Keyword::If))? {
                self.expect_keyword(Keyword::If)?;
                else_clause.stmts.push(self.read_if(builder)?);
            } else {
                self.read_braced_statements(builder, &mut else_clause)?;
            }
        }

        Ok(ControlFlow::If(If {
            condition,
            then_clause,
            else_clause,
        }))
    }

    /// `{ statement* ( next { statement* } )? }`
    fn read_loop_body(
        &mut self,
        builder: &mut BlockBuilder,
    ) -> Result<(StmtBlock, StmtBlock), ReadError> {
        let mut body = StmtBlock::default();
        let mut increment = StmtBlock::default();

        self.expect_next_to_be(TokenKind::OpenBrace)?;

        while !self.peek_is(TokenKind::CloseBrace)? {
            if self.eat(TokenKind::Keyword(Keyword::Next))?.is_some() {
                self.read_braced_statements(builder, &mut increment)?;
                break;
            }

            self.read_statement(builder, &mut body)?;
        }

        self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok((body, increment))
    }

    /// `label: loop`, `label: { ... }`, `label/continue: { ... }` or
    /// `label: { ... } orelse { ... }`
    fn read_labeled(&mut self, builder: &mut BlockBuilder) -> Result<ControlFlow, ReadError> {
        let break_label = self.read_label()?;

        let continue_label = if self.eat(TokenKind::Slash)?.is_some() {
            Some(self.read_label()?)
        } else {
            None
        };

        self.expect_next_to_be(TokenKind::Colon)?;

        let peeked = self.expect_peek("loop or block")?;
        if matches!(
            peeked.kind,
            TokenKind::Keyword(Keyword::While) | TokenKind::Keyword(Keyword::Do)
        ) {
            return self.read_control_flow(builder, Some(break_label));
        }

        let mut stmts = StmtBlock::default();
        self.read_braced_statements(builder, &mut stmts)?;

        let labeled = Labeled {
            break_label,
            continue_label,
            stmts,
        };

        if self.eat(TokenKind::Keyword(Keyword::Orelse))?.is_some() {
            let mut else_clause = StmtBlock::default();
            self.read_braced_statements(builder, &mut else_clause)?;

            return Ok(ControlFlow::OrElse(OrElse {
                or_clause: labeled,
                else_clause,
            }));
        }

        Ok(ControlFlow::Labeled(labeled))
    }

    /* Expressions */

    fn read_expression(&mut self) -> Result<NodeId, ReadError> {
        self.read_assignment_expression()
    }

    fn read_assignment_expression(&mut self) -> Result<NodeId, ReadError> {
        let target = self.read_comparison_expression()?;

        let Some(equals) = self.eat(TokenKind::Equals)? else {
            return Ok(target);
        };

        let Some(name) = self.tree.right_name(target) else {
            return Err(ReadError::InvalidAssignmentTarget {
                span: self.tree.span(target),
            });
        };

        let value = self.read_assignment_expression()?;
        let span = self.tree.span(target).to(self.tree.span(value));

        let left = self.tree.add_left_name(self.tree.span(target), name);
        let callee = self.tree.add_value(equals.span, Value::Fn(Builtin::SetLocal));

        Ok(self.tree.add(span, NodeKind::Call, vec![callee, left, value]))
    }

    fn binary(&mut self, operator: Token, builtin: Builtin, lhs: NodeId, rhs: NodeId) -> NodeId {
        let span = self.tree.span(lhs).to(self.tree.span(rhs));
        let callee = self.tree.add_value(operator.span, Value::Fn(builtin));

        self.tree.add(span, NodeKind::Call, vec![callee, lhs, rhs])
    }

    fn read_comparison_expression(&mut self) -> Result<NodeId, ReadError> {
        let mut expression = self.read_term_expression()?;

        while self
            .lexer
            .peek()?
            .is_some_and(|t| t.kind.is_comparison_operator())
        {
            let operator = self.expect_next("comparison operator")?;
            let builtin = match operator.kind {
                TokenKind::DoubleEquals => Builtin::Eq,
                TokenKind::NotEquals => Builtin::Ne,
                TokenKind::LessThan => Builtin::Lt,
                TokenKind::LessThanOrEqualTo => Builtin::Le,
                TokenKind::GreaterThan => Builtin::Gt,
                _ => Builtin::Ge,
            };

            let rhs = self.read_term_expression()?;
            expression = self.binary(operator, builtin, expression, rhs);
        }

        Ok(expression)
    }

    fn read_term_expression(&mut self) -> Result<NodeId, ReadError> {
        let mut expression = self.read_factor_expression()?;

        while self.lexer.peek()?.is_some_and(|t| t.kind.is_term_operator()) {
            let operator = self.expect_next("term operator")?;
            let builtin = if operator.kind == TokenKind::Plus {
                Builtin::Add
            } else {
                Builtin::Sub
            };

            let rhs = self.read_factor_expression()?;
            expression = self.binary(operator, builtin, expression, rhs);
        }

        Ok(expression)
    }

    fn read_factor_expression(&mut self) -> Result<NodeId, ReadError> {
        let mut expression = self.read_unary_expression()?;

        while self.peek_is(TokenKind::Asterisk)? {
            let operator = self.expect_next_to_be(TokenKind::Asterisk)?;
            let rhs = self.read_unary_expression()?;
            expression = self.binary(operator, Builtin::Mul, expression, rhs);
        }

        Ok(expression)
    }

    fn read_unary_expression(&mut self) -> Result<NodeId, ReadError> {
        if let Some(bang) = self.eat(TokenKind::Bang)? {
            let operand = self.read_unary_expression()?;
            let span = bang.span.to(self.tree.span(operand));

            return Ok(self.tree.add_builtin_call(span, Builtin::Not, vec![operand]));
        }

        if self.peek_is(TokenKind::Minus)? && self.peek_nth_is(1, TokenKind::IntegerLiteral)? {
            let minus = self.expect_next_to_be(TokenKind::Minus)?;
            let literal = self.expect_next_to_be(TokenKind::IntegerLiteral)?;
            let text = format!("-{}", self.text(&literal));
            let span = minus.span.to(literal.span);

            let value = text
                .parse()
                .map_err(|_| ReadError::IntegerOutOfRange { text, span })?;

            return Ok(self.tree.add_value(span, Value::Int(value)));
        }

        self.read_postfix_expression()
    }

    /// Calls and type ascriptions: `f(a)(b)::Int`
    fn read_postfix_expression(&mut self) -> Result<NodeId, ReadError> {
        let mut expression = self.read_atomic_expression()?;

        while self.peek_is(TokenKind::OpenParen)? {
            let (args, close) = self.read_arguments()?;
            let span = self.tree.span(expression).to(close);

            // `hs` writes its first argument
            let writes_first = matches!(
                self.tree.value(expression),
                Some(Value::Fn(builtin)) if builtin.assigns_argument_one()
            );
            if let (true, Some(first)) = (writes_first, args.first()) {
                if let Some(name) = self.tree.right_name(*first) {
                    self.tree.node_mut(*first).kind = NodeKind::LeftName(name);
                }
            }

            let children = std::iter::once(expression).chain(args).collect();
            expression = self.tree.add(span, NodeKind::Call, children);
        }

        if self.eat(TokenKind::DoubleColon)?.is_some() {
            let ty = self.read_type()?;
            self.tree.node_mut(expression).ty = Some(ty);
        }

        Ok(expression)
    }

    fn read_arguments(&mut self) -> Result<(Vec<NodeId>, Span), ReadError> {
        let mut arguments = Vec::new();

        self.expect_next_to_be(TokenKind::OpenParen)?;

        if !self.peek_is(TokenKind::CloseParen)? {
            arguments.push(self.read_expression()?);

            while self.eat(TokenKind::Comma)?.is_some() {
                arguments.push(self.read_expression()?);
            }
        }

        let close = self.expect_next_to_be(TokenKind::CloseParen)?;

        Ok((arguments, close.span))
    }

    /// A block expression holding a single control flow construct
    fn read_flow_expression(&mut self, label: bool) -> Result<NodeId, ReadError> {
        let start = self.expect_peek("control flow")?.span;
        let mut builder = BlockBuilder::default();

        let stmt = if label {
            self.read_labeled(&mut builder)?
        } else {
            self.read_control_flow(&mut builder, None)?
        };

        let span = start.to(Span::new(start.start, self.previous_end()));

        // A labeled block without any control flow inside stays linear
        if let ControlFlow::Labeled(labeled) = &stmt {
            let plain = labeled.continue_label.is_none()
                && !builder.structured
                && labeled.stmts.stmts.iter().enumerate().all(
                    |(i, s)| matches!(s, ControlFlow::Stmt(r) if r.index == i),
                );

            if plain {
                let kind = NodeKind::Block(BlockFlow::Linear {
                    label: Some(labeled.break_label),
                });
                return Ok(self.tree.add(span, kind, builder.children));
            }
        }

        builder.structured = true;
        Ok(self.finish_block(span, builder, StmtBlock::new(vec![stmt])))
    }

    fn read_block_expression(&mut self) -> Result<NodeId, ReadError> {
        let mut builder = BlockBuilder::default();
        let mut flow = StmtBlock::default();
        let span = self.read_braced_statements(&mut builder, &mut flow)?;

        Ok(self.finish_block(span, builder, flow))
    }

    /// `fn (formals) (-> return)? { body }`
    fn read_function(&mut self) -> Result<NodeId, ReadError> {
        let fn_keyword = self.expect_keyword(Keyword::Fn)?;
        let mut children = Vec::new();

        self.expect_next_to_be(TokenKind::OpenParen)?;

        if !self.peek_is(TokenKind::CloseParen)? {
            children.push(self.read_declaration(false)?.0);

            while self.eat(TokenKind::Comma)?.is_some() {
                children.push(self.read_declaration(false)?.0);
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen)?;

        if self.eat(TokenKind::Arrow)?.is_some() {
            let (decl, _) = self.read_declaration(false)?;
            self.tree.add_metadata(decl, MetadataKey::Return, Value::Void);
            children.push(decl);
        }

        let body = self.read_block_expression()?;
        let span = fn_keyword.span.to(self.tree.span(body));
        children.push(body);

        let fun = self.tree.add(span, NodeKind::Fun, children);
        self.tree.node_mut(fun).ty = Some(Type::FN);

        Ok(fun)
    }

    fn read_atomic_expression(&mut self) -> Result<NodeId, ReadError> {
        let peeked = self.expect_peek("expression")?;

        match peeked.kind {
            TokenKind::OpenBrace => return self.read_block_expression(),
            TokenKind::Keyword(Keyword::If)
            | TokenKind::Keyword(Keyword::While)
            | TokenKind::Keyword(Keyword::Do) => return self.read_flow_expression(false),
            TokenKind::Keyword(Keyword::Fn) => return self.read_function(),
            TokenKind::Keyword(Keyword::Let)
            | TokenKind::Keyword(Keyword::Var)
            | TokenKind::At => {
                let (decl, _) = self.read_declaration(true)?;

                if self.peek_is(TokenKind::Equals)? {
                    return Err(ReadError::NestedInitializer {
                        span: self.tree.span(decl),
                    });
                }

                return Ok(decl);
            }
            _ => {}
        }

        if self.at_label()? {
            return self.read_flow_expression(true);
        }

        let token = self.expect_next("expression")?;
        let span = token.span;
        let called = self.peek_is(TokenKind::OpenParen)?;

        let node = match token.kind {
            TokenKind::IntegerLiteral => {
                let text = self.text(&token);
                let value = text.parse().map_err(|_| ReadError::IntegerOutOfRange {
                    text: text.to_owned(),
                    span,
                })?;

                self.tree.add_value(span, Value::Int(value))
            }
            TokenKind::BooleanLiteral => {
                let value = self.text(&token) == "true";
                self.tree.add_value(span, Value::Bool(value))
            }
            TokenKind::StringLiteral => {
                let text = self.text(&token);
                let value = text[1..text.len() - 1]
                    .replace("\\\"", "\"")
                    .replace("\\\\", "\\");

                self.tree.add_value(span, Value::Str(value))
            }
            TokenKind::Keyword(Keyword::Void) => self.tree.add_void(span),
            TokenKind::Keyword(Keyword::Stay) => self.tree.add(span, NodeKind::Stay, Vec::new()),
            TokenKind::Keyword(Keyword::Esc) => {
                let (args, close) = self.read_arguments()?;
                self.tree.add(span.to(close), NodeKind::Esc, args)
            }
            TokenKind::OpenParen => {
                let expression = self.read_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;
                expression
            }
            TokenKind::Dot => {
                let member = self.expect_next_to_be(TokenKind::Identifier)?;
                let symbol = InternedSymbol::new(self.text(&member));
                self.tree.add_value(span.to(member.span), Value::Symbol(symbol))
            }
            TokenKind::LessThan => {
                let ty = self.read_type()?;
                let close = self.expect_next_to_be(TokenKind::GreaterThan)?;
                self.tree.add_value(span.to(close.span), Value::Type(ty))
            }
            TokenKind::Percent => {
                let builtin = self.expect_next_to_be(TokenKind::Identifier)?;
                let name = Name::Builtin(InternedSymbol::new(self.text(&builtin)));
                self.tree.add_right_name(span.to(builtin.span), name)
            }
            TokenKind::DoubleColon => {
                let exported = self.expect_next_to_be(TokenKind::Identifier)?;
                let name = Name::Exported(InternedSymbol::new(self.text(&exported)));
                self.tree.add_right_name(span.to(exported.span), name)
            }
            TokenKind::Identifier if called => {
                match Builtin::from_str(self.text(&token)) {
                    Ok(builtin) => self.tree.add_value(span, Value::Fn(builtin)),
                    Err(_) => {
                        let name = self.name_from_token(&token)?;
                        self.tree.add_right_name(span, name)
                    }
                }
            }
            TokenKind::Identifier | TokenKind::TemporaryIdentifier => {
                let name = self.name_from_token(&token)?;
                self.tree.add_right_name(span, name)
            }
            _ => return Err(self.unexpected("expression", &token)),
        };

        Ok(node)
    }
}
