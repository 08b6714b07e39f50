use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::frontend::{SourceFile, reader::ReadError};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword),    // while
    Identifier,          // x
    TemporaryIdentifier, // t#3

    /* Literals */
    BooleanLiteral, // true
    IntegerLiteral, // 1
    StringLiteral,  // "hello, world"

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    Semicolon,  // ;
    Comma,      // ,

    /* Sigils */
    Colon,       // :
    DoubleColon, // ::
    Arrow,       // ->
    Dot,         // .
    At,          // @
    Percent,     // %
    Slash,       // /

    /* Operators */
    Bang,                 // !
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Equals,               // =
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::DoubleEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_name(&self) -> bool {
        matches!(self, Self::Identifier | Self::TemporaryIdentifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Let,
    Var,
    Fn,
    If,
    Else,
    While,
    Do,
    Next,
    Break,
    Continue,
    Orelse,
    Void,
    Stay,
    Esc,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('.', TokenKind::Dot),
        ('@', TokenKind::At),
        ('%', TokenKind::Percent),
        ('/', TokenKind::Slash),
        ('!', TokenKind::Bang),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

/// Table of two char tokens, checked before [`SINGLE_TOKENS`]
static DOUBLE_TOKENS: Lazy<BTreeMap<(char, char), TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ((':', ':'), TokenKind::DoubleColon),
        (('-', '>'), TokenKind::Arrow),
        (('=', '='), TokenKind::DoubleEquals),
        (('!', '='), TokenKind::NotEquals),
        (('<', '='), TokenKind::LessThanOrEqualTo),
        (('>', '='), TokenKind::GreaterThanOrEqualTo),
    ])
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Self {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Zero width span at the start of this one
    pub fn left_edge(self) -> Self {
        Self::new(self.start, self.start)
    }

    /// Zero width span at the end of this one
    pub fn right_edge(self) -> Self {
        Self::new(self.end, self.end)
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_whitespace() {
                break;
            }

            self.advance();
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.advance();
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn read_string(&mut self) -> Result<Token, ReadError> {
        let start_position = self.position;

        // Consume the opening quote
        self.advance();

        while let Some(c) = self.advance() {
            match c {
                '\n' => break,
                '\\' => {
                    self.advance();
                }
                '"' => {
                    return Ok(Token {
                        span: self.new_span(start_position),
                        kind: TokenKind::StringLiteral,
                    });
                }
                _ => {}
            }
        }

        Err(ReadError::UnterminatedString {
            span: self.new_span(start_position),
        })
    }

    // Keyword, identifier, temporary identifier, or boolean literal
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.advance();
        }

        // A `#` followed by digits makes a temporary: `t#12`
        if self.chars.peek() == Some(&'#')
            && self.chars.peek_nth(1).is_some_and(char::is_ascii_digit)
        {
            self.advance();

            while self.chars.peek().is_some_and(char::is_ascii_digit) {
                self.advance();
            }

            return Token {
                kind: TokenKind::TemporaryIdentifier,
                span: self.new_span(start_position),
            };
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "true" | "false" => TokenKind::BooleanLiteral,
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;

        while self.chars.peek().is_some_and(char::is_ascii_digit) {
            self.advance();
        }

        Token {
            kind: TokenKind::IntegerLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_fixed(&mut self, kind: TokenKind, length: usize) -> Token {
        let start_position = self.position;

        for _ in 0..length {
            self.advance();
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token>, ReadError> {
        if self.peek_buffer.is_empty() {
            if let Some(token) = self.lex_token()? {
                self.peek_buffer.push_back(token);
            }
        }

        Ok(self.peek_buffer.front().cloned())
    }

    /// Peeks `n` tokens past the next one
    pub fn peek_nth(&mut self, n: usize) -> Result<Option<Token>, ReadError> {
        while self.peek_buffer.len() <= n {
            let Some(token) = self.lex_token()? else {
                return Ok(None);
            };

            self.peek_buffer.push_back(token);
        }

        Ok(self.peek_buffer.get(n).cloned())
    }

    pub fn next(&mut self) -> Result<Option<Token>, ReadError> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.lex_token()
    }

    fn lex_token(&mut self) -> Result<Option<Token>, ReadError> {
        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.chars.peek_nth(1).is_some_and(|c| *c == '/') => {
                    self.ignore_line();
                    continue;
                }

                '"' => self.read_string()?,
                n if n.is_ascii_digit() => self.read_number(),
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                c => {
                    let double = self
                        .chars
                        .peek_nth(1)
                        .and_then(|next| DOUBLE_TOKENS.get(&(c, *next)).copied());

                    if let Some(kind) = double {
                        self.read_fixed(kind, 2)
                    } else if let Some(kind) = SINGLE_TOKENS.get(&c).copied() {
                        self.read_fixed(kind, 1)
                    } else {
                        let start = self.position;
                        self.advance();

                        return Err(ReadError::UnexpectedCharacter {
                            character: c,
                            span: self.new_span(start),
                        });
                    }
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}
