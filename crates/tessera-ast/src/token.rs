//! Token types for the Tessera lexer.

use crate::location::{Position, Span};

/// Token types produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Raw text content outside tags.
    Text,
    /// `{[% ... ]}`; the value is the text between `%` and `]}`.
    Comment,
    /// `{[` - opening delimiter
    Open,
    /// `]}` - closing delimiter
    Close,
    /// `#` - directive marker
    Hash,
    /// `/` - directive close marker
    Slash,
    /// `@` - macro call marker
    At,
    Dot,
    Comma,
    /// `=` - assignment
    Equal,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `!` - negation
    Bang,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    Plus,
    LParen,
    RParen,
    /// `?` - built-in marker, as in `code?eval`
    Question,
    /// String literal; the value is unescaped.
    String,
    Integer,
    /// Identifier: [A-Za-z_][A-Za-z0-9_]*
    Ident,
    KwTrue,
    KwFalse,
    KwNull,
    KwAs,
    /// End of input
    Eof,
}

impl TokenType {
    /// The fixed text of punctuation tokens.
    pub fn literal(self) -> Option<&'static str> {
        Some(match self {
            TokenType::Open => "{[",
            TokenType::Close => "]}",
            TokenType::Hash => "#",
            TokenType::Slash => "/",
            TokenType::At => "@",
            TokenType::Dot => ".",
            TokenType::Comma => ",",
            TokenType::Equal => "=",
            TokenType::EqEq => "==",
            TokenType::NotEq => "!=",
            TokenType::Bang => "!",
            TokenType::AndAnd => "&&",
            TokenType::OrOr => "||",
            TokenType::Plus => "+",
            TokenType::LParen => "(",
            TokenType::RParen => ")",
            TokenType::Question => "?",
            _ => return None,
        })
    }
}

/// A token with its type, value, and span (end inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub begin: Position,
    pub end: Position,
}

impl Token {
    pub fn new(token_type: TokenType, value: impl Into<String>, begin: Position, end: Position) -> Self {
        Self {
            token_type,
            value: value.into(),
            begin,
            end,
        }
    }
}

impl Span for Token {
    fn begin(&self) -> Position {
        self.begin
    }

    fn end(&self) -> Position {
        self.end
    }
}
