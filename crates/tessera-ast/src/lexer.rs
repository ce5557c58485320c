//! Hand-written lexer for Tessera templates.
//!
//! Two-mode state machine:
//! - Text mode: accumulates raw text until the `{[` delimiter
//! - Tag mode: tokenizes operators, literals, identifiers inside `{[` ... `]}`
//!
//! Escape: `{[{]}` → `{[` (processed inline as text). Comments `{[% ... ]}`
//! become a single token. Columns count chars, not bytes.

use crate::location::Position;
use crate::token::{Token, TokenType};
use crate::ParseError;

/// Tokenize a template into a sequence of tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source, 1, false).tokenize()
}

/// Tokenize a bare expression (no delimiters) whose first line is
/// `first_line`.
pub fn tokenize_expression(source: &str, first_line: i32) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source, first_line, true).tokenize()
}

struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: i32,
    column: i32,
    /// Position of the last consumed char.
    last: Position,
    in_tag: bool,
    expression_only: bool,
    tag_start: Position,
}

impl Lexer {
    const TAG_OPEN: &'static str = "{[";
    const TAG_OPEN_ESCAPE: &'static str = "{[{]}";
    const COMMENT_OPEN: &'static str = "{[%";

    fn new(source: &str, first_line: i32, expression_only: bool) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: first_line,
            column: 1,
            last: Position::new(first_line, 0),
            in_tag: expression_only,
            expression_only,
            tag_start: Position::new(first_line, 1),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        while self.pos < self.source.len() {
            if self.in_tag {
                self.tokenize_tag(&mut tokens)?;
            } else {
                self.tokenize_text(&mut tokens)?;
            }
        }

        if self.in_tag && !self.expression_only {
            return Err(ParseError::Unterminated {
                what: "tag",
                line: self.tag_start.line,
                column: self.tag_start.column,
            });
        }

        let here = self.here();
        tokens.push(Token::new(TokenType::Eof, "", here, here));
        Ok(tokens)
    }

    /// Tokenize text mode: accumulate text until `{[` delimiter.
    fn tokenize_text(&mut self, tokens: &mut Vec<Token>) -> Result<(), ParseError> {
        let begin = self.here();
        let mut text = String::new();

        while self.pos < self.source.len() {
            if self.looking_at(Self::TAG_OPEN_ESCAPE) {
                text.push_str(Self::TAG_OPEN);
                self.advance_n(Self::TAG_OPEN_ESCAPE.len());
                continue;
            }
            if self.looking_at(Self::TAG_OPEN) {
                break;
            }
            text.push(self.source[self.pos]);
            self.advance_one();
        }

        if !text.is_empty() {
            tokens.push(Token::new(TokenType::Text, text, begin, self.last));
        }

        if self.looking_at(Self::COMMENT_OPEN) {
            return self.tokenize_comment(tokens);
        }
        if self.looking_at(Self::TAG_OPEN) {
            let open = self.here();
            self.emit_fixed(tokens, TokenType::Open);
            self.in_tag = true;
            self.tag_start = open;
            self.check_no_whitespace_before_marker()?;
        }
        Ok(())
    }

    fn tokenize_comment(&mut self, tokens: &mut Vec<Token>) -> Result<(), ParseError> {
        let begin = self.here();
        self.advance_n(Self::COMMENT_OPEN.len());
        let mut text = String::new();
        while !self.looking_at("]}") {
            if self.pos >= self.source.len() {
                return Err(ParseError::Unterminated {
                    what: "comment",
                    line: begin.line,
                    column: begin.column,
                });
            }
            text.push(self.source[self.pos]);
            self.advance_one();
        }
        self.advance_n(2);
        tokens.push(Token::new(TokenType::Comment, text, begin, self.last));
        Ok(())
    }

    /// `{[ #if` and friends are rejected: markers must follow `{[` directly.
    fn check_no_whitespace_before_marker(&self) -> Result<(), ParseError> {
        let mut p = self.pos;
        while p < self.source.len() && self.source[p].is_whitespace() {
            p += 1;
        }
        match self.source.get(p) {
            Some(&marker @ ('#' | '/' | '@')) if p > self.pos => Err(ParseError::UnexpectedToken {
                message: format!("whitespace not allowed between '{{[' and '{marker}'"),
                line: self.line,
                column: self.column,
            }),
            _ => Ok(()),
        }
    }

    /// Tokenize tag mode: one token per call, whitespace skipped.
    fn tokenize_tag(&mut self, tokens: &mut Vec<Token>) -> Result<(), ParseError> {
        while self.pos < self.source.len() && self.source[self.pos].is_whitespace() {
            self.advance_one();
        }
        if self.pos >= self.source.len() {
            return Ok(());
        }

        let begin = self.here();
        match self.source[self.pos] {
            ']' if self.looking_at("]}") => {
                self.emit_fixed(tokens, TokenType::Close);
                self.in_tag = self.expression_only;
            }
            '#' => self.emit_fixed(tokens, TokenType::Hash),
            '/' => self.emit_fixed(tokens, TokenType::Slash),
            '@' => self.emit_fixed(tokens, TokenType::At),
            '.' => self.emit_fixed(tokens, TokenType::Dot),
            ',' => self.emit_fixed(tokens, TokenType::Comma),
            '+' => self.emit_fixed(tokens, TokenType::Plus),
            '(' => self.emit_fixed(tokens, TokenType::LParen),
            ')' => self.emit_fixed(tokens, TokenType::RParen),
            '?' => self.emit_fixed(tokens, TokenType::Question),
            '=' if self.looking_at("==") => self.emit_fixed(tokens, TokenType::EqEq),
            '=' => self.emit_fixed(tokens, TokenType::Equal),
            '!' if self.looking_at("!=") => self.emit_fixed(tokens, TokenType::NotEq),
            '!' => self.emit_fixed(tokens, TokenType::Bang),
            '&' if self.looking_at("&&") => self.emit_fixed(tokens, TokenType::AndAnd),
            '|' if self.looking_at("||") => self.emit_fixed(tokens, TokenType::OrOr),
            '"' => self.tokenize_string(tokens, begin)?,
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&c @ '0'..='9') = self.source.get(self.pos) {
                    digits.push(c);
                    self.advance_one();
                }
                tokens.push(Token::new(TokenType::Integer, digits, begin, self.last));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while self.pos < self.source.len() && self.is_ident_continue_at(self.pos) {
                    ident.push(self.source[self.pos]);
                    self.advance_one();
                }
                let token_type = match ident.as_str() {
                    "true" => TokenType::KwTrue,
                    "false" => TokenType::KwFalse,
                    "null" => TokenType::KwNull,
                    "as" => TokenType::KwAs,
                    _ => TokenType::Ident,
                };
                tokens.push(Token::new(token_type, ident, begin, self.last));
            }
            character => {
                return Err(ParseError::UnexpectedCharacter {
                    character,
                    line: begin.line,
                    column: begin.column,
                });
            }
        }

        Ok(())
    }

    fn tokenize_string(&mut self, tokens: &mut Vec<Token>, begin: Position) -> Result<(), ParseError> {
        let unterminated = ParseError::Unterminated {
            what: "string literal",
            line: begin.line,
            column: begin.column,
        };
        self.advance_one();
        let mut value = String::new();
        loop {
            let Some(&c) = self.source.get(self.pos) else {
                return Err(unterminated);
            };
            self.advance_one();
            match c {
                '"' => break,
                '\\' => {
                    let Some(&escaped) = self.source.get(self.pos) else {
                        return Err(unterminated);
                    };
                    self.advance_one();
                    value.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                _ => value.push(c),
            }
        }
        tokens.push(Token::new(TokenType::String, value, begin, self.last));
        Ok(())
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Check if the source at current position starts with the given text.
    fn looking_at(&self, pattern: &str) -> bool {
        let mut p = self.pos;
        for expected in pattern.chars() {
            if self.source.get(p) != Some(&expected) {
                return false;
            }
            p += 1;
        }
        true
    }

    /// Emit a punctuation token and advance past its literal.
    fn emit_fixed(&mut self, tokens: &mut Vec<Token>, token_type: TokenType) {
        let literal = token_type.literal().unwrap_or_default();
        let begin = self.here();
        self.advance_n(literal.chars().count());
        tokens.push(Token::new(token_type, literal, begin, self.last));
    }

    fn is_ident_continue_at(&self, pos: usize) -> bool {
        matches!(self.source.get(pos), Some(c) if c.is_ascii_alphanumeric() || *c == '_')
    }

    /// Advance by one char, updating line/column tracking.
    fn advance_one(&mut self) {
        if let Some(&c) = self.source.get(self.pos) {
            self.last = self.here();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance_one();
        }
    }
}
