//! Parser and element tree for Tessera templates.
//!
//! A template is tokenized, parsed into an arena of elements through a
//! [`TreeBuilder`], cleaned up once, and frozen into a [`Template`]. Every
//! element and expression implements [`Node`], which exposes its location,
//! canonical form, and parameters to tooling.

mod builder;
mod element;
mod expression;
pub mod lexer;
mod location;
mod node;
mod parser;
mod printer;
pub mod token;
mod tree;

use thiserror::Error;

pub use builder::{ChildList, TreeBuilder, INITIAL_CHILD_BUFFER_CAPACITY};
pub use element::{
    Assignment, Branch, CapturingAssignment, Comment, ConditionalBlock, ElementId, ElementKind,
    Include, ListBlock, MacroCall, MacroDefinition, TextBlock,
};
pub use expression::{quote, ComparisonOp, Expression, ExpressionKind};
pub use location::{
    format_location, Location, Position, Span, TemplateSource, RUNTIME_EVAL_LINE_DISPLACEMENT,
};
pub use node::{Node, ParameterRole, ParameterValue};
pub use parser::{parse_expression_fragment, parse_template};
pub use printer::dump_tree;
pub use tree::{Descendants, ElementRef, Template};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected character {character:?} at {}", position(.line, .column))]
    UnexpectedCharacter {
        character: char,
        line: i32,
        column: i32,
    },

    #[error("unterminated {what} starting at {}", position(.line, .column))]
    Unterminated {
        what: &'static str,
        line: i32,
        column: i32,
    },

    #[error("{message} at {}", position(.line, .column))]
    UnexpectedToken {
        message: String,
        line: i32,
        column: i32,
    },

    #[error("unknown directive '#{name}' at {}", position(.line, .column))]
    UnknownDirective { name: String, line: i32, column: i32 },

    #[error("expected '{{[/{expected}]}}' but found '{found}' at {}", position(.line, .column))]
    MismatchedClose {
        expected: String,
        found: String,
        line: i32,
        column: i32,
    },

    #[error("reserved word '{word}' cannot be used as identifier at {}", position(.line, .column))]
    ReservedWord { word: String, line: i32, column: i32 },

    #[error("integer literal {literal} out of range at {}", position(.line, .column))]
    IntegerOutOfRange {
        literal: String,
        line: i32,
        column: i32,
    },
}

impl ParseError {
    pub fn line(&self) -> i32 {
        match self {
            ParseError::UnexpectedCharacter { line, .. }
            | ParseError::Unterminated { line, .. }
            | ParseError::UnexpectedToken { line, .. }
            | ParseError::UnknownDirective { line, .. }
            | ParseError::MismatchedClose { line, .. }
            | ParseError::ReservedWord { line, .. }
            | ParseError::IntegerOutOfRange { line, .. } => *line,
        }
    }

    pub fn column(&self) -> i32 {
        match self {
            ParseError::UnexpectedCharacter { column, .. }
            | ParseError::Unterminated { column, .. }
            | ParseError::UnexpectedToken { column, .. }
            | ParseError::UnknownDirective { column, .. }
            | ParseError::MismatchedClose { column, .. }
            | ParseError::ReservedWord { column, .. }
            | ParseError::IntegerOutOfRange { column, .. } => *column,
        }
    }
}

fn position(line: &i32, column: &i32) -> String {
    if *line < 0 {
        format_location(None, *line, *column)
    } else {
        format!("line {line}, column {column}")
    }
}

/// Parse a nameless template with whitespace stripping on.
pub fn parse(source: &str) -> Result<Template, ParseError> {
    parse_template(None, source, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_text() {
        let template = parse("Hello, World!").unwrap();
        assert_eq!(template.root().description(), "text \"Hello, World!\"");
        assert_eq!(template.name(), None);
    }

    #[test]
    fn parse_delimiter_escape() {
        let template = parse("a{[{]}b").unwrap();
        let ElementKind::Text(block) = template.root().kind() else {
            panic!("expected text");
        };
        assert_eq!(block.text, "a{[b");
    }

    #[test]
    fn error_location() {
        let err = parse("line one\n{[ name").unwrap_err();
        assert_eq!((err.line(), err.column()), (2, 1));
        assert_eq!(err.to_string(), "unterminated tag starting at line 2, column 1");
    }

    #[test]
    fn evaluated_error_location() {
        let err = parse_expression_fragment("a +").unwrap_err();
        assert!(err.line() < 0);
        assert!(err.to_string().ends_with("at evaluated string:1:4"), "{err}");
    }

    #[test]
    fn mismatched_close_message() {
        let err = parse("{[#list xs as x]}{[/if]}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected '{[/list]}' but found 'if' at line 1, column 21"
        );
    }
}
