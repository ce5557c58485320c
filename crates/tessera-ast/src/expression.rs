//! Expression nodes: the parameters of interpolations and directives.

use crate::location::{Location, Position, Span};
use crate::node::{parameter_out_of_range, Node, ParameterRole, ParameterValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionKind {
    StringLiteral(String),
    IntegerLiteral(i64),
    BooleanLiteral(bool),
    NullLiteral,
    Variable(String),
    /// `target.key`; the key is a leaf string, not a node.
    Dot {
        target: Box<Expression>,
        key: String,
    },
    Add {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Or {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    Parenthetical(Box<Expression>),
    /// `target?eval`: parses the string value of `target` and evaluates it.
    Eval(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
}

impl ComparisonOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
        }
    }
}

impl Expression {
    pub fn new(kind: ExpressionKind, location: Location) -> Self {
        Self { kind, location }
    }
}

impl Span for Expression {
    fn begin(&self) -> Position {
        self.location.begin()
    }

    fn end(&self) -> Position {
        self.location.end()
    }
}

impl Node for Expression {
    fn location(&self) -> &Location {
        &self.location
    }

    fn canonical_form(&self) -> String {
        match &self.kind {
            ExpressionKind::StringLiteral(s) => quote(s),
            ExpressionKind::IntegerLiteral(i) => i.to_string(),
            ExpressionKind::BooleanLiteral(b) => b.to_string(),
            ExpressionKind::NullLiteral => "null".to_string(),
            ExpressionKind::Variable(name) => name.clone(),
            ExpressionKind::Dot { target, key } => format!("{}.{key}", target.canonical_form()),
            ExpressionKind::Not(operand) => format!("!{}", operand.canonical_form()),
            ExpressionKind::Parenthetical(inner) => format!("({})", inner.canonical_form()),
            ExpressionKind::Eval(target) => format!("{}?eval", target.canonical_form()),
            ExpressionKind::Add { left, right }
            | ExpressionKind::Comparison { left, right, .. }
            | ExpressionKind::And { left, right }
            | ExpressionKind::Or { left, right } => format!(
                "{} {} {}",
                left.canonical_form(),
                self.descriptor(),
                right.canonical_form()
            ),
        }
    }

    fn descriptor(&self) -> String {
        match &self.kind {
            ExpressionKind::StringLiteral(_)
            | ExpressionKind::IntegerLiteral(_)
            | ExpressionKind::BooleanLiteral(_)
            | ExpressionKind::NullLiteral
            | ExpressionKind::Variable(_) => self.canonical_form(),
            ExpressionKind::Dot { .. } => ".".to_string(),
            ExpressionKind::Add { .. } => "+".to_string(),
            ExpressionKind::Comparison { op, .. } => op.symbol().to_string(),
            ExpressionKind::And { .. } => "&&".to_string(),
            ExpressionKind::Or { .. } => "||".to_string(),
            ExpressionKind::Not(_) => "!".to_string(),
            ExpressionKind::Parenthetical(_) => "(...)".to_string(),
            ExpressionKind::Eval(_) => "?eval".to_string(),
        }
    }

    fn parameter_count(&self) -> usize {
        match &self.kind {
            ExpressionKind::StringLiteral(_)
            | ExpressionKind::IntegerLiteral(_)
            | ExpressionKind::BooleanLiteral(_)
            | ExpressionKind::NullLiteral
            | ExpressionKind::Variable(_) => 0,
            ExpressionKind::Not(_)
            | ExpressionKind::Parenthetical(_)
            | ExpressionKind::Eval(_) => 1,
            ExpressionKind::Dot { .. }
            | ExpressionKind::Add { .. }
            | ExpressionKind::Comparison { .. }
            | ExpressionKind::And { .. }
            | ExpressionKind::Or { .. } => 2,
        }
    }

    fn parameter_value(&self, index: usize) -> ParameterValue<'_> {
        match (&self.kind, index) {
            (ExpressionKind::Dot { target, .. }, 0) => ParameterValue::Node(target.as_ref()),
            (ExpressionKind::Dot { key, .. }, 1) => ParameterValue::Str(key),
            (ExpressionKind::Not(operand), 0)
            | (ExpressionKind::Parenthetical(operand), 0)
            | (ExpressionKind::Eval(operand), 0) => ParameterValue::Node(operand.as_ref()),
            (
                ExpressionKind::Add { left, .. }
                | ExpressionKind::Comparison { left, .. }
                | ExpressionKind::And { left, .. }
                | ExpressionKind::Or { left, .. },
                0,
            ) => ParameterValue::Node(left.as_ref()),
            (
                ExpressionKind::Add { right, .. }
                | ExpressionKind::Comparison { right, .. }
                | ExpressionKind::And { right, .. }
                | ExpressionKind::Or { right, .. },
                1,
            ) => ParameterValue::Node(right.as_ref()),
            _ => parameter_out_of_range(index, self.parameter_count()),
        }
    }

    fn parameter_role(&self, index: usize) -> ParameterRole {
        if index >= self.parameter_count() {
            parameter_out_of_range(index, self.parameter_count());
        }
        match &self.kind {
            ExpressionKind::Not(_) => ParameterRole::RightHandOperand,
            ExpressionKind::Parenthetical(_) => ParameterRole::EnclosedOperand,
            ExpressionKind::Eval(_) => ParameterRole::LeftHandOperand,
            _ if index == 0 => ParameterRole::LeftHandOperand,
            _ => ParameterRole::RightHandOperand,
        }
    }
}

/// Quotes a string the way the lexer reads string literals.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
