//! The `Node` protocol shared by elements and expressions.

use std::fmt;

use crate::location::Location;

/// Any parsed unit of a template.
///
/// Besides its location, a node exposes a fixed-size, zero-based list of
/// parameters. The list does not depend on which optional parameters happen
/// to be present in an instance: an omitted one is [`ParameterValue::Absent`]
/// at its usual index. Generic tree walkers can rebuild an equivalent tree
/// from the descriptors and the parameters alone, following only
/// [`ParameterValue::Node`] values.
pub trait Node {
    fn location(&self) -> &Location;

    /// Re-parseable text of this node and its parameters. Nested elements are
    /// elided.
    fn canonical_form(&self) -> String;

    /// Short, single-line name of the construct, like `#if` or `+`.
    fn descriptor(&self) -> String;

    fn parameter_count(&self) -> usize;

    /// # Panics
    ///
    /// When `index >= self.parameter_count()`.
    fn parameter_value(&self, index: usize) -> ParameterValue<'_>;

    /// # Panics
    ///
    /// When `index >= self.parameter_count()`.
    fn parameter_role(&self, index: usize) -> ParameterRole;

    /// The template text of this node. Falls back to the canonical form when
    /// the text is not available (no template, or runtime-evaluated source),
    /// and to the descriptor when both are empty.
    fn source(&self) -> String {
        if let Some(slice) = self.location().source_slice().filter(|s| !s.is_empty()) {
            return slice;
        }
        let canonical = self.canonical_form();
        if canonical.is_empty() {
            self.descriptor()
        } else {
            canonical
        }
    }

    fn contains_position(&self, line: i32, column: i32) -> bool {
        self.location().contains_position(line, column)
    }
}

/// The value of a node parameter.
///
/// Non-node values are leaves; anything that holds further nodes is exposed
/// as a [`ParameterValue::Node`].
#[derive(Clone, Copy)]
pub enum ParameterValue<'a> {
    Absent,
    Node(&'a dyn Node),
    Str(&'a str),
    Int(i64),
    Bool(bool),
}

impl<'a> ParameterValue<'a> {
    pub fn as_node(&self) -> Option<&'a dyn Node> {
        match *self {
            ParameterValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ParameterValue::Absent)
    }
}

impl fmt::Debug for ParameterValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Absent => f.write_str("Absent"),
            ParameterValue::Node(node) => write!(f, "Node({})", node.canonical_form()),
            ParameterValue::Str(s) => write!(f, "Str({s:?})"),
            ParameterValue::Int(i) => write!(f, "Int({i})"),
            ParameterValue::Bool(b) => write!(f, "Bool({b})"),
        }
    }
}

impl fmt::Display for ParameterValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Absent => f.write_str("null"),
            ParameterValue::Node(node) => f.write_str(&node.canonical_form()),
            ParameterValue::Str(s) => write!(f, "{s:?}"),
            ParameterValue::Int(i) => write!(f, "{i}"),
            ParameterValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// What a parameter means for its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterRole {
    LeftHandOperand,
    RightHandOperand,
    EnclosedOperand,
    Condition,
    AstNodeSubtype,
    Content,
    ListSource,
    TargetLoopVariable,
    AssignmentTarget,
    AssignmentSource,
    MacroName,
    ParameterName,
    CalleeName,
    Argument,
    TemplateName,
    Unknown,
}

impl ParameterRole {
    pub fn name(self) -> &'static str {
        match self {
            ParameterRole::LeftHandOperand => "left-hand operand",
            ParameterRole::RightHandOperand => "right-hand operand",
            ParameterRole::EnclosedOperand => "enclosed operand",
            ParameterRole::Condition => "condition",
            ParameterRole::AstNodeSubtype => "AST-node subtype",
            ParameterRole::Content => "content",
            ParameterRole::ListSource => "list source",
            ParameterRole::TargetLoopVariable => "target loop variable",
            ParameterRole::AssignmentTarget => "assignment target",
            ParameterRole::AssignmentSource => "assignment source",
            ParameterRole::MacroName => "macro name",
            ParameterRole::ParameterName => "parameter name",
            ParameterRole::CalleeName => "callee name",
            ParameterRole::Argument => "argument",
            ParameterRole::TemplateName => "template name",
            ParameterRole::Unknown => "[unknown role]",
        }
    }
}

impl fmt::Display for ParameterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[track_caller]
pub(crate) fn parameter_out_of_range(index: usize, count: usize) -> ! {
    panic!("parameter index {index} out of range (parameter count is {count})")
}
