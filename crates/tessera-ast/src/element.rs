//! Executable tree nodes and their kinds.

use std::fmt;

use crate::expression::Expression;
use crate::location::Location;
use crate::node::{parameter_out_of_range, ParameterRole, ParameterValue};

/// Handle of an element in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32);

impl ElementId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or_else(|_| panic!("element arena overflow at {index}")))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage of one element in the arena.
///
/// `children` is `None` exactly when the element has no children; a live
/// child at position `i` has `index == i` and `parent == Some(this)`.
#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) location: Location,
    pub(crate) parent: Option<ElementId>,
    pub(crate) index: usize,
    pub(crate) children: Option<Vec<ElementId>>,
}

impl Element {
    pub(crate) fn new(kind: ElementKind, location: Location) -> Self {
        Self {
            kind,
            location,
            parent: None,
            index: 0,
            children: None,
        }
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// A plain sequence of elements, like the top level of a template.
    ImplicitParent,
    Text(TextBlock),
    Interpolation(Expression),
    /// Holds the [`ElementKind::Conditional`] branches of one `#if`.
    IfBlock,
    Conditional(ConditionalBlock),
    List(ListBlock),
    Assignment(Assignment),
    CapturingAssignment(CapturingAssignment),
    Macro(MacroDefinition),
    MacroCall(MacroCall),
    Include(Include),
    Comment(Comment),
}

/// Static text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub text: String,
    /// Set once whitespace stripping has looked at this block.
    pub(crate) trimmed: bool,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            trimmed: false,
        }
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }

    /// Whether the text before its first line break has content. Text
    /// without a line break shares both lines with its neighbours.
    fn heeds_line_end(&self) -> bool {
        match self.text.split_once('\n') {
            Some((first, _)) => !first.trim().is_empty(),
            None => !self.text.is_empty(),
        }
    }

    /// Whether the text after its last line break has content.
    fn heeds_line_start(&self) -> bool {
        match self.text.rsplit_once('\n') {
            Some((_, last)) => !last.trim().is_empty(),
            None => !self.text.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    If,
    ElseIf,
    Else,
}

impl Branch {
    pub fn code(self) -> i64 {
        match self {
            Branch::If => 0,
            Branch::ElseIf => 1,
            Branch::Else => 2,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Branch::If => "#if",
            Branch::ElseIf => "#elseif",
            Branch::Else => "#else",
        }
    }
}

/// One branch of an `#if`; `condition` is `None` for `#else`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalBlock {
    pub condition: Option<Expression>,
    pub branch: Branch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBlock {
    pub source: Expression,
    pub loop_variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: String,
    pub value: Expression,
}

/// `#assign` with a body: the body's output becomes the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturingAssignment {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall {
    pub name: String,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub path: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
}

impl ElementKind {
    pub fn node_name(&self) -> &'static str {
        match self {
            ElementKind::ImplicitParent => "ImplicitParent",
            ElementKind::Text(_) => "Text",
            ElementKind::Interpolation(_) => "Interpolation",
            ElementKind::IfBlock => "IfBlock",
            ElementKind::Conditional(_) => "Conditional",
            ElementKind::List(_) => "List",
            ElementKind::Assignment(_) => "Assignment",
            ElementKind::CapturingAssignment(_) => "CapturingAssignment",
            ElementKind::Macro(_) => "Macro",
            ElementKind::MacroCall(_) => "MacroCall",
            ElementKind::Include(_) => "Include",
            ElementKind::Comment(_) => "Comment",
        }
    }

    /// Whether this element may run its nested content more than once.
    pub fn is_nested_block_repeater(&self) -> bool {
        matches!(self, ElementKind::List(_))
    }

    /// Elements that never write output where they stand. Blank text next
    /// to them can be dropped in whitespace-stripping mode.
    pub fn is_non_outputting(&self) -> bool {
        matches!(
            self,
            ElementKind::Macro(_)
                | ElementKind::Assignment(_)
                | ElementKind::CapturingAssignment(_)
                | ElementKind::Comment(_)
        )
    }

    /// Kinds that terminal-node walks treat as leaves even when they have
    /// children: the macro definition and the captured body.
    pub fn is_terminal_unit(&self) -> bool {
        matches!(
            self,
            ElementKind::Macro(_) | ElementKind::CapturingAssignment(_)
        )
    }

    pub fn is_shown_in_stack_trace(&self) -> bool {
        matches!(
            self,
            ElementKind::List(_)
                | ElementKind::MacroCall(_)
                | ElementKind::Include(_)
                | ElementKind::CapturingAssignment(_)
        )
    }

    /// Whether this element on a line keeps the whitespace that opens the
    /// next line of a following text block.
    pub fn heeds_opening_whitespace(&self) -> bool {
        match self {
            ElementKind::Text(block) => block.heeds_line_start(),
            ElementKind::Interpolation(_) => true,
            _ => false,
        }
    }

    /// Whether this element on a line keeps the trailing whitespace of a
    /// preceding text block.
    pub fn heeds_trailing_whitespace(&self) -> bool {
        match self {
            ElementKind::Text(block) => block.heeds_line_end(),
            ElementKind::Interpolation(_) => true,
            _ => false,
        }
    }

    pub fn descriptor(&self) -> &'static str {
        match self {
            ElementKind::ImplicitParent => "#mixed_content",
            ElementKind::Text(_) => "#text",
            ElementKind::Interpolation(_) => "{[...]}",
            ElementKind::IfBlock => "#if-#elseif-#else-container",
            ElementKind::Conditional(block) => block.branch.keyword(),
            ElementKind::List(_) => "#list",
            ElementKind::Assignment(_) | ElementKind::CapturingAssignment(_) => "#assign",
            ElementKind::Macro(_) => "#macro",
            ElementKind::MacroCall(_) => "@",
            ElementKind::Include(_) => "#include",
            ElementKind::Comment(_) => "{[%...]}",
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            ElementKind::ImplicitParent | ElementKind::Text(_) | ElementKind::IfBlock => 0,
            ElementKind::Interpolation(_)
            | ElementKind::CapturingAssignment(_)
            | ElementKind::Include(_)
            | ElementKind::Comment(_) => 1,
            ElementKind::Conditional(_) | ElementKind::List(_) | ElementKind::Assignment(_) => 2,
            ElementKind::Macro(definition) => 1 + definition.parameters.len(),
            ElementKind::MacroCall(call) => 1 + call.arguments.len(),
        }
    }

    pub fn parameter_value(&self, index: usize) -> ParameterValue<'_> {
        match (self, index) {
            (ElementKind::Interpolation(expression), 0) => ParameterValue::Node(expression),
            (ElementKind::Conditional(block), 0) => match &block.condition {
                Some(condition) => ParameterValue::Node(condition),
                None => ParameterValue::Absent,
            },
            (ElementKind::Conditional(block), 1) => ParameterValue::Int(block.branch.code()),
            (ElementKind::List(list), 0) => ParameterValue::Node(&list.source),
            (ElementKind::List(list), 1) => ParameterValue::Str(&list.loop_variable),
            (ElementKind::Assignment(assignment), 0) => ParameterValue::Str(&assignment.target),
            (ElementKind::Assignment(assignment), 1) => ParameterValue::Node(&assignment.value),
            (ElementKind::CapturingAssignment(capture), 0) => ParameterValue::Str(&capture.target),
            (ElementKind::Macro(definition), 0) => ParameterValue::Str(&definition.name),
            (ElementKind::Macro(definition), i) if i <= definition.parameters.len() => {
                ParameterValue::Str(&definition.parameters[i - 1])
            }
            (ElementKind::MacroCall(call), 0) => ParameterValue::Str(&call.name),
            (ElementKind::MacroCall(call), i) if i <= call.arguments.len() => {
                ParameterValue::Node(&call.arguments[i - 1])
            }
            (ElementKind::Include(include), 0) => ParameterValue::Node(&include.path),
            (ElementKind::Comment(comment), 0) => ParameterValue::Str(&comment.text),
            _ => parameter_out_of_range(index, self.parameter_count()),
        }
    }

    pub fn parameter_role(&self, index: usize) -> ParameterRole {
        if index >= self.parameter_count() {
            parameter_out_of_range(index, self.parameter_count());
        }
        match (self, index) {
            (ElementKind::Interpolation(_), _) => ParameterRole::Content,
            (ElementKind::Conditional(_), 0) => ParameterRole::Condition,
            (ElementKind::Conditional(_), _) => ParameterRole::AstNodeSubtype,
            (ElementKind::List(_), 0) => ParameterRole::ListSource,
            (ElementKind::List(_), _) => ParameterRole::TargetLoopVariable,
            (ElementKind::Assignment(_), 0) | (ElementKind::CapturingAssignment(_), _) => {
                ParameterRole::AssignmentTarget
            }
            (ElementKind::Assignment(_), _) => ParameterRole::AssignmentSource,
            (ElementKind::Macro(_), 0) => ParameterRole::MacroName,
            (ElementKind::Macro(_), _) => ParameterRole::ParameterName,
            (ElementKind::MacroCall(_), 0) => ParameterRole::CalleeName,
            (ElementKind::MacroCall(_), _) => ParameterRole::Argument,
            (ElementKind::Include(_), _) => ParameterRole::TemplateName,
            (ElementKind::Comment(_), _) => ParameterRole::Content,
            _ => ParameterRole::Unknown,
        }
    }
}
