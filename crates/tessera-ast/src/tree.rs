//! Read access to element trees: navigation, predicates, canonical forms.

use std::fmt;
use std::sync::Arc;

use crate::element::{Element, ElementId, ElementKind, TextBlock};
use crate::expression::Expression;
use crate::location::{Location, TemplateSource};
use crate::node::{Node, ParameterRole, ParameterValue};

/// Backing store of every element of one template.
#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    elements: Vec<Element>,
}

impl Arena {
    pub(crate) fn push(&mut self, element: Element) -> ElementId {
        let id = ElementId::new(self.elements.len());
        self.elements.push(element);
        id
    }

    pub(crate) fn get(&self, id: ElementId) -> &Element {
        &self.elements[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }
}

#[track_caller]
pub(crate) fn child_out_of_range(index: usize, count: usize) -> ! {
    panic!("child index {index} out of range (child count is {count})")
}

/// A borrowed view of one element and the tree around it.
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    arena: &'a Arena,
    id: ElementId,
}

impl<'a> ElementRef<'a> {
    pub(crate) fn new(arena: &'a Arena, id: ElementId) -> Self {
        Self { arena, id }
    }

    fn data(&self) -> &'a Element {
        self.arena.get(self.id)
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn kind(&self) -> &'a ElementKind {
        &self.data().kind
    }

    /// Another element of the same tree.
    pub fn element(&self, id: ElementId) -> ElementRef<'a> {
        ElementRef::new(self.arena, id)
    }

    pub fn parent(&self) -> Option<ElementRef<'a>> {
        self.data().parent.map(|id| self.element(id))
    }

    /// Position of this element in its parent's children.
    pub fn index(&self) -> usize {
        self.data().index
    }

    pub fn child_count(&self) -> usize {
        self.data().child_count()
    }

    /// The child storage, `None` when there are no children.
    pub fn child_buffer(&self) -> Option<&'a [ElementId]> {
        self.data().children.as_deref()
    }

    /// # Panics
    ///
    /// When `index >= self.child_count()`.
    pub fn child(&self, index: usize) -> ElementRef<'a> {
        match self.child_buffer().and_then(|buffer| buffer.get(index)) {
            Some(&id) => self.element(id),
            None => child_out_of_range(index, self.child_count()),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let arena = self.arena;
        self.child_buffer()
            .unwrap_or_default()
            .iter()
            .map(move |&id| ElementRef::new(arena, id))
    }

    pub fn is_leaf(&self) -> bool {
        self.child_count() == 0
    }

    pub fn previous_sibling(&self) -> Option<ElementRef<'a>> {
        let parent = self.parent()?;
        let index = self.index().checked_sub(1)?;
        Some(parent.child(index))
    }

    pub fn next_sibling(&self) -> Option<ElementRef<'a>> {
        let parent = self.parent()?;
        let index = self.index() + 1;
        (index < parent.child_count()).then(|| parent.child(index))
    }

    /// The leaf that runs right before this element in document order.
    pub fn prev_terminal_node(&self) -> Option<ElementRef<'a>> {
        let mut node = *self;
        loop {
            if let Some(previous) = node.previous_sibling() {
                return Some(previous.last_leaf());
            }
            node = node.parent()?;
        }
    }

    /// The leaf that runs right after this element in document order.
    pub fn next_terminal_node(&self) -> Option<ElementRef<'a>> {
        let mut node = *self;
        loop {
            if let Some(next) = node.next_sibling() {
                return Some(next.first_leaf());
            }
            node = node.parent()?;
        }
    }

    pub fn first_leaf(&self) -> ElementRef<'a> {
        let mut node = *self;
        while !node.is_terminal() {
            node = node.child(0);
        }
        node
    }

    pub fn last_leaf(&self) -> ElementRef<'a> {
        let mut node = *self;
        while !node.is_terminal() {
            node = node.child(node.child_count() - 1);
        }
        node
    }

    fn is_terminal(&self) -> bool {
        self.is_leaf() || self.kind().is_terminal_unit()
    }

    /// Whether the cleanup pass may drop this element.
    pub fn is_ignorable(&self, strip_whitespace: bool) -> bool {
        match self.kind() {
            ElementKind::Text(block) => self.is_ignorable_text(block, strip_whitespace),
            ElementKind::ImplicitParent => self.is_leaf(),
            ElementKind::Comment(_) => true,
            _ => false,
        }
    }

    fn is_ignorable_text(&self, block: &TextBlock, strip_whitespace: bool) -> bool {
        if block.text.is_empty() {
            return true;
        }
        if !strip_whitespace || !block.is_blank() {
            return false;
        }
        let at_top_level = self.parent().map_or(true, |parent| parent.parent().is_none());
        let quiet = |sibling: Option<ElementRef<'a>>| match sibling {
            Some(sibling) => sibling.kind().is_non_outputting(),
            None => at_top_level,
        };
        quiet(self.previous_sibling()) && quiet(self.next_sibling())
    }

    pub fn is_nested_block_repeater(&self) -> bool {
        self.kind().is_nested_block_repeater()
    }

    /// Whether the output depends only on template content and running the
    /// element has no side effect.
    pub fn is_output_cacheable(&self) -> bool {
        match self.kind() {
            ElementKind::Text(_) | ElementKind::Comment(_) => true,
            ElementKind::ImplicitParent => self.is_children_output_cacheable(),
            _ => false,
        }
    }

    pub fn is_children_output_cacheable(&self) -> bool {
        self.children().all(|child| child.is_output_cacheable())
    }

    pub fn heeds_opening_whitespace(&self) -> bool {
        !self.is_text_dropped_when_stripping() && self.kind().heeds_opening_whitespace()
    }

    pub fn heeds_trailing_whitespace(&self) -> bool {
        !self.is_text_dropped_when_stripping() && self.kind().heeds_trailing_whitespace()
    }

    fn is_text_dropped_when_stripping(&self) -> bool {
        matches!(self.kind(), ElementKind::Text(_)) && self.is_ignorable(true)
    }

    pub fn is_shown_in_stack_trace(&self) -> bool {
        self.kind().is_shown_in_stack_trace()
    }

    /// One line naming the element and its parameters, without children.
    pub fn description(&self) -> String {
        match self.kind() {
            ElementKind::ImplicitParent | ElementKind::IfBlock => {
                self.kind().descriptor().to_string()
            }
            ElementKind::Text(block) => {
                let mut preview: String = block.text.chars().take(20).collect();
                if preview.len() < block.text.len() {
                    preview.push_str("...");
                }
                format!("text {preview:?}")
            }
            _ => self.open_tag(),
        }
    }

    /// Canonical form including the canonical forms of all descendants.
    pub fn full_canonical_form(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out, true);
        out
    }

    fn write_markup(&self, out: &mut String, with_children: bool) {
        let write_children = |out: &mut String| {
            if with_children {
                for child in self.children() {
                    child.write_markup(out, true);
                }
            }
        };
        match self.kind() {
            ElementKind::ImplicitParent => write_children(out),
            ElementKind::Text(block) => out.push_str(&block.text.replace("{[", "{[{]}")),
            ElementKind::IfBlock => {
                for branch in self.children() {
                    branch.write_markup(out, with_children);
                }
                out.push_str("{[/if]}");
            }
            ElementKind::Conditional(_) => {
                out.push_str(&self.open_tag());
                write_children(out);
                let in_container =
                    matches!(self.parent().map(|parent| parent.kind()), Some(ElementKind::IfBlock));
                if !in_container {
                    out.push_str("{[/if]}");
                }
            }
            ElementKind::List(_) => {
                out.push_str(&self.open_tag());
                write_children(out);
                out.push_str("{[/list]}");
            }
            ElementKind::CapturingAssignment(_) => {
                out.push_str(&self.open_tag());
                write_children(out);
                out.push_str("{[/assign]}");
            }
            ElementKind::Macro(_) => {
                out.push_str(&self.open_tag());
                write_children(out);
                out.push_str("{[/macro]}");
            }
            ElementKind::Interpolation(_)
            | ElementKind::Assignment(_)
            | ElementKind::MacroCall(_)
            | ElementKind::Include(_)
            | ElementKind::Comment(_) => out.push_str(&self.open_tag()),
        }
    }

    /// The tag that starts this element, or its whole markup for elements
    /// that have no body.
    fn open_tag(&self) -> String {
        match self.kind() {
            ElementKind::ImplicitParent | ElementKind::Text(_) | ElementKind::IfBlock => {
                String::new()
            }
            ElementKind::Interpolation(expression) => {
                format!("{{[ {} ]}}", expression.canonical_form())
            }
            ElementKind::Conditional(block) => match &block.condition {
                Some(condition) => {
                    format!("{{[{} {}]}}", block.branch.keyword(), condition.canonical_form())
                }
                None => format!("{{[{}]}}", block.branch.keyword()),
            },
            ElementKind::List(list) => format!(
                "{{[#list {} as {}]}}",
                list.source.canonical_form(),
                list.loop_variable
            ),
            ElementKind::Assignment(assignment) => format!(
                "{{[#assign {} = {}]}}",
                assignment.target,
                assignment.value.canonical_form()
            ),
            ElementKind::CapturingAssignment(capture) => {
                format!("{{[#assign {}]}}", capture.target)
            }
            ElementKind::Macro(definition) => {
                let mut tag = format!("{{[#macro {}", definition.name);
                for parameter in &definition.parameters {
                    tag.push(' ');
                    tag.push_str(parameter);
                }
                tag.push_str("]}");
                tag
            }
            ElementKind::MacroCall(call) => {
                let arguments: Vec<String> =
                    call.arguments.iter().map(Expression::canonical_form).collect();
                if arguments.is_empty() {
                    format!("{{[@{}]}}", call.name)
                } else {
                    format!("{{[@{} {}]}}", call.name, arguments.join(", "))
                }
            }
            ElementKind::Include(include) => {
                format!("{{[#include {}]}}", include.path.canonical_form())
            }
            ElementKind::Comment(comment) => format!("{{[%{}]}}", comment.text),
        }
    }
}

impl Node for ElementRef<'_> {
    fn location(&self) -> &Location {
        &self.data().location
    }

    fn canonical_form(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out, false);
        out
    }

    fn descriptor(&self) -> String {
        self.kind().descriptor().to_string()
    }

    fn parameter_count(&self) -> usize {
        self.kind().parameter_count()
    }

    fn parameter_value(&self, index: usize) -> ParameterValue<'_> {
        self.kind().parameter_value(index)
    }

    fn parameter_role(&self, index: usize) -> ParameterRole {
        self.kind().parameter_role(index)
    }
}

impl fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.description())
    }
}

impl PartialEq for ElementRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.arena, other.arena) && self.id == other.id
    }
}

impl Eq for ElementRef<'_> {}

/// A compiled template: a cleaned-up element tree that no longer changes.
///
/// Templates are `Send + Sync`; share one through an `Arc` and execute it
/// from as many threads as needed.
#[derive(Debug, Clone)]
pub struct Template {
    arena: Arena,
    root: ElementId,
    source: Arc<TemplateSource>,
}

impl Template {
    pub(crate) fn new(arena: Arena, root: ElementId, source: Arc<TemplateSource>) -> Self {
        Self {
            arena,
            root,
            source,
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        ElementRef::new(&self.arena, self.root)
    }

    pub fn element(&self, id: ElementId) -> ElementRef<'_> {
        ElementRef::new(&self.arena, id)
    }

    pub fn source(&self) -> &Arc<TemplateSource> {
        &self.source
    }

    pub fn name(&self) -> Option<&str> {
        self.source.name()
    }

    /// Markup equivalent to the whole template.
    pub fn canonical_form(&self) -> String {
        self.root().full_canonical_form()
    }

    /// Every element reachable from the root, in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.root()],
        }
    }

    /// The deepest element whose span covers the position.
    pub fn find_innermost(&self, line: i32, column: i32) -> Option<ElementRef<'_>> {
        let mut found = None;
        let mut candidates = vec![self.root()];
        while let Some(element) = candidates.pop() {
            if element.contains_position(line, column) {
                found = Some(element);
                candidates.clear();
                candidates.extend(element.children());
            }
        }
        found
    }
}

/// Pre-order walk over a template's elements.
pub struct Descendants<'a> {
    stack: Vec<ElementRef<'a>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = ElementRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        if let Some(buffer) = element.child_buffer() {
            self.stack
                .extend(buffer.iter().rev().map(|&id| element.element(id)));
        }
        Some(element)
    }
}
