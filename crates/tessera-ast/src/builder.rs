//! Tree assembly and the post-parse cleanup pass.
//!
//! A [`TreeBuilder`] owns every element while a template is being parsed.
//! Child storage grows geometrically from [`INITIAL_CHILD_BUFFER_CAPACITY`]
//! and is `None` for elements without children. Once parsing is done,
//! [`TreeBuilder::finish`] runs the cleanup pass on the root and freezes the
//! tree into a [`Template`].

use std::sync::Arc;

use tracing::{debug, trace};

use crate::element::{Element, ElementId, ElementKind};
use crate::location::{Location, TemplateSource};
use crate::node::Node;
use crate::tree::{child_out_of_range, Arena, ElementRef, Template};

/// Capacity allocated by the first insert into an empty child list.
pub const INITIAL_CHILD_BUFFER_CAPACITY: usize = 6;

/// Makes room for one more child, allocating or doubling the storage.
fn reserve_slot(buffer: &mut Option<Vec<ElementId>>) -> &mut Vec<ElementId> {
    let buffer = buffer.get_or_insert_with(|| Vec::with_capacity(INITIAL_CHILD_BUFFER_CAPACITY));
    if buffer.len() == buffer.capacity() {
        buffer.reserve_exact(buffer.len().max(1));
    }
    buffer
}

/// A body accumulated apart from its element, e.g. while the parser has not
/// yet seen the closing tag. Handed over whole by [`TreeBuilder::set_children`].
#[derive(Debug, Default)]
pub struct ChildList {
    buffer: Option<Vec<ElementId>>,
}

impl ChildList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, child: ElementId) {
        reserve_slot(&mut self.buffer).push(child);
    }

    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<ElementId> {
        self.buffer.as_ref()?.last().copied()
    }
}

/// Owner of a tree under construction.
#[derive(Debug)]
pub struct TreeBuilder {
    arena: Arena,
    source: Arc<TemplateSource>,
}

impl TreeBuilder {
    pub fn new(source: Arc<TemplateSource>) -> Self {
        Self {
            arena: Arena::default(),
            source,
        }
    }

    pub fn source(&self) -> &Arc<TemplateSource> {
        &self.source
    }

    /// Adds a detached element to the tree.
    pub fn create(&mut self, kind: ElementKind, location: Location) -> ElementId {
        self.arena.push(Element::new(kind, location))
    }

    pub fn get(&self, id: ElementId) -> ElementRef<'_> {
        ElementRef::new(&self.arena, id)
    }

    /// Allocated child slots of an element, 0 when it has no storage.
    pub fn child_capacity(&self, id: ElementId) -> usize {
        self.arena.get(id).children.as_ref().map_or(0, Vec::capacity)
    }

    fn child_id(&self, parent: ElementId, index: usize) -> ElementId {
        let element = self.arena.get(parent);
        match element.children.as_ref().and_then(|buffer| buffer.get(index)) {
            Some(&id) => id,
            None => child_out_of_range(index, element.child_count()),
        }
    }

    fn link(&mut self, child: ElementId, parent: ElementId, index: usize) {
        let element = self.arena.get_mut(child);
        element.parent = Some(parent);
        element.index = index;
    }

    fn detach(&mut self, child: ElementId) {
        let element = self.arena.get_mut(child);
        element.parent = None;
        element.index = 0;
    }

    /// Re-links every child of `parent` from position `from` on.
    fn relink_from(&mut self, parent: ElementId, from: usize) {
        for index in from..self.arena.get(parent).child_count() {
            let child = self.child_id(parent, index);
            self.link(child, parent, index);
        }
    }

    pub fn add_child(&mut self, parent: ElementId, child: ElementId) {
        let count = self.arena.get(parent).child_count();
        self.insert_child(parent, count, child);
    }

    /// Inserts at `index`, shifting the children from there on up by one.
    ///
    /// # Panics
    ///
    /// When `index` is greater than the child count.
    pub fn insert_child(&mut self, parent: ElementId, index: usize, child: ElementId) {
        let count = self.arena.get(parent).child_count();
        if index > count {
            child_out_of_range(index, count);
        }
        reserve_slot(&mut self.arena.get_mut(parent).children).insert(index, child);
        self.relink_from(parent, index);
    }

    /// Replaces the child at `index`; the old child is detached.
    ///
    /// # Panics
    ///
    /// When `index` is not below the child count.
    pub fn set_child_at(&mut self, parent: ElementId, index: usize, child: ElementId) {
        let old = self.child_id(parent, index);
        if let Some(buffer) = self.arena.get_mut(parent).children.as_mut() {
            buffer[index] = child;
        }
        if old != child {
            self.detach(old);
        }
        self.link(child, parent, index);
    }

    /// Replaces all children of `parent` with the list, adopting its storage.
    pub fn set_children(&mut self, parent: ElementId, children: ChildList) {
        let previous = self.arena.get_mut(parent).children.take();
        for old in previous.into_iter().flatten() {
            self.detach(old);
        }
        self.arena.get_mut(parent).children = children.buffer.filter(|buffer| !buffer.is_empty());
        self.relink_from(parent, 0);
    }

    fn remove_child(&mut self, parent: ElementId, index: usize) -> ElementId {
        let element = self.arena.get_mut(parent);
        let Some(buffer) = element.children.as_mut() else {
            child_out_of_range(index, 0);
        };
        if index >= buffer.len() {
            child_out_of_range(index, buffer.len());
        }
        let removed = buffer.remove(index);
        if buffer.is_empty() {
            element.children = None;
        }
        self.detach(removed);
        self.relink_from(parent, index);
        removed
    }

    /// Simplifies the subtree of `id` and returns the element that should
    /// take its place in the parent. Linking the returned element into the
    /// parent is up to the caller.
    pub fn post_parse_cleanup(&mut self, id: ElementId, strip_whitespace: bool) -> ElementId {
        let count = self.arena.get(id).child_count();
        if count > 0 {
            for index in 0..count {
                let child = self.child_id(id, index);
                let replacement = self.post_parse_cleanup(child, strip_whitespace);
                if replacement != child {
                    trace!(from = %child, to = %replacement, "replaced child during cleanup");
                    if let Some(buffer) = self.arena.get_mut(id).children.as_mut() {
                        buffer[index] = replacement;
                    }
                }
                self.link(replacement, id, index);
            }

            // Siblings decide ignorability, so drop one at a time and reindex.
            let mut index = 0;
            while index < self.arena.get(id).child_count() {
                let child = self.child_id(id, index);
                if self.get(child).is_ignorable(strip_whitespace) {
                    trace!(parent = %id, child = %child, "dropped ignorable child");
                    self.remove_child(id, index);
                } else {
                    index += 1;
                }
            }

            if let Some(buffer) = self.arena.get_mut(id).children.as_mut() {
                let (len, capacity) = (buffer.len(), buffer.capacity());
                if len < capacity && len <= capacity * 3 / 4 {
                    buffer.shrink_to_fit();
                }
            }
        }
        self.simplify(id, strip_whitespace)
    }

    fn simplify(&mut self, id: ElementId, strip_whitespace: bool) -> ElementId {
        match &self.arena.get(id).kind {
            ElementKind::ImplicitParent if self.arena.get(id).child_count() == 1 => {
                self.child_id(id, 0)
            }
            ElementKind::IfBlock if self.arena.get(id).child_count() == 1 => {
                let branch = self.child_id(id, 0);
                let location = self.arena.get(id).location.clone();
                self.arena.get_mut(branch).location.copy_from(&location);
                branch
            }
            ElementKind::Text(block) if strip_whitespace && !block.trimmed => {
                self.trim_text(id);
                id
            }
            _ => id,
        }
    }

    /// Removes the whitespace of a text block that only pads lines holding
    /// directives.
    fn trim_text(&mut self, id: ElementId) {
        let node = self.get(id);
        let opening = opening_chars_to_strip(node);
        let trailing = trailing_chars_to_strip(node);

        let element = self.arena.get_mut(id);
        let ElementKind::Text(block) = &mut element.kind else {
            return;
        };
        block.trimmed = true;
        if opening == 0 && trailing == 0 {
            return;
        }
        trace!(element = %id, opening, trailing, "trimmed text block");
        let end = block.text.len() - trailing;
        block.text = block.text[opening..end].to_string();
        if opening > 0 {
            element.location.begin_line += 1;
            element.location.begin_column = 1;
        }
        if trailing > 0 {
            element.location.end_column = 0;
        }
    }

    /// Cleans up the tree from `root` and freezes it.
    pub fn finish(mut self, root: ElementId, strip_whitespace: bool) -> Template {
        let root = self.post_parse_cleanup(root, strip_whitespace);
        self.detach(root);
        debug!(
            template = self.source.name().unwrap_or("<nameless>"),
            elements = self.arena.len(),
            strip_whitespace,
            "finished template tree"
        );
        Template::new(self.arena, root, self.source)
    }
}

fn text_of<'a>(node: ElementRef<'a>) -> &'a str {
    match node.kind() {
        ElementKind::Text(block) => &block.text,
        _ => "",
    }
}

/// Bytes to drop from the start: the rest of the first line, when it is
/// blank and nothing before it on that line heeds whitespace.
fn opening_chars_to_strip(node: ElementRef<'_>) -> usize {
    let text = text_of(node);
    let Some(newline) = text.find('\n') else {
        return 0;
    };
    if !text[..newline].trim().is_empty() {
        return 0;
    }
    let line = node.location().begin_line;
    let mut previous = node.prev_terminal_node();
    while let Some(element) = previous {
        if element.location().end_line != line {
            break;
        }
        if element.heeds_opening_whitespace() {
            return 0;
        }
        previous = element.prev_terminal_node();
    }
    newline + 1
}

/// Bytes to drop from the end: blank text after the last line break, when
/// nothing after it on that line heeds whitespace.
fn trailing_chars_to_strip(node: ElementRef<'_>) -> usize {
    let text = text_of(node);
    let location = node.location();
    let start = match text.rfind('\n') {
        Some(newline) => newline + 1,
        None if location.begin_column == 1 => 0,
        None => return 0,
    };
    if !text[start..].trim().is_empty() {
        return 0;
    }
    let line = location.end_line;
    let mut next = node.next_terminal_node();
    while let Some(element) = next {
        if element.location().begin_line != line {
            break;
        }
        if element.heeds_trailing_whitespace() {
            return 0;
        }
        next = element.next_terminal_node();
    }
    text.len() - start
}
