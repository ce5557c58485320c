//! Source locations of parsed nodes.

use std::fmt;
use std::sync::Arc;

/// Line 1 of the line space used for text parsed at runtime (`?eval`).
///
/// Nodes parsed from evaluated strings are not found verbatim in any template
/// file, so their lines are counted from this constant instead of from 1.
pub const RUNTIME_EVAL_LINE_DISPLACEMENT: i32 = -1_000_000_000;

/// A line/column pair (both 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: i32,
    pub column: i32,
}

impl Position {
    pub fn new(line: i32, column: i32) -> Self {
        Self { line, column }
    }
}

/// Anything with a begin and an end position: tokens, locations, nodes.
pub trait Span {
    fn begin(&self) -> Position;
    fn end(&self) -> Position;
}

/// The text of a template, kept for source-slice extraction.
#[derive(Debug, PartialEq, Eq)]
pub struct TemplateSource {
    name: Option<String>,
    text: String,
    /// Lines including their terminators.
    lines: Vec<String>,
}

impl TemplateSource {
    pub fn new(name: Option<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = text.split_inclusive('\n').map(str::to_string).collect();
        Self { name, text, lines }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the text between two positions, both ends inclusive.
    ///
    /// Returns `None` for positions outside the text, which includes every
    /// position in the runtime-eval line space.
    pub fn slice(&self, begin: Position, end: Position) -> Option<String> {
        if begin.line < 1 || begin.column < 1 || end.line < begin.line {
            return None;
        }
        let first = (begin.line - 1) as usize;
        let last = (end.line - 1) as usize;
        let lines = self.lines.get(first..=last)?;

        let mut out = String::new();
        for (offset, line) in lines.iter().enumerate() {
            let chars: Vec<char> = line.chars().collect();
            let start = if offset == 0 {
                (begin.column - 1) as usize
            } else {
                0
            };
            let stop = if offset == lines.len() - 1 {
                usize::try_from(end.column).ok()?
            } else {
                chars.len()
            };
            if start > stop || stop > chars.len() {
                return None;
            }
            out.extend(&chars[start..stop]);
        }
        Some(out)
    }
}

/// Where a node is in its template: a begin/end span plus the owning source.
///
/// Nodes synthesized from runtime-evaluated text have no template and lines
/// in the [`RUNTIME_EVAL_LINE_DISPLACEMENT`] space.
#[derive(Debug, Clone, Default)]
pub struct Location {
    template: Option<Arc<TemplateSource>>,
    pub begin_line: i32,
    pub begin_column: i32,
    pub end_line: i32,
    pub end_column: i32,
}

impl Location {
    pub fn new(
        template: Option<Arc<TemplateSource>>,
        begin_line: i32,
        begin_column: i32,
        end_line: i32,
        end_column: i32,
    ) -> Self {
        Self {
            template,
            begin_line,
            begin_column,
            end_line,
            end_column,
        }
    }

    /// From the begin of one marker to the end of another.
    pub fn spanning(
        template: Option<&Arc<TemplateSource>>,
        begin: &impl Span,
        end: &impl Span,
    ) -> Self {
        let (begin, end) = (begin.begin(), end.end());
        Self::new(template.cloned(), begin.line, begin.column, end.line, end.column)
    }

    /// Span of a directive whose body may be empty: ends at the last child
    /// when there is one, at the tag's own end marker otherwise.
    pub fn enclosing(
        template: Option<&Arc<TemplateSource>>,
        tag_begin: &impl Span,
        tag_end: &impl Span,
        last_child: Option<&Location>,
    ) -> Self {
        match last_child {
            // {[#if c]}children{[#else]}
            Some(last) => Self::spanning(template, tag_begin, last),
            // {[#if c]}{[#else]}
            None => Self::spanning(template, tag_begin, tag_end),
        }
    }

    pub fn set(
        &mut self,
        template: Option<Arc<TemplateSource>>,
        begin_line: i32,
        begin_column: i32,
        end_line: i32,
        end_column: i32,
    ) {
        *self = Self::new(template, begin_line, begin_column, end_line, end_column);
    }

    pub fn copy_from(&mut self, other: &Location) -> &mut Self {
        self.clone_from(other);
        self
    }

    pub fn template(&self) -> Option<&Arc<TemplateSource>> {
        self.template.as_ref()
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template.as_deref().and_then(TemplateSource::name)
    }

    pub fn is_runtime_evaluated(&self) -> bool {
        self.begin_line < 0
    }

    /// Whether `(line, column)` falls inside this span, ends included.
    pub fn contains_position(&self, line: i32, column: i32) -> bool {
        if line < self.begin_line || line > self.end_line {
            return false;
        }
        if line == self.begin_line && column < self.begin_column {
            return false;
        }
        if line == self.end_line && column > self.end_column {
            return false;
        }
        true
    }

    /// The exact template text this location covers.
    pub fn source_slice(&self) -> Option<String> {
        self.template.as_ref()?.slice(self.begin(), self.end())
    }

    pub fn start_description(&self) -> String {
        format_location(self.template_name(), self.begin_line, self.begin_column)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        let same_template = match (&self.template, &other.template) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_template && self.begin() == other.begin() && self.end() == other.end()
    }
}

impl Eq for Location {}

impl Span for Location {
    fn begin(&self) -> Position {
        Position::new(self.begin_line, self.begin_column)
    }

    fn end(&self) -> Position {
        Position::new(self.end_line, self.end_column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.start_description())
    }
}

/// Formats a position as `name:line:column`.
///
/// Positions in the runtime-eval line space are rebased to 1 and reported
/// against the evaluated string, since there is no file to point at.
pub fn format_location(template_name: Option<&str>, line: i32, column: i32) -> String {
    if line < 0 {
        let line = line - RUNTIME_EVAL_LINE_DISPLACEMENT + 1;
        return format!("evaluated string:{line}:{column}");
    }
    format!("{}:{line}:{column}", template_name.unwrap_or("<nameless>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_two() -> Location {
        Location::new(None, 2, 4, 2, 10)
    }

    #[test]
    fn contains_position_on_single_line() {
        let location = line_two();
        assert!(location.contains_position(2, 4));
        assert!(location.contains_position(2, 10));
        assert!(location.contains_position(2, 7));
        assert!(!location.contains_position(2, 3));
        assert!(!location.contains_position(2, 11));
        assert!(!location.contains_position(1, 9));
        assert!(!location.contains_position(3, 1));
    }

    #[test]
    fn contains_position_across_lines() {
        let location = Location::new(None, 1, 5, 3, 2);
        assert!(location.contains_position(2, 1));
        assert!(location.contains_position(2, 500));
        assert!(!location.contains_position(1, 4));
        assert!(!location.contains_position(3, 3));
    }

    #[test]
    fn source_slice_single_and_multi_line() {
        let source = Arc::new(TemplateSource::new(
            Some("page".to_string()),
            "Hello {[ name ]}!\nsecond line\nthird",
        ));
        let single = Location::new(Some(source.clone()), 1, 7, 1, 16);
        assert_eq!(single.source_slice().as_deref(), Some("{[ name ]}"));

        let multi = Location::new(Some(source), 1, 17, 3, 3);
        assert_eq!(multi.source_slice().as_deref(), Some("!\nsecond line\nthi"));
    }

    #[test]
    fn source_slice_without_template_or_out_of_range() {
        assert_eq!(line_two().source_slice(), None);

        let source = Arc::new(TemplateSource::new(None, "abc"));
        let past_end = Location::new(Some(source.clone()), 1, 1, 1, 9);
        assert_eq!(past_end.source_slice(), None);
        let missing_line = Location::new(Some(source), 4, 1, 4, 1);
        assert_eq!(missing_line.source_slice(), None);
    }

    #[test]
    fn enclosing_falls_back_to_tag_end() {
        let tag_begin = Location::new(None, 1, 1, 1, 1);
        let tag_end = Location::new(None, 1, 9, 1, 12);
        let child = Location::new(None, 2, 1, 4, 7);

        let with_child = Location::enclosing(None, &tag_begin, &tag_end, Some(&child));
        assert_eq!(with_child.end(), Position::new(4, 7));

        let empty = Location::enclosing(None, &tag_begin, &tag_end, None);
        assert_eq!(empty.end(), Position::new(1, 12));
        assert_eq!(empty.begin(), Position::new(1, 1));
    }

    #[test]
    fn copy_from_replaces_everything() {
        let source = Arc::new(TemplateSource::new(Some("t".to_string()), "x"));
        let from = Location::new(Some(source), 3, 1, 5, 2);
        let mut to = line_two();
        to.copy_from(&from);
        assert_eq!(to, from);
        assert_eq!(to.template_name(), Some("t"));
    }

    #[test]
    fn formats_file_and_evaluated_positions() {
        let source = Arc::new(TemplateSource::new(Some("index.tsr".to_string()), ""));
        let location = Location::new(Some(source), 3, 8, 3, 9);
        assert_eq!(location.to_string(), "index.tsr:3:8");
        assert_eq!(line_two().to_string(), "<nameless>:2:4");

        let evaluated = Location::new(
            None,
            RUNTIME_EVAL_LINE_DISPLACEMENT,
            5,
            RUNTIME_EVAL_LINE_DISPLACEMENT,
            6,
        );
        assert!(evaluated.is_runtime_evaluated());
        assert_eq!(evaluated.to_string(), "evaluated string:1:5");
    }

    #[test]
    fn set_replaces_template_and_span() {
        let source = Arc::new(TemplateSource::new(Some("t".to_string()), "one\ntwo"));
        let mut location = line_two();
        location.set(Some(source), 2, 1, 2, 3);
        assert_eq!(location.source_slice().as_deref(), Some("two"));
        assert_eq!(location.to_string(), "t:2:1");

        location.set(
            None,
            RUNTIME_EVAL_LINE_DISPLACEMENT,
            1,
            RUNTIME_EVAL_LINE_DISPLACEMENT,
            4,
        );
        assert!(location.is_runtime_evaluated());
        assert_eq!(location.template_name(), None);
        assert_eq!(location.source_slice(), None);
        assert_eq!(location.to_string(), "evaluated string:1:1");
    }
}
