//! Error types for Tessera.

use std::fmt;
use std::io;

use tessera_ast::{Location, Node, ParseError};
use thiserror::Error;

use crate::value::ValueError;

/// The element or expression an execution error was raised at.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSite {
    pub location: Location,
    /// Template text of the failing node, or its canonical form.
    pub snippet: String,
    /// Descriptions of the enclosing list, macro call, include and capture
    /// instructions, innermost first. Filled in once the walk has halted.
    pub trace: Vec<String>,
}

impl ErrorSite {
    pub fn of(node: &dyn Node) -> Self {
        Self {
            location: node.location().clone(),
            snippet: node.source(),
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for ErrorSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in `{}`", self.location, self.snippet)
    }
}

/// Error type for Tessera operations
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("undefined variable '{name}' at {site}")]
    UndefinedVariable { name: String, site: ErrorSite },

    #[error("type error: {message} at {site}")]
    Type { message: String, site: ErrorSite },

    #[error("undefined macro '{name}' at {site}")]
    UndefinedMacro { name: String, site: ErrorSite },

    #[error("cannot evaluate fragment: {source} at {site}")]
    Eval { source: ParseError, site: ErrorSite },

    #[error("nesting limit of {limit} exceeded at {site}")]
    TooDeep { limit: usize, site: ErrorSite },

    #[error("include error: {message}{}", at_site(.site))]
    Include {
        message: String,
        site: Option<ErrorSite>,
    },

    #[error("invalid data: {0}")]
    Data(#[from] ValueError),

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn at_site(site: &Option<ErrorSite>) -> String {
    match site {
        Some(site) => format!(" at {site}"),
        None => String::new(),
    }
}

impl TemplateError {
    pub(crate) fn include(message: impl Into<String>) -> Self {
        TemplateError::Include {
            message: message.into(),
            site: None,
        }
    }

    pub fn site(&self) -> Option<&ErrorSite> {
        match self {
            TemplateError::UndefinedVariable { site, .. }
            | TemplateError::Type { site, .. }
            | TemplateError::UndefinedMacro { site, .. }
            | TemplateError::Eval { site, .. }
            | TemplateError::TooDeep { site, .. } => Some(site),
            TemplateError::Include { site, .. } => site.as_ref(),
            _ => None,
        }
    }

    /// The instruction trace captured when the walk halted, innermost first.
    pub fn trace(&self) -> &[String] {
        self.site().map_or(&[][..], |site| site.trace.as_slice())
    }

    /// Places a site-less include error at `node`.
    pub(crate) fn located_at(mut self, node: &dyn Node) -> Self {
        if let TemplateError::Include { site, .. } = &mut self {
            if site.is_none() {
                *site = Some(ErrorSite::of(node));
            }
        }
        self
    }

    pub(crate) fn attach_trace(&mut self, trace: Vec<String>) {
        let site = match self {
            TemplateError::UndefinedVariable { site, .. }
            | TemplateError::Type { site, .. }
            | TemplateError::UndefinedMacro { site, .. }
            | TemplateError::Eval { site, .. }
            | TemplateError::TooDeep { site, .. } => Some(site),
            TemplateError::Include { site, .. } => site.as_mut(),
            _ => None,
        };
        if let Some(site) = site {
            if site.trace.is_empty() {
                site.trace = trace;
            }
        }
    }
}

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ast::parse;

    #[test]
    fn site_uses_template_text() {
        let template = parse("ab{[ user.name ]}").unwrap();
        let interpolation = template.root().child(1);
        let site = ErrorSite::of(&interpolation);
        assert_eq!(site.snippet, "{[ user.name ]}");
        assert_eq!(site.to_string(), "<nameless>:1:3 in `{[ user.name ]}`");
    }

    #[test]
    fn include_error_without_site() {
        let err = TemplateError::include("no include root configured");
        assert_eq!(err.to_string(), "include error: no include root configured");
        assert!(err.trace().is_empty());
    }

    #[test]
    fn trace_is_attached_once() {
        let template = parse("{[ x ]}").unwrap();
        let mut err = TemplateError::UndefinedVariable {
            name: "x".to_string(),
            site: ErrorSite::of(&template.root()),
        };
        err.attach_trace(vec!["#list".to_string()]);
        err.attach_trace(vec!["@m".to_string()]);
        assert_eq!(err.trace(), ["#list".to_string()]);
    }

    #[test]
    fn io_errors_are_kept() {
        let err: TemplateError = io::Error::new(io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, TemplateError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
