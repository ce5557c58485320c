//! Tessera - a small template engine that runs a compiled element tree
//!
//! Templates are compiled once into an immutable element tree and can then be
//! rendered any number of times, from any number of threads:
//! - `{[ expr ]}` interpolations and `{[% ... ]}` comments
//! - `#if`/`#elseif`/`#else`, `#list`, `#assign`, `#macro` with `@` calls
//! - `#include` of templates under a configured root
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//!
//! let result = tessera::render(
//!     "Hello, {[ name ]}!",
//!     json!({"name": "World"}),
//! ).unwrap();
//!
//! assert_eq!(result, "Hello, World!");
//! ```

pub mod context;
pub mod environment;
pub mod error;
pub mod eval;
mod execute;
pub mod settings;
pub mod template_loader;
pub mod value;

pub use environment::{Environment, MAX_NESTING_DEPTH};
pub use error::{ErrorSite, Result, TemplateError};
pub use settings::Settings;
pub use template_loader::TemplateLoader;
pub use tessera_ast::{Location, Node, ParseError, Template};
pub use value::{Value, ValueError};

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Main template struct for parsing once and rendering multiple times
#[derive(Debug, Clone)]
pub struct Tessera {
    template: Arc<Template>,
    settings: Settings,
}

impl Tessera {
    /// Parse a template source string with default settings
    ///
    /// # Example
    ///
    /// ```rust
    /// use serde_json::json;
    ///
    /// let tmpl = tessera::Tessera::parse("Hello, {[ name ]}!").unwrap();
    /// let result = tmpl.render(json!({"name": "Alice"})).unwrap();
    /// assert_eq!(result, "Hello, Alice!");
    /// ```
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with(None, source, Settings::default())
    }

    /// Parse a named template. The name shows up in error locations.
    pub fn parse_with(name: Option<&str>, source: &str, settings: Settings) -> Result<Self> {
        let template = tessera_ast::parse_template(name, source, settings.strip_whitespace)?;
        debug!(
            template = name.unwrap_or("<nameless>"),
            strip_whitespace = settings.strip_whitespace,
            "parsed template"
        );
        Ok(Self {
            template: Arc::new(template),
            settings,
        })
    }

    /// Render the template with the given JSON data
    pub fn render(&self, data: serde_json::Value) -> Result<String> {
        let mut buffer = Vec::new();
        self.render_to(data, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| TemplateError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Render into `out`. Output written before an error stays written.
    pub fn render_to(&self, data: serde_json::Value, out: &mut dyn Write) -> Result<()> {
        let value = Value::from_json(data)?;
        let loader = self
            .settings
            .include_root
            .as_ref()
            .map(|root| TemplateLoader::new(root, &self.settings))
            .transpose()?;
        let mut env = Environment::new(out, value, loader)?;
        env.process(&self.template)
    }

    /// Get a reference to the parsed template
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Convenience function: parse and render in one call
pub fn render(source: &str, data: serde_json::Value) -> Result<String> {
    Tessera::parse(source)?.render(data)
}

/// Convenience function: parse and render with include support
///
/// # Example
///
/// ```rust,ignore
/// use serde_json::json;
///
/// let result = tessera::render_with_includes(
///     "{[#include \"/components/header\"]}",
///     json!({}),
///     "templates",
/// ).unwrap();
/// ```
pub fn render_with_includes(
    source: &str,
    data: serde_json::Value,
    include_root: impl AsRef<Path>,
) -> Result<String> {
    let settings = Settings::default().with_include_root(include_root.as_ref());
    Tessera::parse_with(None, source, settings)?.render(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_template_reuse() {
        let tmpl = Tessera::parse("Hello, {[ name ]}!").unwrap();

        let result1 = tmpl.render(json!({"name": "Alice"})).unwrap();
        let result2 = tmpl.render(json!({"name": "Bob"})).unwrap();

        assert_eq!(result1, "Hello, Alice!");
        assert_eq!(result2, "Hello, Bob!");
    }

    #[test]
    fn test_first_fault_halts_the_walk() {
        let tmpl = Tessera::parse("a{[ missing ]}b").unwrap();
        let mut out = Vec::new();
        let err = tmpl.render_to(json!({}), &mut out).unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { ref name, .. } if name == "missing"));
        assert_eq!(out, b"a");
    }

    #[test]
    fn test_concurrent_renders_share_one_template() {
        let tmpl = Arc::new(Tessera::parse("{[#list xs as x]}{[ x + n ]}{[/list]}").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let tmpl = Arc::clone(&tmpl);
                thread::spawn(move || tmpl.render(json!({"xs": [1, 2], "n": n})).unwrap())
            })
            .collect();
        let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outputs, vec!["12", "23", "34", "45"]);
    }

    #[test]
    fn test_list_strips_directive_lines() {
        let source = "<ul>\n{[#list xs as x]}\n  <li>{[ x ]}</li>\n{[/list]}\n</ul>\n";
        let result = render(source, json!({"xs": ["a", "b"]})).unwrap();
        assert_eq!(result, "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n");
    }

    #[test]
    fn test_no_strip_keeps_every_character() {
        let settings = Settings {
            strip_whitespace: false,
            ..Settings::default()
        };
        let source = "{[#list xs as x]}\n{[ x ]}\n{[/list]}";
        let tmpl = Tessera::parse_with(None, source, settings).unwrap();
        assert_eq!(tmpl.render(json!({"xs": [1]})).unwrap(), "\n1\n");
    }

    #[test]
    fn test_loop_helpers() {
        let source = "{[#list xs as x]}{[ x_index ]}:{[ x ]}{[#if x_has_next]}, {[/if]}{[/list]}";
        let result = render(source, json!({"xs": ["a", "b", "c"]})).unwrap();
        assert_eq!(result, "0:a, 1:b, 2:c");
    }

    #[test]
    fn test_if_elseif_else() {
        let source = "{[#if n == 1]}one{[#elseif n == 2]}two{[#else]}many{[/if]}";
        assert_eq!(render(source, json!({"n": 1})).unwrap(), "one");
        assert_eq!(render(source, json!({"n": 2})).unwrap(), "two");
        assert_eq!(render(source, json!({"n": 7})).unwrap(), "many");
    }

    #[test]
    fn test_assign_and_capture() {
        let source = "{[#assign greeting]}Hi {[ name ]}{[/assign]}{[#assign n = 1 + 1]}{[ greeting ]} x{[ n ]}";
        let result = render(source, json!({"name": "Ann"})).unwrap();
        assert_eq!(result, "Hi Ann x2");
    }

    #[test]
    fn test_macro_calls() {
        let source = "{[@tag \"b\", word]}{[#macro tag name body]}<{[ name ]}>{[ body ]}</{[ name ]}>{[/macro]}";
        let result = render(source, json!({"word": "bold"})).unwrap();
        assert_eq!(result, "<b>bold</b>");
    }

    #[test]
    fn test_macro_body_does_not_see_caller_locals() {
        let source = "{[#macro show]}{[ x ]}{[/macro]}{[#list xs as x]}{[@show]}{[/list]}";
        let err = render(source, json!({"xs": [1]})).unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_macro_argument_errors() {
        let source = "{[#macro one a]}{[/macro]}{[@one 1, 2]}";
        assert!(matches!(render(source, json!({})).unwrap_err(), TemplateError::Type { .. }));

        let err = render("{[@nothing]}", json!({})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "undefined macro 'nothing' at <nameless>:1:1 in `{[@nothing]}`"
        );
    }

    #[test]
    fn test_missing_macro_arguments_are_null() {
        let source = "{[#macro m a b]}{[#if b == null]}no b{[/if]}{[/macro]}{[@m 1]}";
        assert_eq!(render(source, json!({})).unwrap(), "no b");
    }

    #[test]
    fn test_eval_in_templates() {
        let source = "{[ expr?eval ]}";
        assert_eq!(render(source, json!({"expr": "a + 1", "a": 1})).unwrap(), "2");
    }

    #[test]
    fn test_eval_syntax_errors_point_at_the_template() {
        let err = render("ab\n{[ code?eval ]}", json!({"code": "1 +"})).unwrap_err();
        let site = err.site().unwrap();
        assert_eq!(site.location.start_description(), "<nameless>:2:4");
        assert_eq!(site.snippet, "code?eval");
        assert!(
            err.to_string().contains("at evaluated string:1:4 at <nameless>:2:4"),
            "{err}"
        );
    }

    #[test]
    fn test_recursive_macro_hits_the_nesting_limit() {
        let err = render("{[#macro m]}{[@m]}{[/macro]}{[@m]}", json!({})).unwrap_err();
        assert!(err.trace().len() > MAX_NESTING_DEPTH);
        let TemplateError::TooDeep { limit, site } = err else {
            panic!("expected a nesting error");
        };
        assert_eq!(limit, MAX_NESTING_DEPTH);
        assert_eq!(site.snippet, "{[@m]}");
        assert_eq!(site.location.start_description(), "<nameless>:1:13");
    }

    #[test]
    fn test_self_evaluating_string_hits_the_nesting_limit() {
        let err = render("{[ code?eval ]}", json!({"code": "code?eval"})).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::TooDeep { limit: MAX_NESTING_DEPTH, .. }
        ));
    }

    #[test]
    fn test_error_trace_names_enclosing_instructions() {
        let source = "{[#macro row v]}{[ v.name ]}{[/macro]}{[#list xs as x]}{[@row x]}{[/list]}";
        let err = render(source, json!({"xs": [{"name": "a"}, 3]})).unwrap_err();
        assert!(matches!(err, TemplateError::Type { .. }));
        assert_eq!(
            err.trace(),
            [
                "{[@row x]} [at <nameless>:1:56]".to_string(),
                "{[#list xs as x]} [at <nameless>:1:39]".to_string(),
            ]
        );
    }

    #[test]
    fn test_include_without_root() {
        let err = render("{[#include \"/part\"]}", json!({})).unwrap_err();
        let TemplateError::Include { message, site } = err else {
            panic!("expected include error");
        };
        assert!(message.contains("no include root configured"));
        assert_eq!(site.unwrap().snippet, "{[#include \"/part\"]}");
    }

    #[test]
    fn test_data_errors() {
        assert!(matches!(
            render("x", json!([1, 2])).unwrap_err(),
            TemplateError::Data(ValueError::RootNotHash("sequence"))
        ));
        assert!(matches!(
            render("x", json!({"f": 1.5})).unwrap_err(),
            TemplateError::Data(ValueError::FloatNotSupported(_))
        ));
    }

    #[test]
    fn test_parse_errors_surface_unchanged() {
        let err = render("{[#if x]}", json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Parse(ParseError::Unterminated { .. })));
    }
}
