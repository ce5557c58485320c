//! Integration tests for the include directive over temporary template trees.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tessera::{render_with_includes, Settings, TemplateError, Tessera};

fn write_template(root: &Path, name: &str, source: &str) {
    let path = root.join(format!("{name}.tsr"));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, source).unwrap();
}

fn template_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_template(dir.path(), "simple", "Hello from simple partial");
    write_template(dir.path(), "greeting", "Hello, {[ name ]}!");
    write_template(
        dir.path(),
        "components/card",
        "<div class=\"card\">\n  <h2>{[ title ]}</h2>\n  <p>{[ body ]}</p>\n</div>\n",
    );
    write_template(
        dir.path(),
        "macros",
        "{[#macro badge label]}[{[ label ]}]{[/macro]}",
    );
    write_template(dir.path(), "loop_a", "a{[#include \"/loop_b\"]}");
    write_template(dir.path(), "loop_b", "b{[#include \"/loop_a\"]}");
    write_template(dir.path(), "self", "{[#include \"/self\"]}");
    write_template(dir.path(), "broken", "{[#if x]}never closed");
    write_template(dir.path(), "faulty", "start {[ missing ]}");
    dir
}

// ============================================================================
// Basic include
// ============================================================================

#[test]
fn include_simple_partial() {
    let dir = template_root();
    let result = render_with_includes("{[#include \"/simple\"]}", json!({}), dir.path()).unwrap();
    assert_eq!(result, "Hello from simple partial");
}

#[test]
fn include_sees_caller_variables() {
    let dir = template_root();
    let result = render_with_includes(
        "{[#list names as name]}{[#include \"/greeting\"]} {[/list]}",
        json!({"names": ["Alice", "Bob"]}),
        dir.path(),
    )
    .unwrap();
    assert_eq!(result, "Hello, Alice! Hello, Bob! ");
}

#[test]
fn include_path_from_expression() {
    let dir = template_root();
    let result =
        render_with_includes("{[#include \"/\" + page]}", json!({"page": "simple"}), dir.path())
            .unwrap();
    assert_eq!(result, "Hello from simple partial");
}

#[test]
fn include_from_nested_directory() {
    let dir = template_root();
    let result = render_with_includes(
        "{[#include \"/components/card\"]}",
        json!({"title": "Title", "body": "Body text"}),
        dir.path(),
    )
    .unwrap();
    assert_eq!(
        result,
        "<div class=\"card\">\n  <h2>Title</h2>\n  <p>Body text</p>\n</div>\n"
    );
}

#[test]
fn included_macros_become_callable() {
    let dir = template_root();
    let result = render_with_includes(
        "{[#include \"/macros\"]}{[@badge \"new\"]}",
        json!({}),
        dir.path(),
    )
    .unwrap();
    assert_eq!(result, "[new]");
}

#[test]
fn include_uses_configured_extension() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("part.html"), "html part").unwrap();
    let settings = Settings::from_json_str(r#"{"template_extension": "html"}"#)
        .unwrap()
        .with_include_root(dir.path());
    let tmpl = Tessera::parse_with(Some("page"), "{[#include \"/part\"]}", settings).unwrap();
    assert_eq!(tmpl.render(json!({})).unwrap(), "html part");
}

// ============================================================================
// Errors
// ============================================================================

fn include_message(err: TemplateError) -> String {
    match err {
        TemplateError::Include { message, .. } => message,
        other => panic!("expected include error, got {other:?}"),
    }
}

#[test]
fn include_missing_file() {
    let dir = template_root();
    let err = render_with_includes("{[#include \"/absent\"]}", json!({}), dir.path()).unwrap_err();
    assert!(include_message(err).starts_with("include file not found: /absent"));
}

#[test]
fn include_rejects_traversal() {
    let dir = template_root();
    for name in ["/../etc/passwd", "relative", "/a//b", "/a\\b"] {
        let source = format!("{{[#include \"{}\"]}}", name.replace('\\', "\\\\"));
        let err = render_with_includes(&source, json!({}), dir.path()).unwrap_err();
        assert!(matches!(err, TemplateError::Include { .. }), "{name}: {err:?}");
    }
}

#[test]
fn include_detects_direct_cycle() {
    let dir = template_root();
    let err = render_with_includes("{[#include \"/self\"]}", json!({}), dir.path()).unwrap_err();
    assert_eq!(
        include_message(err),
        "circular include detected: /self -> /self"
    );
}

#[test]
fn include_detects_indirect_cycle() {
    let dir = template_root();
    let err = render_with_includes("{[#include \"/loop_a\"]}", json!({}), dir.path()).unwrap_err();
    let trace = err.trace().to_vec();
    assert_eq!(
        include_message(err),
        "circular include detected: /loop_a -> /loop_b -> /loop_a"
    );
    assert_eq!(trace.len(), 3);
}

#[test]
fn include_reports_parse_failures() {
    let dir = template_root();
    let err = render_with_includes("{[#include \"/broken\"]}", json!({}), dir.path()).unwrap_err();
    assert!(include_message(err).starts_with("failed to parse include '/broken'"));
}

#[test]
fn errors_inside_includes_point_at_the_included_template() {
    let dir = template_root();
    let err = render_with_includes("{[#include \"/faulty\"]}", json!({}), dir.path()).unwrap_err();
    let TemplateError::UndefinedVariable { name, site } = err else {
        panic!("expected undefined variable");
    };
    assert_eq!(name, "missing");
    assert_eq!(site.location.start_description(), "/faulty:1:10");
    assert_eq!(site.trace, ["{[#include \"/faulty\"]} [at <nameless>:1:1]".to_string()]);
}

#[test]
fn include_requires_string_path() {
    let dir = template_root();
    let err = render_with_includes("{[#include page]}", json!({"page": 1}), dir.path()).unwrap_err();
    assert!(matches!(err, TemplateError::Type { .. }));
}

#[test]
fn invalid_include_root_fails_at_render() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nowhere");
    let err = render_with_includes("text", json!({}), &missing).unwrap_err();
    assert!(include_message(err).starts_with("invalid include root"));
}
