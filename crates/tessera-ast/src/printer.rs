//! Indented text dump of a template tree, built only from descriptors and
//! node parameters.

use std::fmt::Write;

use crate::element::ElementKind;
use crate::node::{Node, ParameterValue};
use crate::tree::{ElementRef, Template};

pub fn dump_tree(template: &Template) -> String {
    let mut out = String::new();
    dump_element(&mut out, template.root(), 0);
    out
}

fn dump_element(out: &mut String, element: ElementRef<'_>, depth: usize) {
    let indent = "  ".repeat(depth);
    match element.kind() {
        ElementKind::Text(block) => {
            let _ = writeln!(out, "{indent}{} {:?}", element.descriptor(), block.text);
        }
        _ => {
            let _ = writeln!(out, "{indent}{}", element.descriptor());
        }
    }
    dump_parameters(out, &element, &indent);
    for child in element.children() {
        dump_element(out, child, depth + 1);
    }
}

fn dump_parameters(out: &mut String, node: &dyn Node, indent: &str) {
    for index in 0..node.parameter_count() {
        let role = node.parameter_role(index);
        match node.parameter_value(index) {
            ParameterValue::Absent => {}
            value => {
                let _ = writeln!(out, "{indent}  - {role}: {value}");
            }
        }
    }
}
