//! What each kind of element does when the walk reaches it.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_ast::{ConditionalBlock, ElementId, ElementKind, ElementRef, ListBlock, MacroCall, Node};
use tracing::trace;

use crate::environment::Environment;
use crate::error::{ErrorSite, Result, TemplateError};
use crate::eval::type_error;
use crate::value::Value;

/// Run `element` and return the children the walk should run next, if any.
///
/// Elements whose body runs zero or one time in the current environment
/// hand their children back. Elements that repeat their body or change the
/// environment around it run the body themselves through
/// [`Environment::visit_children`] and return `None`.
pub(crate) fn accept<'t>(
    element: ElementRef<'t>,
    env: &mut Environment<'_>,
) -> Result<Option<&'t [ElementId]>> {
    match element.kind() {
        ElementKind::ImplicitParent => Ok(element.child_buffer()),
        ElementKind::Text(block) => {
            env.write(&block.text)?;
            Ok(None)
        }
        ElementKind::Interpolation(expression) => {
            let value = env.evaluate(expression)?;
            if value.is_null() {
                return Err(type_error(
                    &element,
                    format!("'{}' evaluated to null", expression.canonical_form()),
                ));
            }
            let text = value
                .stringify()
                .map_err(|e| type_error(&element, e.to_string()))?;
            env.write(&text)?;
            Ok(None)
        }
        ElementKind::IfBlock => {
            for branch in element.children() {
                if let ElementKind::Conditional(block) = branch.kind() {
                    if is_taken(block, env)? {
                        trace!(branch = block.branch.keyword(), "taking branch");
                        return Ok(branch.child_buffer());
                    }
                }
            }
            Ok(None)
        }
        ElementKind::Conditional(block) => {
            if is_taken(block, env)? {
                return Ok(element.child_buffer());
            }
            Ok(None)
        }
        ElementKind::List(list) => {
            run_list(element, list, env)?;
            Ok(None)
        }
        ElementKind::Assignment(assignment) => {
            let value = env.evaluate(&assignment.value)?;
            env.context_mut().set_global(assignment.target.clone(), value);
            Ok(None)
        }
        ElementKind::CapturingAssignment(capture) => {
            env.begin_capture();
            let result = env.visit_children(element);
            let captured = env.end_capture();
            result?;
            env.context_mut()
                .set_global(capture.target.clone(), Value::String(captured));
            Ok(None)
        }
        // Registered before the walk starts; the definition prints nothing.
        ElementKind::Macro(_) => Ok(None),
        ElementKind::MacroCall(call) => {
            call_macro(element, call, env)?;
            Ok(None)
        }
        ElementKind::Include(include) => {
            let name = match env.evaluate(&include.path)? {
                Value::String(name) => name,
                other => {
                    return Err(type_error(
                        &include.path,
                        format!("include path must be a string, got {}", other.type_name()),
                    ))
                }
            };
            env.enter(&element)?;
            let result = env.include(&name).map_err(|e| e.located_at(&element));
            env.leave();
            result?;
            Ok(None)
        }
        ElementKind::Comment(_) => Ok(None),
    }
}

/// `#else` has no condition and is always taken.
fn is_taken(block: &ConditionalBlock, env: &Environment<'_>) -> Result<bool> {
    match &block.condition {
        Some(condition) => Ok(env.evaluate(condition)?.is_truthy()),
        None => Ok(true),
    }
}

/// Binds the loop variable plus `<var>_index` and `<var>_has_next` for each
/// item.
fn run_list(element: ElementRef<'_>, list: &ListBlock, env: &mut Environment<'_>) -> Result<()> {
    let items = match env.evaluate(&list.source)? {
        Value::Array(items) => items,
        other => {
            return Err(type_error(
                &list.source,
                format!("#list expects a sequence, got {}", other.type_name()),
            ))
        }
    };

    let count = items.len();
    for (index, item) in items.into_iter().enumerate() {
        let mut bindings = HashMap::with_capacity(3);
        bindings.insert(list.loop_variable.clone(), item);
        bindings.insert(
            format!("{}_index", list.loop_variable),
            Value::Integer(index as i64),
        );
        bindings.insert(
            format!("{}_has_next", list.loop_variable),
            Value::Bool(index + 1 < count),
        );

        env.context_mut().push_scope(bindings);
        let result = env.visit_children(element);
        env.context_mut().pop_scope();
        result?;
    }
    Ok(())
}

/// Arguments bind to parameters by position; parameters without an argument
/// are null. The body sees its parameters and the globals, not the caller's
/// locals.
fn call_macro(element: ElementRef<'_>, call: &MacroCall, env: &mut Environment<'_>) -> Result<()> {
    let Some(macro_ref) = env.find_macro(&call.name) else {
        return Err(TemplateError::UndefinedMacro {
            name: call.name.clone(),
            site: ErrorSite::of(&element),
        });
    };
    let template = Arc::clone(&macro_ref.template);
    let definition = template.element(macro_ref.id);
    let ElementKind::Macro(signature) = definition.kind() else {
        return Err(type_error(&element, format!("'{}' is not a macro", call.name)));
    };

    if call.arguments.len() > signature.parameters.len() {
        return Err(type_error(
            &element,
            format!(
                "macro '{}' takes {} argument(s), got {}",
                call.name,
                signature.parameters.len(),
                call.arguments.len()
            ),
        ));
    }

    let mut bindings = HashMap::with_capacity(signature.parameters.len());
    for (index, parameter) in signature.parameters.iter().enumerate() {
        let value = match call.arguments.get(index) {
            Some(argument) => env.evaluate(argument)?,
            None => Value::Null,
        };
        bindings.insert(parameter.clone(), value);
    }

    env.enter(&element)?;
    env.context_mut().push_isolated_scope(bindings);
    let result = env.visit_children(definition);
    env.context_mut().pop_scope();
    env.leave();
    result
}
