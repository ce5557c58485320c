//! Expression evaluation against a [`Context`].

use tessera_ast::{parse_expression_fragment, ComparisonOp, Expression, ExpressionKind, Node};
use tracing::trace;

use crate::context::Context;
use crate::environment::MAX_NESTING_DEPTH;
use crate::error::{ErrorSite, Result, TemplateError};
use crate::value::Value;

pub fn evaluate(expression: &Expression, context: &Context) -> Result<Value> {
    evaluate_at(expression, context, 0)
}

/// Evaluates `expression` with `depth` nested levels already running. Each
/// `?eval` fragment adds one, up to [`MAX_NESTING_DEPTH`].
pub(crate) fn evaluate_at(expression: &Expression, context: &Context, depth: usize) -> Result<Value> {
    match &expression.kind {
        ExpressionKind::StringLiteral(s) => Ok(Value::String(s.clone())),
        ExpressionKind::IntegerLiteral(n) => {
            Value::integer(*n).map_err(|e| type_error(expression, e.to_string()))
        }
        ExpressionKind::BooleanLiteral(b) => Ok(Value::Bool(*b)),
        ExpressionKind::NullLiteral => Ok(Value::Null),
        ExpressionKind::Variable(name) => {
            context
                .lookup(name)
                .cloned()
                .ok_or_else(|| TemplateError::UndefinedVariable {
                    name: name.clone(),
                    site: ErrorSite::of(expression),
                })
        }
        ExpressionKind::Dot { target, key } => {
            let value = evaluate_at(target, context, depth)?;
            match value {
                Value::Object(mut obj) => {
                    obj.remove(key)
                        .ok_or_else(|| TemplateError::UndefinedVariable {
                            name: expression.canonical_form(),
                            site: ErrorSite::of(expression),
                        })
                }
                other => Err(type_error(
                    expression,
                    format!("cannot read key '{key}' of {}", other.type_name()),
                )),
            }
        }
        ExpressionKind::Add { left, right } => {
            let left_value = evaluate_at(left, context, depth)?;
            let right_value = evaluate_at(right, context, depth)?;
            add(expression, left_value, right_value)
        }
        ExpressionKind::Comparison { op, left, right } => {
            let equal = evaluate_at(left, context, depth)? == evaluate_at(right, context, depth)?;
            Ok(Value::Bool(match op {
                ComparisonOp::Equal => equal,
                ComparisonOp::NotEqual => !equal,
            }))
        }
        ExpressionKind::And { left, right } => {
            if !evaluate_at(left, context, depth)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate_at(right, context, depth)?.is_truthy()))
        }
        ExpressionKind::Or { left, right } => {
            if evaluate_at(left, context, depth)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate_at(right, context, depth)?.is_truthy()))
        }
        ExpressionKind::Not(operand) => {
            Ok(Value::Bool(!evaluate_at(operand, context, depth)?.is_truthy()))
        }
        ExpressionKind::Parenthetical(inner) => evaluate_at(inner, context, depth),
        ExpressionKind::Eval(target) => {
            let code = match evaluate_at(target, context, depth)? {
                Value::String(code) => code,
                other => {
                    return Err(type_error(
                        expression,
                        format!("?eval expects a string, got {}", other.type_name()),
                    ))
                }
            };
            if depth >= MAX_NESTING_DEPTH {
                return Err(too_deep(expression));
            }
            trace!(code = %code, depth, "evaluating fragment");
            let fragment = parse_expression_fragment(&code).map_err(|source| TemplateError::Eval {
                source,
                site: ErrorSite::of(expression),
            })?;
            evaluate_at(&fragment, context, depth + 1)
        }
    }
}

fn add(expression: &Expression, left: Value, right: Value) -> Result<Value> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a
            .checked_add(b)
            .and_then(|sum| Value::integer(sum).ok())
            .ok_or_else(|| type_error(expression, format!("integer overflow in {a} + {b}"))),
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (Value::String(a), Value::Integer(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Integer(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (a, b) => Err(type_error(
            expression,
            format!("cannot add {} and {}", a.type_name(), b.type_name()),
        )),
    }
}

pub(crate) fn type_error(node: &dyn Node, message: String) -> TemplateError {
    TemplateError::Type {
        message,
        site: ErrorSite::of(node),
    }
}

pub(crate) fn too_deep(node: &dyn Node) -> TemplateError {
    TemplateError::TooDeep {
        limit: MAX_NESTING_DEPTH,
        site: ErrorSite::of(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(data: serde_json::Value) -> Context {
        Context::new(Value::from_json(data).unwrap()).unwrap()
    }

    fn eval_str(code: &str, data: serde_json::Value) -> Result<Value> {
        let expression = parse_expression_fragment(code).unwrap();
        evaluate(&expression, &context(data))
    }

    #[test]
    fn literals_and_variables() {
        assert_eq!(eval_str("\"hi\"", json!({})).unwrap(), Value::from("hi"));
        assert_eq!(eval_str("null", json!({})).unwrap(), Value::Null);
        assert_eq!(eval_str("x", json!({"x": 3})).unwrap(), Value::Integer(3));
    }

    #[test]
    fn dot_access() {
        let data = json!({"user": {"name": "Ann"}});
        assert_eq!(eval_str("user.name", data.clone()).unwrap(), Value::from("Ann"));

        let err = eval_str("user.email", data).unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { ref name, .. } if name == "user.email"));

        let err = eval_str("n.key", json!({"n": 1})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error: cannot read key 'key' of integer at evaluated string:1:1 in `n.key`"
        );
    }

    #[test]
    fn addition() {
        assert_eq!(eval_str("1 + 2", json!({})).unwrap(), Value::Integer(3));
        assert_eq!(eval_str("\"a\" + 1", json!({})).unwrap(), Value::from("a1"));
        assert_eq!(eval_str("a + b", json!({"a": "x", "b": "y"})).unwrap(), Value::from("xy"));
        assert!(matches!(
            eval_str("true + 1", json!({})).unwrap_err(),
            TemplateError::Type { .. }
        ));
        let err = eval_str("9007199254740991 + 1", json!({})).unwrap_err();
        assert!(err.to_string().starts_with("type error: integer overflow"), "{err}");
        let err = eval_str("9223372036854775807 + 1", json!({})).unwrap_err();
        assert!(err.to_string().starts_with("type error: integer out of range"), "{err}");
    }

    #[test]
    fn logic_short_circuits() {
        // `missing` is never looked up
        assert_eq!(eval_str("false && missing", json!({})).unwrap(), Value::Bool(false));
        assert_eq!(eval_str("1 || missing", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(eval_str("!\"\"", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(eval_str("(a == 1) != false", json!({"a": 1})).unwrap(), Value::Bool(true));
    }

    #[test]
    fn eval_builtin() {
        let data = json!({"code": "a + 1", "a": 41});
        assert_eq!(eval_str("code?eval", data).unwrap(), Value::Integer(42));

        let err = eval_str("code?eval", json!({"code": "1 +"})).unwrap_err();
        let TemplateError::Eval { source, site } = err else {
            panic!("expected an eval error");
        };
        assert!(source.to_string().ends_with("at evaluated string:1:4"), "{source}");
        assert_eq!(site.snippet, "code?eval");
    }

    #[test]
    fn self_evaluating_fragment_stops_at_the_nesting_limit() {
        let err = eval_str("code?eval", json!({"code": "code?eval"})).unwrap_err();
        let TemplateError::TooDeep { limit, site } = err else {
            panic!("expected a nesting error");
        };
        assert_eq!(limit, MAX_NESTING_DEPTH);
        assert!(site.location.is_runtime_evaluated());
    }

    #[test]
    fn errors_inside_evaluated_code_point_at_the_fragment() {
        let err = eval_str("code?eval", json!({"code": "nope"})).unwrap_err();
        let site = err.site().unwrap();
        assert!(site.location.is_runtime_evaluated());
        assert_eq!(site.location.start_description(), "evaluated string:1:1");
    }
}
