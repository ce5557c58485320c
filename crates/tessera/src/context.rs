//! Variable resolution during template rendering.

use crate::value::{Value, ValueError};
use std::collections::HashMap;

struct Scope {
    bindings: HashMap<String, Value>,
    /// Lookups do not continue past an isolated scope into the scopes below
    /// it; macro bodies see their own parameters and the globals only.
    isolated: bool,
}

/// Data model root, assigned globals and the local scope stack.
///
/// Lookup order is innermost local scope outwards, then globals, then the
/// data model root.
pub struct Context {
    root: HashMap<String, Value>,
    globals: HashMap<String, Value>,
    local_stack: Vec<Scope>,
}

impl Context {
    /// Create a new context from root data
    pub fn new(root_data: Value) -> Result<Self, ValueError> {
        let root = match root_data {
            Value::Object(obj) => obj,
            other => return Err(ValueError::RootNotHash(other.type_name())),
        };

        Ok(Self {
            root,
            globals: HashMap::new(),
            local_stack: Vec::new(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        for scope in self.local_stack.iter().rev() {
            if let Some(value) = scope.bindings.get(name) {
                return Some(value);
            }
            if scope.isolated {
                break;
            }
        }
        self.globals.get(name).or_else(|| self.root.get(name))
    }

    /// Binds `name` in the global namespace, visible to every later lookup.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Push a new scope (list iterations)
    pub fn push_scope(&mut self, bindings: HashMap<String, Value>) {
        self.local_stack.push(Scope {
            bindings,
            isolated: false,
        });
    }

    /// Push a scope that hides the caller's locals (macro calls)
    pub fn push_isolated_scope(&mut self, bindings: HashMap<String, Value>) {
        self.local_stack.push(Scope {
            bindings,
            isolated: true,
        });
    }

    /// Pop the current scope
    pub fn pop_scope(&mut self) {
        self.local_stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.local_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_context() -> Context {
        let mut root = HashMap::new();
        root.insert("name".to_string(), Value::from("Alice"));
        root.insert("count".to_string(), Value::Integer(1));
        Context::new(Value::Object(root)).unwrap()
    }

    #[test]
    fn test_root_must_be_hash() {
        assert_eq!(
            Context::new(Value::Array(vec![])).err(),
            Some(ValueError::RootNotHash("sequence"))
        );
    }

    #[test]
    fn test_scope_stack() {
        let mut ctx = create_test_context();
        let mut bindings = HashMap::new();
        bindings.insert("item".to_string(), Value::Integer(42));
        ctx.push_scope(bindings);

        assert_eq!(ctx.lookup("item"), Some(&Value::Integer(42)));
        assert_eq!(ctx.lookup("name"), Some(&Value::from("Alice")));

        ctx.pop_scope();
        assert_eq!(ctx.lookup("item"), None);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_locals_shadow_globals_and_globals_shadow_root() {
        let mut ctx = create_test_context();
        ctx.set_global("name", Value::from("Bob"));
        assert_eq!(ctx.lookup("name"), Some(&Value::from("Bob")));

        let mut bindings = HashMap::new();
        bindings.insert("name".to_string(), Value::from("Carol"));
        ctx.push_scope(bindings);
        assert_eq!(ctx.lookup("name"), Some(&Value::from("Carol")));
    }

    #[test]
    fn test_isolated_scope_hides_outer_locals() {
        let mut ctx = create_test_context();
        let mut outer = HashMap::new();
        outer.insert("item".to_string(), Value::Integer(1));
        ctx.push_scope(outer);

        let mut params = HashMap::new();
        params.insert("x".to_string(), Value::Integer(2));
        ctx.push_isolated_scope(params);

        assert_eq!(ctx.lookup("x"), Some(&Value::Integer(2)));
        assert_eq!(ctx.lookup("item"), None);
        assert_eq!(ctx.lookup("count"), Some(&Value::Integer(1)));

        ctx.pop_scope();
        assert_eq!(ctx.lookup("item"), Some(&Value::Integer(1)));
    }
}
