//! Runtime value types for Tessera templates.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

/// Integers outside this range do not survive a round trip through JSON
/// consumers. Data, literals and sums outside it are rejected.
pub const INTEGER_MIN: i64 = -9_007_199_254_740_991;
pub const INTEGER_MAX: i64 = 9_007_199_254_740_991;

/// Problems with a data model or a value used in the wrong place.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValueError {
    #[error("integer out of range: {0}")]
    IntegerOutOfRange(i64),

    #[error("floating point numbers are not supported: {0}")]
    FloatNotSupported(f64),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("data model root must be a hash, got {0}")]
    RootNotHash(&'static str),

    #[error("cannot convert {0} to string")]
    NotStringifiable(&'static str),
}

/// Runtime value type for Tessera templates
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// An integer within [`INTEGER_MIN`]..=[`INTEGER_MAX`].
    pub fn integer(i: i64) -> Result<Self, ValueError> {
        if (INTEGER_MIN..=INTEGER_MAX).contains(&i) {
            Ok(Value::Integer(i))
        } else {
            Err(ValueError::IntegerOutOfRange(i))
        }
    }

    /// Convert a JSON value to a Tessera Value
    pub fn from_json(json: JsonValue) -> Result<Self, ValueError> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::integer(i)
                } else if let Some(f) = n.as_f64() {
                    // Whole floats such as 3.0 are accepted as integers
                    if f.fract() == 0.0 && f >= INTEGER_MIN as f64 && f <= INTEGER_MAX as f64 {
                        Ok(Value::Integer(f as i64))
                    } else {
                        Err(ValueError::FloatNotSupported(f))
                    }
                } else {
                    Err(ValueError::InvalidNumber(n.to_string()))
                }
            }
            JsonValue::String(s) => Ok(Value::String(s)),
            JsonValue::Array(arr) => {
                let values: Result<Vec<Value>, ValueError> =
                    arr.into_iter().map(Value::from_json).collect();
                Ok(Value::Array(values?))
            }
            JsonValue::Object(obj) => {
                let mut map = HashMap::with_capacity(obj.len());
                for (k, v) in obj {
                    map.insert(k, Value::from_json(v)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    /// Falsy values: false, null, 0, "", [], {}
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
        }
    }

    /// Only strings and integers can be written to the output.
    pub fn stringify(&self) -> Result<String, ValueError> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Integer(n) => Ok(n.to_string()),
            other => Err(ValueError::NotStringifiable(other.type_name())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "sequence",
            Value::Object(_) => "hash",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("hello").is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(Value::Array(vec![Value::Integer(1)]).is_truthy());
        assert!(!Value::Object(HashMap::new()).is_truthy());
    }

    #[test]
    fn test_stringify() {
        assert_eq!(Value::from("hello").stringify().unwrap(), "hello");
        assert_eq!(Value::Integer(-42).stringify().unwrap(), "-42");
        assert_eq!(
            Value::Null.stringify(),
            Err(ValueError::NotStringifiable("null"))
        );
        assert_eq!(
            Value::Bool(true).stringify(),
            Err(ValueError::NotStringifiable("boolean"))
        );
        assert!(Value::Array(vec![]).stringify().is_err());
        assert!(Value::Object(HashMap::new()).stringify().is_err());
    }

    #[test]
    fn test_from_json() {
        let value = Value::from_json(json!({"name": "test", "count": 42, "ratio": 2.0})).unwrap();
        let Value::Object(obj) = value else {
            panic!("Expected Object");
        };
        assert_eq!(obj.get("name"), Some(&Value::from("test")));
        assert_eq!(obj.get("count"), Some(&Value::Integer(42)));
        assert_eq!(obj.get("ratio"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_from_json_rejects_floats_and_huge_integers() {
        assert_eq!(
            Value::from_json(json!(1.5)),
            Err(ValueError::FloatNotSupported(1.5))
        );
        assert_eq!(
            Value::from_json(json!(INTEGER_MAX + 1)),
            Err(ValueError::IntegerOutOfRange(INTEGER_MAX + 1))
        );
    }
}
