use serde::{Deserialize, Serialize};

/// A dynamic value passed between scripts and the host application.
///
/// Scripts are untyped; every value that crosses the boundary (thread
/// results, list payloads, host function arguments, passage bindings)
/// is one of these. `Null` stands in for an absent or unresolvable
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Runtime type name, used in validation diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// A declared parameter type in a host function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Any,
}

impl ParamType {
    /// Parse a type token from a declaration string.
    ///
    /// Case-insensitive; unrecognized tokens degrade to `Any` so that
    /// declarations written against a richer host type system still
    /// load.
    pub fn parse(token: &str) -> ParamType {
        match token.trim().to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            _ => Self::Any,
        }
    }

    /// Whether a runtime value satisfies this declared type.
    ///
    /// `Any` matches everything. `Null` matches nothing here; the
    /// optional-parameter tolerance is the validator's concern.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => matches!(value, Value::String(_)),
            Self::Number => matches!(value, Value::Number(_)),
            Self::Boolean => matches!(value, Value::Bool(_)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Any => "any",
        }
    }
}

/// An argument at a passage call site (or a parameter default).
///
/// Closed variant set: either an already-parsed literal, a reference
/// to a variable in the caller's scope (`$name`), or a deferred
/// expression (`{expr}`) handed to the interpreter's evaluator at
/// resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Literal(Value),
    Variable(String),
    Expression(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bool(true).type_name(), "boolean");
        assert_eq!(Value::Number(1.5).type_name(), "number");
        assert_eq!(Value::String("x".to_string()).type_name(), "string");
    }

    #[test]
    fn param_type_parse_case_insensitive() {
        assert_eq!(ParamType::parse("String"), ParamType::String);
        assert_eq!(ParamType::parse("NUMBER"), ParamType::Number);
        assert_eq!(ParamType::parse("boolean"), ParamType::Boolean);
        assert_eq!(ParamType::parse("any"), ParamType::Any);
    }

    #[test]
    fn param_type_parse_unknown_degrades_to_any() {
        assert_eq!(ParamType::parse("void"), ParamType::Any);
        assert_eq!(ParamType::parse("object"), ParamType::Any);
        assert_eq!(ParamType::parse(""), ParamType::Any);
    }

    #[test]
    fn param_type_matching() {
        assert!(ParamType::Number.matches(&Value::Number(10.0)));
        assert!(!ParamType::Number.matches(&Value::String("10".to_string())));
        assert!(ParamType::Any.matches(&Value::Null));
        assert!(!ParamType::String.matches(&Value::Null));
        assert!(ParamType::Boolean.matches(&Value::Bool(false)));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(3_i64), Value::Number(3.0));
        assert_eq!(Value::from("hi"), Value::String("hi".to_string()));
        assert_eq!(Value::from(true), Value::Bool(true));
    }
}
