//! Loosely-typed payload model
//!
//! Remote calls take positional arguments and return a single payload whose
//! shape is only known by convention. `Value` models that payload: scalars,
//! string-keyed structs and arrays, nested arbitrarily.

use std::collections::BTreeMap;

/// A string-keyed mapping of payload values
pub type Struct = BTreeMap<String, Value>;

/// A single loosely-typed value as exchanged with the remote service
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit absence of a value
    Nil,
    /// Boolean flag
    Bool(bool),
    /// Integer (covers both 32-bit and 64-bit wire encodings)
    Int(i64),
    /// Floating point number
    Double(f64),
    /// Text
    String(String),
    /// Date-time, kept in its raw ISO-8601 wire form
    DateTime(String),
    /// Binary data
    Base64(Vec<u8>),
    /// Named members
    Struct(Struct),
    /// Ordered sequence
    Array(Vec<Value>),
}

impl Value {
    /// Returns the members if this value is a struct
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Returns the elements if this value is an array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// Returns the text if this value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a struct member by name
    ///
    /// Returns `None` if this value is not a struct or the member is absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct().and_then(|members| members.get(key))
    }

    /// Interprets the value as an integer, coercing numeric-looking strings
    pub fn coerce_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interprets the value as a float, coercing integers and numeric-looking strings
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interprets the value as text, rendering numbers in their decimal form
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            Value::String(s) | Value::DateTime(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Double(d) => Some(d.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Struct> for Value {
    fn from(value: Struct) -> Self {
        Value::Struct(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}
