//! Argument value model
//!
//! Everything that can appear as an operation argument is a `Value`:
//! primitive scalars, dates, binary payloads, ordered lists, keyed
//! dictionaries, graph nodes, and function literals. Values are immutable
//! once constructed; containers hold their contents by value and nodes are
//! shared through `Arc`.
//!
//! Dictionaries preserve insertion order (the serializer depends on it for
//! deterministic output) but compare order-insensitively: two dictionaries
//! with the same entries in different order are equal.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::capture::CapturedCallback;
use crate::node::ExprNode;

/// A value in the computation description: a primitive, a container, a graph
/// node, or a function literal.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / null
    Null,

    /// Boolean constant
    Bool(bool),

    /// 64-bit integer constant
    Integer(i64),

    /// Floating-point constant
    Float(f64),

    /// String constant
    String(String),

    /// Timestamp, wire-encoded at microsecond precision
    Date(DateTime<Utc>),

    /// Binary payload
    Bytes(Vec<u8>),

    /// Ordered sequence: element order is significant
    List(Vec<Value>),

    /// Keyed mapping: insertion order kept for rendering, ignored for equality
    Dict(Vec<(String, Value)>),

    /// A node of the computation graph
    Node(Arc<ExprNode>),

    /// A function literal (captured callback), e.g. a map body
    Callback(Arc<CapturedCallback>),
}

impl Value {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Create a dictionary from key/value pairs, keeping the given order
    pub fn dict(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Dict(entries.into_iter().collect())
    }

    // =========================================================================
    // PREDICATES
    // =========================================================================

    /// Is this a graph node?
    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    /// Is this a function literal?
    pub fn is_callback(&self) -> bool {
        matches!(self, Value::Callback(_))
    }

    /// Is this the null value?
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    // =========================================================================
    // EXTRACTORS
    // =========================================================================

    /// Get as string constant
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as integer constant
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float constant (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as boolean constant
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the underlying graph node
    pub fn as_node(&self) -> Option<&Arc<ExprNode>> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Get the underlying function literal
    pub fn as_callback(&self) -> Option<&Arc<CapturedCallback>> {
        match self {
            Value::Callback(c) => Some(c),
            _ => None,
        }
    }

    /// Get list elements
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get dictionary entries in insertion order
    pub fn as_dict(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}

// =============================================================================
// EQUALITY
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => dict_entries_equal(a, b),
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Callback(a), Value::Callback(b)) => a == b,
            _ => false,
        }
    }
}

/// Order-insensitive comparison of dictionary entries
fn dict_entries_equal(a: &[(String, Value)], b: &[(String, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_sorted: Vec<&(String, Value)> = a.iter().collect();
    let mut b_sorted: Vec<&(String, Value)> = b.iter().collect();
    a_sorted.sort_by(|x, y| x.0.cmp(&y.0));
    b_sorted.sort_by(|x, y| x.0.cmp(&y.0));
    a_sorted
        .iter()
        .zip(b_sorted.iter())
        .all(|(x, y)| x.0 == y.0 && x.1 == y.1)
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Arc<ExprNode>> for Value {
    fn from(v: Arc<ExprNode>) -> Self {
        Value::Node(v)
    }
}

impl From<Arc<CapturedCallback>> for Value {
    fn from(v: Arc<CapturedCallback>) -> Self {
        Value::Callback(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(42i64).as_integer(), Some(42));
        assert_eq!(Value::from("hello").as_string(), Some("hello"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(2.5).as_float(), Some(2.5));
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn test_dict_equality_ignores_order() {
        let a = Value::dict(vec![
            ("x".to_string(), Value::from(1i64)),
            ("y".to_string(), Value::from(2i64)),
        ]);
        let b = Value::dict(vec![
            ("y".to_string(), Value::from(2i64)),
            ("x".to_string(), Value::from(1i64)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dict_equality_detects_differences() {
        let a = Value::dict(vec![("x".to_string(), Value::from(1i64))]);
        let b = Value::dict(vec![("x".to_string(), Value::from(2i64))]);
        assert_ne!(a, b);

        let c = Value::dict(vec![("z".to_string(), Value::from(1i64))]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_list_equality_is_ordered() {
        let a = Value::from(vec![Value::from(1i64), Value::from(2i64)]);
        let b = Value::from(vec![Value::from(2i64), Value::from(1i64)]);
        assert_ne!(a, b);
    }
}
