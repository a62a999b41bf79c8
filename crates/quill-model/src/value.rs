use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// An insertion-ordered map from field names to values.
///
/// Iteration order is insertion order so that serializing the same document
/// twice produces identical bytes.
pub type Object = IndexMap<String, Value>;

/// A heterogeneous document value.
///
/// The sole numeric type is a 64-bit float; dates are millisecond epochs.
/// `Where` carries a `$where` predicate closure — queries are themselves
/// values, so the predicate has to be representable here. It never appears in
/// a stored document: the serializer rejects it and it compares equal to
/// nothing.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(i64),
    Array(Vec<Value>),
    Object(Object),
    Where(Predicate),
}

/// A `$where` predicate: receives the candidate document, returns whether it
/// matches.
#[derive(Clone)]
pub struct Predicate(pub Arc<dyn Fn(&Value) -> bool + Send + Sync>);

impl Predicate {
    pub fn new(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Predicate(Arc::new(f))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

impl Value {
    /// An empty object value.
    pub fn object() -> Value {
        Value::Object(Object::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a primitive: null, boolean, number, string,
    /// date — or an array, which query matching treats as a value rather
    /// than a container.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_) | Value::Where(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup on object values; `None` for everything else.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }
}

/// Structural equality.
///
/// Dates are equal when their epoch millis are equal; arrays when they have
/// the same length and element-wise equal members; objects when they hold the
/// same keys with equal values. `NaN` is equal to nothing, and neither is a
/// `Where` predicate.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| values_equal(v, w))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        values_equal(self, other)
    }
}

/// Deep copy that drops keys beginning with `$` or containing `.`.
///
/// Used to materialize an upsert base from a query: operator keys must not
/// leak into the inserted document.
pub fn deep_copy_strict(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(deep_copy_strict).collect()),
        Value::Object(map) => {
            let mut copy = Object::new();
            for (key, v) in map {
                if !key.starts_with('$') && !key.contains('.') {
                    copy.insert(key.clone(), deep_copy_strict(v));
                }
            }
            Value::Object(copy)
        }
        other => other.clone(),
    }
}

// ── Conversions ─────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Value {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Value {
        Value::Object(map)
    }
}

impl From<Predicate> for Value {
    fn from(p: Predicate) -> Value {
        Value::Where(p)
    }
}

/// Build a [`Value`] from a literal.
///
/// `null`, array and object literals nest; everything else goes through
/// `Value::from`, so negative numbers and arbitrary expressions need parens:
/// `val!((-1))`, `val!((now_ms))`.
#[macro_export]
macro_rules! val {
    (null) => { $crate::Value::Null };
    ([ $( $elem:tt ),* $(,)? ]) => {
        $crate::Value::Array(vec![ $( $crate::val!($elem) ),* ])
    };
    ({ $( $key:literal : $value:tt ),* $(,)? }) => {{
        #[allow(unused_mut)]
        let mut map = $crate::Object::new();
        $( map.insert($key.to_string(), $crate::val!($value)); )*
        $crate::Value::Object(map)
    }};
    ($other:expr) => { $crate::Value::from($other) };
}

/// Build a document (an object [`Value`]) from key/value pairs:
/// `doc! { "name": "Acme", "revenue": 50000.0 }`.
#[macro_export]
macro_rules! doc {
    ( $( $key:literal : $value:tt ),* $(,)? ) => {
        $crate::val!({ $( $key : $value ),* })
    };
}
