//! Dynamic record value type.

use std::cmp::Ordering;

/// Deepest nesting of maps a stored record may have.
///
/// The record root counts as the first level, so `{a: {b: 1}}` is the
/// deepest accepted shape. Property paths address at most two levels for
/// the same reason.
pub const MAX_OBJECT_DEPTH: usize = 2;

/// A structured record value.
///
/// Maps keep their entries sorted by canonical key order, so two maps with
/// the same entries compare equal no matter how they were built. Floats
/// compare by bit pattern, so `NaN == NaN` and `0.0 != -0.0`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Double precision float, always stored as a CBOR float64.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs, sorted by canonical key order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value with sorted keys.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        pairs.dedup_by(|later, earlier| later.0 == earlier.0);
        Value::Map(pairs)
    }

    /// Create a map keyed by field names.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::map(
            fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k.into()), v))
                .collect(),
        )
    }

    /// An empty map, `{}`.
    #[must_use]
    pub fn empty_object() -> Self {
        Value::Map(Vec::new())
    }

    /// Compare two values by the order of their canonical CBOR encodings.
    ///
    /// Major type first, then encoded length, then content.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let by_type = self.major_type().cmp(&other.major_type());
        if by_type != Ordering::Equal {
            return by_type;
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Null, Value::Bool(_)) => Ordering::Greater,
            (Value::Bool(_), Value::Null) => Ordering::Less,
            (Value::Float(a), Value::Float(b)) => a.to_bits().cmp(&b.to_bits()),
            (Value::Float(_), Value::Bool(_) | Value::Null) => Ordering::Greater,
            (Value::Bool(_) | Value::Null, Value::Float(_)) => Ordering::Less,
            (Value::Integer(a), Value::Integer(b)) => {
                cmp_argument(integer_argument(*a), integer_argument(*b))
            }
            (Value::Bytes(a), Value::Bytes(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Value::Text(a), Value::Text(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.cmp_canonical(y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|((ak, av), (bk, bv))| {
                        ak.cmp_canonical(bk).then_with(|| av.cmp_canonical(bv))
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            _ => Ordering::Equal,
        }
    }

    fn major_type(&self) -> u8 {
        match self {
            Value::Integer(n) if *n >= 0 => 0,
            Value::Integer(_) => 1,
            Value::Bytes(_) => 2,
            Value::Text(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
            Value::Bool(_) | Value::Null | Value::Float(_) => 7,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a field of this map value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_text() == Some(field))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up a field of this map value for mutation.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter_mut()
                .find(|(k, _)| k.as_text() == Some(field))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Set a field, returning the previous value.
    ///
    /// A non-map value is replaced by an empty map first.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        if !self.is_map() {
            *self = Value::empty_object();
        }
        let Value::Map(pairs) = self else {
            return None;
        };
        let key = Value::Text(field.into());
        match pairs.binary_search_by(|(k, _)| k.cmp_canonical(&key)) {
            Ok(idx) => Some(std::mem::replace(&mut pairs[idx].1, value)),
            Err(idx) => {
                pairs.insert(idx, (key, value));
                None
            }
        }
    }

    /// Remove a field, returning its value. Non-maps are left untouched.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        match self {
            Value::Map(pairs) => {
                let idx = pairs.iter().position(|(k, _)| k.as_text() == Some(field))?;
                Some(pairs.remove(idx).1)
            }
            _ => None,
        }
    }

    /// Number of nested map levels, counting this value if it is a map.
    ///
    /// Arrays are transparent: `[{a: 1}]` has depth 1.
    pub fn object_depth(&self) -> usize {
        match self {
            Value::Map(pairs) => {
                1 + pairs
                    .iter()
                    .map(|(_, v)| v.object_depth())
                    .max()
                    .unwrap_or(0)
            }
            Value::Array(items) => items.iter().map(Value::object_depth).max().unwrap_or(0),
            _ => 0,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// CBOR argument of an integer: `n` for non-negative, `-1 - n` otherwise.
#[allow(clippy::cast_sign_loss)]
fn integer_argument(n: i64) -> u64 {
    if n >= 0 {
        n as u64
    } else {
        (-1 - n) as u64
    }
}

/// Shorter encodings sort first; equal lengths compare numerically.
fn cmp_argument(a: u64, b: u64) -> Ordering {
    encoded_len(a).cmp(&encoded_len(b)).then(a.cmp(&b))
}

fn encoded_len(n: u64) -> usize {
    match n {
        0..=23 => 1,
        24..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
