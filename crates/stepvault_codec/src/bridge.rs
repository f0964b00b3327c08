//! Serde bridge between typed values and [`Value`].
//!
//! Typed values go through `ciborium`'s value model and are then narrowed to
//! what a stored record may contain.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as CborValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Convert a serializable value into a [`Value`].
///
/// # Errors
///
/// Fails if serialization fails, or the value contains tags or integers
/// outside the `i64` range.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    let raw = CborValue::serialized(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    narrow(raw)
}

/// Convert a [`Value`] back into a typed value.
///
/// # Errors
///
/// Fails if the value's shape does not match `T`.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    widen(value)
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

fn narrow(raw: CborValue) -> CodecResult<Value> {
    Ok(match raw {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(n) => {
            let wide: i128 = n.into();
            Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
        }
        CborValue::Bytes(b) => Value::Bytes(b),
        CborValue::Text(s) => Value::Text(s),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(narrow)
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        CborValue::Map(pairs) => Value::map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((narrow(k)?, narrow(v)?)))
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        CborValue::Float(f) => Value::Float(f),
        CborValue::Tag(tag, _) => {
            return Err(CodecError::encoding_failed(format!(
                "tagged value {tag} is not storable"
            )))
        }
        _ => return Err(CodecError::encoding_failed("unsupported value kind")),
    })
}

fn widen(value: &Value) -> CborValue {
    match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(*b),
        Value::Integer(n) => CborValue::Integer(Integer::from(*n)),
        Value::Float(f) => CborValue::Float(*f),
        Value::Bytes(b) => CborValue::Bytes(b.clone()),
        Value::Text(s) => CborValue::Text(s.clone()),
        Value::Array(items) => CborValue::Array(items.iter().map(widen).collect()),
        Value::Map(pairs) => {
            CborValue::Map(pairs.iter().map(|(k, v)| (widen(k), widen(v))).collect())
        }
    }
}
