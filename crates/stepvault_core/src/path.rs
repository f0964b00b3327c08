//! Property paths into stored records.
//!
//! A path addresses either a whole record or a field one or two levels
//! down. Reading and writing are pure functions over [`Value`]; callers
//! apply the resulting [`PathWrite`] to a store.

use std::fmt;
use stepvault_codec::Value;

/// Location of a value inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PropertyPath {
    /// The record itself.
    #[default]
    Whole,
    /// `record[k0]`.
    One(String),
    /// `record[k0][k1]`.
    Two(String, String),
}

/// What to do with a record after writing through a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathWrite {
    /// Store this record.
    Put(Value),
    /// Delete the record.
    Delete,
    /// Leave the store untouched.
    Unchanged,
}

impl PropertyPath {
    /// Path to a top-level field.
    pub fn field(k0: impl Into<String>) -> Self {
        Self::One(k0.into())
    }

    /// Path to a nested field.
    pub fn nested(k0: impl Into<String>, k1: impl Into<String>) -> Self {
        Self::Two(k0.into(), k1.into())
    }

    /// Number of segments (0, 1 or 2).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Whole => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
        }
    }

    /// Reads the addressed value. Absent records and absent parents read as
    /// `None`.
    #[must_use]
    pub fn read(&self, record: Option<&Value>) -> Option<Value> {
        let record = record?;
        match self {
            Self::Whole => Some(record.clone()),
            Self::One(k0) => record.get(k0).cloned(),
            Self::Two(k0, k1) => record.get(k0)?.get(k1).cloned(),
        }
    }

    /// Writes `value` at this path into `record`.
    ///
    /// A value equal to `empty` removes the addressed field instead:
    /// only the leaf goes, a parent left as `{}` stays, and the record is
    /// kept even if it ends up empty. For [`PropertyPath::Whole`] the record
    /// itself is replaced or deleted.
    #[must_use]
    pub fn write(&self, record: Option<Value>, value: Value, empty: &Value) -> PathWrite {
        let clearing = value == *empty;
        match self {
            Self::Whole if clearing => PathWrite::Delete,
            Self::Whole => PathWrite::Put(value),
            Self::One(_) | Self::Two(..) if clearing => match record {
                Some(mut record) => {
                    self.remove_leaf(&mut record);
                    PathWrite::Put(record)
                }
                None => PathWrite::Unchanged,
            },
            Self::One(k0) => {
                let mut record = record.unwrap_or_else(Value::empty_object);
                record.insert(k0.clone(), value);
                PathWrite::Put(record)
            }
            Self::Two(k0, k1) => {
                let mut record = record.unwrap_or_else(Value::empty_object);
                let mut parent = record
                    .get(k0)
                    .filter(|parent| parent.is_map())
                    .cloned()
                    .unwrap_or_else(Value::empty_object);
                parent.insert(k1.clone(), value);
                record.insert(k0.clone(), parent);
                PathWrite::Put(record)
            }
        }
    }

    fn remove_leaf(&self, record: &mut Value) {
        match self {
            Self::Whole => {}
            Self::One(k0) => {
                record.remove(k0);
            }
            Self::Two(k0, k1) => {
                if let Some(parent) = record.get_mut(k0) {
                    parent.remove(k1);
                }
            }
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("<record>"),
            Self::One(k0) => write!(f, "{k0}"),
            Self::Two(k0, k1) => write!(f, "{k0}.{k1}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record() -> Value {
        Value::object([
            ("name", Value::from("Ada")),
            (
                "address",
                Value::object([("city", Value::from("London")), ("zip", Value::from("N1"))]),
            ),
        ])
    }

    fn put(write: PathWrite) -> Value {
        match write {
            PathWrite::Put(value) => value,
            other => panic!("expected a put, got {other:?}"),
        }
    }

    #[test]
    fn read_paths() {
        let r = record();
        assert_eq!(PropertyPath::Whole.read(Some(&r)), Some(r.clone()));
        assert_eq!(
            PropertyPath::field("name").read(Some(&r)),
            Some(Value::from("Ada"))
        );
        assert_eq!(
            PropertyPath::nested("address", "city").read(Some(&r)),
            Some(Value::from("London"))
        );
        assert_eq!(PropertyPath::nested("missing", "city").read(Some(&r)), None);
        assert_eq!(PropertyPath::field("name").read(None), None);
    }

    #[test]
    fn whole_record_put_and_delete() {
        let empty = Value::from("");
        assert_eq!(
            PropertyPath::Whole.write(None, Value::from("x"), &empty),
            PathWrite::Put(Value::from("x"))
        );
        assert_eq!(
            PropertyPath::Whole.write(Some(record()), Value::from(""), &empty),
            PathWrite::Delete
        );
    }

    #[test]
    fn writing_materializes_parents() {
        let empty = Value::from("");
        let written = put(PropertyPath::nested("a", "b").write(None, Value::from(1), &empty));
        assert_eq!(
            written,
            Value::object([("a", Value::object([("b", Value::from(1))]))])
        );
    }

    #[test]
    fn empty_value_removes_only_the_leaf() {
        let empty = Value::from("");
        let path = PropertyPath::nested("address", "city");
        let written = put(path.write(Some(record()), empty.clone(), &empty));

        assert_eq!(path.read(Some(&written)), None);
        assert_eq!(
            PropertyPath::nested("address", "zip").read(Some(&written)),
            Some(Value::from("N1"))
        );
        assert_eq!(
            PropertyPath::field("name").read(Some(&written)),
            Some(Value::from("Ada"))
        );
    }

    #[test]
    fn emptied_record_is_kept() {
        let empty = Value::Null;
        let record = Value::object([("only", Value::from(1))]);
        let written = put(PropertyPath::field("only").write(Some(record), Value::Null, &empty));
        assert_eq!(written, Value::empty_object());

        let nested = Value::object([("a", Value::object([("b", Value::from(1))]))]);
        let written = put(PropertyPath::nested("a", "b").write(Some(nested), Value::Null, &empty));
        assert_eq!(written, Value::object([("a", Value::empty_object())]));
    }

    #[test]
    fn clearing_an_absent_record_writes_nothing() {
        let empty = Value::Null;
        assert_eq!(
            PropertyPath::field("a").write(None, Value::Null, &empty),
            PathWrite::Unchanged
        );
    }

    #[test]
    fn non_map_parent_is_replaced() {
        let empty = Value::Null;
        let record = Value::object([("a", Value::from(5))]);
        let written = put(
            PropertyPath::nested("a", "b").write(Some(record), Value::from(1), &empty),
        );
        assert_eq!(
            PropertyPath::nested("a", "b").read(Some(&written)),
            Some(Value::from(1))
        );
    }

    fn path_strategy() -> impl Strategy<Value = PropertyPath> {
        prop_oneof![
            Just(PropertyPath::Whole),
            "[a-c]".prop_map(PropertyPath::One),
            ("[a-c]", "[x-z]").prop_map(|(a, b)| PropertyPath::Two(a, b)),
        ]
    }

    proptest! {
        #[test]
        fn written_values_read_back(path in path_strategy(), n in 1i64..1000, seed in 0i64..3) {
            let empty = Value::from(0);
            let record = Value::object([
                ("a", Value::object([("x", Value::from(seed))])),
                ("b", Value::from(seed)),
            ]);
            match path.write(Some(record), Value::from(n), &empty) {
                PathWrite::Put(written) => {
                    prop_assert_eq!(path.read(Some(&written)), Some(Value::from(n)));
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
