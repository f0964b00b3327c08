//! Property-based test generators using proptest.
//!
//! Records stay within the nesting limit: a root map whose fields are
//! scalars or maps of scalars.

use proptest::prelude::*;
use stepvault_core::{Key, PropertyPath, Value};

/// Strategy for scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop::num::f64::NORMAL.prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

/// Strategy for field names drawn from a small alphabet, so paths collide.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    "[a-d]"
}

/// Strategy for records at most two levels deep.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    let inner = prop::collection::vec((field_name_strategy(), scalar_strategy()), 0..4)
        .prop_map(|fields| Value::object(fields));
    let field = prop_oneof![3 => scalar_strategy(), 1 => inner];
    prop::collection::vec((field_name_strategy(), field), 0..5)
        .prop_map(|fields| Value::object(fields))
}

/// Strategy for property paths over [`field_name_strategy`] names.
pub fn property_path_strategy() -> impl Strategy<Value = PropertyPath> {
    prop_oneof![
        Just(PropertyPath::Whole),
        field_name_strategy().prop_map(PropertyPath::One),
        (field_name_strategy(), field_name_strategy()).prop_map(|(a, b)| PropertyPath::Two(a, b)),
    ]
}

/// Strategy for number and text keys.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        any::<i64>().prop_map(Key::from),
        "[a-z]{1,8}".prop_map(Key::from),
    ]
}
