//! Schema declaration.
//!
//! A schema is declared once, at the type level: one [`Schema`] type names
//! the databases it may be opened as and its stores, and one [`StoreDef`]
//! marker type per store fixes that store's key and value types. Every typed
//! API ([`crate::Database`], [`crate::Store`], [`crate::Upgrade`]) is
//! parameterized by these types, so a key or value of the wrong shape does
//! not compile.
//!
//! ```rust,ignore
//! struct App;
//! impl Schema for App {
//!     const DATABASE_NAMES: &'static [&'static str] = &["app"];
//!     const STORE_NAMES: &'static [&'static str] = &["users"];
//! }
//!
//! struct Users;
//! impl StoreDef for Users {
//!     type Schema = App;
//!     type Key = String;
//!     type Value = User;
//!     const NAME: &'static str = "users";
//! }
//! ```

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::SystemTime;
use stepvault_codec::{CodecError, Key};
use stepvault_engine::IndexOptions;

/// The set of databases and stores an application declares.
pub trait Schema: Send + Sync + 'static {
    /// Names a database of this schema may be opened as.
    const DATABASE_NAMES: &'static [&'static str];

    /// Every store of the schema.
    const STORE_NAMES: &'static [&'static str];

    /// Whether `name` is an allowed database name.
    fn allows_database(name: &str) -> bool {
        Self::DATABASE_NAMES.contains(&name)
    }
}

/// A declared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name.
    pub name: &'static str,
    /// Field path the index reads.
    pub key_path: &'static str,
    /// Whether indexed values must be unique.
    pub unique: bool,
    /// Whether array values produce one entry per element.
    pub multi_entry: bool,
}

impl IndexDef {
    /// Engine options for this index.
    #[must_use]
    pub const fn options(&self) -> IndexOptions {
        IndexOptions {
            unique: self.unique,
            multi_entry: self.multi_entry,
        }
    }
}

/// One store of a [`Schema`].
pub trait StoreDef: Send + Sync + 'static {
    /// The schema this store belongs to.
    type Schema: Schema;
    /// Key type.
    type Key: StoreKey;
    /// Record type.
    type Value: Serialize + DeserializeOwned + Send + 'static;

    /// Store name.
    const NAME: &'static str;

    /// Indexes created along with the store.
    const INDEXES: &'static [IndexDef] = &[];
}

/// A type usable as a store key: a number, a date, a string, bytes or an
/// array of those.
pub trait StoreKey: Clone + Send + Sync + 'static {
    /// Converts into an engine key.
    fn to_key(&self) -> Key;

    /// Converts back from an engine key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the key has another shape.
    fn from_key(key: &Key) -> CoreResult<Self>;
}

fn key_mismatch(expected: &str, key: &Key) -> CoreError {
    CoreError::Codec(CodecError::invalid_structure(format!(
        "expected a {expected} key, found {key}"
    )))
}

impl StoreKey for Key {
    fn to_key(&self) -> Key {
        self.clone()
    }

    fn from_key(key: &Key) -> CoreResult<Self> {
        Ok(key.clone())
    }
}

impl StoreKey for i64 {
    fn to_key(&self) -> Key {
        Key::Number(*self)
    }

    fn from_key(key: &Key) -> CoreResult<Self> {
        key.as_number().ok_or_else(|| key_mismatch("number", key))
    }
}

impl StoreKey for u32 {
    fn to_key(&self) -> Key {
        Key::Number(i64::from(*self))
    }

    fn from_key(key: &Key) -> CoreResult<Self> {
        key.as_number()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| key_mismatch("u32", key))
    }
}

impl StoreKey for String {
    fn to_key(&self) -> Key {
        Key::Text(self.clone())
    }

    fn from_key(key: &Key) -> CoreResult<Self> {
        key.as_text()
            .map(str::to_string)
            .ok_or_else(|| key_mismatch("string", key))
    }
}

impl StoreKey for SystemTime {
    fn to_key(&self) -> Key {
        Key::date(*self)
    }

    fn from_key(key: &Key) -> CoreResult<Self> {
        key.as_date().ok_or_else(|| key_mismatch("date", key))
    }
}

impl StoreKey for Vec<u8> {
    fn to_key(&self) -> Key {
        Key::Binary(self.clone())
    }

    fn from_key(key: &Key) -> CoreResult<Self> {
        match key {
            Key::Binary(bytes) => Ok(bytes.clone()),
            other => Err(key_mismatch("binary", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    struct Demo;
    impl Schema for Demo {
        const DATABASE_NAMES: &'static [&'static str] = &["demo", "demo-test"];
        const STORE_NAMES: &'static [&'static str] = &["things"];
    }

    #[test]
    fn allowed_database_names() {
        assert!(Demo::allows_database("demo"));
        assert!(Demo::allows_database("demo-test"));
        assert!(!Demo::allows_database("other"));
    }

    #[test]
    fn keys_convert_both_ways() {
        assert_eq!(i64::from_key(&42_i64.to_key()).unwrap(), 42);
        assert_eq!(u32::from_key(&7_u32.to_key()).unwrap(), 7);
        assert_eq!(
            String::from_key(&"ada".to_string().to_key()).unwrap(),
            "ada"
        );
        let when = UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);
        assert_eq!(SystemTime::from_key(&when.to_key()).unwrap(), when);
    }

    #[test]
    fn mismatched_key_is_codec_error() {
        let err = i64::from_key(&Key::from("nope")).unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));
        assert!(u32::from_key(&Key::Number(-1)).is_err());
    }
}
