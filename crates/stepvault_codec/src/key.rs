//! Object store keys.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A key identifying one record in an object store.
///
/// Keys are totally ordered the way the host engine orders them: every
/// number sorts before every date, dates before strings, strings before
/// binary keys and binary keys before arrays. The derived `Ord` relies on
/// the variant declaration order below.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Numeric key.
    Number(i64),
    /// Date key, in milliseconds since the Unix epoch.
    Date(i64),
    /// String key.
    Text(String),
    /// Binary key.
    Binary(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// Creates a date key from a system time.
    ///
    /// Times before the epoch produce negative keys; times too far out to
    /// fit in an `i64` of milliseconds saturate.
    #[must_use]
    pub fn date(time: SystemTime) -> Self {
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_millis())
                .map(|m| -m)
                .unwrap_or(i64::MIN),
        };
        Key::Date(millis)
    }

    /// Returns the date this key encodes, if it is a date key.
    #[must_use]
    pub fn as_date(&self) -> Option<SystemTime> {
        match self {
            Key::Date(millis) if *millis >= 0 => {
                Some(UNIX_EPOCH + Duration::from_millis(millis.unsigned_abs()))
            }
            Key::Date(millis) => Some(UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())),
            _ => None,
        }
    }

    /// Returns the text of a string key.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number of a numeric key.
    #[must_use]
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Date(ms) => write!(f, "date:{ms}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Binary(b) => write!(f, "bin:{}b", b.len()),
            Key::Array(parts) => {
                write!(f, "[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(i64::from(n))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<SystemTime> for Key {
    fn from(time: SystemTime) -> Self {
        Key::date(time)
    }
}

impl From<Vec<Key>> for Key {
    fn from(parts: Vec<Key>) -> Self {
        Key::Array(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_order_matches_engine() {
        let mut keys = vec![
            Key::Array(vec![]),
            Key::Text("a".into()),
            Key::Binary(vec![0]),
            Key::Date(0),
            Key::Number(99),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::Number(99),
                Key::Date(0),
                Key::Text("a".into()),
                Key::Binary(vec![0]),
                Key::Array(vec![]),
            ]
        );
    }

    #[test]
    fn date_round_trip() {
        let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let key = Key::from(time);
        assert_eq!(key, Key::Date(1_700_000_000_123));
        assert_eq!(key.as_date(), Some(time));
    }

    #[test]
    fn display_compound() {
        let key = Key::Array(vec![Key::from("user"), Key::from(3)]);
        assert_eq!(key.to_string(), "[\"user\", 3]");
    }
}
