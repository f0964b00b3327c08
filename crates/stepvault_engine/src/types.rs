//! Core type definitions for the engine.

use crate::connection::Connection;
use std::fmt;
use std::sync::Arc;

/// Identifier of an open connection.
///
/// Connection IDs are unique within one [`crate::Factory`] and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Creates a new connection ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Identifier of a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// What a transaction is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and record writes.
    ReadWrite,
    /// Reads, writes and schema changes; only exists during an upgrade.
    VersionChange,
}

impl TransactionMode {
    /// Whether record writes are allowed.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// A version change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    /// Version stored before the change (0 for a new database).
    pub old_version: u64,
    /// Version being opened, or `None` when the database is being deleted.
    pub new_version: Option<u64>,
}

/// Handler invoked on an open connection when another opener wants a newer
/// version (or wants to delete the database).
///
/// It runs synchronously and receives the notified connection, so it can
/// close it.
pub type VersionChangeHandler = Arc<dyn Fn(&Connection, VersionChange) + Send + Sync>;
