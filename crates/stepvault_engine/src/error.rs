//! Error types for the engine.

use crate::types::TransactionId;
use stepvault_codec::CodecError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the engine.
///
/// These mirror the conditions a host object-store engine reports. Wrapper
/// layers propagate them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The named object store does not exist, or is outside the
    /// transaction's scope.
    #[error("no such object store: {store}")]
    NotFound {
        /// Name of the missing store.
        store: String,
    },

    /// A uniqueness constraint was violated (duplicate key on add, store or
    /// index already exists).
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violated constraint.
        message: String,
    },

    /// A request was issued against a transaction that already committed or
    /// aborted.
    #[error("transaction inactive: {id} has already finished")]
    TransactionInactive {
        /// The finished transaction.
        id: TransactionId,
    },

    /// A write was issued against a read-only transaction.
    #[error("transaction {id} is read-only")]
    ReadOnly {
        /// The read-only transaction.
        id: TransactionId,
    },

    /// The requested version is lower than the stored one.
    #[error("cannot downgrade database {name} from version {current} to {requested}")]
    Version {
        /// Database name.
        name: String,
        /// Version asked for by the opener.
        requested: u64,
        /// Version currently stored.
        current: u64,
    },

    /// The operation is not allowed in the current state (closed connection,
    /// schema change outside an upgrade, ...).
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the operation is not allowed.
        message: String,
    },

    /// An argument was rejected before any work happened.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// The transaction was aborted; none of its writes were applied.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },

    /// A record could not be copied into or out of storage.
    #[error("data error: {0}")]
    Data(#[from] CodecError),
}

impl EngineError {
    /// Creates a not found error.
    pub fn not_found(store: impl Into<String>) -> Self {
        Self::NotFound {
            store: store.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Whether this error came from a failed request, which aborts the
    /// transaction unless the engine is configured otherwise.
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Constraint { .. } | Self::Data(_))
    }
}
