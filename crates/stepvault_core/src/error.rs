//! Error types for StepVault core.

use stepvault_codec::CodecError;
use stepvault_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in StepVault core operations.
///
/// Engine failures (missing store, constraint violation, inactive or
/// read-only transaction, downgrade) pass through untranslated as
/// [`CoreError::Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Error reported by the storage engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A value could not be mapped to or from a stored record.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An upgrade is held up by an open connection and no blocked handler
    /// was supplied.
    #[error("blocked by an existing connection with a different version: {name}")]
    Blocked {
        /// Database name.
        name: String,
    },

    /// The schema does not allow this database name.
    #[error("unknown database: {name}")]
    UnknownDatabase {
        /// Requested name.
        name: String,
    },

    /// A record nests maps deeper than allowed.
    #[error("record nests {depth} levels of objects, at most {max} are supported")]
    NestingTooDeep {
        /// Depth of the rejected value.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A caller-supplied callback failed.
    #[error("callback failed: {message}")]
    Callback {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a blocked error.
    pub fn blocked(name: impl Into<String>) -> Self {
        Self::Blocked { name: name.into() }
    }

    /// Creates an unknown database error.
    pub fn unknown_database(name: impl Into<String>) -> Self {
        Self::UnknownDatabase { name: name.into() }
    }

    /// Creates a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Returns the engine error, if this is one.
    #[must_use]
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }

    /// Whether this is the engine's "transaction inactive" condition.
    #[must_use]
    pub fn is_transaction_inactive(&self) -> bool {
        matches!(self, Self::Engine(EngineError::TransactionInactive { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_display_unchanged() {
        let engine = EngineError::not_found("users");
        let core = CoreError::from(engine.clone());
        assert_eq!(core.to_string(), engine.to_string());
        assert_eq!(core.as_engine(), Some(&engine));
    }

    #[test]
    fn blocked_message() {
        let err = CoreError::blocked("db");
        assert!(err
            .to_string()
            .starts_with("blocked by an existing connection with a different version"));
    }
}
