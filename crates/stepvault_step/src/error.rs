//! Error types for steps.

use stepvault_core::CoreError;
use thiserror::Error;

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Errors raised by steps and the orchestrator.
///
/// An incomplete submission is not an error: it is reported through the
/// step's incomplete-submit callback and [`crate::SubmitOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// Database or engine failure, passed through.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No step is registered under this slug.
    #[error("unknown step: {slug}")]
    UnknownSlug {
        /// Requested slug.
        slug: String,
    },

    /// The step has no component with this key.
    #[error("unknown component: {key}")]
    UnknownComponent {
        /// Requested component key.
        key: String,
    },

    /// Values are being loaded; changes would be overwritten.
    #[error("step is disabled while its stored values load")]
    Disabled,

    /// A database handle was already provided and a different one was set.
    #[error("the database handle cannot change once set")]
    HandleChanged,

    /// No database handle has been provided yet.
    #[error("no database is available yet")]
    NoDatabase,

    /// The orchestrator has no mounted step.
    #[error("no step is mounted")]
    NotMounted,
}

impl StepError {
    /// Creates an unknown slug error.
    pub fn unknown_slug(slug: impl Into<String>) -> Self {
        Self::UnknownSlug { slug: slug.into() }
    }

    /// Creates an unknown component error.
    pub fn unknown_component(key: impl Into<String>) -> Self {
        Self::UnknownComponent { key: key.into() }
    }
}
