//! Auto-committing transactions.
//!
//! A transaction buffers its writes and applies them atomically when it
//! commits. It commits either explicitly, when its completion is awaited, or
//! automatically as soon as the code driving it yields to the scheduler
//! (see [`AutoCommit`]).

mod autocommit;
mod state;

pub use autocommit::AutoCommit;
pub use state::Transaction;
pub(crate) use state::Rollback;

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Requests are accepted.
    Active,
    /// Writes were applied.
    Committed,
    /// Writes were discarded.
    Aborted,
}
