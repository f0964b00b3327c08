//! The auto-commit boundary.

use super::Transaction;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Drives a future that uses a transaction, committing the transaction the
/// first time the future yields.
///
/// Engine requests complete synchronously, so when the driven future
/// returns `Pending` it is waiting on something other than the engine, and
/// the transaction has no outstanding request: exactly the point where a host
/// engine auto-commits. Requests issued after that fail with
/// [`crate::EngineError::TransactionInactive`].
///
/// The output of the driven future is passed through untouched; finishing a
/// transaction that is still active once the future completes is left to
/// the caller.
pub struct AutoCommit<F> {
    transaction: Transaction,
    future: Pin<Box<F>>,
}

impl<F: Future> AutoCommit<F> {
    /// Wraps `future`, which must only use `transaction` within its own
    /// polls.
    pub fn new(transaction: Transaction, future: F) -> Self {
        Self {
            transaction,
            future: Box::pin(future),
        }
    }
}

impl<F: Future> Future for AutoCommit<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match this.future.as_mut().poll(cx) {
            Poll::Ready(output) => Poll::Ready(output),
            Poll::Pending => {
                this.transaction.auto_commit();
                Poll::Pending
            }
        }
    }
}
