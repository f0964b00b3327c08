//! Transaction wrapper.
//!
//! Binds named stores to one engine transaction, runs a callback with them
//! and then waits for the transaction to complete. Errors from either the
//! callback or the completion are returned unchanged.

use crate::error::{CoreError, CoreResult};
use crate::schema::StoreDef;
use crate::store::{RawStore, Store};
use std::collections::BTreeMap;
use std::future::Future;
use stepvault_engine::{AutoCommit, EngineError, Transaction};

/// The stores a transaction callback may use, by name.
#[derive(Debug, Clone)]
pub struct Stores {
    txn: Transaction,
    stores: BTreeMap<String, RawStore>,
}

impl Stores {
    pub(crate) fn new(txn: Transaction, names: &[&str], max_depth: usize) -> Self {
        let stores = names
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    RawStore::new(*name, txn.clone(), max_depth),
                )
            })
            .collect();
        Self { txn, stores }
    }

    /// Untyped accessor for `name`.
    ///
    /// # Errors
    ///
    /// Fails with the engine's "no such object store" error if `name` was not
    /// part of the transaction's store names.
    pub fn raw(&self, name: &str) -> CoreResult<RawStore> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::from(EngineError::not_found(name)))
    }

    /// Typed accessor for `D`.
    pub fn store<D: StoreDef>(&self) -> CoreResult<Store<D>> {
        self.raw(D::NAME).map(Store::new)
    }

    /// Store names in this mapping.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// The engine transaction underneath.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }
}

/// Runs `callback` against a fresh transaction and waits for it to finish.
///
/// The callback is driven under [`AutoCommit`]: if it awaits anything other
/// than a store operation, the transaction commits at that point and later
/// operations fail. A callback error aborts a still-active transaction.
pub(crate) async fn run<T, E, F, Fut>(
    txn: Transaction,
    names: &[&str],
    max_depth: usize,
    callback: F,
) -> Result<T, E>
where
    E: From<CoreError>,
    F: FnOnce(Stores) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let stores = Stores::new(txn.clone(), names, max_depth);
    let result = AutoCommit::new(txn.clone(), callback(stores)).await;
    match result {
        Ok(value) => {
            txn.done().await.map_err(CoreError::from)?;
            Ok(value)
        }
        Err(err) => {
            if txn.is_active() {
                txn.abort("transaction callback failed");
            }
            Err(err)
        }
    }
}

/// Runs `callback` inside an already running transaction (an upgrade's).
///
/// Completion belongs to whoever started the transaction, so this only
/// checks that the transaction was not aborted along the way.
pub(crate) async fn run_within<T, E, F, Fut>(
    txn: &Transaction,
    names: &[&str],
    max_depth: usize,
    callback: F,
) -> Result<T, E>
where
    E: From<CoreError>,
    F: FnOnce(Stores) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let stores = Stores::new(txn.clone(), names, max_depth);
    match callback(stores).await {
        Ok(value) => {
            if txn.status() == stepvault_engine::TransactionStatus::Aborted {
                return Err(CoreError::from(EngineError::aborted(
                    "the upgrade transaction was aborted",
                ))
                .into());
            }
            Ok(value)
        }
        Err(err) => {
            if txn.is_active() {
                txn.abort("upgrade transaction callback failed");
            }
            Err(err)
        }
    }
}
