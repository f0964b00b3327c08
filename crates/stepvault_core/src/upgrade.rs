//! Upgrade context.

use crate::error::{CoreError, CoreResult};
use crate::schema::{Schema, StoreDef};
use crate::store::{RawStore, Store};
use crate::transaction::{run_within, Stores};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use stepvault_engine::{Connection, Transaction, VersionChange};

/// The scope of a schema upgrade.
///
/// Handed to the upgrade callback of [`crate::OpenOptions`]; creating and
/// deleting stores is only possible through it. Everything it does runs in
/// the upgrade's own version change transaction, which auto-commits once
/// the callback yields on anything but a store operation.
pub struct Upgrade<S: Schema> {
    conn: Connection,
    txn: Transaction,
    change: VersionChange,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Upgrade<S> {
    pub(crate) fn new(conn: Connection, txn: Transaction, change: VersionChange) -> Self {
        Self {
            conn,
            txn,
            change,
            _schema: PhantomData,
        }
    }

    /// Version stored before this upgrade (0 for a new database).
    #[must_use]
    pub fn old_version(&self) -> u64 {
        self.change.old_version
    }

    /// Version being opened.
    #[must_use]
    pub fn new_version(&self) -> Option<u64> {
        self.change.new_version
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.conn.name()
    }

    /// Stores that currently exist.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.txn.store_names()
    }

    /// Creates the store `D` along with its declared indexes.
    ///
    /// # Errors
    ///
    /// Fails with the engine's constraint error if the store exists.
    pub async fn create_store<D: StoreDef<Schema = S>>(&self) -> CoreResult<Store<D>> {
        let raw = self.create_raw_store(D::NAME).await?;
        for index in D::INDEXES {
            raw.create_index(index.name, index.key_path, index.options())
                .await?;
        }
        Ok(Store::new(raw))
    }

    /// Creates a store by name.
    pub async fn create_raw_store(&self, name: &str) -> CoreResult<RawStore> {
        self.txn.create_store(name)?;
        Ok(self.raw_store(name))
    }

    /// Deletes a store and its records.
    pub async fn delete_store(&self, name: &str) -> CoreResult<()> {
        Ok(self.txn.delete_store(name)?)
    }

    /// Accessor for an existing store `D`, bound to the upgrade transaction.
    #[must_use]
    pub fn store<D: StoreDef<Schema = S>>(&self) -> Store<D> {
        Store::new(self.raw_store(D::NAME))
    }

    /// Runs `callback` over `store_names` inside the upgrade transaction.
    ///
    /// No new transaction is opened, so this must run before the upgrade
    /// transaction auto-commits.
    pub async fn transaction<T, E, F, Fut>(&self, store_names: &[&str], callback: F) -> Result<T, E>
    where
        E: From<CoreError>,
        F: FnOnce(Stores) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        run_within(&self.txn, store_names, self.max_depth(), callback).await
    }

    fn raw_store(&self, name: &str) -> RawStore {
        RawStore::new(name, self.txn.clone(), self.max_depth())
    }

    fn max_depth(&self) -> usize {
        self.conn.config().max_object_depth
    }
}

impl<S: Schema> fmt::Debug for Upgrade<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrade")
            .field("name", &self.conn.name())
            .field("old_version", &self.change.old_version)
            .field("new_version", &self.change.new_version)
            .finish()
    }
}
