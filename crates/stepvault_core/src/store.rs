//! Store accessors.
//!
//! A store accessor is bound to one transaction and is only usable while
//! that transaction is active; afterwards every operation fails with the
//! engine's "transaction inactive" error.
//!
//! Operations are `async` so callers await them like any other storage
//! request. They complete on first poll, which keeps the surrounding
//! transaction alive: only awaiting something else lets it auto-commit.

use crate::error::{CoreError, CoreResult};
use crate::schema::{StoreDef, StoreKey};
use std::fmt;
use std::marker::PhantomData;
use stepvault_codec::{from_value, to_value, Key, Value};
use stepvault_engine::{IndexOptions, Transaction};

/// Rejects values nesting more maps than `max` levels.
pub(crate) fn check_depth(value: &Value, max: usize) -> CoreResult<()> {
    let depth = value.object_depth();
    if depth > max {
        return Err(CoreError::NestingTooDeep { depth, max });
    }
    Ok(())
}

/// An untyped store accessor over [`Key`]s and [`Value`]s.
#[derive(Clone)]
pub struct RawStore {
    name: String,
    txn: Transaction,
    max_depth: usize,
}

impl RawStore {
    pub(crate) fn new(name: impl Into<String>, txn: Transaction, max_depth: usize) -> Self {
        Self {
            name: name.into(),
            txn,
            max_depth,
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads a record; `None` if the key is absent.
    pub async fn get(&self, key: &Key) -> CoreResult<Option<Value>> {
        Ok(self.txn.get(&self.name, key)?)
    }

    /// Creates or replaces a record.
    pub async fn put(&self, key: Key, value: &Value) -> CoreResult<Key> {
        check_depth(value, self.max_depth)?;
        Ok(self.txn.put(&self.name, key, value)?)
    }

    /// Creates a record; fails with a constraint error if the key exists.
    pub async fn add(&self, key: Key, value: &Value) -> CoreResult<Key> {
        check_depth(value, self.max_depth)?;
        Ok(self.txn.add(&self.name, key, value)?)
    }

    /// Deletes a record; absent keys are ignored.
    pub async fn delete(&self, key: &Key) -> CoreResult<()> {
        Ok(self.txn.delete(&self.name, key)?)
    }

    /// Number of records.
    pub async fn count(&self) -> CoreResult<usize> {
        Ok(self.txn.count(&self.name)?)
    }

    /// All records in key order.
    pub async fn get_all(&self) -> CoreResult<Vec<(Key, Value)>> {
        Ok(self.txn.get_all(&self.name)?)
    }

    /// All keys in order.
    pub async fn keys(&self) -> CoreResult<Vec<Key>> {
        Ok(self
            .txn
            .get_all(&self.name)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Deletes every record.
    pub async fn clear(&self) -> CoreResult<()> {
        Ok(self.txn.clear(&self.name)?)
    }

    /// Declares an index. Only stores obtained during an upgrade accept
    /// this; elsewhere the engine reports an invalid state.
    pub async fn create_index(
        &self,
        name: &str,
        key_path: &str,
        options: IndexOptions,
    ) -> CoreResult<()> {
        Ok(self
            .txn
            .create_index(&self.name, name, key_path, options)?)
    }

    /// Names of the declared indexes.
    pub async fn index_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.txn.index_names(&self.name)?)
    }
}

impl fmt::Debug for RawStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStore")
            .field("name", &self.name)
            .field("transaction", &self.txn.id())
            .finish()
    }
}

/// A store accessor typed by its [`StoreDef`].
pub struct Store<D: StoreDef> {
    raw: RawStore,
    _def: PhantomData<fn() -> D>,
}

impl<D: StoreDef> Clone for Store<D> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _def: PhantomData,
        }
    }
}

impl<D: StoreDef> Store<D> {
    pub(crate) fn new(raw: RawStore) -> Self {
        Self {
            raw,
            _def: PhantomData,
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// The untyped accessor underneath.
    #[must_use]
    pub fn raw(&self) -> &RawStore {
        &self.raw
    }

    /// Reads a record; `None` if the key is absent.
    pub async fn get(&self, key: &D::Key) -> CoreResult<Option<D::Value>> {
        match self.raw.get(&key.to_key()).await? {
            Some(value) => Ok(Some(from_value(&value)?)),
            None => Ok(None),
        }
    }

    /// Creates or replaces a record.
    pub async fn put(&self, key: &D::Key, value: &D::Value) -> CoreResult<D::Key> {
        let record = to_value(value)?;
        let key = self.raw.put(key.to_key(), &record).await?;
        D::Key::from_key(&key)
    }

    /// Creates a record; fails with a constraint error if the key exists.
    pub async fn add(&self, key: &D::Key, value: &D::Value) -> CoreResult<D::Key> {
        let record = to_value(value)?;
        let key = self.raw.add(key.to_key(), &record).await?;
        D::Key::from_key(&key)
    }

    /// Deletes a record; absent keys are ignored.
    pub async fn delete(&self, key: &D::Key) -> CoreResult<()> {
        self.raw.delete(&key.to_key()).await
    }

    /// Number of records.
    pub async fn count(&self) -> CoreResult<usize> {
        self.raw.count().await
    }

    /// All records in key order.
    pub async fn get_all(&self) -> CoreResult<Vec<(D::Key, D::Value)>> {
        self.raw
            .get_all()
            .await?
            .into_iter()
            .map(|(key, value)| -> CoreResult<(D::Key, D::Value)> {
                Ok((D::Key::from_key(&key)?, from_value(&value)?))
            })
            .collect()
    }

    /// All keys in order.
    pub async fn keys(&self) -> CoreResult<Vec<D::Key>> {
        self.raw
            .keys()
            .await?
            .iter()
            .map(D::Key::from_key)
            .collect()
    }

    /// Deletes every record.
    pub async fn clear(&self) -> CoreResult<()> {
        self.raw.clear().await
    }

    /// Declares an index. Only valid during an upgrade.
    pub async fn create_index(
        &self,
        name: &str,
        key_path: &str,
        options: IndexOptions,
    ) -> CoreResult<()> {
        self.raw.create_index(name, key_path, options).await
    }

    /// Names of the declared indexes.
    pub async fn index_names(&self) -> CoreResult<Vec<String>> {
        self.raw.index_names().await
    }
}

impl<D: StoreDef> fmt::Debug for Store<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Store").field(&self.raw).finish()
    }
}
