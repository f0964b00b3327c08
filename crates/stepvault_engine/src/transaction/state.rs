//! Transaction state and requests.

use super::TransactionStatus;
use crate::error::{EngineError, EngineResult};
use crate::state::{wake, DatabaseState, IndexOptions, IndexSpec, ObjectStoreData, Shared};
use crate::types::{ConnectionId, TransactionId, TransactionMode};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use stepvault_codec::{from_cbor, to_canonical_cbor, Key, Value};

/// Database contents to restore if a version change aborts.
pub(crate) struct Rollback {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, ObjectStoreData>,
}

/// A buffered write.
#[derive(Debug, Clone)]
enum PendingWrite {
    /// Insert or replace a record (canonical CBOR bytes).
    Put(Vec<u8>),
    Delete,
}

struct TxnState {
    status: TransactionStatus,
    abort_reason: Option<String>,
    /// Pending writes: (store, key) -> write.
    writes: BTreeMap<(String, Key), PendingWrite>,
    /// Stores cleared by this transaction; committed records are hidden.
    cleared: BTreeSet<String>,
    /// First failed request. It aborts the transaction on completion.
    failure: Option<EngineError>,
    rollback: Option<Rollback>,
}

struct TxnInner {
    shared: Arc<Shared>,
    db_name: Arc<str>,
    connection: ConnectionId,
    id: TransactionId,
    mode: TransactionMode,
    /// `None` means every store in the database (version change).
    scope: Option<BTreeSet<String>>,
    state: Mutex<TxnState>,
}

/// A transaction over a set of object stores.
///
/// Handles are cheap to clone; all clones refer to the same transaction.
/// Every request checks that the transaction is still active, that the
/// mode allows it, and that the store is in scope and exists.
///
/// Dropping the last handle of an active transaction commits it.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxnInner>,
}

impl Transaction {
    pub(crate) fn new(
        shared: Arc<Shared>,
        db_name: Arc<str>,
        connection: ConnectionId,
        id: TransactionId,
        mode: TransactionMode,
        scope: Option<BTreeSet<String>>,
        rollback: Option<Rollback>,
    ) -> Self {
        Self {
            inner: Arc::new(TxnInner {
                shared,
                db_name,
                connection,
                id,
                mode,
                scope,
                state: Mutex::new(TxnState {
                    status: TransactionStatus::Active,
                    abort_reason: None,
                    writes: BTreeMap::new(),
                    cleared: BTreeSet::new(),
                    failure: None,
                    rollback,
                }),
            }),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.inner.state.lock().status
    }

    /// Checks if the transaction still accepts requests.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Store names this transaction may touch.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        match &self.inner.scope {
            Some(scope) => scope.iter().cloned().collect(),
            None => self
                .inner
                .with_db(|db| db.stores.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Reads a record. A missing key is `Ok(None)`.
    pub fn get(&self, store: &str, key: &Key) -> EngineResult<Option<Value>> {
        let txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, false)?;

        let bytes = match txn.writes.get(&(store.to_string(), key.clone())) {
            Some(PendingWrite::Put(bytes)) => Some(bytes.clone()),
            Some(PendingWrite::Delete) => None,
            None if txn.cleared.contains(store) => None,
            None => self
                .inner
                .with_db(|db| {
                    db.stores
                        .get(store)
                        .and_then(|s| s.records.get(key))
                        .cloned()
                })
                .flatten(),
        };
        drop(txn);

        Ok(bytes.map(|b| from_cbor(&b)).transpose()?)
    }

    /// Reads every record of a store, in key order.
    pub fn get_all(&self, store: &str) -> EngineResult<Vec<(Key, Value)>> {
        let txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, false)?;

        let mut merged: BTreeMap<Key, Vec<u8>> = if txn.cleared.contains(store) {
            BTreeMap::new()
        } else {
            self.inner
                .with_db(|db| db.stores.get(store).map(|s| s.records.clone()))
                .flatten()
                .unwrap_or_default()
        };
        for ((write_store, key), write) in &txn.writes {
            if write_store != store {
                continue;
            }
            match write {
                PendingWrite::Put(bytes) => {
                    merged.insert(key.clone(), bytes.clone());
                }
                PendingWrite::Delete => {
                    merged.remove(key);
                }
            }
        }
        drop(txn);

        merged
            .into_iter()
            .map(|(k, b)| -> EngineResult<(Key, Value)> { Ok((k, from_cbor(&b)?)) })
            .collect()
    }

    /// Counts the records of a store.
    pub fn count(&self, store: &str) -> EngineResult<usize> {
        Ok(self.get_all(store)?.len())
    }

    /// Inserts or replaces a record, returning its key.
    pub fn put(&self, store: &str, key: Key, value: &Value) -> EngineResult<Key> {
        let mut txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, true)?;
        let bytes = encode(&mut txn, value)?;
        txn.writes
            .insert((store.to_string(), key.clone()), PendingWrite::Put(bytes));
        Ok(key)
    }

    /// Inserts a record, failing with [`EngineError::Constraint`] if the key
    /// is already present. The failure also aborts the transaction when it
    /// finishes.
    pub fn add(&self, store: &str, key: Key, value: &Value) -> EngineResult<Key> {
        let mut txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, true)?;

        let exists = match txn.writes.get(&(store.to_string(), key.clone())) {
            Some(PendingWrite::Put(_)) => true,
            Some(PendingWrite::Delete) => false,
            None if txn.cleared.contains(store) => false,
            None => self
                .inner
                .with_db(|db| {
                    db.stores
                        .get(store)
                        .is_some_and(|s| s.records.contains_key(&key))
                })
                .unwrap_or(false),
        };
        if exists {
            let err = EngineError::constraint(format!(
                "key {key} already exists in object store {store}"
            ));
            txn.failure.get_or_insert_with(|| err.clone());
            return Err(err);
        }

        let bytes = encode(&mut txn, value)?;
        txn.writes
            .insert((store.to_string(), key.clone()), PendingWrite::Put(bytes));
        Ok(key)
    }

    /// Deletes a record; deleting a missing key is a no-op.
    pub fn delete(&self, store: &str, key: &Key) -> EngineResult<()> {
        let mut txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, true)?;
        txn.writes
            .insert((store.to_string(), key.clone()), PendingWrite::Delete);
        Ok(())
    }

    /// Deletes every record of a store.
    pub fn clear(&self, store: &str) -> EngineResult<()> {
        let mut txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, true)?;
        txn.writes.retain(|(s, _), _| s != store);
        txn.cleared.insert(store.to_string());
        Ok(())
    }

    /// Creates an object store. Only allowed in a version change transaction.
    pub fn create_store(&self, name: &str) -> EngineResult<()> {
        let txn = self.inner.state.lock();
        self.inner.check_schema_change(&txn)?;
        self.inner
            .with_db_mut(|db| {
                if db.stores.contains_key(name) {
                    return Err(EngineError::constraint(format!(
                        "object store {name} already exists"
                    )));
                }
                db.stores.insert(name.to_string(), ObjectStoreData::default());
                Ok(())
            })
            .ok_or_else(database_gone)??;
        tracing::debug!(database = %self.inner.db_name, store = name, "object store created");
        Ok(())
    }

    /// Deletes an object store and everything in it. Only allowed in a
    /// version change transaction.
    pub fn delete_store(&self, name: &str) -> EngineResult<()> {
        let mut txn = self.inner.state.lock();
        self.inner.check_schema_change(&txn)?;
        let removed = self
            .inner
            .with_db_mut(|db| db.stores.remove(name).is_some())
            .ok_or_else(database_gone)?;
        if !removed {
            return Err(EngineError::not_found(name));
        }
        txn.writes.retain(|(s, _), _| s != name);
        txn.cleared.remove(name);
        tracing::debug!(database = %self.inner.db_name, store = name, "object store deleted");
        Ok(())
    }

    /// Declares an index. Only allowed in a version change transaction.
    pub fn create_index(
        &self,
        store: &str,
        name: &str,
        key_path: &str,
        options: IndexOptions,
    ) -> EngineResult<()> {
        let txn = self.inner.state.lock();
        self.inner.check_schema_change(&txn)?;
        self.inner
            .with_db_mut(|db| {
                let data = db
                    .stores
                    .get_mut(store)
                    .ok_or_else(|| EngineError::not_found(store))?;
                if data.indexes.contains_key(name) {
                    return Err(EngineError::constraint(format!(
                        "index {name} already exists on object store {store}"
                    )));
                }
                data.indexes.insert(
                    name.to_string(),
                    IndexSpec {
                        name: name.to_string(),
                        key_path: key_path.to_string(),
                        options,
                    },
                );
                Ok(())
            })
            .ok_or_else(database_gone)?
    }

    /// Names of the indexes declared on a store.
    pub fn index_names(&self, store: &str) -> EngineResult<Vec<String>> {
        let txn = self.inner.state.lock();
        self.inner.check_request(&txn, store, false)?;
        drop(txn);
        Ok(self
            .inner
            .with_db(|db| {
                db.stores
                    .get(store)
                    .map(|s| s.indexes.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default())
    }

    /// Commits the transaction.
    ///
    /// Committing an already committed transaction is a no-op. If a request
    /// failed earlier, the transaction aborts instead and this returns
    /// [`EngineError::Aborted`].
    pub fn commit(&self) -> EngineResult<()> {
        self.inner.commit()
    }

    /// Aborts the transaction, discarding its writes. Aborting a finished
    /// transaction is a no-op.
    pub fn abort(&self, reason: impl Into<String>) {
        let mut txn = self.inner.state.lock();
        if txn.status == TransactionStatus::Active {
            self.inner.abort_locked(&mut txn, reason.into());
        }
    }

    /// Waits for the transaction to finish and reports how it finished.
    ///
    /// Awaiting completion means the awaiting code issues no further request,
    /// so an active transaction commits here.
    pub async fn done(&self) -> EngineResult<()> {
        let status = self.status();
        match status {
            TransactionStatus::Active => self.inner.commit(),
            TransactionStatus::Committed => Ok(()),
            TransactionStatus::Aborted => Err(self.inner.state.lock().aborted_error()),
        }
    }

    /// Commits if still active, because the driving code yielded.
    pub(crate) fn auto_commit(&self) {
        if !self.is_active() {
            return;
        }
        tracing::debug!(
            database = %self.inner.db_name,
            transaction = %self.inner.id,
            "auto-committing after the driver yielded"
        );
        // A failed commit becomes an abort, which `done()` reports.
        let _ = self.inner.commit();
    }
}

impl TxnInner {
    fn commit(&self) -> EngineResult<()> {
        let mut txn = self.state.lock();
        match txn.status {
            TransactionStatus::Committed => return Ok(()),
            TransactionStatus::Aborted => return Err(txn.aborted_error()),
            TransactionStatus::Active => {}
        }

        if self.shared.config.abort_on_request_error {
            if let Some(failure) = txn.failure.clone() {
                self.abort_locked(&mut txn, format!("a request failed: {failure}"));
                return Err(txn.aborted_error());
            }
        }

        let writes = std::mem::take(&mut txn.writes);
        let cleared = std::mem::take(&mut txn.cleared);
        txn.rollback = None;
        txn.status = TransactionStatus::Committed;

        let count = writes.len();
        let waiters = self
            .with_db_mut(|db| {
                for store in &cleared {
                    if let Some(data) = db.stores.get_mut(store) {
                        data.records.clear();
                    }
                }
                for ((store, key), write) in writes {
                    let Some(data) = db.stores.get_mut(&store) else {
                        continue;
                    };
                    match write {
                        PendingWrite::Put(bytes) => {
                            data.records.insert(key, bytes);
                        }
                        PendingWrite::Delete => {
                            data.records.remove(&key);
                        }
                    }
                }
                self.release(db)
            })
            .unwrap_or_default();
        drop(txn);

        tracing::debug!(
            database = %self.db_name,
            transaction = %self.id,
            writes = count,
            "transaction committed"
        );
        wake(waiters);
        Ok(())
    }

    fn abort_locked(&self, txn: &mut TxnState, reason: String) {
        tracing::debug!(
            database = %self.db_name,
            transaction = %self.id,
            reason = %reason,
            "transaction aborted"
        );
        txn.status = TransactionStatus::Aborted;
        txn.abort_reason = Some(reason);
        txn.writes.clear();
        txn.cleared.clear();
        let rollback = txn.rollback.take();

        let waiters = self
            .with_db_mut(|db| {
                if let Some(rollback) = rollback {
                    db.version = rollback.version;
                    db.stores = rollback.stores;
                }
                self.release(db)
            })
            .unwrap_or_default();
        wake(waiters);
    }

    /// Detaches the transaction from its connection. Returns waiters to wake
    /// once every lock is released.
    fn release(&self, db: &mut DatabaseState) -> Vec<oneshot::Sender<()>> {
        let version_change = self.mode == TransactionMode::VersionChange;
        if let Some(entry) = db.connections.get_mut(&self.connection) {
            entry.active_transactions = entry.active_transactions.saturating_sub(1);
            if version_change {
                entry.in_upgrade = false;
            }
        }
        if version_change {
            db.upgrading = false;
        }
        let closed = db.finalize_close(self.connection);
        if closed {
            tracing::info!(
                database = %self.db_name,
                connection = %self.connection,
                "connection closed"
            );
        }
        if version_change || closed {
            db.take_waiters()
        } else {
            Vec::new()
        }
    }

    fn ensure_active(&self, txn: &TxnState) -> EngineResult<()> {
        if txn.status == TransactionStatus::Active {
            Ok(())
        } else {
            Err(EngineError::TransactionInactive { id: self.id })
        }
    }

    fn check_request(&self, txn: &TxnState, store: &str, write: bool) -> EngineResult<()> {
        self.ensure_active(txn)?;
        if write && !self.mode.is_writable() {
            return Err(EngineError::ReadOnly { id: self.id });
        }
        if let Some(scope) = &self.scope {
            if !scope.contains(store) {
                return Err(EngineError::not_found(store));
            }
        }
        let exists = self
            .with_db(|db| db.stores.contains_key(store))
            .unwrap_or(false);
        if !exists {
            return Err(EngineError::not_found(store));
        }
        Ok(())
    }

    fn check_schema_change(&self, txn: &TxnState) -> EngineResult<()> {
        self.ensure_active(txn)?;
        if self.mode == TransactionMode::VersionChange {
            Ok(())
        } else {
            Err(EngineError::invalid_state(
                "schema changes are only allowed during an upgrade",
            ))
        }
    }

    fn with_db<R>(&self, f: impl FnOnce(&DatabaseState) -> R) -> Option<R> {
        let state = self.shared.state.lock();
        state.databases.get(&*self.db_name).map(f)
    }

    fn with_db_mut<R>(&self, f: impl FnOnce(&mut DatabaseState) -> R) -> Option<R> {
        let mut state = self.shared.state.lock();
        state.databases.get_mut(&*self.db_name).map(f)
    }
}

impl TxnState {
    fn aborted_error(&self) -> EngineError {
        EngineError::aborted(
            self.abort_reason
                .clone()
                .unwrap_or_else(|| "transaction was aborted".to_string()),
        )
    }
}

impl Drop for TxnInner {
    fn drop(&mut self) {
        if self.state.get_mut().status == TransactionStatus::Active {
            let _ = self.commit();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn encode(txn: &mut TxnState, value: &Value) -> EngineResult<Vec<u8>> {
    to_canonical_cbor(value).map_err(|e| {
        let err = EngineError::from(e);
        txn.failure.get_or_insert_with(|| err.clone());
        err
    })
}

fn database_gone() -> EngineError {
    EngineError::invalid_state("database was deleted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::state::ConnectionEntry;

    fn setup(config: EngineConfig, stores: &[&str]) -> (Arc<Shared>, ConnectionId) {
        let shared = Arc::new(Shared::new(config));
        let mut state = shared.state.lock();
        let conn = state.next_connection_id();
        let db = state.databases.entry("db".to_string()).or_default();
        db.version = 1;
        for store in stores {
            db.stores
                .insert((*store).to_string(), ObjectStoreData::default());
        }
        db.connections.insert(conn, ConnectionEntry::new(1));
        drop(state);
        (shared, conn)
    }

    fn begin(shared: &Arc<Shared>, conn: ConnectionId, mode: TransactionMode) -> Transaction {
        let mut state = shared.state.lock();
        let id = state.next_transaction_id();
        if let Some(entry) = state
            .databases
            .get_mut("db")
            .and_then(|db| db.connections.get_mut(&conn))
        {
            entry.active_transactions += 1;
        }
        drop(state);
        let scope = (mode != TransactionMode::VersionChange)
            .then(|| ["users".to_string()].into_iter().collect());
        Transaction::new(
            Arc::clone(shared),
            Arc::from("db"),
            conn,
            id,
            mode,
            scope,
            None,
        )
    }

    #[test]
    fn writes_are_visible_inside_and_after_commit() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.put("users", Key::from(1), &Value::from("alice")).unwrap();
        assert_eq!(
            txn.get("users", &Key::from(1)).unwrap(),
            Some(Value::from("alice"))
        );
        txn.commit().unwrap();

        let read = begin(&shared, conn, TransactionMode::ReadOnly);
        assert_eq!(
            read.get("users", &Key::from(1)).unwrap(),
            Some(Value::from("alice"))
        );
        assert_eq!(read.count("users").unwrap(), 1);
    }

    #[test]
    fn abort_discards_writes() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.put("users", Key::from(1), &Value::from(1)).unwrap();
        txn.abort("test");
        assert_eq!(txn.status(), TransactionStatus::Aborted);

        let read = begin(&shared, conn, TransactionMode::ReadOnly);
        assert_eq!(read.get("users", &Key::from(1)).unwrap(), None);
    }

    #[test]
    fn requests_after_commit_are_inactive() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.commit().unwrap();
        assert!(matches!(
            txn.put("users", Key::from(1), &Value::Null),
            Err(EngineError::TransactionInactive { .. })
        ));
        // Committing twice is a no-op.
        txn.commit().unwrap();
    }

    #[test]
    fn read_only_rejects_writes() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadOnly);
        assert!(matches!(
            txn.delete("users", &Key::from(1)),
            Err(EngineError::ReadOnly { .. })
        ));
    }

    #[test]
    fn out_of_scope_store_is_not_found() {
        let (shared, conn) = setup(EngineConfig::default(), &["users", "posts"]);
        let txn = begin(&shared, conn, TransactionMode::ReadOnly);
        assert_eq!(
            txn.get("posts", &Key::from(1)),
            Err(EngineError::not_found("posts"))
        );
    }

    #[test]
    fn failed_add_aborts_on_commit() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.add("users", Key::from(1), &Value::from(1)).unwrap();
        let err = txn.add("users", Key::from(1), &Value::from(2)).unwrap_err();
        assert!(matches!(err, EngineError::Constraint { .. }));
        assert!(matches!(txn.commit(), Err(EngineError::Aborted { .. })));

        let read = begin(&shared, conn, TransactionMode::ReadOnly);
        assert_eq!(read.count("users").unwrap(), 0);
    }

    #[test]
    fn failed_add_commits_when_configured_lenient() {
        let config = EngineConfig::new().abort_on_request_error(false);
        let (shared, conn) = setup(config, &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.add("users", Key::from(1), &Value::from(1)).unwrap();
        assert!(txn.add("users", Key::from(1), &Value::from(2)).is_err());
        txn.commit().unwrap();

        let read = begin(&shared, conn, TransactionMode::ReadOnly);
        assert_eq!(read.count("users").unwrap(), 1);
    }

    #[test]
    fn clear_hides_committed_records() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.put("users", Key::from(1), &Value::from(1)).unwrap();
        txn.put("users", Key::from(2), &Value::from(2)).unwrap();
        txn.commit().unwrap();

        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        txn.clear("users").unwrap();
        txn.put("users", Key::from(3), &Value::from(3)).unwrap();
        let keys: Vec<Key> = txn
            .get_all("users")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![Key::from(3)]);
    }

    #[test]
    fn schema_changes_need_version_change() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        let txn = begin(&shared, conn, TransactionMode::ReadWrite);
        assert!(matches!(
            txn.create_store("posts"),
            Err(EngineError::InvalidState { .. })
        ));

        let upgrade = begin(&shared, conn, TransactionMode::VersionChange);
        upgrade.create_store("posts").unwrap();
        assert!(matches!(
            upgrade.create_store("posts"),
            Err(EngineError::Constraint { .. })
        ));
        upgrade
            .create_index("posts", "by_author", "author", IndexOptions::default())
            .unwrap();
        assert_eq!(upgrade.index_names("posts").unwrap(), vec!["by_author"]);
        assert_eq!(upgrade.store_names(), vec!["posts", "users"]);
    }

    #[test]
    fn dropping_an_active_transaction_commits() {
        let (shared, conn) = setup(EngineConfig::default(), &["users"]);
        {
            let txn = begin(&shared, conn, TransactionMode::ReadWrite);
            txn.put("users", Key::from(1), &Value::from(1)).unwrap();
        }
        let read = begin(&shared, conn, TransactionMode::ReadOnly);
        assert_eq!(read.count("users").unwrap(), 1);
    }
}
