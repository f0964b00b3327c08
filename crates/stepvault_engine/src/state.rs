//! Shared engine state.
//!
//! Everything a [`crate::Factory`] knows lives behind one mutex. Lock order:
//! a transaction's own state lock may be held while taking this one, never
//! the other way around. Handlers supplied by callers are never invoked
//! with the lock held.

use crate::config::EngineConfig;
use crate::types::{ConnectionId, VersionChangeHandler};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use stepvault_codec::Key;

/// Options accepted when creating an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Whether indexed values must be unique.
    pub unique: bool,
    /// Whether array values produce one index entry per element.
    pub multi_entry: bool,
}

/// A declared index. The engine records indexes; it does not maintain them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique within its store.
    pub name: String,
    /// Field path the index reads.
    pub key_path: String,
    /// Index options.
    pub options: IndexOptions,
}

/// Committed contents of one object store.
#[derive(Debug, Clone, Default)]
pub(crate) struct ObjectStoreData {
    /// Records as canonical CBOR.
    pub(crate) records: BTreeMap<Key, Vec<u8>>,
    pub(crate) indexes: BTreeMap<String, IndexSpec>,
}

pub(crate) struct ConnectionEntry {
    pub(crate) version: u64,
    /// `close()` was requested; the entry goes away once transactions drain.
    pub(crate) closing: bool,
    pub(crate) active_transactions: usize,
    /// The connection's version change transaction is still running.
    pub(crate) in_upgrade: bool,
    pub(crate) on_versionchange: Option<VersionChangeHandler>,
}

impl ConnectionEntry {
    pub(crate) fn new(version: u64) -> Self {
        Self {
            version,
            closing: false,
            active_transactions: 0,
            in_upgrade: false,
            on_versionchange: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, ObjectStoreData>,
    pub(crate) connections: BTreeMap<ConnectionId, ConnectionEntry>,
    /// A version change or deletion owns the database.
    pub(crate) upgrading: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

impl DatabaseState {
    /// Registers interest in the next state change (a connection closing or a
    /// version change finishing).
    pub(crate) fn wait(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// Takes all waiters; the caller wakes them after releasing the lock.
    pub(crate) fn take_waiters(&mut self) -> Vec<oneshot::Sender<()>> {
        std::mem::take(&mut self.waiters)
    }

    /// Removes a connection entry if its close was requested and no
    /// transaction is running on it. Returns true if it was removed.
    pub(crate) fn finalize_close(&mut self, id: ConnectionId) -> bool {
        let ready = self
            .connections
            .get(&id)
            .is_some_and(|c| c.closing && c.active_transactions == 0);
        if ready {
            self.connections.remove(&id);
        }
        ready
    }
}

#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) databases: HashMap<String, DatabaseState>,
    next_connection: u64,
    next_transaction: u64,
}

impl EngineState {
    pub(crate) fn next_connection_id(&mut self) -> ConnectionId {
        self.next_connection += 1;
        ConnectionId::new(self.next_connection)
    }

    pub(crate) fn next_transaction_id(&mut self) -> crate::types::TransactionId {
        self.next_transaction += 1;
        crate::types::TransactionId::new(self.next_transaction)
    }
}

pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
}

impl Shared {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::default()),
        }
    }
}

/// Wakes waiters collected under the lock.
pub(crate) fn wake(waiters: Vec<oneshot::Sender<()>>) {
    for waiter in waiters {
        let _ = waiter.send(());
    }
}
