//! Open database connections.

use crate::error::{EngineError, EngineResult};
use crate::state::{wake, Shared};
use crate::transaction::Transaction;
use crate::types::{ConnectionId, TransactionMode, VersionChangeHandler};
use crate::EngineConfig;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A handle to one open connection.
///
/// Cloning the handle does not open another connection; every clone refers
/// to the same one.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    name: Arc<str>,
    id: ConnectionId,
    version: u64,
}

impl Connection {
    pub(crate) fn new(shared: Arc<Shared>, name: &str, id: ConnectionId, version: u64) -> Self {
        Self {
            shared,
            name: Arc::from(name),
            id,
            version,
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Version this connection was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Whether `close()` has been requested (or the connection is gone).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let state = self.shared.state.lock();
        state
            .databases
            .get(&*self.name)
            .and_then(|db| db.connections.get(&self.id))
            .map_or(true, |entry| entry.closing)
    }

    /// Names of the object stores currently in the database.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state
            .databases
            .get(&*self.name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Installs the handler notified when another opener wants a version
    /// change.
    pub fn set_versionchange_handler(&self, handler: VersionChangeHandler) {
        let mut state = self.shared.state.lock();
        if let Some(entry) = state
            .databases
            .get_mut(&*self.name)
            .and_then(|db| db.connections.get_mut(&self.id))
        {
            entry.on_versionchange = Some(handler);
        }
    }

    /// Requests the connection to close.
    ///
    /// New transactions are refused immediately; the connection actually
    /// goes away once its running transactions finish. Closing twice is a
    /// no-op. Nothing signals completion.
    pub fn close(&self) {
        let waiters = {
            let mut state = self.shared.state.lock();
            let Some(db) = state.databases.get_mut(&*self.name) else {
                return;
            };
            match db.connections.get_mut(&self.id) {
                Some(entry) if !entry.closing => entry.closing = true,
                _ => return,
            }
            if db.finalize_close(self.id) {
                tracing::info!(database = %self.name, connection = %self.id, "connection closed");
                db.take_waiters()
            } else {
                tracing::debug!(
                    database = %self.name,
                    connection = %self.id,
                    "close deferred until transactions finish"
                );
                Vec::new()
            }
        };
        wake(waiters);
    }

    /// Starts a transaction over the given stores.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidState`] if the connection is closing or its
    ///   upgrade is still running, or `mode` is `VersionChange`
    /// - [`EngineError::InvalidArgument`] if `store_names` is empty
    /// - [`EngineError::NotFound`] if a store does not exist
    pub fn transaction(
        &self,
        store_names: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Transaction> {
        if mode == TransactionMode::VersionChange {
            return Err(EngineError::invalid_state(
                "version change transactions are only created by an upgrade",
            ));
        }
        if store_names.is_empty() {
            return Err(EngineError::invalid_argument(
                "transaction scope must name at least one store",
            ));
        }

        let mut state = self.shared.state.lock();
        let id = state.next_transaction_id();
        let db = state
            .databases
            .get_mut(&*self.name)
            .ok_or_else(|| EngineError::invalid_state("database was deleted"))?;

        for store in store_names {
            if !db.stores.contains_key(*store) {
                return Err(EngineError::not_found(*store));
            }
        }

        let entry = db
            .connections
            .get_mut(&self.id)
            .filter(|entry| !entry.closing)
            .ok_or_else(|| EngineError::invalid_state("the connection is closing"))?;
        if entry.in_upgrade {
            return Err(EngineError::invalid_state(
                "an upgrade is running on this connection",
            ));
        }
        entry.active_transactions += 1;

        let scope: BTreeSet<String> = store_names.iter().map(|s| (*s).to_string()).collect();
        tracing::debug!(
            database = %self.name,
            transaction = %id,
            ?mode,
            stores = ?scope,
            "transaction started"
        );

        drop(state);
        Ok(Transaction::new(
            Arc::clone(&self.shared),
            self.name.clone(),
            self.id,
            id,
            mode,
            Some(scope),
            None,
        ))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
