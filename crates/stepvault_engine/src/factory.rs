//! Opening, upgrading and deleting databases.

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::error::EngineError;
use crate::state::{wake, ConnectionEntry, Shared};
use crate::transaction::{AutoCommit, Rollback, Transaction};
use crate::types::{TransactionMode, VersionChange, VersionChangeHandler};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Runs inside the version change transaction of an open.
pub type UpgradeHandler<E> = Box<
    dyn FnOnce(Connection, Transaction, VersionChange) -> BoxFuture<'static, Result<(), E>> + Send,
>;

/// Runs once when a version change or deletion is held up by open
/// connections that did not close on notification.
pub type BlockedHandler<E> =
    Box<dyn FnOnce(VersionChange) -> BoxFuture<'static, Result<(), E>> + Send>;

/// Callbacks supplied to [`Factory::open`].
///
/// `E` is the caller's error type. Errors returned by the handlers abort
/// the open and come back unchanged.
pub struct OpenHandlers<E> {
    upgrade: Option<UpgradeHandler<E>>,
    on_blocked: Option<BlockedHandler<E>>,
    on_versionchange: Option<VersionChangeHandler>,
}

impl<E> Default for OpenHandlers<E> {
    fn default() -> Self {
        Self {
            upgrade: None,
            on_blocked: None,
            on_versionchange: None,
        }
    }
}

impl<E: 'static> OpenHandlers<E> {
    /// Creates handlers that do nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upgrade handler.
    #[must_use]
    pub fn upgrade<F, Fut>(mut self, handler: F) -> Self
    where
        F: FnOnce(Connection, Transaction, VersionChange) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.upgrade = Some(Box::new(move |conn, txn, change| {
            handler(conn, txn, change).boxed()
        }));
        self
    }

    /// Sets the blocked handler.
    #[must_use]
    pub fn on_blocked<F, Fut>(mut self, handler: F) -> Self
    where
        F: FnOnce(VersionChange) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.on_blocked = Some(Box::new(move |change| handler(change).boxed()));
        self
    }

    /// Sets the handler installed on the new connection for later version
    /// change notifications.
    #[must_use]
    pub fn on_versionchange<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Connection, VersionChange) + Send + Sync + 'static,
    {
        self.on_versionchange = Some(Arc::new(handler));
        self
    }
}

/// A database that exists in the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Current version.
    pub version: u64,
}

/// Entry point to the engine: the set of all named databases.
///
/// Cloning shares the same databases.
#[derive(Clone)]
pub struct Factory {
    shared: Arc<Shared>,
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl Factory {
    /// Creates an empty engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty engine with a custom configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Lists existing databases, sorted by name.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        let state = self.shared.state.lock();
        let mut list: Vec<DatabaseInfo> = state
            .databases
            .iter()
            .filter(|(_, db)| db.version > 0)
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                version: db.version,
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Opens a connection to `name` at `version`, creating or upgrading the
    /// database as needed.
    ///
    /// When `version` is above the stored version, every other open
    /// connection is sent a version change notification, the blocked
    /// handler runs once if any of them stays open, and the open waits until
    /// they have all closed. The upgrade handler then runs inside a version
    /// change transaction that auto-commits like any other.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] if `version` is 0
    /// - [`EngineError::Version`] if `version` is below the stored version
    /// - [`EngineError::Aborted`] if the version change transaction aborted
    /// - any error returned by the blocked or upgrade handler
    pub async fn open<E>(
        &self,
        name: &str,
        version: u64,
        handlers: OpenHandlers<E>,
    ) -> Result<Connection, E>
    where
        E: From<EngineError>,
    {
        if version == 0 {
            return Err(EngineError::invalid_argument("version must be at least 1").into());
        }
        let OpenHandlers {
            upgrade,
            on_blocked,
            on_versionchange,
        } = handlers;

        let current = loop {
            let waiter = {
                let mut state = self.shared.state.lock();
                let db = state.databases.entry(name.to_string()).or_default();
                if db.upgrading {
                    db.wait()
                } else {
                    let current = db.version;
                    if version < current {
                        return Err(EngineError::Version {
                            name: name.to_string(),
                            requested: version,
                            current,
                        }
                        .into());
                    }
                    if version > current {
                        db.upgrading = true;
                        break current;
                    }

                    let id = state.next_connection_id();
                    let mut entry = ConnectionEntry::new(version);
                    entry.on_versionchange = on_versionchange;
                    state
                        .databases
                        .entry(name.to_string())
                        .or_default()
                        .connections
                        .insert(id, entry);
                    tracing::debug!(
                        database = name,
                        connection = %id,
                        version,
                        "connection opened"
                    );
                    return Ok(Connection::new(Arc::clone(&self.shared), name, id, version));
                }
            };
            let _ = waiter.await;
        };

        let change = VersionChange {
            old_version: current,
            new_version: Some(version),
        };
        if let Err(err) = self.negotiate(name, change, on_blocked).await {
            self.cancel_version_change(name);
            return Err(err);
        }

        let (conn, txn) = {
            let mut state = self.shared.state.lock();
            let id = state.next_connection_id();
            let txn_id = state.next_transaction_id();
            let db = state.databases.entry(name.to_string()).or_default();
            let rollback = Rollback {
                version: db.version,
                stores: db.stores.clone(),
            };
            db.version = version;

            let mut entry = ConnectionEntry::new(version);
            entry.in_upgrade = true;
            entry.active_transactions = 1;
            entry.on_versionchange = on_versionchange;
            db.connections.insert(id, entry);

            let conn = Connection::new(Arc::clone(&self.shared), name, id, version);
            let txn = Transaction::new(
                Arc::clone(&self.shared),
                Arc::from(name),
                id,
                txn_id,
                TransactionMode::VersionChange,
                None,
                Some(rollback),
            );
            (conn, txn)
        };
        tracing::info!(
            database = name,
            old_version = current,
            new_version = version,
            "upgrade started"
        );

        if let Some(handler) = upgrade {
            let future = handler(conn.clone(), txn.clone(), change);
            if let Err(err) = AutoCommit::new(txn.clone(), future).await {
                txn.abort("upgrade handler failed");
                conn.close();
                return Err(err);
            }
        }
        if let Err(err) = txn.done().await {
            tracing::warn!(database = name, error = %err, "upgrade transaction aborted");
            conn.close();
            return Err(err.into());
        }

        tracing::info!(database = name, version, "upgrade finished");
        Ok(conn)
    }

    /// Deletes a database, returning the version it had (0 if it did not
    /// exist).
    ///
    /// Open connections are negotiated with exactly as for an upgrade; their
    /// notification carries `new_version: None`.
    ///
    /// # Errors
    ///
    /// Returns any error produced by the blocked handler.
    pub async fn delete_database<E>(
        &self,
        name: &str,
        on_blocked: Option<BlockedHandler<E>>,
    ) -> Result<u64, E>
    where
        E: From<EngineError>,
    {
        let current = loop {
            let waiter = {
                let mut state = self.shared.state.lock();
                let Some(db) = state.databases.get_mut(name) else {
                    return Ok(0);
                };
                if db.upgrading {
                    db.wait()
                } else {
                    db.upgrading = true;
                    break db.version;
                }
            };
            let _ = waiter.await;
        };

        let change = VersionChange {
            old_version: current,
            new_version: None,
        };
        if let Err(err) = self.negotiate(name, change, on_blocked).await {
            self.cancel_version_change(name);
            return Err(err);
        }

        let waiters = {
            let mut state = self.shared.state.lock();
            state
                .databases
                .remove(name)
                .map(|mut db| db.take_waiters())
                .unwrap_or_default()
        };
        wake(waiters);
        tracing::info!(database = name, version = current, "database deleted");
        Ok(current)
    }

    /// Notifies open connections of `change` and waits until all of them
    /// are gone. The blocked handler runs at most once, and only while some
    /// connection has not even requested to close.
    async fn negotiate<E>(
        &self,
        name: &str,
        change: VersionChange,
        mut on_blocked: Option<BlockedHandler<E>>,
    ) -> Result<(), E> {
        let notify: Vec<(Connection, VersionChangeHandler)> = {
            let state = self.shared.state.lock();
            state
                .databases
                .get(name)
                .map(|db| {
                    db.connections
                        .iter()
                        .filter(|(_, entry)| !entry.closing)
                        .filter_map(|(id, entry)| {
                            let handler = entry.on_versionchange.clone()?;
                            let conn = Connection::new(
                                Arc::clone(&self.shared),
                                name,
                                *id,
                                entry.version,
                            );
                            Some((conn, handler))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        for (conn, handler) in notify {
            tracing::debug!(database = name, connection = %conn.id(), "sending version change");
            handler(&conn, change);
        }

        loop {
            let (waiter, still_open) = {
                let mut state = self.shared.state.lock();
                let Some(db) = state.databases.get_mut(name) else {
                    return Ok(());
                };
                if db.connections.is_empty() {
                    return Ok(());
                }
                let still_open = db.connections.values().any(|entry| !entry.closing);
                (db.wait(), still_open)
            };

            if still_open {
                if let Some(handler) = on_blocked.take() {
                    tracing::info!(
                        database = name,
                        old_version = change.old_version,
                        new_version = ?change.new_version,
                        "version change blocked by open connections"
                    );
                    handler(change).await?;
                    continue;
                }
            }
            let _ = waiter.await;
        }
    }

    fn cancel_version_change(&self, name: &str) {
        let waiters = {
            let mut state = self.shared.state.lock();
            match state.databases.get_mut(name) {
                Some(db) => {
                    db.upgrading = false;
                    db.take_waiters()
                }
                None => Vec::new(),
            }
        };
        wake(waiters);
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
