//! Database handle.

use crate::config::{BlockedCallback, BlockingCallback, OpenOptions};
use crate::error::{CoreError, CoreResult};
use crate::schema::{Schema, StoreDef};
use crate::transaction::{run, Stores};
use crate::upgrade::Upgrade;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use stepvault_engine::{Connection, Factory, OpenHandlers, TransactionMode, VersionChange};

/// An open connection to a database of schema `S`.
///
/// Handles are cheap to clone and share one connection. The connection
/// lives until [`Database::close`] is called; dropping handles does not
/// close it.
///
/// # Auto-commit
///
/// Transactions commit on their own as soon as the callback driving them
/// awaits something other than a store operation (a timer, a channel,
/// another task). Store operations issued after that point fail with the
/// engine's "transaction inactive" error. Keep each callback to a straight
/// run of store operations.
pub struct Database<S: Schema> {
    conn: Connection,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Clone for Database<S> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            _schema: PhantomData,
        }
    }
}

impl<S: Schema> Database<S> {
    /// Opens `name` at `version`.
    ///
    /// - Opening above the stored version runs the upgrade callback once,
    ///   inside the version change transaction. If it fails, the open fails,
    ///   the version change is rolled back and the connection is closed.
    /// - Opening below the stored version fails with the engine's version
    ///   error.
    /// - If older connections stay open, the blocked callback runs; without
    ///   one the open fails with [`CoreError::Blocked`].
    ///
    /// # Errors
    ///
    /// Also fails with [`CoreError::UnknownDatabase`] if the schema does not
    /// list `name`.
    pub async fn open(
        factory: &Factory,
        name: &str,
        version: u64,
        options: OpenOptions<S>,
    ) -> CoreResult<Self> {
        if !S::allows_database(name) {
            return Err(CoreError::unknown_database(name));
        }
        let OpenOptions {
            upgrade,
            blocked,
            blocking,
            auto_close_on_blocking,
        } = options;

        let mut handlers = OpenHandlers::<CoreError>::new();
        if let Some(upgrade) = upgrade {
            handlers = handlers.upgrade(move |conn, txn, change| {
                tracing::debug!(
                    database = conn.name(),
                    old_version = change.old_version,
                    new_version = ?change.new_version,
                    "running upgrade callback"
                );
                upgrade(Upgrade::new(conn, txn, change))
            });
        }
        let blocked = blocked_or_reject(name, blocked);
        handlers = handlers.on_blocked(move |change| blocked(change));
        if blocking.is_some() || auto_close_on_blocking {
            handlers =
                handlers.on_versionchange(blocking_handler(blocking, auto_close_on_blocking));
        }

        let conn = factory.open(name, version, handlers).await?;
        tracing::debug!(database = name, version, "database opened");
        Ok(Self {
            conn,
            _schema: PhantomData,
        })
    }

    /// Deletes the database `name`, returning the version it had.
    ///
    /// Open connections are negotiated with as for an upgrade: their
    /// blocking callbacks run, and `options`' blocked callback runs if they
    /// stay open. Only the blocked callback of `options` is used.
    pub async fn delete_database(
        factory: &Factory,
        name: &str,
        options: OpenOptions<S>,
    ) -> CoreResult<u64> {
        if !S::allows_database(name) {
            return Err(CoreError::unknown_database(name));
        }
        let blocked = blocked_or_reject(name, options.blocked);
        factory.delete_database(name, Some(blocked)).await
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.conn.name()
    }

    /// Version the connection was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.conn.version()
    }

    /// Stores that currently exist.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.conn.store_names()
    }

    /// Whether [`Database::close`] was called (or the connection was closed
    /// for a newer version).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// The engine connection underneath.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection once its running transactions finish.
    ///
    /// Idempotent; nothing signals when the close completes.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Runs `callback` in one transaction over `store_names`, then waits for
    /// the transaction to complete.
    ///
    /// Errors from the callback or from the completion are returned as-is.
    /// A callback error aborts the transaction if it is still active. See
    /// the type-level docs for the auto-commit hazard.
    pub async fn transaction<T, E, F, Fut>(
        &self,
        store_names: &[&str],
        mode: TransactionMode,
        callback: F,
    ) -> Result<T, E>
    where
        E: From<CoreError>,
        F: FnOnce(Stores) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let txn = self
            .conn
            .transaction(store_names, mode)
            .map_err(CoreError::from)?;
        run(txn, store_names, self.max_depth(), callback).await
    }

    /// Reads one record of `D`.
    pub async fn get<D: StoreDef<Schema = S>>(&self, key: &D::Key) -> CoreResult<Option<D::Value>> {
        self.transaction(&[D::NAME], TransactionMode::ReadOnly, |stores| async move {
            let store = stores.store::<D>()?;
            store.get(key).await
        })
        .await
    }

    /// Creates or replaces one record of `D`.
    pub async fn put<D: StoreDef<Schema = S>>(
        &self,
        key: &D::Key,
        value: &D::Value,
    ) -> CoreResult<D::Key> {
        self.transaction(&[D::NAME], TransactionMode::ReadWrite, |stores| async move {
            let store = stores.store::<D>()?;
            store.put(key, value).await
        })
        .await
    }

    /// Creates one record of `D`; fails with the engine's constraint error
    /// if the key exists.
    pub async fn add<D: StoreDef<Schema = S>>(
        &self,
        key: &D::Key,
        value: &D::Value,
    ) -> CoreResult<D::Key> {
        self.transaction(&[D::NAME], TransactionMode::ReadWrite, |stores| async move {
            let store = stores.store::<D>()?;
            store.add(key, value).await
        })
        .await
    }

    /// Deletes one record of `D`.
    pub async fn delete<D: StoreDef<Schema = S>>(&self, key: &D::Key) -> CoreResult<()> {
        self.transaction(&[D::NAME], TransactionMode::ReadWrite, |stores| async move {
            let store = stores.store::<D>()?;
            store.delete(key).await
        })
        .await
    }

    fn max_depth(&self) -> usize {
        self.conn.config().max_object_depth
    }
}

impl<S: Schema> fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.conn.name())
            .field("version", &self.conn.version())
            .finish_non_exhaustive()
    }
}

/// The caller's blocked callback, or one that fails the open.
fn blocked_or_reject(name: &str, blocked: Option<BlockedCallback>) -> BlockedCallback {
    let name = name.to_string();
    Box::new(move |change: VersionChange| {
        tracing::warn!(
            database = %name,
            old_version = change.old_version,
            new_version = ?change.new_version,
            "open blocked by an existing connection"
        );
        match blocked {
            Some(callback) => callback(change),
            None => async move { Err(CoreError::blocked(name)) }.boxed(),
        }
    })
}

/// Version change handler for a connection: runs the blocking callback,
/// logging its failure, then closes the connection if asked to.
fn blocking_handler(
    blocking: Option<BlockingCallback>,
    auto_close: bool,
) -> impl Fn(&Connection, VersionChange) + Send + Sync + 'static {
    move |conn: &Connection, change: VersionChange| {
        if let Some(callback) = &blocking {
            if let Err(err) = callback(change) {
                tracing::warn!(
                    database = conn.name(),
                    connection = %conn.id(),
                    error = %err,
                    "blocking callback failed"
                );
            }
        }
        if auto_close {
            tracing::info!(
                database = conn.name(),
                connection = %conn.id(),
                "closing connection for a newer version"
            );
            conn.close();
        }
    }
}
