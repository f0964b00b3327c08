//! Ambient database handle shared by the steps of a flow.

use crate::error::{StepError, StepResult};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use stepvault_core::{Database, Schema};

struct SlotState<S: Schema> {
    db: Option<Database<S>>,
    waiters: Vec<oneshot::Sender<Database<S>>>,
}

/// Holds the database handle once its open resolves.
///
/// The slot starts empty and is set exactly once. Setting the same
/// connection again is accepted; any other handle is rejected with
/// [`StepError::HandleChanged`].
pub struct DatabaseSlot<S: Schema> {
    state: Arc<Mutex<SlotState<S>>>,
}

impl<S: Schema> DatabaseSlot<S> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState {
                db: None,
                waiters: Vec::new(),
            })),
        }
    }

    /// The handle, if set.
    #[must_use]
    pub fn get(&self) -> Option<Database<S>> {
        self.state.lock().db.clone()
    }

    /// Whether a handle is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.lock().db.is_some()
    }

    /// Stores `db` and wakes everyone waiting in [`DatabaseSlot::ready`].
    pub fn set(&self, db: Database<S>) -> StepResult<()> {
        let waiters = {
            let mut state = self.state.lock();
            if let Some(current) = &state.db {
                let same = current.name() == db.name()
                    && current.connection().id() == db.connection().id();
                return if same {
                    Ok(())
                } else {
                    Err(StepError::HandleChanged)
                };
            }
            state.db = Some(db.clone());
            std::mem::take(&mut state.waiters)
        };
        tracing::debug!(database = db.name(), waiters = waiters.len(), "database handle set");
        for waiter in waiters {
            let _ = waiter.send(db.clone());
        }
        Ok(())
    }

    /// Waits until a handle is set.
    pub async fn ready(&self) -> Database<S> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(db) = &state.db {
                return db.clone();
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };
        match rx.await {
            Ok(db) => db,
            // Senders are only dropped after the handle is stored.
            Err(oneshot::Canceled) => futures::future::pending().await,
        }
    }

    /// The handle, or [`StepError::NoDatabase`].
    pub(crate) fn require(&self) -> StepResult<Database<S>> {
        self.get().ok_or(StepError::NoDatabase)
    }
}

impl<S: Schema> Clone for DatabaseSlot<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: Schema> Default for DatabaseSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> fmt::Debug for DatabaseSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DatabaseSlot")
            .field("db", &state.db)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
