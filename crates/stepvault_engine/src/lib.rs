//! # StepVault Engine
//!
//! An in-process transactional object-store engine.
//!
//! The engine plays the part of the host environment's storage engine: it
//! owns every named database, negotiates version changes between
//! connections and runs auto-committing transactions over named object
//! stores. Higher layers never look inside it; they only see the types
//! exported here and propagate [`EngineError`] unchanged.
//!
//! ## Semantics
//!
//! - Databases are versioned. Opening at a higher version runs a version
//!   change transaction; opening at a lower version fails.
//! - A version change must wait for every other connection to the same
//!   database to close. Open connections are notified through their version
//!   change handler, and the opener through its blocked handler.
//! - Transactions are scoped to store names and a [`TransactionMode`].
//!   Writes are buffered and applied atomically on commit.
//! - A transaction auto-commits as soon as the code driving it yields to the
//!   scheduler (see [`AutoCommit`]). Requests issued afterwards fail with
//!   [`EngineError::TransactionInactive`].
//! - Records are copied in and out as canonical CBOR, so callers never share
//!   memory with stored data.
//!
//! ## Example
//!
//! ```rust,ignore
//! let factory = Factory::new();
//! let conn = factory.open("app", 1, handlers).await?;
//! let txn = conn.transaction(&["users"], TransactionMode::ReadWrite)?;
//! txn.put("users", Key::from(1), &Value::from("Ada"))?;
//! txn.done().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod factory;
mod state;
mod transaction;
mod types;

pub use config::EngineConfig;
pub use connection::Connection;
pub use error::{EngineError, EngineResult};
pub use factory::{BlockedHandler, DatabaseInfo, Factory, OpenHandlers, UpgradeHandler};
pub use state::{IndexOptions, IndexSpec};
pub use transaction::{AutoCommit, Transaction, TransactionStatus};
pub use types::{
    ConnectionId, TransactionId, TransactionMode, VersionChange, VersionChangeHandler,
};

pub use stepvault_codec::{Key, Value};
