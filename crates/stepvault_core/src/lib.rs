//! # StepVault Core
//!
//! Typed, transactional key/value databases on top of the StepVault engine.
//!
//! This crate provides:
//! - [`Schema`] and [`StoreDef`], the type-level schema every API is
//!   parameterized by
//! - [`Database`], a versioned connection with upgrade, blocked and blocking
//!   callbacks
//! - [`Store`] / [`RawStore`] accessors bound to one transaction
//! - [`Upgrade`], the schema migration scope
//! - [`PropertyPath`], addressing of fields up to two levels into a record
//!
//! Engine errors are passed through untranslated as [`CoreError::Engine`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let factory = Factory::new();
//! let options = OpenOptions::<App>::new().upgrade(|upgrade| async move {
//!     upgrade.create_store::<Users>().await?;
//!     Ok(())
//! });
//! let db = Database::<App>::open(&factory, "app", 1, options).await?;
//! db.put::<Users>(&"ada".to_string(), &user).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod path;
mod schema;
mod store;
mod transaction;
mod upgrade;

pub use config::{BlockedCallback, BlockingCallback, OpenOptions, UpgradeCallback};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use path::{PathWrite, PropertyPath};
pub use schema::{IndexDef, Schema, StoreDef, StoreKey};
pub use store::{RawStore, Store};
pub use transaction::Stores;
pub use upgrade::Upgrade;

pub use stepvault_codec::{Key, Value};
pub use stepvault_engine::{
    EngineConfig, EngineError, Factory, IndexOptions, TransactionMode, VersionChange,
};
