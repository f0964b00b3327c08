//! # StepVault Testkit
//!
//! Test utilities for StepVault.
//!
//! This crate provides:
//! - A form schema with typed stores, and database helpers
//! - Property-based test generators using proptest
//! - A `tracing` subscriber for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stepvault_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn profile_round_trip() {
//!     init_tracing();
//!     let db = TestDatabase::open().await.unwrap();
//!     db.put::<Profiles>(&"ada".to_string(), &Profile::default()).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

/// Installs a test subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
