//! # StepVault Step
//!
//! Multi-step forms whose values live in a StepVault database.
//!
//! A [`Step`] holds one value per [`ComponentWrapper`]. Values change in
//! memory only; [`Step::submit`] writes every component with a
//! [`DatabaseMap`] in a single read-write transaction, and [`Step::load`]
//! reads them back in a single read-only one. The [`Orchestrator`] chains
//! steps by slug and takes its database from a [`DatabaseSlot`].
//!
//! ```rust,ignore
//! let step = Step::mount(
//!     StepDefinition::new("profile")
//!         .component(
//!             ComponentWrapper::new("city")
//!                 .empty_value("")
//!                 .required(true)
//!                 .database_map(DatabaseMap::new("users", "ada").nested("address", "city")),
//!         )
//!         .next_slug("done"),
//! );
//! step.on_change("city", "London")?;
//! step.submit(&db).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod component;
mod context;
mod database_map;
mod error;
mod orchestrator;
mod step;

pub use component::{ComponentWrapper, Required, StepValues, ValuesPredicate};
pub use context::DatabaseSlot;
pub use database_map::{ComponentDatabaseMap, DatabaseMap, KeyAccessor, MapKey};
pub use error::{StepError, StepResult};
pub use orchestrator::Orchestrator;
pub use step::{
    AfterSubmitCallback, IncompleteCallback, NextSlug, NextSlugFn, SlugChangeCallback, Step,
    StepDefinition, StepPhase, SubmitHook, SubmitOutcome,
};
