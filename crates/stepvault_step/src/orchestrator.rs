//! Step registry and navigation.

use crate::context::DatabaseSlot;
use crate::error::{StepError, StepResult};
use crate::step::{Step, StepDefinition, SubmitOutcome};
use std::collections::BTreeMap;
use std::fmt;
use stepvault_core::Schema;

/// Registers steps by slug and moves between them.
///
/// One step is mounted at a time. Navigating remounts, so values not yet
/// submitted are dropped.
pub struct Orchestrator<S: Schema> {
    steps: BTreeMap<String, StepDefinition>,
    first: Option<String>,
    current: Option<Step>,
    slot: DatabaseSlot<S>,
}

impl<S: Schema> Orchestrator<S> {
    /// Creates an orchestrator that reads its database from `slot`.
    #[must_use]
    pub fn new(slot: DatabaseSlot<S>) -> Self {
        Self {
            steps: BTreeMap::new(),
            first: None,
            current: None,
            slot,
        }
    }

    /// Registers `definition`, replacing any step with the same slug. The
    /// first registered step is the starting step.
    #[must_use]
    pub fn register(mut self, definition: StepDefinition) -> Self {
        let slug = definition.slug().to_string();
        if self.first.is_none() {
            self.first = Some(slug.clone());
        }
        self.steps.insert(slug, definition);
        self
    }

    /// Registered slugs, sorted.
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// The database slot.
    #[must_use]
    pub fn slot(&self) -> &DatabaseSlot<S> {
        &self.slot
    }

    /// Mounts the starting step.
    pub fn start(&mut self) -> StepResult<&Step> {
        let first = self.first.clone().ok_or(StepError::NotMounted)?;
        self.navigate(&first)
    }

    /// Mounts the step registered as `slug`.
    ///
    /// # Errors
    ///
    /// [`StepError::UnknownSlug`] if nothing is registered under `slug`.
    pub fn navigate(&mut self, slug: &str) -> StepResult<&Step> {
        let definition = self
            .steps
            .get(slug)
            .cloned()
            .ok_or_else(|| StepError::unknown_slug(slug))?;
        tracing::debug!(step = slug, "navigating");
        Ok(self.current.insert(Step::mount(definition)))
    }

    /// The mounted step.
    #[must_use]
    pub fn current(&self) -> Option<&Step> {
        self.current.as_ref()
    }

    /// Loads the mounted step's stored values from the slot's database.
    pub async fn load_current(&self) -> StepResult<()> {
        let step = self.current.as_ref().ok_or(StepError::NotMounted)?;
        let db = self.slot.require()?;
        step.load(&db).await
    }

    /// Submits the mounted step. On success, mounts the step's next slug if
    /// it has one, and returns the outcome.
    pub async fn submit(&mut self) -> StepResult<SubmitOutcome> {
        let step = self.current.clone().ok_or(StepError::NotMounted)?;
        let db = self.slot.require()?;
        let outcome = step.submit(&db).await?;
        if outcome == SubmitOutcome::Submitted {
            if let Some(next) = step.next_slug() {
                self.navigate(&next)?;
            }
        }
        Ok(outcome)
    }
}

impl<S: Schema> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("current", &self.current.as_ref().map(Step::slug))
            .finish_non_exhaustive()
    }
}
