//! Steps: a set of components whose values are loaded from and submitted to
//! a database in one transaction.

use crate::component::{ComponentWrapper, StepValues};
use crate::database_map::{ComponentDatabaseMap, DatabaseMap};
use crate::error::{StepError, StepResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use stepvault_core::{CoreError, Database, Schema, TransactionMode, Value};

/// Computes the next slug from the current values.
pub type NextSlugFn = Arc<dyn Fn(&StepValues) -> Option<String> + Send + Sync>;

/// Called with the new next slug whenever it changes.
pub type SlugChangeCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Called with the submitted values once they are stored.
pub type SubmitHook = Arc<dyn Fn(StepValues) -> BoxFuture<'static, StepResult<()>> + Send + Sync>;

/// Called with the submitted values at the very end of a submission.
pub type AfterSubmitCallback = Arc<dyn Fn(&StepValues) + Send + Sync>;

/// Called with the keys that blocked a submission.
pub type IncompleteCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Where a step leads.
#[derive(Clone, Default)]
pub enum NextSlug {
    /// Nowhere; the flow ends.
    #[default]
    None,
    /// A fixed slug.
    Literal(String),
    /// A slug computed from the current values.
    Computed(NextSlugFn),
}

impl NextSlug {
    fn evaluate(&self, values: &StepValues) -> Option<String> {
        match self {
            Self::None => None,
            Self::Literal(slug) => Some(slug.clone()),
            Self::Computed(f) => f(values),
        }
    }
}

impl fmt::Debug for NextSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Literal(slug) => f.debug_tuple("Literal").field(slug).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Lifecycle of a mounted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Values hold the components' empty values (or loaded values).
    Seeded,
    /// At least one value changed since mounting.
    Interacting,
    /// A submission is writing.
    Submitting,
    /// The last submission completed.
    Submitted,
    /// The last submission was missing required values. The next change
    /// returns the step to [`StepPhase::Interacting`].
    IncompleteRejected,
}

/// Result of [`Step::submit`] when nothing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Values were stored.
    Submitted,
    /// Nothing was written; these components need values.
    Incomplete(Vec<String>),
}

/// Static description of a step.
#[derive(Clone)]
pub struct StepDefinition {
    slug: String,
    components: Vec<ComponentWrapper>,
    context: Value,
    next_slug: NextSlug,
    on_next_slug_change: Option<SlugChangeCallback>,
    submit: Option<SubmitHook>,
    after_submit: Option<AfterSubmitCallback>,
    on_incomplete_submit: Option<IncompleteCallback>,
}

impl StepDefinition {
    /// Creates an empty step named `slug`.
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            components: Vec::new(),
            context: Value::Null,
            next_slug: NextSlug::None,
            on_next_slug_change: None,
            submit: None,
            after_submit: None,
            on_incomplete_submit: None,
        }
    }

    /// Appends a component. Declaration order is persistence order.
    #[must_use]
    pub fn component(mut self, component: ComponentWrapper) -> Self {
        self.components.push(component);
        self
    }

    /// Sets the context visible to predicates.
    #[must_use]
    pub fn context(mut self, context: impl Into<Value>) -> Self {
        self.context = context.into();
        self
    }

    /// Leads to `slug`.
    #[must_use]
    pub fn next_slug(mut self, slug: impl Into<String>) -> Self {
        self.next_slug = NextSlug::Literal(slug.into());
        self
    }

    /// Leads to the slug `f` computes from the current values.
    #[must_use]
    pub fn next_slug_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepValues) -> Option<String> + Send + Sync + 'static,
    {
        self.next_slug = NextSlug::Computed(Arc::new(f));
        self
    }

    /// Called whenever the next slug changes, including on mount.
    #[must_use]
    pub fn on_next_slug_change<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.on_next_slug_change = Some(Arc::new(f));
        self
    }

    /// Runs after the values are stored and before `after_submit`. An error
    /// fails the submission, but the values stay stored.
    #[must_use]
    pub fn submit<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StepValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult<()>> + Send + 'static,
    {
        self.submit = Some(Arc::new(move |values| f(values).boxed()));
        self
    }

    /// Runs last in a successful submission.
    #[must_use]
    pub fn after_submit<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepValues) + Send + Sync + 'static,
    {
        self.after_submit = Some(Arc::new(f));
        self
    }

    /// Runs when a submission is rejected for missing values.
    #[must_use]
    pub fn on_incomplete_submit<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.on_incomplete_submit = Some(Arc::new(f));
        self
    }

    /// Step slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Components in declaration order.
    #[must_use]
    pub fn components(&self) -> &[ComponentWrapper] {
        &self.components
    }

    /// Database maps of the mapped components, in declaration order.
    #[must_use]
    pub fn database_maps(&self) -> Vec<ComponentDatabaseMap> {
        self.components
            .iter()
            .filter_map(|c| Some(ComponentDatabaseMap::new(c.key(), c.map()?.clone())))
            .collect()
    }

    /// Distinct store names of every mapped component, sorted.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.components
            .iter()
            .filter_map(ComponentWrapper::map)
            .flat_map(DatabaseMap::store_names)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("slug", &self.slug)
            .field("components", &self.components)
            .field("context", &self.context)
            .field("next_slug", &self.next_slug)
            .finish_non_exhaustive()
    }
}

struct StepState {
    values: StepValues,
    phase: StepPhase,
    loading: bool,
    next_slug: Option<String>,
}

/// A mounted step.
///
/// Handles are cheap to clone and share state, so a UI layer can report
/// changes while a load or submission is in flight.
#[derive(Clone)]
pub struct Step {
    definition: Arc<StepDefinition>,
    state: Arc<Mutex<StepState>>,
}

impl Step {
    /// Mounts `definition`: every component starts at its empty value and
    /// the next slug change callback fires with the initial next slug.
    #[must_use]
    pub fn mount(definition: StepDefinition) -> Self {
        let mut values = StepValues::new(definition.context.clone());
        for component in &definition.components {
            values.set(component.key(), component.empty().clone());
        }
        let next_slug = definition.next_slug.evaluate(&values);
        tracing::debug!(step = %definition.slug, next_slug = ?next_slug, "step mounted");
        if let Some(callback) = &definition.on_next_slug_change {
            callback(next_slug.as_deref());
        }
        Self {
            definition: Arc::new(definition),
            state: Arc::new(Mutex::new(StepState {
                values,
                phase: StepPhase::Seeded,
                loading: false,
                next_slug,
            })),
        }
    }

    /// Step slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.definition.slug
    }

    /// The definition this step was mounted from.
    #[must_use]
    pub fn definition(&self) -> &StepDefinition {
        &self.definition
    }

    /// Snapshot of the current values.
    #[must_use]
    pub fn values(&self) -> StepValues {
        self.state.lock().values.clone()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> StepPhase {
        self.state.lock().phase
    }

    /// Whether stored values are loading. Changes are rejected meanwhile.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.state.lock().loading
    }

    /// Current next slug.
    #[must_use]
    pub fn next_slug(&self) -> Option<String> {
        self.state.lock().next_slug.clone()
    }

    /// Records a new value for component `key`. No I/O happens.
    pub fn on_change(&self, key: &str, value: impl Into<Value>) -> StepResult<()> {
        if !self.definition.components.iter().any(|c| c.key() == key) {
            return Err(StepError::unknown_component(key));
        }
        let values = {
            let mut state = self.state.lock();
            if state.loading {
                return Err(StepError::Disabled);
            }
            state.values.set(key, value.into());
            if state.phase != StepPhase::Submitting {
                state.phase = StepPhase::Interacting;
            }
            state.values.clone()
        };
        self.refresh_next_slug(&values);
        Ok(())
    }

    /// Keys of rendered, required components whose value is missing or
    /// empty, in declaration order.
    #[must_use]
    pub fn keys_missing_values(&self) -> Vec<String> {
        let values = self.values();
        missing_keys(&self.definition.components, &values)
    }

    /// Distinct store names the step persists to, sorted.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.definition.store_names()
    }

    /// Loads every mapped component's stored value in one read-only
    /// transaction. Components without a stored value keep their current
    /// value.
    pub async fn load<S: Schema>(&self, db: &Database<S>) -> StepResult<()> {
        {
            let mut state = self.state.lock();
            if state.loading {
                return Err(StepError::Disabled);
            }
            state.loading = true;
        }
        let result = self.read_stored(db).await;
        let values = {
            let mut state = self.state.lock();
            state.loading = false;
            if let Ok(loaded) = &result {
                for (key, value) in loaded {
                    state.values.set(key.clone(), value.clone());
                }
            }
            state.values.clone()
        };
        let loaded = result?;
        self.refresh_next_slug(&values);
        tracing::debug!(step = %self.definition.slug, loaded = loaded.len(), "step values loaded");
        Ok(())
    }

    /// Submits the current values.
    ///
    /// Missing required values reject the submission before any I/O and
    /// are reported to the incomplete-submit callback. Otherwise every
    /// mapped component is written, in declaration order, inside one
    /// read-write transaction; hidden components have their record
    /// deleted instead. The submit hook and then `after_submit` run once
    /// the transaction completes.
    pub async fn submit<S: Schema>(&self, db: &Database<S>) -> StepResult<SubmitOutcome> {
        let values = {
            let state = self.state.lock();
            if state.loading {
                return Err(StepError::Disabled);
            }
            state.values.clone()
        };
        // Predicates run unlocked; they may read this step.
        let missing = missing_keys(&self.definition.components, &values);
        if !missing.is_empty() {
            self.state.lock().phase = StepPhase::IncompleteRejected;
            tracing::debug!(step = %self.definition.slug, ?missing, "submission incomplete");
            if let Some(callback) = &self.definition.on_incomplete_submit {
                callback(&missing);
            }
            return Ok(SubmitOutcome::Incomplete(missing));
        }
        self.state.lock().phase = StepPhase::Submitting;

        match self.persist(db, &values).await {
            Ok(()) => {
                self.state.lock().phase = StepPhase::Submitted;
                if let Some(callback) = &self.definition.after_submit {
                    callback(&values);
                }
                tracing::debug!(step = %self.definition.slug, "step submitted");
                Ok(SubmitOutcome::Submitted)
            }
            Err(err) => {
                self.state.lock().phase = StepPhase::Interacting;
                tracing::debug!(
                    step = %self.definition.slug,
                    error = %err,
                    "step submission failed"
                );
                Err(err)
            }
        }
    }

    async fn read_stored<S: Schema>(&self, db: &Database<S>) -> StepResult<Vec<(String, Value)>> {
        let names = self.definition.store_names();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let mapped = self.definition.database_maps();
        let loaded = db
            .transaction(&names, TransactionMode::ReadOnly, |stores| async move {
                let mut loaded = Vec::new();
                for entry in &mapped {
                    if let Some(value) = entry.map().read(&stores).await? {
                        loaded.push((entry.component_key().to_string(), value));
                    }
                }
                Ok::<_, CoreError>(loaded)
            })
            .await?;
        Ok(loaded)
    }

    async fn persist<S: Schema>(&self, db: &Database<S>, values: &StepValues) -> StepResult<()> {
        let names = self.definition.store_names();
        if !names.is_empty() {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let plan: Vec<(DatabaseMap, bool, Value, Value)> = self
                .definition
                .components
                .iter()
                .filter_map(|c| {
                    let map = c.map()?.clone();
                    let value = values
                        .get(c.key())
                        .cloned()
                        .unwrap_or_else(|| c.empty().clone());
                    Some((map, c.is_rendered(values), value, c.empty().clone()))
                })
                .collect();
            db.transaction(&names, TransactionMode::ReadWrite, |stores| async move {
                for (map, rendered, value, empty) in plan {
                    if rendered {
                        map.persist(&stores, value, &empty).await?;
                    } else {
                        map.purge(&stores).await?;
                    }
                }
                Ok::<_, CoreError>(())
            })
            .await?;
        }
        if let Some(hook) = &self.definition.submit {
            hook(values.clone()).await?;
        }
        Ok(())
    }

    /// Recomputes the next slug from `values` and reports a change. The
    /// lock is only held to swap the stored slug.
    fn refresh_next_slug(&self, values: &StepValues) {
        let next = self.definition.next_slug.evaluate(values);
        {
            let mut state = self.state.lock();
            if next == state.next_slug {
                return;
            }
            state.next_slug = next.clone();
        }
        tracing::debug!(step = %self.definition.slug, next_slug = ?next, "next slug changed");
        if let Some(callback) = &self.definition.on_next_slug_change {
            callback(next.as_deref());
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Step")
            .field("slug", &self.definition.slug)
            .field("phase", &state.phase)
            .field("loading", &state.loading)
            .field("values", &state.values)
            .finish()
    }
}

fn missing_keys(components: &[ComponentWrapper], values: &StepValues) -> Vec<String> {
    components
        .iter()
        .filter(|c| c.is_missing(values))
        .map(|c| c.key().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> StepDefinition {
        StepDefinition::new("contact")
            .component(ComponentWrapper::new("name").empty_value("").required(true))
            .component(ComponentWrapper::new("channel").empty_value("mail"))
            .next_slug_with(|values| match values.get("channel") {
                Some(Value::Text(channel)) if channel == "phone" => Some("phone".into()),
                _ => Some("done".into()),
            })
    }

    #[test]
    fn mount_seeds_empty_values() {
        let step = Step::mount(definition());
        let values = step.values();
        assert_eq!(values.get("name"), Some(&Value::from("")));
        assert_eq!(values.get("channel"), Some(&Value::from("mail")));
        assert_eq!(step.phase(), StepPhase::Seeded);
        assert_eq!(step.next_slug().as_deref(), Some("done"));
    }

    #[test]
    fn changes_move_to_interacting() {
        let step = Step::mount(definition());
        step.on_change("name", "Ada").unwrap();
        assert_eq!(step.phase(), StepPhase::Interacting);
        assert_eq!(step.values().get("name"), Some(&Value::from("Ada")));
        assert!(step.keys_missing_values().is_empty());
    }

    #[test]
    fn predicates_may_read_the_step() {
        let handle: Arc<Mutex<Option<Step>>> = Arc::new(Mutex::new(None));
        let from_slug = Arc::clone(&handle);
        let step = Step::mount(definition().next_slug_with(move |_| {
            // Reads the step back while its slug is being computed.
            let step = from_slug.lock().clone()?;
            match step.values().get("channel") {
                Some(Value::Text(channel)) => Some(channel.clone()),
                _ => None,
            }
        }));
        *handle.lock() = Some(step.clone());

        step.on_change("channel", "phone").unwrap();
        assert_eq!(step.next_slug().as_deref(), Some("phone"));
    }

    #[test]
    fn unknown_component_is_rejected() {
        let step = Step::mount(definition());
        assert_eq!(
            step.on_change("nope", 1),
            Err(StepError::unknown_component("nope"))
        );
    }

    #[test]
    fn next_slug_change_fires_on_mount_and_on_change() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let step = Step::mount(
            definition().on_next_slug_change(move |slug| seen.lock().push(slug.map(String::from))),
        );
        step.on_change("channel", "phone").unwrap();
        step.on_change("name", "Ada").unwrap();
        step.on_change("channel", "mail").unwrap();

        assert_eq!(
            *calls.lock(),
            vec![
                Some("done".to_string()),
                Some("phone".to_string()),
                Some("done".to_string())
            ]
        );
        assert_eq!(step.next_slug().as_deref(), Some("done"));
    }

    #[test]
    fn missing_keys_follow_declaration_order() {
        let step = Step::mount(
            StepDefinition::new("s")
                .component(ComponentWrapper::new("b").required(true))
                .component(ComponentWrapper::new("a").required(true)),
        );
        assert_eq!(step.keys_missing_values(), vec!["b", "a"]);
    }

    #[test]
    fn store_names_are_distinct_and_sorted() {
        let step = Step::mount(
            StepDefinition::new("s")
                .component(ComponentWrapper::new("a").database_map(DatabaseMap::new("users", "k")))
                .component(
                    ComponentWrapper::new("b")
                        .database_map(DatabaseMap::new("settings", 1).field("x")),
                )
                .component(
                    ComponentWrapper::new("c")
                        .database_map(DatabaseMap::new("users", "k").field("c")),
                )
                .component(ComponentWrapper::new("unmapped")),
        );
        assert_eq!(step.store_names(), vec!["settings", "users"]);
    }
}
