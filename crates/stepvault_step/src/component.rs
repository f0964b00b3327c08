//! Components and the value map they share.

use crate::database_map::DatabaseMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stepvault_core::Value;

/// Current values of a step, keyed by component, plus the step context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepValues {
    values: BTreeMap<String, Value>,
    context: Value,
}

impl StepValues {
    pub(crate) fn new(context: Value) -> Self {
        Self {
            values: BTreeMap::new(),
            context,
        }
    }

    /// Value of component `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Context the step was defined with.
    #[must_use]
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Iterates `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }
}

/// Predicate over the current values.
pub type ValuesPredicate = Arc<dyn Fn(&StepValues) -> bool + Send + Sync>;

/// Whether a component must have a non-empty value to submit.
#[derive(Clone)]
pub enum Required {
    /// Fixed.
    Always(bool),
    /// Computed from the current values.
    When(ValuesPredicate),
}

impl Required {
    /// Evaluates against `values`.
    #[must_use]
    pub fn evaluate(&self, values: &StepValues) -> bool {
        match self {
            Self::Always(required) => *required,
            Self::When(predicate) => predicate(values),
        }
    }
}

impl Default for Required {
    fn default() -> Self {
        Self::Always(false)
    }
}

impl fmt::Debug for Required {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always(required) => f.debug_tuple("Always").field(required).finish(),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

/// One input of a step.
///
/// Components render by default, are optional by default, and have
/// [`Value::Null`] as their empty value unless told otherwise.
#[derive(Clone)]
pub struct ComponentWrapper {
    key: String,
    empty_value: Value,
    render_when: Option<ValuesPredicate>,
    required: Required,
    database_map: Option<DatabaseMap>,
}

impl ComponentWrapper {
    /// Creates a component keyed `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            empty_value: Value::Null,
            render_when: None,
            required: Required::default(),
            database_map: None,
        }
    }

    /// Sets the value that means "nothing entered".
    #[must_use]
    pub fn empty_value(mut self, value: impl Into<Value>) -> Self {
        self.empty_value = value.into();
        self
    }

    /// Renders the component only while `predicate` holds.
    #[must_use]
    pub fn render_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StepValues) -> bool + Send + Sync + 'static,
    {
        self.render_when = Some(Arc::new(predicate));
        self
    }

    /// Makes the component required or optional.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = Required::Always(required);
        self
    }

    /// Makes the component required while `predicate` holds.
    #[must_use]
    pub fn required_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StepValues) -> bool + Send + Sync + 'static,
    {
        self.required = Required::When(Arc::new(predicate));
        self
    }

    /// Persists the component's value through `map`.
    #[must_use]
    pub fn database_map(mut self, map: DatabaseMap) -> Self {
        self.database_map = Some(map);
        self
    }

    /// Component key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The empty value.
    #[must_use]
    pub fn empty(&self) -> &Value {
        &self.empty_value
    }

    /// The database mapping, if any.
    #[must_use]
    pub fn map(&self) -> Option<&DatabaseMap> {
        self.database_map.as_ref()
    }

    /// Whether the component renders given `values`.
    #[must_use]
    pub fn is_rendered(&self, values: &StepValues) -> bool {
        self.render_when
            .as_ref()
            .map_or(true, |predicate| predicate(values))
    }

    /// Whether the component is required given `values`.
    #[must_use]
    pub fn is_required(&self, values: &StepValues) -> bool {
        self.required.evaluate(values)
    }

    /// Whether the component blocks submission: rendered, required, and its
    /// value missing or equal to the empty value.
    #[must_use]
    pub fn is_missing(&self, values: &StepValues) -> bool {
        self.is_rendered(values)
            && self.is_required(values)
            && values.get(&self.key).map_or(true, |v| *v == self.empty_value)
    }
}

impl fmt::Debug for ComponentWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentWrapper")
            .field("key", &self.key)
            .field("empty_value", &self.empty_value)
            .field("conditional", &self.render_when.is_some())
            .field("required", &self.required)
            .field("database_map", &self.database_map)
            .finish()
    }
}
