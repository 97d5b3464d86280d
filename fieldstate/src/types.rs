//! Core data types: field metadata, rules, status and selections.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::instance::FieldRef;

/// Trigger used when a field does not name one.
pub const DEFAULT_TRIGGER: &str = "onChange";

/// Value prop name used when a field does not name one.
pub const DEFAULT_VALUE_NAME: &str = "value";

/// Validation status of a field.
///
/// `Idle -> Loading -> {Success, Error}`, and back to `Idle` on reset or an
/// explicit error clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldStatus::Idle => "",
            FieldStatus::Loading => "loading",
            FieldStatus::Success => "success",
            FieldStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One opaque rule descriptor, interpreted only by the validation engine.
///
/// The only key read here is the optional `trigger` (a string or a list of
/// strings) used to route rules to events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule(pub Value);

impl Rule {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The triggers this rule is bound to, or `None` for the field default.
    pub fn triggers(&self) -> Option<Vec<String>> {
        match self.0.get("trigger")? {
            Value::String(trigger) => Some(vec![trigger.clone()]),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<Value> for Rule {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Normalize a single rule or a list of rules.
pub fn rules_from(value: Value) -> Vec<Rule> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(Rule).collect(),
        other => vec![Rule(other)],
    }
}

/// Group rules by the event that should run them.
pub fn map_rules_by_trigger(rules: &[Rule], default_trigger: &str) -> IndexMap<String, Vec<Rule>> {
    let mut map: IndexMap<String, Vec<Rule>> = IndexMap::new();
    for rule in rules {
        let triggers = rule
            .triggers()
            .unwrap_or_else(|| vec![default_trigger.to_string()]);
        for trigger in triggers {
            map.entry(trigger).or_default().push(rule.clone());
        }
    }
    map
}

/// Extracts a field value from event arguments.
pub type GetValueFormatter = Arc<dyn Fn(&[Value]) -> Option<Value> + Send + Sync>;

/// Turns a stored value (plus the last event arguments) into the presented value.
pub type SetValueFormatter = Arc<dyn Fn(Option<&Value>, &[Value]) -> Option<Value> + Send + Sync>;

/// Per-field metadata held by the registry.
///
/// The value itself lives in the value store; see `ValueStore::read_field`.
#[derive(Clone)]
pub struct FieldMeta {
    pub name: String,
    pub init_value: Option<Value>,
    pub rules: Vec<Rule>,
    pub status: FieldStatus,
    pub errors: Option<Vec<String>>,
    pub disabled: bool,
    pub value_name: String,
    pub trigger: String,
    pub input_values: Vec<Value>,
    pub auto_validate: bool,
    /// Set once the field's value has been seeded from a default or cache
    pub value_initialized: bool,
    pub field_ref: Option<FieldRef>,
    pub get_value_formatter: Option<GetValueFormatter>,
    pub set_value_formatter: Option<SetValueFormatter>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init_value: None,
            rules: Vec::new(),
            status: FieldStatus::Idle,
            errors: None,
            disabled: false,
            value_name: DEFAULT_VALUE_NAME.to_string(),
            trigger: DEFAULT_TRIGGER.to_string(),
            input_values: Vec::new(),
            auto_validate: true,
            value_initialized: false,
            field_ref: None,
            get_value_formatter: None,
            set_value_formatter: None,
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Errors, if there is at least one.
    pub fn current_errors(&self) -> Option<&[String]> {
        self.errors.as_deref().filter(|errors| !errors.is_empty())
    }

    /// Back to idle with no errors.
    pub fn clear_errors(&mut self) {
        self.errors = None;
        self.status = FieldStatus::Idle;
    }
}

impl fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMeta")
            .field("name", &self.name)
            .field("init_value", &self.init_value)
            .field("rules", &self.rules)
            .field("status", &self.status)
            .field("errors", &self.errors)
            .field("disabled", &self.disabled)
            .field("value_name", &self.value_name)
            .field("trigger", &self.trigger)
            .field("input_values", &self.input_values)
            .field("auto_validate", &self.auto_validate)
            .field("value_initialized", &self.value_initialized)
            .field("field_ref", &self.field_ref)
            .field("get_value_formatter", &self.get_value_formatter.is_some())
            .field("set_value_formatter", &self.set_value_formatter.is_some())
            .finish()
    }
}

/// Which fields an operation targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every registered field
    #[default]
    All,
    Names(Vec<String>),
}

impl Selection {
    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Selection::Names(vec![name.to_string()])
    }
}

impl From<String> for Selection {
    fn from(name: String) -> Self {
        Selection::Names(vec![name])
    }
}

impl From<Vec<String>> for Selection {
    fn from(names: Vec<String>) -> Self {
        Selection::Names(names)
    }
}

impl From<Vec<&str>> for Selection {
    fn from(names: Vec<&str>) -> Self {
        Selection::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Selection {
    fn from(names: &[&str]) -> Self {
        Selection::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(names: [&str; N]) -> Self {
        Selection::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

/// Field name to error messages.
pub type ErrorGroup = IndexMap<String, Vec<String>>;

/// Result of a batch validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// `None` when no targeted field has an error
    pub errors: Option<ErrorGroup>,
    pub values: Map<String, Value>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }
}

/// Why a re-render was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderReason {
    SetValue,
    SetError,
    Validate,
    Reset,
    /// A field's own trigger event, e.g. `onChange`
    Trigger(String),
}

impl fmt::Display for RenderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderReason::SetValue => f.write_str("setValue"),
            RenderReason::SetError => f.write_str("setError"),
            RenderReason::Validate => f.write_str("validate"),
            RenderReason::Reset => f.write_str("reset"),
            RenderReason::Trigger(trigger) => f.write_str(trigger),
        }
    }
}
