//! The form handle.
//!
//! `Form` is a cheap `Clone` handle over shared state. The state lock is
//! never held across an `.await` or while user callbacks run, so callbacks
//! are free to call back into the form.

mod array;
mod register;
mod validate;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::{FormConfig, FormConfigPatch};
use crate::error::Result;
use crate::instance::{Instance, Instances};
use crate::notify::{ReRender, RenderPlan, Renderer};
use crate::registry::Registry;
use crate::store::ValueStore;
use crate::types::{ErrorGroup, FieldMeta, FieldStatus, RenderReason, Selection};
use crate::validator::{AcceptAll, Validator};

pub use register::{FieldInit, FieldSnapshot};
pub use validate::{FieldValidation, PendingValidation};

/// Called with the field name and its new value after a trigger event.
pub type OnChange = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

/// Rewrites each engine message before it is stored on a field.
pub type ProcessErrorMessage = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Runs after a callback-style batch validation has notified.
pub type AfterValidateHook = Arc<dyn Fn(&AfterValidate) + Send + Sync>;

/// Context handed to the after-validate hook.
#[derive(Clone)]
pub struct AfterValidate {
    pub errors_group: Option<ErrorGroup>,
    pub options: FormConfig,
    pub instances: HashMap<String, Instance>,
}

struct Hooks {
    validator: Arc<dyn Validator>,
    renderer: Option<Arc<dyn Renderer>>,
    on_change: Option<OnChange>,
    process_error_message: Option<ProcessErrorMessage>,
    after_validate: Option<AfterValidateHook>,
}

struct Inner {
    state: Mutex<FormState>,
    hooks: Hooks,
}

/// Settled status and errors captured when a field enters `Loading`.
#[derive(Debug, Clone, PartialEq)]
struct Settled {
    status: FieldStatus,
    errors: Option<Vec<String>>,
}

/// An in-flight trigger validation for one (field, trigger) pair.
struct Pending {
    generation: u64,
    cancel: CancellationToken,
    settled: Settled,
}

struct FormState {
    config: FormConfig,
    registry: Registry,
    store: ValueStore,
    re_renders: HashMap<String, ReRender>,
    instances: Instances,
    pending: HashMap<(String, String), Pending>,
    next_generation: u64,
}

impl FormState {
    fn route(&self, names: Option<&[String]>, reason: RenderReason) -> RenderPlan {
        RenderPlan::route(names, reason, &self.re_renders, self.config.force_update)
    }

    /// Stop listening to every in-flight validation of `name`.
    fn cancel_pending(&mut self, name: &str) {
        self.pending.retain(|(field, trigger), pending| {
            if field == name {
                debug!(field, trigger, "Cancelling in-flight validation");
                pending.cancel.cancel();
                false
            } else {
                true
            }
        });
    }

    fn cancel_all_pending(&mut self) {
        for pending in self.pending.values() {
            pending.cancel.cancel();
        }
        self.pending.clear();
    }

    fn target_names(&self, selection: &Selection) -> Vec<String> {
        match selection {
            Selection::All => self.registry.names(),
            Selection::Names(names) => names.clone(),
        }
    }

    /// Values for explicit names (undefined ones omitted), or the whole store.
    fn values_for(&self, selection: &Selection) -> Result<Map<String, Value>> {
        match selection {
            Selection::Names(names) if !names.is_empty() => {
                let mut values = Map::new();
                for name in names {
                    if let Some(value) = self.store.get(name)? {
                        values.insert(name.clone(), value);
                    }
                }
                Ok(values)
            }
            _ => Ok(self.store.snapshot()),
        }
    }

    fn error_of(&self, name: &str) -> Option<Vec<String>> {
        self.registry
            .get(name)
            .and_then(FieldMeta::current_errors)
            .map(<[String]>::to_vec)
    }

    /// Current errors of `names` that have any, or `None`.
    fn formatted_errors(&self, names: &[String]) -> Option<ErrorGroup> {
        let group: ErrorGroup = names
            .iter()
            .filter_map(|name| self.error_of(name).map(|errors| (name.clone(), errors)))
            .collect();
        (!group.is_empty()).then_some(group)
    }

    /// Registered fields write through their accessor; other names go
    /// straight to the store.
    fn write_value(&mut self, name: &str, value: Option<Value>) -> Result<()> {
        match self.registry.get_mut(name) {
            Some(meta) => {
                self.store.write_field(meta, value)?;
                meta.value_initialized = true;
            }
            None => self.store.set(name, value)?,
        }
        Ok(())
    }

    fn remove_field(&mut self, name: &str) -> Result<()> {
        self.cancel_pending(name);
        self.registry.remove(name);
        self.store.remove(name)
    }
}

/// Builder for [`Form`].
pub struct FormBuilder {
    config: FormConfig,
    validator: Arc<dyn Validator>,
    renderer: Option<Arc<dyn Renderer>>,
    on_change: Option<OnChange>,
    process_error_message: Option<ProcessErrorMessage>,
    after_validate: Option<AfterValidateHook>,
}

impl FormBuilder {
    pub fn with_config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    /// Values available before any field registers.
    pub fn with_values(mut self, values: Map<String, Value>) -> Self {
        self.config.values = values;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_on_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Option<&Value>) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(f));
        self
    }

    pub fn with_process_error_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.process_error_message = Some(Arc::new(f));
        self
    }

    pub fn with_after_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&AfterValidate) + Send + Sync + 'static,
    {
        self.after_validate = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Form {
        debug!(
            parse_name = self.config.parse_name,
            values = self.config.values.len(),
            "Creating form"
        );
        let store = ValueStore::new(self.config.parse_name, self.config.values.clone());
        let state = FormState {
            config: self.config,
            registry: Registry::new(),
            store,
            re_renders: HashMap::new(),
            instances: Instances::default(),
            pending: HashMap::new(),
            next_generation: 0,
        };
        Form {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                hooks: Hooks {
                    validator: self.validator,
                    renderer: self.renderer,
                    on_change: self.on_change,
                    process_error_message: self.process_error_message,
                    after_validate: self.after_validate,
                },
            }),
        }
    }
}

/// Field-state engine handle.
#[derive(Clone)]
pub struct Form {
    inner: Arc<Inner>,
}

impl Form {
    pub fn builder() -> FormBuilder {
        FormBuilder {
            config: FormConfig::default(),
            validator: Arc::new(AcceptAll),
            renderer: None,
            on_change: None,
            process_error_message: None,
            after_validate: None,
        }
    }

    /// Form with `config`, no renderer and an engine that accepts everything.
    pub fn new(config: FormConfig) -> Self {
        Self::builder().with_config(config).build()
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, plan: RenderPlan) {
        plan.run(self.inner.hooks.renderer.as_ref());
    }

    fn process_message(&self, message: &str) -> String {
        match &self.inner.hooks.process_error_message {
            Some(process) => process(message),
            None => message.to_string(),
        }
    }

    /// Request a re-render of `selection` (all means a global re-render).
    pub fn notify(&self, selection: impl Into<Selection>, reason: RenderReason) {
        let selection = selection.into();
        let plan = {
            let state = self.lock();
            match &selection {
                Selection::All => state.route(None, reason),
                Selection::Names(names) => state.route(Some(names), reason),
            }
        };
        self.run(plan);
    }

    pub fn config(&self) -> FormConfig {
        self.lock().config.clone()
    }

    /// Merge a partial options update into the stored config.
    pub fn set_options(&self, patch: FormConfigPatch) {
        debug!(?patch, "Updating form options");
        self.lock().config.apply(patch);
    }

    /// Snapshot of a field's metadata.
    pub fn get(&self, name: &str) -> Option<FieldMeta> {
        self.lock().registry.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().registry.names()
    }

    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.lock().instances.live.get(name).cloned()
    }

    // Values

    pub fn get_value(&self, name: &str) -> Result<Option<Value>> {
        self.lock().store.get(name)
    }

    /// Values of explicit names, or a shallow copy of the whole store.
    pub fn get_values(&self, selection: impl Into<Selection>) -> Result<Map<String, Value>> {
        self.lock().values_for(&selection.into())
    }

    pub fn set_value(&self, name: &str, value: Value) -> Result<()> {
        let plan = {
            let mut state = self.lock();
            state.write_value(name, Some(value))?;
            state.route(Some(&[name.to_string()]), RenderReason::SetValue)
        };
        self.run(plan);
        Ok(())
    }

    /// [`Form::set_value`] without notifying.
    pub fn set_value_quiet(&self, name: &str, value: Value) -> Result<()> {
        self.lock().write_value(name, Some(value))
    }

    /// Merge `values` into the store and request a global re-render.
    ///
    /// In nested mode the merge is shallow; see `ValueStore::merge`.
    pub fn set_values(&self, values: Map<String, Value>) -> Result<()> {
        self.set_values_quiet(values)?;
        self.notify(Selection::All, RenderReason::SetValue);
        Ok(())
    }

    pub fn set_values_quiet(&self, values: Map<String, Value>) -> Result<()> {
        let mut state = self.lock();
        let names = state.registry.names();
        trace!(keys = values.len(), "Setting values");
        state.store.merge(values, &names)
    }

    // Errors

    /// Replace a field's errors. A name with no field gets a bare entry.
    pub fn set_error<I, S>(&self, name: &str, errors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let errors: Vec<String> = errors.into_iter().map(Into::into).collect();
        let plan = {
            let mut state = self.lock();
            let meta = state.registry.register(name);
            meta.status = if errors.is_empty() {
                FieldStatus::Idle
            } else {
                FieldStatus::Error
            };
            meta.errors = Some(errors);
            state.route(Some(&[name.to_string()]), RenderReason::SetError)
        };
        self.run(plan);
    }

    pub fn set_errors<K>(&self, errors: impl IntoIterator<Item = (K, Vec<String>)>)
    where
        K: AsRef<str>,
    {
        for (name, field_errors) in errors {
            self.set_error(name.as_ref(), field_errors);
        }
    }

    /// A field's errors, or `None` when it has none.
    pub fn get_error(&self, name: &str) -> Option<Vec<String>> {
        self.lock().error_of(name)
    }

    pub fn get_errors(
        &self,
        selection: impl Into<Selection>,
    ) -> indexmap::IndexMap<String, Option<Vec<String>>> {
        let state = self.lock();
        state
            .target_names(&selection.into())
            .into_iter()
            .map(|name| {
                let errors = state.error_of(&name);
                (name, errors)
            })
            .collect()
    }

    /// Status of a field; unknown fields are idle.
    pub fn get_state(&self, name: &str) -> FieldStatus {
        self.lock()
            .registry
            .get(name)
            .map(|meta| meta.status)
            .unwrap_or_default()
    }

    // Lifecycle

    /// Set targeted values to undefined and clear their rules, errors and status.
    pub fn reset(&self, selection: impl Into<Selection>) -> Result<()> {
        self.reset_fields(selection.into(), false)
    }

    /// Like [`Form::reset`], but values go back to each field's `init_value`.
    pub fn reset_to_default(&self, selection: impl Into<Selection>) -> Result<()> {
        self.reset_fields(selection.into(), true)
    }

    fn reset_fields(&self, selection: Selection, to_default: bool) -> Result<()> {
        let plan = {
            let mut state = self.lock();
            let names = state.target_names(&selection);
            if selection.is_all() {
                state.store.clear();
            }

            let mut changed = false;
            for name in &names {
                let Some(meta) = state.registry.get_mut(name) else {
                    continue;
                };
                changed = true;
                let value = if to_default {
                    meta.init_value.clone()
                } else {
                    None
                };
                meta.clear_errors();
                meta.rules.clear();
                state.cancel_pending(name);
                state.write_value(name, value)?;
            }
            debug!(fields = names.len(), to_default, "Reset fields");

            if !changed {
                return Ok(());
            }
            state.route(Some(&names), RenderReason::Reset)
        };
        self.run(plan);
        Ok(())
    }

    /// Remove fields and their values. Removing all also clears the store.
    pub fn remove(&self, selection: impl Into<Selection>) -> Result<()> {
        let mut state = self.lock();
        match selection.into() {
            Selection::All => {
                state.cancel_all_pending();
                state.registry.clear();
                state.store.clear();
                Ok(())
            }
            Selection::Names(names) => {
                for name in &names {
                    state.remove_field(name)?;
                }
                Ok(())
            }
        }
    }
}
