//! Field registration, event handling and instance tracking.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::{Form, PendingValidation};
use crate::error::Result;
use crate::instance::{CachedField, FieldRef, Instance};
use crate::notify::ReRender;
use crate::types::{
    map_rules_by_trigger, rules_from, GetValueFormatter, RenderReason, Rule, SetValueFormatter,
    DEFAULT_TRIGGER, DEFAULT_VALUE_NAME,
};

/// Options for [`Form::init`].
#[derive(Clone, Default)]
pub struct FieldInit {
    pub id: Option<String>,
    /// Default value, also the target of `reset_to_default`
    pub init_value: Option<Value>,
    /// Fallback default when `init_value` is absent
    pub default_value: Option<Value>,
    /// Controlled value; always wins when present
    pub value: Option<Value>,
    pub value_name: Option<String>,
    pub trigger: Option<String>,
    pub rules: Vec<Rule>,
    pub disabled: bool,
    pub auto_validate: Option<bool>,
    pub re_render: Option<ReRender>,
    pub field_ref: Option<FieldRef>,
    pub get_value_formatter: Option<GetValueFormatter>,
    pub set_value_formatter: Option<SetValueFormatter>,
}

impl FieldInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn init_value(mut self, value: Value) -> Self {
        self.init_value = Some(value);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn value_name(mut self, value_name: impl Into<String>) -> Self {
        self.value_name = Some(value_name.into());
        self
    }

    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// A single rule or a list of rules.
    pub fn rules(mut self, rules: Value) -> Self {
        self.rules = rules_from(rules);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn auto_validate(mut self, auto_validate: bool) -> Self {
        self.auto_validate = Some(auto_validate);
        self
    }

    pub fn re_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&RenderReason) + Send + Sync + 'static,
    {
        self.re_render = Some(Arc::new(f));
        self
    }

    pub fn field_ref(mut self, field_ref: FieldRef) -> Self {
        self.field_ref = Some(field_ref);
        self
    }

    pub fn get_value_formatter<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        self.get_value_formatter = Some(Arc::new(f));
        self
    }

    pub fn set_value_formatter<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Value>, &[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        self.set_value_formatter = Some(Arc::new(f));
        self
    }
}

/// What the host needs to present a registered field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub id: String,
    pub name: String,
    pub value_name: String,
    /// Presented value, after the set-value formatter
    pub value: Option<Value>,
    pub disabled: bool,
    pub trigger: String,
    pub rules_by_trigger: IndexMap<String, Vec<Rule>>,
    /// Events to route to [`Form::handle_event`], the field's trigger first
    pub events: Vec<String>,
}

impl Form {
    /// Register `name` (or refresh its metadata) and return its snapshot.
    ///
    /// The value is seeded once: from a controlled value, else from the
    /// store (constructor values count), else from the default.
    pub fn init(&self, name: &str, init: FieldInit) -> Result<FieldSnapshot> {
        let FieldInit {
            id,
            init_value,
            default_value,
            value,
            value_name,
            trigger,
            rules,
            disabled,
            auto_validate,
            re_render,
            field_ref,
            get_value_formatter,
            set_value_formatter,
        } = init;
        let default = init_value.or(default_value);
        let value_name = value_name.unwrap_or_else(|| DEFAULT_VALUE_NAME.to_string());
        let trigger = trigger.unwrap_or_else(|| DEFAULT_TRIGGER.to_string());
        let auto_validate = auto_validate.unwrap_or(true);

        let (current, input_values, formatter, rules_by_trigger) = {
            let mut state = self.lock();
            let nested = state.store.is_nested();
            let validate_enabled = state.config.auto_validate && auto_validate;

            let meta = state.registry.register(name);
            meta.value_name = value_name.clone();
            meta.trigger = trigger.clone();
            meta.init_value = default.clone();
            meta.disabled = disabled;
            meta.auto_validate = auto_validate;
            meta.rules = rules;
            meta.field_ref = field_ref;
            meta.get_value_formatter = get_value_formatter;
            meta.set_value_formatter = set_value_formatter.clone();
            let initialized = meta.value_initialized;
            let rules_by_trigger = if validate_enabled {
                map_rules_by_trigger(&meta.rules, &trigger)
            } else {
                IndexMap::new()
            };
            let input_values = meta.input_values.clone();

            if let Some(value) = value {
                state.write_value(name, Some(value))?;
            } else if !initialized {
                let cached = state.store.get(name)?;
                if nested {
                    state.write_value(name, cached.or(default))?;
                } else if cached.is_some() {
                    state.write_value(name, cached)?;
                } else if default.is_some() {
                    state.write_value(name, default)?;
                }
            }

            if let Some(re_render) = re_render {
                state.re_renders.insert(name.to_string(), re_render);
            }
            (
                state.store.get(name)?,
                input_values,
                set_value_formatter,
                rules_by_trigger,
            )
        };

        let presented = match formatter {
            Some(format) => format(current.as_ref(), &input_values),
            None => current,
        };
        let mut events = vec![trigger.clone()];
        events.extend(rules_by_trigger.keys().filter(|k| **k != trigger).cloned());

        trace!(field = name, ?events, "Initialized field");
        Ok(FieldSnapshot {
            id: id.unwrap_or_else(|| name.to_string()),
            name: name.to_string(),
            value_name,
            value: presented,
            disabled,
            trigger,
            rules_by_trigger,
            events,
        })
    }
}

impl Form {
    /// Route a UI event for `name`.
    ///
    /// The field's own trigger stores the new value (from the get-value
    /// formatter, else the first argument), clears its errors, calls
    /// `on_change`, starts validation and notifies. Any other event only
    /// starts validation for the rules bound to it.
    pub fn handle_event(
        &self,
        name: &str,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Option<PendingValidation>> {
        let (trigger, validates, formatter) = {
            let state = self.lock();
            let Some(meta) = state.registry.get(name) else {
                trace!(field = name, event, "Event for unknown field");
                return Ok(None);
            };
            let enabled = state.config.auto_validate && meta.auto_validate;
            let validates =
                enabled && map_rules_by_trigger(&meta.rules, &meta.trigger).contains_key(event);
            (
                meta.trigger.clone(),
                validates,
                meta.get_value_formatter.clone(),
            )
        };

        if event != trigger {
            return if validates {
                self.validate_field(name, event)
            } else {
                Ok(None)
            };
        }

        let value = match formatter {
            Some(format) => format(&args),
            None => args.first().cloned(),
        };
        {
            let mut state = self.lock();
            state.write_value(name, value.clone())?;
            if let Some(meta) = state.registry.get_mut(name) {
                meta.input_values = args;
                meta.clear_errors();
            }
        }

        if let Some(on_change) = &self.inner.hooks.on_change {
            on_change(name, value.as_ref());
        }
        let pending = if validates {
            self.validate_field(name, &trigger)?
        } else {
            None
        };
        self.notify(name, RenderReason::Trigger(trigger));
        Ok(pending)
    }

    /// Attach (`Some`) or detach (`None`) a UI instance for `name`.
    ///
    /// With `auto_unmount`, the last detach caches the field and removes it;
    /// an attach for an unregistered name restores the cached field. The
    /// field's ref receives the instance on every attach.
    pub fn attach_instance(&self, name: &str, instance: Option<Instance>) -> Result<()> {
        let field_ref = {
            let mut state = self.lock();
            let auto_unmount = state.config.auto_unmount;

            if instance.is_none() && auto_unmount {
                let remaining = state.instances.unmount(name);
                if remaining > 0 {
                    trace!(field = name, remaining, "Instance detached, others still mounted");
                    return Ok(());
                }
                if let Some(meta) = state.registry.get(name).cloned() {
                    let value = state.store.get(name)?;
                    state
                        .instances
                        .cached
                        .insert(name.to_string(), CachedField { meta, value });
                }
                state.instances.live.remove(name);
                state.re_renders.remove(name);
                state.remove_field(name)?;
                debug!(field = name, "Last instance detached, field cached and removed");
                return Ok(());
            }

            if auto_unmount && !state.registry.contains(name) {
                if let Some(cached) = state.instances.cached.get(name).cloned() {
                    debug!(field = name, "Restoring cached field");
                    state.registry.insert(cached.meta);
                    state.write_value(name, cached.value)?;
                }
            }

            let Some(meta) = state.registry.get(name) else {
                return Ok(());
            };
            let field_ref = meta.field_ref.clone();
            if let Some(field_ref) = &field_ref {
                field_ref.check(name)?;
            }

            match &instance {
                Some(handle) => {
                    if auto_unmount {
                        state.instances.mount(name);
                    }
                    state.instances.live.insert(name.to_string(), handle.clone());
                }
                None => {
                    state.instances.live.remove(name);
                }
            }
            field_ref
        };

        if let Some(field_ref) = field_ref {
            field_ref.deliver(name, instance.as_ref())?;
        }
        Ok(())
    }
}
