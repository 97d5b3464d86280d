//! Validation orchestration: per-field trigger validation and batch
//! validation in callback and promise styles.

use std::future::Future;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AfterValidate, Form, FormState, Pending, Settled};
use crate::config::ValidateOptions;
use crate::error::{FormError, Result};
use crate::types::{
    map_rules_by_trigger, ErrorGroup, FieldStatus, RenderReason, Selection, ValidationOutcome,
};
use crate::validator::{EngineOptions, RuleViolation, ValidationRequest, ValidatorError};

/// A started trigger validation. Loading status and supersession are
/// already recorded; awaiting it applies the engine's answer.
///
/// Dropping it before it finishes abandons the validation: the field goes
/// back to the status and errors it had before, unless another validation
/// of the same field is still in flight.
pub type PendingValidation = BoxFuture<'static, Result<FieldValidation>>;

/// How a trigger validation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValidation {
    Applied {
        status: FieldStatus,
        errors: Vec<String>,
        /// Whether status or errors differ from before the validation
        changed: bool,
    },
    /// A later validation for the same field and trigger took over, or the
    /// field went away
    Superseded,
}

enum Batch {
    /// No targeted field has rules; the engine is not called
    NoRules(ValidationOutcome),
    Engine {
        request: ValidationRequest,
        names: Vec<String>,
        /// State of each cleared field, put back if the engine fails
        cleared: Vec<(String, Settled)>,
    },
}

/// Travels with a [`PendingValidation`] and abandons it on drop. Once the
/// validation has finished or been superseded the generation no longer
/// matches and dropping does nothing.
struct InFlight {
    form: Form,
    name: String,
    trigger: String,
    generation: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.form.lock();
        abandon_field_validation(&mut state, &self.name, &self.trigger, self.generation);
    }
}

impl Form {
    /// Start validating `name` with the rules bound to `trigger`.
    ///
    /// Returns `Ok(None)` when the field is unknown or has no rules for that
    /// trigger. A previous validation for the same field and trigger is
    /// cancelled; other triggers are unaffected.
    pub fn validate_field(&self, name: &str, trigger: &str) -> Result<Option<PendingValidation>> {
        let (request, generation) = {
            let mut state = self.lock();
            match start_field_validation(&mut state, name, trigger)? {
                Some(started) => started,
                None => return Ok(None),
            }
        };

        let form = self.clone();
        let name = name.to_string();
        let trigger = trigger.to_string();
        let cancel = request.cancel.clone();
        let validator = self.inner.hooks.validator.clone();
        let in_flight = InFlight {
            form: self.clone(),
            name: name.clone(),
            trigger: trigger.clone(),
            generation,
        };

        Ok(Some(Box::pin(async move {
            let _in_flight = in_flight;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = validator.validate(request) => Some(result),
            };
            match result {
                Some(result) => form.finish_field_validation(&name, &trigger, generation, result),
                None => {
                    debug!(field = %name, trigger = %trigger, "Validation superseded");
                    Ok(FieldValidation::Superseded)
                }
            }
        })))
    }

    fn finish_field_validation(
        &self,
        name: &str,
        trigger: &str,
        generation: u64,
        result: std::result::Result<Vec<RuleViolation>, ValidatorError>,
    ) -> Result<FieldValidation> {
        let errors = match result {
            Ok(violations) => Ok(violations
                .iter()
                .map(|violation| self.process_message(&violation.message))
                .collect::<Vec<_>>()),
            Err(err) => Err(err),
        };

        let (outcome, plan) = {
            let mut state = self.lock();
            let key = (name.to_string(), trigger.to_string());
            let current = state
                .pending
                .get(&key)
                .is_some_and(|pending| pending.generation == generation);
            if !current {
                debug!(field = name, trigger, "Ignoring stale validation result");
                return Ok(FieldValidation::Superseded);
            }
            let Some(pending) = state.pending.remove(&key) else {
                return Ok(FieldValidation::Superseded);
            };
            let Some(meta) = state.registry.get_mut(name) else {
                return Ok(FieldValidation::Superseded);
            };

            let errors = match errors {
                Ok(errors) => errors,
                Err(err) => {
                    warn!(field = name, trigger, error = %err, "Validation engine failed");
                    meta.status = pending.settled.status;
                    meta.errors = pending.settled.errors;
                    return Err(FormError::Engine(err));
                }
            };

            let status = if errors.is_empty() {
                FieldStatus::Success
            } else {
                FieldStatus::Error
            };
            let changed = pending.settled.status != status
                || pending.settled.errors.as_ref() != Some(&errors);
            meta.status = status;
            meta.errors = Some(errors.clone());
            debug!(field = name, trigger, %status, changed, "Applied validation result");

            let plan = changed
                .then(|| state.route(Some(&[name.to_string()]), RenderReason::Validate));
            (
                FieldValidation::Applied {
                    status,
                    errors,
                    changed,
                },
                plan,
            )
        };

        if let Some(plan) = plan {
            self.run(plan);
        }
        Ok(outcome)
    }

    /// Validate `selection` and hand `(errors, values)` to `callback`, then
    /// notify and run the after-validate hook.
    ///
    /// When no targeted field has rules the callback gets the fields'
    /// existing errors and nothing is notified.
    pub async fn validate_callback<F>(&self, selection: impl Into<Selection>, callback: F) -> Result<()>
    where
        F: FnOnce(Option<&ErrorGroup>, &Map<String, Value>),
    {
        self.validate_callback_with(selection, ValidateOptions::default(), callback)
            .await
    }

    pub async fn validate_callback_with<F>(
        &self,
        selection: impl Into<Selection>,
        options: ValidateOptions,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Option<&ErrorGroup>, &Map<String, Value>),
    {
        let selection = selection.into();
        let (outcome, ran) = self.run_batch(&selection, &options).await?;
        callback(outcome.errors.as_ref(), &outcome.values);
        if !ran {
            return Ok(());
        }

        self.notify_batch(&selection);
        if let Some(hook) = &self.inner.hooks.after_validate {
            let context = {
                let state = self.lock();
                AfterValidate {
                    errors_group: outcome.errors,
                    options: state.config.clone(),
                    instances: state.instances.live.clone(),
                }
            };
            hook(&context);
        }
        Ok(())
    }

    /// Validate `selection` and return `{errors, values}`.
    pub async fn validate_promise(&self, selection: impl Into<Selection>) -> Result<ValidationOutcome> {
        self.validate_promise_with(selection, ValidateOptions::default())
            .await
    }

    pub async fn validate_promise_with(
        &self,
        selection: impl Into<Selection>,
        options: ValidateOptions,
    ) -> Result<ValidationOutcome> {
        let selection = selection.into();
        let (outcome, ran) = self.run_batch(&selection, &options).await?;
        if ran {
            self.notify_batch(&selection);
        }
        Ok(outcome)
    }

    /// Validate `selection` and pass the outcome through `post`, whose
    /// result becomes the return value.
    ///
    /// A failing `post` is returned as [`FormError::PostProcess`] and
    /// nothing is notified.
    pub async fn validate_promise_then<T, F, Fut>(
        &self,
        selection: impl Into<Selection>,
        post: F,
    ) -> Result<T>
    where
        F: FnOnce(ValidationOutcome) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let selection = selection.into();
        let (outcome, ran) = self
            .run_batch(&selection, &ValidateOptions::default())
            .await?;
        let result = post(outcome).await.map_err(|source| {
            warn!(error = %source, "Validation post-processor failed");
            FormError::PostProcess { source }
        })?;
        if ran {
            self.notify_batch(&selection);
        }
        Ok(result)
    }

    fn notify_batch(&self, selection: &Selection) {
        let plan = {
            let state = self.lock();
            match selection {
                Selection::All => state.route(None, RenderReason::Validate),
                Selection::Names(names) => state.route(Some(names), RenderReason::Validate),
            }
        };
        self.run(plan);
    }

    /// Shared batch core. The flag tells whether the engine ran.
    ///
    /// Overlapping batches are not serialized; whichever applies last wins.
    async fn run_batch(
        &self,
        selection: &Selection,
        options: &ValidateOptions,
    ) -> Result<(ValidationOutcome, bool)> {
        let batch = {
            let mut state = self.lock();
            prepare_batch(&mut state, selection, options)?
        };
        let (request, names, cleared) = match batch {
            Batch::NoRules(outcome) => {
                debug!("No targeted field has rules, skipping engine");
                return Ok((outcome, false));
            }
            Batch::Engine {
                request,
                names,
                cleared,
            } => (request, names, cleared),
        };

        debug!(fields = request.descriptor.len(), "Dispatching batch validation");
        let violations = match self.inner.hooks.validator.validate(request).await {
            Ok(violations) => violations,
            Err(err) => {
                warn!(error = %err, "Batch validation engine failed");
                restore_cleared(&mut self.lock(), cleared);
                return Err(FormError::Engine(err));
            }
        };

        let mut raw: ErrorGroup = IndexMap::new();
        for violation in &violations {
            raw.entry(violation.field.clone())
                .or_default()
                .push(violation.message.clone());
        }
        let processed: IndexMap<String, Vec<String>> = raw
            .iter()
            .map(|(field, messages)| {
                let messages = messages.iter().map(|m| self.process_message(m)).collect();
                (field.clone(), messages)
            })
            .collect();

        let mut state = self.lock();
        for (field, messages) in processed {
            if let Some(meta) = state.registry.get_mut(&field) {
                meta.errors = Some(messages);
                meta.status = FieldStatus::Error;
            }
        }

        let errors = match state.formatted_errors(&names) {
            Some(mut merged) => {
                merged.extend(raw);
                Some(merged)
            }
            None => (!raw.is_empty()).then_some(raw),
        };

        for name in &names {
            let failed = errors.as_ref().is_some_and(|group| group.contains_key(name));
            if let Some(meta) = state.registry.get_mut(name) {
                if meta.has_rules() && !failed {
                    meta.status = FieldStatus::Success;
                }
            }
        }

        let values = state.values_for(selection)?;
        debug!(
            failed = errors.as_ref().map_or(0, IndexMap::len),
            "Batch validation finished"
        );
        Ok((ValidationOutcome { errors, values }, true))
    }
}

/// Synchronous half of a trigger validation, run under the state lock.
fn start_field_validation(
    state: &mut FormState,
    name: &str,
    trigger: &str,
) -> Result<Option<(ValidationRequest, u64)>> {
    let Some(meta) = state.registry.get(name) else {
        return Ok(None);
    };
    let rules = map_rules_by_trigger(&meta.rules, &meta.trigger)
        .shift_remove(trigger)
        .unwrap_or_default();
    if rules.is_empty() {
        return Ok(None);
    }

    let value = state.store.read_field(meta)?;
    let key = (name.to_string(), trigger.to_string());
    let settled = match meta.status {
        FieldStatus::Loading => state
            .pending
            .get(&key)
            .or_else(|| {
                state
                    .pending
                    .iter()
                    .find(|((field, _), _)| field.as_str() == name)
                    .map(|(_, pending)| pending)
            })
            .map(|pending| pending.settled.clone()),
        _ => None,
    }
    .unwrap_or_else(|| Settled {
        status: meta.status,
        errors: meta.errors.clone(),
    });

    let generation = state.next_generation;
    state.next_generation += 1;
    let cancel = CancellationToken::new();
    let previous = state.pending.insert(
        key,
        Pending {
            generation,
            cancel: cancel.clone(),
            settled,
        },
    );
    if let Some(previous) = previous {
        debug!(field = name, trigger, "Superseding in-flight validation");
        previous.cancel.cancel();
    }

    if let Some(meta) = state.registry.get_mut(name) {
        meta.status = FieldStatus::Loading;
    }

    let mut descriptor = IndexMap::new();
    descriptor.insert(name.to_string(), rules);
    let mut values = Map::new();
    if let Some(value) = value {
        values.insert(name.to_string(), value);
    }
    let request = ValidationRequest {
        descriptor,
        values,
        options: EngineOptions {
            first: false,
            messages: state.config.messages.clone(),
        },
        cancel,
    };
    debug!(field = name, trigger, generation, "Started trigger validation");
    Ok(Some((request, generation)))
}

/// Drop the pending entry of an unfinished validation and put the field back
/// to its settled state.
fn abandon_field_validation(state: &mut FormState, name: &str, trigger: &str, generation: u64) {
    let key = (name.to_string(), trigger.to_string());
    let current = state
        .pending
        .get(&key)
        .is_some_and(|pending| pending.generation == generation);
    if !current {
        return;
    }
    let Some(pending) = state.pending.remove(&key) else {
        return;
    };
    if state.pending.keys().any(|(field, _)| field == name) {
        return;
    }
    if let Some(meta) = state.registry.get_mut(name) {
        meta.status = pending.settled.status;
        meta.errors = pending.settled.errors;
    }
    debug!(field = name, trigger, generation, "Abandoned unfinished validation");
}

/// Undo the clearing done by [`prepare_batch`]. Fields with a trigger
/// validation in flight are left alone.
fn restore_cleared(state: &mut FormState, cleared: Vec<(String, Settled)>) {
    for (name, settled) in cleared {
        if state.pending.keys().any(|(field, _)| *field == name) {
            continue;
        }
        if let Some(meta) = state.registry.get_mut(&name) {
            meta.status = settled.status;
            meta.errors = settled.errors;
        }
    }
}

/// Collect the request for a batch and clear targeted fields that have rules.
fn prepare_batch(
    state: &mut FormState,
    selection: &Selection,
    options: &ValidateOptions,
) -> Result<Batch> {
    let names = state.target_names(selection);
    let mut descriptor = IndexMap::new();
    let mut values = Map::new();
    let mut cleared = Vec::new();

    for name in &names {
        let Some(meta) = state.registry.get(name) else {
            continue;
        };
        if !meta.has_rules() {
            continue;
        }
        descriptor.insert(name.clone(), meta.rules.clone());
        if let Some(value) = state.store.read_field(meta)? {
            values.insert(name.clone(), value);
        }
        cleared.push((
            name.clone(),
            Settled {
                status: meta.status,
                errors: meta.errors.clone(),
            },
        ));
        if let Some(meta) = state.registry.get_mut(name) {
            meta.errors = Some(Vec::new());
            meta.status = FieldStatus::Idle;
        }
    }

    if descriptor.is_empty() {
        return Ok(Batch::NoRules(ValidationOutcome {
            errors: state.formatted_errors(&names),
            values: state.values_for(selection)?,
        }));
    }

    Ok(Batch::Engine {
        request: ValidationRequest {
            descriptor,
            values,
            options: state.config.engine_options(options),
            cancel: CancellationToken::new(),
        },
        names,
        cleared,
    })
}
