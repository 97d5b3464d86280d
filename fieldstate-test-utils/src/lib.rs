//! Test utilities for fieldstate crates
//!
//! Shared doubles for the external collaborators of a form:
//!
//! - [`RuleEngine`]: a validation engine that understands a handful of rule
//!   keys and counts its calls
//! - [`GatedEngine`]: an engine whose answers are released by the test, for
//!   controlling completion order of overlapping validations
//! - [`RecordingRenderer`] and [`field_recorder`]: capture re-render requests
//! - [`config_file`]: a temporary TOML config file

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use fieldstate::{
    RenderMode, RenderReason, ReRender, Renderer, RuleViolation, ValidationRequest, Validator,
    ValidatorError,
};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::{oneshot, watch};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Validation engine that interprets simple rules.
///
/// Understood keys: `required` (bool), `minLength` and `maxLength` (string
/// length), and `message` to override the text. Without `message`, the
/// request's `messages` table is consulted at `messages[<key>]` with `%s`
/// replaced by the field name. Length rules skip empty strings.
#[derive(Default)]
pub struct RuleEngine {
    calls: AtomicUsize,
    requests: Mutex<Vec<ValidationRequest>>,
}

impl RuleEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times the engine was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<ValidationRequest> {
        locked(&self.requests).clone()
    }

    fn check(field: &str, rule: &Value, value: Option<&Value>, messages: Option<&Value>) -> Vec<String> {
        // Length rules only apply to non-empty strings
        let text = value.and_then(Value::as_str).filter(|text| !text.is_empty());
        let mut failed = Vec::new();

        let empty = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        };
        if rule.get("required").and_then(Value::as_bool) == Some(true) && empty {
            failed.push(("required", format!("{field} is required")));
        }
        if let (Some(min), Some(text)) = (rule.get("minLength").and_then(Value::as_u64), text) {
            if (text.chars().count() as u64) < min {
                failed.push(("minLength", format!("{field} must be at least {min} characters")));
            }
        }
        if let (Some(max), Some(text)) = (rule.get("maxLength").and_then(Value::as_u64), text) {
            if (text.chars().count() as u64) > max {
                failed.push(("maxLength", format!("{field} must be at most {max} characters")));
            }
        }

        failed
            .into_iter()
            .map(|(key, default)| {
                if let Some(message) = rule.get("message").and_then(Value::as_str) {
                    return message.to_string();
                }
                messages
                    .and_then(|table| table.get(key))
                    .and_then(Value::as_str)
                    .map(|template| template.replace("%s", field))
                    .unwrap_or(default)
            })
            .collect()
    }
}

#[async_trait]
impl Validator for RuleEngine {
    async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<Vec<RuleViolation>, ValidatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.requests).push(request.clone());

        let mut violations = Vec::new();
        for (field, rules) in &request.descriptor {
            for rule in rules {
                for message in Self::check(
                    field,
                    rule.as_value(),
                    request.values.get(field),
                    request.options.messages.as_ref(),
                ) {
                    violations.push(RuleViolation::new(field.clone(), message));
                    if request.options.first {
                        return Ok(violations);
                    }
                }
            }
        }
        Ok(violations)
    }
}

type Answer = Result<Vec<RuleViolation>, ValidatorError>;

/// Engine whose calls block until the test releases them.
///
/// Cancellation is deliberately ignored so tests can check that the form
/// itself stops listening to superseded calls.
pub struct GatedEngine {
    gates: Mutex<Vec<Option<oneshot::Sender<Answer>>>>,
    requests: Mutex<Vec<ValidationRequest>>,
    count: watch::Sender<usize>,
}

impl Default for GatedEngine {
    fn default() -> Self {
        Self {
            gates: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            count: watch::Sender::new(0),
        }
    }
}

impl GatedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until at least `n` calls have arrived.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.count.subscribe();
        // The sender lives in self, so the channel cannot close while waiting
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Answer call `index` (zero-based, in arrival order).
    pub fn release(&self, index: usize, violations: Vec<RuleViolation>) {
        self.answer(index, Ok(violations));
    }

    /// Fail call `index`.
    pub fn fail(&self, index: usize, message: &str) {
        self.answer(index, Err(ValidatorError::new(message)));
    }

    pub fn requests(&self) -> Vec<ValidationRequest> {
        locked(&self.requests).clone()
    }

    fn answer(&self, index: usize, answer: Answer) {
        let gate = locked(&self.gates).get_mut(index).and_then(Option::take);
        match gate {
            Some(gate) => {
                let _ = gate.send(answer);
            }
            None => panic!("no pending call #{index}"),
        }
    }
}

#[async_trait]
impl Validator for GatedEngine {
    async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<Vec<RuleViolation>, ValidatorError> {
        let (tx, rx) = oneshot::channel();
        locked(&self.gates).push(Some(tx));
        locked(&self.requests).push(request);
        self.count.send_modify(|count| *count += 1);
        rx.await
            .unwrap_or_else(|_| Err(ValidatorError::new("gate dropped")))
    }
}

/// Renderer that records every global re-render request.
#[derive(Default)]
pub struct RecordingRenderer {
    modes: Mutex<Vec<RenderMode>>,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn modes(&self) -> Vec<RenderMode> {
        locked(&self.modes).clone()
    }

    pub fn count(&self) -> usize {
        locked(&self.modes).len()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, mode: RenderMode) {
        locked(&self.modes).push(mode);
    }
}

/// A per-field re-render function and the reasons it was called with.
pub fn field_recorder() -> (ReRender, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    let re_render: ReRender = Arc::new(move |reason: &RenderReason| {
        locked(&seen).push(reason.to_string());
    });
    (re_render, log)
}

/// Write `contents` to a temporary `.toml` file.
pub fn config_file(contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::{json, Map};
    use tokio_util::sync::CancellationToken;

    fn request(rules: Value, value: Option<Value>, first: bool) -> ValidationRequest {
        let mut descriptor = IndexMap::new();
        descriptor.insert("name".to_string(), fieldstate::types::rules_from(rules));
        let mut values = Map::new();
        if let Some(value) = value {
            values.insert("name".to_string(), value);
        }
        ValidationRequest {
            descriptor,
            values,
            options: fieldstate::EngineOptions {
                first,
                messages: None,
            },
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_rule_engine_required_and_lengths() {
        let engine = RuleEngine::new();
        let violations = engine
            .validate(request(json!([{"required": true}, {"minLength": 3}]), Some(json!("ab")), false))
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "name must be at least 3 characters");

        let violations = engine
            .validate(request(json!({"required": true, "message": "fill it"}), None, false))
            .await
            .unwrap();
        assert_eq!(violations, vec![RuleViolation::new("name", "fill it")]);
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_rule_engine_first_stops_early() {
        let engine = RuleEngine::new();
        let violations = engine
            .validate(request(
                json!([{"required": true}, {"required": true, "message": "again"}]),
                None,
                true,
            ))
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);
    }

    #[tokio::test]
    async fn test_gated_engine_releases_in_any_order() {
        let engine = GatedEngine::new();
        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.validate(request(json!({}), None, false)).await }
        });
        let second = tokio::spawn({
            let engine = engine.clone();
            async move { engine.validate(request(json!({}), None, false)).await }
        });
        engine.wait_for_calls(2).await;

        engine.release(1, vec![]);
        engine.release(0, vec![RuleViolation::new("name", "x")]);
        assert_eq!(second.await.unwrap().unwrap().len(), 0);
        assert_eq!(first.await.unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_config_file() {
        let file = config_file("first = true\n").unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents, "first = true\n");
    }
}
