//! The external rule-validation engine seam.
//!
//! The engine receives a descriptor (field name → rules) together with the
//! current values and answers with a list of violations. Rules are opaque to
//! this crate; only the engine interprets them.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::Rule;

/// Options forwarded to the engine with every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineOptions {
    /// Stop at the first violation
    pub first: bool,
    /// Opaque message table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Value>,
}

/// One validation call.
///
/// `values` holds an entry per descriptor field that currently has a value;
/// a missing key means the field is undefined.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub descriptor: IndexMap<String, Vec<Rule>>,
    pub values: Map<String, Value>,
    pub options: EngineOptions,
    /// Fired when the form stops listening for this result. Engines may
    /// use it to stop early; ignoring it is allowed.
    pub cancel: CancellationToken,
}

/// A single rule violation reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub field: String,
    pub message: String,
}

impl RuleViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Hard failure of the engine call (not a rule violation).
#[derive(Debug, Clone, Error)]
#[error("validation engine failed: {message}")]
pub struct ValidatorError {
    pub message: String,
}

impl ValidatorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The rule-validation engine consumed by the form.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate `request.values` against `request.descriptor`.
    ///
    /// An empty list means every field passed.
    async fn validate(
        &self,
        request: ValidationRequest,
    ) -> std::result::Result<Vec<RuleViolation>, ValidatorError>;
}

/// Engine used when none is configured: every value passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl Validator for AcceptAll {
    async fn validate(
        &self,
        _request: ValidationRequest,
    ) -> std::result::Result<Vec<RuleViolation>, ValidatorError> {
        Ok(Vec::new())
    }
}
