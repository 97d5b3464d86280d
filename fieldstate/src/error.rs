//! Error types for the form engine

use fieldstate_path::PathError;
use thiserror::Error;

use crate::validator::ValidatorError;

/// Result type for form operations
pub type Result<T> = std::result::Result<T, FormError>;

/// Errors that can occur in form operations
///
/// Rule violations are not errors: they land on the field as
/// `FieldStatus::Error` plus messages and are reported through the
/// validation outcome.
#[derive(Debug, Error)]
pub enum FormError {
    /// Field name could not be used as a path, or a write hit the wrong container kind
    #[error(transparent)]
    Path(#[from] PathError),

    /// A field was given a string ref, which cannot receive an instance
    #[error("can not set string ref for {name}")]
    StringRef { name: String },

    /// Splice target holds something other than a sequence
    #[error("cannot splice '{key}': value is not an array")]
    NotAnArray { key: String },

    /// The validation engine itself failed
    #[error(transparent)]
    Engine(#[from] ValidatorError),

    /// The post-processor handed to `validate_promise_then` failed
    #[error("validation post-processor failed: {source}")]
    PostProcess {
        #[source]
        source: anyhow::Error,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for FormError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
