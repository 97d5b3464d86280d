//! Field-state engine for interactive forms
//!
//! A [`Form`] tracks, for any number of named fields, the current value, the
//! validation rules, the validation status and the error list, and keeps them
//! consistent while fields register, unregister, move with array splices and
//! re-validate.
//!
//! Values live either in a flat name-to-value map or in a single nested tree
//! addressed by path (`user.emails[0]`), chosen once with
//! [`FormConfig::parse_name`]. Rules are opaque: they are handed to a
//! [`Validator`] implementation together with the current values.
//!
//! ```rust
//! use fieldstate::{FieldInit, Form, FormConfig, Selection};
//! use serde_json::json;
//!
//! let form = Form::new(FormConfig { parse_name: true, ..Default::default() });
//! form.init("user.name", FieldInit::new().init_value(json!("frank"))).unwrap();
//! form.set_value("user.age", json!(30)).unwrap();
//! assert_eq!(
//!     form.get_values(Selection::All).unwrap()["user"],
//!     json!({"name": "frank", "age": 30})
//! );
//! ```

pub mod config;
pub mod error;
pub mod form;
pub mod instance;
pub mod notify;
pub mod registry;
pub mod reindex;
pub mod store;
pub mod types;
pub mod validator;

pub use config::{FormConfig, FormConfigPatch, ValidateOptions, ENV_PREFIX};
pub use error::{FormError, Result};
pub use form::{
    AfterValidate, FieldInit, FieldSnapshot, FieldValidation, Form, FormBuilder, PendingValidation,
};
pub use instance::{FieldRef, Instance};
pub use notify::{ReRender, RenderMode, Renderer};
pub use reindex::{Relocation, SplicePlan};
pub use store::ValueStore;
pub use types::{
    ErrorGroup, FieldMeta, FieldStatus, RenderReason, Rule, Selection, ValidationOutcome,
};
pub use validator::{
    AcceptAll, EngineOptions, RuleViolation, ValidationRequest, Validator, ValidatorError,
};

// Re-export the path crate for callers that address values directly
pub use fieldstate_path as path;
