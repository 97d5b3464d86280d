//! Form configuration
//!
//! `FormConfig` holds the serializable engine options. It can be built in
//! code, or loaded with figment from defaults, an optional config file
//! (TOML, YAML or JSON, picked by extension) and `FIELDSTATE_` environment
//! variables (highest priority).
//!
//! Options handed to the validation engine follow an explicit precedence:
//! call-site [`ValidateOptions`] beat the stored config, which beats the
//! hard-coded default.

use std::path::Path as FsPath;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::validator::EngineOptions;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "FIELDSTATE_";

/// Engine-wide options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Nested mode: field names are paths into one value tree
    pub parse_name: bool,
    /// Ask the renderer for a forced re-render instead of a state update
    pub force_update: bool,
    /// Passed through for the UI collaborator
    pub scroll_to_first_error: bool,
    /// Stop batch validation at the first violation
    pub first: bool,
    /// Drop a field when its last instance detaches
    pub auto_unmount: bool,
    /// Run trigger validation from `handle_event`
    pub auto_validate: bool,
    /// Opaque message table for the engine
    pub messages: Option<Value>,
    /// Values supplied up front; also the default cache consulted by `init`
    pub values: Map<String, Value>,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            parse_name: false,
            force_update: false,
            scroll_to_first_error: true,
            first: false,
            auto_unmount: true,
            auto_validate: true,
            messages: None,
            values: Map::new(),
        }
    }
}

impl FormConfig {
    /// Figment with defaults, the optional file and environment overrides.
    ///
    /// `.yaml`/`.yml` and `.json` files use their format; anything else is
    /// read as TOML.
    pub fn figment(path: Option<&FsPath>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FormConfig::default()));
        if let Some(path) = path {
            let extension = path.extension().and_then(|ext| ext.to_str());
            debug!(path = %path.display(), ?extension, "Layering form config file");
            figment = match extension {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the config from the layered sources.
    pub fn load(path: Option<&FsPath>) -> Result<Self> {
        let config: FormConfig = Self::figment(path).extract()?;
        debug!(
            parse_name = config.parse_name,
            first = config.first,
            auto_unmount = config.auto_unmount,
            "Loaded form config"
        );
        Ok(config)
    }

    /// Merge a partial update. Only the fields present in `patch` change.
    pub fn apply(&mut self, patch: FormConfigPatch) {
        if let Some(force_update) = patch.force_update {
            self.force_update = force_update;
        }
        if let Some(scroll) = patch.scroll_to_first_error {
            self.scroll_to_first_error = scroll;
        }
        if let Some(first) = patch.first {
            self.first = first;
        }
        if let Some(auto_unmount) = patch.auto_unmount {
            self.auto_unmount = auto_unmount;
        }
        if let Some(auto_validate) = patch.auto_validate {
            self.auto_validate = auto_validate;
        }
        if let Some(messages) = patch.messages {
            self.messages = Some(messages);
        }
    }

    /// Resolve the options sent to the engine for one call.
    pub fn engine_options(&self, call: &ValidateOptions) -> EngineOptions {
        EngineOptions {
            first: call.first.unwrap_or(self.first),
            messages: call.messages.clone().or_else(|| self.messages.clone()),
        }
    }
}

/// Partial update for [`FormConfig`], used by `Form::set_options`.
///
/// `parse_name` and `values` are fixed at construction and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfigPatch {
    pub force_update: Option<bool>,
    pub scroll_to_first_error: Option<bool>,
    pub first: Option<bool>,
    pub auto_unmount: Option<bool>,
    pub auto_validate: Option<bool>,
    pub messages: Option<Value>,
}

/// Per-call engine options for batch validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateOptions {
    pub first: Option<bool>,
    pub messages: Option<Value>,
}

impl ValidateOptions {
    pub fn first(mut self, first: bool) -> Self {
        self.first = Some(first);
        self
    }

    pub fn messages(mut self, messages: Value) -> Self {
        self.messages = Some(messages);
        self
    }
}
