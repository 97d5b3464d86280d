//! Instance port: tracks mounted UI instances per field name.
//!
//! A field whose last instance detaches is cached and removed; if another
//! instance attaches under the same name before the field is registered
//! again, the cached metadata and value come back.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::{FormError, Result};
use crate::types::FieldMeta;

/// Opaque handle to a mounted UI instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Where a field forwards its instance on attach and detach.
#[derive(Clone)]
pub enum FieldRef {
    /// Called with the instance, or `None` on detach
    Callback(Arc<dyn Fn(Option<&Instance>) + Send + Sync>),
    /// Holder whose content is replaced
    Slot(Arc<Mutex<Option<Instance>>>),
    /// A ref by name; cannot receive an instance
    Named(String),
}

impl FieldRef {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Option<&Instance>) + Send + Sync + 'static,
    {
        FieldRef::Callback(Arc::new(f))
    }

    /// Fails fast for [`FieldRef::Named`].
    pub(crate) fn check(&self, field: &str) -> Result<()> {
        match self {
            FieldRef::Named(_) => Err(FormError::StringRef {
                name: field.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn deliver(&self, field: &str, instance: Option<&Instance>) -> Result<()> {
        match self {
            FieldRef::Callback(callback) => {
                callback(instance);
                Ok(())
            }
            FieldRef::Slot(slot) => {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = instance.cloned();
                Ok(())
            }
            FieldRef::Named(_) => self.check(field),
        }
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Callback(_) => f.write_str("FieldRef::Callback"),
            FieldRef::Slot(_) => f.write_str("FieldRef::Slot"),
            FieldRef::Named(name) => f.debug_tuple("FieldRef::Named").field(name).finish(),
        }
    }
}

/// Metadata and value kept for a field whose last instance detached.
#[derive(Debug, Clone)]
pub(crate) struct CachedField {
    pub meta: FieldMeta,
    pub value: Option<Value>,
}

#[derive(Default)]
pub(crate) struct Instances {
    pub live: HashMap<String, Instance>,
    counts: HashMap<String, usize>,
    pub cached: HashMap<String, CachedField>,
}

impl Instances {
    pub fn mount(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_default() += 1;
    }

    /// Drop one mount and return how many remain.
    pub fn unmount(&mut self, name: &str) -> usize {
        match self.counts.get_mut(name) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        }
    }
}
