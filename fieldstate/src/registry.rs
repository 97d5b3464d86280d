//! Field registry: name to metadata, in registration order.

use indexmap::IndexMap;
use tracing::debug;

use crate::types::FieldMeta;

#[derive(Debug, Default, Clone)]
pub struct Registry {
    fields: IndexMap<String, FieldMeta>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldMeta> {
        self.fields.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Return the existing entry for `name`, creating a default one if needed.
    pub fn register(&mut self, name: &str) -> &mut FieldMeta {
        if !self.fields.contains_key(name) {
            debug!(field = name, "Registering field");
        }
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| FieldMeta::new(name))
    }

    /// Insert `meta` under its own name, replacing any previous entry.
    pub fn insert(&mut self, meta: FieldMeta) -> Option<FieldMeta> {
        self.fields.insert(meta.name.clone(), meta)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldMeta> {
        let removed = self.fields.shift_remove(name);
        if removed.is_some() {
            debug!(field = name, "Removed field");
        }
        removed
    }

    pub fn clear(&mut self) {
        debug!(count = self.fields.len(), "Clearing registry");
        self.fields.clear();
    }

    /// Move the entry at `from` to `to`, renaming it. Any entry at `to` is replaced.
    pub fn relocate(&mut self, from: &str, to: &str) -> bool {
        match self.fields.shift_remove(from) {
            Some(mut meta) => {
                meta.name = to.to_string();
                self.fields.insert(to.to_string(), meta);
                true
            }
            None => false,
        }
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
