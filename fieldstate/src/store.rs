//! Value store: the authoritative field values.
//!
//! Flat mode keeps one entry per field name, whatever its syntax. Nested mode
//! keeps a single tree and treats every field name as a path into it, so
//! fields sharing a prefix share data.

use fieldstate_path::{self as tree, Path, Segment};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{FormError, Result};
use crate::types::FieldMeta;

#[derive(Debug, Clone)]
pub enum ValueStore {
    Flat(IndexMap<String, Value>),
    Nested(Value),
}

impl ValueStore {
    /// Build a store seeded with `values`. `nested` fixes the mode for good.
    pub fn new(nested: bool, values: Map<String, Value>) -> Self {
        if nested {
            ValueStore::Nested(Value::Object(values))
        } else {
            ValueStore::Flat(values.into_iter().collect())
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, ValueStore::Nested(_))
    }

    /// Current value of `name`; `None` is undefined.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        match self {
            ValueStore::Flat(map) => Ok(map.get(name).cloned()),
            ValueStore::Nested(root) => {
                let path = Path::parse(name)?;
                Ok(tree::get(root, &path).cloned())
            }
        }
    }

    /// Write `value` at `name`. Writing `None` makes the value undefined.
    pub fn set(&mut self, name: &str, value: Option<Value>) -> Result<()> {
        trace!(field = name, ?value, "Writing value");
        let Some(value) = value else {
            return self.remove(name);
        };
        match self {
            ValueStore::Flat(map) => {
                map.insert(name.to_string(), value);
            }
            ValueStore::Nested(root) => tree::set_in(root, &Path::parse(name)?, value)?,
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        match self {
            ValueStore::Flat(map) => {
                map.shift_remove(name);
            }
            ValueStore::Nested(root) => {
                tree::remove_in(root, &Path::parse(name)?);
            }
        }
        Ok(())
    }

    /// Drop every value. A nested store keeps an empty mapping as its root.
    pub fn clear(&mut self) {
        match self {
            ValueStore::Flat(map) => map.clear(),
            ValueStore::Nested(root) => *root = Value::Object(Map::new()),
        }
    }

    /// Shallow copy of the whole store, keyed at the top level.
    pub fn snapshot(&self) -> Map<String, Value> {
        match self {
            ValueStore::Flat(map) => map
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            ValueStore::Nested(Value::Object(map)) => map.clone(),
            ValueStore::Nested(_) => Map::new(),
        }
    }

    /// Accessor used wherever a field's live value is needed.
    pub fn read_field(&self, meta: &FieldMeta) -> Result<Option<Value>> {
        self.get(&meta.name)
    }

    /// Counterpart of [`ValueStore::read_field`] for registered fields.
    pub fn write_field(&mut self, meta: &FieldMeta, value: Option<Value>) -> Result<()> {
        self.set(&meta.name, value)
    }

    /// Move a flat entry to a new name. Nested values follow their paths and
    /// are left alone.
    pub fn relocate(&mut self, from: &str, to: &str) {
        if let ValueStore::Flat(map) = self {
            match map.shift_remove(from) {
                Some(value) => {
                    map.insert(to.to_string(), value);
                }
                None => {
                    map.shift_remove(to);
                }
            }
        }
    }

    /// Merge `partial` into the store.
    ///
    /// Flat mode writes each entry. Nested mode merges at the top level only;
    /// a registered field the partial did not overwrite keeps its previous
    /// value even when the merge dropped it.
    pub fn merge(&mut self, partial: Map<String, Value>, registered: &[String]) -> Result<()> {
        match self {
            ValueStore::Flat(map) => {
                for (name, value) in partial {
                    map.insert(name, value);
                }
                Ok(())
            }
            ValueStore::Nested(root) => {
                let incoming = Value::Object(partial);
                let mut kept = Vec::new();
                for name in registered {
                    let path = Path::parse(name)?;
                    if is_overwritten(&incoming, &path) {
                        continue;
                    }
                    if let Some(value) = tree::get(root, &path) {
                        kept.push((path, value.clone()));
                    }
                }

                let mut merged = match std::mem::take(root) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                if let Value::Object(partial) = incoming {
                    merged.extend(partial);
                }
                let mut merged = Value::Object(merged);

                for (path, value) in kept {
                    if !tree::has(&merged, &path) {
                        trace!(field = %path, "Restoring value lost in merge");
                        tree::set_in(&mut merged, &path, value)?;
                    }
                }
                *root = merged;
                Ok(())
            }
        }
    }

    /// Length of the sequence at `key`, if it holds one.
    pub fn array_len(&self, key: &str) -> Result<Option<usize>> {
        Ok(self.get(key)?.and_then(|v| v.as_array().map(Vec::len)))
    }

    /// Apply `splice(index, howmany, inserted)` to the sequence at `key`.
    ///
    /// An absent or `null` value is skipped (`Ok(false)`); any other
    /// non-sequence is [`FormError::NotAnArray`]. Out-of-range positions are
    /// clamped to the sequence length.
    pub fn splice(
        &mut self,
        key: &str,
        index: usize,
        howmany: usize,
        inserted: Vec<Value>,
    ) -> Result<bool> {
        let target = match self {
            ValueStore::Flat(map) => map.get_mut(key),
            ValueStore::Nested(root) => tree::get_mut(root, &Path::parse(key)?),
        };
        match target {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Array(items)) => {
                let start = index.min(items.len());
                let end = start.saturating_add(howmany).min(items.len());
                items.splice(start..end, inserted);
                trace!(key, len = items.len(), "Spliced array value");
                Ok(true)
            }
            Some(_) => Err(FormError::NotAnArray {
                key: key.to_string(),
            }),
        }
    }
}

/// Whether `partial` explicitly supplies the location at `path`.
///
/// Walking stops as overwritten as soon as the partial holds something that
/// cannot contain the next segment; a missing key means the caller did not
/// mention the field.
pub fn is_overwritten(partial: &Value, path: &Path) -> bool {
    let mut node = partial;
    for segment in path.segments() {
        let next = match (node, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get(key),
            (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            _ => return true,
        };
        match next {
            Some(next) => node = next,
            None => return false,
        }
    }
    true
}
