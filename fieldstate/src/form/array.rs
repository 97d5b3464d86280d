//! Array helpers: splice a sequence value and reindex its sibling fields.

use std::collections::BTreeMap;

use fieldstate_path::Path;
use serde_json::Value;
use tracing::{debug, warn};

use super::Form;
use crate::error::Result;
use crate::reindex::{split_index_template, Relocation, SplicePlan};
use crate::types::RenderReason;

impl Form {
    /// Insert `values` at `index` of the sequence at `key`.
    pub fn add_array_value(&self, key: &str, index: usize, values: Vec<Value>) -> Result<()> {
        self.splice_array_value(key, index, 0, values)
    }

    /// Remove `howmany` elements starting at `index`.
    pub fn delete_array_value(&self, key: &str, index: usize, howmany: usize) -> Result<()> {
        self.splice_array_value(key, index, howmany, Vec::new())
    }

    /// `splice(index, howmany, ..inserted)` on the sequence at `key`, moving
    /// the metadata (and, in flat mode, the values) of fields under
    /// `key.<n>` so they keep following their elements.
    ///
    /// When a sequence is stored at `key`, `index` and `howmany` are clamped
    /// to its length first.
    pub fn splice_array_value(
        &self,
        key: &str,
        index: usize,
        howmany: usize,
        inserted: Vec<Value>,
    ) -> Result<()> {
        let key_path = Path::parse(key)?;
        let plan = {
            let mut state = self.lock();
            let (index, howmany) = match state.store.array_len(key)? {
                Some(len) => {
                    let index = index.min(len);
                    (index, howmany.min(len - index))
                }
                None => (index, howmany),
            };
            let plan = SplicePlan::compute(
                &state.registry.names(),
                &key_path,
                index,
                howmany,
                inserted.len(),
            );

            // The sequence is spliced first so a non-sequence fails before any entry moves
            state.store.splice(key, index, howmany, inserted)?;

            let affected: Vec<String> = plan.affected().map(str::to_string).collect();
            for name in &affected {
                state.cancel_pending(name);
            }
            for Relocation { from, to } in &plan.relocations {
                state.registry.relocate(from, to);
                state.store.relocate(from, to);
            }
            let flat = !state.store.is_nested();
            for name in &plan.stale {
                state.registry.remove(name);
                if flat {
                    state.store.remove(name)?;
                }
            }
            state.route(None, RenderReason::SetValue)
        };
        self.run(plan);
        Ok(())
    }

    /// Shift the values of `key.{index}` fields past `start_index` down by
    /// one, as after deleting `start_index`.
    ///
    /// Superseded by [`Form::delete_array_value`]. Only values move; the
    /// entries of the last index are removed. The template must end in
    /// `.{index}` or `[{index}]` and the matched indexes must run without
    /// gaps from `start_index + 1`, otherwise nothing happens.
    #[deprecated(note = "use `delete_array_value` instead")]
    pub fn splice_array(&self, key_match: &str, start_index: usize) -> Result<()> {
        let Some(key) = split_index_template(key_match) else {
            warn!(key_match, "Key should end in an index placeholder");
            return Ok(());
        };
        let key_path = Path::parse(key)?;

        let mut state = self.lock();
        let mut groups: BTreeMap<usize, Vec<Relocation>> = BTreeMap::new();
        for name in state.registry.names() {
            let Ok(path) = Path::parse(&name) else {
                continue;
            };
            let Some(child) = path.index_after(&key_path) else {
                continue;
            };
            if child.index > start_index {
                let to = path.with_index(&child, child.index - 1);
                groups
                    .entry(child.index)
                    .or_default()
                    .push(Relocation { from: name, to });
            }
        }

        let contiguous = groups
            .keys()
            .enumerate()
            .all(|(offset, index)| *index == start_index + 1 + offset);
        if groups.is_empty() || !contiguous {
            warn!(
                key_match,
                start_index, "Matched indexes do not follow the start index, nothing spliced"
            );
            return Ok(());
        }

        let len_before = state.store.array_len(key)?;
        for Relocation { from, to } in groups.values().flatten() {
            let value = state.store.get(from)?;
            state.write_value(to, value)?;
        }
        if let Some((_, last)) = groups.last_key_value() {
            for Relocation { from, .. } in last {
                state.remove_field(from)?;
            }
        }

        // A nested tree keeps its length when the removed entry was an inner path
        if let Some(len) = len_before.filter(|len| *len > 0) {
            if state.store.array_len(key)? == Some(len) {
                state.store.splice(key, len - 1, 1, Vec::new())?;
            }
        }
        debug!(key, start_index, groups = groups.len(), "Spliced array (deprecated)");
        Ok(())
    }
}
