//! Read, write, remove and existence checks over a `serde_json::Value` tree.
//!
//! Writes take the tree by `&mut` (or by value for the consuming forms): the
//! caller owns its root and swaps in the result, which gives the same
//! isolation as copy-on-write without sharing subtrees. Reads are lenient and
//! report a path that cannot be followed as absent; writes fail fast.

use serde_json::{Map, Value};

use crate::error::{PathError, Result};
use crate::path::{Path, Segment};

/// Most `null`s a single write may add past the end of a sequence.
pub const MAX_PADDING: usize = 65_536;

/// Follow one segment from `node`, if possible.
///
/// Index segments also address mapping keys (`{"0": ..}`), matching how
/// dotted numeric segments are written by hand.
pub fn step<'a>(node: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (node, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        _ => None,
    }
}

/// Read the value at `path`. The empty path returns the root.
pub fn get<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| step(node, segment))
}

/// Mutable counterpart of [`get`]; never creates anything.
pub fn get_mut<'a>(root: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| step_mut(node, segment))
}

/// Whether `path` resolves to a value (a JSON `null` counts as present).
pub fn has(root: &Value, path: &Path) -> bool {
    get(root, path).is_some()
}

/// Write `value` at `path`, creating intermediate containers as needed.
///
/// A missing or `null` intermediate becomes a sequence when the segment
/// applied to it is an index and a mapping otherwise. Writing past the end of
/// a sequence pads it with `null`, at most [`MAX_PADDING`] of them; a larger
/// gap is a [`PathError::IndexOutOfRange`]. Descending into a scalar, or into
/// a sequence with a non-numeric key, is a [`PathError::ContainerMismatch`].
///
/// On error the tree is unchanged: padding is checked before anything is
/// written, containers are only created below the deepest existing node, and
/// mismatches can only be found above it.
pub fn set_in(root: &mut Value, path: &Path, value: Value) -> Result<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = value;
        return Ok(());
    };
    check_padding(root, path)?;

    let mut node = root;
    for segment in parents {
        node = slot_mut(node, segment, path)?;
    }
    *slot_mut(node, last, path)? = value;
    Ok(())
}

/// Consuming form of [`set_in`]: returns the new root.
pub fn set(mut root: Value, path: &Path, value: Value) -> Result<Value> {
    set_in(&mut root, path, value)?;
    Ok(root)
}

/// Remove the value at `path` and return it. Missing paths are a no-op.
///
/// Removing the last element of a sequence shortens it; removing an inner
/// element leaves a `null` hole so later siblings keep their indexes.
/// Removing the empty path resets the root to `null`.
pub fn remove_in(root: &mut Value, path: &Path) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::take(root));
    };

    let mut node = root;
    for segment in parents {
        node = step_mut(node, segment)?;
    }

    match (node, last) {
        (Value::Object(map), Segment::Key(key)) => map.shift_remove(key),
        (Value::Object(map), Segment::Index(index)) => map.shift_remove(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) if items.len().checked_sub(1) == Some(*index) => {
            items.pop()
        }
        (Value::Array(items), Segment::Index(index)) if *index < items.len() => {
            Some(std::mem::take(&mut items[*index]))
        }
        _ => None,
    }
}

/// Consuming form of [`remove_in`]: returns the new root.
pub fn remove(mut root: Value, path: &Path) -> Value {
    remove_in(&mut root, path);
    root
}

fn step_mut<'a>(node: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match (node, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get_mut(key),
        (Value::Object(map), Segment::Index(index)) => map.get_mut(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

fn slot_mut<'a>(node: &'a mut Value, segment: &Segment, path: &Path) -> Result<&'a mut Value> {
    if node.is_null() {
        *node = match segment {
            Segment::Index(_) => Value::Array(Vec::new()),
            Segment::Key(_) => Value::Object(Map::new()),
        };
    }

    match (node, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            Ok(map.entry(key.clone()).or_insert(Value::Null))
        }
        (Value::Object(map), Segment::Index(index)) => {
            Ok(map.entry(index.to_string()).or_insert(Value::Null))
        }
        (Value::Array(items), Segment::Index(index)) => {
            if *index >= items.len() {
                let len = index
                    .checked_add(1)
                    .ok_or_else(|| PathError::IndexOutOfRange {
                        path: path.to_string(),
                        index: *index,
                        limit: MAX_PADDING,
                    })?;
                items.resize(len, Value::Null);
            }
            Ok(&mut items[*index])
        }
        (other, segment) => Err(PathError::ContainerMismatch {
            path: path.to_string(),
            segment: segment.to_string(),
            found: kind(other),
        }),
    }
}

/// Reject index segments that would pad a sequence by more than
/// [`MAX_PADDING`]. Absent and `null` nodes count as empty sequences.
fn check_padding(root: &Value, path: &Path) -> Result<()> {
    let mut node = Some(root);
    for segment in path.segments() {
        let len = match node {
            Some(Value::Array(items)) => Some(items.len()),
            None | Some(Value::Null) => Some(0),
            Some(_) => None,
        };
        if let (Segment::Index(index), Some(len)) = (segment, len) {
            if index.saturating_sub(len) > MAX_PADDING {
                return Err(PathError::IndexOutOfRange {
                    path: path.to_string(),
                    index: *index,
                    limit: MAX_PADDING,
                });
            }
        }
        node = node.and_then(|node| step(node, segment));
    }
    Ok(())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
