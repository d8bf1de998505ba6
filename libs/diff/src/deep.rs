//! Recursive JSON walker.

use serde_json::{Map, Value};

use crate::{ChangeSet, DiffError, DiffOptions, ALL};

/// Walk two JSON values and collect every differing leaf path.
///
/// Non-object roots that differ report [`ALL`].
pub fn deep_diff(
    options: &DiffOptions<'_>,
    old: &Value,
    new: &Value,
) -> Result<ChangeSet, DiffError> {
    let mut changes = ChangeSet::new();
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            for key in union_keys(old, new) {
                let lowered = key.to_lowercase();
                if options.is_ignored(&lowered) {
                    continue;
                }
                walk(
                    options,
                    &lowered,
                    old.get(key.as_str()),
                    new.get(key.as_str()),
                    1,
                    &mut changes,
                )?;
            }
        }
        _ if old != new => {
            changes.insert(ALL.to_string(), true);
        }
        _ => {}
    }
    Ok(changes)
}

fn walk(
    options: &DiffOptions<'_>,
    path: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    depth: usize,
    changes: &mut ChangeSet,
) -> Result<(), DiffError> {
    if depth > options.max_depth {
        return Err(DiffError::DepthExceeded {
            path: path.to_string(),
            limit: options.max_depth,
        });
    }

    match (old, new) {
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            for key in union_keys(old, new) {
                walk(
                    options,
                    &format!("{path}.{key}"),
                    old.get(key.as_str()),
                    new.get(key.as_str()),
                    depth + 1,
                    changes,
                )?;
            }
        }
        (Some(Value::Array(old)), Some(Value::Array(new))) => {
            for i in 0..old.len().max(new.len()) {
                walk(
                    options,
                    &format!("{path}.{i}"),
                    old.get(i),
                    new.get(i),
                    depth + 1,
                    changes,
                )?;
            }
        }
        (old, new) if old != new => {
            changes.insert(path.to_string(), true);
        }
        _ => {}
    }
    Ok(())
}

fn union_keys(old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = old.keys().chain(new.keys()).cloned().collect();
    keys.sort();
    keys.dedup();
    keys
}
