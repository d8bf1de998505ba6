//! Top-level field comparator.

use serde_json::Value;

use crate::{ChangeSet, DiffOptions, ALL};

/// Compare top-level fields, descending one level into objects present on
/// both sides. Used when [`deep_diff`](crate::deep_diff) fails.
pub fn basic_diff(options: &DiffOptions<'_>, old: &Value, new: &Value) -> ChangeSet {
    let mut changes = ChangeSet::new();
    let (Value::Object(old), Value::Object(new)) = (old, new) else {
        if old != new {
            changes.insert(ALL.to_string(), true);
        }
        return changes;
    };

    for key in old.keys().chain(new.keys()) {
        let lowered = key.to_lowercase();
        if options.is_ignored(&lowered) {
            continue;
        }
        let (o, n) = (old.get(key), new.get(key));
        if o == n {
            continue;
        }
        match (o, n) {
            (Some(Value::Object(o)), Some(Value::Object(n))) => {
                for sub in o.keys().chain(n.keys()) {
                    if o.get(sub) != n.get(sub) {
                        changes.insert(format!("{lowered}.{sub}"), true);
                    }
                }
            }
            _ => {
                changes.insert(lowered, true);
            }
        }
    }
    changes
}
