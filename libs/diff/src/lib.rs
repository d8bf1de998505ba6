//! Structural change detection.
//!
//! Entity stores call [`has_changes`] on every upsert to learn exactly which
//! fields moved. Paths are dotted: the top-level field name is lowercased,
//! nested map keys keep their case and array elements appear by index
//! (`config.volumes.1.mountPath`).
//!
//! A missing value on either side yields the [`ALL`] sentinel. Structures
//! the deep walker cannot handle fall back to a top-level comparator with
//! the same path format.

mod basic;
mod deep;
mod error;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

pub use basic::basic_diff;
pub use deep::deep_diff;
pub use error::DiffError;

/// Changed field paths. Every value is `true`.
pub type ChangeSet = BTreeMap<String, bool>;

/// Sentinel key reported when one side is missing.
pub const ALL: &str = "all";

/// Top-level fields that never count as a change.
pub const IGNORED_FIELDS: &[&str] = &[
    "id",
    "createdat",
    "updatedat",
    "lockedat",
    "deletedat",
    "workspaceid",
    "providerid",
];

/// Nesting depth beyond which the deep walker gives up.
pub const MAX_DEPTH: usize = 64;

/// The `{"all": true}` change set.
pub fn all_changed() -> ChangeSet {
    ChangeSet::from([(ALL.to_string(), true)])
}

/// Options for a diff run.
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions<'a> {
    /// Lowercased top-level field names to skip.
    pub ignored: &'a [&'a str],
    pub max_depth: usize,
}

impl Default for DiffOptions<'_> {
    fn default() -> Self {
        Self {
            ignored: IGNORED_FIELDS,
            max_depth: MAX_DEPTH,
        }
    }
}

impl DiffOptions<'_> {
    pub(crate) fn is_ignored(&self, lowered: &str) -> bool {
        self.ignored.contains(&lowered)
    }
}

/// Diff two entities with the default options.
pub fn has_changes<T: Serialize + ?Sized>(old: Option<&T>, new: Option<&T>) -> ChangeSet {
    has_changes_with(&DiffOptions::default(), old, new)
}

/// Diff two entities.
pub fn has_changes_with<T: Serialize + ?Sized>(
    options: &DiffOptions<'_>,
    old: Option<&T>,
    new: Option<&T>,
) -> ChangeSet {
    let (Some(old), Some(new)) = (old, new) else {
        return all_changed();
    };

    let (old, new) = match (serde_json::to_value(old), serde_json::to_value(new)) {
        (Ok(old), Ok(new)) => (old, new),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to serialize entity for diff, reporting all fields");
            return all_changed();
        }
    };

    match deep_diff(options, &old, &new) {
        Ok(changes) => changes,
        Err(e) => {
            warn!(error = %e, "deep diff failed, falling back to basic comparator");
            basic_diff(options, &old, &new)
        }
    }
}
