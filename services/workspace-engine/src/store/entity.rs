//! Generic keyed entity store.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use ctrlplane_diff::{has_changes, ChangeSet};

use super::{Change, EntityKind, StoreChange};

/// A record an [`EntityStore`] can hold.
pub trait Entity: Clone + Serialize + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;

    const KIND: EntityKind;

    fn key(&self) -> Self::Key;
}

/// Thread-safe map of entities that reports field-level changes on every
/// write.
pub struct EntityStore<E: Entity> {
    items: RwLock<HashMap<E::Key, E>>,
    changes: broadcast::Sender<StoreChange>,
}

impl<E: Entity> EntityStore<E> {
    pub(super) fn new(changes: broadcast::Sender<StoreChange>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn get(&self, key: &E::Key) -> Option<E> {
        self.items.read().get(key).cloned()
    }

    pub fn contains(&self, key: &E::Key) -> bool {
        self.items.read().contains_key(key)
    }

    /// Insert or replace. Returns the changed field paths; empty when the
    /// stored value is unchanged, `{"all": true}` on insert.
    pub fn upsert(&self, entity: E) -> ChangeSet {
        let key = entity.key();
        let changes = {
            let mut items = self.items.write();
            let changes = has_changes(items.get(&key), Some(&entity));
            items.insert(key.clone(), entity);
            changes
        };
        if changes.is_empty() {
            return changes;
        }
        let change = if changes.contains_key(ctrlplane_diff::ALL) {
            Change::Created
        } else {
            Change::Updated(changes.clone())
        };
        self.notify(&key, change);
        changes
    }

    /// Mutate in place under the write lock. Returns the new value, or
    /// `None` if the key is absent.
    pub fn update<F>(&self, key: &E::Key, f: F) -> Option<E>
    where
        F: FnOnce(&mut E),
    {
        let (updated, changes) = {
            let mut items = self.items.write();
            let current = items.get_mut(key)?;
            let before = current.clone();
            f(current);
            (current.clone(), has_changes(Some(&before), Some(&*current)))
        };
        if !changes.is_empty() {
            self.notify(key, Change::Updated(changes));
        }
        Some(updated)
    }

    pub fn remove(&self, key: &E::Key) -> Option<E> {
        let removed = self.items.write().remove(key);
        if removed.is_some() {
            self.notify(key, Change::Removed);
        }
        removed
    }

    pub fn items(&self) -> Vec<E> {
        self.items.read().values().cloned().collect()
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<E>
    where
        P: Fn(&E) -> bool,
    {
        self.items
            .read()
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn notify(&self, key: &E::Key, change: Change) {
        let change = StoreChange {
            kind: E::KIND,
            key: key.to_string(),
            change,
        };
        trace!(kind = %change.kind, key = %change.key, "Store change");
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}
