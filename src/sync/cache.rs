// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use dashmap::DashMap;

use crate::entity::{Entity, EntityKey, EntitySnapshot};

/// Read-through cache shared by every DAO.
///
/// No TTL and no eviction: every write path either refreshes or removes its
/// entry, and a backend switch clears the whole map. Keys cannot be empty
/// (see [`EntityKey::new`]), so `put` needs no key check.
pub struct EntityCache {
    entries: DashMap<EntityKey, EntitySnapshot>,
}

impl EntityCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<EntitySnapshot> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Typed lookup; `None` on a miss or when the entry holds another type.
    #[must_use]
    pub fn get_as<E: Entity>(&self, key: &EntityKey) -> Option<E> {
        self.entries.get(key).and_then(|e| E::from_snapshot(e.value()))
    }

    pub fn put(&self, key: EntityKey, snapshot: EntitySnapshot) {
        self.entries.insert(key, snapshot);
        crate::metrics::set_cache_entries(self.entries.len());
    }

    pub fn remove(&self, key: &EntityKey) {
        if self.entries.remove(key).is_some() {
            crate::metrics::set_cache_entries(self.entries.len());
        }
    }

    pub fn clear_all(&self) {
        self.entries.clear();
        crate::metrics::set_cache_entries(0);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}
