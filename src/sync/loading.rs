// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use dashmap::DashSet;
use tracing::trace;

use crate::entity::EntityKey;

/// Keys currently being resolved by a graph load.
///
/// A load claims its key with [`start_loading`](Self::start_loading) before
/// resolving related entities. A nested load that finds its key already
/// claimed must build a minimal stand-in instead of recursing.
pub struct LoadingGuard {
    in_flight: DashSet<EntityKey>,
}

impl LoadingGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: DashSet::new(),
        }
    }

    #[must_use]
    pub fn is_loading(&self, key: &EntityKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Claim `key`. Returns `None` when it is already in flight.
    ///
    /// The returned ticket releases the key when dropped, so an error or
    /// early return mid-resolution never leaves a stale entry.
    #[must_use = "the key is released as soon as the ticket is dropped"]
    pub fn start_loading(&self, key: EntityKey) -> Option<LoadingTicket<'_>> {
        if !self.in_flight.insert(key.clone()) {
            trace!(key = %key, "Already loading");
            return None;
        }
        Some(LoadingTicket { guard: self, key })
    }

    pub fn finish_loading(&self, key: &EntityKey) {
        self.in_flight.remove(key);
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn clear(&self) {
        self.in_flight.clear();
    }
}

impl Default for LoadingGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Claim on one in-flight key.
pub struct LoadingTicket<'a> {
    guard: &'a LoadingGuard,
    key: EntityKey,
}

impl LoadingTicket<'_> {
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }
}

impl Drop for LoadingTicket<'_> {
    fn drop(&mut self) {
        self.guard.finish_loading(&self.key);
    }
}
