// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide synchronization state.
//!
//! [`SyncContext`] bundles the three pieces of shared state the DAOs and
//! observers coordinate through:
//!
//! - [`EntityCache`]: read-through cache keyed by [`EntityKey`](crate::EntityKey)
//! - [`LoadingGuard`]: keys currently being resolved by a graph load
//! - [`SyncSuppression`]: call-chain scope that silences replication and fan-out
//!
//! Production code uses [`SyncContext::global()`]. Tests build their own
//! context with [`SyncContext::new()`] so parallel tests never share state.

pub mod cache;
pub mod loading;
pub mod suppression;

pub use cache::EntityCache;
pub use loading::{LoadingGuard, LoadingTicket};
pub use suppression::SyncSuppression;

use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, MutexGuard};

static GLOBAL: OnceLock<Arc<SyncContext>> = OnceLock::new();

pub struct SyncContext {
    cache: EntityCache,
    loading: LoadingGuard,
    suppression: SyncSuppression,
    /// Serializes top-level graph loads so unrelated loads never see each
    /// other's guard entries.
    graph_lock: Mutex<()>,
}

impl SyncContext {
    /// Fresh, isolated context.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cache: EntityCache::new(),
            loading: LoadingGuard::new(),
            suppression: SyncSuppression::new(),
            graph_lock: Mutex::new(()),
        })
    }

    /// The process-wide context.
    #[must_use]
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(SyncContext::new).clone()
    }

    #[must_use]
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    #[must_use]
    pub fn loading(&self) -> &LoadingGuard {
        &self.loading
    }

    #[must_use]
    pub fn suppression(&self) -> &SyncSuppression {
        &self.suppression
    }

    pub(crate) async fn graph_lock(&self) -> MutexGuard<'_, ()> {
        self.graph_lock.lock().await
    }

    /// Drop all cached entries and guard entries. Suppression ends with its
    /// scope and needs no reset.
    pub fn reset(&self) {
        self.cache.clear_all();
        self.loading.clear();
    }
}
