// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

tokio::task_local! {
    /// Suppressions entered by the running call chain, innermost last.
    static ENTERED: Vec<u64>;
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Reentrant "do not replicate, do not notify" mode.
///
/// Suppression belongs to the call chain that entered it, not to the
/// process: a write made by another task while a scope is running still
/// replicates and notifies. Scopes nest, so a replication write performed
/// during reconciliation leaves the outer scope in force when it finishes.
pub struct SyncSuppression {
    id: u64,
}

impl SyncSuppression {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Whether the current call chain runs inside one of our scopes.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.depth() > 0
    }

    /// Number of our scopes the current call chain is nested in.
    #[must_use]
    pub fn depth(&self) -> usize {
        ENTERED
            .try_with(|ids| ids.iter().filter(|&&id| id == self.id).count())
            .unwrap_or(0)
    }

    /// Run `fut` suppressed. Suppression ends when it completes.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        ENTERED.scope(self.nested(), fut).await
    }

    /// Run `f` suppressed on the current thread.
    pub fn sync_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        ENTERED.sync_scope(self.nested(), f)
    }

    fn nested(&self) -> Vec<u64> {
        let mut ids = ENTERED.try_with(Clone::clone).unwrap_or_default();
        ids.push(self.id);
        ids
    }
}

impl Default for SyncSuppression {
    fn default() -> Self {
        Self::new()
    }
}
