// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::{ObservationEvent, StoreObserver};
use crate::entity::{EntitySnapshot, OperationKind};
use crate::registry::Backend;
use crate::storage::traits::StorageError;
use crate::sync::SyncContext;

/// Mirrors every committed write onto the secondary durable backend.
///
/// Writes are idempotent upserts carrying the original id, so replaying an
/// event is harmless. The secondary write runs in a suppression scope,
/// which stops it from being replicated back. Failures are logged and counted
/// but never reach the caller of the primary write.
pub struct ReplicationObserver {
    ctx: Arc<SyncContext>,
    primary: Arc<Backend>,
    secondary: Arc<Backend>,
}

impl ReplicationObserver {
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>, primary: Arc<Backend>, secondary: Arc<Backend>) -> Self {
        Self {
            ctx,
            primary,
            secondary,
        }
    }

    async fn replicate(&self, event: &ObservationEvent) -> Result<(), StorageError> {
        match (event.kind(), event.entity()) {
            (OperationKind::Delete, _) => {
                let removed = self
                    .secondary
                    .delete_key(event.entity_type(), event.entity_id())
                    .await?;
                if !removed {
                    trace!(
                        entity_type = %event.entity_type(),
                        id = event.entity_id(),
                        "Nothing to delete on secondary"
                    );
                }
                Ok(())
            }
            (_, Some(snapshot)) => {
                if let Err(e) = self.ensure_dependencies(snapshot).await {
                    warn!(
                        entity_type = %event.entity_type(),
                        id = event.entity_id(),
                        error = %e,
                        "Could not copy dependencies; replicating anyway"
                    );
                }
                self.secondary.upsert_snapshot(snapshot).await?;
                Ok(())
            }
            (kind, None) => Err(StorageError::Validation(format!(
                "{} event for {}:{} carries no entity",
                kind,
                event.entity_type(),
                event.entity_id()
            ))),
        }
    }

    /// Copy records `snapshot` refers to from the primary when the
    /// secondary lacks them. Referenced records are written first.
    async fn ensure_dependencies(&self, snapshot: &EntitySnapshot) -> Result<(), StorageError> {
        let mut pending = snapshot.dependencies();
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        while let Some(key) = pending.pop() {
            if !seen.insert(key.clone()) || self.secondary.exists(&key).await? {
                continue;
            }
            match self.primary.fetch(&key).await? {
                Some(dependency) => {
                    pending.extend(dependency.dependencies());
                    missing.push(dependency);
                }
                None => debug!(key = %key, "Dependency absent on primary too"),
            }
        }

        for dependency in missing.into_iter().rev() {
            self.secondary.upsert_snapshot(&dependency).await?;
            crate::metrics::record_dependency_copy(
                dependency.entity_type(),
                self.secondary.family(),
            );
            debug!(
                entity_type = %dependency.entity_type(),
                id = %dependency.id(),
                backend = %self.secondary.family(),
                "Copied dependency"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl StoreObserver for ReplicationObserver {
    fn name(&self) -> &str {
        "replication"
    }

    async fn on_event(&self, event: &ObservationEvent) -> Result<(), StorageError> {
        if self.ctx.suppression().is_suppressed() {
            trace!(
                entity_type = %event.entity_type(),
                id = event.entity_id(),
                "Suppressed, not replicating"
            );
            return Ok(());
        }
        let target = self.secondary.family();
        match self.ctx.suppression().scope(self.replicate(event)).await {
            Ok(()) => {
                debug!(
                    entity_type = %event.entity_type(),
                    id = event.entity_id(),
                    kind = %event.kind(),
                    backend = %target,
                    "Replicated"
                );
                crate::metrics::record_replication(event.entity_type(), target, "success");
            }
            Err(e) => {
                warn!(
                    entity_type = %event.entity_type(),
                    id = event.entity_id(),
                    kind = %event.kind(),
                    backend = %target,
                    error = %e,
                    "Replication failed; secondary may lag until next reconcile"
                );
                crate::metrics::record_replication(event.entity_type(), target, "error");
            }
        }
        Ok(())
    }
}
