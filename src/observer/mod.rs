// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Post-commit observers.
//!
//! Every DAO owns an [`ObserverList`]. After a write is applied by the
//! backend, the DAO builds one [`ObservationEvent`] and awaits each observer
//! in registration order before the write call returns:
//!
//! ```text
//! dao.save(booking)
//!   ├─ store.insert(row)            (errors surface to the caller)
//!   ├─ cache.put(key, snapshot)
//!   └─ observers.notify(event)
//!        ├─ ReplicationObserver     (errors logged and swallowed)
//!        └─ NotificationFanout      (errors logged and swallowed)
//! ```
//!
//! An observer failure never turns a successful write into a failed one
//! and never stops later observers from running.

pub mod notification;
pub mod replication;

pub use notification::NotificationFanout;
pub use replication::ReplicationObserver;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::entity::{EntityKey, EntitySnapshot, EntityType, OperationKind};
use crate::storage::traits::StorageError;

/// One committed write. Entity is `None` for deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationEvent {
    entity_type: EntityType,
    entity_id: String,
    kind: OperationKind,
    entity: Option<EntitySnapshot>,
}

impl ObservationEvent {
    /// Insert or update carrying the written value.
    #[must_use]
    pub fn written(kind: OperationKind, snapshot: EntitySnapshot) -> Self {
        Self {
            entity_type: snapshot.entity_type(),
            entity_id: snapshot.id(),
            kind,
            entity: Some(snapshot),
        }
    }

    #[must_use]
    pub fn deleted(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            kind: OperationKind::Delete,
            entity: None,
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn entity(&self) -> Option<&EntitySnapshot> {
        self.entity.as_ref()
    }

    pub fn key(&self) -> Result<EntityKey, StorageError> {
        EntityKey::new(self.entity_type, self.entity_id.clone())
    }
}

#[async_trait]
pub trait StoreObserver: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &str;

    async fn on_event(&self, event: &ObservationEvent) -> Result<(), StorageError>;
}

/// Ordered, de-duplicated observer registrations.
///
/// Identity is the observer allocation: registering the same `Arc` twice
/// is a no-op, two distinct instances of one observer type are both kept.
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Arc<dyn StoreObserver>>>,
}

fn same_observer(a: &Arc<dyn StoreObserver>, b: &Arc<dyn StoreObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ObserverList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when already registered.
    pub fn add(&self, observer: Arc<dyn StoreObserver>) -> bool {
        let mut observers = self.observers.write();
        if observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Returns false when not registered.
    pub fn remove(&self, observer: &Arc<dyn StoreObserver>) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        observers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.observers.read().iter().map(|o| o.name().to_string()).collect()
    }

    /// Deliver `event` to every observer in order, isolating failures.
    pub async fn notify(&self, event: &ObservationEvent) {
        // Snapshot so no lock is held while observers run (they may write
        // through other DAOs and register observers of their own).
        let observers: Vec<Arc<dyn StoreObserver>> = self.observers.read().clone();

        for observer in observers {
            match observer.on_event(event).await {
                Ok(()) => {
                    debug!(
                        observer = observer.name(),
                        entity_type = %event.entity_type(),
                        id = event.entity_id(),
                        kind = %event.kind(),
                        "Observer handled event"
                    );
                }
                Err(e) => {
                    warn!(
                        observer = observer.name(),
                        entity_type = %event.entity_type(),
                        id = event.entity_id(),
                        kind = %event.kind(),
                        error = %e,
                        "Observer failed; write stands"
                    );
                    crate::metrics::record_observer_failure(observer.name(), e.kind());
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Observers used by tests across the crate.

    use super::*;
    use parking_lot::Mutex;

    /// Records every event it sees.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<ObservationEvent>>,
    }

    impl RecordingObserver {
        pub fn kinds(&self) -> Vec<OperationKind> {
            self.events.lock().iter().map(|e| e.kind()).collect()
        }
    }

    #[async_trait]
    impl StoreObserver for RecordingObserver {
        fn name(&self) -> &str {
            "recording"
        }

        async fn on_event(&self, event: &ObservationEvent) -> Result<(), StorageError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    /// Fails on every event.
    pub struct FailingObserver;

    #[async_trait]
    impl StoreObserver for FailingObserver {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_event(&self, _event: &ObservationEvent) -> Result<(), StorageError> {
            Err(StorageError::Backend("observer exploded".into()))
        }
    }
}
