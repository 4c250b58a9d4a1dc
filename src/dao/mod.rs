// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed data access over any [`RecordStore`].
//!
//! A [`Dao<E>`] is the only write path application code uses. Each
//! successful write is committed in a fixed order:
//!
//! 1. the store applies the row (errors return to the caller here)
//! 2. the shared cache is refreshed or invalidated
//! 3. every registered observer is awaited with one [`ObservationEvent`]
//!
//! Reads go through the cache first; `exists` always asks the store.

pub mod graph;
mod queries;

pub use graph::GraphLoader;

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::entity::{Entity, EntityKey, OperationKind};
use crate::observer::{ObservationEvent, ObserverList, StoreObserver};
use crate::storage::traits::{RecordStore, StorageError};
use crate::storage::BackendFamily;
use crate::sync::SyncContext;

/// Auto-assigned ids can race with a concurrent `save`; retry this many times.
const SAVE_ID_ATTEMPTS: usize = 3;

pub struct Dao<E: Entity> {
    store: Arc<dyn RecordStore>,
    ctx: Arc<SyncContext>,
    observers: ObserverList,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Dao<E> {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, ctx: Arc<SyncContext>) -> Self {
        Self {
            store,
            ctx,
            observers: ObserverList::new(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn family(&self) -> BackendFamily {
        self.store.family()
    }

    #[must_use]
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub(crate) fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Observers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns false when the observer was already registered.
    pub fn add_observer(&self, observer: Arc<dyn StoreObserver>) -> bool {
        self.observers.add(observer)
    }

    /// Returns false when the observer was not registered.
    pub fn remove_observer(&self, observer: &Arc<dyn StoreObserver>) -> bool {
        self.observers.remove(observer)
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn observer_names(&self) -> Vec<String> {
        self.observers.names()
    }

    pub async fn notify_observers(&self, event: &ObservationEvent) {
        self.observers.notify(event).await;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert a new record, assigning the next numeric id when it has none.
    ///
    /// Returns the record as stored (with its id).
    pub async fn save(&self, entity: E) -> Result<E, StorageError> {
        entity.validate()?;

        if !entity.needs_id() {
            self.store.insert(E::SCHEMA, entity.to_row()).await?;
            self.commit(OperationKind::Insert, entity.clone()).await?;
            return Ok(entity);
        }

        let mut attempt = 1;
        loop {
            let mut candidate = entity.clone();
            candidate.assign_id(self.store.next_id(E::SCHEMA).await?);
            match self.store.insert(E::SCHEMA, candidate.to_row()).await {
                Ok(()) => {
                    self.commit(OperationKind::Insert, candidate.clone()).await?;
                    return Ok(candidate);
                }
                Err(StorageError::AlreadyExists { id, .. }) if attempt < SAVE_ID_ATTEMPTS => {
                    debug!(
                        entity_type = %E::TYPE,
                        id = %id,
                        attempt,
                        "Assigned id taken, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn update(&self, entity: &E) -> Result<(), StorageError> {
        entity.validate()?;
        self.store.update(E::SCHEMA, entity.to_row()).await?;
        self.commit(OperationKind::Update, entity.clone()).await
    }

    pub async fn delete(&self, id: &E::Id) -> Result<(), StorageError> {
        self.delete_key(&id.to_string()).await
    }

    /// Delete by the persisted key string.
    pub async fn delete_key(&self, id: &str) -> Result<(), StorageError> {
        let key = EntityKey::new(E::TYPE, id)?;
        self.store.delete(E::SCHEMA, id).await?;
        self.ctx.cache().remove(&key);
        crate::metrics::record_write(E::TYPE, OperationKind::Delete, self.family());
        self.notify_observers(&ObservationEvent::deleted(E::TYPE, id)).await;
        Ok(())
    }

    /// Update when the key exists, insert otherwise. The id is always kept.
    ///
    /// Observers see the operation that was actually applied.
    pub async fn upsert(&self, entity: &E) -> Result<OperationKind, StorageError> {
        if entity.needs_id() {
            self.save(entity.clone()).await?;
            return Ok(OperationKind::Insert);
        }
        entity.validate()?;

        let id = entity.id();
        let kind = if self.store.exists(E::SCHEMA, &id).await? {
            match self.store.update(E::SCHEMA, entity.to_row()).await {
                Ok(()) => OperationKind::Update,
                // Deleted in between.
                Err(e) if e.is_not_found() => {
                    self.store.insert(E::SCHEMA, entity.to_row()).await?;
                    OperationKind::Insert
                }
                Err(e) => return Err(e),
            }
        } else {
            match self.store.insert(E::SCHEMA, entity.to_row()).await {
                Ok(()) => OperationKind::Insert,
                // Inserted in between.
                Err(StorageError::AlreadyExists { .. }) => {
                    self.store.update(E::SCHEMA, entity.to_row()).await?;
                    OperationKind::Update
                }
                Err(e) => return Err(e),
            }
        };

        self.commit(kind, entity.clone()).await?;
        Ok(kind)
    }

    async fn commit(&self, kind: OperationKind, entity: E) -> Result<(), StorageError> {
        let key = entity.key()?;
        let snapshot = entity.into_snapshot();
        self.ctx.cache().put(key, snapshot.clone());
        crate::metrics::record_write(E::TYPE, kind, self.family());
        self.notify_observers(&ObservationEvent::written(kind, snapshot)).await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn retrieve_by_id(&self, id: &E::Id) -> Result<Option<E>, StorageError> {
        self.retrieve_by_key(&id.to_string()).await
    }

    /// Cache first, then the store; a store hit refreshes the cache.
    pub async fn retrieve_by_key(&self, id: &str) -> Result<Option<E>, StorageError> {
        let key = EntityKey::new(E::TYPE, id)?;
        if let Some(cached) = self.ctx.cache().get_as::<E>(&key) {
            return Ok(Some(cached));
        }

        let Some(row) = self.store.get(E::SCHEMA, id).await? else {
            return Ok(None);
        };
        let entity = E::from_row(&row)?;
        self.ctx.cache().put(key, entity.clone().into_snapshot());
        Ok(Some(entity))
    }

    /// Every record in key order. Rows that fail to decode are skipped.
    pub async fn retrieve_all(&self) -> Result<Vec<E>, StorageError> {
        let rows = self.store.all(E::SCHEMA).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match E::from_row(&row) {
                Ok(entity) => {
                    if let Ok(key) = entity.key() {
                        self.ctx.cache().put(key, entity.clone().into_snapshot());
                    }
                    out.push(entity);
                }
                Err(e) => {
                    warn!(entity_type = %E::TYPE, error = %e, "Skipping corrupt row");
                }
            }
        }
        Ok(out)
    }

    pub(crate) async fn retrieve_where<F>(&self, mut predicate: F) -> Result<Vec<E>, StorageError>
    where
        F: FnMut(&E) -> bool + Send,
    {
        let mut all = self.retrieve_all().await?;
        all.retain(|e| predicate(e));
        Ok(all)
    }

    /// Asks the store, never the cache.
    pub async fn exists(&self, id: &E::Id) -> Result<bool, StorageError> {
        self.exists_key(&id.to_string()).await
    }

    pub async fn exists_key(&self, id: &str) -> Result<bool, StorageError> {
        self.store.exists(E::SCHEMA, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{User, Venue};
    use crate::observer::testing::{FailingObserver, RecordingObserver};
    use crate::storage::memory::MemoryStore;

    fn venue_dao() -> (Dao<Venue>, Arc<SyncContext>) {
        let ctx = SyncContext::new();
        (Dao::new(Arc::new(MemoryStore::new()), ctx.clone()), ctx)
    }

    fn venue() -> Venue {
        Venue::new("The Hoop", "Pub", "1 Main St", "Boston", 80, "mgr1")
    }

    #[tokio::test]
    async fn test_save_assigns_sequential_ids() {
        let (dao, _) = venue_dao();
        let a = dao.save(venue()).await.unwrap();
        let b = dao.save(venue()).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(dao.exists(&2).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_without_writing() {
        let (dao, _) = venue_dao();
        let recorder = Arc::new(RecordingObserver::default());
        dao.add_observer(recorder.clone());

        let mut bad = venue();
        bad.capacity = 0;
        let err = dao.save(bad).await.unwrap_err();

        assert!(matches!(err, StorageError::Validation(_)));
        assert!(dao.retrieve_all().await.unwrap().is_empty());
        assert!(recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_each_write_notifies_once() {
        let (dao, _) = venue_dao();
        let recorder = Arc::new(RecordingObserver::default());
        dao.add_observer(recorder.clone());

        let mut v = dao.save(venue()).await.unwrap();
        v.capacity = 120;
        dao.update(&v).await.unwrap();
        dao.delete(&v.id).await.unwrap();

        assert_eq!(
            recorder.kinds(),
            vec![OperationKind::Insert, OperationKind::Update, OperationKind::Delete]
        );
        let events = recorder.events.lock();
        assert!(events[2].entity().is_none());
        assert_eq!(events[1].entity_id(), "1");
    }

    #[tokio::test]
    async fn test_failed_write_does_not_notify() {
        let (dao, _) = venue_dao();
        let recorder = Arc::new(RecordingObserver::default());
        dao.add_observer(recorder.clone());

        let ghost = venue().with_id(99);
        assert!(dao.update(&ghost).await.unwrap_err().is_not_found());
        assert!(dao.delete(&99).await.unwrap_err().is_not_found());
        assert!(recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_fail_write() {
        let (dao, _) = venue_dao();
        let recorder = Arc::new(RecordingObserver::default());
        dao.add_observer(Arc::new(FailingObserver));
        dao.add_observer(recorder.clone());

        let saved = dao.save(venue()).await.unwrap();

        assert_eq!(recorder.kinds(), vec![OperationKind::Insert]);
        assert!(dao.exists(&saved.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_retrieve_reads_through_cache() {
        let (dao, ctx) = venue_dao();
        let saved = dao.save(venue()).await.unwrap();
        ctx.cache().clear_all();

        let loaded = dao.retrieve_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(ctx.cache().len(), 1);

        // A cached entry answers even after the row is gone from the store.
        dao.store().delete(Venue::SCHEMA, "1").await.unwrap();
        assert!(dao.retrieve_by_id(&1).await.unwrap().is_some());
        assert!(!dao.exists(&1).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let (dao, ctx) = venue_dao();
        let saved = dao.save(venue()).await.unwrap();
        dao.delete(&saved.id).await.unwrap();
        assert!(ctx.cache().is_empty());
        assert!(dao.retrieve_by_id(&saved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let (dao, _) = venue_dao();
        let recorder = Arc::new(RecordingObserver::default());
        dao.add_observer(recorder.clone());

        let v = venue().with_id(7);
        assert_eq!(dao.upsert(&v).await.unwrap(), OperationKind::Insert);
        assert_eq!(dao.upsert(&v).await.unwrap(), OperationKind::Update);

        assert_eq!(dao.retrieve_all().await.unwrap(), vec![v]);
        assert_eq!(recorder.kinds(), vec![OperationKind::Insert, OperationKind::Update]);
    }

    #[tokio::test]
    async fn test_string_keyed_entity() {
        let ctx = SyncContext::new();
        let dao: Dao<User> = Dao::new(Arc::new(MemoryStore::new()), ctx);
        let fan = User::fan("fan1", "Ada", "Lovelace", "ada@example.com");

        dao.save(fan.clone()).await.unwrap();
        assert!(matches!(
            dao.save(fan.clone()).await.unwrap_err(),
            StorageError::AlreadyExists { .. }
        ));
        assert_eq!(dao.retrieve_by_id("fan1").await.unwrap(), Some(fan));
        assert!(dao.retrieve_by_key("").await.is_err());
    }

    #[tokio::test]
    async fn test_observer_registration_is_deduplicated() {
        let (dao, _) = venue_dao();
        let recorder: Arc<dyn StoreObserver> = Arc::new(RecordingObserver::default());
        assert!(dao.add_observer(recorder.clone()));
        assert!(!dao.add_observer(recorder.clone()));
        assert_eq!(dao.observer_count(), 1);
        assert!(dao.remove_observer(&recorder));
        assert!(!dao.remove_observer(&recorder));
    }
}
