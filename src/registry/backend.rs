// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::dao::Dao;
use crate::entity::{Entity, EntityKey, EntitySnapshot, EntityType, OperationKind};
use crate::model::{Booking, Notification, User, Venue};
use crate::resilience::retry::RetryConfig;
use crate::storage::csv::CsvStore;
use crate::storage::memory::MemoryStore;
use crate::storage::sql::SqlStore;
use crate::storage::traits::{RecordStore, StorageError};
use crate::storage::BackendFamily;
use crate::sync::SyncContext;

/// One opened store plus type-erased access to it.
///
/// Replication and reconciliation work on [`EntitySnapshot`]s rather than
/// typed records; every snapshot operation here goes through a bare
/// [`Dao`] (no observers), so writes keep the cache coherent but never
/// trigger further replication.
pub struct Backend {
    family: BackendFamily,
    store: Arc<dyn RecordStore>,
    ctx: Arc<SyncContext>,
}

impl Backend {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, ctx: Arc<SyncContext>) -> Self {
        Self {
            family: store.family(),
            store,
            ctx,
        }
    }

    /// Factory for every family.
    pub async fn open(
        family: BackendFamily,
        config: &SyncConfig,
        ctx: Arc<SyncContext>,
        retry_config: &RetryConfig,
    ) -> Result<Self, StorageError> {
        let store: Arc<dyn RecordStore> = match family {
            BackendFamily::Memory => Arc::new(MemoryStore::new()),
            BackendFamily::Csv => Arc::new(CsvStore::open(&config.csv_dir).await?),
            BackendFamily::Sql => {
                let url = config.sql_url.as_deref().ok_or_else(|| {
                    StorageError::Validation("sql backend requires sql_url".into())
                })?;
                Arc::new(SqlStore::connect(url, config.sql_max_connections, retry_config).await?)
            }
        };
        info!(backend = %family, "Backend opened");
        Ok(Self::new(store, ctx))
    }

    #[must_use]
    pub fn family(&self) -> BackendFamily {
        self.family
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// DAO with no observers attached.
    #[must_use]
    pub fn dao<E: Entity>(&self) -> Dao<E> {
        Dao::new(self.store.clone(), self.ctx.clone())
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        let result = self.store.ping().await;
        crate::metrics::set_backend_healthy(self.family, result.is_ok());
        result
    }

    /// Store lookup; the shared cache is not consulted.
    pub async fn exists(&self, key: &EntityKey) -> Result<bool, StorageError> {
        self.store.exists(key.entity_type().schema(), key.id()).await
    }

    /// Store lookup; the shared cache is not consulted.
    pub async fn fetch(&self, key: &EntityKey) -> Result<Option<EntitySnapshot>, StorageError> {
        let entity_type = key.entity_type();
        match self.store.get(entity_type.schema(), key.id()).await? {
            Some(row) => Ok(Some(EntitySnapshot::decode(entity_type, &row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_snapshot(
        &self,
        snapshot: &EntitySnapshot,
    ) -> Result<OperationKind, StorageError> {
        match snapshot {
            EntitySnapshot::User(e) => self.dao::<User>().upsert(e).await,
            EntitySnapshot::Venue(e) => self.dao::<Venue>().upsert(e).await,
            EntitySnapshot::Booking(e) => self.dao::<Booking>().upsert(e).await,
            EntitySnapshot::Notification(e) => self.dao::<Notification>().upsert(e).await,
        }
    }

    /// Returns false when there was nothing to delete.
    pub async fn delete_key(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<bool, StorageError> {
        let result = match entity_type.storage_type() {
            EntityType::Venue => self.dao::<Venue>().delete_key(id).await,
            EntityType::Booking => self.dao::<Booking>().delete_key(id).await,
            EntityType::Notification => self.dao::<Notification>().delete_key(id).await,
            _ => self.dao::<User>().delete_key(id).await,
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every decodable record of one type, in key order.
    pub async fn snapshots(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<EntitySnapshot>, StorageError> {
        let rows = self.store.all(entity_type.schema()).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match EntitySnapshot::decode(entity_type, &row) {
                Ok(snapshot) => out.push(snapshot),
                Err(e) => warn!(
                    backend = %self.family,
                    entity_type = %entity_type,
                    error = %e,
                    "Skipping corrupt row"
                ),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Backend {
        Backend::new(Arc::new(MemoryStore::new()), SyncContext::new())
    }

    #[tokio::test]
    async fn test_open_sql_without_url_is_validation_error() {
        let config = SyncConfig::default();
        let result =
            Backend::open(BackendFamily::Sql, &config, SyncContext::new(), &RetryConfig::test())
                .await;
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }

    #[tokio::test]
    async fn test_open_csv_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            csv_dir: dir.path().join("nested"),
            ..Default::default()
        };
        let backend =
            Backend::open(BackendFamily::Csv, &config, SyncContext::new(), &RetryConfig::test())
                .await
                .unwrap();
        assert_eq!(backend.family(), BackendFamily::Csv);
        backend.ping().await.unwrap();
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let backend = memory();
        let venue = Venue::new("V", "Pub", "x", "Y", 10, "mgr1").with_id(4);
        let snapshot = venue.clone().into_snapshot();

        assert_eq!(backend.upsert_snapshot(&snapshot).await.unwrap(), OperationKind::Insert);
        assert_eq!(backend.upsert_snapshot(&snapshot).await.unwrap(), OperationKind::Update);

        let key = snapshot.key().unwrap();
        assert!(backend.exists(&key).await.unwrap());
        assert_eq!(backend.fetch(&key).await.unwrap(), Some(snapshot));
        assert_eq!(backend.snapshots(EntityType::Venue).await.unwrap().len(), 1);

        assert!(backend.delete_key(EntityType::Venue, "4").await.unwrap());
        assert!(!backend.delete_key(EntityType::Venue, "4").await.unwrap());
        assert!(backend.fetch(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_role_views_resolve_to_user_table() {
        let backend = memory();
        let fan = User::fan("fan1", "A", "B", "a@b.c");
        backend.upsert_snapshot(&fan.into_snapshot()).await.unwrap();
        assert!(backend.delete_key(EntityType::Fan, "fan1").await.unwrap());
    }
}
