// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend registry: the one entry point application code holds.
//!
//! The registry owns every opened [`Backend`], knows which one is active,
//! and hands out one lazily-built DAO per entity type for it:
//!
//! ```text
//!                 Registry
//!                    │ active = Sql, secondary = Csv
//!     ┌──────────────┼──────────────┬──────────────────┐
//!     ▼              ▼              ▼                  ▼
//! Dao<User>     Dao<Venue>     Dao<Booking>     Dao<Notification>
//!  [repl]        [repl]      [repl, fanout]          [repl]
//! ```
//!
//! `repl` is a [`ReplicationObserver`] targeting the secondary; it is only
//! attached when the active family is durable and the other durable family
//! is connected. `fanout` is always attached to the booking DAO.
//!
//! Switching the active backend drops every cached DAO and clears the
//! entity cache. DAOs handed out before the switch keep pointing at the old
//! backend.

mod backend;

pub use backend::Backend;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::SyncConfig;
use crate::dao::{Dao, GraphLoader};
use crate::entity::Entity;
use crate::model::{Booking, Notification, User, Venue};
use crate::observer::{NotificationFanout, ReplicationObserver};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::resilience::retry::RetryConfig;
use crate::storage::memory::MemoryStore;
use crate::storage::traits::StorageError;
use crate::storage::BackendFamily;
use crate::sync::SyncContext;

#[derive(Default)]
struct DaoSlots {
    users: Option<Arc<Dao<User>>>,
    venues: Option<Arc<Dao<Venue>>>,
    bookings: Option<Arc<Dao<Booking>>>,
    notifications: Option<Arc<Dao<Notification>>>,
}

pub struct Registry {
    ctx: Arc<SyncContext>,
    backends: RwLock<HashMap<BackendFamily, Arc<Backend>>>,
    active: RwLock<Arc<Backend>>,
    daos: Mutex<DaoSlots>,
}

impl Registry {
    /// Registry with `active` as its only backend.
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>, active: Arc<Backend>) -> Self {
        let mut backends = HashMap::new();
        backends.insert(active.family(), active.clone());
        Self {
            ctx,
            backends: RwLock::new(backends),
            active: RwLock::new(active),
            daos: Mutex::new(DaoSlots::default()),
        }
    }

    /// Memory-only registry; nothing is replicated.
    #[must_use]
    pub fn in_memory(ctx: Arc<SyncContext>) -> Self {
        let backend = Arc::new(Backend::new(Arc::new(MemoryStore::new()), ctx.clone()));
        Self::new(ctx, backend)
    }

    /// Add or replace a backend. Cached DAOs are rebuilt on next access so
    /// a newly available secondary gets replicated to.
    pub fn register_backend(&self, backend: Arc<Backend>) {
        let mut slots = self.daos.lock();
        let family = backend.family();
        self.backends.write().insert(family, backend.clone());
        {
            let mut active = self.active.write();
            if active.family() == family {
                *active = backend;
            }
        }
        *slots = DaoSlots::default();
        debug!(backend = %family, "Backend registered");
    }

    #[must_use]
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    #[must_use]
    pub fn active_family(&self) -> BackendFamily {
        self.active.read().family()
    }

    #[must_use]
    pub fn active_backend(&self) -> Arc<Backend> {
        self.active.read().clone()
    }

    #[must_use]
    pub fn backend(&self, family: BackendFamily) -> Option<Arc<Backend>> {
        self.backends.read().get(&family).cloned()
    }

    /// Replication target: the other durable family, when the active one is
    /// durable and the other is connected.
    #[must_use]
    pub fn secondary(&self) -> Option<Arc<Backend>> {
        let family = self.active_family();
        if !family.is_durable() {
            return None;
        }
        family.alternate().and_then(|alt| self.backend(alt))
    }

    /// Make `family` active. Memory is created on demand; a durable family
    /// must have been connected first.
    pub fn set_active_backend(&self, family: BackendFamily) -> Result<(), StorageError> {
        let mut slots = self.daos.lock();

        let backend = match self.backend(family) {
            Some(backend) => backend,
            None if family == BackendFamily::Memory => {
                let store = Arc::new(MemoryStore::new());
                let backend = Arc::new(Backend::new(store, self.ctx.clone()));
                self.backends.write().insert(family, backend.clone());
                backend
            }
            None => {
                return Err(StorageError::Validation(format!(
                    "{} backend is not connected",
                    family
                )));
            }
        };

        let previous = std::mem::replace(&mut *self.active.write(), backend).family();
        *slots = DaoSlots::default();
        self.ctx.cache().clear_all();
        crate::metrics::record_backend_switch(family);
        info!(from = %previous, to = %family, "Active backend switched");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DAO accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn user_dao(&self) -> Arc<Dao<User>> {
        let mut slots = self.daos.lock();
        self.slot(&mut slots.users)
    }

    pub fn venue_dao(&self) -> Arc<Dao<Venue>> {
        let mut slots = self.daos.lock();
        self.slot(&mut slots.venues)
    }

    pub fn booking_dao(&self) -> Arc<Dao<Booking>> {
        let mut slots = self.daos.lock();
        if let Some(dao) = &slots.bookings {
            return dao.clone();
        }

        let venues = self.slot(&mut slots.venues);
        let notifications = self.slot(&mut slots.notifications);
        let dao = Arc::new(self.build_dao::<Booking>());
        let fanout = NotificationFanout::new(self.ctx.clone(), venues, notifications);
        dao.add_observer(Arc::new(fanout));
        slots.bookings = Some(dao.clone());
        dao
    }

    pub fn notification_dao(&self) -> Arc<Dao<Notification>> {
        let mut slots = self.daos.lock();
        self.slot(&mut slots.notifications)
    }

    /// Venue ↔ Manager graph loads on the active backend.
    pub fn graph(&self) -> GraphLoader {
        GraphLoader::new(self.user_dao(), self.venue_dao(), self.ctx.clone())
    }

    fn slot<E: Entity>(&self, slot: &mut Option<Arc<Dao<E>>>) -> Arc<Dao<E>> {
        slot.get_or_insert_with(|| Arc::new(self.build_dao::<E>())).clone()
    }

    fn build_dao<E: Entity>(&self) -> Dao<E> {
        let active = self.active_backend();
        let dao = active.dao::<E>();
        if let Some(secondary) = self.secondary() {
            let replication = ReplicationObserver::new(self.ctx.clone(), active.clone(), secondary);
            dao.add_observer(Arc::new(replication));
        }
        debug!(
            entity_type = %E::TYPE,
            backend = %active.family(),
            observers = ?dao.observer_names(),
            "DAO built"
        );
        dao
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Bulk operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mark every unread notification of `username` read, on the active
    /// backend and its secondary. Returns the count changed on the active one.
    pub async fn mark_all_notifications_read(&self, username: &str) -> Result<usize, StorageError> {
        let username = username.to_string();
        self.replicate_bulk("mark_all_read", move |backend| {
            let username = username.clone();
            async move { backend.dao::<Notification>().mark_all_read(&username).await }.boxed()
        })
        .await
    }

    /// Run a bulk operation on the active backend, then on the secondary
    /// in a suppression scope.
    ///
    /// Bulk operations emit no per-entity events, so this is their only
    /// replication path. A secondary failure is logged and counted; the
    /// active result stands.
    pub async fn replicate_bulk<F>(&self, operation: &str, run: F) -> Result<usize, StorageError>
    where
        F: Fn(Arc<Backend>) -> BoxFuture<'static, Result<usize, StorageError>>,
    {
        let changed = run(self.active_backend()).await?;

        let Some(secondary) = self.secondary() else {
            return Ok(changed);
        };
        match self.ctx.suppression().scope(run(secondary.clone())).await {
            Ok(mirrored) => {
                debug!(
                    operation,
                    changed,
                    mirrored,
                    backend = %secondary.family(),
                    "Bulk operation replicated"
                );
                crate::metrics::record_bulk_replication(operation, true);
            }
            Err(e) => {
                warn!(
                    operation,
                    backend = %secondary.family(),
                    error = %e,
                    "Bulk replication failed"
                );
                crate::metrics::record_bulk_replication(operation, false);
            }
        }
        Ok(changed)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Startup
    // ═══════════════════════════════════════════════════════════════════════════

    /// Merge active and secondary. `None` when there is no secondary.
    pub async fn reconcile(&self) -> Result<Option<ReconcileReport>, StorageError> {
        let Some(secondary) = self.secondary() else {
            return Ok(None);
        };
        let active = self.active_backend();
        Ok(Some(reconcile(&self.ctx, &active, &secondary).await?))
    }

    /// Connect using the process-wide [`SyncContext`].
    pub async fn connect(config: &SyncConfig) -> Result<Self, StorageError> {
        Self::connect_with_context(config, SyncContext::global()).await
    }

    /// Open and probe the configured primary, fall back to the alternate
    /// durable family when allowed, attach the alternate as secondary when
    /// both are reachable, and reconcile them if configured.
    #[instrument(skip_all, fields(primary = %config.primary))]
    pub async fn connect_with_context(
        config: &SyncConfig,
        ctx: Arc<SyncContext>,
    ) -> Result<Self, StorageError> {
        let primary_family = config.primary;
        let Some(alternate_family) = primary_family.alternate() else {
            let backend =
                Backend::open(primary_family, config, ctx.clone(), &RetryConfig::startup()).await?;
            info!(backend = %primary_family, "Registry ready (no replication)");
            return Ok(Self::new(ctx, Arc::new(backend)));
        };

        let primary = open_probed(primary_family, config, &ctx, &RetryConfig::startup()).await;
        let alternate = if is_configured(alternate_family, config) {
            match open_probed(alternate_family, config, &ctx, &RetryConfig::probe()).await {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!(
                        backend = %alternate_family,
                        error = %e,
                        "Alternate backend unavailable; running without replication"
                    );
                    None
                }
            }
        } else {
            None
        };

        let (active, secondary) = match (primary, alternate) {
            (Ok(primary), alternate) => (primary, alternate),
            (Err(e), Some(alternate)) if config.fallback_to_alternate => {
                warn!(
                    from = %primary_family,
                    to = %alternate_family,
                    error = %e,
                    "Primary backend unavailable, falling back"
                );
                crate::metrics::record_backend_fallback(primary_family, alternate_family);
                (alternate, None)
            }
            (Err(e), _) => return Err(e),
        };

        let registry = Self::new(ctx, Arc::new(active));
        if let Some(secondary) = secondary {
            registry.register_backend(Arc::new(secondary));
        }

        if config.reconcile_on_startup {
            match registry.reconcile().await {
                Ok(Some(report)) => info!(report = %report, "Startup reconciliation done"),
                Ok(None) => debug!("No secondary, skipping reconciliation"),
                Err(e) => warn!(error = %e, "Startup reconciliation failed; continuing"),
            }
        }

        info!(
            active = %registry.active_family(),
            secondary = ?registry.secondary().map(|b| b.family()),
            "Registry ready"
        );
        Ok(registry)
    }
}

fn is_configured(family: BackendFamily, config: &SyncConfig) -> bool {
    match family {
        BackendFamily::Sql => config.sql_url.is_some(),
        BackendFamily::Csv | BackendFamily::Memory => true,
    }
}

async fn open_probed(
    family: BackendFamily,
    config: &SyncConfig,
    ctx: &Arc<SyncContext>,
    retry_config: &RetryConfig,
) -> Result<Backend, StorageError> {
    let backend = Backend::open(family, config, ctx.clone(), retry_config).await?;
    backend.ping().await?;
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Row, TableSchema};
    use crate::model::{NotificationKind, Role};
    use crate::storage::traits::RecordStore;

    fn durable_pair(ctx: &Arc<SyncContext>) -> Registry {
        // Two memory stores standing in for Sql and Csv.
        struct Tagged(MemoryStore, BackendFamily);

        #[async_trait::async_trait]
        impl RecordStore for Tagged {
            fn family(&self) -> BackendFamily {
                self.1
            }
            async fn insert(&self, t: &TableSchema, r: Row) -> Result<(), StorageError> {
                self.0.insert(t, r).await
            }
            async fn update(&self, t: &TableSchema, r: Row) -> Result<(), StorageError> {
                self.0.update(t, r).await
            }
            async fn delete(&self, t: &TableSchema, id: &str) -> Result<(), StorageError> {
                self.0.delete(t, id).await
            }
            async fn get(&self, t: &TableSchema, id: &str) -> Result<Option<Row>, StorageError> {
                self.0.get(t, id).await
            }
            async fn all(&self, t: &TableSchema) -> Result<Vec<Row>, StorageError> {
                self.0.all(t).await
            }
            async fn ping(&self) -> Result<(), StorageError> {
                Ok(())
            }
        }

        let tagged = |family| {
            let store = Arc::new(Tagged(MemoryStore::new(), family));
            Arc::new(Backend::new(store, ctx.clone()))
        };
        let sql = tagged(BackendFamily::Sql);
        let csv = tagged(BackendFamily::Csv);
        let registry = Registry::new(ctx.clone(), sql);
        registry.register_backend(csv);
        registry
    }

    #[test]
    fn test_memory_registry_has_no_replication() {
        let registry = Registry::in_memory(SyncContext::new());
        assert!(registry.secondary().is_none());
        assert_eq!(registry.user_dao().observer_count(), 0);
        assert_eq!(registry.booking_dao().observer_names(), vec!["notification_fanout"]);
    }

    #[test]
    fn test_durable_daos_get_replication_first() {
        let ctx = SyncContext::new();
        let registry = durable_pair(&ctx);
        assert_eq!(registry.secondary().unwrap().family(), BackendFamily::Csv);
        assert_eq!(registry.venue_dao().observer_names(), vec!["replication"]);
        assert_eq!(
            registry.booking_dao().observer_names(),
            vec!["replication", "notification_fanout"]
        );
    }

    #[test]
    fn test_daos_are_cached_until_switch() {
        let ctx = SyncContext::new();
        let registry = durable_pair(&ctx);
        let before = registry.user_dao();
        assert!(Arc::ptr_eq(&before, &registry.user_dao()));

        registry.set_active_backend(BackendFamily::Csv).unwrap();
        let after = registry.user_dao();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.family(), BackendFamily::Csv);
        assert_eq!(registry.secondary().unwrap().family(), BackendFamily::Sql);
    }

    #[tokio::test]
    async fn test_switch_clears_cache() {
        let ctx = SyncContext::new();
        let registry = durable_pair(&ctx);
        registry
            .user_dao()
            .save(User::fan("fan1", "A", "B", "a@b.c"))
            .await
            .unwrap();
        assert!(!ctx.cache().is_empty());

        registry.set_active_backend(BackendFamily::Memory).unwrap();
        assert!(ctx.cache().is_empty());
        assert!(registry.secondary().is_none());
        assert_eq!(registry.user_dao().observer_count(), 0);
    }

    #[test]
    fn test_switch_to_unconnected_durable_family_fails() {
        let registry = Registry::in_memory(SyncContext::new());
        assert!(matches!(
            registry.set_active_backend(BackendFamily::Sql),
            Err(StorageError::Validation(_))
        ));
        assert_eq!(registry.active_family(), BackendFamily::Memory);
    }

    #[tokio::test]
    async fn test_writes_replicate_to_secondary() {
        let ctx = SyncContext::new();
        let registry = durable_pair(&ctx);
        registry
            .user_dao()
            .save(User::manager("mgr1", "M", "R", "m@r.com", "Pubs"))
            .await
            .unwrap();

        let csv = registry.backend(BackendFamily::Csv).unwrap();
        assert!(csv.dao::<User>().exists("mgr1").await.unwrap());
        assert_eq!(
            registry.user_dao().retrieve_by_role(Role::VenueManager).await.unwrap().len(),
            1
        );
        assert!(!ctx.suppression().is_suppressed());
    }

    #[tokio::test]
    async fn test_mark_all_read_goes_through_both_backends() {
        let ctx = SyncContext::new();
        let registry = durable_pair(&ctx);
        let notifications = registry.notification_dao();
        for _ in 0..2 {
            notifications
                .save(Notification::new("fan1", NotificationKind::BookingApproved, None, "ok"))
                .await
                .unwrap();
        }

        assert_eq!(registry.mark_all_notifications_read("fan1").await.unwrap(), 2);

        let csv = registry.backend(BackendFamily::Csv).unwrap();
        ctx.cache().clear_all();
        assert!(csv.dao::<Notification>().retrieve_unread("fan1").await.unwrap().is_empty());
        assert!(!ctx.suppression().is_suppressed());
    }

    #[tokio::test]
    async fn test_bulk_write_on_secondary_keeps_cache_on_active_copy() {
        let ctx = SyncContext::new();
        let registry = durable_pair(&ctx);
        let saved = registry
            .notification_dao()
            .save(Notification::new("fan1", NotificationKind::BookingApproved, None, "approved"))
            .await
            .unwrap();

        // The secondary's copy drifts without going through a DAO.
        let csv = registry.backend(BackendFamily::Csv).unwrap();
        let drifted = Notification {
            message: "drifted".into(),
            ..saved.clone()
        };
        csv.store().update(Notification::SCHEMA, drifted.to_row()).await.unwrap();

        registry.mark_all_notifications_read("fan1").await.unwrap();

        let active = registry
            .notification_dao()
            .retrieve_by_id(&saved.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.message, "approved");
        assert!(active.read);
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let config = SyncConfig {
            primary: BackendFamily::Memory,
            ..Default::default()
        };
        let registry = Registry::connect_with_context(&config, SyncContext::new()).await.unwrap();
        assert_eq!(registry.active_family(), BackendFamily::Memory);
        assert!(registry.reconcile().await.unwrap().is_none());
    }
}
