// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Venue Sync
//!
//! Dual-backend persistence for venue bookings: users, venues, bookings and
//! notifications are written through typed DAOs to one active backend and
//! mirrored to a second durable backend without callers knowing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Registry                           │
//! │  • One lazily built DAO per entity type                     │
//! │  • Active backend switch, startup probe + fallback          │
//! │  • Bulk operations replicated through replicate_bulk        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Dao<E>                              │
//! │  • validate → store write → cache → observers               │
//! │  • Read-through EntityCache shared by every backend         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!            (post-commit ObservationEvent, awaited in order)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Observers                            │
//! │  • ReplicationObserver: upsert onto the secondary           │
//! │  • NotificationFanout: booking → notification (bookings)    │
//! │  • Both silent while SyncSuppression is held                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   RecordStore backends                      │
//! │  • SqlStore (SQLite / MySQL via sqlx Any)                   │
//! │  • CsvStore (one file per table)                            │
//! │  • MemoryStore (tests, no durability)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::{NaiveDate, NaiveTime};
//! use venue_sync::{Booking, Registry, SyncConfig, User, Venue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), venue_sync::StorageError> {
//!     let config = SyncConfig {
//!         sql_url: Some("sqlite:venues.db?mode=rwc".into()),
//!         ..Default::default()
//!     };
//!     let registry = Registry::connect(&config).await?;
//!
//!     registry.user_dao().save(User::manager("mgr1", "Mia", "Reyes", "mia@pubs.com", "Pubs Ltd")).await?;
//!     registry.user_dao().save(User::fan("fan1", "Ada", "Lovelace", "ada@example.com")).await?;
//!     let venue = registry.venue_dao().save(Venue::new("The Hoop", "Pub", "1 Main St", "Boston", 80, "mgr1")).await?;
//!
//!     let booking = registry
//!         .booking_dao()
//!         .save(Booking::request(
//!             "fan1",
//!             venue.id,
//!             NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
//!             NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
//!             "Celtics",
//!             "Lakers",
//!         ))
//!         .await?;
//!
//!     // mgr1 now has a BOOKING_REQUESTED notification on both backends.
//!     registry.booking_dao().confirm(booking.id).await?;
//!     // fan1 now has a BOOKING_APPROVED notification.
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: [`Registry`] and the [`Backend`] factory
//! - [`dao`]: typed CRUD, entity queries, [`GraphLoader`]
//! - [`observer`]: observer list, replication, notification fan-out
//! - [`sync`]: [`SyncContext`] with cache, loading guard, suppression
//! - [`reconcile`]: startup merge of both durable backends
//! - [`storage`]: SQL, CSV and memory backends
//! - [`model`]: domain records
//! - [`resilience`]: retry with backoff

pub mod config;
pub mod dao;
pub mod entity;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod observer;
pub mod reconcile;
pub mod registry;
pub mod resilience;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use dao::{Dao, GraphLoader};
pub use entity::{Entity, EntityKey, EntitySnapshot, EntityType, OperationKind};
pub use model::{
    Booking, BookingStatus, Notification, NotificationKind, ResolvedVenue, Role, User, Venue,
    VenueManager,
};
pub use observer::{
    NotificationFanout, ObservationEvent, ObserverList, ReplicationObserver, StoreObserver,
};
pub use reconcile::{ReconcileReport, TypeCounts};
pub use registry::{Backend, Registry};
pub use resilience::retry::RetryConfig;
pub use storage::traits::{RecordStore, StorageError};
pub use storage::BackendFamily;
pub use sync::SyncContext;
