// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity identity and the persistence contract shared by every backend.
//!
//! Every record that flows through a DAO implements [`Entity`]. The trait
//! maps a typed record onto a flat [`Row`] of text columns described by a
//! [`TableSchema`], which is the single layout both durable backends use
//! (CSV header row and SQL table columns are generated from it).
//!
//! Observers and the cache never see the concrete record types directly;
//! they work with [`EntitySnapshot`], a closed enum over all record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Booking, Notification, User, Venue};
use crate::storage::traits::StorageError;

/// Fixed set of entity tags used by cache keys, guard keys and events.
///
/// `Fan` and `VenueManager` are role-specific views of `User` records; they
/// share the `users` table but get their own keys when a graph load needs
/// to distinguish "the manager being resolved" from "the user record".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Fan,
    VenueManager,
    Venue,
    Booking,
    Notification,
}

impl EntityType {
    /// Tags that own a table, in dependency order (referenced before referencing).
    pub const PERSISTED: [EntityType; 4] = [
        EntityType::User,
        EntityType::Venue,
        EntityType::Booking,
        EntityType::Notification,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Fan => "Fan",
            Self::VenueManager => "VenueManager",
            Self::Venue => "Venue",
            Self::Booking => "Booking",
            Self::Notification => "Notification",
        }
    }

    /// Table holding records of this type.
    #[must_use]
    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Self::User | Self::Fan | Self::VenueManager => User::SCHEMA,
            Self::Venue => Venue::SCHEMA,
            Self::Booking => Booking::SCHEMA,
            Self::Notification => Notification::SCHEMA,
        }
    }

    /// The tag whose table stores this type (role views collapse to `User`).
    #[must_use]
    pub fn storage_type(&self) -> EntityType {
        match self {
            Self::Fan | Self::VenueManager => Self::User,
            other => *other,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "Fan" => Ok(Self::Fan),
            "VenueManager" => Ok(Self::VenueManager),
            "Venue" => Ok(Self::Venue),
            "Booking" => Ok(Self::Booking),
            "Notification" => Ok(Self::Notification),
            other => Err(StorageError::Validation(format!("unknown entity type '{}'", other))),
        }
    }
}

/// (type, id) pair identifying one entity across cache, guard and events.
///
/// The id is never empty; [`EntityKey::new`] rejects empty ids so every
/// consumer can rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    entity_type: EntityType,
    id: String,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Result<Self, StorageError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StorageError::Validation(format!(
                "{} key requires a non-empty id",
                entity_type
            )));
        }
        Ok(Self { entity_type, id })
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Kind of committed write carried by an observation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted record as ordered text columns.
pub type Row = Vec<String>;

/// Table layout shared by the CSV and SQL backends.
///
/// The first column is always the primary key.
#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl TableSchema {
    #[must_use]
    pub fn key_column(&self) -> &'static str {
        self.columns[0]
    }

    /// Reject rows whose arity does not match the schema.
    pub fn check_row(&self, row: &[String]) -> Result<(), StorageError> {
        if row.len() != self.columns.len() {
            return Err(StorageError::Decode {
                entity: self.name.to_string(),
                reason: format!("expected {} columns, got {}", self.columns.len(), row.len()),
            });
        }
        if row[0].is_empty() {
            return Err(StorageError::Decode {
                entity: self.name.to_string(),
                reason: format!("empty {}", self.key_column()),
            });
        }
        Ok(())
    }
}

/// A record type that can be stored by any backend.
pub trait Entity: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Id as callers pass it to `retrieve_by_id`/`delete` (`u64` or `str`).
    type Id: ?Sized + fmt::Display + Sync;

    const TYPE: EntityType;
    const SCHEMA: &'static TableSchema;

    /// Primary key rendered as the persisted string.
    fn id(&self) -> String;

    /// True when the store must assign a fresh numeric id before insert.
    fn needs_id(&self) -> bool {
        false
    }

    fn assign_id(&mut self, _id: u64) {}

    fn validate(&self) -> Result<(), StorageError>;

    fn to_row(&self) -> Row;

    fn from_row(row: &[String]) -> Result<Self, StorageError>;

    fn into_snapshot(self) -> EntitySnapshot;

    fn from_snapshot(snapshot: &EntitySnapshot) -> Option<Self>;

    fn key(&self) -> Result<EntityKey, StorageError> {
        EntityKey::new(Self::TYPE, self.id())
    }
}

/// Type-erased entity value carried by events and held in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySnapshot {
    User(User),
    Venue(Venue),
    Booking(Booking),
    Notification(Notification),
}

impl EntitySnapshot {
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::User(_) => EntityType::User,
            Self::Venue(_) => EntityType::Venue,
            Self::Booking(_) => EntityType::Booking,
            Self::Notification(_) => EntityType::Notification,
        }
    }

    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::User(u) => u.id(),
            Self::Venue(v) => v.id(),
            Self::Booking(b) => b.id(),
            Self::Notification(n) => n.id(),
        }
    }

    pub fn key(&self) -> Result<EntityKey, StorageError> {
        EntityKey::new(self.entity_type(), self.id())
    }

    /// Decode a raw row of the given type's table.
    pub fn decode(entity_type: EntityType, row: &[String]) -> Result<Self, StorageError> {
        Ok(match entity_type.storage_type() {
            EntityType::Venue => Venue::from_row(row)?.into_snapshot(),
            EntityType::Booking => Booking::from_row(row)?.into_snapshot(),
            EntityType::Notification => Notification::from_row(row)?.into_snapshot(),
            _ => User::from_row(row)?.into_snapshot(),
        })
    }

    /// Records this one refers to by foreign key.
    #[must_use]
    pub fn dependencies(&self) -> Vec<EntityKey> {
        let refs: Vec<(EntityType, String)> = match self {
            Self::User(_) => Vec::new(),
            Self::Venue(v) => vec![(EntityType::User, v.manager_username.clone())],
            Self::Booking(b) => vec![
                (EntityType::Venue, b.venue_id.to_string()),
                (EntityType::User, b.fan_username.clone()),
            ],
            Self::Notification(n) => vec![(EntityType::User, n.username.clone())],
        };
        refs.into_iter()
            .filter_map(|(t, id)| EntityKey::new(t, id).ok())
            .collect()
    }
}
