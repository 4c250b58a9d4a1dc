// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{format_timestamp, require, RowReader};
use crate::entity::{Entity, EntitySnapshot, EntityType, Row, TableSchema};
use crate::storage::traits::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    BookingRequested,
    BookingApproved,
    BookingRejected,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingRequested => "BOOKING_REQUESTED",
            Self::BookingApproved => "BOOKING_APPROVED",
            Self::BookingRejected => "BOOKING_REJECTED",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKING_REQUESTED" => Ok(Self::BookingRequested),
            "BOOKING_APPROVED" => Ok(Self::BookingApproved),
            "BOOKING_REJECTED" => Ok(Self::BookingRejected),
            other => Err(format!("unknown notification kind '{}'", other)),
        }
    }
}

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// 0 until the store assigns one.
    pub id: u64,
    pub username: String,
    pub kind: NotificationKind,
    pub booking_id: Option<u64>,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Unread notification stamped now.
    #[must_use]
    pub fn new(
        username: &str,
        kind: NotificationKind,
        booking_id: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            username: username.to_string(),
            kind,
            booking_id,
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

impl Entity for Notification {
    type Id = u64;

    const TYPE: EntityType = EntityType::Notification;
    const SCHEMA: &'static TableSchema = &TableSchema {
        name: "notifications",
        columns: &["id", "username", "kind", "booking_id", "message", "is_read", "created_at"],
    };

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn needs_id(&self) -> bool {
        self.id == 0
    }

    fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), StorageError> {
        require("username", &self.username)?;
        require("message", &self.message)
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.to_string(),
            self.username.clone(),
            self.kind.as_str().to_string(),
            self.booking_id.map(|id| id.to_string()).unwrap_or_default(),
            self.message.clone(),
            self.read.to_string(),
            format_timestamp(&self.created_at),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self, StorageError> {
        let mut r = RowReader::new(Self::SCHEMA, row)?;
        Ok(Self {
            id: r.parse()?,
            username: r.text(),
            kind: r.parse()?,
            booking_id: r.parse_optional()?,
            message: r.text(),
            read: r.parse()?,
            created_at: r.timestamp()?,
        })
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Notification(self)
    }

    fn from_snapshot(snapshot: &EntitySnapshot) -> Option<Self> {
        match snapshot {
            EntitySnapshot::Notification(n) => Some(n.clone()),
            _ => None,
        }
    }
}
