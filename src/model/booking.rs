// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{format_timestamp, require, RowReader};
use crate::entity::{Entity, EntitySnapshot, EntityType, Row, TableSchema};
use crate::storage::traits::StorageError;

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Stored game time; fractional seconds only appear when non-zero.
const TIME_FORMAT: &str = "%H:%M:%S%.f";
/// Rows written before seconds were stored.
const LEGACY_TIME_FORMAT: &str = "%H:%M";
const LABEL_TIME_FORMAT: &str = "%H:%M";

/// Booking lifecycle.
///
/// ```text
/// PENDING ──► CONFIRMED ──► CANCELLED
///    │                         ▲
///    ├──► REJECTED             │
///    └─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// A fan's request to watch one game at one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// 0 until the store assigns one.
    pub id: u64,
    pub fan_username: String,
    pub venue_id: u64,
    pub game_date: NaiveDate,
    pub game_time: NaiveTime,
    pub home_team: String,
    pub away_team: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// New PENDING booking stamped now.
    #[must_use]
    pub fn request(
        fan: &str,
        venue_id: u64,
        game_date: NaiveDate,
        game_time: NaiveTime,
        home_team: &str,
        away_team: &str,
    ) -> Self {
        Self {
            id: 0,
            fan_username: fan.to_string(),
            venue_id,
            game_date,
            game_time,
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = status;
        self
    }

    /// "Lakers @ Celtics on 2026-11-02 19:30"
    #[must_use]
    pub fn game_label(&self) -> String {
        format!(
            "{} @ {} on {} {}",
            self.away_team,
            self.home_team,
            self.game_date.format(DATE_FORMAT),
            self.game_time.format(LABEL_TIME_FORMAT)
        )
    }
}

impl Entity for Booking {
    type Id = u64;

    const TYPE: EntityType = EntityType::Booking;
    const SCHEMA: &'static TableSchema = &TableSchema {
        name: "bookings",
        columns: &[
            "id",
            "fan_username",
            "venue_id",
            "game_date",
            "game_time",
            "home_team",
            "away_team",
            "status",
            "created_at",
        ],
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
        require("fan_username", &self.fan_username)?;
        require("home_team", &self.home_team)?;
        require("away_team", &self.away_team)?;
        if self.home_team == self.away_team {
            return Err(StorageError::Validation(format!(
                "home and away team are both '{}'",
                self.home_team
            )));
        }
        if self.venue_id == 0 {
            return Err(StorageError::Validation("booking has no venue".into()));
        }
        Ok(())
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.to_string(),
            self.fan_username.clone(),
            self.venue_id.to_string(),
            self.game_date.format(DATE_FORMAT).to_string(),
            self.game_time.format(TIME_FORMAT).to_string(),
            self.home_team.clone(),
            self.away_team.clone(),
            self.status.as_str().to_string(),
            format_timestamp(&self.created_at),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self, StorageError> {
        let mut r = RowReader::new(Self::SCHEMA, row)?;
        let id = r.parse()?;
        let fan_username = r.text();
        let venue_id = r.parse()?;
        let game_date =
            NaiveDate::parse_from_str(&r.text(), DATE_FORMAT).map_err(|e| StorageError::Decode {
                entity: Self::SCHEMA.name.into(),
                reason: format!("column 'game_date': {}", e),
            })?;
        let game_time = r.text();
        let game_time = NaiveTime::parse_from_str(&game_time, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&game_time, LEGACY_TIME_FORMAT))
            .map_err(|e| StorageError::Decode {
                entity: Self::SCHEMA.name.into(),
                reason: format!("column 'game_time': {}", e),
            })?;
        Ok(Self {
            id,
            fan_username,
            venue_id,
            game_date,
            game_time,
            home_team: r.text(),
            away_team: r.text(),
            status: r.parse()?,
            created_at: r.timestamp()?,
        })
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Booking(self)
    }

    fn from_snapshot(snapshot: &EntitySnapshot) -> Option<Self> {
        match snapshot {
            EntitySnapshot::Booking(b) => Some(b.clone()),
            _ => None,
        }
    }
}
