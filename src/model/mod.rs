// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Domain records persisted by the DAOs.
//!
//! Records are flat: references to other records are stored as raw ids or
//! usernames, exactly as they appear in the CSV files and SQL tables. The
//! resolved Venue ↔ Manager graph lives in [`venue`] and is assembled by
//! [`crate::dao::GraphLoader`].

pub mod booking;
pub mod notification;
pub mod user;
pub mod venue;

pub use booking::{Booking, BookingStatus};
pub use notification::{Notification, NotificationKind};
pub use user::{Role, User};
pub use venue::{ResolvedVenue, Venue, VenueManager};

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::storage::traits::StorageError;

/// Sequential column reader used by `Entity::from_row` implementations.
pub(crate) struct RowReader<'a> {
    table: &'static str,
    columns: &'static [&'static str],
    row: &'a [String],
    pos: usize,
}

impl<'a> RowReader<'a> {
    pub(crate) fn new(
        schema: &'static crate::entity::TableSchema,
        row: &'a [String],
    ) -> Result<Self, StorageError> {
        schema.check_row(row)?;
        Ok(Self {
            table: schema.name,
            columns: schema.columns,
            row,
            pos: 0,
        })
    }

    fn decode_error(&self, column: &str, reason: impl std::fmt::Display) -> StorageError {
        StorageError::Decode {
            entity: self.table.to_string(),
            reason: format!("column '{}': {}", column, reason),
        }
    }

    pub(crate) fn text(&mut self) -> String {
        let value = self.row[self.pos].clone();
        self.pos += 1;
        value
    }

    /// Empty column decodes as `None`.
    pub(crate) fn optional(&mut self) -> Option<String> {
        let value = self.text();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub(crate) fn parse<T>(&mut self) -> Result<T, StorageError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let column = self.columns[self.pos];
        let raw = self.text();
        raw.parse::<T>().map_err(|e| self.decode_error(column, e))
    }

    pub(crate) fn parse_optional<T>(&mut self) -> Result<Option<T>, StorageError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let column = self.columns[self.pos];
        match self.optional() {
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| self.decode_error(column, e)),
            None => Ok(None),
        }
    }

    pub(crate) fn timestamp(&mut self) -> Result<DateTime<Utc>, StorageError> {
        let column = self.columns[self.pos];
        let raw = self.text();
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| self.decode_error(column, e))
    }
}

/// Timestamps are persisted at full precision so a stored record compares
/// equal to the in-memory value that produced it.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn require(field: &str, value: &str) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
