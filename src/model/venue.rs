// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::{Deserialize, Serialize};

use super::{require, RowReader, User};
use crate::entity::{Entity, EntitySnapshot, EntityType, Row, TableSchema};
use crate::storage::traits::StorageError;

/// A place showing games, owned by one venue manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    /// 0 until the store assigns one.
    pub id: u64,
    pub name: String,
    /// Free text, e.g. "Pub" or "Sports bar".
    pub kind: String,
    pub address: String,
    pub city: String,
    pub capacity: u32,
    pub manager_username: String,
}

impl Venue {
    #[must_use]
    pub fn new(
        name: &str,
        kind: &str,
        address: &str,
        city: &str,
        capacity: u32,
        manager: &str,
    ) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            kind: kind.to_string(),
            address: address.to_string(),
            city: city.to_string(),
            capacity,
            manager_username: manager.to_string(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

impl Entity for Venue {
    type Id = u64;

    const TYPE: EntityType = EntityType::Venue;
    const SCHEMA: &'static TableSchema = &TableSchema {
        name: "venues",
        columns: &["id", "name", "kind", "address", "city", "capacity", "manager_username"],
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
        require("name", &self.name)?;
        require("city", &self.city)?;
        require("manager_username", &self.manager_username)?;
        if self.capacity == 0 {
            return Err(StorageError::Validation(format!(
                "venue '{}' must have a positive capacity",
                self.name
            )));
        }
        Ok(())
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.kind.clone(),
            self.address.clone(),
            self.city.clone(),
            self.capacity.to_string(),
            self.manager_username.clone(),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self, StorageError> {
        let mut r = RowReader::new(Self::SCHEMA, row)?;
        Ok(Self {
            id: r.parse()?,
            name: r.text(),
            kind: r.text(),
            address: r.text(),
            city: r.text(),
            capacity: r.parse()?,
            manager_username: r.text(),
        })
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Venue(self)
    }

    fn from_snapshot(snapshot: &EntitySnapshot) -> Option<Self> {
        match snapshot {
            EntitySnapshot::Venue(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// A venue with its manager resolved.
///
/// `manager` is `None` for a stand-in: the venue was reached while it was
/// already being resolved further up the same load, so only its own columns
/// are filled in. `venue.manager_username` still names the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVenue {
    pub venue: Venue,
    pub manager: Option<Box<VenueManager>>,
}

impl ResolvedVenue {
    #[must_use]
    pub fn stand_in(venue: Venue) -> Self {
        Self { venue, manager: None }
    }

    #[must_use]
    pub fn is_stand_in(&self) -> bool {
        self.manager.is_none()
    }
}

/// A venue manager with the venues they run.
///
/// When the manager is reached while already being resolved, the venues
/// are all stand-ins fetched through the flat venue query.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueManager {
    pub user: User,
    pub venues: Vec<ResolvedVenue>,
}

impl VenueManager {
    #[must_use]
    pub fn username(&self) -> &str {
        &self.user.username
    }

    #[must_use]
    pub fn venue_ids(&self) -> Vec<u64> {
        self.venues.iter().map(|v| v.venue.id).collect()
    }

    /// True when no venue in the list carries a resolved manager.
    #[must_use]
    pub fn is_minimal(&self) -> bool {
        self.venues.iter().all(ResolvedVenue::is_stand_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_venue_needs_id() {
        let venue = Venue::new("The Hoop", "Pub", "1 Main St", "Boston", 80, "mgr1");
        assert!(venue.needs_id());
        assert!(!venue.clone().with_id(3).needs_id());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let venue = Venue::new("Tiny", "Pub", "x", "Boston", 0, "mgr1");
        assert!(matches!(venue.validate(), Err(StorageError::Validation(_))));
    }

    #[test]
    fn test_row_round_trip() {
        let venue = Venue::new("The Hoop", "Pub", "1 Main, St", "Boston", 80, "mgr1").with_id(7);
        assert_eq!(Venue::from_row(&venue.to_row()).unwrap(), venue);
    }

    #[test]
    fn test_bad_capacity_column_is_decode_error() {
        let mut row = Venue::new("A", "Pub", "x", "Y", 5, "m").with_id(1).to_row();
        row[5] = "lots".into();
        assert!(matches!(Venue::from_row(&row), Err(StorageError::Decode { .. })));
    }
}
