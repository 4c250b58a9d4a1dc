// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{require, RowReader};
use crate::entity::{Entity, EntitySnapshot, EntityType, Row, TableSchema};
use crate::storage::traits::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Fan,
    VenueManager,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fan => "FAN",
            Self::VenueManager => "VENUE_MANAGER",
        }
    }

    /// Role-specific entity tag.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Fan => EntityType::Fan,
            Self::VenueManager => EntityType::VenueManager,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FAN" => Ok(Self::Fan),
            "VENUE_MANAGER" => Ok(Self::VenueManager),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A fan or a venue manager. Keyed by username.
///
/// `password_hash` is opaque here; hashing happens before the record
/// reaches a DAO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    /// Fans only.
    pub favourite_team: Option<String>,
    /// Managers only.
    pub company_name: Option<String>,
    pub phone: Option<String>,
}

impl User {
    #[must_use]
    pub fn fan(username: &str, first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            username: username.to_string(),
            password_hash: String::new(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            role: Role::Fan,
            favourite_team: None,
            company_name: None,
            phone: None,
        }
    }

    #[must_use]
    pub fn manager(
        username: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
        company: &str,
    ) -> Self {
        Self {
            role: Role::VenueManager,
            company_name: Some(company.to_string()),
            ..Self::fan(username, first_name, last_name, email)
        }
    }

    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = hash.into();
        self
    }

    #[must_use]
    pub fn with_favourite_team(mut self, team: impl Into<String>) -> Self {
        self.favourite_team = Some(team.into());
        self
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.role == Role::VenueManager
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for User {
    type Id = str;

    const TYPE: EntityType = EntityType::User;
    const SCHEMA: &'static TableSchema = &TableSchema {
        name: "users",
        columns: &[
            "username",
            "password_hash",
            "first_name",
            "last_name",
            "email",
            "role",
            "favourite_team",
            "company_name",
            "phone",
        ],
    };

    fn id(&self) -> String {
        self.username.clone()
    }

    fn validate(&self) -> Result<(), StorageError> {
        require("username", &self.username)?;
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        if !self.email.contains('@') {
            return Err(StorageError::Validation(format!(
                "invalid email '{}' for user '{}'",
                self.email, self.username
            )));
        }
        Ok(())
    }

    fn to_row(&self) -> Row {
        vec![
            self.username.clone(),
            self.password_hash.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.email.clone(),
            self.role.as_str().to_string(),
            self.favourite_team.clone().unwrap_or_default(),
            self.company_name.clone().unwrap_or_default(),
            self.phone.clone().unwrap_or_default(),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self, StorageError> {
        let mut r = RowReader::new(Self::SCHEMA, row)?;
        Ok(Self {
            username: r.text(),
            password_hash: r.text(),
            first_name: r.text(),
            last_name: r.text(),
            email: r.text(),
            role: r.parse()?,
            favourite_team: r.optional(),
            company_name: r.optional(),
            phone: r.optional(),
        })
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::User(self)
    }

    fn from_snapshot(snapshot: &EntitySnapshot) -> Option<Self> {
        match snapshot {
            EntitySnapshot::User(u) => Some(u.clone()),
            _ => None,
        }
    }
}
