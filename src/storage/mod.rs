// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! Three interchangeable families implement [`traits::RecordStore`]:
//!
//! | Family   | Store                  | Durable | Layout                         |
//! |----------|------------------------|---------|--------------------------------|
//! | `Sql`    | [`sql::SqlStore`]      | yes     | one table per entity type      |
//! | `Csv`    | [`csv::CsvStore`]      | yes     | one `<table>.csv` per type     |
//! | `Memory` | [`memory::MemoryStore`]| no      | process-local map              |
//!
//! Both durable layouts are generated from the same
//! [`TableSchema`](crate::entity::TableSchema), so a row written by one is
//! byte-for-byte what the other would write.

pub mod csv;
pub mod memory;
pub mod sql;
pub mod traits;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::entity::Row;
use traits::StorageError;

/// Closed set of backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    Sql,
    Csv,
    Memory,
}

impl BackendFamily {
    /// Data survives a process restart.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !matches!(self, Self::Memory)
    }

    /// The other durable family, used as the replication target.
    #[must_use]
    pub fn alternate(&self) -> Option<BackendFamily> {
        match self {
            Self::Sql => Some(Self::Csv),
            Self::Csv => Some(Self::Sql),
            Self::Memory => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Csv => "csv",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendFamily {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sql" | "mysql" => Ok(Self::Sql),
            "csv" => Ok(Self::Csv),
            "memory" | "in_memory" => Ok(Self::Memory),
            other => Err(StorageError::Validation(format!("unknown backend family '{}'", other))),
        }
    }
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Order rows by key, numeric keys numerically.
pub(crate) fn sort_rows(rows: &mut [Row]) {
    rows.sort_by(|a, b| compare_keys(&a[0], &b[0]));
}
