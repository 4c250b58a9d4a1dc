// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::traits::{RecordStore, StorageError};
use super::{sort_rows, BackendFamily};
use crate::entity::{Row, TableSchema};

/// Process-local store. Nothing survives a restart.
pub struct MemoryStore {
    data: DashMap<(&'static str, String), Row>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Row count across all tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn family(&self) -> BackendFamily {
        BackendFamily::Memory
    }

    async fn insert(&self, table: &TableSchema, row: Row) -> Result<(), StorageError> {
        table.check_row(&row)?;
        match self.data.entry((table.name, row[0].clone())) {
            Entry::Occupied(_) => Err(StorageError::already_exists(table, &row[0])),
            Entry::Vacant(slot) => {
                slot.insert(row);
                Ok(())
            }
        }
    }

    async fn update(&self, table: &TableSchema, row: Row) -> Result<(), StorageError> {
        table.check_row(&row)?;
        match self.data.get_mut(&(table.name, row[0].clone())) {
            Some(mut existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(StorageError::not_found(table, &row[0])),
        }
    }

    async fn delete(&self, table: &TableSchema, id: &str) -> Result<(), StorageError> {
        self.data
            .remove(&(table.name, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(table, id))
    }

    async fn get(&self, table: &TableSchema, id: &str) -> Result<Option<Row>, StorageError> {
        Ok(self.data.get(&(table.name, id.to_string())).map(|r| r.value().clone()))
    }

    async fn all(&self, table: &TableSchema) -> Result<Vec<Row>, StorageError> {
        let mut rows: Vec<Row> = self
            .data
            .iter()
            .filter(|r| r.key().0 == table.name)
            .map(|r| r.value().clone())
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn exists(&self, table: &TableSchema, id: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(&(table.name, id.to_string())))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
