// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use super::BackendFamily;
use crate::entity::{Row, TableSchema};

#[derive(Error, Debug)]
pub enum StorageError {
    /// Bad input; the write was never attempted.
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },
    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: String, id: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt {entity} row: {reason}")]
    Decode { entity: String, reason: String },
}

impl StorageError {
    pub(crate) fn not_found(table: &TableSchema, id: &str) -> Self {
        Self::NotFound {
            entity: table.name.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(table: &TableSchema, id: &str) -> Self {
        Self::AlreadyExists {
            entity: table.name.to_string(),
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Backend(_) => "backend",
            Self::Decode { .. } => "decode",
        }
    }
}

/// CRUD over flat rows, one implementation per backend family.
///
/// Rows are keyed by their first column. Implementations must be safe to
/// call from many tasks at once.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn family(&self) -> BackendFamily;

    /// Fails with `AlreadyExists` if the key is taken.
    async fn insert(&self, table: &TableSchema, row: Row) -> Result<(), StorageError>;

    /// Fails with `NotFound` if the key is absent.
    async fn update(&self, table: &TableSchema, row: Row) -> Result<(), StorageError>;

    /// Fails with `NotFound` if the key is absent.
    async fn delete(&self, table: &TableSchema, id: &str) -> Result<(), StorageError>;

    async fn get(&self, table: &TableSchema, id: &str) -> Result<Option<Row>, StorageError>;

    /// All rows ordered by key (numeric keys numerically).
    async fn all(&self, table: &TableSchema) -> Result<Vec<Row>, StorageError>;

    async fn exists(&self, table: &TableSchema, id: &str) -> Result<bool, StorageError> {
        Ok(self.get(table, id).await?.is_some())
    }

    /// Next free numeric key (max + 1, starting at 1).
    async fn next_id(&self, table: &TableSchema) -> Result<u64, StorageError> {
        let max = self
            .all(table)
            .await?
            .iter()
            .filter_map(|row| row.first().and_then(|id| id.parse::<u64>().ok()))
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), StorageError>;
}
