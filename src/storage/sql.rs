// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage backend (MySQL or SQLite through the sqlx `Any` driver).
//!
//! One table per entity type, columns named exactly as in the CSV header
//! rows. Every column is text so both backends hold identical values:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS venues (
//!   id VARCHAR(255) PRIMARY KEY,
//!   name TEXT,
//!   kind TEXT,
//!   ...
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! MySQL TEXT columns come back as BLOB through `Any`, so reads try
//! `String` first (SQLite) and fall back to bytes (MySQL).

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row as _};
use tracing::{debug, info};

use super::traits::{RecordStore, StorageError};
use super::{sort_rows, BackendFamily};
use crate::entity::{EntityType, Row, TableSchema};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

fn backend_error(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Connect and create missing tables.
    ///
    /// `retry_config` decides how hard to try: `RetryConfig::startup()` for
    /// the configured primary, `RetryConfig::probe()` when only checking
    /// whether a fallback is reachable.
    pub async fn connect(
        connection_string: &str,
        max_connections: u32,
        retry_config: &RetryConfig,
    ) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");
        // A pooled in-memory SQLite database is one database per connection.
        let max_connections = if is_sqlite && connection_string.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = retry("sql_connect", retry_config, || async {
            AnyPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(backend_error)
        })
        .await?;

        let store = Self { pool, is_sqlite };
        store.init_schema().await?;
        info!(sqlite = is_sqlite, "SQL store connected");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        for entity_type in EntityType::PERSISTED {
            let sql = self.create_table_sql(entity_type.schema());
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(&sql).execute(&self.pool).await.map_err(backend_error)
            })
            .await?;
        }
        Ok(())
    }

    fn create_table_sql(&self, table: &TableSchema) -> String {
        let key_type = if self.is_sqlite { "TEXT" } else { "VARCHAR(255)" };
        let columns: Vec<String> = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    format!("{} {} PRIMARY KEY", c, key_type)
                } else {
                    format!("{} TEXT NOT NULL", c)
                }
            })
            .collect();
        format!("CREATE TABLE IF NOT EXISTS {} ({})", table.name, columns.join(", "))
    }

    fn select_sql(table: &TableSchema) -> String {
        format!("SELECT {} FROM {}", table.columns.join(", "), table.name)
    }

    /// Try reading as String first (SQLite TEXT), then as bytes (MySQL TEXT).
    fn read_text(row: &AnyRow, idx: usize) -> Result<String, StorageError> {
        row.try_get::<String, _>(idx)
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(idx)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            })
            .map_err(backend_error)
    }

    fn decode_row(table: &TableSchema, row: &AnyRow) -> Result<Row, StorageError> {
        (0..table.columns.len()).map(|i| Self::read_text(row, i)).collect()
    }

    async fn key_exists(&self, table: &TableSchema, id: &str) -> Result<bool, StorageError> {
        let sql = format!("SELECT 1 FROM {} WHERE {} = ? LIMIT 1", table.name, table.key_column());
        let found = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(found.is_some())
    }
}

// Writes are single-shot; reads go through `RetryConfig::query()`.
#[async_trait]
impl RecordStore for SqlStore {
    fn family(&self) -> BackendFamily {
        BackendFamily::Sql
    }

    async fn insert(&self, table: &TableSchema, row: Row) -> Result<(), StorageError> {
        table.check_row(&row)?;
        if self.key_exists(table, &row[0]).await? {
            return Err(StorageError::already_exists(table, &row[0]));
        }
        let placeholders = vec!["?"; row.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name,
            table.columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for value in &row {
            query = query.bind(value.clone());
        }
        match query.execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::already_exists(table, &row[0]))
            }
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn update(&self, table: &TableSchema, row: Row) -> Result<(), StorageError> {
        table.check_row(&row)?;
        let assignments: Vec<String> = table.columns[1..]
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table.name,
            assignments.join(", "),
            table.key_column()
        );

        let mut query = sqlx::query(&sql);
        for value in &row[1..] {
            query = query.bind(value.clone());
        }
        query = query.bind(row[0].clone());

        let result = query.execute(&self.pool).await.map_err(backend_error)?;
        if result.rows_affected() == 0 {
            // MySQL reports zero changed rows for an identical overwrite.
            if !self.key_exists(table, &row[0]).await? {
                return Err(StorageError::not_found(table, &row[0]));
            }
            debug!(table = table.name, id = %row[0], "SQL update was a no-op");
        }
        Ok(())
    }

    async fn delete(&self, table: &TableSchema, id: &str) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", table.name, table.key_column());
        let result = sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(table, id));
        }
        Ok(())
    }

    async fn get(&self, table: &TableSchema, id: &str) -> Result<Option<Row>, StorageError> {
        let sql = format!("{} WHERE {} = ?", Self::select_sql(table), table.key_column());
        let id = id.to_string();

        retry("sql_get", &RetryConfig::query(), || async {
            let found = sqlx::query(&sql)
                .bind(id.clone())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend_error)?;
            found.map(|row| Self::decode_row(table, &row)).transpose()
        })
        .await
    }

    async fn all(&self, table: &TableSchema) -> Result<Vec<Row>, StorageError> {
        let sql = Self::select_sql(table);

        let mut rows = retry("sql_all", &RetryConfig::query(), || async {
            let fetched = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(backend_error)?;
            fetched
                .iter()
                .map(|row| Self::decode_row(table, row))
                .collect::<Result<Vec<Row>, StorageError>>()
        })
        .await?;
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn exists(&self, table: &TableSchema, id: &str) -> Result<bool, StorageError> {
        retry("sql_exists", &RetryConfig::query(), || self.key_exists(table, id)).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(backend_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::model::{User, Venue};

    async fn temp_store() -> (tempfile::TempDir, SqlStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("venue_sync.db").display());
        let store = SqlStore::connect(&url, 4, &RetryConfig::test()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_get_round_trip() {
        let (_dir, store) = temp_store().await;
        let venue = Venue::new("The Hoop", "Pub", "1 Main St", "Boston", 80, "mgr1").with_id(1);
        store.insert(Venue::SCHEMA, venue.to_row()).await.unwrap();

        let row = store.get(Venue::SCHEMA, "1").await.unwrap().unwrap();
        assert_eq!(Venue::from_row(&row).unwrap(), venue);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_already_exists() {
        let (_dir, store) = temp_store().await;
        let user = User::fan("ann", "Ann", "Lee", "ann@x.io");
        store.insert(User::SCHEMA, user.to_row()).await.unwrap();
        let err = store.insert(User::SCHEMA, user.to_row()).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_are_not_found() {
        let (_dir, store) = temp_store().await;
        let venue = Venue::new("V", "Pub", "x", "Y", 5, "m").with_id(4);
        assert!(store.update(Venue::SCHEMA, venue.to_row()).await.unwrap_err().is_not_found());
        assert!(store.delete(Venue::SCHEMA, "4").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_identical_update_succeeds() {
        let (_dir, store) = temp_store().await;
        let venue = Venue::new("V", "Pub", "x", "Y", 5, "m").with_id(4);
        store.insert(Venue::SCHEMA, venue.to_row()).await.unwrap();
        store.update(Venue::SCHEMA, venue.to_row()).await.unwrap();
        assert!(store.exists(Venue::SCHEMA, "4").await.unwrap());
    }

    #[tokio::test]
    async fn test_all_orders_numerically() {
        let (_dir, store) = temp_store().await;
        for id in [10u64, 2, 1] {
            let venue = Venue::new("V", "Pub", "x", "Y", 5, "m").with_id(id);
            store.insert(Venue::SCHEMA, venue.to_row()).await.unwrap();
        }
        let ids: Vec<String> = store
            .all(Venue::SCHEMA)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r[0].clone())
            .collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
        assert_eq!(store.next_id(Venue::SCHEMA).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, store) = temp_store().await;
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_table_sql_uses_schema_columns() {
        let (_dir, store) = temp_store().await;
        let sql = store.create_table_sql(Venue::SCHEMA);
        assert!(sql.starts_with(
            "CREATE TABLE IF NOT EXISTS venues (id TEXT PRIMARY KEY, name TEXT NOT NULL"
        ));
    }
}
