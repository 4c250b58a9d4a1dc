// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flat-file storage backend.
//!
//! One CSV file per table under a data directory:
//!
//! ```text
//! data/
//!   users.csv          username,password_hash,first_name,...
//!   venues.csv         id,name,kind,address,city,capacity,manager_username
//!   bookings.csv       id,fan_username,venue_id,game_date,...
//!   notifications.csv  id,username,kind,booking_id,message,is_read,created_at
//! ```
//!
//! Every file starts with the schema's header row. Foreign keys are raw ids
//! and usernames, the same values the SQL backend stores.
//!
//! Writes rewrite the whole file through a temp file and a rename, so a
//! crash mid-write leaves the previous version intact. All file access goes
//! through one async mutex; the store is small and write-light.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::traits::{RecordStore, StorageError};
use super::{sort_rows, BackendFamily};
use crate::entity::{Row, TableSchema};

pub struct CsvStore {
    dir: PathBuf,
    io: Mutex<()>,
}

impl CsvStore {
    /// Open (creating if needed) a data directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Backend(format!("cannot create {}: {}", dir.display(), e)))?;
        info!(dir = %dir.display(), "CSV store opened");
        Ok(Self { dir, io: Mutex::new(()) })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, table: &TableSchema) -> PathBuf {
        self.dir.join(format!("{}.csv", table.name))
    }

    async fn read_table(&self, table: &TableSchema) -> Result<Vec<Row>, StorageError> {
        let path = self.path(table);
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode(table, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::Backend(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn write_table(&self, table: &TableSchema, rows: &[Row]) -> Result<(), StorageError> {
        let path = self.path(table);
        let tmp = self.dir.join(format!("{}.csv.tmp", table.name));
        let bytes = encode(table, rows)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Backend(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Backend(format!("rename to {}: {}", path.display(), e)))?;
        debug!(table = table.name, rows = rows.len(), "CSV table rewritten");
        Ok(())
    }
}

fn decode(table: &TableSchema, bytes: &[u8]) -> Result<Vec<Row>, StorageError> {
    let corrupt = |reason: String| StorageError::Decode {
        entity: table.name.to_string(),
        reason,
    };

    let mut reader = ::csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?;
    if !headers.iter().eq(table.columns.iter().copied()) {
        return Err(corrupt(format!(
            "header mismatch: expected {:?}, found {:?}",
            table.columns,
            headers.iter().collect::<Vec<_>>()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| corrupt(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn encode(table: &TableSchema, rows: &[Row]) -> Result<Vec<u8>, StorageError> {
    let fail = |e: ::csv::Error| StorageError::Backend(format!("encode {}: {}", table.name, e));

    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns).map_err(fail)?;
    for row in rows {
        writer.write_record(row).map_err(fail)?;
    }
    writer
        .into_inner()
        .map_err(|e| StorageError::Backend(format!("encode {}: {}", table.name, e)))
}

#[async_trait]
impl RecordStore for CsvStore {
    fn family(&self) -> BackendFamily {
        BackendFamily::Csv
    }

    async fn insert(&self, table: &TableSchema, row: Row) -> Result<(), StorageError> {
        table.check_row(&row)?;
        let _io = self.io.lock().await;
        let mut rows = self.read_table(table).await?;
        if rows.iter().any(|r| r[0] == row[0]) {
            return Err(StorageError::already_exists(table, &row[0]));
        }
        rows.push(row);
        sort_rows(&mut rows);
        self.write_table(table, &rows).await
    }

    async fn update(&self, table: &TableSchema, row: Row) -> Result<(), StorageError> {
        table.check_row(&row)?;
        let _io = self.io.lock().await;
        let mut rows = self.read_table(table).await?;
        let Some(existing) = rows.iter_mut().find(|r| r[0] == row[0]) else {
            return Err(StorageError::not_found(table, &row[0]));
        };
        *existing = row;
        self.write_table(table, &rows).await
    }

    async fn delete(&self, table: &TableSchema, id: &str) -> Result<(), StorageError> {
        let _io = self.io.lock().await;
        let mut rows = self.read_table(table).await?;
        let before = rows.len();
        rows.retain(|r| r[0] != id);
        if rows.len() == before {
            return Err(StorageError::not_found(table, id));
        }
        self.write_table(table, &rows).await
    }

    async fn get(&self, table: &TableSchema, id: &str) -> Result<Option<Row>, StorageError> {
        let _io = self.io.lock().await;
        Ok(self.read_table(table).await?.into_iter().find(|r| r[0] == id))
    }

    async fn all(&self, table: &TableSchema) -> Result<Vec<Row>, StorageError> {
        let _io = self.io.lock().await;
        let mut rows = self.read_table(table).await?;
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let meta = tokio::fs::metadata(&self.dir)
            .await
            .map_err(|e| StorageError::Backend(format!("{}: {}", self.dir.display(), e)))?;
        if !meta.is_dir() {
            return Err(StorageError::Backend(format!("{} is not a directory", self.dir.display())));
        }
        if meta.permissions().readonly() {
            return Err(StorageError::Backend(format!("{} is read-only", self.dir.display())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::model::{Notification, NotificationKind, Venue};

    fn venue_row(id: u64, name: &str) -> Row {
        Venue::new(name, "Pub", "1 Main St, Unit 2", "Boston", 40, "mgr1").with_id(id).to_row()
    }

    #[tokio::test]
    async fn test_file_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).await.unwrap();
        store.insert(Venue::SCHEMA, venue_row(1, "The Hoop")).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("venues.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "id,name,kind,address,city,capacity,manager_username");
        assert_eq!(lines.next().unwrap(), "1,The Hoop,Pub,\"1 Main St, Unit 2\",Boston,40,mgr1");
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).await.unwrap();
        assert!(store.all(Venue::SCHEMA).await.unwrap().is_empty());
        assert!(store.get(Venue::SCHEMA, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).await.unwrap();

        store.insert(Venue::SCHEMA, venue_row(2, "B")).await.unwrap();
        store.insert(Venue::SCHEMA, venue_row(1, "A")).await.unwrap();
        assert!(matches!(
            store.insert(Venue::SCHEMA, venue_row(1, "A")).await,
            Err(StorageError::AlreadyExists { .. })
        ));

        store.update(Venue::SCHEMA, venue_row(1, "A2")).await.unwrap();
        let rows = store.all(Venue::SCHEMA).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "A2");

        store.delete(Venue::SCHEMA, "2").await.unwrap();
        assert!(store.delete(Venue::SCHEMA, "2").await.unwrap_err().is_not_found());
        assert!(store.update(Venue::SCHEMA, venue_row(9, "Z")).await.unwrap_err().is_not_found());
        assert_eq!(store.next_id(Venue::SCHEMA).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CsvStore::open(dir.path()).await.unwrap();
            let n = Notification::new(
                "fan1",
                NotificationKind::BookingApproved,
                Some(3),
                "line1\nline2",
            )
            .with_id(1);
            store.insert(Notification::SCHEMA, n.to_row()).await.unwrap();
        }
        let store = CsvStore::open(dir.path()).await.unwrap();
        let row = store.get(Notification::SCHEMA, "1").await.unwrap().unwrap();
        assert_eq!(Notification::from_row(&row).unwrap().message, "line1\nline2");
    }

    #[tokio::test]
    async fn test_header_mismatch_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("venues.csv"), "id,title\n1,x\n").unwrap();
        let store = CsvStore::open(dir.path()).await.unwrap();
        assert!(matches!(store.all(Venue::SCHEMA).await, Err(StorageError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_ping_ok_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).await.unwrap();
        store.ping().await.unwrap();
    }
}
