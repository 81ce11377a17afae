use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::storage::{StorageError, StoragePort};
use crate::utils;

/// Durable key/value storage backed by a single sqlite table.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection poisoned".into()))
    }
}

impl StoragePort for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at_utc)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at_utc = excluded.updated_at_utc",
            params![key, value, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("storage.sqlite");
        {
            let storage = SqliteStorage::open(&path).expect("open storage");
            storage
                .set_item("scannedConcerts", r#"[{"id":"a"}]"#)
                .expect("write");
            storage.set_item("scannedConcerts", "[]").expect("overwrite");
        }
        let reopened = SqliteStorage::open(&path).expect("reopen storage");
        assert_eq!(
            reopened.get_item("scannedConcerts").expect("read").as_deref(),
            Some("[]")
        );
        assert_eq!(reopened.get_item("savedConcerts").expect("read"), None);
    }

    #[test]
    fn unopenable_path_reports_a_storage_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = SqliteStorage::open(dir.path())
            .err()
            .expect("a directory is not a database");
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[test]
    fn in_memory_storage_round_trips() {
        let storage = SqliteStorage::open_in_memory().expect("open storage");
        storage
            .set_item("scannedConcertsLastSync", "2025-03-30T19:30:00+00:00")
            .expect("write");
        assert_eq!(
            storage
                .get_item("scannedConcertsLastSync")
                .expect("read")
                .as_deref(),
            Some("2025-03-30T19:30:00+00:00")
        );
    }
}
